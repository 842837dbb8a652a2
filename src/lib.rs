pub mod config;
pub mod error_codes;
pub mod input_validation;
pub mod logging;
pub mod mirror;
pub mod notification;
pub mod reconcile;
pub mod session;
pub mod store;

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

pub use config::{ConfigError, Preferences, SorterConfig};
pub use logging::{LogEntry, LogLevel, LogManager};
pub use mirror::{FolderStatus, Location, SelectionScope, SelectionSnapshot, ViewQuery};
pub use notification::{Notification, NotificationError};
pub use reconcile::{ActionError, AutoSortReport, AutoSortRule, BatchOutcome, BatchProgress, RenamePattern};
pub use session::{Session, SessionError, SessionHandle, SessionStatus};
pub use store::{HttpStore, RemoteStore, StoreError};
#[cfg(any(test, feature = "memory-store"))]
pub use store::MemoryStore;

use reconcile::Coordinator;

pub fn get_app_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// A running session and what it needs to stay alive.
pub struct Runtime {
    pub session: SessionHandle,
    pub log: LogManager,
    pub token: CancellationToken,
}

impl Runtime {
    pub async fn shutdown(self) {
        self.session.shutdown().await;
        self.token.cancel();
    }
}

/// Connects to the configured server, loads the initial state and starts a
/// session. With `follow_events` the notification stream is attached too.
pub async fn start(config: &SorterConfig, follow_events: bool) -> anyhow::Result<Runtime> {
    let store = Arc::new(HttpStore::new(&config.server_url).context("invalid server_url")?);
    let log = LogManager::new(config.log_capacity);
    let token = CancellationToken::new();

    let mut coordinator = Coordinator::new(store, config.coordinator_settings(), log.clone());
    if let Some(path) = &config.preferences_path {
        let preferences = Preferences::load(path).await?;
        coordinator.set_rules(preferences.auto_sort_rules);
        coordinator.set_view_query(preferences.view_query);
    }
    coordinator
        .load()
        .await
        .with_context(|| format!("failed to load state from {}", config.server_url))?;

    let (sender, channel) = notification::channel();
    if follow_events {
        notification::connect_tcp(&config.events_addr, sender, token.child_token())
            .await
            .with_context(|| format!("failed to connect to notification stream {}", config.events_addr))?;
    }

    let mut session = Session::new(coordinator, channel);
    if let Some(path) = &config.preferences_path {
        session = session.with_preferences(path.clone());
    }
    let (session, _task) = session.spawn(token.child_token());
    tracing::info!(server = %config.server_url, version = get_app_version(), "session ready");

    Ok(Runtime { session, log, token })
}
