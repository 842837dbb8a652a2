use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Default number of user-facing entries kept in memory
pub const DEFAULT_MAX_LOG_LINES: usize = 1000;

const FEED_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Info => "info",
            LogLevel::Success => "success",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        })
    }
}

/// One notification shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
    /// Category, batch or other context the entry belongs to.
    pub scope: Option<String>,
    /// Stable error code for front ends, when the entry reports a failure.
    pub code: Option<String>,
}

#[derive(Debug)]
struct Ring {
    entries: VecDeque<LogEntry>,
    next_id: u64,
}

/// Bounded feed of user-facing notifications with a live broadcast.
#[derive(Debug, Clone)]
pub struct LogManager {
    ring: Arc<Mutex<Ring>>,
    max_lines: usize,
    feed: broadcast::Sender<LogEntry>,
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LOG_LINES)
    }
}

impl LogManager {
    pub fn new(max_lines: usize) -> Self {
        let max_lines = max_lines.max(1);
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            ring: Arc::new(Mutex::new(Ring {
                entries: VecDeque::with_capacity(max_lines.min(1024)),
                next_id: 1,
            })),
            max_lines,
            feed,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ring> {
        self.ring.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn log_with_code(&self, level: LogLevel, message: &str, scope: Option<&str>, code: Option<&str>) -> LogEntry {
        let entry = {
            let mut ring = self.lock();
            let entry = LogEntry {
                id: ring.next_id,
                timestamp: chrono::Utc::now().to_rfc3339(),
                level,
                message: message.to_string(),
                scope: scope.map(str::to_string),
                code: code.map(str::to_string),
            };
            ring.next_id += 1;
            ring.entries.push_back(entry.clone());

            // Remove from front if full
            while ring.entries.len() > self.max_lines {
                ring.entries.pop_front();
            }
            entry
        };

        match level {
            LogLevel::Error => tracing::error!(scope = ?entry.scope, code = ?entry.code, "{}", entry.message),
            LogLevel::Warning => tracing::warn!(scope = ?entry.scope, code = ?entry.code, "{}", entry.message),
            LogLevel::Info | LogLevel::Success => tracing::info!(scope = ?entry.scope, "{}", entry.message),
        }

        // no subscribers is fine
        let _ = self.feed.send(entry.clone());
        entry
    }

    pub fn log(&self, level: LogLevel, message: &str, scope: Option<&str>) -> LogEntry {
        self.log_with_code(level, message, scope, None)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.feed.subscribe()
    }

    pub fn get_logs(&self, scope: Option<&str>) -> Vec<LogEntry> {
        let ring = self.lock();
        match scope {
            Some(scope) => ring
                .entries
                .iter()
                .filter(|l| l.scope.as_deref() == Some(scope))
                .cloned()
                .collect(),
            None => ring.entries.iter().cloned().collect(),
        }
    }

    /// Get logs with pagination for large feeds
    pub fn get_logs_paginated(&self, scope: Option<&str>, offset: usize, limit: usize) -> Vec<LogEntry> {
        let ring = self.lock();
        ring.entries
            .iter()
            .filter(|l| scope.is_none() || l.scope.as_deref() == scope)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn latest(&self) -> Option<LogEntry> {
        self.lock().entries.back().cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Installs the diagnostics subscriber. `RUST_LOG` overrides `default_filter`.
pub fn init_tracing(default_filter: &str) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    Registry::default()
        .with(env_filter)
        .with(tracing_fmt::layer().with_target(true).with_writer(std::io::stderr))
        .try_init()?;

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "media-sorter tracing ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_manager_new() {
        let manager = LogManager::new(100);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_log_manager_log() {
        let manager = LogManager::new(10);

        manager.log(LogLevel::Info, "test message", None);
        assert_eq!(manager.len(), 1);

        let entry = manager.log(LogLevel::Warning, "another message", Some("Trips"));
        assert_eq!(manager.len(), 2);
        assert_eq!(entry.id, 2);
        assert_eq!(entry.scope.as_deref(), Some("Trips"));
    }

    #[test]
    fn test_log_manager_rotation() {
        let manager = LogManager::new(3);

        for i in 0..5 {
            manager.log(LogLevel::Info, &format!("message {}", i), None);
        }

        let logs = manager.get_logs(None);
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].message, "message 2");
    }

    #[test]
    fn test_log_manager_get_logs_by_scope() {
        let manager = LogManager::new(10);

        manager.log(LogLevel::Info, "message1", None);
        manager.log(LogLevel::Success, "message2", Some("batch"));
        manager.log(LogLevel::Error, "message3", Some("batch"));

        assert_eq!(manager.get_logs(None).len(), 3);
        assert_eq!(manager.get_logs(Some("batch")).len(), 2);
        assert!(manager.get_logs(Some("nonexistent")).is_empty());
    }

    #[test]
    fn test_log_manager_pagination() {
        let manager = LogManager::new(100);

        for i in 0..20 {
            manager.log(LogLevel::Info, &format!("message {}", i), None);
        }

        assert_eq!(manager.get_logs_paginated(None, 0, 10).len(), 10);
        let page2 = manager.get_logs_paginated(None, 10, 10);
        assert_eq!(page2.len(), 10);
        assert_eq!(page2[0].message, "message 10");
        assert!(manager.get_logs_paginated(None, 20, 10).is_empty());
    }

    #[tokio::test]
    async fn test_feed_broadcasts_entries() {
        let manager = LogManager::new(10);
        let mut feed = manager.subscribe();

        manager.log_with_code(LogLevel::Error, "move failed", None, Some("ERR_SERVER"));
        let entry = feed.recv().await.unwrap();
        assert_eq!(entry.level, LogLevel::Error);
        assert_eq!(entry.code.as_deref(), Some("ERR_SERVER"));
    }
}
