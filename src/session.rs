//! 세션: 코디네이터를 하나의 태스크에서 소유하고 실행합니다.
//!
//! 뷰 명령, 서버 알림, 안전망 마감 시각, 종료 신호를 `tokio::select!`로
//! 번갈아 처리합니다. 미러는 이 태스크만 접근하므로 잠금이 필요 없습니다.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::Preferences;
use crate::mirror::projection::ViewQuery;
use crate::mirror::selection::{SelectionScope, SelectionSnapshot};
use crate::mirror::types::{Category, FolderStatus, Location};
use crate::notification::NotificationChannel;
use crate::reconcile::autosort::AutoSortRule;
use crate::reconcile::batch_rename::RenamePattern;
use crate::reconcile::coordinator::Coordinator;
use crate::reconcile::types::{ActionError, AutoSortReport, BatchOutcome, CategoryView, ProgressFn, UnsortedView};
use crate::store::RemoteStore;

const COMMAND_BUFFER: usize = 64;

pub type SelectionListener = Box<dyn FnMut(&SelectionSnapshot) + Send>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("session has shut down")]
    Closed,
    #[error(transparent)]
    Action(#[from] ActionError),
}

/// Counters for status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub categories: Vec<Category>,
    pub unsorted_count: usize,
    pub pending_moves: usize,
    pub scheduled_checks: usize,
    pub open_view: Option<Location>,
    pub unsorted_folder_missing: bool,
}

type Reply<T> = oneshot::Sender<T>;
type ActionReply<T> = oneshot::Sender<Result<T, ActionError>>;

/// A reply held back until the command's side effects are persisted.
type Deferred = Box<dyn FnOnce() + Send>;

fn deferred<T: Send + 'static>(reply: Reply<T>, value: T) -> Deferred {
    // 응답 수신자가 사라졌으면 결과는 버립니다
    Box::new(move || {
        let _ = reply.send(value);
    })
}

enum Command {
    Status(Reply<SessionStatus>),
    Reload(ActionReply<()>),
    UnsortedView(Reply<UnsortedView>),
    CategoryView(String, ActionReply<CategoryView>),
    OpenCategory(String, ActionReply<()>),
    OpenSubfolder {
        category: String,
        subfolder: String,
        reply: ActionReply<()>,
    },
    CloseView(Reply<()>),
    Selection(Reply<SelectionSnapshot>),
    OnSelectionChanged(SelectionListener),
    ToggleSelection {
        scope: SelectionScope,
        name: String,
        reply: ActionReply<bool>,
    },
    SelectAll(SelectionScope, Reply<()>),
    ToggleAll(SelectionScope, Reply<()>),
    ClearSelection(SelectionScope, Reply<()>),
    Move {
        name: String,
        from: Location,
        to: Location,
        reply: ActionReply<()>,
    },
    BatchMove {
        scope: SelectionScope,
        to: Location,
        progress: Option<ProgressFn>,
        reply: ActionReply<BatchOutcome>,
    },
    Rename {
        location: Location,
        old: String,
        new: String,
        reply: ActionReply<String>,
    },
    BatchRename {
        scope: SelectionScope,
        pattern: RenamePattern,
        progress: Option<ProgressFn>,
        reply: ActionReply<BatchOutcome>,
    },
    CreateCategory(String, ActionReply<()>),
    DeleteCategory(String, ActionReply<()>),
    RenameCategory {
        old: String,
        new: String,
        reply: ActionReply<()>,
    },
    RenameSubfolder {
        category: String,
        old: String,
        new: String,
        reply: ActionReply<()>,
    },
    CreateUnsortedFolder(ActionReply<()>),
    CheckFolders(Reply<Option<FolderStatus>>),
    ApplyAutoSort(Reply<AutoSortReport>),
    SetViewQuery(ViewQuery, Reply<()>),
    SetRules(Vec<AutoSortRule>, Reply<()>),
    Rules(Reply<Vec<AutoSortRule>>),
}

pub struct Session<S: RemoteStore> {
    coordinator: Coordinator<S>,
    notifications: NotificationChannel,
    preferences_path: Option<PathBuf>,
    listeners: Vec<SelectionListener>,
    last_selection: SelectionSnapshot,
}

impl<S: RemoteStore> Session<S> {
    pub fn new(coordinator: Coordinator<S>, notifications: NotificationChannel) -> Self {
        let last_selection = coordinator.mirror().selection_snapshot();
        Self {
            coordinator,
            notifications,
            preferences_path: None,
            listeners: Vec::new(),
            last_selection,
        }
    }

    /// Rules and view query are written here whenever they change.
    pub fn with_preferences(mut self, path: impl Into<PathBuf>) -> Self {
        self.preferences_path = Some(path.into());
        self
    }

    /// Starts the session task. Cancelling `token` stops it.
    pub fn spawn(self, token: CancellationToken) -> (SessionHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = SessionHandle {
            commands: tx,
            token: token.clone(),
        };
        let task = tokio::spawn(self.run(rx, token));
        (handle, task)
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>, token: CancellationToken) {
        let mut notifications_open = true;
        tracing::info!("session started");

        loop {
            let deadline = self.coordinator.next_deadline();
            tokio::select! {
                _ = token.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                notification = self.notifications.recv(), if notifications_open => match notification {
                    Some(notification) => self.coordinator.handle_notification(notification).await,
                    None => {
                        tracing::debug!("notification channel closed");
                        notifications_open = false;
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.coordinator.run_due_checks(Instant::now()).await;
                }
            }
            self.publish_selection();
        }

        tracing::info!("session stopped");
    }

    fn publish_selection(&mut self) {
        let snapshot = self.coordinator.mirror().selection_snapshot();
        if snapshot == self.last_selection {
            return;
        }
        for listener in self.listeners.iter_mut() {
            listener(&snapshot);
        }
        self.last_selection = snapshot;
    }

    fn preferences(&self) -> Preferences {
        Preferences {
            auto_sort_rules: self.coordinator.rules().to_vec(),
            view_query: self.coordinator.query().clone(),
        }
    }

    /// Runs one command. Changed preferences are written before the caller
    /// gets its answer.
    async fn handle_command(&mut self, command: Command) {
        let before = self.preferences();
        let reply = self.execute(command).await;

        let after = self.preferences();
        if after != before {
            save_preferences(self.preferences_path.as_deref(), &after).await;
        }
        reply();
    }

    async fn execute(&mut self, command: Command) -> Deferred {
        match command {
            Command::Status(reply) => deferred(reply, self.status()),
            Command::Reload(reply) => deferred(reply, self.coordinator.load().await),
            Command::UnsortedView(reply) => deferred(reply, self.coordinator.unsorted_view()),
            Command::CategoryView(name, reply) => deferred(reply, self.coordinator.load_category_view(&name).await),
            Command::OpenCategory(name, reply) => deferred(reply, self.coordinator.open_category(&name).await),
            Command::OpenSubfolder {
                category,
                subfolder,
                reply,
            } => deferred(reply, self.coordinator.open_subfolder(&category, &subfolder).await),
            Command::CloseView(reply) => {
                self.coordinator.close_view();
                deferred(reply, ())
            }
            Command::Selection(reply) => deferred(reply, self.coordinator.mirror().selection_snapshot()),
            Command::OnSelectionChanged(listener) => {
                self.listeners.push(listener);
                Box::new(|| {})
            }
            Command::ToggleSelection { scope, name, reply } => {
                deferred(reply, self.coordinator.toggle_selection(scope, &name))
            }
            Command::SelectAll(scope, reply) => {
                self.coordinator.select_all(scope);
                deferred(reply, ())
            }
            Command::ToggleAll(scope, reply) => {
                self.coordinator.toggle_all(scope);
                deferred(reply, ())
            }
            Command::ClearSelection(scope, reply) => {
                self.coordinator.clear_selection(scope);
                deferred(reply, ())
            }
            Command::Move { name, from, to, reply } => {
                deferred(reply, self.coordinator.request_move(&name, &from, &to).await)
            }
            Command::BatchMove {
                scope,
                to,
                progress,
                reply,
            } => deferred(reply, self.coordinator.request_batch_move(scope, &to, progress).await),
            Command::Rename {
                location,
                old,
                new,
                reply,
            } => deferred(reply, self.coordinator.request_rename(&location, &old, &new).await),
            Command::BatchRename {
                scope,
                pattern,
                progress,
                reply,
            } => deferred(
                reply,
                self.coordinator
                    .request_batch_rename(scope, &pattern, progress)
                    .await,
            ),
            Command::CreateCategory(name, reply) => deferred(reply, self.coordinator.create_category(&name).await),
            Command::DeleteCategory(name, reply) => deferred(reply, self.coordinator.delete_category(&name).await),
            Command::RenameCategory { old, new, reply } => {
                deferred(reply, self.coordinator.rename_category(&old, &new).await)
            }
            Command::RenameSubfolder {
                category,
                old,
                new,
                reply,
            } => deferred(reply, self.coordinator.rename_subfolder(&category, &old, &new).await),
            Command::CreateUnsortedFolder(reply) => deferred(reply, self.coordinator.create_unsorted_folder().await),
            Command::CheckFolders(reply) => {
                let status = self.coordinator.check_folder_status().await.cloned();
                deferred(reply, status)
            }
            Command::ApplyAutoSort(reply) => deferred(reply, self.coordinator.apply_auto_sort().await),
            Command::SetViewQuery(query, reply) => {
                self.coordinator.set_view_query(query);
                deferred(reply, ())
            }
            Command::SetRules(rules, reply) => {
                self.coordinator.set_rules(rules);
                deferred(reply, ())
            }
            Command::Rules(reply) => deferred(reply, self.coordinator.rules().to_vec()),
        }
    }

    fn status(&self) -> SessionStatus {
        let mirror = self.coordinator.mirror();
        SessionStatus {
            categories: mirror.categories().to_vec(),
            unsorted_count: mirror.visible(&Location::Unsorted).len(),
            pending_moves: self.coordinator.pending().len(),
            scheduled_checks: self.coordinator.scheduled_checks(),
            open_view: mirror.open_location().cloned(),
            unsorted_folder_missing: self.coordinator.unsorted_folder_missing(),
        }
    }
}

async fn save_preferences(path: Option<&Path>, preferences: &Preferences) {
    let Some(path) = path else {
        return;
    };
    if let Err(e) = preferences.save(path).await {
        tracing::warn!(error = %e, "failed to save preferences");
    }
}

/// Cloneable front door to a running session. Every call is answered by the
/// session task in arrival order.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    token: CancellationToken,
}

impl SessionHandle {
    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    async fn action<T>(&self, make: impl FnOnce(ActionReply<T>) -> Command) -> Result<T, SessionError> {
        Ok(self.request(make).await??)
    }

    pub async fn status(&self) -> Result<SessionStatus, SessionError> {
        self.request(Command::Status).await
    }

    /// Full re-fetch of categories and the unsorted listing.
    pub async fn reload(&self) -> Result<(), SessionError> {
        self.action(Command::Reload).await
    }

    pub async fn get_unsorted_view(&self) -> Result<UnsortedView, SessionError> {
        self.request(Command::UnsortedView).await
    }

    pub async fn get_category_view(&self, name: &str) -> Result<CategoryView, SessionError> {
        let name = name.to_string();
        self.action(|reply| Command::CategoryView(name, reply)).await
    }

    pub async fn open_category(&self, name: &str) -> Result<(), SessionError> {
        let name = name.to_string();
        self.action(|reply| Command::OpenCategory(name, reply)).await
    }

    pub async fn open_subfolder(&self, category: &str, subfolder: &str) -> Result<(), SessionError> {
        let (category, subfolder) = (category.to_string(), subfolder.to_string());
        self.action(|reply| Command::OpenSubfolder {
            category,
            subfolder,
            reply,
        })
        .await
    }

    pub async fn close_view(&self) -> Result<(), SessionError> {
        self.request(Command::CloseView).await
    }

    pub async fn selection(&self) -> Result<SelectionSnapshot, SessionError> {
        self.request(Command::Selection).await
    }

    /// `listener` runs on the session task after any change to either selection.
    pub async fn on_selection_changed<F>(&self, listener: F) -> Result<(), SessionError>
    where
        F: FnMut(&SelectionSnapshot) + Send + 'static,
    {
        self.commands
            .send(Command::OnSelectionChanged(Box::new(listener)))
            .await
            .map_err(|_| SessionError::Closed)
    }

    pub async fn toggle_selection(&self, scope: SelectionScope, name: &str) -> Result<bool, SessionError> {
        let name = name.to_string();
        self.action(|reply| Command::ToggleSelection { scope, name, reply })
            .await
    }

    pub async fn select_all(&self, scope: SelectionScope) -> Result<(), SessionError> {
        self.request(|reply| Command::SelectAll(scope, reply)).await
    }

    pub async fn toggle_all(&self, scope: SelectionScope) -> Result<(), SessionError> {
        self.request(|reply| Command::ToggleAll(scope, reply)).await
    }

    pub async fn clear_selection(&self, scope: SelectionScope) -> Result<(), SessionError> {
        self.request(|reply| Command::ClearSelection(scope, reply)).await
    }

    pub async fn request_move(&self, name: &str, from: Location, to: Location) -> Result<(), SessionError> {
        let name = name.to_string();
        self.action(|reply| Command::Move { name, from, to, reply }).await
    }

    pub async fn request_batch_move(
        &self,
        scope: SelectionScope,
        to: Location,
        progress: Option<ProgressFn>,
    ) -> Result<BatchOutcome, SessionError> {
        self.action(|reply| Command::BatchMove {
            scope,
            to,
            progress,
            reply,
        })
        .await
    }

    /// Returns the name the server settled on.
    pub async fn request_rename(&self, location: Location, old: &str, new: &str) -> Result<String, SessionError> {
        let (old, new) = (old.to_string(), new.to_string());
        self.action(|reply| Command::Rename {
            location,
            old,
            new,
            reply,
        })
        .await
    }

    pub async fn request_batch_rename(
        &self,
        scope: SelectionScope,
        pattern: RenamePattern,
        progress: Option<ProgressFn>,
    ) -> Result<BatchOutcome, SessionError> {
        self.action(|reply| Command::BatchRename {
            scope,
            pattern,
            progress,
            reply,
        })
        .await
    }

    pub async fn create_category(&self, name: &str) -> Result<(), SessionError> {
        let name = name.to_string();
        self.action(|reply| Command::CreateCategory(name, reply)).await
    }

    pub async fn delete_category(&self, name: &str) -> Result<(), SessionError> {
        let name = name.to_string();
        self.action(|reply| Command::DeleteCategory(name, reply)).await
    }

    pub async fn rename_category(&self, old: &str, new: &str) -> Result<(), SessionError> {
        let (old, new) = (old.to_string(), new.to_string());
        self.action(|reply| Command::RenameCategory { old, new, reply })
            .await
    }

    pub async fn rename_subfolder(&self, category: &str, old: &str, new: &str) -> Result<(), SessionError> {
        let (category, old, new) = (category.to_string(), old.to_string(), new.to_string());
        self.action(|reply| Command::RenameSubfolder {
            category,
            old,
            new,
            reply,
        })
        .await
    }

    pub async fn create_unsorted_folder(&self) -> Result<(), SessionError> {
        self.action(Command::CreateUnsortedFolder).await
    }

    /// Asks the server again which media folders exist.
    pub async fn check_folder_status(&self) -> Result<Option<FolderStatus>, SessionError> {
        self.request(Command::CheckFolders).await
    }

    pub async fn apply_auto_sort(&self) -> Result<AutoSortReport, SessionError> {
        self.request(Command::ApplyAutoSort).await
    }

    pub async fn set_view_query(&self, query: ViewQuery) -> Result<(), SessionError> {
        self.request(|reply| Command::SetViewQuery(query, reply)).await
    }

    pub async fn set_rules(&self, rules: Vec<AutoSortRule>) -> Result<(), SessionError> {
        self.request(|reply| Command::SetRules(rules, reply)).await
    }

    pub async fn rules(&self) -> Result<Vec<AutoSortRule>, SessionError> {
        self.request(Command::Rules).await
    }

    /// Stops the session and waits until it has let go of its state.
    pub async fn shutdown(&self) {
        self.token.cancel();
        self.commands.closed().await;
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}
