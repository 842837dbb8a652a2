use std::collections::{HashMap, HashSet, VecDeque};

use tokio::time::{Duration, Instant};

use crate::error_codes;
use crate::input_validation::{validate_category_name, validate_file_name, validate_subfolder_name};
use crate::logging::{LogLevel, LogManager};
use crate::mirror::projection::{project, ViewQuery};
use crate::mirror::selection::SelectionScope;
use crate::mirror::state::{AddOutcome, Mirror, MoveApplied};
use crate::mirror::types::{FolderStatus, Location, PendingKind, PendingMove};
use crate::notification::{FileAdded, FileMoved, Notification};
use crate::reconcile::autosort::{match_rule, AutoSortRule};
use crate::reconcile::batch_rename::RenamePattern;
use crate::reconcile::scheduler::{Check, Refresh, Scheduler};
use crate::reconcile::types::{
    ActionError, AutoSortReport, BatchOutcome, BatchProgress, CategoryView, ProgressFn, UnsortedView,
};
use crate::store::{final_file_name, RemoteStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    pub safety_net_delay: Duration,
    pub max_reconcile_retries: u32,
    /// How long an arrival for a name that just left the unsorted area is
    /// checked against the store instead of trusted.
    pub arrival_echo_window: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            safety_net_delay: Duration::from_millis(500),
            max_reconcile_retries: 3,
            arrival_echo_window: Duration::from_secs(5),
        }
    }
}

/// Runs user actions against the store and folds their outcome, and every
/// notification, into the Mirror.
pub struct Coordinator<S: RemoteStore> {
    store: S,
    mirror: Mirror,
    pending: Vec<PendingMove>,
    scheduler: Scheduler,
    rules: Vec<AutoSortRule>,
    query: ViewQuery,
    log: LogManager,
    departures: HashMap<String, Instant>,
    arrival_echo_window: Duration,
    folder_status: Option<FolderStatus>,
}

impl<S: RemoteStore> Coordinator<S> {
    pub fn new(store: S, settings: CoordinatorSettings, log: LogManager) -> Self {
        Self {
            store,
            mirror: Mirror::new(),
            pending: Vec::new(),
            scheduler: Scheduler::new(settings.safety_net_delay, settings.max_reconcile_retries),
            rules: Vec::new(),
            query: ViewQuery::default(),
            log,
            departures: HashMap::new(),
            arrival_echo_window: settings.arrival_echo_window,
            folder_status: None,
        }
    }

    pub fn mirror(&self) -> &Mirror {
        &self.mirror
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn pending(&self) -> &[PendingMove] {
        &self.pending
    }

    pub fn log(&self) -> &LogManager {
        &self.log
    }

    pub fn rules(&self) -> &[AutoSortRule] {
        &self.rules
    }

    pub fn set_rules(&mut self, rules: Vec<AutoSortRule>) {
        self.rules = rules;
    }

    pub fn query(&self) -> &ViewQuery {
        &self.query
    }

    pub fn set_view_query(&mut self, query: ViewQuery) {
        self.query = query;
    }

    pub fn scheduled_checks(&self) -> usize {
        self.scheduler.len()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Last folder status the server reported, if it answered.
    pub fn folder_status(&self) -> Option<&FolderStatus> {
        self.folder_status.as_ref()
    }

    pub fn unsorted_folder_missing(&self) -> bool {
        self.folder_status.as_ref().is_some_and(|s| !s.download_folder)
    }

    // ---- loading and views ----

    /// Full re-fetch of categories and the unsorted listing. A missing
    /// unsorted folder leaves the listing empty and is reported once.
    pub async fn load(&mut self) -> Result<(), ActionError> {
        self.check_folder_status().await;
        let categories = self.store.list_categories().await?;
        self.mirror.replace_categories(categories);
        let files = if self.unsorted_folder_missing() {
            Vec::new()
        } else {
            self.store.list_unsorted().await?
        };
        self.mirror.replace_unsorted(files);
        self.release_orphan_hides(&Location::Unsorted);
        Ok(())
    }

    /// Asks the server which media folders exist. A server that cannot answer
    /// is assumed to have them all.
    pub async fn check_folder_status(&mut self) -> Option<&FolderStatus> {
        let was_missing = self.unsorted_folder_missing();
        match self.store.folder_status().await {
            Ok(status) => self.folder_status = Some(status),
            Err(e) => {
                tracing::warn!(error = %e, "folder status unavailable");
                self.folder_status = None;
            }
        }
        if self.unsorted_folder_missing() && !was_missing {
            self.log.log_with_code(
                LogLevel::Warning,
                "The download folder is missing",
                None,
                Some(error_codes::ERR_UNSORTED_FOLDER_MISSING),
            );
        }
        self.folder_status.as_ref()
    }

    pub async fn open_category(&mut self, name: &str) -> Result<(), ActionError> {
        if !self.mirror.has_category(name) {
            return Err(ActionError::UnknownCategory(name.to_string()));
        }
        let contents = self.store.list_category_contents(name).await?;
        self.mirror.replace_category_contents(name, contents);
        self.mirror.open_view(Location::category(name));
        Ok(())
    }

    pub async fn open_subfolder(&mut self, category: &str, subfolder: &str) -> Result<(), ActionError> {
        if !self.mirror.has_category(category) {
            return Err(ActionError::UnknownCategory(category.to_string()));
        }
        let files = self.store.list_subfolder_contents(category, subfolder).await?;
        self.mirror.replace_subfolder_contents(category, subfolder, files);
        self.mirror.open_view(Location::subfolder(category, subfolder));
        Ok(())
    }

    pub fn close_view(&mut self) {
        self.mirror.close_view();
    }

    pub fn unsorted_view(&self) -> UnsortedView {
        let visible = self.mirror.visible(&Location::Unsorted);
        let total = visible.len();
        UnsortedView {
            files: project(visible, &self.query),
            total,
            selected: self.mirror.selection(SelectionScope::Unsorted).to_vec(),
            query: self.query.clone(),
        }
    }

    /// A cached category view, or `None` when the category was never fetched.
    pub fn category_view(&self, name: &str) -> Option<CategoryView> {
        let category = self.mirror.category(name)?;
        let location = Location::category(name);
        if !self.mirror.is_loaded(&location) {
            return None;
        }
        let selected = if self.mirror.open_location() == Some(&location) {
            self.mirror.selection(SelectionScope::Open).to_vec()
        } else {
            Vec::new()
        };
        Some(CategoryView {
            file_count: category.file_count,
            files: project(self.mirror.visible(&location), &ViewQuery::default()),
            subfolders: self.mirror.subfolders(name).map(<[_]>::to_vec).unwrap_or_default(),
            selected,
            location,
        })
    }

    /// Like [`Coordinator::category_view`], fetching the listing first when
    /// it was never loaded.
    pub async fn load_category_view(&mut self, name: &str) -> Result<CategoryView, ActionError> {
        if !self.mirror.has_category(name) {
            return Err(ActionError::UnknownCategory(name.to_string()));
        }
        if !self.mirror.is_loaded(&Location::category(name)) {
            let contents = self.store.list_category_contents(name).await?;
            self.mirror.replace_category_contents(name, contents);
        }
        self.category_view(name)
            .ok_or_else(|| ActionError::UnknownCategory(name.to_string()))
    }

    // ---- selection ----

    /// Names select-all may pick: the unsorted pane honours the filter.
    fn selectable_names(&self, scope: SelectionScope) -> Vec<String> {
        match scope {
            SelectionScope::Unsorted => self
                .unsorted_view()
                .files
                .into_iter()
                .map(|f| f.name)
                .collect(),
            SelectionScope::Open => match self.mirror.open_location() {
                Some(location) => self
                    .mirror
                    .visible(location)
                    .into_iter()
                    .map(|f| f.name.clone())
                    .collect(),
                None => Vec::new(),
            },
        }
    }

    pub fn toggle_selection(&mut self, scope: SelectionScope, name: &str) -> Result<bool, ActionError> {
        let Some(location) = self.mirror.location_of_scope(scope) else {
            return Err(ActionError::InvalidInput("no view is open".into()));
        };
        let visible = self.mirror.contains(&location, name) && !self.mirror.is_hidden(name, &location);
        if !visible {
            return Err(ActionError::NotInLocation {
                name: name.to_string(),
                location,
            });
        }
        Ok(self.mirror.selection_mut(scope).toggle(name))
    }

    pub fn select_all(&mut self, scope: SelectionScope) {
        let names = self.selectable_names(scope);
        self.mirror
            .selection_mut(scope)
            .select_all(names.iter().map(String::as_str));
    }

    pub fn toggle_all(&mut self, scope: SelectionScope) {
        let names = self.selectable_names(scope);
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        self.mirror.selection_mut(scope).toggle_all(&names);
    }

    pub fn clear_selection(&mut self, scope: SelectionScope) {
        self.mirror.selection_mut(scope).clear();
    }

    // ---- notifications ----

    pub async fn handle_notification(&mut self, notification: Notification) {
        match notification {
            Notification::FileMoved(event) => self.on_file_moved(event).await,
            Notification::FileAdded(event) => self.on_file_added(event).await,
            Notification::FolderRecreated { message } | Notification::FolderCreated { message } => {
                self.log.log(LogLevel::Info, &message, None);
                if let Some(status) = self.folder_status.as_mut() {
                    status.download_folder = true;
                }
                self.run_refreshes(vec![(Refresh::Listing(Location::Unsorted), 0)])
                    .await;
            }
        }
    }

    async fn on_file_moved(&mut self, event: FileMoved) {
        if !event.confirmed {
            tracing::debug!(file = %event.name, to = %event.to, "unconfirmed move ignored");
            return;
        }
        if event.from == Location::Unsorted {
            self.note_departure(&event.name);
        }

        let rename_step = self
            .pending
            .iter()
            .any(|p| p.kind == PendingKind::RenameStep && p.is_confirmed_by(&event.name, &event.to));
        if rename_step {
            tracing::debug!(file = %event.name, to = %event.to, "rename step confirmed");
            return;
        }

        if let Some(index) = self
            .pending
            .iter()
            .position(|p| p.kind == PendingKind::Move && p.is_confirmed_by(&event.name, &event.to))
        {
            self.pending.remove(index);
        }

        let report = self.mirror.apply_file_moved(&event);
        tracing::debug!(
            file = %event.name,
            from = %event.from,
            to = %event.to,
            applied = ?report.applied,
            "file moved"
        );
        if report.applied == MoveApplied::Stale {
            self.release_orphan_hides(&event.from);
        }
        let work = report.followups.into_iter().map(|f| (Refresh::from(f), 0)).collect();
        self.run_refreshes(work).await;
    }

    async fn on_file_added(&mut self, event: FileAdded) {
        if self
            .pending
            .iter()
            .any(|p| p.kind == PendingKind::RenameStep && p.file_name == event.name)
        {
            tracing::debug!(file = %event.name, "rename step arrival consumed");
            return;
        }

        if self.recently_departed(&event.name) && !self.mirror.contains(&Location::Unsorted, &event.name) {
            self.verify_arrival(&event.name, true).await;
            return;
        }

        match self.mirror.apply_file_added(&event) {
            AddOutcome::Inserted => self.announce_arrival(&event.name).await,
            AddOutcome::KnownElsewhere(at) => {
                tracing::debug!(file = %event.name, %at, "arrival for a file listed elsewhere");
                self.verify_arrival(&event.name, false).await;
            }
            AddOutcome::AlreadyPresent => {
                tracing::debug!(file = %event.name, "arrival already listed");
            }
        }
    }

    /// Settles an arrival the Mirror cannot take at face value with a fresh
    /// unsorted listing. A departed name that really is back counts as new.
    async fn verify_arrival(&mut self, name: &str, departed: bool) {
        self.run_refreshes(vec![(Refresh::Listing(Location::Unsorted), 0)])
            .await;
        let back = self.mirror.contains(&Location::Unsorted, name);
        tracing::debug!(file = %name, departed, back, "arrival verified");
        if back && departed {
            self.announce_arrival(name).await;
        }
    }

    async fn announce_arrival(&mut self, name: &str) {
        self.log.log(LogLevel::Info, &format!("New file: {name}"), None);
        if let Some(rule) = match_rule(&self.rules, name).cloned() {
            self.auto_sort_arrival(name, &rule).await;
        }
    }

    /// Remembers that `name` left the unsorted area, so late or repeated
    /// arrival notifications for it are checked rather than trusted.
    fn note_departure(&mut self, name: &str) {
        self.departures.insert(name.to_string(), Instant::now());
    }

    fn recently_departed(&mut self, name: &str) -> bool {
        let now = Instant::now();
        let window = self.arrival_echo_window;
        self.departures.retain(|_, left| now.duration_since(*left) < window);
        self.departures.contains_key(name)
    }

    async fn auto_sort_arrival(&mut self, name: &str, rule: &AutoSortRule) {
        let target = Location::category(&rule.category);
        match self.move_one(name, &Location::Unsorted, &target).await {
            Ok(()) => {
                self.log.log(
                    LogLevel::Success,
                    &format!("Auto-sorted {} → {}", name, rule.category),
                    Some(rule.category.as_str()),
                );
            }
            Err(e) => self.surface(&e, &format!("Auto-sort of {name} failed"), Some(rule.category.as_str())),
        }
    }

    // ---- timers ----

    /// Runs every safety-net check whose deadline has passed.
    pub async fn run_due_checks(&mut self, now: Instant) {
        for check in self.scheduler.take_due(now) {
            self.run_check(check).await;
        }
    }

    async fn run_check(&mut self, check: Check) {
        match check {
            Check::Move { file_name, from, to } => {
                let unconfirmed = self.take_pending(PendingKind::Move, &file_name, &to);
                if unconfirmed {
                    tracing::warn!(file = %file_name, %from, %to, "no confirmation, reconciling");
                    self.reconcile_unconfirmed(&from, &to, &[file_name]).await;
                }
            }
            Check::Batch { from, to, files } => {
                let unconfirmed: Vec<String> = files
                    .into_iter()
                    .filter(|name| self.take_pending(PendingKind::Move, name, &to))
                    .collect();
                if !unconfirmed.is_empty() {
                    tracing::warn!(count = unconfirmed.len(), %from, %to, "batch partly unconfirmed, reconciling");
                    self.reconcile_unconfirmed(&from, &to, &unconfirmed).await;
                }
            }
            Check::Rename { location, old, new } => {
                self.pending
                    .retain(|p| !(p.kind == PendingKind::RenameStep && (p.file_name == old || p.file_name == new)));
                let mut work = Vec::new();
                if self.mirror.is_loaded(&location) {
                    work.push((Refresh::Listing(location.clone()), 0));
                }
                if self.mirror.contains(&Location::Unsorted, &old) || self.mirror.contains(&Location::Unsorted, &new) {
                    work.push((Refresh::Listing(Location::Unsorted), 0));
                }
                self.run_refreshes(work).await;
            }
            Check::Retry { refresh, attempt } => {
                self.run_refreshes(vec![(refresh, attempt)]).await;
            }
        }
    }

    fn take_pending(&mut self, kind: PendingKind, file_name: &str, to: &Location) -> bool {
        match self
            .pending
            .iter()
            .position(|p| p.kind == kind && p.is_confirmed_by(file_name, to))
        {
            Some(index) => {
                self.pending.remove(index);
                true
            }
            None => false,
        }
    }

    /// Forces the source listing and the target count back in line when a
    /// move was never confirmed.
    async fn reconcile_unconfirmed(&mut self, from: &Location, to: &Location, files: &[String]) {
        let mut work = Vec::new();
        if files.iter().any(|name| self.mirror.contains(from, name)) {
            work.push((Refresh::Listing(from.clone()), 0));
        }
        if let Some(category) = to.counted_category() {
            work.push((Refresh::Count(category.to_string()), 0));
        }
        if self.mirror.is_loaded(to) {
            work.push((Refresh::Listing(to.clone()), 0));
        }
        self.run_refreshes(work).await;
    }

    // ---- reconciliation ----

    async fn refresh(&mut self, refresh: &Refresh) -> Result<(), StoreError> {
        match refresh {
            Refresh::Listing(Location::Unsorted) => {
                let files = self.store.list_unsorted().await?;
                self.mirror.replace_unsorted(files);
            }
            Refresh::Listing(Location::Category(name)) => {
                let contents = self.store.list_category_contents(name).await?;
                self.mirror.replace_category_contents(name, contents);
            }
            Refresh::Listing(Location::Subfolder(category, subfolder)) => {
                let files = self.store.list_subfolder_contents(category, subfolder).await?;
                self.mirror.replace_subfolder_contents(category, subfolder, files);
            }
            Refresh::Count(name) => {
                // the fetched listing is cached too so its names evict stale copies
                let contents = self.store.list_category_contents(name).await?;
                self.mirror.replace_category_contents(name, contents);
            }
            Refresh::Categories => {
                let categories = self.store.list_categories().await?;
                self.mirror.replace_categories(categories);
            }
        }
        if let Refresh::Listing(location) = refresh {
            self.release_orphan_hides(location);
        }
        Ok(())
    }

    /// Executes refreshes in order. Failures are retried through the scheduler
    /// up to the configured limit; a vanished target triggers a category refresh.
    async fn run_refreshes(&mut self, initial: Vec<(Refresh, u32)>) {
        let mut work: VecDeque<(Refresh, u32)> = initial.into();
        let mut done: HashSet<Refresh> = HashSet::new();

        while let Some((refresh, attempt)) = work.pop_front() {
            if !done.insert(refresh.clone()) {
                continue;
            }
            match self.refresh(&refresh).await {
                Ok(()) => {}
                Err(StoreError::NotFound(message)) => {
                    tracing::debug!(?refresh, %message, "refresh target vanished");
                    if refresh != Refresh::Categories {
                        work.push_back((Refresh::Categories, 0));
                    }
                }
                Err(e) => {
                    if self.scheduler.schedule_retry(refresh.clone(), attempt) {
                        tracing::warn!(?refresh, attempt, error = %e, "refresh failed, will retry");
                    } else {
                        self.log.log_with_code(
                            LogLevel::Warning,
                            &format!("Could not refresh after {} attempts: {e}", attempt + 1),
                            None,
                            Some(e.code()),
                        );
                        if let Refresh::Listing(location) = &refresh {
                            self.release_orphan_hides(location);
                        }
                    }
                }
            }
        }
    }

    /// Unhides files at `location` that no in-flight action accounts for.
    fn release_orphan_hides(&mut self, location: &Location) {
        for name in self.mirror.hidden_at(location) {
            let accounted = self
                .pending
                .iter()
                .any(|p| p.file_name == name && &p.from == location);
            if !accounted {
                self.mirror.unhide(&name, location);
            }
        }
    }

    fn surface(&self, error: &ActionError, context: &str, scope: Option<&str>) {
        self.log
            .log_with_code(LogLevel::Error, &format!("{context}: {error}"), scope, Some(error.code()));
    }

    // ---- moves ----

    fn validate_move(&self, name: &str, from: &Location, to: &Location) -> Result<(), ActionError> {
        if from == to {
            return Err(ActionError::InvalidInput(format!("'{name}' is already in {to}")));
        }
        if matches!(from, Location::Subfolder(..)) || matches!(to, Location::Subfolder(..)) {
            return Err(ActionError::Unsupported("files cannot be moved in or out of subfolders".into()));
        }
        if let Some(category) = to.counted_category() {
            validate_category_name(category).map_err(ActionError::invalid)?;
        }
        if !self.mirror.contains(from, name) || self.mirror.is_hidden(name, from) {
            return Err(ActionError::NotInLocation {
                name: name.to_string(),
                location: from.clone(),
            });
        }
        Ok(())
    }

    async fn issue_move(&self, name: &str, from: &Location, to: &Location) -> Result<(), StoreError> {
        match (from, to) {
            (Location::Unsorted, Location::Category(category)) => self.store.move_to_category(name, category).await,
            (Location::Category(source), Location::Unsorted) => self.store.move_to_unsorted(name, source).await,
            (Location::Category(source), Location::Category(target)) => {
                self.store.move_between_categories(name, source, target).await
            }
            _ => Err(StoreError::InvalidRequest(format!("cannot move from {from} to {to}"))),
        }
    }

    /// Brings the Mirror back in line after a store rejection.
    async fn after_move_failure(&mut self, error: &StoreError, from: &Location) {
        match error {
            StoreError::NotFound(_) => {
                self.run_refreshes(vec![(Refresh::Listing(from.clone()), 0)]).await;
            }
            StoreError::TargetDeleted(_) => {
                self.run_refreshes(vec![(Refresh::Categories, 0)]).await;
            }
            _ => {}
        }
    }

    /// One move without user-facing reporting.
    async fn move_one(&mut self, name: &str, from: &Location, to: &Location) -> Result<(), ActionError> {
        self.validate_move(name, from, to)?;
        match self.issue_move(name, from, to).await {
            Ok(()) => {
                self.mirror.hide(name, from);
                if *from == Location::Unsorted {
                    self.note_departure(name);
                }
                self.pending
                    .push(PendingMove::new(name, from.clone(), to.clone(), PendingKind::Move));
                self.scheduler.schedule(Check::Move {
                    file_name: name.to_string(),
                    from: from.clone(),
                    to: to.clone(),
                });
                Ok(())
            }
            Err(e) => {
                self.after_move_failure(&e, from).await;
                Err(e.into())
            }
        }
    }

    /// Drag-and-drop of one file. On success the file disappears from its
    /// source at once; the confirming notification finishes the move.
    pub async fn request_move(&mut self, name: &str, from: &Location, to: &Location) -> Result<(), ActionError> {
        match self.move_one(name, from, to).await {
            Ok(()) => Ok(()),
            Err(ActionError::Store(StoreError::NotFound(message))) if !self.mirror.contains(from, name) => {
                tracing::debug!(file = %name, %message, "move target already gone, listing refreshed");
                Err(StoreError::NotFound(message).into())
            }
            Err(e) => {
                self.surface(&e, &format!("Could not move {name}"), to.owning_category());
                Err(e)
            }
        }
    }

    /// Moves every selected file of `scope` to `to`, one at a time.
    pub async fn request_batch_move(
        &mut self,
        scope: SelectionScope,
        to: &Location,
        mut progress: Option<ProgressFn>,
    ) -> Result<BatchOutcome, ActionError> {
        let Some(from) = self.mirror.location_of_scope(scope) else {
            return Err(ActionError::InvalidInput("no view is open".into()));
        };
        let files = self.mirror.selection(scope).to_vec();
        if files.is_empty() {
            return Err(ActionError::InvalidInput("no files selected".into()));
        }
        if from == *to {
            return Err(ActionError::InvalidInput(format!("files are already in {to}")));
        }
        if matches!(to, Location::Subfolder(..)) || matches!(from, Location::Subfolder(..)) {
            return Err(ActionError::Unsupported("files cannot be moved in or out of subfolders".into()));
        }
        if let Some(category) = to.counted_category() {
            validate_category_name(category).map_err(ActionError::invalid)?;
        }

        for name in &files {
            self.mirror.hide(name, &from);
        }

        let total = files.len();
        let mut outcome = BatchOutcome::default();
        let mut issued = Vec::new();
        let mut refresh_source = false;
        let mut refresh_categories = false;

        for (index, name) in files.iter().enumerate() {
            let result = match self.issue_move(name, &from, to).await {
                Ok(()) => {
                    self.pending
                        .push(PendingMove::new(name.as_str(), from.clone(), to.clone(), PendingKind::Move));
                    if from == Location::Unsorted {
                        self.note_departure(name);
                    }
                    issued.push(name.clone());
                    Ok(())
                }
                Err(e) => {
                    self.mirror.unhide(name, &from);
                    match e {
                        StoreError::NotFound(_) => refresh_source = true,
                        StoreError::TargetDeleted(_) => refresh_categories = true,
                        _ => {}
                    }
                    Err(ActionError::from(e))
                }
            };
            if let Some(report) = progress.as_mut() {
                report(&BatchProgress {
                    index,
                    total,
                    file_name: name.clone(),
                    error: result.as_ref().err().cloned(),
                });
            }
            outcome.record(name, result);
        }

        self.mirror.selection_mut(scope).clear();
        if !issued.is_empty() {
            self.scheduler.schedule(Check::Batch {
                from: from.clone(),
                to: to.clone(),
                files: issued,
            });
        }

        let mut work = Vec::new();
        if refresh_source {
            work.push((Refresh::Listing(from.clone()), 0));
        }
        if refresh_categories {
            work.push((Refresh::Categories, 0));
        }
        self.run_refreshes(work).await;

        self.report_batch("Moved", &outcome, to.owning_category());
        Ok(outcome)
    }

    fn report_batch(&self, verb: &str, outcome: &BatchOutcome, scope: Option<&str>) {
        let (level, message) = match (outcome.success_count, outcome.fail_count) {
            (ok, 0) => (LogLevel::Success, format!("{verb} {ok} file(s)")),
            (0, failed) => (LogLevel::Error, format!("{verb} no files, {failed} failed")),
            (ok, failed) => (LogLevel::Warning, format!("{verb} {ok} file(s), {failed} failed")),
        };
        let code = outcome.failures.first().map(|(_, e)| e.code());
        self.log.log_with_code(level, &message, scope, code);
    }

    // ---- renames ----

    async fn rename_one(&mut self, location: &Location, old: &str, new: &str) -> Result<String, ActionError> {
        validate_file_name(new).map_err(ActionError::invalid)?;
        if !self.mirror.contains(location, old) || self.mirror.is_hidden(old, location) {
            return Err(ActionError::NotInLocation {
                name: old.to_string(),
                location: location.clone(),
            });
        }
        let final_name = final_file_name(old, new);
        if final_name == old {
            return Err(ActionError::InvalidInput(format!("'{old}' would keep its name")));
        }
        if self.mirror.contains(location, &final_name) {
            return Err(StoreError::Conflict(format!("'{final_name}' already exists in {location}")).into());
        }

        match location {
            Location::Unsorted => match self.store.rename_file(old, new).await {
                Ok(renamed) => {
                    self.mirror.rename_entry(location, old, &renamed);
                    self.note_departure(old);
                    Ok(renamed)
                }
                Err(e) => {
                    self.after_move_failure(&e, location).await;
                    Err(e.into())
                }
            },
            Location::Category(category) => self.rename_in_category(category, old, new, &final_name).await,
            Location::Subfolder(..) => Err(ActionError::Unsupported("files in subfolders cannot be renamed".into())),
        }
    }

    /// The store renames only unsorted files, so a category file takes a
    /// round trip through the unsorted area. Intermediate notifications are
    /// consumed as rename steps.
    async fn rename_in_category(
        &mut self,
        category: &str,
        old: &str,
        new: &str,
        expected: &str,
    ) -> Result<String, ActionError> {
        let location = Location::category(category);
        if self.mirror.contains(&Location::Unsorted, expected) {
            return Err(StoreError::Conflict(format!("'{expected}' already exists in the unsorted area")).into());
        }

        self.pending.push(PendingMove::new(
            old,
            location.clone(),
            Location::Unsorted,
            PendingKind::RenameStep,
        ));
        self.pending.push(PendingMove::new(
            expected,
            Location::Unsorted,
            location.clone(),
            PendingKind::RenameStep,
        ));
        self.scheduler.schedule(Check::Rename {
            location: location.clone(),
            old: old.to_string(),
            new: expected.to_string(),
        });

        if let Err(e) = self.store.move_to_unsorted(old, category).await {
            self.after_move_failure(&e, &location).await;
            return Err(e.into());
        }
        // from here on the old name's arrival echo may come late
        self.note_departure(old);

        let renamed = match self.store.rename_file(old, new).await {
            Ok(renamed) => renamed,
            Err(e) => {
                if let Err(back) = self.store.move_to_category(old, category).await {
                    tracing::warn!(file = %old, %category, error = %back, "rollback after failed rename failed");
                    self.run_refreshes(vec![
                        (Refresh::Listing(Location::Unsorted), 0),
                        (Refresh::Listing(location.clone()), 0),
                    ])
                    .await;
                }
                return Err(e.into());
            }
        };
        if renamed != expected {
            for pending in self.pending.iter_mut() {
                if pending.kind == PendingKind::RenameStep && pending.file_name == expected {
                    pending.file_name = renamed.clone();
                }
            }
        }

        if let Err(e) = self.store.move_to_category(&renamed, category).await {
            tracing::warn!(file = %renamed, %category, error = %e, "renamed file stranded in unsorted area");
            self.run_refreshes(vec![
                (Refresh::Listing(Location::Unsorted), 0),
                (Refresh::Listing(location.clone()), 0),
                (Refresh::Categories, 0),
            ])
            .await;
            return Err(e.into());
        }

        self.note_departure(&renamed);
        self.mirror.rename_entry(&location, old, &renamed);
        Ok(renamed)
    }

    /// Renames one file. Returns the final name.
    pub async fn request_rename(&mut self, location: &Location, old: &str, new: &str) -> Result<String, ActionError> {
        match self.rename_one(location, old, new).await {
            Ok(renamed) => {
                self.log.log(
                    LogLevel::Success,
                    &format!("Renamed {old} → {renamed}"),
                    location.owning_category(),
                );
                Ok(renamed)
            }
            Err(e) => {
                self.surface(&e, &format!("Could not rename {old}"), location.owning_category());
                Err(e)
            }
        }
    }

    /// Renames every selected file of `scope` with `pattern`.
    pub async fn request_batch_rename(
        &mut self,
        scope: SelectionScope,
        pattern: &RenamePattern,
        mut progress: Option<ProgressFn>,
    ) -> Result<BatchOutcome, ActionError> {
        let Some(location) = self.mirror.location_of_scope(scope) else {
            return Err(ActionError::InvalidInput("no view is open".into()));
        };
        if pattern.is_empty() {
            return Err(ActionError::InvalidInput("rename pattern has no text".into()));
        }
        if matches!(location, Location::Subfolder(..)) {
            return Err(ActionError::Unsupported("files in subfolders cannot be renamed".into()));
        }
        let files = self.mirror.selection(scope).to_vec();
        if files.is_empty() {
            return Err(ActionError::InvalidInput("no files selected".into()));
        }

        let total = files.len();
        let mut outcome = BatchOutcome::default();
        for (index, name) in files.iter().enumerate() {
            let new_name = pattern.apply(name);
            let result = if new_name == *name {
                Err(ActionError::InvalidInput(format!("'{name}' would keep its name")))
            } else {
                self.rename_one(&location, name, &new_name).await.map(|_| ())
            };
            if let Some(report) = progress.as_mut() {
                report(&BatchProgress {
                    index,
                    total,
                    file_name: name.clone(),
                    error: result.as_ref().err().cloned(),
                });
            }
            outcome.record(name, result);
        }

        self.mirror.selection_mut(scope).clear();
        self.report_batch("Renamed", &outcome, location.owning_category());
        Ok(outcome)
    }

    // ---- categories ----

    pub async fn create_category(&mut self, name: &str) -> Result<(), ActionError> {
        let result = self.create_category_inner(name).await;
        match &result {
            Ok(()) => {
                self.log
                    .log(LogLevel::Success, &format!("Created category {}", name.trim()), Some(name.trim()));
            }
            Err(e) => self.surface(e, "Could not create category", Some(name)),
        }
        result
    }

    async fn create_category_inner(&mut self, name: &str) -> Result<(), ActionError> {
        validate_category_name(name).map_err(ActionError::invalid)?;
        let name = name.trim();
        if self.mirror.has_category(name) {
            return Err(StoreError::Conflict(format!("category '{name}' already exists")).into());
        }
        self.store.create_category(name).await?;
        self.run_refreshes(vec![(Refresh::Categories, 0)]).await;
        Ok(())
    }

    /// Server-side the category's files return to the unsorted area.
    pub async fn delete_category(&mut self, name: &str) -> Result<(), ActionError> {
        if !self.mirror.has_category(name) {
            let e = ActionError::UnknownCategory(name.to_string());
            self.surface(&e, "Could not delete category", Some(name));
            return Err(e);
        }
        if let Err(e) = self.store.delete_category(name).await {
            let e = ActionError::from(e);
            self.surface(&e, "Could not delete category", Some(name));
            self.run_refreshes(vec![(Refresh::Categories, 0)]).await;
            return Err(e);
        }

        self.mirror.remove_category(name);
        self.run_refreshes(vec![(Refresh::Listing(Location::Unsorted), 0), (Refresh::Categories, 0)])
            .await;
        self.log.log(
            LogLevel::Success,
            &format!("Deleted category {name}; its files are back in the unsorted area"),
            Some(name),
        );
        Ok(())
    }

    pub async fn rename_category(&mut self, old: &str, new: &str) -> Result<(), ActionError> {
        let result = self.rename_category_inner(old, new).await;
        match &result {
            Ok(()) => {
                self.log
                    .log(LogLevel::Success, &format!("Renamed category {old} → {}", new.trim()), Some(new.trim()));
            }
            Err(e) => self.surface(e, "Could not rename category", Some(old)),
        }
        result
    }

    async fn rename_category_inner(&mut self, old: &str, new: &str) -> Result<(), ActionError> {
        validate_category_name(new).map_err(ActionError::invalid)?;
        let new = new.trim();
        if !self.mirror.has_category(old) {
            return Err(ActionError::UnknownCategory(old.to_string()));
        }
        if old == new {
            return Err(ActionError::InvalidInput(format!("category is already called '{new}'")));
        }
        if self.mirror.has_category(new) {
            return Err(StoreError::Conflict(format!("category '{new}' already exists")).into());
        }

        self.store.rename_category(old, new).await?;

        self.mirror.rename_category(old, new);
        for pending in self.pending.iter_mut() {
            pending.from.retarget(old, new);
            pending.to.retarget(old, new);
        }
        self.scheduler.retarget_category(old, new);
        for rule in self.rules.iter_mut().filter(|r| r.category == old) {
            rule.category = new.to_string();
        }
        Ok(())
    }

    pub async fn rename_subfolder(&mut self, category: &str, old: &str, new: &str) -> Result<(), ActionError> {
        let result = self.rename_subfolder_inner(category, old, new).await;
        match &result {
            Ok(()) => {
                self.log.log(
                    LogLevel::Success,
                    &format!("Renamed folder {category}/{old} → {}", new.trim()),
                    Some(category),
                );
            }
            Err(e) => self.surface(e, "Could not rename folder", Some(category)),
        }
        result
    }

    async fn rename_subfolder_inner(&mut self, category: &str, old: &str, new: &str) -> Result<(), ActionError> {
        validate_subfolder_name(new).map_err(ActionError::invalid)?;
        let new = new.trim();
        if !self.mirror.has_category(category) {
            return Err(ActionError::UnknownCategory(category.to_string()));
        }
        self.store.rename_subfolder(category, old, new).await?;
        self.mirror.rename_subfolder(category, old, new);
        self.run_refreshes(vec![(Refresh::Listing(Location::category(category)), 0)])
            .await;
        Ok(())
    }

    /// Asks the server to recreate the unsorted folder; the resulting
    /// notification refreshes the listing.
    pub async fn create_unsorted_folder(&mut self) -> Result<(), ActionError> {
        if let Err(e) = self.store.create_unsorted_folder().await {
            let e = ActionError::from(e);
            self.surface(&e, "Could not create the unsorted folder", None);
            return Err(e);
        }
        if let Some(status) = self.folder_status.as_mut() {
            status.download_folder = true;
        }
        Ok(())
    }

    // ---- auto-sort ----

    /// Applies the rules to every visible unsorted file. Rules pointing at a
    /// category that no longer exists are skipped, not attempted.
    pub async fn apply_auto_sort(&mut self) -> AutoSortReport {
        let candidates: Vec<(String, String)> = self
            .mirror
            .visible(&Location::Unsorted)
            .into_iter()
            .filter_map(|file| match_rule(&self.rules, &file.name).map(|rule| (file.name.clone(), rule.category.clone())))
            .collect();

        let mut report = AutoSortReport::default();
        for (name, category) in candidates {
            if !self.mirror.has_category(&category) {
                tracing::info!(file = %name, %category, "auto-sort rule targets a missing category");
                report.skipped += 1;
                continue;
            }
            match self
                .move_one(&name, &Location::Unsorted, &Location::category(&category))
                .await
            {
                Ok(()) => report.moved += 1,
                Err(e) => {
                    tracing::warn!(file = %name, %category, error = %e, "auto-sort move failed");
                    report.failed += 1;
                }
            }
        }

        let (level, message) = match report {
            AutoSortReport { moved: 0, skipped: 0, failed: 0 } => (LogLevel::Info, "No files to sort".to_string()),
            AutoSortReport { moved, skipped: 0, failed: 0 } => (LogLevel::Success, format!("Auto-sorted {moved} file(s)")),
            AutoSortReport { moved, skipped, failed: 0 } => (
                LogLevel::Warning,
                format!("Auto-sorted {moved} file(s), skipped {skipped} for deleted categories"),
            ),
            AutoSortReport { moved, skipped, failed } => (
                LogLevel::Warning,
                format!("Auto-sorted {moved} file(s), skipped {skipped}, {failed} failed"),
            ),
        };
        self.log.log(level, &message, None);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{self, NotificationChannel};
    use crate::store::MemoryStore;
    use std::sync::Arc;

    async fn setup(store: MemoryStore) -> (Coordinator<Arc<MemoryStore>>, Arc<MemoryStore>, NotificationChannel) {
        let store = Arc::new(store);
        let (tx, rx) = notification::channel();
        store.connect(tx);
        let mut coordinator = Coordinator::new(store.clone(), CoordinatorSettings::default(), LogManager::new(100));
        coordinator.load().await.unwrap();
        (coordinator, store, rx)
    }

    async fn drain(coordinator: &mut Coordinator<Arc<MemoryStore>>, rx: &mut NotificationChannel) {
        while let Some(notification) = rx.try_recv() {
            coordinator.handle_notification(notification).await;
        }
    }

    #[tokio::test]
    async fn test_move_hides_then_confirms() {
        let (mut c, _store, mut rx) =
            setup(MemoryStore::new().with_category("Trips", &[]).with_unsorted(&["a.jpg", "b.jpg"])).await;

        c.request_move("a.jpg", &Location::Unsorted, &Location::category("Trips"))
            .await
            .unwrap();
        assert!(c.unsorted_view().files.iter().all(|f| f.name != "a.jpg"));
        assert_eq!(c.mirror().category("Trips").unwrap().file_count, 0);
        assert_eq!(c.pending().len(), 1);

        drain(&mut c, &mut rx).await;
        assert!(c.pending().is_empty());
        assert!(!c.mirror().contains(&Location::Unsorted, "a.jpg"));
        assert_eq!(c.mirror().category("Trips").unwrap().file_count, 1);
    }

    #[tokio::test]
    async fn test_rejected_move_leaves_file_visible() {
        let (mut c, store, _rx) =
            setup(MemoryStore::new().with_category("Trips", &[]).with_unsorted(&["a.jpg"])).await;
        store.fail_file("a.jpg", StoreError::ServerError("disk full".into()));

        let err = c
            .request_move("a.jpg", &Location::Unsorted, &Location::category("Trips"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::error_codes::ERR_SERVER);
        assert_eq!(c.unsorted_view().files.len(), 1);
        assert_eq!(c.log().latest().unwrap().level, LogLevel::Error);
    }

    #[tokio::test]
    async fn test_target_deleted_refreshes_categories() {
        let (mut c, store, _rx) = setup(
            MemoryStore::new()
                .with_category("Work", &[])
                .with_category("Trips", &[])
                .with_unsorted(&["a.jpg"]),
        )
        .await;
        store.delete_category("Work").await.unwrap();

        let err = c
            .request_move("a.jpg", &Location::Unsorted, &Location::category("Work"))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Store(StoreError::TargetDeleted(_))));
        assert!(!c.mirror().has_category("Work"));
        assert!(c.mirror().contains(&Location::Unsorted, "a.jpg"));
        assert!(!c.mirror().is_hidden("a.jpg", &Location::Unsorted));
    }

    #[tokio::test]
    async fn test_subfolder_moves_are_unsupported() {
        let (mut c, _store, _rx) = setup(MemoryStore::new().with_unsorted(&["a.jpg"])).await;
        let err = c
            .request_move("a.jpg", &Location::Unsorted, &Location::subfolder("Trips", "2024"))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_auto_sort_arrival() {
        let (mut c, store, mut rx) = setup(MemoryStore::new().with_category("Games", &[])).await;
        c.set_rules(vec![AutoSortRule::new("game", "Games")]);

        store.arrive("My_Game_clip.mp4", 10);
        store.arrive("holiday.jpg", 10);
        drain(&mut c, &mut rx).await;
        drain(&mut c, &mut rx).await;

        assert_eq!(store.category_files("Games"), Some(vec!["My_Game_clip.mp4".to_string()]));
        assert_eq!(c.mirror().locations_of("holiday.jpg"), vec![Location::Unsorted]);
        assert!(!c.mirror().contains(&Location::Unsorted, "My_Game_clip.mp4"));
        assert_eq!(c.mirror().category("Games").unwrap().file_count, 1);
    }

    #[tokio::test]
    async fn test_apply_auto_sort_counts_skips() {
        let (mut c, _store, mut rx) = setup(
            MemoryStore::new()
                .with_category("Games", &[])
                .with_unsorted(&["game1.png", "game2.png", "screenshot.png", "other.jpg"]),
        )
        .await;
        c.set_rules(vec![
            AutoSortRule::new("game", "Games"),
            AutoSortRule::new("screenshot", "Gone"),
        ]);

        let report = c.apply_auto_sort().await;
        assert_eq!(
            report,
            AutoSortReport {
                moved: 2,
                skipped: 1,
                failed: 0
            }
        );
        drain(&mut c, &mut rx).await;
        assert_eq!(c.mirror().category("Games").unwrap().file_count, 2);
    }

    #[tokio::test]
    async fn test_rename_in_unsorted_keeps_extension() {
        let (mut c, _store, mut rx) = setup(MemoryStore::new().with_unsorted(&["beach.jpg"])).await;
        c.toggle_selection(SelectionScope::Unsorted, "beach.jpg").unwrap();

        let renamed = c
            .request_rename(&Location::Unsorted, "beach.jpg", "sunset")
            .await
            .unwrap();
        assert_eq!(renamed, "sunset.jpg");
        drain(&mut c, &mut rx).await;

        assert_eq!(c.mirror().locations_of("sunset.jpg"), vec![Location::Unsorted]);
        assert!(c.mirror().locations_of("beach.jpg").is_empty());
        assert!(c.mirror().selection(SelectionScope::Unsorted).contains("sunset.jpg"));
    }

    #[tokio::test]
    async fn test_batch_rename_counts_unchanged_names_as_failures() {
        let (mut c, _store, mut rx) = setup(MemoryStore::new().with_unsorted(&["IMG_1.jpg", "beach.jpg"])).await;
        c.select_all(SelectionScope::Unsorted);

        let pattern = RenamePattern::Replace {
            from: "IMG".into(),
            to: "trip".into(),
        };
        let outcome = c
            .request_batch_rename(SelectionScope::Unsorted, &pattern, None)
            .await
            .unwrap();
        assert_eq!(outcome.success_count, 1);
        assert_eq!(outcome.fail_count, 1);
        assert!(c.mirror().selection(SelectionScope::Unsorted).is_empty());

        drain(&mut c, &mut rx).await;
        assert!(c.mirror().contains(&Location::Unsorted, "trip_1.jpg"));
    }

    #[tokio::test]
    async fn test_create_and_rename_category_retargets_rules() {
        let (mut c, _store, _rx) = setup(MemoryStore::new()).await;
        c.create_category(" Trips ").await.unwrap();
        assert!(c.mirror().has_category("Trips"));

        c.set_rules(vec![AutoSortRule::new("beach", "Trips")]);
        c.rename_category("Trips", "Travel").await.unwrap();
        assert_eq!(c.rules()[0].category, "Travel");
        assert!(c.mirror().has_category("Travel"));

        assert!(matches!(
            c.create_category("download").await,
            Err(ActionError::InvalidInput(_))
        ));
        assert!(matches!(
            c.create_category("Travel").await,
            Err(ActionError::Store(StoreError::Conflict(_)))
        ));
    }

    #[tokio::test]
    async fn test_toggle_selection_requires_visible_file() {
        let (mut c, _store, _rx) = setup(MemoryStore::new().with_unsorted(&["a.jpg"])).await;
        assert!(c.toggle_selection(SelectionScope::Unsorted, "a.jpg").unwrap());
        assert!(matches!(
            c.toggle_selection(SelectionScope::Unsorted, "ghost.jpg"),
            Err(ActionError::NotInLocation { .. })
        ));
        assert!(matches!(
            c.toggle_selection(SelectionScope::Open, "a.jpg"),
            Err(ActionError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_select_all_honours_filter() {
        let (mut c, _store, _rx) = setup(MemoryStore::new().with_unsorted(&["a.jpg", "b.mp4", "c.png"])).await;
        c.set_view_query(ViewQuery {
            filter_type: crate::mirror::projection::TypeFilter::Image,
            ..Default::default()
        });
        c.toggle_all(SelectionScope::Unsorted);
        assert_eq!(
            c.mirror().selection(SelectionScope::Unsorted).to_vec(),
            vec!["a.jpg".to_string(), "c.png".to_string()]
        );
        c.toggle_all(SelectionScope::Unsorted);
        assert!(c.mirror().selection(SelectionScope::Unsorted).is_empty());
    }

    #[tokio::test]
    async fn test_missing_unsorted_folder_is_reported() {
        let store = MemoryStore::new().with_category("Trips", &[]).with_unsorted(&["a.jpg"]);
        store.remove_unsorted_folder();
        let (mut c, store, mut rx) = setup(store).await;

        assert!(c.unsorted_folder_missing());
        assert!(c.unsorted_view().files.is_empty());
        assert_eq!(
            c.log().latest().unwrap().code.as_deref(),
            Some(crate::error_codes::ERR_UNSORTED_FOLDER_MISSING)
        );

        c.create_unsorted_folder().await.unwrap();
        assert!(!c.unsorted_folder_missing());
        store.arrive("b.jpg", 10);
        drain(&mut c, &mut rx).await;
        assert_eq!(c.mirror().locations_of("b.jpg"), vec![Location::Unsorted]);
        assert!(c.check_folder_status().await.unwrap().download_folder);
    }
}
