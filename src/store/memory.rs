//! In-process authority that behaves like the media server: it owns the
//! files, answers every store call, and pushes the same notifications.
//!
//! Failures, lost events, duplicated events and reordering can be injected.

use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use super::{final_file_name, RemoteStore, StoreError, StoreResult};
use crate::mirror::types::{Category, CategoryContents, FileEntry, FolderStatus, Location, MediaType, Subfolder};
use crate::notification::{FileAdded, FileMoved, Notification, NotificationSender};

#[derive(Debug, Default, Clone)]
struct CategoryDir {
    files: BTreeMap<String, FileEntry>,
    subfolders: BTreeMap<String, BTreeMap<String, FileEntry>>,
}

impl CategoryDir {
    fn entry_count(&self) -> u64 {
        (self.files.len() + self.subfolders.len()) as u64
    }
}

#[derive(Debug, Default)]
struct Inner {
    unsorted: BTreeMap<String, FileEntry>,
    categories: BTreeMap<String, CategoryDir>,
    deleted: BTreeSet<String>,
    file_failures: HashMap<String, StoreError>,
    failing_listings: usize,
    unsorted_missing: bool,
    events: Option<NotificationSender>,
    suppress_events: bool,
    duplicate_events: bool,
    held: Option<Vec<Notification>>,
}

impl Inner {
    fn fail_for(&self, file: &str) -> StoreResult<()> {
        match self.file_failures.get(file) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn fail_listing(&mut self) -> StoreResult<()> {
        if self.failing_listings > 0 {
            self.failing_listings -= 1;
            return Err(StoreError::ServerError("listing unavailable".into()));
        }
        Ok(())
    }

    fn category(&self, name: &str) -> StoreResult<&CategoryDir> {
        self.categories
            .get(name)
            .ok_or_else(|| StoreError::NotFound(format!("category '{name}'")))
    }

    fn category_mut(&mut self, name: &str) -> StoreResult<&mut CategoryDir> {
        self.categories
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(format!("category '{name}'")))
    }

    /// Delivers, drops, doubles or holds notifications per the injected mode.
    fn emit(&mut self, notifications: Vec<Notification>) {
        if self.suppress_events {
            return;
        }
        let copies = if self.duplicate_events { 2 } else { 1 };
        for notification in notifications {
            for _ in 0..copies {
                match (&mut self.held, &self.events) {
                    (Some(held), _) => held.push(notification.clone()),
                    (None, Some(events)) => {
                        events.send(notification.clone());
                    }
                    (None, None) => {}
                }
            }
        }
    }
}

fn arrival(entry: &FileEntry) -> Notification {
    Notification::FileAdded(FileAdded {
        name: entry.name.clone(),
        size: entry.size,
        modified_at: entry.modified_at,
    })
}

fn moved(name: &str, from: Location, to: Location) -> Notification {
    Notification::FileMoved(FileMoved::confirmed(name, from, to))
}

fn is_media(entry: &FileEntry) -> bool {
    MediaType::from_file_name(&entry.name).is_some()
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ---- seeding ----

    pub fn with_category(self, name: &str, files: &[&str]) -> Self {
        {
            let mut state = self.state();
            let dir = state.categories.entry(name.to_string()).or_default();
            for file in files {
                dir.files.insert(file.to_string(), FileEntry::detected(*file, 1024, Utc::now()));
            }
        }
        self
    }

    pub fn with_subfolder(self, category: &str, subfolder: &str, files: &[&str]) -> Self {
        {
            let mut state = self.state();
            let dir = state.categories.entry(category.to_string()).or_default();
            let sub = dir.subfolders.entry(subfolder.to_string()).or_default();
            for file in files {
                sub.insert(file.to_string(), FileEntry::detected(*file, 1024, Utc::now()));
            }
        }
        self
    }

    pub fn with_unsorted(self, files: &[&str]) -> Self {
        {
            let mut state = self.state();
            for file in files {
                state
                    .unsorted
                    .insert(file.to_string(), FileEntry::detected(*file, 1024, Utc::now()));
            }
        }
        self
    }

    /// Routes future notifications to `sender`.
    pub fn connect(&self, sender: NotificationSender) {
        self.state().events = Some(sender);
    }

    /// A new download lands in the unsorted area and is announced.
    pub fn arrive(&self, name: &str, size: u64) {
        let mut state = self.state();
        let entry = FileEntry::detected(name, size, Utc::now());
        let note = arrival(&entry);
        state.unsorted.insert(name.to_string(), entry);
        state.emit(vec![note]);
    }

    /// Changes the authority behind the client's back, without any event.
    pub fn silently_move_to_category(&self, name: &str, category: &str) -> bool {
        let mut state = self.state();
        let Some(entry) = state.unsorted.remove(name) else {
            return false;
        };
        state
            .categories
            .entry(category.to_string())
            .or_default()
            .files
            .insert(name.to_string(), entry);
        true
    }

    // ---- fault injection ----

    /// The unsorted folder disappears from disk along with its files.
    pub fn remove_unsorted_folder(&self) {
        let mut state = self.state();
        state.unsorted.clear();
        state.unsorted_missing = true;
    }

    pub fn fail_file(&self, name: &str, error: StoreError) {
        self.state().file_failures.insert(name.to_string(), error);
    }

    pub fn clear_failure(&self, name: &str) {
        self.state().file_failures.remove(name);
    }

    /// The next `count` listing calls fail with a server error.
    pub fn fail_listings(&self, count: usize) {
        self.state().failing_listings = count;
    }

    pub fn suppress_events(&self, suppress: bool) {
        self.state().suppress_events = suppress;
    }

    pub fn duplicate_events(&self, duplicate: bool) {
        self.state().duplicate_events = duplicate;
    }

    /// Buffers notifications until [`MemoryStore::release_events`].
    pub fn hold_events(&self) {
        let mut state = self.state();
        if state.held.is_none() {
            state.held = Some(Vec::new());
        }
    }

    /// Delivers held notifications, optionally in reverse order.
    pub fn release_events(&self, reversed: bool) {
        let mut state = self.state();
        let Some(mut held) = state.held.take() else {
            return;
        };
        if reversed {
            held.reverse();
        }
        if let Some(events) = &state.events {
            for notification in held {
                events.send(notification);
            }
        }
    }

    // ---- inspection ----

    pub fn unsorted_names(&self) -> Vec<String> {
        self.state().unsorted.keys().cloned().collect()
    }

    pub fn category_files(&self, category: &str) -> Option<Vec<String>> {
        self.state()
            .categories
            .get(category)
            .map(|dir| dir.files.keys().cloned().collect())
    }

    pub fn category_names(&self) -> Vec<String> {
        self.state().categories.keys().cloned().collect()
    }

    pub fn is_deleted(&self, category: &str) -> bool {
        self.state().deleted.contains(category)
    }
}

impl RemoteStore for MemoryStore {
    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let mut state = self.state();
        state.fail_listing()?;
        Ok(state
            .categories
            .iter()
            .map(|(name, dir)| Category {
                name: name.clone(),
                file_count: dir.entry_count(),
            })
            .collect())
    }

    async fn list_unsorted(&self) -> StoreResult<Vec<FileEntry>> {
        let mut state = self.state();
        state.fail_listing()?;
        if state.unsorted_missing {
            return Err(StoreError::ServerError("download folder does not exist".into()));
        }
        Ok(state.unsorted.values().filter(|e| is_media(e)).cloned().collect())
    }

    async fn list_category_contents(&self, category: &str) -> StoreResult<CategoryContents> {
        let mut state = self.state();
        state.fail_listing()?;
        let dir = state.category(category)?;
        Ok(CategoryContents {
            files: dir.files.values().filter(|e| is_media(e)).cloned().collect(),
            subfolders: dir
                .subfolders
                .iter()
                .map(|(name, files)| Subfolder {
                    name: name.clone(),
                    file_count: files.len() as u64,
                })
                .collect(),
        })
    }

    async fn list_subfolder_contents(&self, category: &str, subfolder: &str) -> StoreResult<Vec<FileEntry>> {
        let mut state = self.state();
        state.fail_listing()?;
        let files = state
            .category(category)?
            .subfolders
            .get(subfolder)
            .ok_or_else(|| StoreError::NotFound(format!("subfolder '{category}/{subfolder}'")))?;
        Ok(files.values().filter(|e| is_media(e)).cloned().collect())
    }

    async fn move_to_category(&self, file: &str, category: &str) -> StoreResult<()> {
        let mut state = self.state();
        state.fail_for(file)?;
        if state.deleted.contains(category) {
            return Err(StoreError::TargetDeleted(format!(
                "category '{category}' was deleted"
            )));
        }
        let entry = state
            .unsorted
            .remove(file)
            .ok_or_else(|| StoreError::NotFound(format!("file '{file}'")))?;
        state
            .categories
            .entry(category.to_string())
            .or_default()
            .files
            .insert(file.to_string(), entry);
        state.emit(vec![moved(file, Location::Unsorted, Location::category(category))]);
        Ok(())
    }

    async fn move_to_unsorted(&self, file: &str, from_category: &str) -> StoreResult<()> {
        let mut state = self.state();
        state.fail_for(file)?;
        let entry = state
            .category_mut(from_category)?
            .files
            .remove(file)
            .ok_or_else(|| StoreError::NotFound(format!("file '{from_category}/{file}'")))?;
        let note = arrival(&entry);
        state.unsorted.insert(file.to_string(), entry);
        state.emit(vec![
            moved(file, Location::category(from_category), Location::Unsorted),
            note,
        ]);
        Ok(())
    }

    async fn move_between_categories(&self, file: &str, from: &str, to: &str) -> StoreResult<()> {
        let mut state = self.state();
        state.fail_for(file)?;
        let entry = state
            .category_mut(from)?
            .files
            .remove(file)
            .ok_or_else(|| StoreError::NotFound(format!("file '{from}/{file}'")))?;
        state
            .categories
            .entry(to.to_string())
            .or_default()
            .files
            .insert(file.to_string(), entry);
        state.emit(vec![moved(file, Location::category(from), Location::category(to))]);
        Ok(())
    }

    async fn create_category(&self, name: &str) -> StoreResult<()> {
        let mut state = self.state();
        state.categories.entry(name.to_string()).or_default();
        state.deleted.remove(name);
        Ok(())
    }

    async fn delete_category(&self, name: &str) -> StoreResult<()> {
        let mut state = self.state();
        let dir = state
            .categories
            .remove(name)
            .ok_or_else(|| StoreError::NotFound(format!("category '{name}'")))?;
        let mut notes = Vec::new();
        for (file, entry) in dir.files {
            notes.push(arrival(&entry));
            state.unsorted.insert(file, entry);
        }
        state.deleted.insert(name.to_string());
        state.emit(notes);
        Ok(())
    }

    async fn rename_category(&self, old: &str, new: &str) -> StoreResult<()> {
        let mut state = self.state();
        let new = new.trim();
        if new.is_empty() {
            return Err(StoreError::InvalidRequest("new category name is required".into()));
        }
        if state.categories.contains_key(new) {
            return Err(StoreError::Conflict(format!("category '{new}' already exists")));
        }
        let dir = state
            .categories
            .remove(old)
            .ok_or_else(|| StoreError::NotFound(format!("category '{old}'")))?;
        state.categories.insert(new.to_string(), dir);
        state.deleted.remove(new);
        Ok(())
    }

    async fn rename_file(&self, old: &str, new: &str) -> StoreResult<String> {
        let mut state = self.state();
        state.fail_for(old)?;
        if new.trim().is_empty() {
            return Err(StoreError::InvalidRequest("new file name is required".into()));
        }
        let final_name = final_file_name(old, new);
        if !state.unsorted.contains_key(old) {
            return Err(StoreError::NotFound(format!("file '{old}'")));
        }
        if final_name != old && state.unsorted.contains_key(&final_name) {
            return Err(StoreError::Conflict(format!("file '{final_name}' already exists")));
        }
        let Some(entry) = state.unsorted.remove(old) else {
            return Err(StoreError::NotFound(format!("file '{old}'")));
        };
        let entry = entry.with_name(final_name.clone());
        let note = arrival(&entry);
        state.unsorted.insert(final_name.clone(), entry);
        state.emit(vec![note]);
        Ok(final_name)
    }

    async fn rename_subfolder(&self, category: &str, old: &str, new: &str) -> StoreResult<()> {
        let mut state = self.state();
        let new = new.trim();
        if new.is_empty() {
            return Err(StoreError::InvalidRequest("new folder name is required".into()));
        }
        let dir = state.category_mut(category)?;
        if dir.subfolders.contains_key(new) {
            return Err(StoreError::Conflict(format!("folder '{new}' already exists")));
        }
        let files = dir
            .subfolders
            .remove(old)
            .ok_or_else(|| StoreError::NotFound(format!("subfolder '{category}/{old}'")))?;
        dir.subfolders.insert(new.to_string(), files);
        Ok(())
    }

    async fn create_unsorted_folder(&self) -> StoreResult<()> {
        let mut state = self.state();
        state.unsorted_missing = false;
        state.emit(vec![Notification::FolderCreated {
            message: "download folder created".into(),
        }]);
        Ok(())
    }

    async fn folder_status(&self) -> StoreResult<FolderStatus> {
        let state = self.state();
        Ok(FolderStatus {
            base_folder: true,
            download_folder: !state.unsorted_missing,
            categories_folder: true,
            categories: state.categories.keys().cloned().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification;

    #[tokio::test]
    async fn test_move_emits_confirmed_event() {
        let store = MemoryStore::new().with_category("Trips", &[]).with_unsorted(&["a.jpg"]);
        let (tx, mut rx) = notification::channel();
        store.connect(tx);

        store.move_to_category("a.jpg", "Trips").await.unwrap();

        assert_eq!(store.category_files("Trips"), Some(vec!["a.jpg".to_string()]));
        assert_eq!(
            rx.try_recv(),
            Some(moved("a.jpg", Location::Unsorted, Location::category("Trips")))
        );
    }

    #[tokio::test]
    async fn test_deleted_category_rejects_moves() {
        let store = MemoryStore::new()
            .with_category("Work", &["w.jpg"])
            .with_unsorted(&["a.jpg"]);
        store.delete_category("Work").await.unwrap();

        assert!(store.unsorted_names().contains(&"w.jpg".to_string()));
        assert!(matches!(
            store.move_to_category("a.jpg", "Work").await,
            Err(StoreError::TargetDeleted(_))
        ));

        store.create_category("Work").await.unwrap();
        assert!(!store.is_deleted("Work"));
        store.move_to_category("a.jpg", "Work").await.unwrap();
    }

    #[tokio::test]
    async fn test_rename_conflict_and_extension() {
        let store = MemoryStore::new().with_unsorted(&["a.jpg", "b.jpg"]);
        assert!(matches!(
            store.rename_file("a.jpg", "b").await,
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(store.rename_file("a.jpg", "c").await.unwrap(), "c.jpg");
        assert!(matches!(
            store.rename_file("missing.jpg", "x").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let store = MemoryStore::new().with_category("Trips", &[]).with_unsorted(&["a.jpg", "b.jpg"]);
        let (tx, mut rx) = notification::channel();
        store.connect(tx);

        store.fail_file("a.jpg", StoreError::ServerError("disk full".into()));
        assert!(store.move_to_category("a.jpg", "Trips").await.is_err());

        store.fail_listings(1);
        assert!(store.list_unsorted().await.is_err());
        assert_eq!(store.list_unsorted().await.unwrap().len(), 2);

        store.suppress_events(true);
        store.move_to_category("b.jpg", "Trips").await.unwrap();
        assert_eq!(rx.try_recv(), None);
    }

    #[tokio::test]
    async fn test_missing_unsorted_folder() {
        let store = MemoryStore::new().with_category("Trips", &[]).with_unsorted(&["a.jpg"]);
        store.remove_unsorted_folder();

        let status = store.folder_status().await.unwrap();
        assert!(!status.download_folder);
        assert_eq!(status.categories, vec!["Trips"]);
        assert!(store.list_unsorted().await.is_err());

        store.create_unsorted_folder().await.unwrap();
        assert!(store.folder_status().await.unwrap().download_folder);
        assert!(store.list_unsorted().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_counts_include_subfolders() {
        let store = MemoryStore::new()
            .with_category("Trips", &["t.jpg"])
            .with_subfolder("Trips", "2024", &["s.jpg"]);
        let categories = store.list_categories().await.unwrap();
        assert_eq!(categories[0].file_count, 2);

        let contents = store.list_category_contents("Trips").await.unwrap();
        assert_eq!(contents.entry_count(), 2);
    }
}
