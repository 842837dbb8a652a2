use std::collections::{HashMap, HashSet};

use super::selection::{SelectionScope, SelectionSet, SelectionSnapshot};
use super::types::{Category, CategoryContents, FileEntry, Location, Subfolder};
use crate::notification::{FileAdded, FileMoved};

/// Store work a Mirror update cannot do by itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Followup {
    /// A viewed listing should contain `name` but the Mirror has no metadata for it.
    FetchEntry { location: Location, name: String },
    /// Re-derive a category's `file_count` from its contents.
    ReconcileCount(String),
    RefreshCategories,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveApplied {
    Unconfirmed,
    SameLocation,
    /// Already at the target: a repeated delivery.
    Duplicate,
    /// Not at the source: the structural move was skipped.
    Stale,
    Applied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveReport {
    pub applied: MoveApplied,
    pub followups: Vec<Followup>,
}

impl MoveReport {
    fn bare(applied: MoveApplied) -> Self {
        Self {
            applied,
            followups: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// A file the Mirror had never seen.
    Inserted,
    /// The name is listed elsewhere. Nothing changed; only a fresh unsorted
    /// listing can tell a real return from a late or repeated arrival.
    KnownElsewhere(Location),
    AlreadyPresent,
}

/// Client-side copy of what files exist where.
///
/// The unsorted listing is always loaded. Category and subfolder listings are
/// cached once fetched and kept current by notifications afterwards.
#[derive(Debug, Default)]
pub struct Mirror {
    categories: Vec<Category>,
    unsorted: Vec<FileEntry>,
    listings: HashMap<Location, Vec<FileEntry>>,
    subfolders: HashMap<String, Vec<Subfolder>>,
    hidden: HashSet<(String, Location)>,
    open: Option<Location>,
    unsorted_selection: SelectionSet,
    open_selection: SelectionSet,
}

impl Mirror {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- reads ----

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category(&self, name: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn has_category(&self, name: &str) -> bool {
        self.category(name).is_some()
    }

    pub fn unsorted(&self) -> &[FileEntry] {
        &self.unsorted
    }

    pub fn listing(&self, location: &Location) -> Option<&[FileEntry]> {
        match location {
            Location::Unsorted => Some(&self.unsorted),
            other => self.listings.get(other).map(Vec::as_slice),
        }
    }

    pub fn subfolders(&self, category: &str) -> Option<&[Subfolder]> {
        self.subfolders.get(category).map(Vec::as_slice)
    }

    pub fn is_loaded(&self, location: &Location) -> bool {
        self.listing(location).is_some()
    }

    pub fn entry(&self, location: &Location, name: &str) -> Option<&FileEntry> {
        self.listing(location)?.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, location: &Location, name: &str) -> bool {
        self.entry(location, name).is_some()
    }

    /// Every loaded location listing `name`. More than one means the Mirror is
    /// inconsistent.
    pub fn locations_of(&self, name: &str) -> Vec<Location> {
        let mut found = Vec::new();
        if self.contains(&Location::Unsorted, name) {
            found.push(Location::Unsorted);
        }
        for (location, files) in &self.listings {
            if files.iter().any(|f| f.name == name) {
                found.push(location.clone());
            }
        }
        found.sort();
        found
    }

    /// Entries of a listing minus the optimistically hidden ones.
    pub fn visible(&self, location: &Location) -> Vec<&FileEntry> {
        self.listing(location)
            .map(|files| {
                files
                    .iter()
                    .filter(|f| !self.is_hidden(&f.name, location))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn open_location(&self) -> Option<&Location> {
        self.open.as_ref()
    }

    /// Unsorted is always on screen; the open view is the other visible listing.
    pub fn is_viewed(&self, location: &Location) -> bool {
        *location == Location::Unsorted || self.open.as_ref() == Some(location)
    }

    // ---- views and selection ----

    /// Switching to a different view starts its selection from scratch.
    pub fn open_view(&mut self, location: Location) {
        if self.open.as_ref() != Some(&location) {
            self.open_selection.clear();
        }
        self.open = Some(location);
        self.prune_scope(SelectionScope::Open);
    }

    pub fn close_view(&mut self) {
        self.open = None;
        self.open_selection.clear();
    }

    pub fn scope_of(&self, location: &Location) -> Option<SelectionScope> {
        if *location == Location::Unsorted {
            Some(SelectionScope::Unsorted)
        } else if self.open.as_ref() == Some(location) {
            Some(SelectionScope::Open)
        } else {
            None
        }
    }

    pub fn location_of_scope(&self, scope: SelectionScope) -> Option<Location> {
        match scope {
            SelectionScope::Unsorted => Some(Location::Unsorted),
            SelectionScope::Open => self.open.clone(),
        }
    }

    pub fn selection(&self, scope: SelectionScope) -> &SelectionSet {
        match scope {
            SelectionScope::Unsorted => &self.unsorted_selection,
            SelectionScope::Open => &self.open_selection,
        }
    }

    pub fn selection_mut(&mut self, scope: SelectionScope) -> &mut SelectionSet {
        match scope {
            SelectionScope::Unsorted => &mut self.unsorted_selection,
            SelectionScope::Open => &mut self.open_selection,
        }
    }

    pub fn selection_snapshot(&self) -> SelectionSnapshot {
        SelectionSnapshot {
            unsorted: self.unsorted_selection.to_vec(),
            open: self.open_selection.to_vec(),
        }
    }

    /// Drops selected names that are no longer visible in the scope's listing.
    pub fn prune_scope(&mut self, scope: SelectionScope) -> usize {
        let current: Vec<String> = match self.location_of_scope(scope) {
            Some(location) => self.visible(&location).into_iter().map(|f| f.name.clone()).collect(),
            None => Vec::new(),
        };
        self.selection_mut(scope)
            .prune_missing(current.iter().map(String::as_str))
    }

    fn prune_location(&mut self, location: &Location) {
        if let Some(scope) = self.scope_of(location) {
            self.prune_scope(scope);
        }
    }

    // ---- optimistic hide ----

    /// Hides a file at `location`. Only files actually listed there can be hidden.
    pub fn hide(&mut self, name: &str, location: &Location) -> bool {
        if !self.contains(location, name) {
            return false;
        }
        let inserted = self.hidden.insert((name.to_string(), location.clone()));
        self.prune_location(location);
        inserted
    }

    pub fn unhide(&mut self, name: &str, location: &Location) -> bool {
        self.hidden.remove(&(name.to_string(), location.clone()))
    }

    pub fn is_hidden(&self, name: &str, location: &Location) -> bool {
        self.hidden.contains(&(name.to_string(), location.clone()))
    }

    pub fn hidden_at(&self, location: &Location) -> Vec<String> {
        self.hidden
            .iter()
            .filter(|(_, at)| at == location)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn hidden_count(&self) -> usize {
        self.hidden.len()
    }

    // ---- authoritative replacements ----

    /// Installs the server's category list. Cached listings of categories that
    /// no longer exist are dropped.
    pub fn replace_categories(&mut self, categories: Vec<Category>) {
        let gone: Vec<String> = self
            .categories
            .iter()
            .filter(|old| !categories.iter().any(|c| c.name == old.name))
            .map(|c| c.name.clone())
            .collect();
        self.categories = categories;
        for name in gone {
            self.forget_category(&name);
        }
    }

    pub fn replace_unsorted(&mut self, files: Vec<FileEntry>) {
        self.install_listing(Location::Unsorted, files);
    }

    /// Installs a fresh category listing and sets its count from it.
    pub fn replace_category_contents(&mut self, category: &str, contents: CategoryContents) {
        let count = contents.entry_count();
        self.install_listing(Location::category(category), contents.files);
        self.subfolders.insert(category.to_string(), contents.subfolders);
        self.set_category_count(category, count);
    }

    pub fn replace_subfolder_contents(&mut self, category: &str, subfolder: &str, files: Vec<FileEntry>) {
        self.install_listing(Location::subfolder(category, subfolder), files);
    }

    /// A fresh listing wins over whatever the Mirror believed: its names are
    /// evicted from every other location so no file is listed twice.
    fn install_listing(&mut self, location: Location, files: Vec<FileEntry>) {
        let names: HashSet<&str> = files.iter().map(|f| f.name.as_str()).collect();

        let mut evicted: Vec<(Location, String)> = Vec::new();
        if location != Location::Unsorted {
            self.unsorted.retain(|f| {
                let keep = !names.contains(f.name.as_str());
                if !keep {
                    evicted.push((Location::Unsorted, f.name.clone()));
                }
                keep
            });
        }
        for (other, listing) in self.listings.iter_mut() {
            if *other == location {
                continue;
            }
            listing.retain(|f| {
                let keep = !names.contains(f.name.as_str());
                if !keep {
                    evicted.push((other.clone(), f.name.clone()));
                }
                keep
            });
        }

        self.hidden
            .retain(|(name, at)| *at != location || names.contains(name.as_str()));

        match location {
            Location::Unsorted => self.unsorted = files,
            ref other => {
                self.listings.insert(other.clone(), files);
            }
        }

        for (from, name) in &evicted {
            tracing::debug!(file = %name, %from, to = %location, "evicted by fresh listing");
            self.hidden.remove(&(name.clone(), from.clone()));
            if let Some(category) = from.counted_category() {
                let category = category.to_string();
                self.bump_category_count(&category, -1);
            }
        }

        self.prune_location(&location);
        let touched: HashSet<Location> = evicted.into_iter().map(|(from, _)| from).collect();
        for from in touched {
            self.prune_location(&from);
        }
    }

    // ---- counts ----

    /// Adjusts a category count, saturating at zero. False if the category is unknown.
    pub fn bump_category_count(&mut self, category: &str, delta: i64) -> bool {
        match self.categories.iter_mut().find(|c| c.name == category) {
            Some(c) => {
                c.file_count = if delta.is_negative() {
                    c.file_count.saturating_sub(delta.unsigned_abs())
                } else {
                    c.file_count.saturating_add(delta as u64)
                };
                true
            }
            None => false,
        }
    }

    /// Overwrites a known category's count. Unknown categories are never created.
    pub fn set_category_count(&mut self, category: &str, count: u64) -> bool {
        match self.categories.iter_mut().find(|c| c.name == category) {
            Some(c) => {
                c.file_count = count;
                true
            }
            None => false,
        }
    }

    // ---- notifications ----

    pub fn apply_file_moved(&mut self, event: &FileMoved) -> MoveReport {
        if !event.confirmed {
            return MoveReport::bare(MoveApplied::Unconfirmed);
        }
        if event.from == event.to {
            return MoveReport::bare(MoveApplied::SameLocation);
        }

        let mut followups = Vec::new();
        let target_unknown = event
            .to
            .counted_category()
            .is_some_and(|name| !self.has_category(name));
        if target_unknown {
            if let Some(name) = event.to.counted_category() {
                followups.push(Followup::ReconcileCount(name.to_string()));
            }
            followups.push(Followup::RefreshCategories);
        }

        let Some(entry) = self.take_entry(&event.from, &event.name) else {
            if self.contains(&event.to, &event.name) {
                return MoveReport {
                    applied: MoveApplied::Duplicate,
                    followups,
                };
            }
            if self.is_viewed(&event.to) {
                followups.push(Followup::FetchEntry {
                    location: event.to.clone(),
                    name: event.name.clone(),
                });
            }
            for endpoint in [&event.from, &event.to] {
                if let Some(name) = endpoint.counted_category() {
                    let reconcile = Followup::ReconcileCount(name.to_string());
                    if !followups.contains(&reconcile) {
                        followups.push(reconcile);
                    }
                }
            }
            return MoveReport {
                applied: MoveApplied::Stale,
                followups,
            };
        };

        self.insert_entry(&event.to, entry);
        if let Some(name) = event.from.counted_category() {
            let name = name.to_string();
            self.bump_category_count(&name, -1);
        }
        if let Some(name) = event.to.counted_category() {
            let name = name.to_string();
            self.bump_category_count(&name, 1);
        }
        self.prune_location(&event.from);

        MoveReport {
            applied: MoveApplied::Applied,
            followups,
        }
    }

    /// A newly detected file in the unsorted area. Idempotent, and never moves
    /// a file the Mirror lists somewhere else.
    pub fn apply_file_added(&mut self, event: &FileAdded) -> AddOutcome {
        if self.contains(&Location::Unsorted, &event.name) {
            return AddOutcome::AlreadyPresent;
        }
        if let Some(elsewhere) = self.locations_of(&event.name).into_iter().next() {
            return AddOutcome::KnownElsewhere(elsewhere);
        }

        self.unsorted
            .push(FileEntry::detected(&event.name, event.size, event.modified_at));
        AddOutcome::Inserted
    }

    // ---- local edits confirmed by the store ----

    /// Renames an entry in place. The count is unchanged.
    pub fn rename_entry(&mut self, location: &Location, old: &str, new: &str) -> bool {
        if old == new {
            return self.contains(location, old);
        }
        let Some(listing) = self.listing_mut(location) else {
            return false;
        };
        if !listing.iter().any(|f| f.name == old) {
            return false;
        }
        listing.retain(|f| f.name != new);
        for entry in listing.iter_mut().filter(|f| f.name == old) {
            entry.name = new.to_string();
        }

        if self.hidden.remove(&(old.to_string(), location.clone())) {
            self.hidden.insert((new.to_string(), location.clone()));
        }
        if let Some(scope) = self.scope_of(location) {
            self.selection_mut(scope).rename(old, new);
        }
        true
    }

    /// Forgets a deleted category, its cached listings, and its open view.
    pub fn remove_category(&mut self, name: &str) -> bool {
        let before = self.categories.len();
        self.categories.retain(|c| c.name != name);
        self.forget_category(name);
        before != self.categories.len()
    }

    fn forget_category(&mut self, name: &str) {
        self.listings.retain(|location, _| location.owning_category() != Some(name));
        self.subfolders.remove(name);
        self.hidden
            .retain(|(_, location)| location.owning_category() != Some(name));
        if self.open.as_ref().and_then(Location::owning_category) == Some(name) {
            self.close_view();
        }
    }

    /// Retargets every reference from `old` to `new`.
    pub fn rename_category(&mut self, old: &str, new: &str) -> bool {
        let Some(category) = self.categories.iter_mut().find(|c| c.name == old) else {
            return false;
        };
        category.name = new.to_string();

        let keys: Vec<Location> = self
            .listings
            .keys()
            .filter(|location| location.owning_category() == Some(old))
            .cloned()
            .collect();
        for key in keys {
            if let Some(files) = self.listings.remove(&key) {
                let mut renamed = key;
                renamed.retarget(old, new);
                self.listings.insert(renamed, files);
            }
        }

        if let Some(subfolders) = self.subfolders.remove(old) {
            self.subfolders.insert(new.to_string(), subfolders);
        }

        self.hidden = self
            .hidden
            .drain()
            .map(|(name, mut location)| {
                location.retarget(old, new);
                (name, location)
            })
            .collect();

        if let Some(open) = self.open.as_mut() {
            open.retarget(old, new);
        }
        true
    }

    pub fn rename_subfolder(&mut self, category: &str, old: &str, new: &str) -> bool {
        let Some(subfolder) = self
            .subfolders
            .get_mut(category)
            .and_then(|subs| subs.iter_mut().find(|s| s.name == old))
        else {
            return false;
        };
        subfolder.name = new.to_string();

        let old_location = Location::subfolder(category, old);
        let new_location = Location::subfolder(category, new);
        if let Some(files) = self.listings.remove(&old_location) {
            self.listings.insert(new_location.clone(), files);
        }
        self.hidden = self
            .hidden
            .drain()
            .map(|(name, location)| {
                if location == old_location {
                    (name, new_location.clone())
                } else {
                    (name, location)
                }
            })
            .collect();
        if self.open.as_ref() == Some(&old_location) {
            self.open = Some(new_location);
        }
        true
    }

    // ---- internals ----

    fn listing_mut(&mut self, location: &Location) -> Option<&mut Vec<FileEntry>> {
        match location {
            Location::Unsorted => Some(&mut self.unsorted),
            other => self.listings.get_mut(other),
        }
    }

    fn take_entry(&mut self, location: &Location, name: &str) -> Option<FileEntry> {
        let listing = self.listing_mut(location)?;
        let index = listing.iter().position(|f| f.name == name)?;
        let entry = listing.remove(index);
        self.hidden.remove(&(name.to_string(), location.clone()));
        Some(entry)
    }

    fn insert_entry(&mut self, location: &Location, entry: FileEntry) -> bool {
        match self.listing_mut(location) {
            Some(listing) if !listing.iter().any(|f| f.name == entry.name) => {
                listing.push(entry);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn file(name: &str) -> FileEntry {
        FileEntry::detected(name, 10, Utc::now())
    }

    fn cat(name: &str, file_count: u64) -> Category {
        Category {
            name: name.to_string(),
            file_count,
        }
    }

    fn trips() -> Location {
        Location::category("Trips")
    }

    fn seeded() -> Mirror {
        let mut mirror = Mirror::new();
        mirror.replace_categories(vec![cat("Trips", 0), cat("Work", 1)]);
        mirror.replace_unsorted(vec![file("a.jpg"), file("b.png"), file("c.mp4")]);
        mirror
    }

    #[test]
    fn test_confirmed_move_updates_listing_and_counts() {
        let mut mirror = seeded();
        let report = mirror.apply_file_moved(&FileMoved::confirmed("a.jpg", Location::Unsorted, trips()));

        assert_eq!(report.applied, MoveApplied::Applied);
        assert!(report.followups.is_empty());
        assert!(!mirror.contains(&Location::Unsorted, "a.jpg"));
        assert_eq!(mirror.category("Trips").unwrap().file_count, 1);
    }

    #[test]
    fn test_unconfirmed_and_same_location_are_ignored() {
        let mut mirror = seeded();
        let mut event = FileMoved::confirmed("a.jpg", Location::Unsorted, trips());
        event.confirmed = false;
        assert_eq!(mirror.apply_file_moved(&event).applied, MoveApplied::Unconfirmed);

        let same = FileMoved::confirmed("a.jpg", Location::Unsorted, Location::Unsorted);
        assert_eq!(mirror.apply_file_moved(&same).applied, MoveApplied::SameLocation);
        assert!(mirror.contains(&Location::Unsorted, "a.jpg"));
    }

    #[test]
    fn test_duplicate_delivery_is_idempotent() {
        let mut mirror = seeded();
        mirror.replace_category_contents("Trips", CategoryContents::default());
        let event = FileMoved::confirmed("a.jpg", Location::Unsorted, trips());

        mirror.apply_file_moved(&event);
        let second = mirror.apply_file_moved(&event);

        assert_eq!(second.applied, MoveApplied::Duplicate);
        assert_eq!(mirror.category("Trips").unwrap().file_count, 1);
        assert_eq!(mirror.locations_of("a.jpg"), vec![trips()]);
    }

    #[test]
    fn test_stale_event_requests_reconciliation() {
        let mut mirror = seeded();
        let event = FileMoved::confirmed("ghost.jpg", Location::category("Work"), Location::Unsorted);
        let report = mirror.apply_file_moved(&event);

        assert_eq!(report.applied, MoveApplied::Stale);
        assert!(report.followups.contains(&Followup::FetchEntry {
            location: Location::Unsorted,
            name: "ghost.jpg".into()
        }));
        assert!(report.followups.contains(&Followup::ReconcileCount("Work".into())));
        assert_eq!(mirror.category("Work").unwrap().file_count, 1);
    }

    #[test]
    fn test_unknown_target_is_not_fabricated() {
        let mut mirror = seeded();
        let report = mirror.apply_file_moved(&FileMoved::confirmed(
            "a.jpg",
            Location::Unsorted,
            Location::category("Brand New"),
        ));

        assert_eq!(report.applied, MoveApplied::Applied);
        assert!(report.followups.contains(&Followup::RefreshCategories));
        assert!(report.followups.contains(&Followup::ReconcileCount("Brand New".into())));
        assert!(!mirror.has_category("Brand New"));
    }

    #[test]
    fn test_counts_never_go_negative() {
        let mut mirror = seeded();
        mirror.replace_category_contents(
            "Trips",
            CategoryContents {
                files: vec![file("x.jpg")],
                subfolders: vec![],
            },
        );
        mirror.set_category_count("Trips", 0);
        mirror.apply_file_moved(&FileMoved::confirmed("x.jpg", trips(), Location::Unsorted));
        assert_eq!(mirror.category("Trips").unwrap().file_count, 0);
    }

    #[test]
    fn test_hidden_file_still_confirms() {
        let mut mirror = seeded();
        mirror.selection_mut(SelectionScope::Unsorted).toggle("a.jpg");
        assert!(mirror.hide("a.jpg", &Location::Unsorted));

        assert!(mirror
            .visible(&Location::Unsorted)
            .iter()
            .all(|f| f.name != "a.jpg"));
        assert!(mirror.selection(SelectionScope::Unsorted).is_empty());

        let report = mirror.apply_file_moved(&FileMoved::confirmed("a.jpg", Location::Unsorted, trips()));
        assert_eq!(report.applied, MoveApplied::Applied);
        assert_eq!(mirror.hidden_count(), 0);
        assert_eq!(mirror.category("Trips").unwrap().file_count, 1);
    }

    #[test]
    fn test_fresh_listing_evicts_other_locations() {
        let mut mirror = seeded();
        mirror.replace_category_contents(
            "Trips",
            CategoryContents {
                files: vec![file("a.jpg")],
                subfolders: vec![],
            },
        );
        assert_eq!(mirror.locations_of("a.jpg"), vec![trips()]);
        assert_eq!(mirror.category("Trips").unwrap().file_count, 1);

        mirror.replace_unsorted(vec![file("a.jpg")]);
        assert_eq!(mirror.locations_of("a.jpg"), vec![Location::Unsorted]);
        assert_eq!(mirror.category("Trips").unwrap().file_count, 0);
    }

    #[test]
    fn test_file_added_is_idempotent_and_keeps_known_files() {
        let mut mirror = seeded();
        let added = FileAdded {
            name: "new.webm".into(),
            size: 5,
            modified_at: Utc::now(),
        };
        assert_eq!(mirror.apply_file_added(&added), AddOutcome::Inserted);
        assert_eq!(mirror.apply_file_added(&added), AddOutcome::AlreadyPresent);
        assert_eq!(mirror.unsorted().iter().filter(|f| f.name == "new.webm").count(), 1);

        mirror.replace_category_contents(
            "Work",
            CategoryContents {
                files: vec![file("report.png")],
                subfolders: vec![],
            },
        );
        let back = FileAdded {
            name: "report.png".into(),
            size: 10,
            modified_at: Utc::now(),
        };
        assert_eq!(
            mirror.apply_file_added(&back),
            AddOutcome::KnownElsewhere(Location::category("Work"))
        );
        assert_eq!(mirror.locations_of("report.png"), vec![Location::category("Work")]);
        assert_eq!(mirror.category("Work").unwrap().file_count, 1);
    }

    #[test]
    fn test_selection_pruned_when_listing_changes() {
        let mut mirror = seeded();
        mirror.selection_mut(SelectionScope::Unsorted).select_all(["a.jpg", "b.png"]);
        mirror.replace_unsorted(vec![file("b.png")]);
        assert_eq!(mirror.selection(SelectionScope::Unsorted).to_vec(), vec!["b.png".to_string()]);
    }

    #[test]
    fn test_remove_category_closes_its_view() {
        let mut mirror = seeded();
        mirror.replace_category_contents(
            "Work",
            CategoryContents {
                files: vec![file("w.jpg")],
                subfolders: vec![],
            },
        );
        mirror.open_view(Location::category("Work"));
        mirror.selection_mut(SelectionScope::Open).toggle("w.jpg");

        assert!(mirror.remove_category("Work"));
        assert_eq!(mirror.open_location(), None);
        assert!(mirror.selection(SelectionScope::Open).is_empty());
        assert!(!mirror.is_loaded(&Location::category("Work")));
    }

    #[test]
    fn test_rename_category_retargets_listings_and_view() {
        let mut mirror = seeded();
        mirror.replace_category_contents(
            "Trips",
            CategoryContents {
                files: vec![file("t.jpg")],
                subfolders: vec![Subfolder {
                    name: "2024".into(),
                    file_count: 0,
                }],
            },
        );
        mirror.replace_subfolder_contents("Trips", "2024", vec![file("s.jpg")]);
        mirror.open_view(Location::subfolder("Trips", "2024"));

        assert!(mirror.rename_category("Trips", "Travel"));
        assert!(mirror.has_category("Travel"));
        assert!(mirror.contains(&Location::category("Travel"), "t.jpg"));
        assert!(mirror.contains(&Location::subfolder("Travel", "2024"), "s.jpg"));
        assert_eq!(mirror.open_location(), Some(&Location::subfolder("Travel", "2024")));
        assert!(mirror.subfolders("Travel").is_some());
    }

    #[test]
    fn test_rename_entry_keeps_selection_and_count() {
        let mut mirror = seeded();
        mirror.replace_category_contents(
            "Trips",
            CategoryContents {
                files: vec![file("beach.jpg")],
                subfolders: vec![],
            },
        );
        mirror.open_view(trips());
        mirror.selection_mut(SelectionScope::Open).toggle("beach.jpg");

        assert!(mirror.rename_entry(&trips(), "beach.jpg", "sunset.jpg"));
        assert!(mirror.contains(&trips(), "sunset.jpg"));
        assert!(!mirror.contains(&trips(), "beach.jpg"));
        assert!(mirror.selection(SelectionScope::Open).contains("sunset.jpg"));
        assert_eq!(mirror.category("Trips").unwrap().file_count, 1);
    }
}
