use serde::Serialize;
use std::collections::BTreeSet;

/// Which listing a selection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionScope {
    Unsorted,
    /// Whatever category or subfolder view is currently open.
    Open,
}

/// File names marked for a batch operation in one view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    names: BTreeSet<String>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flips one name. Returns whether it is selected afterwards.
    pub fn toggle(&mut self, name: &str) -> bool {
        if self.names.remove(name) {
            false
        } else {
            self.names.insert(name.to_string());
            true
        }
    }

    /// Selects every visible name. Names outside `visible` are left as they are.
    pub fn select_all<'a, I>(&mut self, visible: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for name in visible {
            self.names.insert(name.to_string());
        }
    }

    /// Select-all button behaviour: when every visible name is already
    /// selected, deselect them; otherwise select them all.
    pub fn toggle_all(&mut self, visible: &[&str]) {
        let all_selected = !visible.is_empty() && visible.iter().all(|name| self.names.contains(*name));
        if all_selected {
            for name in visible {
                self.names.remove(*name);
            }
        } else {
            self.select_all(visible.iter().copied());
        }
    }

    pub fn clear(&mut self) {
        self.names.clear();
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.names.remove(name)
    }

    /// Drops every name not present in `current`. Returns how many were dropped.
    pub fn prune_missing<'a, I>(&mut self, current: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let current: BTreeSet<&str> = current.into_iter().collect();
        let before = self.names.len();
        self.names.retain(|name| current.contains(name.as_str()));
        before - self.names.len()
    }

    pub fn rename(&mut self, old: &str, new: &str) {
        if self.names.remove(old) {
            self.names.insert(new.to_string());
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.names.iter().cloned().collect()
    }
}

/// Both selections as handed to selection listeners.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectionSnapshot {
    pub unsorted: Vec<String>,
    pub open: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle() {
        let mut set = SelectionSet::new();
        assert!(set.toggle("a.jpg"));
        assert!(set.contains("a.jpg"));
        assert!(!set.toggle("a.jpg"));
        assert!(set.is_empty());
    }

    #[test]
    fn test_select_all_only_visible() {
        let mut set = SelectionSet::new();
        set.select_all(["a.jpg", "b.mp4"]);
        assert_eq!(set.to_vec(), vec!["a.jpg".to_string(), "b.mp4".to_string()]);
        assert!(!set.contains("c.png"));
    }

    #[test]
    fn test_toggle_all_deselects_when_all_visible_selected() {
        let mut set = SelectionSet::new();
        set.toggle("hidden-by-filter.jpg");
        set.toggle_all(&["a.jpg", "b.jpg"]);
        assert_eq!(set.len(), 3);

        set.toggle_all(&["a.jpg", "b.jpg"]);
        assert_eq!(set.to_vec(), vec!["hidden-by-filter.jpg".to_string()]);
    }

    #[test]
    fn test_prune_missing_keeps_subset() {
        let mut set = SelectionSet::new();
        set.select_all(["a.jpg", "b.jpg", "c.jpg"]);
        let removed = set.prune_missing(["b.jpg", "d.jpg"]);
        assert_eq!(removed, 2);
        assert!(set.iter().all(|name| ["b.jpg", "d.jpg"].contains(&name)));
    }

    #[test]
    fn test_rename_keeps_selection() {
        let mut set = SelectionSet::new();
        set.toggle("old.png");
        set.rename("old.png", "new.png");
        assert!(set.contains("new.png"));
        assert!(!set.contains("old.png"));
    }
}
