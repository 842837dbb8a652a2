use serde::Serialize;

use crate::error_codes;
use crate::mirror::projection::ViewQuery;
use crate::mirror::types::{FileEntry, Location, Subfolder};
use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("unknown category '{0}'")]
    UnknownCategory(String),
    #[error("'{name}' is not in {location}")]
    NotInLocation { name: String, location: Location },
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl ActionError {
    pub fn code(&self) -> &'static str {
        match self {
            ActionError::Store(e) => e.code(),
            ActionError::InvalidInput(_) => error_codes::ERR_INVALID_INPUT,
            ActionError::UnknownCategory(_) => error_codes::ERR_NOT_FOUND,
            ActionError::NotInLocation { .. } => error_codes::ERR_NOT_IN_LOCATION,
            ActionError::Unsupported(_) => error_codes::ERR_UNSUPPORTED,
        }
    }

    pub(crate) fn invalid(error: anyhow::Error) -> Self {
        ActionError::InvalidInput(error.to_string())
    }
}

/// One finished item of a batch, reported as it completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProgress {
    pub index: usize,
    pub total: usize,
    pub file_name: String,
    pub error: Option<ActionError>,
}

pub type ProgressFn = Box<dyn FnMut(&BatchProgress) + Send>;

/// Aggregate result of a batch move or batch rename.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub success_count: usize,
    pub fail_count: usize,
    pub failures: Vec<(String, ActionError)>,
}

impl BatchOutcome {
    pub fn record(&mut self, file_name: &str, result: Result<(), ActionError>) {
        match result {
            Ok(()) => self.success_count += 1,
            Err(e) => {
                self.fail_count += 1;
                self.failures.push((file_name.to_string(), e));
            }
        }
    }

    pub fn total(&self) -> usize {
        self.success_count + self.fail_count
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AutoSortReport {
    pub moved: usize,
    /// Matched a rule whose category no longer exists.
    pub skipped: usize,
    pub failed: usize,
}

/// What the unsorted pane shows: filtered, sorted, optimistic hides excluded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsortedView {
    pub files: Vec<FileEntry>,
    /// Visible files before the filter is applied.
    pub total: usize,
    pub selected: Vec<String>,
    pub query: ViewQuery,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryView {
    pub location: Location,
    pub file_count: u64,
    pub files: Vec<FileEntry>,
    pub subfolders: Vec<Subfolder>,
    /// Only populated when this is the open view.
    pub selected: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_outcome_tally() {
        let mut outcome = BatchOutcome::default();
        outcome.record("a.jpg", Ok(()));
        outcome.record(
            "b.jpg",
            Err(ActionError::Store(StoreError::ServerError("boom".into()))),
        );
        outcome.record("c.jpg", Ok(()));

        assert_eq!(outcome.success_count, 2);
        assert_eq!(outcome.fail_count, 1);
        assert_eq!(outcome.total(), 3);
        assert_eq!(outcome.failures[0].0, "b.jpg");
    }

    #[test]
    fn test_codes_follow_store_errors() {
        let err = ActionError::from(StoreError::TargetDeleted("Work".into()));
        assert_eq!(err.code(), error_codes::ERR_TARGET_DELETED);
        assert_eq!(
            ActionError::Unsupported("x".into()).code(),
            error_codes::ERR_UNSUPPORTED
        );
    }
}
