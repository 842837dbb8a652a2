pub mod autosort;
pub mod batch_rename;
pub mod coordinator;
pub mod scheduler;
pub mod types;

pub use autosort::{match_rule, AutoSortRule};
pub use batch_rename::RenamePattern;
pub use coordinator::{Coordinator, CoordinatorSettings};
pub use scheduler::{Check, Refresh, Scheduler};
pub use types::{ActionError, AutoSortReport, BatchOutcome, BatchProgress, CategoryView, ProgressFn, UnsortedView};
