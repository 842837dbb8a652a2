pub mod projection;
pub mod selection;
pub mod state;
pub mod types;

pub use projection::{project, SortKey, TypeFilter, ViewQuery};
pub use selection::{SelectionScope, SelectionSet, SelectionSnapshot};
pub use state::{AddOutcome, Followup, Mirror, MoveApplied, MoveReport};
pub use types::*;
