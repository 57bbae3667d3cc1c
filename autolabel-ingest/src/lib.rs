//! File-resident dataset stores: `episodes.jsonl` and the raw-data meta document.

pub mod error;
pub mod layout;
pub mod mutate;
pub mod store;

pub use error::DatasetError;
pub use layout::DatasetLayout;
pub use mutate::{task_entry, AnnotatedEpisode, BatchSummary, FullUpdateOutcome, StoreKind};
pub use store::{BackupState, DatasetStore};
