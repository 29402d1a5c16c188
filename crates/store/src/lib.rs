//! `flatwatch-store` - the only persisted snapshot of listing state.
//!
//! [`ListingStore`] is the seam: [`SqliteStore`] for real runs,
//! [`MemoryStore`] for tests. Both apply the same
//! preserve-on-merge rule and write the same lifecycle history.

pub mod error;
pub mod export;
pub mod filter;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use error::StorageError;
pub use export::{export_csv, write_csv, ExportScope};
pub use filter::{Filter, FilterOp, FilterParseError, ListingField, ListingFilters};
pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, SCHEMA_VERSION};
pub use store::{
    CommitBatch, HistoryEntry, HistoryEvent, ListingStore, RunCounts, RunId, RunLock, RunOutcome,
    RunRecord,
};
