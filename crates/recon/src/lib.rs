//! `flatwatch-recon` - reconciles a fresh scrape against the stored snapshot.
//!
//! Pure engine crate: receives records, returns the merged snapshot and the
//! new / removed / reactivated classification. No IO.

pub mod engine;
pub mod matcher;
pub mod merge;
pub mod model;
pub mod summary;

pub use engine::reconcile;
pub use model::{ReconSummary, Reconciliation};
