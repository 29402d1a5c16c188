//! `flatwatch-tracker` - drives one listing run end to end.
//!
//! A [`Tracker`] owns a [`Fetcher`] and a [`ListingStore`](flatwatch_store::ListingStore)
//! and walks each run through fetch, normalize, reconcile, describe and
//! persist. At most one run is active; a second trigger is refused, not queued.

pub mod error;
pub mod fetcher;
pub mod phase;
pub mod tracker;

pub use error::{FetchError, RunError};
pub use fetcher::Fetcher;
pub use phase::RunPhase;
pub use tracker::{RunHandle, RunReport, StartOutcome, Tracker, TrackerOptions, TrackerStatus};
