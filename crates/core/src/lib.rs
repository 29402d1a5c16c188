//! `flatwatch-core` - listing records and the normalization that produces them.
//!
//! No IO: fetchers and stores live in other crates.

pub mod error;
pub mod model;
pub mod numeral;
pub mod project;

pub use error::{InvalidNumeralError, MalformedRecordError};
pub use model::{Floor, ListingRecord, ListingStatus, GROUND_FLOOR, UNKNOWN_MAX_FLOOR};
pub use numeral::{normalize_floor, roman_to_arabic};
pub use project::{project, project_batch, ProjectedBatch, Projection, RawListing};
