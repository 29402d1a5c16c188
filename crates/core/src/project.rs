//! Projection of raw scraped fields into the canonical [`ListingRecord`].
//!
//! Fetchers hand over loosely-typed strings; this is the only place where
//! they become a record. Per-row problems never abort a batch: rows without a
//! URL are dropped and counted, unreadable floor numerals are kept verbatim.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{InvalidNumeralError, MalformedRecordError};
use crate::model::{Floor, ListingRecord, GROUND_FLOOR};
use crate::numeral::normalize_floor;

/// One listing as extracted by a fetcher, before any normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawListing {
    pub url: Option<String>,
    pub price_raw: Option<String>,
    pub area_raw: Option<String>,
    pub rooms_raw: Option<String>,
    pub floor_raw: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A projected record plus the numeral problem it carried, if any.
#[derive(Debug, Clone)]
pub struct Projection {
    pub record: ListingRecord,
    pub numeral_error: Option<InvalidNumeralError>,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectedBatch {
    pub records: Vec<ListingRecord>,
    /// Rows rejected because they had no URL.
    pub dropped: usize,
    /// Rows whose floor was stored unparsed.
    pub invalid_numerals: Vec<(String, InvalidNumeralError)>,
}

fn clean(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Split a normalized `"<floor>/<max>"` string into the two stored fields.
fn split_floor(normalized: &str) -> (Floor, Option<String>) {
    let (floor, max_floor) = match normalized.split_once('/') {
        Some((floor, max_floor)) => (floor.trim(), clean(Some(max_floor))),
        None => (normalized.trim(), None),
    };
    let floor = if floor == GROUND_FLOOR {
        Floor::Ground
    } else {
        Floor::parse_stored(floor)
    };
    (floor, max_floor)
}

/// Project one raw row into a record shell stamped with `today`.
pub fn project(raw: &RawListing, today: NaiveDate) -> Result<Projection, MalformedRecordError> {
    let url = clean(raw.url.as_deref()).ok_or(MalformedRecordError::MissingUrl)?;

    let mut record = ListingRecord::new(url, today);
    record.price = clean(raw.price_raw.as_deref());
    record.area = clean(raw.area_raw.as_deref());
    record.rooms = clean(raw.rooms_raw.as_deref());
    record.description = clean(raw.description.as_deref());

    let mut numeral_error = None;
    if let Some(floor_raw) = clean(raw.floor_raw.as_deref()) {
        match normalize_floor(&floor_raw) {
            Ok(normalized) => {
                let (floor, max_floor) = split_floor(&normalized);
                record.floor = Some(floor);
                record.max_floor = max_floor;
            }
            Err(e) => {
                record.floor = Some(Floor::Unparsed(floor_raw));
                numeral_error = Some(e);
            }
        }
    }

    Ok(Projection { record, numeral_error })
}

/// Project a whole scrape. Malformed rows are counted, never fatal.
pub fn project_batch(raws: &[RawListing], today: NaiveDate) -> ProjectedBatch {
    let mut batch = ProjectedBatch::default();

    for raw in raws {
        match project(raw, today) {
            Ok(Projection { record, numeral_error }) => {
                if let Some(e) = numeral_error {
                    batch.invalid_numerals.push((record.url.clone(), e));
                }
                batch.records.push(record);
            }
            Err(MalformedRecordError::MissingUrl) => batch.dropped += 1,
        }
    }

    batch
}
