use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Literal marker stored for ground-floor listings (`PR` / `VPR` in the source notation).
pub const GROUND_FLOOR: &str = "Ground Floor";

/// Marker stored in `max_floor` when the building height is not given.
pub const UNKNOWN_MAX_FLOOR: &str = "?";

// ---------------------------------------------------------------------------
// Floor
// ---------------------------------------------------------------------------

/// Normalized floor of a listing.
///
/// Stored and serialized as text: `"Ground Floor"`, a plain integer, or the
/// raw scraped value when the numeral could not be converted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Floor {
    Ground,
    Level(i64),
    Unparsed(String),
}

impl Floor {
    /// Parse a stored floor value. Never fails: anything that is neither the
    /// ground marker nor an integer round-trips as `Unparsed`.
    pub fn parse_stored(value: &str) -> Self {
        if value == GROUND_FLOOR {
            return Floor::Ground;
        }
        match value.parse::<i64>() {
            Ok(n) => Floor::Level(n),
            Err(_) => Floor::Unparsed(value.to_string()),
        }
    }
}

impl fmt::Display for Floor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Floor::Ground => f.write_str(GROUND_FLOOR),
            Floor::Level(n) => write!(f, "{n}"),
            Floor::Unparsed(raw) => f.write_str(raw),
        }
    }
}

impl From<String> for Floor {
    fn from(value: String) -> Self {
        Floor::parse_stored(&value)
    }
}

impl From<Floor> for String {
    fn from(floor: Floor) -> Self {
        floor.to_string()
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    #[default]
    Active,
    Removed,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Active => "active",
            ListingStatus::Removed => "removed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(ListingStatus::Active),
            "removed" => Some(ListingStatus::Removed),
            _ => None,
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One observed listing, keyed by its canonical URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub url: String,
    pub price: Option<String>,
    pub area: Option<String>,
    pub rooms: Option<String>,
    pub floor: Option<Floor>,
    pub max_floor: Option<String>,
    pub description: Option<String>,
    pub status: ListingStatus,
    pub first_seen: NaiveDate,
    pub last_seen: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_date: Option<NaiveDate>,
}

impl ListingRecord {
    /// Fresh active record with only the URL set, first seen `today`.
    pub fn new(url: impl Into<String>, today: NaiveDate) -> Self {
        Self {
            url: url.into(),
            price: None,
            area: None,
            rooms: None,
            floor: None,
            max_floor: None,
            description: None,
            status: ListingStatus::Active,
            first_seen: today,
            last_seen: today,
            removed_date: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ListingStatus::Active
    }

    pub fn has_description(&self) -> bool {
        self.description.as_deref().is_some_and(|d| !d.trim().is_empty())
    }

    /// True when the scraped fields (everything except lifecycle bookkeeping) agree.
    pub fn same_listing_fields(&self, other: &ListingRecord) -> bool {
        self.price == other.price
            && self.area == other.area
            && self.rooms == other.rooms
            && self.floor == other.floor
            && self.max_floor == other.max_floor
            && self.description == other.description
    }
}
