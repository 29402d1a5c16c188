use std::fmt;
use std::str::FromStr;

use flatwatch_core::ListingRecord;
use serde::Serialize;

/// Queryable listing columns. Column names come from here, never from input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingField {
    Url,
    Price,
    Area,
    Rooms,
    Floor,
    MaxFloor,
    Description,
}

impl ListingField {
    pub const ALL: [ListingField; 7] = [
        ListingField::Url,
        ListingField::Price,
        ListingField::Area,
        ListingField::Rooms,
        ListingField::Floor,
        ListingField::MaxFloor,
        ListingField::Description,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            ListingField::Url => "url",
            ListingField::Price => "price",
            ListingField::Area => "area",
            ListingField::Rooms => "rooms",
            ListingField::Floor => "floor",
            ListingField::MaxFloor => "max_floor",
            ListingField::Description => "description",
        }
    }

    /// Text value of this field on `record`, as stored.
    pub fn value_of(&self, record: &ListingRecord) -> Option<String> {
        match self {
            ListingField::Url => Some(record.url.clone()),
            ListingField::Price => record.price.clone(),
            ListingField::Area => record.area.clone(),
            ListingField::Rooms => record.rooms.clone(),
            ListingField::Floor => record.floor.as_ref().map(|f| f.to_string()),
            ListingField::MaxFloor => record.max_floor.clone(),
            ListingField::Description => record.description.clone(),
        }
    }
}

impl fmt::Display for ListingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for ListingField {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        ListingField::ALL
            .into_iter()
            .find(|f| f.column() == normalized)
            .ok_or_else(|| FilterParseError::UnknownField(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    /// `field~value`: case-insensitive substring.
    Contains,
    /// `field=value`: case-insensitive equality.
    Equals,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: ListingField,
    pub op: FilterOp,
    pub value: String,
}

impl Filter {
    pub fn contains(field: ListingField, value: impl Into<String>) -> Self {
        Self { field, op: FilterOp::Contains, value: value.into() }
    }

    pub fn equals(field: ListingField, value: impl Into<String>) -> Self {
        Self { field, op: FilterOp::Equals, value: value.into() }
    }

    /// Absent fields never match.
    pub fn matches(&self, record: &ListingRecord) -> bool {
        let Some(actual) = self.field.value_of(record) else {
            return false;
        };
        let actual = actual.to_lowercase();
        let wanted = self.value.to_lowercase();
        match self.op {
            FilterOp::Contains => actual.contains(&wanted),
            FilterOp::Equals => actual == wanted,
        }
    }
}

impl FromStr for Filter {
    type Err = FilterParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (pos, op) = match (s.find('~'), s.find('=')) {
            (Some(t), Some(e)) if e < t => (e, FilterOp::Equals),
            (Some(t), _) => (t, FilterOp::Contains),
            (None, Some(e)) => (e, FilterOp::Equals),
            (None, None) => return Err(FilterParseError::MissingOperator(s.to_string())),
        };
        let field: ListingField = s[..pos].parse()?;
        let value = s[pos + 1..].trim();
        if value.is_empty() {
            return Err(FilterParseError::EmptyValue(field));
        }
        Ok(Filter { field, op, value: value.to_string() })
    }
}

/// AND-combined filters. Empty matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingFilters(pub Vec<Filter>);

impl ListingFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: Filter) -> Self {
        self.0.push(filter);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn matches(&self, record: &ListingRecord) -> bool {
        self.0.iter().all(|f| f.matches(record))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterParseError {
    UnknownField(String),
    MissingOperator(String),
    EmptyValue(ListingField),
}

impl fmt::Display for FilterParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownField(name) => write!(
                f,
                "unknown field '{name}' (expected url, price, area, rooms, floor, max_floor or description)"
            ),
            Self::MissingOperator(s) => write!(f, "filter '{s}' needs field~value or field=value"),
            Self::EmptyValue(field) => write!(f, "filter on {field} has an empty value"),
        }
    }
}

impl std::error::Error for FilterParseError {}
