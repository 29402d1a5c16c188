// CSV export of the listing snapshot (write-only; never read back)

use std::io::Write;
use std::path::Path;

use flatwatch_core::ListingRecord;
use serde::Serialize;

use crate::error::StorageError;
use crate::filter::ListingFilters;
use crate::store::ListingStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportScope {
    Active,
    All,
}

#[derive(Serialize)]
struct ExportRow<'a> {
    url: &'a str,
    price: Option<&'a str>,
    area: Option<&'a str>,
    rooms: Option<&'a str>,
    floor: Option<String>,
    max_floor: Option<&'a str>,
    description: Option<&'a str>,
    status: &'static str,
    first_seen: String,
    last_seen: String,
    removed_date: Option<String>,
}

impl<'a> From<&'a ListingRecord> for ExportRow<'a> {
    fn from(r: &'a ListingRecord) -> Self {
        Self {
            url: &r.url,
            price: r.price.as_deref(),
            area: r.area.as_deref(),
            rooms: r.rooms.as_deref(),
            floor: r.floor.as_ref().map(|f| f.to_string()),
            max_floor: r.max_floor.as_deref(),
            description: r.description.as_deref(),
            status: r.status.as_str(),
            first_seen: r.first_seen.to_string(),
            last_seen: r.last_seen.to_string(),
            removed_date: r.removed_date.map(|d| d.to_string()),
        }
    }
}

/// Write `records` as CSV with a header row. Returns the number of rows.
pub fn write_csv<W: Write>(records: &[ListingRecord], writer: W) -> Result<usize, StorageError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for rec in records {
        wtr.serialize(ExportRow::from(rec))?;
    }
    if records.is_empty() {
        // serde only emits the header alongside the first row
        wtr.write_record([
            "url",
            "price",
            "area",
            "rooms",
            "floor",
            "max_floor",
            "description",
            "status",
            "first_seen",
            "last_seen",
            "removed_date",
        ])?;
    }
    wtr.flush()?;
    Ok(records.len())
}

pub fn export_csv(store: &dyn ListingStore, path: &Path, scope: ExportScope) -> Result<usize, StorageError> {
    let records = match scope {
        ExportScope::Active => store.list_active(&ListingFilters::new())?,
        ExportScope::All => store.get_all()?,
    };
    let file = std::fs::File::create(path)?;
    let n = write_csv(&records, file)?;
    log::info!("exported {n} listings to {}", path.display());
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use chrono::NaiveDate;
    use flatwatch_core::{Floor, ListingStatus};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
    }

    #[test]
    fn header_and_quoted_fields() {
        let mut rec = ListingRecord::new("https://ads.example/stan/1", day(1));
        rec.floor = Some(Floor::Ground);
        rec.description = Some("Dvosoban, \"lux\", centar".into());

        let mut out = Vec::new();
        assert_eq!(write_csv(&[rec], &mut out).unwrap(), 1);
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("url,price,area,rooms,floor,max_floor,description,status,first_seen,last_seen,removed_date")
        );
        assert_eq!(
            lines.next(),
            Some("https://ads.example/stan/1,,,,Ground Floor,,\"Dvosoban, \"\"lux\"\", centar\",active,2026-05-01,2026-05-01,")
        );
    }

    #[test]
    fn empty_export_still_has_header() {
        let mut out = Vec::new();
        assert_eq!(write_csv(&[], &mut out).unwrap(), 0);
        assert!(String::from_utf8(out).unwrap().starts_with("url,price,"));
    }

    #[test]
    fn scope_selects_rows() {
        let active = ListingRecord::new("https://x/1", day(1));
        let removed = ListingRecord {
            status: ListingStatus::Removed,
            removed_date: Some(day(2)),
            ..ListingRecord::new("https://x/2", day(1))
        };
        let store = MemoryStore::with_listings([active, removed]);
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.csv");

        assert_eq!(export_csv(&store, &path, ExportScope::Active).unwrap(), 1);
        assert_eq!(export_csv(&store, &path, ExportScope::All).unwrap(), 2);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("removed,2026-05-01,2026-05-01,2026-05-02"));
    }
}
