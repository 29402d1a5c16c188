use chrono::NaiveDate;
use flatwatch_core::{ListingRecord, ListingStatus};

/// Merge a fresh scrape into the stored record for the same URL.
///
/// Scraped fields take the new value. The description is only filled when
/// the stored one is empty: once fetched it is never replaced. Identity
/// (`first_seen`) stays with the stored record.
pub fn merge_listing(previous: &ListingRecord, current: &ListingRecord, today: NaiveDate) -> ListingRecord {
    let description = if previous.has_description() {
        previous.description.clone()
    } else {
        current.description.clone().or_else(|| previous.description.clone())
    };

    ListingRecord {
        url: previous.url.clone(),
        price: current.price.clone(),
        area: current.area.clone(),
        rooms: current.rooms.clone(),
        floor: current.floor.clone(),
        max_floor: current.max_floor.clone(),
        description,
        status: ListingStatus::Active,
        first_seen: previous.first_seen,
        last_seen: today,
        removed_date: None,
    }
}

/// Flag an active record as gone from the scrape.
pub fn mark_removed(previous: &ListingRecord, today: NaiveDate) -> ListingRecord {
    ListingRecord {
        status: ListingStatus::Removed,
        removed_date: Some(today),
        ..previous.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flatwatch_core::Floor;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, d).unwrap()
    }

    fn stored() -> ListingRecord {
        let mut r = ListingRecord::new("https://ads/7", day(1));
        r.price = Some("500".into());
        r.floor = Some(Floor::Level(2));
        r.description = Some("long text".into());
        r
    }

    #[test]
    fn description_survives_empty_scrape() {
        let mut cur = ListingRecord::new("https://ads/7", day(9));
        cur.price = Some("480".into());
        let merged = merge_listing(&stored(), &cur, day(9));

        assert_eq!(merged.description.as_deref(), Some("long text"));
        assert_eq!(merged.price.as_deref(), Some("480"));
        assert_eq!(merged.floor, None);
        assert_eq!(merged.first_seen, day(1));
        assert_eq!(merged.last_seen, day(9));
    }

    #[test]
    fn description_is_never_replaced_once_set() {
        let mut cur = ListingRecord::new("https://ads/7", day(9));
        cur.description = Some("different text".into());
        let merged = merge_listing(&stored(), &cur, day(9));
        assert_eq!(merged.description.as_deref(), Some("long text"));
    }

    #[test]
    fn empty_description_gets_filled() {
        let mut prev = stored();
        prev.description = Some(String::new());
        let mut cur = ListingRecord::new("https://ads/7", day(9));
        cur.description = Some("fresh".into());
        assert_eq!(merge_listing(&prev, &cur, day(9)).description.as_deref(), Some("fresh"));
    }

    #[test]
    fn reappearing_listing_keeps_identity() {
        let gone = mark_removed(&stored(), day(3));
        assert_eq!(gone.status, ListingStatus::Removed);
        assert_eq!(gone.removed_date, Some(day(3)));

        let back = merge_listing(&gone, &ListingRecord::new("https://ads/7", day(9)), day(9));
        assert_eq!(back.status, ListingStatus::Active);
        assert_eq!(back.removed_date, None);
        assert_eq!(back.first_seen, day(1));
        assert_eq!(back.last_seen, day(9));
    }
}
