use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use flatwatch_core::{ListingRecord, ListingStatus};

use crate::matcher::match_by_url;
use crate::merge::{mark_removed, merge_listing};
use crate::model::Reconciliation;
use crate::summary::compute_summary;

/// Reconcile a fresh scrape against the previous snapshot.
///
/// Pure: `today` is the only clock, so every record touched in one pass
/// carries the same date. `previous` may include removed records; a removed
/// record that shows up again is reactivated under its old identity.
pub fn reconcile(previous: &[ListingRecord], current: &[ListingRecord], today: NaiveDate) -> Reconciliation {
    let matched = match_by_url(previous, current);

    let mut merged: BTreeMap<String, ListingRecord> = BTreeMap::new();
    let mut newly_added = Vec::new();
    let mut newly_removed_urls = BTreeSet::new();
    let mut reactivated_urls = BTreeSet::new();
    let mut updated_urls = BTreeSet::new();
    let mut unchanged_urls = BTreeSet::new();

    for cur in matched.current_only {
        let rec = ListingRecord {
            status: ListingStatus::Active,
            first_seen: today,
            last_seen: today,
            removed_date: None,
            ..cur
        };
        newly_added.push(rec.clone());
        merged.insert(rec.url.clone(), rec);
    }

    for pair in matched.matched {
        let rec = merge_listing(&pair.previous, &pair.current, today);
        if !pair.previous.is_active() {
            reactivated_urls.insert(rec.url.clone());
        } else if rec.same_listing_fields(&pair.previous) {
            unchanged_urls.insert(rec.url.clone());
        } else {
            updated_urls.insert(rec.url.clone());
        }
        merged.insert(rec.url.clone(), rec);
    }

    for prev in matched.previous_only {
        if prev.is_active() {
            newly_removed_urls.insert(prev.url.clone());
            merged.insert(prev.url.clone(), mark_removed(&prev, today));
        } else {
            merged.insert(prev.url.clone(), prev);
        }
    }

    if !matched.duplicate_urls.is_empty() {
        log::debug!("{} url(s) repeated in the current scrape", matched.duplicate_urls.len());
    }

    let mut result = Reconciliation {
        merged: merged.into_values().collect(),
        newly_added,
        newly_removed_urls,
        reactivated_urls,
        updated_urls,
        unchanged_urls,
        duplicate_urls: matched.duplicate_urls,
        summary: Default::default(),
    };
    result.summary = compute_summary(&result, previous.len(), current.len());
    result
}
