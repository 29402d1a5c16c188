use std::collections::{BTreeMap, BTreeSet};

use flatwatch_core::ListingRecord;

use crate::model::{MatchedListing, UrlMatchOutput};

/// Match the current scrape against the previous snapshot by exact URL.
///
/// Within `current` the first occurrence of a URL wins; repeats (promoted
/// ads shown on several pages) are reported, not merged. Output order is
/// URL order on every side.
pub fn match_by_url(previous: &[ListingRecord], current: &[ListingRecord]) -> UrlMatchOutput {
    let previous_map: BTreeMap<&str, &ListingRecord> =
        previous.iter().map(|r| (r.url.as_str(), r)).collect();

    let mut current_map: BTreeMap<&str, &ListingRecord> = BTreeMap::new();
    let mut duplicate_urls = BTreeSet::new();
    for rec in current {
        if current_map.contains_key(rec.url.as_str()) {
            duplicate_urls.insert(rec.url.clone());
        } else {
            current_map.insert(rec.url.as_str(), rec);
        }
    }

    let mut matched = Vec::new();
    let mut current_only = Vec::new();

    for (url, cur) in &current_map {
        match previous_map.get(url) {
            Some(prev) => matched.push(MatchedListing {
                previous: (*prev).clone(),
                current: (*cur).clone(),
            }),
            None => current_only.push((*cur).clone()),
        }
    }

    let previous_only = previous_map
        .iter()
        .filter(|(url, _)| !current_map.contains_key(*url))
        .map(|(_, rec)| (*rec).clone())
        .collect();

    UrlMatchOutput {
        matched,
        current_only,
        previous_only,
        duplicate_urls,
    }
}
