use std::collections::BTreeSet;

use flatwatch_core::ListingRecord;
use serde::Serialize;

// ---------------------------------------------------------------------------
// URL matching
// ---------------------------------------------------------------------------

/// A previous record paired with the fresh scrape of the same URL.
#[derive(Debug, Clone)]
pub struct MatchedListing {
    pub previous: ListingRecord,
    pub current: ListingRecord,
}

#[derive(Debug, Default)]
pub struct UrlMatchOutput {
    pub matched: Vec<MatchedListing>,
    /// In the current scrape only.
    pub current_only: Vec<ListingRecord>,
    /// In the previous snapshot only.
    pub previous_only: Vec<ListingRecord>,
    /// URLs that appeared more than once in the current scrape.
    pub duplicate_urls: BTreeSet<String>,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconSummary {
    pub previous: usize,
    pub current: usize,
    pub added: usize,
    pub removed: usize,
    pub reactivated: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub duplicates: usize,
}

/// Result of one reconciliation pass.
///
/// `merged` is the full post-pass snapshot (url order); the other fields
/// classify how each URL got there.
#[derive(Debug, Clone, Serialize)]
pub struct Reconciliation {
    pub merged: Vec<ListingRecord>,
    pub newly_added: Vec<ListingRecord>,
    pub newly_removed_urls: BTreeSet<String>,
    pub reactivated_urls: BTreeSet<String>,
    pub updated_urls: BTreeSet<String>,
    pub unchanged_urls: BTreeSet<String>,
    pub duplicate_urls: BTreeSet<String>,
    pub summary: ReconSummary,
}
