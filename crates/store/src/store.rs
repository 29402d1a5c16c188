use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use flatwatch_core::{ListingRecord, ListingStatus};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::filter::{ListingField, ListingFilters};

/// Row id of a run in the run log. Monotonic per store.
pub type RunId = i64;

// ---------------------------------------------------------------------------
// Run log
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    Succeeded,
    Failed,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Succeeded => "succeeded",
            RunOutcome::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "succeeded" => Some(RunOutcome::Succeeded),
            "failed" => Some(RunOutcome::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub pages: usize,
    pub fetched: usize,
    pub dropped: usize,
    pub invalid_numerals: usize,
    pub added: usize,
    pub removed: usize,
    pub reactivated: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// One row of the run log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Assigned by the store; `None` until logged.
    pub id: Option<RunId>,
    pub started_at: DateTime<Utc>,
    /// For succeeded runs, stamped by [`ListingStore::commit`] once the
    /// listing writes are applied.
    pub finished_at: Option<DateTime<Utc>>,
    /// Business date the run reconciled against.
    pub run_date: NaiveDate,
    pub outcome: RunOutcome,
    pub counts: RunCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunRecord {
    pub fn succeeded(started_at: DateTime<Utc>, run_date: NaiveDate, counts: RunCounts) -> Self {
        Self {
            id: None,
            started_at,
            finished_at: None,
            run_date,
            outcome: RunOutcome::Succeeded,
            counts,
            error: None,
        }
    }

    pub fn failed(started_at: DateTime<Utc>, run_date: NaiveDate, counts: RunCounts, error: impl Into<String>) -> Self {
        Self {
            id: None,
            started_at,
            finished_at: Some(Utc::now()),
            run_date,
            outcome: RunOutcome::Failed,
            counts,
            error: Some(error.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryEvent {
    Added,
    Removed,
    Reactivated,
}

impl HistoryEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryEvent::Added => "added",
            HistoryEvent::Removed => "removed",
            HistoryEvent::Reactivated => "reactivated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "added" => Some(HistoryEvent::Added),
            "removed" => Some(HistoryEvent::Removed),
            "reactivated" => Some(HistoryEvent::Reactivated),
            _ => None,
        }
    }
}

/// Append-only lifecycle entry for one listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub url: String,
    pub event: HistoryEvent,
    pub status: ListingStatus,
    pub change_date: NaiveDate,
    pub run_id: Option<RunId>,
}

/// History events produced by writing `incoming` over a row whose stored
/// status was `before` (`None` = no row). Only inserts and status flips count,
/// so re-writing the same state produces nothing.
pub(crate) fn lifecycle_events(before: Option<ListingStatus>, incoming: &ListingRecord) -> Vec<(HistoryEvent, NaiveDate)> {
    let removed_on = incoming.removed_date.unwrap_or(incoming.last_seen);
    match (before, incoming.status) {
        (None, ListingStatus::Active) => vec![(HistoryEvent::Added, incoming.first_seen)],
        (None, ListingStatus::Removed) => vec![
            (HistoryEvent::Added, incoming.first_seen),
            (HistoryEvent::Removed, removed_on),
        ],
        (Some(ListingStatus::Removed), ListingStatus::Active) => {
            vec![(HistoryEvent::Reactivated, incoming.last_seen)]
        }
        (Some(ListingStatus::Active), ListingStatus::Removed) => vec![(HistoryEvent::Removed, removed_on)],
        (Some(_), _) => Vec::new(),
    }
}

/// Storage-side merge of an incoming record over the stored one.
///
/// Mirrors the engine's preserve-on-merge rule so a direct `upsert` can never
/// blank a stored description or move `first_seen` forward.
pub(crate) fn merge_stored(stored: &ListingRecord, incoming: &ListingRecord) -> ListingRecord {
    let description = if stored.has_description() {
        stored.description.clone()
    } else {
        incoming.description.clone()
    };
    ListingRecord {
        description,
        first_seen: stored.first_seen.min(incoming.first_seen),
        last_seen: stored.last_seen.max(incoming.last_seen),
        ..incoming.clone()
    }
}

// ---------------------------------------------------------------------------
// Run lock
// ---------------------------------------------------------------------------

/// Store-wide claim on running, shared by every process using the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLock {
    pub holder: String,
    pub since: DateTime<Utc>,
}

impl RunLock {
    pub fn is_stale(&self, now: DateTime<Utc>, stale_after: Duration) -> bool {
        now - self.since >= stale_after
    }
}

/// Whether `holder` may take the lock over `current`. A holder may re-claim
/// its own lock; a stale one is taken over.
pub(crate) fn may_claim(current: Option<&RunLock>, holder: &str, now: DateTime<Utc>, stale_after: Duration) -> bool {
    match current {
        None => true,
        Some(lock) if lock.holder == holder => true,
        Some(lock) if lock.is_stale(now, stale_after) => {
            log::warn!("taking over stale run lock of {} (held since {})", lock.holder, lock.since);
            true
        }
        Some(_) => false,
    }
}

// ---------------------------------------------------------------------------
// Commit batch
// ---------------------------------------------------------------------------

/// Everything one successful run writes. Applied atomically by
/// [`ListingStore::commit`].
#[derive(Debug, Clone)]
pub struct CommitBatch {
    pub run: RunRecord,
    pub upserts: Vec<ListingRecord>,
    pub removed_urls: BTreeSet<String>,
    pub as_of: NaiveDate,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Persistent snapshot of every listing ever seen, plus history and run log.
pub trait ListingStore: Send + Sync {
    fn get_active(&self) -> Result<Vec<ListingRecord>, StorageError>;

    /// Active and removed records; the snapshot a reconciliation pass runs against.
    fn get_all(&self) -> Result<Vec<ListingRecord>, StorageError>;

    fn get(&self, url: &str) -> Result<Option<ListingRecord>, StorageError>;

    /// Insert-or-merge by url. Idempotent.
    fn upsert(&self, records: &[ListingRecord]) -> Result<(), StorageError>;

    /// Active rows among `urls` become removed as of `as_of`. Unknown and
    /// already-removed urls are ignored. Returns the number of rows flipped.
    fn mark_removed(&self, urls: &BTreeSet<String>, as_of: NaiveDate) -> Result<usize, StorageError>;

    /// Listings with a lifecycle event on or after `date`.
    fn get_changed_since(&self, date: NaiveDate) -> Result<Vec<ListingRecord>, StorageError>;

    /// Upserts, removals and the run log row in one transaction. Returns the
    /// logged run with its id and `finished_at` filled in.
    fn commit(&self, batch: &CommitBatch) -> Result<RunRecord, StorageError>;

    fn list_active(&self, filters: &ListingFilters) -> Result<Vec<ListingRecord>, StorageError>;

    /// Listings first added by `since_run` or any later run.
    fn list_new(&self, since_run: RunId) -> Result<Vec<ListingRecord>, StorageError>;

    /// Sorted distinct non-empty values of `field` among active listings.
    fn distinct_values(&self, field: ListingField) -> Result<Vec<String>, StorageError>;

    fn history(&self, url: &str) -> Result<Vec<HistoryEntry>, StorageError>;

    fn record_failed_run(&self, run: &RunRecord) -> Result<RunId, StorageError>;

    fn last_run(&self) -> Result<Option<RunRecord>, StorageError>;

    /// Most recent first.
    fn runs(&self, limit: usize) -> Result<Vec<RunRecord>, StorageError>;

    /// Claim the store-wide run lock for `holder`. A lock older than
    /// `stale_after` is taken over. `false` when someone else holds it.
    fn acquire_run_lock(&self, holder: &str, now: DateTime<Utc>, stale_after: Duration) -> Result<bool, StorageError>;

    /// Drop the run lock if `holder` still has it.
    fn release_run_lock(&self, holder: &str) -> Result<(), StorageError>;
}

impl<T: ListingStore + ?Sized> ListingStore for Arc<T> {
    fn get_active(&self) -> Result<Vec<ListingRecord>, StorageError> {
        (**self).get_active()
    }

    fn get_all(&self) -> Result<Vec<ListingRecord>, StorageError> {
        (**self).get_all()
    }

    fn get(&self, url: &str) -> Result<Option<ListingRecord>, StorageError> {
        (**self).get(url)
    }

    fn upsert(&self, records: &[ListingRecord]) -> Result<(), StorageError> {
        (**self).upsert(records)
    }

    fn mark_removed(&self, urls: &BTreeSet<String>, as_of: NaiveDate) -> Result<usize, StorageError> {
        (**self).mark_removed(urls, as_of)
    }

    fn get_changed_since(&self, date: NaiveDate) -> Result<Vec<ListingRecord>, StorageError> {
        (**self).get_changed_since(date)
    }

    fn commit(&self, batch: &CommitBatch) -> Result<RunRecord, StorageError> {
        (**self).commit(batch)
    }

    fn list_active(&self, filters: &ListingFilters) -> Result<Vec<ListingRecord>, StorageError> {
        (**self).list_active(filters)
    }

    fn list_new(&self, since_run: RunId) -> Result<Vec<ListingRecord>, StorageError> {
        (**self).list_new(since_run)
    }

    fn distinct_values(&self, field: ListingField) -> Result<Vec<String>, StorageError> {
        (**self).distinct_values(field)
    }

    fn history(&self, url: &str) -> Result<Vec<HistoryEntry>, StorageError> {
        (**self).history(url)
    }

    fn record_failed_run(&self, run: &RunRecord) -> Result<RunId, StorageError> {
        (**self).record_failed_run(run)
    }

    fn last_run(&self) -> Result<Option<RunRecord>, StorageError> {
        (**self).last_run()
    }

    fn runs(&self, limit: usize) -> Result<Vec<RunRecord>, StorageError> {
        (**self).runs(limit)
    }

    fn acquire_run_lock(&self, holder: &str, now: DateTime<Utc>, stale_after: Duration) -> Result<bool, StorageError> {
        (**self).acquire_run_lock(holder, now, stale_after)
    }

    fn release_run_lock(&self, holder: &str) -> Result<(), StorageError> {
        (**self).release_run_lock(holder)
    }
}
