use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::Mutex;

use flatwatch_core::{ListingRecord, ListingStatus};

use crate::error::StorageError;
use crate::filter::{ListingField, ListingFilters};
use crate::store::{
    lifecycle_events, may_claim, merge_stored, CommitBatch, HistoryEntry, HistoryEvent, ListingStore, RunId,
    RunLock, RunRecord,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    listings: BTreeMap<String, ListingRecord>,
    history: Vec<HistoryEntry>,
    runs: Vec<RunRecord>,
    run_lock: Option<RunLock>,
}

impl MemoryState {
    fn log(&mut self, url: &str, event: HistoryEvent, change_date: NaiveDate, run_id: Option<RunId>) {
        let status = match event {
            HistoryEvent::Removed => ListingStatus::Removed,
            HistoryEvent::Added | HistoryEvent::Reactivated => ListingStatus::Active,
        };
        self.history.push(HistoryEntry { url: url.to_string(), event, status, change_date, run_id });
    }

    fn write(&mut self, records: &[ListingRecord], run_id: Option<RunId>) {
        for incoming in records {
            let stored = self.listings.get(&incoming.url);
            let before = stored.map(|s| s.status);
            let row = match stored {
                Some(s) => merge_stored(s, incoming),
                None => incoming.clone(),
            };
            for (event, date) in lifecycle_events(before, &row) {
                self.log(&row.url, event, date, run_id);
            }
            self.listings.insert(row.url.clone(), row);
        }
    }

    fn remove(&mut self, urls: &BTreeSet<String>, as_of: NaiveDate, run_id: Option<RunId>) -> usize {
        let mut flipped = 0;
        for url in urls {
            if let Some(rec) = self.listings.get_mut(url).filter(|r| r.is_active()) {
                rec.status = ListingStatus::Removed;
                rec.removed_date = Some(as_of);
                flipped += 1;
                self.log(url, HistoryEvent::Removed, as_of, run_id);
            }
        }
        flipped
    }

    fn push_run(&mut self, run: &RunRecord) -> RunId {
        let id = self.runs.len() as RunId + 1;
        self.runs.push(RunRecord { id: Some(id), ..run.clone() });
        id
    }

    fn urls_with_history(&self, keep: impl Fn(&HistoryEntry) -> bool) -> Vec<ListingRecord> {
        let urls: BTreeSet<&str> = self.history.iter().filter(|h| keep(h)).map(|h| h.url.as_str()).collect();
        urls.into_iter().filter_map(|u| self.listings.get(u).cloned()).collect()
    }
}

/// In-process store with the same semantics as the SQLite store.
///
/// Backs the tracker tests. `set_unavailable(true)` makes every call fail
/// with [`StorageError::Unavailable`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    unavailable: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with existing records (no history written).
    pub fn with_listings(records: impl IntoIterator<Item = ListingRecord>) -> Self {
        let store = Self::new();
        store.state.lock().listings = records.into_iter().map(|r| (r.url.clone(), r)).collect();
        store
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock() = unavailable;
    }

    fn state(&self) -> Result<parking_lot::MutexGuard<'_, MemoryState>, StorageError> {
        if *self.unavailable.lock() {
            return Err(StorageError::Unavailable);
        }
        Ok(self.state.lock())
    }
}

impl ListingStore for MemoryStore {
    fn get_active(&self) -> Result<Vec<ListingRecord>, StorageError> {
        Ok(self.state()?.listings.values().filter(|r| r.is_active()).cloned().collect())
    }

    fn get_all(&self) -> Result<Vec<ListingRecord>, StorageError> {
        Ok(self.state()?.listings.values().cloned().collect())
    }

    fn get(&self, url: &str) -> Result<Option<ListingRecord>, StorageError> {
        Ok(self.state()?.listings.get(url).cloned())
    }

    fn upsert(&self, records: &[ListingRecord]) -> Result<(), StorageError> {
        self.state()?.write(records, None);
        Ok(())
    }

    fn mark_removed(&self, urls: &BTreeSet<String>, as_of: NaiveDate) -> Result<usize, StorageError> {
        Ok(self.state()?.remove(urls, as_of, None))
    }

    fn get_changed_since(&self, date: NaiveDate) -> Result<Vec<ListingRecord>, StorageError> {
        Ok(self.state()?.urls_with_history(|h| h.change_date >= date))
    }

    fn commit(&self, batch: &CommitBatch) -> Result<RunRecord, StorageError> {
        let mut state = self.state()?;
        // Apply to a copy and swap, so a panic mid-way leaves the old state.
        let mut next = state.clone();
        let run_id = next.push_run(&batch.run);
        next.write(&batch.upserts, Some(run_id));
        next.remove(&batch.removed_urls, batch.as_of, Some(run_id));
        let mut logged = RunRecord { id: Some(run_id), ..batch.run.clone() };
        logged.finished_at = Some(Utc::now());
        if let Some(last) = next.runs.last_mut() {
            last.finished_at = logged.finished_at;
        }
        *state = next;
        Ok(logged)
    }

    fn list_active(&self, filters: &ListingFilters) -> Result<Vec<ListingRecord>, StorageError> {
        Ok(self
            .state()?
            .listings
            .values()
            .filter(|r| r.is_active() && filters.matches(r))
            .cloned()
            .collect())
    }

    fn list_new(&self, since_run: RunId) -> Result<Vec<ListingRecord>, StorageError> {
        Ok(self
            .state()?
            .urls_with_history(|h| h.event == HistoryEvent::Added && h.run_id.is_some_and(|id| id >= since_run)))
    }

    fn distinct_values(&self, field: ListingField) -> Result<Vec<String>, StorageError> {
        let values: BTreeSet<String> = self
            .state()?
            .listings
            .values()
            .filter(|r| r.is_active())
            .filter_map(|r| field.value_of(r))
            .filter(|v| !v.trim().is_empty())
            .collect();
        Ok(values.into_iter().collect())
    }

    fn history(&self, url: &str) -> Result<Vec<HistoryEntry>, StorageError> {
        Ok(self.state()?.history.iter().filter(|h| h.url == url).cloned().collect())
    }

    fn record_failed_run(&self, run: &RunRecord) -> Result<RunId, StorageError> {
        Ok(self.state()?.push_run(run))
    }

    fn last_run(&self) -> Result<Option<RunRecord>, StorageError> {
        Ok(self.state()?.runs.last().cloned())
    }

    fn runs(&self, limit: usize) -> Result<Vec<RunRecord>, StorageError> {
        Ok(self.state()?.runs.iter().rev().take(limit).cloned().collect())
    }

    fn acquire_run_lock(&self, holder: &str, now: DateTime<Utc>, stale_after: Duration) -> Result<bool, StorageError> {
        let mut state = self.state()?;
        if !may_claim(state.run_lock.as_ref(), holder, now, stale_after) {
            return Ok(false);
        }
        state.run_lock = Some(RunLock { holder: holder.to_string(), since: now });
        Ok(true)
    }

    fn release_run_lock(&self, holder: &str) -> Result<(), StorageError> {
        let mut state = self.state()?;
        if state.run_lock.as_ref().is_some_and(|lock| lock.holder == holder) {
            state.run_lock = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{RunCounts, RunOutcome};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, d).unwrap()
    }

    #[test]
    fn unavailable_store_fails_every_call() {
        let store = MemoryStore::with_listings([ListingRecord::new("https://x/1", day(1))]);
        store.set_unavailable(true);
        assert_eq!(store.get_all(), Err(StorageError::Unavailable));
        assert_eq!(store.upsert(&[]), Err(StorageError::Unavailable));

        store.set_unavailable(false);
        assert_eq!(store.get_all().unwrap().len(), 1);
    }

    #[test]
    fn commit_assigns_increasing_run_ids() {
        let store = MemoryStore::new();
        let failed = RunRecord::failed(Utc::now(), day(1), RunCounts::default(), "timeout");
        assert_eq!(store.record_failed_run(&failed).unwrap(), 1);

        let batch = CommitBatch {
            run: RunRecord::succeeded(Utc::now(), day(2), RunCounts::default()),
            upserts: vec![ListingRecord::new("https://x/1", day(2))],
            removed_urls: BTreeSet::new(),
            as_of: day(2),
        };
        let logged = store.commit(&batch).unwrap();
        assert_eq!(logged.id, Some(2));
        assert!(logged.finished_at.is_some());

        let runs = store.runs(10).unwrap();
        assert_eq!(runs[0].outcome, RunOutcome::Succeeded);
        assert_eq!(runs[1].outcome, RunOutcome::Failed);
        assert_eq!(store.list_new(2).unwrap().len(), 1);
        assert!(store.list_new(3).unwrap().is_empty());
    }

    #[test]
    fn run_lock_has_one_holder() {
        let store = MemoryStore::new();
        let now = Utc::now();
        assert!(store.acquire_run_lock("a", now, Duration::hours(6)).unwrap());
        assert!(!store.acquire_run_lock("b", now, Duration::hours(6)).unwrap());
        store.release_run_lock("b").unwrap();
        store.release_run_lock("a").unwrap();
        assert!(store.acquire_run_lock("b", now, Duration::hours(6)).unwrap());
    }

    #[test]
    fn seeded_listings_have_no_history() {
        let store = MemoryStore::with_listings([ListingRecord::new("https://x/1", day(1))]);
        assert!(store.history("https://x/1").unwrap().is_empty());
        assert!(store.get_changed_since(day(1)).unwrap().is_empty());
    }
}
