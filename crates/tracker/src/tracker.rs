use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use flatwatch_core::{project_batch, ListingRecord, RawListing};
use flatwatch_recon::{reconcile, Reconciliation};
use flatwatch_store::{
    CommitBatch, ListingField, ListingFilters, ListingStore, RunCounts, RunId, RunRecord, StorageError,
};

use crate::error::RunError;
use crate::fetcher::Fetcher;
use crate::phase::{PhaseCell, RunPhase, SlotGuard};

/// A store run lock older than this is assumed abandoned by a dead process.
const RUN_LOCK_STALE_HOURS: i64 = 6;

static NEXT_TRACKER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Default)]
pub struct TrackerOptions {
    /// Stop paginating after this many pages.
    pub max_pages: Option<u32>,
    /// Fill empty descriptions from detail pages.
    pub fetch_descriptions: bool,
    /// Fixed business date; `None` = local today at run start.
    pub today: Option<NaiveDate>,
}

/// What a finished run did.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub run_date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub counts: RunCounts,
    pub new_urls: Vec<String>,
    pub removed_urls: Vec<String>,
    pub reactivated_urls: Vec<String>,
    pub duplicate_urls: Vec<String>,
    /// Descriptions filled in during this run.
    pub described: usize,
}

#[derive(Debug)]
pub enum StartOutcome {
    Started(RunHandle),
    AlreadyRunning,
}

impl StartOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, StartOutcome::Started(_))
    }
}

/// Background run started by [`Tracker::start_run`].
#[derive(Debug)]
pub struct RunHandle(JoinHandle<Result<RunReport, RunError>>);

impl RunHandle {
    /// Wait for the run. A panicked run thread reports as a storage failure.
    pub fn join(self) -> Result<RunReport, RunError> {
        self.0
            .join()
            .unwrap_or_else(|_| Err(RunError::Storage(StorageError::Query("run thread panicked".into()))))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackerStatus {
    pub running: bool,
    pub phase: RunPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<RunRecord>,
}

struct Inner<F, S> {
    fetcher: F,
    store: S,
    options: TrackerOptions,
    phase: PhaseCell,
    last_run: Mutex<Option<RunRecord>>,
    /// Names this tracker in the store's run lock.
    holder: String,
}

/// Runs scrape-reconcile-persist passes, at most one at a time.
///
/// Cheap to clone; clones share the run slot and store. Trackers on the same
/// store, in this process or another, exclude each other through the store's
/// run lock.
pub struct Tracker<F, S> {
    inner: Arc<Inner<F, S>>,
}

impl<F, S> Clone for Tracker<F, S> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<F, S> Tracker<F, S>
where
    F: Fetcher + 'static,
    S: ListingStore + 'static,
{
    pub fn new(fetcher: F, store: S, options: TrackerOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                store,
                options,
                phase: PhaseCell::default(),
                last_run: Mutex::new(None),
                holder: format!("{}:{}", std::process::id(), NEXT_TRACKER.fetch_add(1, Ordering::Relaxed)),
            }),
        }
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// Start a run on a background thread, or report that one is active.
    pub fn start_run(&self) -> StartOutcome {
        if !self.inner.phase.try_begin() {
            log::info!("run requested while another is active");
            return StartOutcome::AlreadyRunning;
        }
        let claimed = match self.inner.claim_store() {
            Ok(false) => {
                self.inner.phase.release();
                return StartOutcome::AlreadyRunning;
            }
            Ok(true) => Ok(()),
            Err(e) => Err(e),
        };
        let inner = Arc::clone(&self.inner);
        let handle = thread::spawn(move || {
            let _slot = SlotGuard(&inner.phase);
            inner.execute(claimed)
        });
        StartOutcome::Started(RunHandle(handle))
    }

    /// Run on the calling thread.
    pub fn run_now(&self) -> Result<RunReport, RunError> {
        if !self.inner.phase.try_begin() {
            return Err(RunError::AlreadyRunning);
        }
        let _slot = SlotGuard(&self.inner.phase);
        let claimed = match self.inner.claim_store() {
            Ok(false) => return Err(RunError::AlreadyRunning),
            Ok(true) => Ok(()),
            Err(e) => Err(e),
        };
        self.inner.execute(claimed)
    }

    pub fn status(&self) -> TrackerStatus {
        let phase = self.inner.phase.get();
        let mut last_run = self.inner.last_run.lock().clone();
        if last_run.is_none() {
            last_run = self.inner.store.last_run().unwrap_or_else(|e| {
                log::warn!("cannot read last run: {e}");
                None
            });
        }
        TrackerStatus { running: phase.is_running(), phase, last_run }
    }

    pub fn list_active(&self, filters: &ListingFilters) -> Result<Vec<ListingRecord>, StorageError> {
        self.inner.store.list_active(filters)
    }

    pub fn list_new(&self, since_run: RunId) -> Result<Vec<ListingRecord>, StorageError> {
        self.inner.store.list_new(since_run)
    }

    pub fn changed_since(&self, date: NaiveDate) -> Result<Vec<ListingRecord>, StorageError> {
        self.inner.store.get_changed_since(date)
    }

    pub fn distinct_values(&self, field: ListingField) -> Result<Vec<String>, StorageError> {
        self.inner.store.distinct_values(field)
    }
}

/// Releases the store run lock when dropped.
struct StoreLease<'a, F: Fetcher, S: ListingStore>(&'a Inner<F, S>);

impl<F: Fetcher, S: ListingStore> Drop for StoreLease<'_, F, S> {
    fn drop(&mut self) {
        if let Err(e) = self.0.store.release_run_lock(&self.0.holder) {
            log::warn!("could not release run lock: {e}");
        }
    }
}

impl<F: Fetcher, S: ListingStore> Inner<F, S> {
    /// Take the store run lock. `Ok(false)` when another tracker holds it.
    fn claim_store(&self) -> Result<bool, StorageError> {
        let stale_after = Duration::hours(RUN_LOCK_STALE_HOURS);
        let claimed = self.store.acquire_run_lock(&self.holder, Utc::now(), stale_after)?;
        if !claimed {
            log::info!("store run lock held by another tracker");
        }
        Ok(claimed)
    }

    /// Caller holds the run slot; `claimed` is the outcome of taking the
    /// store run lock. A lock error fails the run like any storage error.
    fn execute(&self, claimed: Result<(), StorageError>) -> Result<RunReport, RunError> {
        let started_at = Utc::now();
        let today = self.options.today.unwrap_or_else(|| Local::now().date_naive());
        let mut counts = RunCounts::default();

        let _lease = claimed.is_ok().then(|| StoreLease(self));
        let result = match claimed {
            Ok(()) => {
                log::info!("run started for {today}");
                self.pipeline(started_at, today, &mut counts)
            }
            Err(e) => Err(e.into()),
        };

        match result {
            Ok((report, logged)) => {
                self.phase.advance(RunPhase::Done);
                *self.last_run.lock() = Some(logged);
                log::info!(
                    "run {} done: {} new, {} removed, {} back, {} updated, {} unchanged",
                    report.run_id,
                    report.counts.added,
                    report.counts.removed,
                    report.counts.reactivated,
                    report.counts.updated,
                    report.counts.unchanged
                );
                Ok(report)
            }
            Err(err) => {
                log::error!("run failed during {}: {err}", self.phase.get());
                self.phase.advance(RunPhase::Failed);
                let mut record = RunRecord::failed(started_at, today, counts, err.to_string());
                match self.store.record_failed_run(&record) {
                    Ok(id) => record.id = Some(id),
                    Err(e) => log::warn!("could not log failed run: {e}"),
                }
                *self.last_run.lock() = Some(record);
                Err(err)
            }
        }
    }

    fn pipeline(
        &self,
        started_at: DateTime<Utc>,
        today: NaiveDate,
        counts: &mut RunCounts,
    ) -> Result<(RunReport, RunRecord), RunError> {
        let raws = self.fetch_all(counts)?;

        self.phase.advance(RunPhase::Normalizing);
        let batch = project_batch(&raws, today);
        counts.fetched = raws.len();
        counts.dropped = batch.dropped;
        counts.invalid_numerals = batch.invalid_numerals.len();
        if batch.dropped > 0 {
            log::warn!("dropped {} listings without a URL", batch.dropped);
        }
        for (url, err) in &batch.invalid_numerals {
            log::warn!("{url}: {err}; keeping raw floor");
        }

        self.phase.advance(RunPhase::Reconciling);
        let previous = self.store.get_all()?;
        let mut recon = reconcile(&previous, &batch.records, today);
        for url in &recon.duplicate_urls {
            log::debug!("duplicate listing in scrape: {url}");
        }

        self.phase.advance(RunPhase::Describing);
        let described = if self.options.fetch_descriptions { self.describe(&mut recon) } else { 0 };

        // Counted after Describing: a filled description makes a listing updated.
        let s = &recon.summary;
        counts.added = s.added;
        counts.removed = s.removed;
        counts.reactivated = s.reactivated;
        counts.updated = s.updated;
        counts.unchanged = s.unchanged;

        self.phase.advance(RunPhase::Persisting);
        let commit = CommitBatch {
            run: RunRecord::succeeded(started_at, today, counts.clone()),
            upserts: recon.merged,
            removed_urls: recon.newly_removed_urls.clone(),
            as_of: today,
        };
        let logged = self.store.commit(&commit)?;
        let run_id = logged.id.ok_or_else(|| StorageError::Corrupt("committed run has no id".into()))?;

        let report = RunReport {
            run_id,
            run_date: today,
            started_at,
            finished_at: logged.finished_at.unwrap_or_else(Utc::now),
            counts: counts.clone(),
            new_urls: recon.newly_added.iter().map(|r| r.url.clone()).collect(),
            removed_urls: recon.newly_removed_urls.into_iter().collect(),
            reactivated_urls: recon.reactivated_urls.into_iter().collect(),
            duplicate_urls: recon.duplicate_urls.into_iter().collect(),
            described,
        };
        Ok((report, logged))
    }

    fn fetch_all(&self, counts: &mut RunCounts) -> Result<Vec<RawListing>, RunError> {
        let mut raws = Vec::new();
        let mut page = 1u32;
        loop {
            if self.options.max_pages.is_some_and(|max| page > max) {
                log::info!("stopping at page limit {}", page - 1);
                break;
            }
            let listings = self.fetcher.fetch_page(page)?;
            if listings.is_empty() {
                break;
            }
            log::info!("page {page}: {} listings", listings.len());
            counts.pages += 1;
            raws.extend(listings);
            page += 1;
        }
        Ok(raws)
    }

    /// Fill empty descriptions of active merged records. Per-listing failures
    /// are logged and left for the next run. A filled listing that was
    /// otherwise unchanged is reclassified as updated.
    fn describe(&self, recon: &mut Reconciliation) -> usize {
        let mut filled: BTreeSet<String> = BTreeSet::new();
        for rec in recon.merged.iter_mut().filter(|r| r.is_active() && !r.has_description()) {
            match self.fetcher.fetch_description(&rec.url) {
                Ok(Some(text)) if !text.trim().is_empty() => {
                    rec.description = Some(text);
                    filled.insert(rec.url.clone());
                }
                Ok(_) => log::debug!("no description for {}", rec.url),
                Err(e) => log::warn!("description skipped: {e}"),
            }
        }
        if !filled.is_empty() {
            for rec in recon.newly_added.iter_mut().filter(|r| filled.contains(&r.url)) {
                if let Some(m) = recon.merged.iter().find(|m| m.url == rec.url) {
                    rec.description = m.description.clone();
                }
            }
            for url in &filled {
                if recon.unchanged_urls.remove(url) {
                    recon.updated_urls.insert(url.clone());
                    recon.summary.unchanged -= 1;
                    recon.summary.updated += 1;
                }
            }
            log::info!("filled {} descriptions", filled.len());
        }
        filled.len()
    }
}
