use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use chrono::NaiveDate;
use flatwatch_core::{ListingStatus, RawListing};
use flatwatch_store::{
    Filter, ListingField, ListingFilters, ListingStore, MemoryStore, RunOutcome, SqliteStore, StorageError,
};
use flatwatch_tracker::{FetchError, Fetcher, RunError, RunPhase, StartOutcome, Tracker, TrackerOptions};
use parking_lot::Mutex;

// ---------------------------------------------------------------------------
// Fake source
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeSource {
    pages: Mutex<Vec<Vec<RawListing>>>,
    descriptions: Mutex<HashMap<String, Result<Option<String>, FetchError>>>,
    fail_page: Mutex<Option<u32>>,
    requested: Mutex<Vec<u32>>,
    /// When set, page 1 signals `entered` and blocks until `release` fires.
    gate: Mutex<Option<(Sender<()>, Receiver<()>)>>,
}

impl FakeSource {
    fn serve(&self, pages: Vec<Vec<RawListing>>) {
        *self.pages.lock() = pages;
    }

    fn describe(&self, url: &str, result: Result<Option<String>, FetchError>) {
        self.descriptions.lock().insert(url.to_string(), result);
    }
}

impl Fetcher for FakeSource {
    fn fetch_page(&self, page: u32) -> Result<Vec<RawListing>, FetchError> {
        self.requested.lock().push(page);
        if page == 1 {
            if let Some((entered, release)) = self.gate.lock().take() {
                entered.send(()).unwrap();
                release.recv().unwrap();
            }
        }
        if *self.fail_page.lock() == Some(page) {
            return Err(FetchError::Status { url: format!("https://ads.example/search?page={page}"), status: 503 });
        }
        let pages = self.pages.lock();
        Ok(pages.get(page as usize - 1).cloned().unwrap_or_default())
    }

    fn fetch_description(&self, url: &str) -> Result<Option<String>, FetchError> {
        self.descriptions.lock().get(url).cloned().unwrap_or(Ok(None))
    }
}

fn url(id: u32) -> String {
    format!("https://ads.example/stan/{id}")
}

fn ad(id: u32, price: &str, floor: &str) -> RawListing {
    RawListing {
        url: Some(url(id)),
        price_raw: Some(price.into()),
        area_raw: Some("48".into()),
        rooms_raw: Some("2.0".into()),
        floor_raw: Some(floor.into()),
        description: None,
    }
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 8, d).unwrap()
}

fn options(today: NaiveDate) -> TrackerOptions {
    TrackerOptions { max_pages: None, fetch_descriptions: true, today: Some(today) }
}

fn tracker(source: &Arc<FakeSource>, store: &Arc<MemoryStore>, today: NaiveDate) -> Tracker<Arc<FakeSource>, Arc<MemoryStore>> {
    Tracker::new(Arc::clone(source), Arc::clone(store), options(today))
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

#[test]
fn first_run_adds_everything_across_pages() {
    let source = Arc::new(FakeSource::default());
    source.serve(vec![vec![ad(1, "500", "IV/6"), ad(2, "550", "VPR")], vec![ad(3, "600", "II")]]);
    let store = Arc::new(MemoryStore::new());

    let report = tracker(&source, &store, day(1)).run_now().unwrap();
    assert_eq!(report.counts.pages, 2);
    assert_eq!(report.counts.added, 3);
    assert_eq!(report.new_urls, vec![url(1), url(2), url(3)]);
    assert!(report.removed_urls.is_empty());
    assert_eq!(*source.requested.lock(), vec![1, 2, 3]);

    let ground = store.get(&url(2)).unwrap().unwrap();
    assert_eq!(ground.floor.map(|f| f.to_string()).as_deref(), Some("Ground Floor"));
    assert_eq!(store.last_run().unwrap().unwrap().outcome, RunOutcome::Succeeded);
}

#[test]
fn second_run_classifies_changes() {
    let source = Arc::new(FakeSource::default());
    let store = Arc::new(MemoryStore::new());
    source.serve(vec![vec![ad(1, "500", "IV/6"), ad(2, "550", "VPR")]]);
    let first = tracker(&source, &store, day(1)).run_now().unwrap();

    source.serve(vec![vec![ad(1, "480", "IV/6"), ad(3, "600", "II")]]);
    let second = tracker(&source, &store, day(2)).run_now().unwrap();
    assert_eq!(second.new_urls, vec![url(3)]);
    assert_eq!(second.removed_urls, vec![url(2)]);
    assert_eq!(second.counts.updated, 1);
    assert!(second.run_id > first.run_id);

    let gone = store.get(&url(2)).unwrap().unwrap();
    assert_eq!(gone.status, ListingStatus::Removed);
    assert_eq!(gone.removed_date, Some(day(2)));

    source.serve(vec![vec![ad(1, "480", "IV/6"), ad(2, "550", "VPR"), ad(3, "600", "II")]]);
    let third = tracker(&source, &store, day(3)).run_now().unwrap();
    assert_eq!(third.reactivated_urls, vec![url(2)]);
    assert!(third.new_urls.is_empty());

    let t = tracker(&source, &store, day(3));
    assert_eq!(t.list_new(second.run_id).unwrap().len(), 1);
    assert_eq!(t.changed_since(day(2)).unwrap().len(), 2);
}

#[test]
fn max_pages_caps_pagination() {
    let source = Arc::new(FakeSource::default());
    source.serve(vec![vec![ad(1, "500", "I")], vec![ad(2, "500", "I")], vec![ad(3, "500", "I")]]);
    let store = Arc::new(MemoryStore::new());
    let t = Tracker::new(
        Arc::clone(&source),
        Arc::clone(&store),
        TrackerOptions { max_pages: Some(2), ..options(day(1)) },
    );

    let report = t.run_now().unwrap();
    assert_eq!(report.counts.pages, 2);
    assert_eq!(*source.requested.lock(), vec![1, 2]);
}

#[test]
fn bad_rows_are_counted_not_fatal() {
    let source = Arc::new(FakeSource::default());
    source.serve(vec![vec![
        ad(1, "500", "IV/6"),
        RawListing { url: None, ..ad(9, "1", "I") },
        ad(2, "500", "suteren"),
        ad(1, "510", "IV/6"),
    ]]);
    let store = Arc::new(MemoryStore::new());

    let report = tracker(&source, &store, day(1)).run_now().unwrap();
    assert_eq!(report.counts.fetched, 4);
    assert_eq!(report.counts.dropped, 1);
    assert_eq!(report.counts.invalid_numerals, 1);
    assert_eq!(report.duplicate_urls, vec![url(1)]);
    assert_eq!(store.get(&url(1)).unwrap().unwrap().price.as_deref(), Some("500"));
    assert_eq!(
        store.get(&url(2)).unwrap().unwrap().floor.map(|f| f.to_string()).as_deref(),
        Some("suteren")
    );
}

// ---------------------------------------------------------------------------
// Descriptions
// ---------------------------------------------------------------------------

#[test]
fn descriptions_are_filled_once_and_failures_skipped() {
    let source = Arc::new(FakeSource::default());
    source.serve(vec![vec![ad(1, "500", "I"), ad(2, "500", "I")]]);
    source.describe(&url(1), Ok(Some("Namesten, blizu parka".into())));
    source.describe(
        &url(2),
        Err(FetchError::Network { url: url(2), message: "timed out".into() }),
    );
    let store = Arc::new(MemoryStore::new());

    let report = tracker(&source, &store, day(1)).run_now().unwrap();
    assert_eq!(report.described, 1);
    assert_eq!(store.get(&url(1)).unwrap().unwrap().description.as_deref(), Some("Namesten, blizu parka"));
    assert!(!store.get(&url(2)).unwrap().unwrap().has_description());

    // Next run: 2 succeeds now, 1 is not fetched again and keeps its text.
    source.describe(&url(1), Ok(Some("different text".into())));
    source.describe(&url(2), Ok(Some("Dvosoban".into())));
    let report = tracker(&source, &store, day(2)).run_now().unwrap();
    assert_eq!(report.described, 1);
    assert_eq!(store.get(&url(1)).unwrap().unwrap().description.as_deref(), Some("Namesten, blizu parka"));
    assert_eq!(store.get(&url(2)).unwrap().unwrap().description.as_deref(), Some("Dvosoban"));
}

#[test]
fn filled_description_counts_as_update() {
    let source = Arc::new(FakeSource::default());
    source.serve(vec![vec![ad(1, "500", "I"), ad(2, "500", "I")]]);
    let store = Arc::new(MemoryStore::new());
    let first = tracker(&source, &store, day(1)).run_now().unwrap();
    assert_eq!(first.described, 0);

    // Same scrape, but 1's detail page now has text.
    source.describe(&url(1), Ok(Some("Renoviran".into())));
    let second = tracker(&source, &store, day(2)).run_now().unwrap();
    assert_eq!(second.described, 1);
    assert_eq!(second.counts.updated, 1);
    assert_eq!(second.counts.unchanged, 1);
    assert!(second.finished_at >= second.started_at);

    let logged = store.last_run().unwrap().unwrap();
    assert_eq!(logged.counts, second.counts);
    assert_eq!(logged.finished_at, Some(second.finished_at));
}

#[test]
fn descriptions_can_be_disabled() {
    let source = Arc::new(FakeSource::default());
    source.serve(vec![vec![ad(1, "500", "I")]]);
    source.describe(&url(1), Ok(Some("text".into())));
    let store = Arc::new(MemoryStore::new());
    let t = Tracker::new(
        Arc::clone(&source),
        Arc::clone(&store),
        TrackerOptions { fetch_descriptions: false, ..options(day(1)) },
    );

    assert_eq!(t.run_now().unwrap().described, 0);
    assert_eq!(store.get(&url(1)).unwrap().unwrap().description, None);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[test]
fn fetch_failure_commits_nothing() {
    let source = Arc::new(FakeSource::default());
    let store = Arc::new(MemoryStore::new());
    source.serve(vec![vec![ad(1, "500", "I")]]);
    tracker(&source, &store, day(1)).run_now().unwrap();
    let before = store.get_all().unwrap();

    source.serve(vec![vec![ad(2, "500", "I")], vec![ad(3, "500", "I")]]);
    *source.fail_page.lock() = Some(2);
    let t = tracker(&source, &store, day(2));
    let err = t.run_now().unwrap_err();
    assert!(matches!(err, RunError::Fetch(FetchError::Status { status: 503, .. })));

    assert_eq!(store.get_all().unwrap(), before);
    let status = t.status();
    assert!(!status.running);
    assert_eq!(status.phase, RunPhase::Idle);
    let last = status.last_run.unwrap();
    assert_eq!(last.outcome, RunOutcome::Failed);
    assert!(last.error.unwrap().contains("HTTP 503"));
    assert_eq!(store.last_run().unwrap().unwrap().outcome, RunOutcome::Failed);
}

#[test]
fn storage_failure_is_reported() {
    let source = Arc::new(FakeSource::default());
    source.serve(vec![vec![ad(1, "500", "I")]]);
    let store = Arc::new(MemoryStore::new());
    store.set_unavailable(true);

    let t = tracker(&source, &store, day(1));
    assert_eq!(t.run_now().unwrap_err(), RunError::Storage(StorageError::Unavailable));
    let status = t.status();
    assert_eq!(status.phase, RunPhase::Idle);
    assert!(status.last_run.unwrap().error.is_some());

    store.set_unavailable(false);
    assert!(t.run_now().is_ok());
}

// ---------------------------------------------------------------------------
// Trigger / status
// ---------------------------------------------------------------------------

#[test]
fn concurrent_trigger_is_refused() {
    let source = Arc::new(FakeSource::default());
    source.serve(vec![vec![ad(1, "500", "I")]]);
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    *source.gate.lock() = Some((entered_tx, release_rx));
    let store = Arc::new(MemoryStore::new());
    let t = tracker(&source, &store, day(1));

    let StartOutcome::Started(handle) = t.start_run() else {
        panic!("first trigger must start");
    };
    entered_rx.recv().unwrap();

    let status = t.status();
    assert!(status.running);
    assert_eq!(status.phase, RunPhase::Fetching);
    assert!(!t.start_run().is_started());
    assert_eq!(t.clone().run_now().unwrap_err(), RunError::AlreadyRunning);

    release_tx.send(()).unwrap();
    let report = handle.join().unwrap();
    assert_eq!(report.counts.added, 1);

    let status = t.status();
    assert!(!status.running);
    assert_eq!(status.last_run.unwrap().id, Some(report.run_id));
    assert!(t.start_run().is_started());
}

#[test]
fn query_interface_reads_the_store() {
    let source = Arc::new(FakeSource::default());
    let mut with_rooms = ad(2, "700", "III/4");
    with_rooms.rooms_raw = Some("3.0".into());
    source.serve(vec![vec![ad(1, "500", "VPR"), with_rooms]]);
    let store = Arc::new(MemoryStore::new());
    let t = tracker(&source, &store, day(1));
    t.run_now().unwrap();

    let ground = t
        .list_active(&ListingFilters::new().with(Filter::contains(ListingField::Floor, "ground")))
        .unwrap();
    assert_eq!(ground.len(), 1);
    assert_eq!(ground[0].url, url(1));
    assert_eq!(t.distinct_values(ListingField::Rooms).unwrap(), vec!["2.0", "3.0"]);

    let json = serde_json::to_value(t.status()).unwrap();
    assert_eq!(json["phase"], "idle");
    assert_eq!(json["last_run"]["outcome"], "succeeded");
}

// ---------------------------------------------------------------------------
// Store run lock
// ---------------------------------------------------------------------------

fn gated_source() -> (Arc<FakeSource>, Receiver<()>, Sender<()>) {
    let source = Arc::new(FakeSource::default());
    source.serve(vec![vec![ad(1, "500", "I")]]);
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    *source.gate.lock() = Some((entered_tx, release_rx));
    (source, entered_rx, release_tx)
}

#[test]
fn second_tracker_on_one_store_is_refused() {
    let (source, entered, release) = gated_source();
    let store = Arc::new(MemoryStore::new());
    let a = tracker(&source, &store, day(1));
    let b = tracker(&source, &store, day(1));

    let StartOutcome::Started(handle) = a.start_run() else {
        panic!("first tracker must start");
    };
    entered.recv().unwrap();

    assert_eq!(b.run_now().unwrap_err(), RunError::AlreadyRunning);
    assert!(!b.start_run().is_started());
    assert!(!b.status().running);

    release.send(()).unwrap();
    handle.join().unwrap();
    assert_eq!(store.runs(10).unwrap().len(), 1);

    // A's lock is gone once its run ends.
    assert!(b.run_now().is_ok());
    assert!(a.run_now().is_ok());
}

#[test]
fn trackers_on_one_sqlite_file_exclude_each_other() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("listings.db");
    let (source, entered, release) = gated_source();
    let a = Tracker::new(Arc::clone(&source), SqliteStore::open(&path).unwrap(), options(day(1)));
    let b = Tracker::new(Arc::clone(&source), SqliteStore::open(&path).unwrap(), options(day(1)));

    let StartOutcome::Started(handle) = a.start_run() else {
        panic!("first tracker must start");
    };
    entered.recv().unwrap();
    assert_eq!(b.run_now().unwrap_err(), RunError::AlreadyRunning);

    release.send(()).unwrap();
    let report = handle.join().unwrap();
    let runs = b.store().runs(10).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].id, Some(report.run_id));

    let second = b.run_now().unwrap();
    assert!(second.run_id > report.run_id);
}
