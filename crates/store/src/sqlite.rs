// SQLite-backed listing store

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Duration as TimeSpan, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use flatwatch_core::{Floor, ListingRecord, ListingStatus};

use crate::error::StorageError;
use crate::filter::{ListingField, ListingFilters};
use crate::store::{
    lifecycle_events, may_claim, merge_stored, CommitBatch, HistoryEntry, HistoryEvent, ListingStore, RunCounts,
    RunId, RunLock, RunOutcome, RunRecord,
};

pub const SCHEMA_VERSION: u32 = 1;

/// `meta` key of the run lock; the value is `<rfc3339 since> <holder>`.
const RUN_LOCK_KEY: &str = "run_lock";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS listings (
    url TEXT PRIMARY KEY,
    price TEXT,
    area TEXT,
    rooms TEXT,
    floor TEXT,                  -- 'Ground Floor', integer text, or raw scraped value
    max_floor TEXT,              -- '?' when unknown
    description TEXT,
    status TEXT NOT NULL,        -- 'active' | 'removed'
    first_seen TEXT NOT NULL,    -- YYYY-MM-DD
    last_seen TEXT NOT NULL,
    removed_date TEXT
);

CREATE TABLE IF NOT EXISTS listing_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    event TEXT NOT NULL,         -- 'added' | 'removed' | 'reactivated'
    status TEXT NOT NULL,
    change_date TEXT NOT NULL,
    run_id INTEGER               -- NULL for direct writes outside a run
);

CREATE INDEX IF NOT EXISTS idx_history_url ON listing_history(url);
CREATE INDEX IF NOT EXISTS idx_history_date ON listing_history(change_date);

CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,    -- RFC 3339
    finished_at TEXT,
    run_date TEXT NOT NULL,
    outcome TEXT NOT NULL,       -- 'succeeded' | 'failed'
    pages INTEGER NOT NULL DEFAULT 0,
    fetched INTEGER NOT NULL DEFAULT 0,
    dropped INTEGER NOT NULL DEFAULT 0,
    invalid_numerals INTEGER NOT NULL DEFAULT 0,
    added INTEGER NOT NULL DEFAULT 0,
    removed INTEGER NOT NULL DEFAULT 0,
    reactivated INTEGER NOT NULL DEFAULT 0,
    updated INTEGER NOT NULL DEFAULT 0,
    unchanged INTEGER NOT NULL DEFAULT 0,
    error TEXT
);

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

const LISTING_COLUMNS: &str =
    "url, price, area, rooms, floor, max_floor, description, status, first_seen, last_seen, removed_date";

const RUN_COLUMNS: &str = "id, started_at, finished_at, run_date, outcome, pages, fetched, dropped, \
     invalid_numerals, added, removed, reactivated, updated, unchanged, error";

/// Listing store in a single SQLite file.
///
/// Holds only the path; every operation opens its own connection, so the
/// store is `Send + Sync` without a lock and concurrent readers see the last
/// committed state.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Open (creating if needed) the store at `path` and check its schema version.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Open {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        }

        let store = Self { path };
        let conn = store.connect()?;
        conn.execute_batch(SCHEMA)?;

        let found: Option<String> = conn
            .query_row("SELECT value FROM meta WHERE key = 'schema_version'", [], |row| row.get(0))
            .optional()?;
        match found {
            None => {
                conn.execute(
                    "INSERT INTO meta (key, value) VALUES ('schema_version', ?1)",
                    params![SCHEMA_VERSION.to_string()],
                )?;
                log::info!("created listing store at {}", store.path.display());
            }
            Some(v) => {
                let found: u32 = v
                    .parse()
                    .map_err(|_| StorageError::Corrupt(format!("schema_version '{v}'")))?;
                if found > SCHEMA_VERSION {
                    return Err(StorageError::Incompatible { found, supported: SCHEMA_VERSION });
                }
            }
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, StorageError> {
        let conn = Connection::open(&self.path).map_err(|e| StorageError::Open {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    fn query_listings(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<ListingRecord>, StorageError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(args, row_to_listing)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn corrupt(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

fn row_to_listing(row: &Row) -> rusqlite::Result<ListingRecord> {
    let floor: Option<String> = row.get(4)?;
    let status: String = row.get(7)?;
    let status = ListingStatus::parse(&status).ok_or_else(|| corrupt(7, format!("listing status '{status}'")))?;
    Ok(ListingRecord {
        url: row.get(0)?,
        price: row.get(1)?,
        area: row.get(2)?,
        rooms: row.get(3)?,
        floor: floor.map(|f| Floor::parse_stored(&f)),
        max_floor: row.get(5)?,
        description: row.get(6)?,
        status,
        first_seen: row.get(8)?,
        last_seen: row.get(9)?,
        removed_date: row.get(10)?,
    })
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| corrupt(idx, format!("timestamp '{value}': {e}")))
}

fn row_to_run(row: &Row) -> rusqlite::Result<RunRecord> {
    let started_at: String = row.get(1)?;
    let finished_at: Option<String> = row.get(2)?;
    let outcome: String = row.get(4)?;
    Ok(RunRecord {
        id: Some(row.get(0)?),
        started_at: parse_timestamp(1, &started_at)?,
        finished_at: finished_at.as_deref().map(|t| parse_timestamp(2, t)).transpose()?,
        run_date: row.get(3)?,
        outcome: RunOutcome::parse(&outcome).ok_or_else(|| corrupt(4, format!("run outcome '{outcome}'")))?,
        counts: RunCounts {
            pages: row.get(5)?,
            fetched: row.get(6)?,
            dropped: row.get(7)?,
            invalid_numerals: row.get(8)?,
            added: row.get(9)?,
            removed: row.get(10)?,
            reactivated: row.get(11)?,
            updated: row.get(12)?,
            unchanged: row.get(13)?,
        },
        error: row.get(14)?,
    })
}

fn row_to_history(row: &Row) -> rusqlite::Result<HistoryEntry> {
    let event: String = row.get(1)?;
    let status: String = row.get(2)?;
    Ok(HistoryEntry {
        url: row.get(0)?,
        event: HistoryEvent::parse(&event).ok_or_else(|| corrupt(1, format!("history event '{event}'")))?,
        status: ListingStatus::parse(&status).ok_or_else(|| corrupt(2, format!("history status '{status}'")))?,
        change_date: row.get(3)?,
        run_id: row.get(4)?,
    })
}

// ---------------------------------------------------------------------------
// Writes (shared by direct calls and commit; `conn` may be a transaction)
// ---------------------------------------------------------------------------

fn stored_record(conn: &Connection, url: &str) -> rusqlite::Result<Option<ListingRecord>> {
    conn.query_row(
        &format!("SELECT {LISTING_COLUMNS} FROM listings WHERE url = ?1"),
        params![url],
        row_to_listing,
    )
    .optional()
}

fn append_history(
    conn: &Connection,
    url: &str,
    event: HistoryEvent,
    date: NaiveDate,
    run_id: Option<RunId>,
) -> rusqlite::Result<()> {
    let status = match event {
        HistoryEvent::Removed => ListingStatus::Removed,
        HistoryEvent::Added | HistoryEvent::Reactivated => ListingStatus::Active,
    };
    conn.execute(
        "INSERT INTO listing_history (url, event, status, change_date, run_id) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![url, event.as_str(), status.as_str(), date, run_id],
    )?;
    Ok(())
}

fn write_listings(conn: &Connection, records: &[ListingRecord], run_id: Option<RunId>) -> rusqlite::Result<()> {
    let mut upsert = conn.prepare(&format!(
        "INSERT OR REPLACE INTO listings ({LISTING_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
    ))?;

    for incoming in records {
        let stored = stored_record(conn, &incoming.url)?;
        let before = stored.as_ref().map(|s| s.status);
        let row = match &stored {
            Some(s) => merge_stored(s, incoming),
            None => incoming.clone(),
        };
        if stored.as_ref() == Some(&row) {
            continue;
        }

        upsert.execute(params![
            row.url,
            row.price,
            row.area,
            row.rooms,
            row.floor.as_ref().map(|f| f.to_string()),
            row.max_floor,
            row.description,
            row.status.as_str(),
            row.first_seen,
            row.last_seen,
            row.removed_date,
        ])?;
        for (event, date) in lifecycle_events(before, &row) {
            append_history(conn, &row.url, event, date, run_id)?;
        }
    }
    Ok(())
}

fn flip_removed(
    conn: &Connection,
    urls: &BTreeSet<String>,
    as_of: NaiveDate,
    run_id: Option<RunId>,
) -> rusqlite::Result<usize> {
    let mut update = conn.prepare(
        "UPDATE listings SET status = 'removed', removed_date = ?2 WHERE url = ?1 AND status = 'active'",
    )?;
    let mut flipped = 0;
    for url in urls {
        if update.execute(params![url, as_of])? == 1 {
            append_history(conn, url, HistoryEvent::Removed, as_of, run_id)?;
            flipped += 1;
        }
    }
    Ok(flipped)
}

fn insert_run(conn: &Connection, run: &RunRecord) -> rusqlite::Result<RunId> {
    let c = &run.counts;
    conn.execute(
        "INSERT INTO runs (started_at, finished_at, run_date, outcome, pages, fetched, dropped, invalid_numerals, \
         added, removed, reactivated, updated, unchanged, error) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            run.started_at.to_rfc3339(),
            run.finished_at.map(|t| t.to_rfc3339()),
            run.run_date,
            run.outcome.as_str(),
            c.pages,
            c.fetched,
            c.dropped,
            c.invalid_numerals,
            c.added,
            c.removed,
            c.reactivated,
            c.updated,
            c.unchanged,
            run.error,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn read_run_lock(conn: &Connection) -> rusqlite::Result<Option<RunLock>> {
    let value: Option<String> = conn
        .query_row("SELECT value FROM meta WHERE key = ?1", params![RUN_LOCK_KEY], |row| row.get(0))
        .optional()?;
    Ok(value.and_then(|v| {
        let lock = v.split_once(' ').and_then(|(since, holder)| {
            let since = DateTime::parse_from_rfc3339(since).ok()?.with_timezone(&Utc);
            Some(RunLock { holder: holder.to_string(), since })
        });
        if lock.is_none() {
            log::warn!("ignoring unreadable run lock '{v}'");
        }
        lock
    }))
}

// ---------------------------------------------------------------------------
// ListingStore
// ---------------------------------------------------------------------------

impl ListingStore for SqliteStore {
    fn get_active(&self) -> Result<Vec<ListingRecord>, StorageError> {
        self.query_listings(
            &format!("SELECT {LISTING_COLUMNS} FROM listings WHERE status = 'active' ORDER BY url"),
            [],
        )
    }

    fn get_all(&self) -> Result<Vec<ListingRecord>, StorageError> {
        self.query_listings(&format!("SELECT {LISTING_COLUMNS} FROM listings ORDER BY url"), [])
    }

    fn get(&self, url: &str) -> Result<Option<ListingRecord>, StorageError> {
        let conn = self.connect()?;
        Ok(stored_record(&conn, url)?)
    }

    fn upsert(&self, records: &[ListingRecord]) -> Result<(), StorageError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        write_listings(&tx, records, None)?;
        tx.commit()?;
        Ok(())
    }

    fn mark_removed(&self, urls: &BTreeSet<String>, as_of: NaiveDate) -> Result<usize, StorageError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let flipped = flip_removed(&tx, urls, as_of, None)?;
        tx.commit()?;
        Ok(flipped)
    }

    fn get_changed_since(&self, date: NaiveDate) -> Result<Vec<ListingRecord>, StorageError> {
        self.query_listings(
            &format!(
                "SELECT {LISTING_COLUMNS} FROM listings \
                 WHERE url IN (SELECT url FROM listing_history WHERE change_date >= ?1) ORDER BY url"
            ),
            params![date],
        )
    }

    fn commit(&self, batch: &CommitBatch) -> Result<RunRecord, StorageError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let run_id = insert_run(&tx, &batch.run)?;
        write_listings(&tx, &batch.upserts, Some(run_id))?;
        let flipped = flip_removed(&tx, &batch.removed_urls, batch.as_of, Some(run_id))?;
        let finished_at = Utc::now();
        tx.execute(
            "UPDATE runs SET finished_at = ?2 WHERE id = ?1",
            params![run_id, finished_at.to_rfc3339()],
        )?;
        tx.commit()?;
        log::debug!(
            "run {run_id} committed: {} upserts, {} extra removals",
            batch.upserts.len(),
            flipped
        );
        Ok(RunRecord { id: Some(run_id), finished_at: Some(finished_at), ..batch.run.clone() })
    }

    fn list_active(&self, filters: &ListingFilters) -> Result<Vec<ListingRecord>, StorageError> {
        // SQLite's LIKE folds ASCII only; listing text is not ASCII.
        let mut active = self.get_active()?;
        active.retain(|r| filters.matches(r));
        Ok(active)
    }

    fn list_new(&self, since_run: RunId) -> Result<Vec<ListingRecord>, StorageError> {
        self.query_listings(
            &format!(
                "SELECT {LISTING_COLUMNS} FROM listings WHERE url IN \
                 (SELECT url FROM listing_history WHERE event = 'added' AND run_id >= ?1) ORDER BY url"
            ),
            params![since_run],
        )
    }

    fn distinct_values(&self, field: ListingField) -> Result<Vec<String>, StorageError> {
        let col = field.column();
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT {col} FROM listings \
             WHERE status = 'active' AND {col} IS NOT NULL AND TRIM({col}) != '' ORDER BY {col}"
        ))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn history(&self, url: &str) -> Result<Vec<HistoryEntry>, StorageError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT url, event, status, change_date, run_id FROM listing_history WHERE url = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![url], row_to_history)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn record_failed_run(&self, run: &RunRecord) -> Result<RunId, StorageError> {
        let conn = self.connect()?;
        Ok(insert_run(&conn, run)?)
    }

    fn last_run(&self) -> Result<Option<RunRecord>, StorageError> {
        Ok(self.runs(1)?.into_iter().next())
    }

    fn runs(&self, limit: usize) -> Result<Vec<RunRecord>, StorageError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!("SELECT {RUN_COLUMNS} FROM runs ORDER BY id DESC LIMIT ?1"))?;
        let rows = stmt.query_map(params![limit], row_to_run)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn acquire_run_lock(&self, holder: &str, now: DateTime<Utc>, stale_after: TimeSpan) -> Result<bool, StorageError> {
        let mut conn = self.connect()?;
        // IMMEDIATE takes the write lock up front, so two processes cannot
        // both read "free" and then both claim.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let current = read_run_lock(&tx)?;
        if !may_claim(current.as_ref(), holder, now, stale_after) {
            return Ok(false);
        }
        tx.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![RUN_LOCK_KEY, format!("{} {holder}", now.to_rfc3339())],
        )?;
        tx.commit()?;
        log::debug!("run lock taken by {holder}");
        Ok(true)
    }

    fn release_run_lock(&self, holder: &str) -> Result<(), StorageError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if read_run_lock(&tx)?.is_some_and(|lock| lock.holder == holder) {
            tx.execute("DELETE FROM meta WHERE key = ?1", params![RUN_LOCK_KEY])?;
            log::debug!("run lock released by {holder}");
        }
        tx.commit()?;
        Ok(())
    }
}
