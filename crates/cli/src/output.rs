//! Human-readable and JSON rendering for command output (stdout).

use flatwatch_core::ListingRecord;
use flatwatch_store::{HistoryEntry, RunRecord};
use flatwatch_tracker::RunReport;
use serde::Serialize;

use crate::CliError;

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| CliError::io(format!("cannot encode JSON: {e}")))?;
    println!("{text}");
    Ok(())
}

fn floor_cell(rec: &ListingRecord) -> String {
    match (&rec.floor, &rec.max_floor) {
        (Some(f), Some(max)) => format!("{f}/{max}"),
        (Some(f), None) => f.to_string(),
        (None, _) => String::new(),
    }
}

/// Fixed-width table, url last so long links do not push columns around.
pub fn print_listings(records: &[ListingRecord]) {
    if records.is_empty() {
        println!("no listings");
        return;
    }
    let rows: Vec<[String; 6]> = records
        .iter()
        .map(|r| {
            [
                r.price.clone().unwrap_or_default(),
                r.area.clone().unwrap_or_default(),
                r.rooms.clone().unwrap_or_default(),
                floor_cell(r),
                r.status.to_string(),
                r.url.clone(),
            ]
        })
        .collect();

    let header = ["PRICE", "AREA", "ROOMS", "FLOOR", "STATUS", "URL"];
    let mut widths = header.map(|h| h.chars().count());
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let line = |cells: [&str; 6]| {
        let mut out = String::new();
        for (i, cell) in cells.iter().enumerate() {
            if i == cells.len() - 1 {
                out.push_str(cell);
            } else {
                let pad = widths[i] - cell.chars().count();
                out.push_str(cell);
                out.push_str(&" ".repeat(pad + 2));
            }
        }
        out
    };

    println!("{}", line(header));
    for row in &rows {
        println!("{}", line(row.each_ref().map(String::as_str)));
    }
    println!("{} listing(s)", records.len());
}

pub fn print_report(report: &RunReport) {
    let c = &report.counts;
    println!(
        "run {} ({}): {} new, {} removed, {} back, {} updated, {} unchanged",
        report.run_id, report.run_date, c.added, c.removed, c.reactivated, c.updated, c.unchanged
    );
    println!(
        "  {} page(s), {} listing(s) fetched, {} dropped, {} unparsed floor(s), {} description(s) filled",
        c.pages, c.fetched, c.dropped, c.invalid_numerals, report.described
    );
    for url in &report.new_urls {
        println!("  + {url}");
    }
    for url in &report.reactivated_urls {
        println!("  ~ {url}");
    }
    for url in &report.removed_urls {
        println!("  - {url}");
    }
}

pub fn print_run(run: &RunRecord) {
    let id = run.id.map(|i| i.to_string()).unwrap_or_else(|| "-".into());
    let finished = run.finished_at.map(|t| t.to_rfc3339()).unwrap_or_default();
    println!("last run:  #{id} {} at {finished} (business date {})", run.outcome, run.run_date);
    if let Some(err) = &run.error {
        println!("  error: {err}");
    } else {
        let c = &run.counts;
        println!(
            "  {} new, {} removed, {} back, {} updated, {} unchanged",
            c.added, c.removed, c.reactivated, c.updated, c.unchanged
        );
    }
}

pub fn print_history(entries: &[HistoryEntry]) {
    if entries.is_empty() {
        println!("no history");
        return;
    }
    for h in entries {
        let run = h.run_id.map(|r| format!(" (run {r})")).unwrap_or_default();
        println!("{}  {:<11}{run}", h.change_date, h.event.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use flatwatch_core::Floor;

    #[test]
    fn floor_cell_forms() {
        let mut rec = ListingRecord::new("https://x/1", NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        assert_eq!(floor_cell(&rec), "");
        rec.floor = Some(Floor::Ground);
        assert_eq!(floor_cell(&rec), "Ground Floor");
        rec.floor = Some(Floor::Level(4));
        rec.max_floor = Some("?".into());
        assert_eq!(floor_cell(&rec), "4/?");
    }
}
