//! Exit codes of the `flatwatch` binary. Cron wrappers branch on these:
//! 0-2 are generic, 10-15 say why a run or command failed.

use flatwatch_tracker::RunError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unknown filter field, bad date.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Run (10-19)
// =============================================================================

/// Listing source unreachable, returned an HTTP error, or sent an unreadable page.
/// Nothing was committed.
pub const EXIT_FETCH: u8 = 10;

/// Listing store could not be opened, read or written.
/// Nothing was committed.
pub const EXIT_STORAGE: u8 = 11;

/// Another run holds the tracker.
pub const EXIT_ALREADY_RUNNING: u8 = 12;

/// Config file unreadable, unparsable or invalid.
pub const EXIT_CONFIG: u8 = 13;

/// `flatwatch floor` was given a value that is not a floor numeral.
pub const EXIT_INVALID_NUMERAL: u8 = 14;

/// Export file could not be written.
pub const EXIT_EXPORT: u8 = 15;

/// Map a failed run to its exit code.
pub fn run_exit_code(err: &RunError) -> u8 {
    match err {
        RunError::AlreadyRunning => EXIT_ALREADY_RUNNING,
        RunError::Fetch(_) => EXIT_FETCH,
        RunError::Storage(_) => EXIT_STORAGE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flatwatch_store::StorageError;
    use flatwatch_tracker::FetchError;

    #[test]
    fn run_errors_map_into_run_range() {
        let fetch = RunError::Fetch(FetchError::Status { url: "u".into(), status: 500 });
        let storage = RunError::Storage(StorageError::Unavailable);
        for (err, code) in [
            (RunError::AlreadyRunning, EXIT_ALREADY_RUNNING),
            (fetch, EXIT_FETCH),
            (storage, EXIT_STORAGE),
        ] {
            assert_eq!(run_exit_code(&err), code);
            assert!((10..=19).contains(&code));
        }
    }
}
