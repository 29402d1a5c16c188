use std::fmt;

use flatwatch_store::StorageError;

/// Failure to obtain listing pages. Aborts the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Connection, DNS, TLS or timeout failure.
    Network { url: String, message: String },
    /// Non-success HTTP status.
    Status { url: String, status: u16 },
    /// Page fetched but not understood.
    Parse { url: String, message: String },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network { url, message } => write!(f, "network error fetching {url}: {message}"),
            Self::Status { url, status } => write!(f, "HTTP {status} from {url}"),
            Self::Parse { url, message } => write!(f, "cannot parse {url}: {message}"),
        }
    }
}

impl std::error::Error for FetchError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// Another run holds the tracker.
    AlreadyRunning,
    Fetch(FetchError),
    Storage(StorageError),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRunning => write!(f, "a run is already in progress"),
            Self::Fetch(e) => write!(f, "fetch failed: {e}"),
            Self::Storage(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::AlreadyRunning => None,
            Self::Fetch(e) => Some(e),
            Self::Storage(e) => Some(e),
        }
    }
}

impl From<FetchError> for RunError {
    fn from(e: FetchError) -> Self {
        Self::Fetch(e)
    }
}

impl From<StorageError> for RunError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}
