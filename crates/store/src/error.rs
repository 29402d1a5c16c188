use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The database could not be opened or created.
    Open { path: String, message: String },
    /// A statement or transaction failed.
    Query(String),
    /// A stored value could not be read back.
    Corrupt(String),
    /// The database was written by a newer schema.
    Incompatible { found: u32, supported: u32 },
    /// The store refused the operation (in-memory store switched offline).
    Unavailable,
    /// Export file could not be written.
    Io(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { path, message } => write!(f, "cannot open store {path}: {message}"),
            Self::Query(msg) => write!(f, "storage error: {msg}"),
            Self::Corrupt(msg) => write!(f, "corrupt stored value: {msg}"),
            Self::Incompatible { found, supported } => {
                write!(f, "store schema v{found} is newer than supported v{supported}")
            }
            Self::Unavailable => write!(f, "storage unavailable"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::FromSqlConversionFailure(_, _, inner) => Self::Corrupt(inner.to_string()),
            other => Self::Query(other.to_string()),
        }
    }
}

impl From<csv::Error> for StorageError {
    fn from(e: csv::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
