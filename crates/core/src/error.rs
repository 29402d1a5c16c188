use std::fmt;

/// A floor value that is not a valid Roman numeral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidNumeralError {
    /// The full input that was being converted.
    pub input: String,
    /// The first character without a numeral value (`None` for empty input).
    pub ch: Option<char>,
}

impl fmt::Display for InvalidNumeralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ch {
            Some(ch) => write!(f, "invalid roman numeral '{}': unexpected character '{ch}'", self.input),
            None => write!(f, "invalid roman numeral: empty input"),
        }
    }
}

impl std::error::Error for InvalidNumeralError {}

/// A scraped row that cannot be turned into a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedRecordError {
    /// No URL, so the row cannot be reconciled against anything.
    MissingUrl,
}

impl fmt::Display for MalformedRecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingUrl => write!(f, "malformed record: missing url"),
        }
    }
}

impl std::error::Error for MalformedRecordError {}
