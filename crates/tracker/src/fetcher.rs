use std::sync::Arc;

use flatwatch_core::RawListing;

use crate::error::FetchError;

/// Source of raw listings.
///
/// Pages are numbered from 1; an empty page ends pagination.
pub trait Fetcher: Send + Sync {
    fn fetch_page(&self, page: u32) -> Result<Vec<RawListing>, FetchError>;

    /// Detail-page description for `url`, if the source has one.
    fn fetch_description(&self, _url: &str) -> Result<Option<String>, FetchError> {
        Ok(None)
    }
}

impl<T: Fetcher + ?Sized> Fetcher for Arc<T> {
    fn fetch_page(&self, page: u32) -> Result<Vec<RawListing>, FetchError> {
        (**self).fetch_page(page)
    }

    fn fetch_description(&self, url: &str) -> Result<Option<String>, FetchError> {
        (**self).fetch_description(url)
    }
}

impl<T: Fetcher + ?Sized> Fetcher for Box<T> {
    fn fetch_page(&self, page: u32) -> Result<Vec<RawListing>, FetchError> {
        (**self).fetch_page(page)
    }

    fn fetch_description(&self, url: &str) -> Result<Option<String>, FetchError> {
        (**self).fetch_description(url)
    }
}
