//! Blocking HTTP fetcher for paginated listing search results.

use std::thread;
use std::time::Duration;

use flatwatch_config::{SelectorSettings, SourceSettings};
use flatwatch_core::RawListing;
use flatwatch_tracker::{FetchError, Fetcher};
use url::Url;

use super::parse::{parse_description, parse_results_page, PageSelectors};

/// Extra attempts after a network error, 429 or 5xx.
pub(super) const MAX_RETRIES: u32 = 2;

pub struct HtmlFetcher {
    http: reqwest::blocking::Client,
    source: SourceSettings,
    base: Url,
    selectors: PageSelectors,
    retry_delay: Duration,
}

impl HtmlFetcher {
    pub fn new(source: &SourceSettings, selectors: &SelectorSettings) -> Result<Self, String> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(source.timeout_secs))
            .user_agent(source.user_agent.clone())
            .build()
            .map_err(|e| format!("cannot build HTTP client: {e}"))?;
        let base = Url::parse(&source.base_url).map_err(|e| format!("source.base_url '{}': {e}", source.base_url))?;

        Ok(Self {
            http,
            source: source.clone(),
            base,
            selectors: PageSelectors::compile(selectors)?,
            retry_delay: Duration::from_secs(1),
        })
    }

    /// Base delay between retries (doubles per attempt).
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let mut delay = self.retry_delay;
        let mut attempt = 0;

        loop {
            let failure = match self.http.get(url).send() {
                Ok(resp) if resp.status().is_success() => {
                    return resp.text().map_err(|e| FetchError::Network {
                        url: url.to_string(),
                        message: e.to_string(),
                    });
                }
                Ok(resp) => {
                    let status = resp.status();
                    let err = FetchError::Status { url: url.to_string(), status: status.as_u16() };
                    // Other client errors will not change on retry
                    if status.as_u16() != 429 && !status.is_server_error() {
                        return Err(err);
                    }
                    err
                }
                Err(e) => FetchError::Network { url: url.to_string(), message: e.to_string() },
            };

            if attempt == MAX_RETRIES {
                return Err(failure);
            }
            attempt += 1;
            log::warn!("{failure}; retry {attempt}/{MAX_RETRIES} in {delay:?}");
            thread::sleep(delay);
            delay *= 2;
        }
    }
}

impl Fetcher for HtmlFetcher {
    fn fetch_page(&self, page: u32) -> Result<Vec<RawListing>, FetchError> {
        let url = self.source.page_url(page);
        log::debug!("fetching {url}");
        let body = self.get_text(&url)?;
        Ok(parse_results_page(&body, &self.selectors, &self.base))
    }

    fn fetch_description(&self, url: &str) -> Result<Option<String>, FetchError> {
        let body = self.get_text(url)?;
        Ok(parse_description(&body, &self.selectors))
    }
}
