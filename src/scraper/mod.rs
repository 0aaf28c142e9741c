//! Generic scrape stages: fetch → unmask → locate tables → map rows.
//!
//! Nothing in here knows about a particular site; the per-site knowledge
//! (URLs, locators, column mappings, row filters) lives in `crate::sites`.

pub mod cleaner;
pub mod http_client;
pub mod mapper;
pub mod table;
pub mod unmask;

use async_trait::async_trait;
use thiserror::Error;

pub use self::http_client::HttpClient;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Failures of a single page. The orchestrator absorbs all of them per page;
/// none is fatal to a run.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// DNS, connect, timeout or body-read failure.
    #[error("transport error fetching {url}: {message}")]
    Transport { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    /// Expected element missing or shaped unexpectedly.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("storage error: {0}")]
    Persistence(#[from] duckdb::Error),

    #[error("invalid window: {0}")]
    InvalidWindow(String),
}

impl ScrapeError {
    /// Transport failures, throttling and server-side errors are worth another try.
    pub fn is_retryable(&self) -> bool {
        match self {
            ScrapeError::Transport { .. } => true,
            ScrapeError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

// ── Fetcher seam ──────────────────────────────────────────────────────────────

/// Swappable page source. `HttpClient` in production, canned pages in tests.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Body of a 2xx response; no retries at this layer.
    async fn get_text(&self, url: &str) -> Result<String, ScrapeError>;
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned bodies by URL; unknown URLs are 404s.
    #[derive(Default)]
    pub struct FakeFetcher {
        pages: HashMap<String, Result<String, u16>>,
        /// Transport failures still owed per URL before it answers
        flaky: Mutex<HashMap<String, usize>>,
        hits: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), Ok(body.to_string()));
            self
        }

        pub fn status(mut self, url: &str, status: u16) -> Self {
            self.pages.insert(url.to_string(), Err(status));
            self
        }

        /// The first `failures` requests for `url` time out.
        pub fn flaky(mut self, url: &str, failures: usize) -> Self {
            self.flaky.get_mut().unwrap().insert(url.to_string(), failures);
            self
        }

        pub fn hits(&self) -> Vec<String> {
            self.hits.lock().unwrap().clone()
        }

        pub fn hits_for(&self, url: &str) -> usize {
            self.hits.lock().unwrap().iter().filter(|u| *u == url).count()
        }
    }

    #[async_trait]
    impl Fetcher for FakeFetcher {
        async fn get_text(&self, url: &str) -> Result<String, ScrapeError> {
            self.hits.lock().unwrap().push(url.to_string());
            if let Some(left) = self.flaky.lock().unwrap().get_mut(url).filter(|n| **n > 0) {
                *left -= 1;
                return Err(ScrapeError::Transport {
                    url: url.to_string(),
                    message: "operation timed out".into(),
                });
            }
            match self.pages.get(url) {
                Some(Ok(body)) => Ok(body.clone()),
                Some(Err(status)) => Err(ScrapeError::HttpStatus {
                    url: url.to_string(),
                    status: *status,
                }),
                None => Err(ScrapeError::HttpStatus {
                    url: url.to_string(),
                    status: 404,
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let t = ScrapeError::Transport { url: "u".into(), message: "timed out".into() };
        assert!(t.is_retryable());
        assert!(ScrapeError::HttpStatus { url: "u".into(), status: 503 }.is_retryable());
        assert!(ScrapeError::HttpStatus { url: "u".into(), status: 429 }.is_retryable());
        assert!(!ScrapeError::HttpStatus { url: "u".into(), status: 404 }.is_retryable());
        assert!(!ScrapeError::Parse("no table".into()).is_retryable());
    }

    #[test]
    fn test_fake_fetcher_defaults_to_404() {
        let fetcher = testing::FakeFetcher::new().page("http://a/", "<html></html>");
        assert!(tokio_test::block_on(fetcher.get_text("http://a/")).is_ok());

        let err = tokio_test::block_on(fetcher.get_text("http://b/")).unwrap_err();
        assert!(matches!(err, ScrapeError::HttpStatus { status: 404, .. }));
        assert_eq!(fetcher.hits(), vec!["http://a/", "http://b/"]);
    }

    #[test]
    fn test_fake_fetcher_flaky_url_recovers() {
        let fetcher = testing::FakeFetcher::new().page("http://a/", "ok").flaky("http://a/", 1);

        let err = tokio_test::block_on(fetcher.get_text("http://a/")).unwrap_err();
        assert!(matches!(err, ScrapeError::Transport { .. }));
        assert_eq!(tokio_test::block_on(fetcher.get_text("http://a/")).unwrap(), "ok");
        assert_eq!(fetcher.hits_for("http://a/"), 2);
    }
}
