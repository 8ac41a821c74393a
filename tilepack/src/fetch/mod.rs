//! Downloading tile content with retries.

mod http;
pub use http::{HttpResponse, ReqwestClient, TileHttpClient, USER_AGENT};

mod template;
pub use template::UrlTemplate;

use std::error::Error;
use std::io;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable as _};
use rand::Rng as _;
use tilepack_tile_utils::encode_gzip;
use tokio::time::sleep;
use tracing::{debug, trace};

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },

    #[error("Server error {status} from {url}")]
    Transient { url: String, status: u16 },

    #[error("Unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Gave up on {url} after {attempts} attempts, last status {status}")]
    RetriesExhausted {
        url: String,
        status: u16,
        attempts: u32,
    },

    #[error("Unable to gzip the content of {url}: {source}")]
    Compress {
        url: String,
        #[source]
        source: io::Error,
    },
}

impl FetchError {
    /// Only server-side (5xx) failures are worth another attempt.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// How hard to try before giving up on a tile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total number of requests per tile, including the first one.
    pub max_attempts: u32,
    /// Wait before the first retry. Each following wait is multiplied by `factor`.
    pub min_delay: Duration,
    /// Upper bound of a single wait.
    pub max_delay: Duration,
    pub factor: f32,
    /// Upper bound of the random pause after each attempt.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            factor: 2.0,
            jitter: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// A policy that never waits, for tests and local sources.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            factor: 1.0,
            jitter: Duration::ZERO,
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        let retries = usize::try_from(self.max_attempts.saturating_sub(1)).unwrap_or(usize::MAX);
        ExponentialBuilder::new()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_factor(self.factor)
            .with_max_times(retries)
    }

    fn jitter_delay(&self) -> Duration {
        let max = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        if max == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=max))
        }
    }
}

/// Fetches one URL, retrying server errors with exponential backoff.
///
/// In gzip mode the returned bytes are always gzip-compressed, either by the
/// origin or locally.
pub struct RetryingFetcher<C> {
    client: C,
    policy: RetryPolicy,
}

impl<C: TileHttpClient> RetryingFetcher<C> {
    pub fn new(client: C, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn fetch(&self, url: &str, gzip: bool) -> Result<Vec<u8>, FetchError> {
        let mut attempts = 0_u32;
        let response = (|| {
            attempts += 1;
            self.attempt(url, gzip)
        })
        .retry(self.policy.backoff())
        .sleep(sleep)
        .when(FetchError::is_transient)
        .notify(|err, wait| debug!("{err}, retrying in {wait:?}"))
        .await;

        let response = match response {
            Ok(response) => response,
            Err(FetchError::Transient { url, status }) => {
                return Err(FetchError::RetriesExhausted {
                    url,
                    status,
                    attempts,
                });
            }
            Err(err) => return Err(err),
        };

        if gzip && !response.gzip_encoded {
            trace!("Compressing {url} locally");
            encode_gzip(&response.body).map_err(|source| FetchError::Compress {
                url: url.to_string(),
                source,
            })
        } else {
            Ok(response.body)
        }
    }

    async fn attempt(&self, url: &str, gzip: bool) -> Result<HttpResponse, FetchError> {
        let result = self.client.get(url, gzip).await;
        let pause = self.policy.jitter_delay();
        if !pause.is_zero() {
            sleep(pause).await;
        }
        let response = result?;
        match response.status {
            200 => Ok(response),
            status @ 500..=599 => Err(FetchError::Transient {
                url: url.to_string(),
                status,
            }),
            status => Err(FetchError::Status {
                url: url.to_string(),
                status,
            }),
        }
    }
}
