use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING};

use crate::fetch::FetchError;
use crate::{TilepackError, TilepackResult};

pub const USER_AGENT: &str = concat!("tilepack/", env!("CARGO_PKG_VERSION"));

/// A response as seen by the retry logic. The body is never decompressed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// The origin answered with `Content-Encoding: gzip`.
    pub gzip_encoded: bool,
    pub body: Vec<u8>,
}

/// Performs a single GET request.
///
/// Implementations must not retry and must not decode the body.
#[async_trait]
pub trait TileHttpClient: Send + Sync {
    async fn get(&self, url: &str, gzip: bool) -> Result<HttpResponse, FetchError>;
}

#[async_trait]
impl<T: TileHttpClient + ?Sized> TileHttpClient for Arc<T> {
    async fn get(&self, url: &str, gzip: bool) -> Result<HttpResponse, FetchError> {
        (**self).get(url, gzip).await
    }
}

/// [`TileHttpClient`] backed by a shared `reqwest` connection pool.
#[derive(Clone, Debug)]
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    pub fn new(timeout: Duration) -> TilepackResult<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .pool_max_idle_per_host(500)
            .use_rustls_tls()
            .build()
            .map_err(TilepackError::HttpClient)?;
        Ok(Self { client })
    }
}

fn request_error(url: &str, err: reqwest::Error) -> FetchError {
    FetchError::Request {
        url: url.to_string(),
        source: Box::new(err),
    }
}

#[async_trait]
impl TileHttpClient for ReqwestClient {
    async fn get(&self, url: &str, gzip: bool) -> Result<HttpResponse, FetchError> {
        let mut request = self.client.get(url);
        if gzip {
            request = request.header(ACCEPT_ENCODING, "gzip");
        }
        let response = request.send().await.map_err(|e| request_error(url, e))?;

        let status = response.status().as_u16();
        let gzip_encoded = response
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("gzip"));
        let body = response
            .bytes()
            .await
            .map_err(|e| request_error(url, e))?
            .to_vec();

        Ok(HttpResponse {
            status,
            gzip_encoded,
            body,
        })
    }
}
