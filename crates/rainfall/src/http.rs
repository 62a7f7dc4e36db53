//! HTTP client wrapper with retry logic for forecast services.

use crate::error::{RainfallError, Result};
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Outcome of a GET that distinguishes "not found" from failures.
#[derive(Debug)]
pub enum Fetched<T> {
    Found(T),
    NotFound,
}

/// HTTP client for forecast endpoints.
///
/// Transport errors and 5xx responses are retried with exponential backoff
/// (`backoff * 2^(attempt-1)`); 4xx responses are returned at once.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    max_retries: u32,
    backoff: Duration,
    api_key: Option<String>,
}

impl HttpClient {
    /// Create a new HTTP client.
    pub fn new(request_timeout: Duration, max_retries: u32, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            client,
            max_retries,
            backoff: Duration::from_millis(500),
            api_key,
        })
    }

    /// Override the initial retry delay
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// GET a URL and return the body bytes
    pub async fn get_bytes(&self, url: &str, query: &[(&str, String)]) -> Result<Fetched<Vec<u8>>> {
        match self.get(url, query).await? {
            Fetched::Found(resp) => Ok(Fetched::Found(resp.bytes().await?.to_vec())),
            Fetched::NotFound => Ok(Fetched::NotFound),
        }
    }

    /// GET a URL and return the body as text
    pub async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<Fetched<String>> {
        match self.get(url, query).await? {
            Fetched::Found(resp) => Ok(Fetched::Found(resp.text().await?)),
            Fetched::NotFound => Ok(Fetched::NotFound),
        }
    }

    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<Fetched<reqwest::Response>> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff.saturating_mul(2u32.saturating_pow(attempt - 1));
                tracing::debug!("retrying {url} in {delay:?} (attempt {attempt})");
                tokio::time::sleep(delay).await;
            }

            let mut req = self.client.get(url).query(query);
            if let Some(key) = &self.api_key {
                req = req.header("apikey", key.as_str());
            }

            match req.send().await {
                Ok(r) if r.status().is_success() => return Ok(Fetched::Found(r)),
                Ok(r) if r.status() == StatusCode::NOT_FOUND => return Ok(Fetched::NotFound),
                Ok(r) => {
                    let status = r.status();
                    let body = r.text().await.unwrap_or_default();
                    let err = RainfallError::UpstreamFetch(format!(
                        "GET {} returned HTTP {}: {}",
                        url,
                        status,
                        body.chars().take(300).collect::<String>()
                    ));
                    // Don't retry client errors (4xx)
                    if status.is_client_error() {
                        return Err(err);
                    }
                    last_err = Some(err);
                }
                Err(e) => {
                    last_err = Some(RainfallError::UpstreamFetch(format!("GET {url} failed: {e}")));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| RainfallError::UpstreamFetch(format!("GET {url} failed"))))
    }
}
