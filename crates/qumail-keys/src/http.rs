//! Shared plumbing for the remote clients
//!
//! Every client owns its own `Endpoint`: base URL, a pooled `reqwest::Client`
//! and the per-call timeout. Nothing here is global.

use std::time::Duration;

use reqwest::{Response, Url};
use thiserror::Error;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Error, Debug)]
pub enum EndpointError {
    #[error("Invalid base URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct Endpoint {
    base: Url,
    client: reqwest::Client,
    timeout: Duration,
}

impl Endpoint {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, EndpointError> {
        let base = Url::parse(base_url).map_err(|e| EndpointError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(EndpointError::InvalidUrl {
                url: base_url.to_string(),
                reason: "expected an http(s) base URL".to_string(),
            });
        }

        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()?;

        Ok(Self {
            base,
            client,
            timeout,
        })
    }

    /// Append path segments to the base URL, percent-encoding each one
    pub fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub fn get(&self, segments: &[&str]) -> reqwest::RequestBuilder {
        self.client.get(self.url(segments)).timeout(self.timeout)
    }

    pub fn put(&self, segments: &[&str]) -> reqwest::RequestBuilder {
        self.client.put(self.url(segments)).timeout(self.timeout)
    }

    pub fn post(&self, segments: &[&str]) -> reqwest::RequestBuilder {
        self.client.post(self.url(segments)).timeout(self.timeout)
    }
}

const ERROR_BODY_LIMIT: usize = 512;

/// Drain an error response into a short diagnostic string
pub(crate) async fn error_body(response: Response) -> String {
    let body = response.text().await.unwrap_or_default();
    truncate_at_char(body, ERROR_BODY_LIMIT)
}

// At most `limit` bytes, never splitting a character
fn truncate_at_char(mut text: String, limit: usize) -> String {
    if text.len() > limit {
        let cut = (0..=limit)
            .rev()
            .find(|i| text.is_char_boundary(*i))
            .unwrap_or(0);
        text.truncate(cut);
    }
    text
}
