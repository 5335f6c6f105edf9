//! Key Manager client
//!
//! The Key Manager issues random symmetric keys on demand and hands each one
//! out exactly once more: the retrieval call deletes the key server-side in
//! the same request.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};
use zeroize::Zeroize;

use crate::http::{error_body, Endpoint, EndpointError};
use crate::record::KeyRecord;

pub const DEFAULT_KEY_MANAGER_URL: &str = "http://127.0.0.1:8001";

#[derive(Error, Debug)]
pub enum KeyManagerError {
    #[error("Key not found or already consumed: {0}")]
    NotFound(String),

    #[error("Key manager request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Key manager returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid key manager response: {0}")]
    InvalidResponse(String),

    #[error("Invalid key length requested: {0}")]
    InvalidLength(usize),
}

/// Anything that can issue a single-use symmetric key and later hand it back
/// once by id.
#[async_trait]
pub trait SymmetricKeySource: Send + Sync {
    async fn request_key(&self, length: usize) -> Result<KeyRecord, KeyManagerError>;

    async fn retrieve_key(&self, key_id: &str) -> Result<KeyRecord, KeyManagerError>;
}

#[derive(Deserialize)]
struct IssuedKey {
    key_id: String,
    key_hex: String,
}

#[derive(Deserialize)]
struct StoredKey {
    key_hex: String,
}

#[derive(Debug, Clone)]
pub struct KeyManagerClient {
    endpoint: Endpoint,
}

impl KeyManagerClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, EndpointError> {
        Ok(Self {
            endpoint: Endpoint::new(base_url, timeout)?,
        })
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, KeyManagerError> {
        request.send().await.map_err(|e| {
            warn!("Key manager unreachable: {}", e);
            KeyManagerError::Transport(e)
        })
    }
}

#[async_trait]
impl SymmetricKeySource for KeyManagerClient {
    async fn request_key(&self, length: usize) -> Result<KeyRecord, KeyManagerError> {
        if length == 0 {
            return Err(KeyManagerError::InvalidLength(length));
        }

        let response = self
            .send(self.endpoint.get(&["symmetric-key"]).query(&[("length", length)]))
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeyManagerError::Status {
                status: status.as_u16(),
                body: error_body(response).await,
            });
        }

        let mut issued: IssuedKey = response
            .json()
            .await
            .map_err(|e| KeyManagerError::InvalidResponse(e.to_string()))?;
        let material = decode_key(&issued.key_hex);
        issued.key_hex.zeroize();
        let material = material?;

        debug!(
            "Key manager issued key {} ({} bytes)",
            issued.key_id,
            material.len()
        );
        Ok(KeyRecord::new(issued.key_id, material))
    }

    async fn retrieve_key(&self, key_id: &str) -> Result<KeyRecord, KeyManagerError> {
        let response = self
            .send(self.endpoint.get(&["symmetric-key", key_id]))
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(KeyManagerError::NotFound(key_id.to_string()));
        }
        if !status.is_success() {
            return Err(KeyManagerError::Status {
                status: status.as_u16(),
                body: error_body(response).await,
            });
        }

        let mut stored: StoredKey = response
            .json()
            .await
            .map_err(|e| KeyManagerError::InvalidResponse(e.to_string()))?;
        let material = decode_key(&stored.key_hex);
        stored.key_hex.zeroize();
        let material = material?;

        debug!("Retrieved and consumed key {}", key_id);
        Ok(KeyRecord::new(key_id, material))
    }
}

fn decode_key(key_hex: &str) -> Result<Vec<u8>, KeyManagerError> {
    hex::decode(key_hex)
        .map_err(|e| KeyManagerError::InvalidResponse(format!("key_hex: {}", e)))
}
