//! Public directory client
//!
//! A Firebase-style REST tree holding the non-secret data the two ends of a
//! conversation share: KEM public keys under `/pqc_public_keys` and quantum
//! key metadata under `/qkd_keys`. Absent entries come back as JSON `null`.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::http::{error_body, Endpoint, EndpointError};
use crate::quantum::{KeyMetadata, MetadataStore};

const PUBLIC_KEYS: &str = "pqc_public_keys";
const QKD_KEYS: &str = "qkd_keys";

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Directory request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Directory returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid directory entry: {0}")]
    InvalidEntry(String),
}

/// Lookup of a recipient's KEM public key by user id
#[async_trait]
pub trait PublicKeyDirectory: Send + Sync {
    async fn public_key(&self, user_id: &str) -> Result<Option<Vec<u8>>, DirectoryError>;
}

#[derive(Serialize, Deserialize)]
struct PublicKeyEntry {
    public_key_b64: String,
}

/// Make an identifier usable as a single path segment in the tree
pub fn path_safe(id: &str) -> String {
    id.replace('.', "(dot)")
}

#[derive(Debug, Clone)]
pub struct DirectoryClient {
    endpoint: Endpoint,
}

impl DirectoryClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, EndpointError> {
        Ok(Self {
            endpoint: Endpoint::new(base_url, timeout)?,
        })
    }

    pub async fn publish_public_key(
        &self,
        user_id: &str,
        public_key: &[u8],
    ) -> Result<(), DirectoryError> {
        let entry = PublicKeyEntry {
            public_key_b64: STANDARD.encode(public_key),
        };
        self.put(PUBLIC_KEYS, user_id, &entry).await?;
        debug!("Published public key for {}", user_id);
        Ok(())
    }

    async fn put<T: Serialize + ?Sized>(
        &self,
        collection: &str,
        id: &str,
        value: &T,
    ) -> Result<(), DirectoryError> {
        let leaf = format!("{}.json", path_safe(id));
        let response = self
            .endpoint
            .put(&[collection, &leaf])
            .json(value)
            .send()
            .await
            .map_err(DirectoryError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DirectoryError::Status {
                status: status.as_u16(),
                body: error_body(response).await,
            });
        }
        Ok(())
    }

    async fn get<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<T>, DirectoryError> {
        let leaf = format!("{}.json", path_safe(id));
        let response = self
            .endpoint
            .get(&[collection, &leaf])
            .send()
            .await
            .map_err(DirectoryError::Transport)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(DirectoryError::Status {
                status: status.as_u16(),
                body: error_body(response).await,
            });
        }

        response
            .json::<Option<T>>()
            .await
            .map_err(|e| DirectoryError::InvalidEntry(e.to_string()))
    }
}

#[async_trait]
impl PublicKeyDirectory for DirectoryClient {
    async fn public_key(&self, user_id: &str) -> Result<Option<Vec<u8>>, DirectoryError> {
        let Some(entry) = self.get::<PublicKeyEntry>(PUBLIC_KEYS, user_id).await? else {
            return Ok(None);
        };
        let key = STANDARD
            .decode(entry.public_key_b64.trim())
            .map_err(|e| DirectoryError::InvalidEntry(format!("public_key_b64: {}", e)))?;
        Ok(Some(key))
    }
}

#[async_trait]
impl MetadataStore for DirectoryClient {
    async fn publish(&self, metadata: &KeyMetadata) -> Result<(), DirectoryError> {
        self.put(QKD_KEYS, &metadata.key_id, metadata).await
    }

    async fn fetch(&self, key_id: &str) -> Result<Option<KeyMetadata>, DirectoryError> {
        self.get(QKD_KEYS, key_id).await
    }
}
