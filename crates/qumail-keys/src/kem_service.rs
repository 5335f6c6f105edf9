//! KEM authority client and local key wrapping
//!
//! Identity key pairs come from a remote authority. Wrapping and unwrapping a
//! symmetric key against a public key happens locally.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use qumail_crypto::mask::xor_mask;
use qumail_crypto::pq::{self, KemError, KemKeyPair};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use zeroize::{Zeroize, Zeroizing};

use crate::http::{error_body, Endpoint, EndpointError};

#[derive(Error, Debug)]
pub enum KemServiceError {
    #[error("KEM authority request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("KEM authority returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid KEM authority response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Kem(#[from] KemError),
}

/// A symmetric key masked with a KEM shared secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedKey {
    pub kem_ciphertext: Vec<u8>,
    pub wrapped_key: Vec<u8>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    user_id: &'a str,
}

#[derive(Deserialize)]
struct GeneratedKeys {
    #[serde(alias = "publicKey_b64")]
    public_key_b64: String,
    #[serde(alias = "privateKey_b64")]
    private_key_b64: String,
}

#[derive(Debug, Clone)]
pub struct KemServiceClient {
    endpoint: Endpoint,
}

impl KemServiceClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, EndpointError> {
        Ok(Self {
            endpoint: Endpoint::new(base_url, timeout)?,
        })
    }

    /// Ask the authority for a fresh identity key pair
    pub async fn generate_identity(&self, user_id: &str) -> Result<KemKeyPair, KemServiceError> {
        let response = self
            .endpoint
            .post(&["generate-keys"])
            .json(&GenerateRequest { user_id })
            .send()
            .await
            .map_err(KemServiceError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(KemServiceError::Status {
                status: status.as_u16(),
                body: error_body(response).await,
            });
        }

        let mut keys: GeneratedKeys = response
            .json()
            .await
            .map_err(|e| KemServiceError::InvalidResponse(e.to_string()))?;

        let private_key = STANDARD.decode(keys.private_key_b64.trim()).map(Zeroizing::new);
        keys.private_key_b64.zeroize();
        let private_key = private_key
            .map_err(|e| KemServiceError::InvalidResponse(format!("private key: {}", e)))?;
        let public_key = STANDARD
            .decode(keys.public_key_b64.trim())
            .map_err(|e| KemServiceError::InvalidResponse(format!("public key: {}", e)))?;

        let pair = KemKeyPair::from_parts(public_key, private_key.to_vec())?;
        info!("Generated KEM identity for {}", user_id);
        Ok(pair)
    }
}

/// Encapsulate against `recipient_public_key` and mask `symmetric_key` with the
/// resulting shared secret. The secret is dropped (and wiped) on return.
pub fn wrap_symmetric_key(
    recipient_public_key: &[u8],
    symmetric_key: &[u8],
) -> Result<WrappedKey, KemError> {
    let encapsulated = pq::encapsulate(recipient_public_key)?;
    let wrapped_key = xor_mask(symmetric_key, &encapsulated.shared_secret);
    Ok(WrappedKey {
        kem_ciphertext: encapsulated.ciphertext,
        wrapped_key,
    })
}

/// Recover the symmetric key. A private key that does not match the public key
/// used for wrapping yields garbage rather than an error.
pub fn unwrap_symmetric_key(
    kem_ciphertext: &[u8],
    wrapped_key: &[u8],
    private_key: &[u8],
) -> Result<Zeroizing<Vec<u8>>, KemError> {
    let shared_secret = pq::decapsulate(kem_ciphertext, private_key)?;
    Ok(Zeroizing::new(xor_mask(wrapped_key, &shared_secret)))
}
