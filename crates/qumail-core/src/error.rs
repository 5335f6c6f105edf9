//! Error types for the orchestrator

use qumail_crypto::{CipherError, KdfError, KemError, MaskError};
use qumail_keys::{DirectoryError, KeyManagerError, QuantumKeyError};
use thiserror::Error;

use crate::config::ConfigError;
use crate::envelope::EnvelopeError;

#[derive(Error, Debug)]
pub enum EncryptionError {
    #[error("No public key available for recipient {0}")]
    MissingRecipientKey(String),

    #[error("Level 3 needs a recipient public key or a recipient id with a directory")]
    NoRecipient,

    #[error("Key too short for one-time pad: need {needed} bytes, got {available}")]
    KeyTooShort { needed: usize, available: usize },

    #[error("Payload serialization failed: {0}")]
    Payload(#[source] serde_json::Error),

    #[error("Key manager: {0}")]
    KeyManager(#[from] KeyManagerError),

    #[error("Quantum key: {0}")]
    QuantumKey(#[from] QuantumKeyError),

    #[error("Directory: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Cipher: {0}")]
    Cipher(#[from] CipherError),

    #[error("KEM: {0}")]
    Kem(#[from] KemError),

    #[error("KDF: {0}")]
    Kdf(#[from] KdfError),

    #[error("Mask: {0}")]
    Mask(#[from] MaskError),
}

#[derive(Error, Debug)]
pub enum DecryptionError {
    #[error("tamper detected")]
    Tampered,

    #[error("missing key material")]
    MissingKeyMaterial,

    #[error("Key not found or already consumed: {0}")]
    KeyNotFound(String),

    #[error("Key too short for one-time pad: need {needed} bytes, got {available}")]
    KeyTooShort { needed: usize, available: usize },

    #[error("Decrypted payload is malformed: {0}")]
    Payload(#[source] serde_json::Error),

    #[error("Key manager: {0}")]
    KeyManager(#[source] KeyManagerError),

    #[error("Quantum key: {0}")]
    QuantumKey(#[source] QuantumKeyError),

    #[error("Cipher: {0}")]
    Cipher(#[source] CipherError),

    #[error("KEM: {0}")]
    Kem(#[from] KemError),

    #[error("KDF: {0}")]
    Kdf(#[from] KdfError),
}

impl From<CipherError> for DecryptionError {
    fn from(e: CipherError) -> Self {
        match e {
            CipherError::Tampered => DecryptionError::Tampered,
            other => DecryptionError::Cipher(other),
        }
    }
}

impl From<KeyManagerError> for DecryptionError {
    fn from(e: KeyManagerError) -> Self {
        match e {
            KeyManagerError::NotFound(id) => DecryptionError::KeyNotFound(id),
            other => DecryptionError::KeyManager(other),
        }
    }
}

impl From<QuantumKeyError> for DecryptionError {
    fn from(e: QuantumKeyError) -> Self {
        match e {
            QuantumKeyError::NotFound(id) => DecryptionError::KeyNotFound(id),
            other => DecryptionError::QuantumKey(other),
        }
    }
}

impl From<MaskError> for DecryptionError {
    fn from(e: MaskError) -> Self {
        match e {
            MaskError::KeyTooShort { needed, available } => {
                DecryptionError::KeyTooShort { needed, available }
            }
        }
    }
}

/// Everything the orchestrator's text-level entry points can fail with
#[derive(Error, Debug)]
pub enum QuMailError {
    #[error("Encryption failed: {0}")]
    Encryption(#[from] EncryptionError),

    #[error("Decryption failed: {0}")]
    Decryption(#[from] DecryptionError),

    #[error("Envelope: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("Configuration: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, QuMailError>;
