//! OS keychain custody of the KEM private key

use base64::{engine::general_purpose::STANDARD, Engine as _};
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

pub const SERVICE_NAME: &str = "QuMail_PQC_Private";

#[derive(Error, Debug)]
pub enum KeychainError {
    #[error("No private key stored for {0}")]
    NotFound(String),
    #[error("Stored private key is corrupt: {0}")]
    Corrupt(String),
    #[error("Platform error: {0}")]
    Platform(String),
}

pub struct IdentityKeychain {
    service_name: String,
}

impl IdentityKeychain {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service_name: &str) -> Self {
        Self { service_name: service_name.to_string() }
    }

    fn entry(&self, user_id: &str) -> Result<keyring::Entry, KeychainError> {
        keyring::Entry::new(&self.service_name, user_id)
            .map_err(|e| KeychainError::Platform(e.to_string()))
    }

    pub fn store_private_key(&self, user_id: &str, private_key: &[u8]) -> Result<(), KeychainError> {
        let mut encoded = STANDARD.encode(private_key);
        let result = self
            .entry(user_id)?
            .set_password(&encoded)
            .map_err(|e| KeychainError::Platform(e.to_string()));
        encoded.zeroize();
        result
    }

    pub fn load_private_key(&self, user_id: &str) -> Result<Zeroizing<Vec<u8>>, KeychainError> {
        let encoded = Zeroizing::new(self.entry(user_id)?.get_password().map_err(|e| match e {
            keyring::Error::NoEntry => KeychainError::NotFound(user_id.to_string()),
            _ => KeychainError::Platform(e.to_string()),
        })?);
        STANDARD
            .decode(encoded.trim())
            .map(Zeroizing::new)
            .map_err(|e| KeychainError::Corrupt(e.to_string()))
    }
}

impl Default for IdentityKeychain {
    fn default() -> Self {
        Self::new()
    }
}
