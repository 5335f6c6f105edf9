use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LevelError {
    #[error("Unknown security level: {0} (expected 1-4)")]
    UnknownLevel(String),

    #[error("Unknown encryption method: {0} (expected qkd or pqc)")]
    UnknownMethod(String),
}

/// Lower numbers trade speed for secrecy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SecurityLevel {
    /// XOR with a key at least as long as the payload
    OneTimePad = 1,
    /// AEAD under a key from the quantum simulator or the key manager
    KeyDerived = 2,
    /// AEAD under a random key wrapped with the recipient's KEM public key
    Hybrid = 3,
    Plaintext = 4,
}

impl SecurityLevel {
    pub const ALL: [SecurityLevel; 4] = [
        SecurityLevel::OneTimePad,
        SecurityLevel::KeyDerived,
        SecurityLevel::Hybrid,
        SecurityLevel::Plaintext,
    ];

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether key material comes from the quantum simulator or the key manager
    pub fn uses_method(self) -> bool {
        matches!(self, SecurityLevel::OneTimePad | SecurityLevel::KeyDerived)
    }
}

impl TryFrom<u8> for SecurityLevel {
    type Error = LevelError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SecurityLevel::OneTimePad),
            2 => Ok(SecurityLevel::KeyDerived),
            3 => Ok(SecurityLevel::Hybrid),
            4 => Ok(SecurityLevel::Plaintext),
            other => Err(LevelError::UnknownLevel(other.to_string())),
        }
    }
}

impl From<SecurityLevel> for u8 {
    fn from(level: SecurityLevel) -> Self {
        level.as_u8()
    }
}

impl FromStr for SecurityLevel {
    type Err = LevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u8>()
            .map_err(|_| LevelError::UnknownLevel(s.to_string()))
            .and_then(SecurityLevel::try_from)
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SecurityLevel::OneTimePad => "one-time pad",
            SecurityLevel::KeyDerived => "key-derived AEAD",
            SecurityLevel::Hybrid => "hybrid KEM+AEAD",
            SecurityLevel::Plaintext => "plaintext",
        };
        write!(f, "{} ({})", self.as_u8(), name)
    }
}

/// Source of key material for levels 1 and 2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionMethod {
    /// Quantum key simulator
    #[default]
    Qkd,
    /// Key manager
    Pqc,
}

impl EncryptionMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            EncryptionMethod::Qkd => "qkd",
            EncryptionMethod::Pqc => "pqc",
        }
    }
}

impl FromStr for EncryptionMethod {
    type Err = LevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "qkd" => Ok(EncryptionMethod::Qkd),
            "pqc" => Ok(EncryptionMethod::Pqc),
            _ => Err(LevelError::UnknownMethod(s.to_string())),
        }
    }
}

impl fmt::Display for EncryptionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
