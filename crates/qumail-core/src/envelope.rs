//! Envelope codec
//!
//! On the wire an envelope is one flat JSON object:
//!
//! ```text
//! {"qumail_version":"4.0","security_level":2,"encryption_method":"qkd",
//!  "key_id":"qkd_…","salt":"…","nonce":"…","tag":"…","ciphertext":"…"}
//! ```
//!
//! Binary fields are standard base64. A level-2 qkd envelope sealed with a
//! non-default PBKDF2 work factor also carries `kdf_iterations`. Fields a
//! level does not use are left out entirely; `null` is never written and never accepted. In memory the
//! same data is the [`Envelope`] enum, so a level-2 envelope without a nonce
//! cannot exist past `parse`.

use qumail_crypto::cipher::{KEY_SIZE, NONCE_SIZE, SALT_SIZE, TAG_SIZE};
use qumail_crypto::kdf::{DEFAULT_ITERATIONS, MAX_ITERATIONS};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::level::{EncryptionMethod, SecurityLevel};
use crate::payload::Payload;

pub const QUMAIL_VERSION: &str = "4.0";

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("Malformed envelope: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported envelope version: {0}")]
    UnsupportedVersion(String),

    #[error("Level {level} envelope is missing `{field}`")]
    MissingField { level: u8, field: &'static str },

    #[error("Level {level} envelope must not carry `{field}`")]
    UnexpectedField { level: u8, field: &'static str },

    #[error("`{field}` must be {expected} bytes, got {actual}")]
    InvalidLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("`kdf_iterations` must be between 1 and 10000000, got {0}")]
    InvalidKdfIterations(u32),
}

/// Serde adapter for byte strings carried as base64 text
pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

mod base64_field {
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => super::base64_bytes::serialize(bytes, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        super::base64_bytes::deserialize(deserializer).map(Some)
    }
}

// Absent is fine, `null` is not.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireEnvelope {
    qumail_version: String,
    security_level: SecurityLevel,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    encryption_method: Option<EncryptionMethod>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_field")]
    salt: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    kdf_iterations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_field")]
    nonce: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_field")]
    tag: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_field")]
    kem_ciphertext: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_field")]
    wrapped_key: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_field")]
    ciphertext: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    plaintext_payload: Option<Payload>,
}

impl WireEnvelope {
    fn empty(security_level: SecurityLevel) -> Self {
        Self {
            qumail_version: QUMAIL_VERSION.to_string(),
            security_level,
            encryption_method: None,
            key_id: None,
            salt: None,
            kdf_iterations: None,
            nonce: None,
            tag: None,
            kem_ciphertext: None,
            wrapped_key: None,
            ciphertext: None,
            plaintext_payload: None,
        }
    }

    fn reject_leftovers(&self) -> Result<(), EnvelopeError> {
        let leftovers = [
            ("encryption_method", self.encryption_method.is_some()),
            ("key_id", self.key_id.is_some()),
            ("salt", self.salt.is_some()),
            ("kdf_iterations", self.kdf_iterations.is_some()),
            ("nonce", self.nonce.is_some()),
            ("tag", self.tag.is_some()),
            ("kem_ciphertext", self.kem_ciphertext.is_some()),
            ("wrapped_key", self.wrapped_key.is_some()),
            ("ciphertext", self.ciphertext.is_some()),
            ("plaintext_payload", self.plaintext_payload.is_some()),
        ];
        match leftovers.iter().find(|(_, set)| *set) {
            Some((field, _)) => Err(EnvelopeError::UnexpectedField {
                level: self.security_level.as_u8(),
                field: *field,
            }),
            None => Ok(()),
        }
    }
}

fn take<T>(slot: &mut Option<T>, level: SecurityLevel, field: &'static str) -> Result<T, EnvelopeError> {
    slot.take().ok_or(EnvelopeError::MissingField {
        level: level.as_u8(),
        field,
    })
}

fn fixed<const N: usize>(bytes: Vec<u8>, field: &'static str) -> Result<[u8; N], EnvelopeError> {
    <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| EnvelopeError::InvalidLength {
        field,
        expected: N,
        actual: bytes.len(),
    })
}

fn kdf_iterations(value: Option<u32>) -> Result<u32, EnvelopeError> {
    match value {
        None => Ok(DEFAULT_ITERATIONS),
        Some(n) if (1..=MAX_ITERATIONS).contains(&n) => Ok(n),
        Some(n) => Err(EnvelopeError::InvalidKdfIterations(n)),
    }
}

/// Nonce, detached tag and ciphertext of an AEAD envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AeadParts {
    pub nonce: [u8; NONCE_SIZE],
    pub tag: [u8; TAG_SIZE],
    pub ciphertext: Vec<u8>,
}

impl AeadParts {
    fn take_from(wire: &mut WireEnvelope) -> Result<Self, EnvelopeError> {
        let level = wire.security_level;
        Ok(Self {
            nonce: fixed(take(&mut wire.nonce, level, "nonce")?, "nonce")?,
            tag: fixed(take(&mut wire.tag, level, "tag")?, "tag")?,
            ciphertext: take(&mut wire.ciphertext, level, "ciphertext")?,
        })
    }

    fn put_into(&self, wire: &mut WireEnvelope) {
        wire.nonce = Some(self.nonce.to_vec());
        wire.tag = Some(self.tag.to_vec());
        wire.ciphertext = Some(self.ciphertext.clone());
    }
}

/// Where a level-2 key came from, and what the receiver needs to rebuild it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOrigin {
    /// Quantum key stretched with PBKDF2 under this salt and work factor
    Quantum {
        salt: [u8; SALT_SIZE],
        iterations: u32,
    },
    /// Key manager key used directly
    KeyManager,
}

impl KeyOrigin {
    pub fn method(&self) -> EncryptionMethod {
        match self {
            KeyOrigin::Quantum { .. } => EncryptionMethod::Qkd,
            KeyOrigin::KeyManager => EncryptionMethod::Pqc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// Level 4
    Plaintext { payload: Payload },
    /// Level 3
    Hybrid {
        kem_ciphertext: Vec<u8>,
        wrapped_key: Vec<u8>,
        sealed: AeadParts,
    },
    /// Level 2
    KeyDerived {
        key_id: String,
        origin: KeyOrigin,
        sealed: AeadParts,
    },
    /// Level 1
    OneTimePad {
        key_id: String,
        method: EncryptionMethod,
        ciphertext: Vec<u8>,
    },
}

impl Envelope {
    pub fn level(&self) -> SecurityLevel {
        match self {
            Envelope::Plaintext { .. } => SecurityLevel::Plaintext,
            Envelope::Hybrid { .. } => SecurityLevel::Hybrid,
            Envelope::KeyDerived { .. } => SecurityLevel::KeyDerived,
            Envelope::OneTimePad { .. } => SecurityLevel::OneTimePad,
        }
    }

    pub fn method(&self) -> Option<EncryptionMethod> {
        match self {
            Envelope::KeyDerived { origin, .. } => Some(origin.method()),
            Envelope::OneTimePad { method, .. } => Some(*method),
            _ => None,
        }
    }

    pub fn key_id(&self) -> Option<&str> {
        match self {
            Envelope::KeyDerived { key_id, .. } | Envelope::OneTimePad { key_id, .. } => {
                Some(key_id.as_str())
            }
            _ => None,
        }
    }

    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(&WireEnvelope::from(self))?)
    }

    pub fn parse(text: &str) -> Result<Self, EnvelopeError> {
        let wire: WireEnvelope = serde_json::from_str(text)?;
        Envelope::try_from(wire)
    }
}

impl From<&Envelope> for WireEnvelope {
    fn from(envelope: &Envelope) -> Self {
        let mut wire = WireEnvelope::empty(envelope.level());
        match envelope {
            Envelope::Plaintext { payload } => {
                wire.plaintext_payload = Some(payload.clone());
            }
            Envelope::Hybrid {
                kem_ciphertext,
                wrapped_key,
                sealed,
            } => {
                wire.kem_ciphertext = Some(kem_ciphertext.clone());
                wire.wrapped_key = Some(wrapped_key.clone());
                sealed.put_into(&mut wire);
            }
            Envelope::KeyDerived {
                key_id,
                origin,
                sealed,
            } => {
                wire.encryption_method = Some(origin.method());
                wire.key_id = Some(key_id.clone());
                if let KeyOrigin::Quantum { salt, iterations } = origin {
                    wire.salt = Some(salt.to_vec());
                    wire.kdf_iterations = Some(*iterations).filter(|n| *n != DEFAULT_ITERATIONS);
                }
                sealed.put_into(&mut wire);
            }
            Envelope::OneTimePad {
                key_id,
                method,
                ciphertext,
            } => {
                wire.encryption_method = Some(*method);
                wire.key_id = Some(key_id.clone());
                wire.ciphertext = Some(ciphertext.clone());
            }
        }
        wire
    }
}

impl TryFrom<WireEnvelope> for Envelope {
    type Error = EnvelopeError;

    fn try_from(mut wire: WireEnvelope) -> Result<Self, Self::Error> {
        if wire.qumail_version != QUMAIL_VERSION {
            return Err(EnvelopeError::UnsupportedVersion(wire.qumail_version));
        }

        let level = wire.security_level;
        let envelope = match level {
            SecurityLevel::Plaintext => Envelope::Plaintext {
                payload: take(&mut wire.plaintext_payload, level, "plaintext_payload")?,
            },
            SecurityLevel::Hybrid => Envelope::Hybrid {
                kem_ciphertext: take(&mut wire.kem_ciphertext, level, "kem_ciphertext")?,
                wrapped_key: fixed::<KEY_SIZE>(
                    take(&mut wire.wrapped_key, level, "wrapped_key")?,
                    "wrapped_key",
                )?
                .to_vec(),
                sealed: AeadParts::take_from(&mut wire)?,
            },
            SecurityLevel::KeyDerived => {
                let method = take(&mut wire.encryption_method, level, "encryption_method")?;
                let key_id = take(&mut wire.key_id, level, "key_id")?;
                let origin = match method {
                    EncryptionMethod::Qkd => KeyOrigin::Quantum {
                        salt: fixed(take(&mut wire.salt, level, "salt")?, "salt")?,
                        iterations: kdf_iterations(wire.kdf_iterations.take())?,
                    },
                    EncryptionMethod::Pqc => KeyOrigin::KeyManager,
                };
                Envelope::KeyDerived {
                    key_id,
                    origin,
                    sealed: AeadParts::take_from(&mut wire)?,
                }
            }
            SecurityLevel::OneTimePad => Envelope::OneTimePad {
                method: take(&mut wire.encryption_method, level, "encryption_method")?,
                key_id: take(&mut wire.key_id, level, "key_id")?,
                ciphertext: take(&mut wire.ciphertext, level, "ciphertext")?,
            },
        };

        wire.reject_leftovers()?;
        Ok(envelope)
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireEnvelope::from(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Envelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireEnvelope::deserialize(deserializer)?;
        Envelope::try_from(wire).map_err(serde::de::Error::custom)
    }
}
