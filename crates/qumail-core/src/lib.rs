//! QuMail Core - envelopes and the encryption orchestrator
//!
//! Four security levels, from fastest to most secret:
//! - 4: plaintext, carried as-is
//! - 3: random AEAD key wrapped with the recipient's Kyber public key
//! - 2: AEAD under a quantum-simulated or key-manager key
//! - 1: one-time pad
//!
//! Frontends build a [`CryptoService`] from a [`CryptoConfig`] and exchange
//! [`Envelope`]s as JSON text.

pub mod config;
pub mod envelope;
pub mod error;
pub mod level;
pub mod payload;
pub mod service;

pub use config::{ConfigError, CryptoConfig};
pub use envelope::{AeadParts, Envelope, EnvelopeError, KeyOrigin, QUMAIL_VERSION};
pub use error::{DecryptionError, EncryptionError, QuMailError, Result};
pub use level::{EncryptionMethod, LevelError, SecurityLevel};
pub use payload::{Attachment, Payload};
pub use service::{CryptoService, EncryptRequest};
