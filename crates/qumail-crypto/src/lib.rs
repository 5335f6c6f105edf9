//! QuMail Crypto - primitive layer
//!
//! Stateless building blocks for the payload pipeline:
//! - ChaCha20-Poly1305 AEAD with detached tags
//! - Kyber-512 key encapsulation
//! - PBKDF2-HMAC-SHA256 key stretching
//! - XOR masking and one-time pad
//!
//! No I/O happens in this crate.

pub mod cipher;
pub mod kdf;
pub mod mask;
pub mod pq;

pub use cipher::{aead_decrypt, aead_encrypt, CipherError, Sealed};
pub use kdf::{derive_key, KdfError, KdfParams};
pub use mask::{one_time_pad, xor_mask, MaskError};
pub use pq::{KemError, KemKeyPair};
