//! Post-quantum key encapsulation (Kyber-512)
//!
//! Keys and ciphertexts cross this boundary as raw bytes so they can travel
//! base64-encoded in envelopes and through the KEM authority's JSON API.

use pqcrypto_kyber::kyber512;
use pqcrypto_traits::kem::{
    Ciphertext as _, PublicKey as _, SecretKey as _, SharedSecret as _,
};
use secrecy::{ExposeSecret, SecretVec};
use thiserror::Error;
use zeroize::Zeroizing;

pub const PUBLIC_KEY_SIZE: usize = 800;
pub const PRIVATE_KEY_SIZE: usize = 1632;
pub const CIPHERTEXT_SIZE: usize = 768;
pub const SHARED_SECRET_SIZE: usize = 32;

#[derive(Error, Debug)]
pub enum KemError {
    #[error("Invalid public key: expected {PUBLIC_KEY_SIZE} bytes, got {0}")]
    InvalidPublicKey(usize),

    #[error("Invalid private key: expected {PRIVATE_KEY_SIZE} bytes, got {0}")]
    InvalidPrivateKey(usize),

    #[error("Invalid KEM ciphertext: expected {CIPHERTEXT_SIZE} bytes, got {0}")]
    InvalidCiphertext(usize),
}

/// A long-term identity key pair. The private half is wiped on drop.
pub struct KemKeyPair {
    pub public_key: Vec<u8>,
    private_key: SecretVec<u8>,
}

impl KemKeyPair {
    /// Assemble a key pair from bytes issued elsewhere (e.g. the KEM authority).
    pub fn from_parts(public_key: Vec<u8>, private_key: Vec<u8>) -> Result<Self, KemError> {
        if public_key.len() != PUBLIC_KEY_SIZE {
            return Err(KemError::InvalidPublicKey(public_key.len()));
        }
        if private_key.len() != PRIVATE_KEY_SIZE {
            return Err(KemError::InvalidPrivateKey(private_key.len()));
        }
        Ok(Self {
            public_key,
            private_key: SecretVec::new(private_key),
        })
    }

    pub fn private_key(&self) -> &[u8] {
        self.private_key.expose_secret()
    }
}

impl std::fmt::Debug for KemKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KemKeyPair")
            .field("public_key_len", &self.public_key.len())
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

/// Result of encapsulating against a public key
pub struct Encapsulated {
    pub ciphertext: Vec<u8>,
    pub shared_secret: Zeroizing<Vec<u8>>,
}

/// Generate a new key pair locally
pub fn keygen() -> KemKeyPair {
    let (pk, sk) = kyber512::keypair();
    KemKeyPair {
        public_key: pk.as_bytes().to_vec(),
        private_key: SecretVec::new(sk.as_bytes().to_vec()),
    }
}

/// Encapsulate a fresh shared secret against `public_key`
pub fn encapsulate(public_key: &[u8]) -> Result<Encapsulated, KemError> {
    let pk = kyber512::PublicKey::from_bytes(public_key)
        .map_err(|_| KemError::InvalidPublicKey(public_key.len()))?;

    let (ss, ct) = kyber512::encapsulate(&pk);

    Ok(Encapsulated {
        ciphertext: ct.as_bytes().to_vec(),
        shared_secret: Zeroizing::new(ss.as_bytes().to_vec()),
    })
}

/// Recover the shared secret from `ciphertext` with `private_key`.
///
/// Kyber uses implicit rejection: a well-formed but non-matching private key
/// yields an unrelated secret rather than an error.
pub fn decapsulate(ciphertext: &[u8], private_key: &[u8]) -> Result<Zeroizing<Vec<u8>>, KemError> {
    let sk = kyber512::SecretKey::from_bytes(private_key)
        .map_err(|_| KemError::InvalidPrivateKey(private_key.len()))?;
    let ct = kyber512::Ciphertext::from_bytes(ciphertext)
        .map_err(|_| KemError::InvalidCiphertext(ciphertext.len()))?;

    let ss = kyber512::decapsulate(&ct, &sk);
    Ok(Zeroizing::new(ss.as_bytes().to_vec()))
}
