//! ChaCha20-Poly1305 authenticated encryption
//!
//! The tag is kept detached from the ciphertext because the envelope
//! carries nonce, tag and ciphertext as separate fields.

use chacha20poly1305::{
    aead::{AeadInPlace, KeyInit, OsRng},
    ChaCha20Poly1305, Nonce, Tag,
};
use rand::RngCore;
use thiserror::Error;
use zeroize::Zeroizing;

/// 256-bit key (32 bytes)
pub const KEY_SIZE: usize = 32;
/// 96-bit nonce (12 bytes)
pub const NONCE_SIZE: usize = 12;
/// 128-bit Poly1305 tag (16 bytes)
pub const TAG_SIZE: usize = 16;
/// Salt length used for key stretching
pub const SALT_SIZE: usize = 16;

#[derive(Error, Debug)]
pub enum CipherError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Authentication failed - data may be corrupted or tampered")]
    Tampered,

    #[error("Invalid key size: expected {KEY_SIZE}, got {0}")]
    InvalidKeySize(usize),

    #[error("Invalid nonce size: expected {NONCE_SIZE}, got {0}")]
    InvalidNonceSize(usize),

    #[error("Invalid tag size: expected {TAG_SIZE}, got {0}")]
    InvalidTagSize(usize),
}

/// Ciphertext with its detached authentication tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_SIZE],
}

/// Generate a cryptographically secure random key
pub fn generate_key() -> Zeroizing<[u8; KEY_SIZE]> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    OsRng.fill_bytes(key.as_mut());
    key
}

/// Generate a cryptographically secure random nonce
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Generate a random salt for [`crate::kdf::derive_key`]
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

fn cipher_for(key: &[u8]) -> Result<ChaCha20Poly1305, CipherError> {
    if key.len() != KEY_SIZE {
        return Err(CipherError::InvalidKeySize(key.len()));
    }
    ChaCha20Poly1305::new_from_slice(key).map_err(|_| CipherError::InvalidKeySize(key.len()))
}

/// Encrypt `plaintext` under `key` and `nonce`.
///
/// The caller owns nonce uniqueness; every envelope draws a fresh one from
/// [`generate_nonce`].
pub fn aead_encrypt(key: &[u8], nonce: &[u8], plaintext: &[u8]) -> Result<Sealed, CipherError> {
    let cipher = cipher_for(key)?;
    if nonce.len() != NONCE_SIZE {
        return Err(CipherError::InvalidNonceSize(nonce.len()));
    }

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(nonce), b"", &mut buffer)
        .map_err(|_| CipherError::EncryptionFailed)?;

    let mut tag_bytes = [0u8; TAG_SIZE];
    tag_bytes.copy_from_slice(tag.as_slice());

    Ok(Sealed {
        ciphertext: buffer,
        tag: tag_bytes,
    })
}

/// Decrypt and authenticate.
///
/// Fails closed: on a bad tag the working buffer is wiped and nothing is
/// returned.
pub fn aead_decrypt(
    key: &[u8],
    nonce: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CipherError> {
    let cipher = cipher_for(key)?;
    if nonce.len() != NONCE_SIZE {
        return Err(CipherError::InvalidNonceSize(nonce.len()));
    }
    if tag.len() != TAG_SIZE {
        return Err(CipherError::InvalidTagSize(tag.len()));
    }

    let mut buffer = Zeroizing::new(ciphertext.to_vec());
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(nonce),
            b"",
            buffer.as_mut_slice(),
            Tag::from_slice(tag),
        )
        .map_err(|_| CipherError::Tampered)?;

    Ok(buffer)
}
