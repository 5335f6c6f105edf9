//! XOR masking and the one-time pad

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MaskError {
    #[error("One-time pad key too short: need {needed} bytes, have {available}")]
    KeyTooShort { needed: usize, available: usize },
}

/// XOR two byte strings. The shorter one is zero-padded to the longer length,
/// so the output is always `max(a.len(), b.len())` bytes.
pub fn xor_mask(a: &[u8], b: &[u8]) -> Vec<u8> {
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| a.get(i).copied().unwrap_or(0) ^ b.get(i).copied().unwrap_or(0))
        .collect()
}

/// Apply a one-time pad. Only the first `data.len()` key bytes are consumed;
/// a key shorter than the data is refused before any byte is touched.
pub fn one_time_pad(data: &[u8], key: &[u8]) -> Result<Vec<u8>, MaskError> {
    if key.len() < data.len() {
        return Err(MaskError::KeyTooShort {
            needed: data.len(),
            available: key.len(),
        });
    }
    Ok(data.iter().zip(key).map(|(d, k)| d ^ k).collect())
}
