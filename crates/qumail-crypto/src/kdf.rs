//! PBKDF2-HMAC-SHA256 key stretching

use std::num::NonZeroU32;

use ring::pbkdf2;
use thiserror::Error;
use zeroize::Zeroizing;

pub const DEFAULT_ITERATIONS: u32 = 100_000;
pub const DEFAULT_OUTPUT_LEN: usize = 32;
/// Upper bound on a work factor accepted from configuration or an envelope
pub const MAX_ITERATIONS: u32 = 10_000_000;

#[derive(Error, Debug)]
pub enum KdfError {
    #[error("Iteration count must be non-zero")]
    ZeroIterations,

    #[error("Iteration count {0} exceeds the maximum of 10000000")]
    TooManyIterations(u32),

    #[error("Output length must be non-zero")]
    EmptyOutput,
}

/// Work factor and output size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub iterations: u32,
    pub out_len: usize,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            out_len: DEFAULT_OUTPUT_LEN,
        }
    }
}

/// Stretch `secret` with `salt` into `out_len` bytes
pub fn derive_key(
    secret: &[u8],
    salt: &[u8],
    iterations: u32,
    out_len: usize,
) -> Result<Zeroizing<Vec<u8>>, KdfError> {
    if iterations > MAX_ITERATIONS {
        return Err(KdfError::TooManyIterations(iterations));
    }
    let iterations = NonZeroU32::new(iterations).ok_or(KdfError::ZeroIterations)?;
    if out_len == 0 {
        return Err(KdfError::EmptyOutput);
    }

    let mut out = Zeroizing::new(vec![0u8; out_len]);
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        secret,
        out.as_mut_slice(),
    );
    Ok(out)
}

impl KdfParams {
    pub fn derive(&self, secret: &[u8], salt: &[u8]) -> Result<Zeroizing<Vec<u8>>, KdfError> {
        derive_key(secret, salt, self.iterations, self.out_len)
    }
}
