//! Quantum key simulator
//!
//! Stands in for a QKD link. Both ends derive the same key from its
//! identifier, so the key itself never travels; only metadata (length,
//! timestamp, recipient) is published for the receiving side to look up.
//!
//! Derivation sits behind [`KeyDerivation`] so a hardware-backed source can
//! replace the hash chain without the orchestrator noticing.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use ring::digest::{digest, SHA256, SHA256_OUTPUT_LEN};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::directory::DirectoryError;
use crate::record::KeyRecord;

pub const KEY_ID_PREFIX: &str = "qkd_";
pub const SOURCE_TAG: &str = "qkd_simulation";
pub const DEFAULT_MAX_KEY_BYTES: usize = 1024 * 1024;
/// Secret bytes the simulator keeps in memory before evicting the oldest keys
pub const DEFAULT_CACHE_BYTES: usize = 4 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum QuantumKeyError {
    #[error("Quantum key not found: {0}")]
    NotFound(String),

    #[error("Invalid quantum key length: {0}")]
    InvalidLength(usize),

    #[error("Quantum channel cannot supply {requested} bytes (max {max})")]
    LengthUnavailable { requested: usize, max: usize },

    #[error("Quantum key metadata unavailable: {0}")]
    Metadata(#[from] DirectoryError),
}

/// Turns a key identifier into key material. Must be a pure function of its
/// inputs.
pub trait KeyDerivation: Send + Sync {
    fn derive(&self, key_id: &str, length: usize) -> Zeroizing<Vec<u8>>;

    fn name(&self) -> &'static str;
}

/// SHA-256 hash chain: seed = H(key_id), block_i = H(block_{i-1}), output is
/// the concatenated blocks truncated to the requested length.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashChain;

impl KeyDerivation for HashChain {
    fn derive(&self, key_id: &str, length: usize) -> Zeroizing<Vec<u8>> {
        let blocks = length.div_ceil(SHA256_OUTPUT_LEN);
        let mut out = Zeroizing::new(Vec::with_capacity(blocks * SHA256_OUTPUT_LEN));

        let mut block = digest(&SHA256, key_id.as_bytes());
        for _ in 0..blocks {
            block = digest(&SHA256, block.as_ref());
            out.extend_from_slice(block.as_ref());
        }
        out.truncate(length);
        out
    }

    fn name(&self) -> &'static str {
        "sha256-hash-chain"
    }
}

/// The non-secret half of a quantum key, shared out of band
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMetadata {
    pub key_id: String,
    pub length_bytes: usize,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_hint: Option<String>,
    pub source: String,
}

/// Where key metadata is published and looked up
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn publish(&self, metadata: &KeyMetadata) -> Result<(), DirectoryError>;

    async fn fetch(&self, key_id: &str) -> Result<Option<KeyMetadata>, DirectoryError>;
}

/// Process-local metadata store. Two simulators sharing one instance behave
/// like two ends sharing a directory.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    entries: RwLock<HashMap<String, KeyMetadata>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn publish(&self, metadata: &KeyMetadata) -> Result<(), DirectoryError> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(metadata.key_id.clone(), metadata.clone());
        Ok(())
    }

    async fn fetch(&self, key_id: &str) -> Result<Option<KeyMetadata>, DirectoryError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key_id)
            .cloned())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulatorStatus {
    pub mode: &'static str,
    pub derivation: &'static str,
    pub cached_keys: usize,
    pub cached_bytes: usize,
    pub max_key_bytes: usize,
    pub timestamp: DateTime<Utc>,
}

// Oldest-first eviction once `capacity` secret bytes are held. The newest
// entry is always kept, even when it alone exceeds the budget.
struct KeyCache {
    entries: HashMap<String, KeyRecord>,
    order: VecDeque<String>,
    bytes: usize,
    capacity: usize,
}

impl KeyCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            bytes: 0,
            capacity,
        }
    }

    fn get(&self, key_id: &str) -> Option<KeyRecord> {
        self.entries.get(key_id).cloned()
    }

    fn insert(&mut self, record: &KeyRecord) {
        if self.entries.contains_key(record.key_id()) {
            return;
        }
        self.bytes += record.length();
        self.order.push_back(record.key_id().to_string());
        self.entries
            .insert(record.key_id().to_string(), record.clone());

        while self.bytes > self.capacity && self.order.len() > 1 {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(evicted) = self.entries.remove(&oldest) {
                self.bytes -= evicted.length();
                debug!("Evicted quantum key {} from cache", oldest);
            }
        }
    }
}

pub struct QuantumKeySimulator {
    derivation: Box<dyn KeyDerivation>,
    metadata: Arc<dyn MetadataStore>,
    cache: RwLock<KeyCache>,
    max_key_bytes: usize,
}

impl QuantumKeySimulator {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self::with_derivation(Box::new(HashChain), metadata)
    }

    pub fn with_derivation(derivation: Box<dyn KeyDerivation>, metadata: Arc<dyn MetadataStore>) -> Self {
        Self {
            derivation,
            metadata,
            cache: RwLock::new(KeyCache::new(DEFAULT_CACHE_BYTES)),
            max_key_bytes: DEFAULT_MAX_KEY_BYTES,
        }
    }

    pub fn with_max_key_bytes(mut self, max_key_bytes: usize) -> Self {
        self.max_key_bytes = max_key_bytes;
        self
    }

    /// Secret bytes kept for ids this process minted or looked up. Evicted
    /// keys are re-derived from published metadata on the next lookup.
    pub fn with_cache_bytes(mut self, cache_bytes: usize) -> Self {
        self.cache
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .capacity = cache_bytes;
        self
    }

    pub fn max_key_bytes(&self) -> usize {
        self.max_key_bytes
    }

    fn check_length(&self, length: usize) -> Result<(), QuantumKeyError> {
        if length == 0 {
            return Err(QuantumKeyError::InvalidLength(length));
        }
        if length > self.max_key_bytes {
            return Err(QuantumKeyError::LengthUnavailable {
                requested: length,
                max: self.max_key_bytes,
            });
        }
        Ok(())
    }

    /// Mint a fresh key. Metadata publication is best effort: a failure is
    /// logged and the key is still returned.
    pub async fn new_key(
        &self,
        length: usize,
        recipient_hint: Option<&str>,
    ) -> Result<KeyRecord, QuantumKeyError> {
        self.check_length(length)?;

        let mut id_bytes = [0u8; 16];
        OsRng.fill_bytes(&mut id_bytes);
        let key_id = format!("{}{}", KEY_ID_PREFIX, hex::encode(id_bytes));

        let material = self.derivation.derive(&key_id, length);
        let record = KeyRecord::new(key_id.clone(), material.to_vec());
        self.remember(&record);

        let metadata = KeyMetadata {
            key_id: key_id.clone(),
            length_bytes: length,
            timestamp: Utc::now(),
            recipient_hint: recipient_hint.map(str::to_string),
            source: SOURCE_TAG.to_string(),
        };
        if let Err(e) = self.metadata.publish(&metadata).await {
            warn!("Failed to publish metadata for {}: {}", key_id, e);
        }

        info!("Generated quantum key {} ({} bytes)", key_id, length);
        Ok(record)
    }

    /// Cached copy if present, otherwise re-derive from published metadata
    pub async fn key_by_id(&self, key_id: &str) -> Result<KeyRecord, QuantumKeyError> {
        if let Some(record) = self.cached(key_id) {
            debug!("Quantum key {} served from cache", key_id);
            return Ok(record);
        }

        let metadata = self
            .metadata
            .fetch(key_id)
            .await?
            .ok_or_else(|| QuantumKeyError::NotFound(key_id.to_string()))?;
        self.check_length(metadata.length_bytes)?;

        let material = self.derivation.derive(key_id, metadata.length_bytes);
        let record = KeyRecord::new(key_id, material.to_vec());
        self.remember(&record);

        debug!(
            "Re-derived quantum key {} ({} bytes)",
            key_id, metadata.length_bytes
        );
        Ok(record)
    }

    pub fn status(&self) -> SimulatorStatus {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        SimulatorStatus {
            mode: "simulation",
            derivation: self.derivation.name(),
            cached_keys: cache.entries.len(),
            cached_bytes: cache.bytes,
            max_key_bytes: self.max_key_bytes,
            timestamp: Utc::now(),
        }
    }

    fn cached(&self, key_id: &str) -> Option<KeyRecord> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key_id)
    }

    // Derivation is deterministic, so a racing insert for the same id
    // stores identical bytes.
    fn remember(&self, record: &KeyRecord) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record);
    }
}
