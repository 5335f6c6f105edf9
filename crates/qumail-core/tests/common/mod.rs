//! In-memory key sources for end-to-end pipeline tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use qumail_core::CryptoService;
use qumail_keys::{
    DirectoryError, KeyManagerError, KeyRecord, MemoryMetadataStore, PublicKeyDirectory,
    QuantumKeySimulator, SymmetricKeySource,
};

/// Behaves like the key manager: every issued key can be retrieved once.
#[derive(Default)]
pub struct OneShotKeys {
    keys: Mutex<HashMap<String, Vec<u8>>>,
    counter: Mutex<u64>,
}

impl OneShotKeys {
    pub fn outstanding(&self) -> usize {
        self.keys.lock().unwrap().len()
    }
}

#[async_trait]
impl SymmetricKeySource for OneShotKeys {
    async fn request_key(&self, length: usize) -> Result<KeyRecord, KeyManagerError> {
        let id = {
            let mut counter = self.counter.lock().unwrap();
            *counter += 1;
            format!("km-{}", counter)
        };
        let key: Vec<u8> = (0..length).map(|_| rand::random::<u8>()).collect();
        self.keys.lock().unwrap().insert(id.clone(), key.clone());
        Ok(KeyRecord::new(id, key))
    }

    async fn retrieve_key(&self, key_id: &str) -> Result<KeyRecord, KeyManagerError> {
        self.keys
            .lock()
            .unwrap()
            .remove(key_id)
            .map(|key| KeyRecord::new(key_id, key))
            .ok_or_else(|| KeyManagerError::NotFound(key_id.to_string()))
    }
}

/// Hands out keys shorter than asked for
pub struct ShortKeys {
    pub short_by: usize,
}

#[async_trait]
impl SymmetricKeySource for ShortKeys {
    async fn request_key(&self, length: usize) -> Result<KeyRecord, KeyManagerError> {
        Ok(KeyRecord::new(
            "short-1",
            vec![0x42; length.saturating_sub(self.short_by)],
        ))
    }

    async fn retrieve_key(&self, key_id: &str) -> Result<KeyRecord, KeyManagerError> {
        Err(KeyManagerError::NotFound(key_id.to_string()))
    }
}

#[derive(Default)]
pub struct StaticDirectory {
    pub keys: HashMap<String, Vec<u8>>,
}

#[async_trait]
impl PublicKeyDirectory for StaticDirectory {
    async fn public_key(&self, user_id: &str) -> Result<Option<Vec<u8>>, DirectoryError> {
        Ok(self.keys.get(user_id).cloned())
    }
}

/// Sender and receiver sharing one key manager and one metadata directory,
/// each with its own quantum simulator cache.
pub struct Pair {
    pub sender: CryptoService,
    pub receiver: CryptoService,
    pub key_manager: Arc<OneShotKeys>,
}

pub fn pair() -> Pair {
    let key_manager = Arc::new(OneShotKeys::default());
    let metadata = Arc::new(MemoryMetadataStore::new());

    let service = || {
        CryptoService::new(
            key_manager.clone(),
            Arc::new(QuantumKeySimulator::new(metadata.clone())),
        )
        .with_kdf_iterations(1_000)
    };

    Pair {
        sender: service(),
        receiver: service(),
        key_manager: key_manager.clone(),
    }
}
