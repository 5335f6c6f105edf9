//! Crypto orchestrator
//!
//! Dispatches on the security level, pulls key material from the right
//! source, and turns payloads into envelopes and back. There is never a
//! fallback between levels: a level that cannot be served is an error.

use std::sync::Arc;

use qumail_crypto::cipher::{self, KEY_SIZE};
use qumail_crypto::kdf::{KdfParams, DEFAULT_OUTPUT_LEN};
use qumail_crypto::mask::one_time_pad;
use qumail_keys::{
    unwrap_symmetric_key, wrap_symmetric_key, DirectoryClient, KeyManagerClient, KeyRecord,
    MemoryMetadataStore, MetadataStore, PublicKeyDirectory, QuantumKeySimulator,
    SymmetricKeySource,
};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::{ConfigError, CryptoConfig};
use crate::envelope::{AeadParts, Envelope, KeyOrigin};
use crate::error::{DecryptionError, EncryptionError, Result};
use crate::level::{EncryptionMethod, SecurityLevel};
use crate::payload::Payload;

/// One call to [`CryptoService::encrypt`]
#[derive(Debug, Clone)]
pub struct EncryptRequest {
    pub level: SecurityLevel,
    pub payload: Payload,
    /// Key source for levels 1 and 2; ignored otherwise
    pub method: EncryptionMethod,
    pub recipient_public_key: Option<Vec<u8>>,
    pub recipient_id: Option<String>,
}

impl EncryptRequest {
    pub fn new(level: SecurityLevel, payload: Payload) -> Self {
        Self {
            level,
            payload,
            method: EncryptionMethod::default(),
            recipient_public_key: None,
            recipient_id: None,
        }
    }

    pub fn method(mut self, method: EncryptionMethod) -> Self {
        self.method = method;
        self
    }

    pub fn recipient_public_key(mut self, public_key: Vec<u8>) -> Self {
        self.recipient_public_key = Some(public_key);
        self
    }

    pub fn recipient_id(mut self, recipient_id: impl Into<String>) -> Self {
        self.recipient_id = Some(recipient_id.into());
        self
    }
}

pub struct CryptoService {
    key_manager: Arc<dyn SymmetricKeySource>,
    quantum: Arc<QuantumKeySimulator>,
    directory: Option<Arc<dyn PublicKeyDirectory>>,
    kdf: KdfParams,
}

impl CryptoService {
    pub fn new(key_manager: Arc<dyn SymmetricKeySource>, quantum: Arc<QuantumKeySimulator>) -> Self {
        Self {
            key_manager,
            quantum,
            directory: None,
            kdf: KdfParams::default(),
        }
    }

    pub fn with_directory(mut self, directory: Arc<dyn PublicKeyDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn with_kdf_iterations(mut self, iterations: u32) -> Self {
        self.kdf = KdfParams {
            iterations,
            out_len: DEFAULT_OUTPUT_LEN,
        };
        self
    }

    /// Build every client from configuration
    pub fn from_config(config: &CryptoConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let timeout = config.timeout();

        let key_manager = Arc::new(KeyManagerClient::new(&config.key_manager_url, timeout)?);

        let directory = match &config.directory_url {
            Some(url) => Some(Arc::new(DirectoryClient::new(url, timeout)?)),
            None => None,
        };

        let metadata: Arc<dyn MetadataStore> = match &directory {
            Some(directory) => directory.clone(),
            None => {
                info!("No directory configured; quantum key metadata stays in this process");
                Arc::new(MemoryMetadataStore::new())
            }
        };
        let quantum = Arc::new(
            QuantumKeySimulator::new(metadata).with_max_key_bytes(config.max_quantum_key_bytes),
        );

        let mut service =
            Self::new(key_manager, quantum).with_kdf_iterations(config.kdf_iterations);
        if let Some(directory) = directory {
            service = service.with_directory(directory);
        }
        Ok(service)
    }

    pub fn quantum(&self) -> &QuantumKeySimulator {
        &self.quantum
    }

    pub async fn encrypt(&self, request: &EncryptRequest) -> std::result::Result<Envelope, EncryptionError> {
        info!(
            "Encrypting at level {} ({} attachments)",
            request.level,
            request.payload.attachments.len()
        );

        match request.level {
            SecurityLevel::Plaintext => Ok(Envelope::Plaintext {
                payload: request.payload.clone(),
            }),
            SecurityLevel::Hybrid => self.encrypt_hybrid(request).await,
            SecurityLevel::KeyDerived => self.encrypt_key_derived(request).await,
            SecurityLevel::OneTimePad => self.encrypt_one_time_pad(request).await,
        }
    }

    async fn encrypt_hybrid(&self, request: &EncryptRequest) -> std::result::Result<Envelope, EncryptionError> {
        let public_key = self.recipient_public_key(request).await?;
        let plaintext = serialize(&request.payload)?;

        let key = cipher::generate_key();
        let nonce = cipher::generate_nonce();
        let sealed = cipher::aead_encrypt(&key[..], &nonce, &plaintext)?;
        let wrapped = wrap_symmetric_key(&public_key, &key[..])?;

        Ok(Envelope::Hybrid {
            kem_ciphertext: wrapped.kem_ciphertext,
            wrapped_key: wrapped.wrapped_key,
            sealed: AeadParts {
                nonce,
                tag: sealed.tag,
                ciphertext: sealed.ciphertext,
            },
        })
    }

    async fn recipient_public_key(&self, request: &EncryptRequest) -> std::result::Result<Vec<u8>, EncryptionError> {
        if let Some(public_key) = &request.recipient_public_key {
            return Ok(public_key.clone());
        }

        let (Some(recipient), Some(directory)) = (&request.recipient_id, &self.directory) else {
            return Err(EncryptionError::NoRecipient);
        };
        debug!("Looking up public key for {}", recipient);
        directory
            .public_key(recipient)
            .await?
            .ok_or_else(|| EncryptionError::MissingRecipientKey(recipient.clone()))
    }

    async fn encrypt_key_derived(&self, request: &EncryptRequest) -> std::result::Result<Envelope, EncryptionError> {
        let plaintext = serialize(&request.payload)?;
        let nonce = cipher::generate_nonce();

        let (key_id, origin, sealed) = match request.method {
            EncryptionMethod::Qkd => {
                let record = self
                    .quantum
                    .new_key(KEY_SIZE, request.recipient_id.as_deref())
                    .await?;
                let salt = cipher::generate_salt();
                let key = self.kdf.derive(record.material(), &salt)?;
                let sealed = cipher::aead_encrypt(&key, &nonce, &plaintext)?;
                let origin = KeyOrigin::Quantum {
                    salt,
                    iterations: self.kdf.iterations,
                };
                (record.key_id().to_string(), origin, sealed)
            }
            EncryptionMethod::Pqc => {
                let record = self.key_manager.request_key(KEY_SIZE).await?;
                let key = leading_bytes(&record, KEY_SIZE).ok_or(EncryptionError::KeyTooShort {
                    needed: KEY_SIZE,
                    available: record.length(),
                })?;
                let sealed = cipher::aead_encrypt(key, &nonce, &plaintext)?;
                (record.key_id().to_string(), KeyOrigin::KeyManager, sealed)
            }
        };

        debug!("Level 2 envelope sealed under key {}", key_id);
        Ok(Envelope::KeyDerived {
            key_id,
            origin,
            sealed: AeadParts {
                nonce,
                tag: sealed.tag,
                ciphertext: sealed.ciphertext,
            },
        })
    }

    async fn encrypt_one_time_pad(&self, request: &EncryptRequest) -> std::result::Result<Envelope, EncryptionError> {
        let plaintext = serialize(&request.payload)?;
        let needed = plaintext.len();

        let record = match request.method {
            EncryptionMethod::Qkd => {
                self.quantum
                    .new_key(needed, request.recipient_id.as_deref())
                    .await?
            }
            EncryptionMethod::Pqc => self.key_manager.request_key(needed).await?,
        };
        if record.length() < needed {
            warn!(
                "Key {} too short for one-time pad ({} < {})",
                record.key_id(),
                record.length(),
                needed
            );
            return Err(EncryptionError::KeyTooShort {
                needed,
                available: record.length(),
            });
        }

        let ciphertext = one_time_pad(&plaintext, record.material())?;
        debug!("Level 1 envelope masked with key {} ({} bytes)", record.key_id(), needed);
        Ok(Envelope::OneTimePad {
            key_id: record.key_id().to_string(),
            method: request.method,
            ciphertext,
        })
    }

    /// Reverse [`CryptoService::encrypt`]. Level 3 needs the recipient's
    /// private key; the other levels fetch or re-derive their key by id.
    /// Key manager keys are consumed by this call.
    pub async fn decrypt(
        &self,
        envelope: &Envelope,
        private_key: Option<&[u8]>,
    ) -> std::result::Result<Payload, DecryptionError> {
        info!("Decrypting level {} envelope", envelope.level());

        let plaintext = match envelope {
            Envelope::Plaintext { payload } => return Ok(payload.clone()),
            Envelope::Hybrid {
                kem_ciphertext,
                wrapped_key,
                sealed,
            } => {
                let private_key = private_key
                    .filter(|k| !k.is_empty())
                    .ok_or(DecryptionError::MissingKeyMaterial)?;
                let key = unwrap_symmetric_key(kem_ciphertext, wrapped_key, private_key)?;
                open(&key, sealed)?
            }
            Envelope::KeyDerived {
                key_id,
                origin: KeyOrigin::Quantum { salt, iterations },
                sealed,
            } => {
                let record = self.quantum.key_by_id(key_id).await?;
                let params = KdfParams {
                    iterations: *iterations,
                    out_len: DEFAULT_OUTPUT_LEN,
                };
                let key = params.derive(record.material(), salt)?;
                open(&key, sealed)?
            }
            Envelope::KeyDerived {
                key_id,
                origin: KeyOrigin::KeyManager,
                sealed,
            } => {
                let record = self.key_manager.retrieve_key(key_id).await?;
                let key = leading_bytes(&record, KEY_SIZE).ok_or(DecryptionError::KeyTooShort {
                    needed: KEY_SIZE,
                    available: record.length(),
                })?;
                open(key, sealed)?
            }
            Envelope::OneTimePad {
                key_id,
                method,
                ciphertext,
            } => {
                let record = match method {
                    EncryptionMethod::Qkd => self.quantum.key_by_id(key_id).await?,
                    EncryptionMethod::Pqc => self.key_manager.retrieve_key(key_id).await?,
                };
                Zeroizing::new(one_time_pad(ciphertext, record.material())?)
            }
        };

        Payload::from_bytes(&plaintext).map_err(DecryptionError::Payload)
    }

    pub async fn encrypt_to_json(&self, request: &EncryptRequest) -> Result<String> {
        let envelope = self.encrypt(request).await?;
        Ok(envelope.to_json()?)
    }

    pub async fn decrypt_json(&self, text: &str, private_key: Option<&[u8]>) -> Result<Payload> {
        let envelope = Envelope::parse(text)?;
        Ok(self.decrypt(&envelope, private_key).await?)
    }
}

fn serialize(payload: &Payload) -> std::result::Result<Zeroizing<Vec<u8>>, EncryptionError> {
    payload
        .to_bytes()
        .map(Zeroizing::new)
        .map_err(EncryptionError::Payload)
}

fn leading_bytes(record: &KeyRecord, len: usize) -> Option<&[u8]> {
    record.material().get(..len)
}

fn open(key: &[u8], sealed: &AeadParts) -> std::result::Result<Zeroizing<Vec<u8>>, DecryptionError> {
    Ok(cipher::aead_decrypt(
        key,
        &sealed.nonce,
        &sealed.ciphertext,
        &sealed.tag,
    )?)
}
