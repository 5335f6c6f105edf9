//! QuMail Keys - key acquisition
//!
//! Everything the orchestrator needs to obtain key material:
//! - Key Manager client (single-use symmetric keys)
//! - Quantum key simulator (hash-chain derivation, published metadata)
//! - KEM authority client and local key wrapping
//! - Public directory (recipient public keys, quantum key metadata)
//!
//! Every client is an explicit value holding its own base URL and timeout.

pub mod directory;
pub mod http;
pub mod kem_service;
pub mod key_manager;
pub mod quantum;
pub mod record;

pub use directory::{DirectoryClient, DirectoryError, PublicKeyDirectory};
pub use http::{Endpoint, EndpointError, DEFAULT_TIMEOUT};
pub use kem_service::{
    unwrap_symmetric_key, wrap_symmetric_key, KemServiceClient, KemServiceError, WrappedKey,
};
pub use key_manager::{KeyManagerClient, KeyManagerError, SymmetricKeySource, DEFAULT_KEY_MANAGER_URL};
pub use quantum::{
    HashChain, KeyDerivation, KeyMetadata, MemoryMetadataStore, MetadataStore, QuantumKeyError,
    QuantumKeySimulator, SimulatorStatus,
};
pub use record::KeyRecord;
