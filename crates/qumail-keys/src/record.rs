//! Key material as handed to the orchestrator

use zeroize::Zeroizing;

/// A key and the identifier the other party uses to obtain the same bytes.
///
/// The material is wiped when the record is dropped.
#[derive(Clone)]
pub struct KeyRecord {
    key_id: String,
    material: Zeroizing<Vec<u8>>,
}

impl KeyRecord {
    pub fn new(key_id: impl Into<String>, material: Vec<u8>) -> Self {
        Self {
            key_id: key_id.into(),
            material: Zeroizing::new(material),
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn material(&self) -> &[u8] {
        &self.material
    }

    /// Length of the key material in bytes
    pub fn length(&self) -> usize {
        self.material.len()
    }
}

impl std::fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRecord")
            .field("key_id", &self.key_id)
            .field("length", &self.material.len())
            .finish()
    }
}
