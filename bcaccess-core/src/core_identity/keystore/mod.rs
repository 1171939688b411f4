//! Keystore module
//!
//! Abstract keystore API for per-alias private keys, encrypted at rest
//! under the alias password.

use crate::core_identity::keypair::Keypair;
use crate::core_identity::validation::Password;
use thiserror::Error;
use zeroize::Zeroizing;

pub mod envelope;
pub mod file_keystore;
pub mod memory_keystore;

pub use envelope::KdfParams;
pub use file_keystore::FileKeystore;
pub use memory_keystore::MemoryKeystore;

/// Keystore errors
#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Key already exists: {0}")]
    AlreadyExists(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Other error: {0}")]
    Other(String),
}

/// Abstract keystore trait
pub trait Keystore: Send + Sync {
    /// Decrypt the key stored under `alias`
    fn load(&self, alias: &str, password: &Password) -> Result<Keypair, KeystoreError>;

    /// Generate a key for `alias` and persist it. Never overwrites.
    fn create(&self, alias: &str, password: &Password) -> Result<Keypair, KeystoreError>;

    /// Aliases with a stored key, most recently written first
    fn list(&self) -> Result<Vec<String>, KeystoreError>;

    /// The stored encrypted envelope, still sealed under the alias password
    fn export_sealed(&self, alias: &str) -> Result<Vec<u8>, KeystoreError>;

    /// Store an envelope produced by `export_sealed`.
    ///
    /// Replaces a stored key only if it has the same public key; a different
    /// key under `alias` fails with `AlreadyExists`.
    fn import_sealed(&self, alias: &str, sealed: &[u8]) -> Result<(), KeystoreError>;

    /// Remove the stored key for `alias`
    fn delete(&self, alias: &str) -> Result<(), KeystoreError>;

    /// Whether a key is stored under `alias`
    fn contains(&self, alias: &str) -> Result<bool, KeystoreError> {
        Ok(self.list()?.iter().any(|a| a == alias))
    }

    /// Public key of the stored key, readable without the password
    fn public_key(&self, alias: &str) -> Result<Vec<u8>, KeystoreError> {
        envelope::public_key(&self.export_sealed(alias)?)
    }
}

/// Encrypt `keypair` into a new envelope
pub(crate) fn seal_keypair(
    keypair: &Keypair,
    password: &Password,
    kdf: KdfParams,
) -> Result<Vec<u8>, KeystoreError> {
    let serialized = Zeroizing::new(keypair.serialize().map_err(KeystoreError::Serialization)?);
    envelope::seal(password.as_bytes(), kdf, keypair.public_key(), &serialized)
}

/// Decrypt an envelope and check the key against its header
pub(crate) fn open_keypair(sealed: &[u8], password: &Password) -> Result<Keypair, KeystoreError> {
    let decrypted = Zeroizing::new(envelope::open(password.as_bytes(), sealed)?);
    let keypair = Keypair::deserialize(&decrypted).map_err(KeystoreError::Serialization)?;
    if keypair.public_key() != envelope::public_key(sealed)?.as_slice() {
        return Err(KeystoreError::Decryption(
            "Envelope public key does not match".to_string(),
        ));
    }
    Ok(keypair)
}

/// Refuse to replace `existing` with an envelope for a different key
pub(crate) fn check_replaceable(
    alias: &str,
    existing: Option<&[u8]>,
    incoming: &[u8],
) -> Result<(), KeystoreError> {
    let incoming_key = envelope::public_key(incoming)?;
    match existing {
        Some(existing) if envelope::public_key(existing)? != incoming_key => {
            Err(KeystoreError::AlreadyExists(alias.to_string()))
        }
        _ => Ok(()),
    }
}
