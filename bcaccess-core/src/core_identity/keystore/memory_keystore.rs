//! In-memory keystore for testing
//!
//! Keeps real envelopes so export/import behaves like the file keystore.

use super::envelope::{self, KdfParams};
use super::{check_replaceable, open_keypair, seal_keypair, Keystore, KeystoreError};
use crate::core_identity::keypair::Keypair;
use crate::core_identity::validation::Password;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Helper to convert poison errors into KeystoreError
fn handle_poison<T>(_err: PoisonError<T>) -> KeystoreError {
    KeystoreError::Other(
        "Lock poisoned: a thread panicked while holding the lock".to_string(),
    )
}

#[derive(Default)]
struct Entries {
    sealed: HashMap<String, (u64, Vec<u8>)>,
    /// Write counter used to order `list` by recency
    clock: u64,
}

/// In-memory keystore (non-persistent, for tests)
#[derive(Clone)]
pub struct MemoryKeystore {
    entries: Arc<RwLock<Entries>>,
    kdf: KdfParams,
}

impl MemoryKeystore {
    /// Create a new memory keystore with cheap KDF parameters
    pub fn new() -> Self {
        Self::with_kdf(KdfParams {
            memory_kib: 64,
            iterations: 1,
        })
    }

    pub fn with_kdf(kdf: KdfParams) -> Self {
        MemoryKeystore {
            entries: Arc::new(RwLock::new(Entries::default())),
            kdf,
        }
    }

    fn put(&self, alias: &str, sealed: Vec<u8>, exclusive: bool) -> Result<(), KeystoreError> {
        let mut entries = self.entries.write().map_err(handle_poison)?;
        let existing = entries.sealed.get(alias).map(|(_, sealed)| sealed.as_slice());
        if exclusive && existing.is_some() {
            return Err(KeystoreError::AlreadyExists(alias.to_string()));
        }
        check_replaceable(alias, existing, &sealed)?;
        entries.clock += 1;
        let clock = entries.clock;
        entries.sealed.insert(alias.to_string(), (clock, sealed));
        Ok(())
    }

    fn get(&self, alias: &str) -> Result<Vec<u8>, KeystoreError> {
        self.entries
            .read()
            .map_err(handle_poison)?
            .sealed
            .get(alias)
            .map(|(_, sealed)| sealed.clone())
            .ok_or_else(|| KeystoreError::NotFound(alias.to_string()))
    }
}

impl Default for MemoryKeystore {
    fn default() -> Self {
        Self::new()
    }
}

impl Keystore for MemoryKeystore {
    fn load(&self, alias: &str, password: &Password) -> Result<Keypair, KeystoreError> {
        let sealed = self.get(alias)?;
        open_keypair(&sealed, password)
    }

    fn create(&self, alias: &str, password: &Password) -> Result<Keypair, KeystoreError> {
        if self.contains(alias)? {
            return Err(KeystoreError::AlreadyExists(alias.to_string()));
        }
        let kp = Keypair::generate();
        let sealed = seal_keypair(&kp, password, self.kdf)?;
        self.put(alias, sealed, true)?;
        Ok(kp)
    }

    fn list(&self) -> Result<Vec<String>, KeystoreError> {
        let entries = self.entries.read().map_err(handle_poison)?;
        let mut aliases: Vec<(u64, String)> = entries
            .sealed
            .iter()
            .map(|(alias, (clock, _))| (*clock, alias.clone()))
            .collect();
        aliases.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(aliases.into_iter().map(|(_, alias)| alias).collect())
    }

    fn export_sealed(&self, alias: &str) -> Result<Vec<u8>, KeystoreError> {
        self.get(alias)
    }

    fn import_sealed(&self, alias: &str, sealed: &[u8]) -> Result<(), KeystoreError> {
        envelope::check_header(sealed)?;
        self.put(alias, sealed.to_vec(), false)
    }

    fn delete(&self, alias: &str) -> Result<(), KeystoreError> {
        self.entries
            .write()
            .map_err(handle_poison)?
            .sealed
            .remove(alias)
            .map(|_| ())
            .ok_or_else(|| KeystoreError::NotFound(alias.to_string()))
    }

    fn contains(&self, alias: &str) -> Result<bool, KeystoreError> {
        Ok(self
            .entries
            .read()
            .map_err(handle_poison)?
            .sealed
            .contains_key(alias))
    }
}
