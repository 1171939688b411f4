//! Node materialization
//!
//! `load_existing` decrypts a stored key; `create_new` generates, stores and
//! registers one. Input is validated before the key store or ledger is
//! touched.

use super::Node;
use crate::core_identity::keypair::Keypair;
use crate::core_identity::keystore::{Keystore, KeystoreError};
use crate::core_identity::validation::{
    validate_alias, validate_password, Password, MIN_PASSWORD_LENGTH,
};
use crate::errors::{AccessError, AccessResult};
use crate::ledger::{AliasRegistry, Cache, LedgerError, Network, ProgressListener};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Builds nodes from a key store and an alias registry
#[derive(Clone)]
pub struct NodeFactory {
    keystore: Arc<dyn Keystore>,
    registry: Arc<dyn AliasRegistry>,
    min_password_length: usize,
    rollback_on_registration_failure: bool,
}

impl NodeFactory {
    pub fn new(keystore: Arc<dyn Keystore>, registry: Arc<dyn AliasRegistry>) -> Self {
        Self {
            keystore,
            registry,
            min_password_length: MIN_PASSWORD_LENGTH,
            rollback_on_registration_failure: false,
        }
    }

    pub fn with_min_password_length(mut self, minimum: usize) -> Self {
        self.min_password_length = minimum;
        self
    }

    /// Delete the freshly stored key when registration is rejected
    pub fn with_rollback_on_registration_failure(mut self, rollback: bool) -> Self {
        self.rollback_on_registration_failure = rollback;
        self
    }

    pub fn keystore(&self) -> &Arc<dyn Keystore> {
        &self.keystore
    }

    pub fn min_password_length(&self) -> usize {
        self.min_password_length
    }

    /// Decrypt the key stored for `alias`
    pub async fn load_existing(
        &self,
        alias: &str,
        password: &Password,
        cache: Arc<dyn Cache>,
        network: Arc<dyn Network>,
    ) -> AccessResult<Node> {
        validate_alias(alias)?;
        validate_password(password, self.min_password_length)?;

        let keystore = Arc::clone(&self.keystore);
        let owned_alias = alias.to_string();
        let password = password.clone();
        let loaded = tokio::task::spawn_blocking(move || keystore.load(&owned_alias, &password))
            .await
            .map_err(|e| {
                AccessError::StorageUnavailable(format!("Key store task failed: {}", e))
            })?;
        let keypair = loaded.map_err(|e| AccessError::from_load(alias, e))?;

        debug!(alias, "Loaded existing key");
        Ok(Node::new(alias, keypair, cache, network))
    }

    /// Generate a key for `alias`, store it, then register the alias
    pub async fn create_new(
        &self,
        alias: &str,
        password: &Password,
        cache: Arc<dyn Cache>,
        network: Arc<dyn Network>,
        progress: &dyn ProgressListener,
    ) -> AccessResult<Node> {
        validate_alias(alias)?;
        validate_password(password, self.min_password_length)?;

        let keypair = self.store_new_key(alias, password).await?;

        debug!(alias, "Registering alias");
        if let Err(source) = self.registry.register(alias, &keypair, progress).await {
            self.after_failed_registration(alias);
            return Err(AccessError::AliasRegistrationFailed {
                alias: alias.to_string(),
                source,
            });
        }

        info!(alias, "Created new identity");
        Ok(Node::new(alias, keypair, cache, network))
    }

    async fn store_new_key(&self, alias: &str, password: &Password) -> AccessResult<Keypair> {
        let keystore = Arc::clone(&self.keystore);
        let owned_alias = alias.to_string();
        let password = password.clone();
        let created =
            tokio::task::spawn_blocking(move || keystore.create(&owned_alias, &password))
                .await
                .map_err(|e| {
                    AccessError::StorageUnavailable(format!("Key store task failed: {}", e))
                })?;

        match created {
            Ok(keypair) => Ok(keypair),
            // A key under this alias already exists locally; keep it intact
            Err(KeystoreError::AlreadyExists(_)) => Err(AccessError::AliasRegistrationFailed {
                alias: alias.to_string(),
                source: LedgerError::AliasTaken(alias.to_string()),
            }),
            Err(e) => Err(AccessError::StorageUnavailable(e.to_string())),
        }
    }

    fn after_failed_registration(&self, alias: &str) {
        if !self.rollback_on_registration_failure {
            warn!(alias, "Alias registration failed; local key left in key store");
            return;
        }
        match self.keystore.delete(alias) {
            Ok(()) => info!(alias, "Rolled back local key after failed registration"),
            Err(e) => warn!(alias, error = %e, "Rollback of local key failed"),
        }
    }
}
