//! Identity lifecycle: export, import, switch, delete
//!
//! Export re-authenticates with the alias password before anything leaves
//! the key store. The exported key stays password-encrypted and is further
//! sealed under a fresh access code; the host only stores the sealed blob
//! and a digest of the code.
//!
//! Both directions check keys against the alias record on the ledger. Import
//! never replaces a local key with a different one.

use crate::callbacks::AccessCallbacks;
use crate::core_identity::keystore::{envelope, Keystore, KeystoreError};
use crate::core_identity::validation::{
    validate_access_code, validate_alias, validate_host, validate_password, Password,
    MIN_PASSWORD_LENGTH,
};
use crate::errors::{AccessError, AccessResult};
use crate::ledger::{AliasRecord, AliasRegistry, KeyExchange, KeyShare};
use crate::metrics::{self, Flow};
use crate::node::Node;
use crate::session::Session;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod transfer;

pub use transfer::AccessCode;

/// Export, import and identity switching over one session
#[derive(Clone)]
pub struct Lifecycle {
    session: Arc<Session>,
    keystore: Arc<dyn Keystore>,
    registry: Arc<dyn AliasRegistry>,
    exchange: Arc<dyn KeyExchange>,
    callbacks: Arc<dyn AccessCallbacks>,
    min_password_length: usize,
}

impl Lifecycle {
    pub fn new(
        session: Arc<Session>,
        keystore: Arc<dyn Keystore>,
        registry: Arc<dyn AliasRegistry>,
        exchange: Arc<dyn KeyExchange>,
        callbacks: Arc<dyn AccessCallbacks>,
    ) -> Self {
        Self {
            session,
            keystore,
            registry,
            exchange,
            callbacks,
            min_password_length: MIN_PASSWORD_LENGTH,
        }
    }

    pub fn with_min_password_length(mut self, minimum: usize) -> Self {
        self.min_password_length = minimum;
        self
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Ship `node`'s key to `host`, returning the code that retrieves it
    pub async fn export_keys(
        &self,
        node: &Node,
        password: &Password,
        host: &str,
    ) -> AccessResult<AccessCode> {
        metrics::record_attempt(Flow::Export);
        let result = self.export_inner(node, password, host).await;
        if result.is_err() {
            metrics::record_failure(Flow::Export);
        }
        result
    }

    async fn export_inner(
        &self,
        node: &Node,
        password: &Password,
        host: &str,
    ) -> AccessResult<AccessCode> {
        validate_host(host)?;
        validate_password(password, self.min_password_length)?;

        let alias = node.alias().to_string();
        let keystore = Arc::clone(&self.keystore);
        let password = password.clone();
        let task_alias = alias.clone();
        let (keypair, sealed_envelope) = tokio::task::spawn_blocking(move || {
            let keypair = keystore.load(&task_alias, &password)?;
            let sealed = keystore.export_sealed(&task_alias)?;
            Ok::<_, KeystoreError>((keypair, sealed))
        })
        .await
        .map_err(|e| AccessError::StorageUnavailable(format!("Key store task failed: {}", e)))?
        .map_err(|e| AccessError::from_load(&alias, e))?;

        if keypair.public_key() != node.public_key() {
            warn!(alias = %alias, "Stored key does not match the signed-in node");
            return Err(AccessError::AuthenticationFailed { alias });
        }
        let record = self
            .registered(&alias)
            .await
            .map_err(AccessError::ExportFailed)?;
        if record.public_key != node.public_key() {
            warn!(alias = %alias, "Refusing to export a key the ledger does not record");
            return Err(AccessError::ExportFailed(format!(
                "Key for {} is not the one registered on the ledger",
                alias
            )));
        }

        let code = AccessCode::generate();
        let share = KeyShare {
            alias: alias.clone(),
            public_key: node.public_key().to_vec(),
            sealed_key: transfer::seal(&code, &sealed_envelope)
                .map_err(AccessError::ExportFailed)?,
            access_digest: code.digest().to_vec(),
        };

        debug!(alias = %alias, host, "Uploading key share");
        self.exchange
            .upload(host, share)
            .await
            .map_err(|e| AccessError::ExportFailed(e.to_string()))?;

        info!(alias = %alias, host, "Keys exported");
        self.callbacks.on_keys_exported(&alias);
        Ok(code)
    }

    /// Fetch the key for `alias` from `host` into the local key store
    pub async fn import_keys(
        &self,
        host: &str,
        alias: &str,
        code: &AccessCode,
    ) -> AccessResult<()> {
        metrics::record_attempt(Flow::Import);
        let result = self.import_inner(host, alias, code).await;
        if result.is_err() {
            metrics::record_failure(Flow::Import);
        }
        result
    }

    async fn import_inner(&self, host: &str, alias: &str, code: &AccessCode) -> AccessResult<()> {
        validate_alias(alias)?;
        validate_access_code(code.as_str())?;
        validate_host(host)?;

        debug!(alias, host, "Downloading key share");
        let share = self
            .exchange
            .download(host, alias, &code.digest())
            .await
            .map_err(|e| AccessError::ImportFailed(e.to_string()))?;
        if share.alias != alias {
            return Err(AccessError::ImportFailed(format!(
                "Host returned key for {} instead of {}",
                share.alias, alias
            )));
        }

        let record = self
            .registered(alias)
            .await
            .map_err(AccessError::ImportFailed)?;
        if share.public_key != record.public_key {
            warn!(alias, host, "Key share does not match the ledger record");
            return Err(AccessError::ImportFailed(format!(
                "Key for {} is not the one registered on the ledger",
                alias
            )));
        }

        let sealed_envelope =
            transfer::open(code, &share.sealed_key).map_err(AccessError::ImportFailed)?;
        let envelope_key = envelope::public_key(&sealed_envelope)
            .map_err(|e| AccessError::ImportFailed(e.to_string()))?;
        if envelope_key != record.public_key {
            return Err(AccessError::ImportFailed(format!(
                "Sealed key for {} does not match the ledger record",
                alias
            )));
        }

        let keystore = Arc::clone(&self.keystore);
        let task_alias = alias.to_string();
        let stored = tokio::task::spawn_blocking(move || {
            keystore.import_sealed(&task_alias, &sealed_envelope)
        })
        .await
        .map_err(|e| AccessError::StorageUnavailable(format!("Key store task failed: {}", e)))?;
        match stored {
            Ok(()) => {}
            Err(KeystoreError::AlreadyExists(_)) => {
                warn!(alias, "A different key is already stored; import refused");
                return Err(AccessError::ImportFailed(format!(
                    "A different key for {} is already stored",
                    alias
                )));
            }
            Err(e) => return Err(AccessError::StorageUnavailable(e.to_string())),
        }

        info!(alias, host, "Keys imported");
        self.callbacks.on_keys_imported(alias);
        Ok(())
    }

    /// The ledger record binding `alias` to a public key
    async fn registered(&self, alias: &str) -> Result<AliasRecord, String> {
        match self.registry.lookup(alias).await {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(format!("Alias {} is not registered", alias)),
            Err(e) => Err(e.to_string()),
        }
    }

    /// Forget the current identity and its handles. Keys on disk stay.
    pub async fn switch_identity(&self) {
        let previous = self.session.clear().await;
        metrics::record_switch();
        info!(
            previous = previous.as_deref().unwrap_or("none"),
            "Signed out"
        );
        self.callbacks.on_signed_out();
    }

    /// Not supported yet
    pub async fn delete_keys(&self, alias: &str) -> AccessResult<()> {
        debug!(alias, "Delete keys requested");
        Err(AccessError::NotImplemented("delete keys"))
    }
}
