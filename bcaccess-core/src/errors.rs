//! Error taxonomy shared by node materialization, lifecycle and access flows

use crate::core_identity::keystore::KeystoreError;
use crate::core_identity::validation::ValidationError;
use crate::ledger::LedgerError;
use std::time::Duration;
use thiserror::Error;

/// Result type for identity session operations
pub type AccessResult<T> = Result<T, AccessError>;

/// Errors surfaced to the human driving an access flow
#[derive(Error, Debug)]
pub enum AccessError {
    /// Bad alias/password input; the dialog stays open
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Wrong password or unknown alias
    #[error("Authentication failed for {alias}")]
    AuthenticationFailed { alias: String },

    /// Root directory or key store I/O
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The ledger rejected a new alias
    #[error("Alias registration failed for {alias}: {source}")]
    AliasRegistrationFailed {
        alias: String,
        #[source]
        source: LedgerError,
    },

    #[error("Export failed: {0}")]
    ExportFailed(String),

    #[error("Import failed: {0}")]
    ImportFailed(String),

    #[error("Not yet implemented: {0}")]
    NotImplemented(&'static str),

    /// The dialog was dismissed or replaced before a flow resolved
    #[error("Access flow cancelled")]
    Cancelled,

    #[error("Access flow timed out after {0:?}")]
    TimedOut(Duration),

    /// A submit arrived after the dialog already resolved
    #[error("Access flow already closed")]
    FlowClosed,

    /// A submit arrived while another action was still running
    #[error("Access flow busy")]
    FlowBusy,
}

impl AccessError {
    /// Validation errors leave the dialog open without dismissing it
    pub fn is_validation(&self) -> bool {
        matches!(self, AccessError::Validation(_))
    }

    /// Map a key store failure during sign-in
    pub(crate) fn from_load(alias: &str, err: KeystoreError) -> Self {
        match err {
            KeystoreError::NotFound(_) | KeystoreError::InvalidPassword => {
                AccessError::AuthenticationFailed {
                    alias: alias.to_string(),
                }
            }
            other => AccessError::StorageUnavailable(other.to_string()),
        }
    }
}
