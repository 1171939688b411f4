//! Ledger collaborators
//!
//! The ledger engine (storage, peers, mining, alias protocol) lives outside
//! this crate. These traits are the surface the identity flows consume:
//!
//! ```text
//! NodeFactory ----> AliasRegistry (register alias + public key, proof of work)
//! Lifecycle   ----> KeyExchange   (upload / one-time download of key shares)
//! Session     ----> Cache, Network (handles bound into every Node)
//! ```
//!
//! `LocalLedger` is a directory-backed implementation of both protocols used
//! by the CLI and the tests.

use crate::core_identity::keypair::Keypair;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod handles;
pub mod local;

pub use handles::{FileCache, PeerNetwork};
pub use local::LocalLedger;

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Alias Already Registered: {0}")]
    AliasTaken(String),

    #[error("Invalid registration signature for {0}")]
    InvalidSignature(String),

    #[error("No key share for {alias} on {host}")]
    ShareNotFound { host: String, alias: String },

    #[error("Access denied for {0}")]
    AccessDenied(String),

    #[error("Host unreachable: {0}")]
    HostUnreachable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        LedgerError::Serialization(e.to_string())
    }
}

/// Handle to local content-addressed storage
pub trait Cache: Send + Sync + fmt::Debug {
    /// Where the cache keeps its data
    fn location(&self) -> String;
}

/// Handle to peer connectivity
pub trait Network: Send + Sync + fmt::Debug {
    /// Peers this network talks to
    fn peers(&self) -> Vec<String>;
}

/// Receives fractional progress in `0.0..=1.0`
pub trait ProgressListener: Send + Sync {
    fn on_progress(&self, fraction: f64);
}

impl<F> ProgressListener for F
where
    F: Fn(f64) + Send + Sync,
{
    fn on_progress(&self, fraction: f64) {
        self(fraction)
    }
}

/// Listener that drops every report
pub struct NoProgress;

impl ProgressListener for NoProgress {
    fn on_progress(&self, _fraction: f64) {}
}

/// A registered binding of alias to public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRecord {
    pub alias: String,
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
    /// Milliseconds since the UNIX epoch
    pub timestamp: u64,
    /// Proof-of-work nonce
    pub nonce: u64,
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

impl AliasRecord {
    /// Bytes covered by the signature
    pub fn signed_payload(alias: &str, public_key: &[u8], timestamp: u64) -> Vec<u8> {
        let mut payload = Vec::with_capacity(alias.len() + public_key.len() + 8);
        payload.extend_from_slice(alias.as_bytes());
        payload.extend_from_slice(public_key);
        payload.extend_from_slice(&timestamp.to_be_bytes());
        payload
    }

    /// Check the self-signature
    pub fn verify(&self) -> bool {
        let payload = Self::signed_payload(&self.alias, &self.public_key, self.timestamp);
        Keypair::verify(&self.public_key, &payload, &self.signature)
    }
}

/// Key material parked on a remote host for one-time retrieval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyShare {
    pub alias: String,
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
    /// Password envelope, additionally sealed under the access code
    #[serde(with = "hex_bytes")]
    pub sealed_key: Vec<u8>,
    /// Digest the host compares against before releasing the share
    #[serde(with = "hex_bytes")]
    pub access_digest: Vec<u8>,
}

/// Alias registration protocol
#[async_trait]
pub trait AliasRegistry: Send + Sync {
    /// Bind `alias` to the public half of `keypair`, reporting mining progress
    async fn register(
        &self,
        alias: &str,
        keypair: &Keypair,
        progress: &dyn ProgressListener,
    ) -> Result<AliasRecord, LedgerError>;

    /// Registered record for `alias`, if any
    async fn lookup(&self, alias: &str) -> Result<Option<AliasRecord>, LedgerError>;
}

/// Remote key export/import protocol
#[async_trait]
pub trait KeyExchange: Send + Sync {
    /// Park a share on `host`, replacing any earlier share for the alias
    async fn upload(&self, host: &str, share: KeyShare) -> Result<(), LedgerError>;

    /// Release the share for `alias` if `access_digest` matches. One-time.
    async fn download(
        &self,
        host: &str,
        alias: &str,
        access_digest: &[u8],
    ) -> Result<KeyShare, LedgerError>;
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
