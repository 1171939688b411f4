//! Directory-backed ledger
//!
//! Layout:
//! ```text
//! <dir>/aliases/<alias>.json         registered AliasRecord
//! <dir>/shares/<host>/<alias>.json   parked KeyShare
//! ```
//!
//! Registration is gated by a proof of work over the signed payload:
//! `blake3(payload || nonce)` must start with `difficulty_bits` zero bits.
//! The alias file is created with `create_new`, so of two registrations
//! racing for one alias exactly one commits.

use super::{AliasRecord, AliasRegistry, KeyExchange, KeyShare, LedgerError, ProgressListener};
use crate::core_identity::keypair::Keypair;
use crate::core_identity::validation::{validate_alias, validate_host};
use async_trait::async_trait;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Nonces tried per blocking batch between progress reports
const MINING_BATCH: u64 = 4096;

/// Directory-backed alias registry and key exchange
#[derive(Debug, Clone)]
pub struct LocalLedger {
    dir: PathBuf,
    difficulty_bits: u32,
    /// When set, only these hosts answer
    hosts: Option<Vec<String>>,
}

impl LocalLedger {
    /// Open (creating if needed) a ledger directory
    pub fn open(dir: impl Into<PathBuf>, difficulty_bits: u32) -> Result<Self, LedgerError> {
        let dir = dir.into();
        fs::create_dir_all(dir.join("aliases"))?;
        fs::create_dir_all(dir.join("shares"))?;
        Ok(Self {
            dir,
            difficulty_bits: difficulty_bits.min(32),
            hosts: None,
        })
    }

    /// Restrict the hosts this ledger answers for
    pub fn with_hosts(mut self, hosts: impl IntoIterator<Item = String>) -> Self {
        self.hosts = Some(hosts.into_iter().collect());
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn alias_path(&self, alias: &str) -> Result<PathBuf, LedgerError> {
        validate_alias(alias).map_err(|e| LedgerError::Other(e.to_string()))?;
        Ok(self.dir.join("aliases").join(format!("{}.json", alias)))
    }

    fn share_path(&self, host: &str, alias: &str) -> Result<PathBuf, LedgerError> {
        validate_host(host).map_err(|_| LedgerError::HostUnreachable(host.to_string()))?;
        if let Some(hosts) = &self.hosts {
            if !hosts.iter().any(|h| h == host) {
                return Err(LedgerError::HostUnreachable(host.to_string()));
            }
        }
        validate_alias(alias).map_err(|e| LedgerError::Other(e.to_string()))?;
        let dir = self.dir.join("shares").join(host.replace(':', "_"));
        fs::create_dir_all(&dir)?;
        Ok(dir.join(format!("{}.json", alias)))
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn leading_zero_bits(hash: &[u8]) -> u32 {
    let mut bits = 0;
    for byte in hash {
        if *byte == 0 {
            bits += 8;
        } else {
            bits += byte.leading_zeros();
            break;
        }
    }
    bits
}

fn proof_hash(payload: &[u8], nonce: u64) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(payload);
    hasher.update(&nonce.to_be_bytes());
    hasher.finalize()
}

/// Check whether `nonce` satisfies `difficulty_bits` for `payload`
pub fn meets_difficulty(payload: &[u8], nonce: u64, difficulty_bits: u32) -> bool {
    leading_zero_bits(proof_hash(payload, nonce).as_bytes()) >= difficulty_bits
}

fn mine_batch(payload: &[u8], start: u64, difficulty_bits: u32) -> Option<u64> {
    (start..start.saturating_add(MINING_BATCH))
        .find(|n| meets_difficulty(payload, *n, difficulty_bits))
}

#[async_trait]
impl AliasRegistry for LocalLedger {
    async fn register(
        &self,
        alias: &str,
        keypair: &Keypair,
        progress: &dyn ProgressListener,
    ) -> Result<AliasRecord, LedgerError> {
        let path = self.alias_path(alias)?;
        if path.exists() {
            return Err(LedgerError::AliasTaken(alias.to_string()));
        }

        let timestamp = now_millis();
        let payload = AliasRecord::signed_payload(alias, keypair.public_key(), timestamp);
        let signature = keypair.sign(&payload).map_err(LedgerError::Other)?;

        let expected = 2f64.powi(self.difficulty_bits as i32);
        let difficulty_bits = self.difficulty_bits;
        let mut start = 0u64;
        let nonce = loop {
            let batch_payload = payload.clone();
            let found = tokio::task::spawn_blocking(move || {
                mine_batch(&batch_payload, start, difficulty_bits)
            })
            .await
            .map_err(|e| LedgerError::Other(format!("Mining task failed: {}", e)))?;
            if let Some(nonce) = found {
                break nonce;
            }
            start = start.saturating_add(MINING_BATCH);
            // Expected fraction of work done, held below completion until a nonce is found
            let fraction = (1.0 - (-(start as f64) / expected).exp()).min(0.99);
            progress.on_progress(fraction);
        };
        progress.on_progress(1.0);

        let record = AliasRecord {
            alias: alias.to_string(),
            public_key: keypair.public_key().to_vec(),
            timestamp,
            nonce,
            signature,
        };
        if !record.verify() {
            return Err(LedgerError::InvalidSignature(alias.to_string()));
        }

        let json = serde_json::to_vec_pretty(&record)?;
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(LedgerError::AliasTaken(alias.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(&json)?;

        info!(alias, nonce, "Registered alias");
        Ok(record)
    }

    async fn lookup(&self, alias: &str) -> Result<Option<AliasRecord>, LedgerError> {
        let path = self.alias_path(alias)?;
        if !path.exists() {
            return Ok(None);
        }
        let record: AliasRecord = serde_json::from_slice(&fs::read(path)?)?;
        Ok(Some(record))
    }
}

#[async_trait]
impl KeyExchange for LocalLedger {
    async fn upload(&self, host: &str, share: KeyShare) -> Result<(), LedgerError> {
        let path = self.share_path(host, &share.alias)?;
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&share)?)?;
        fs::rename(tmp, path)?;
        debug!(host, alias = %share.alias, "Stored key share");
        Ok(())
    }

    async fn download(
        &self,
        host: &str,
        alias: &str,
        access_digest: &[u8],
    ) -> Result<KeyShare, LedgerError> {
        let path = self.share_path(host, alias)?;
        if !path.exists() {
            return Err(LedgerError::ShareNotFound {
                host: host.to_string(),
                alias: alias.to_string(),
            });
        }
        let share: KeyShare = serde_json::from_slice(&fs::read(&path)?)?;
        if share.access_digest.as_slice() != access_digest {
            return Err(LedgerError::AccessDenied(alias.to_string()));
        }
        fs::remove_file(&path)?;
        debug!(host, alias, "Released key share");
        Ok(share)
    }
}
