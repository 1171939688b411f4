//! Owning client state
//!
//! The session holds the root directory, peer list and the
//! cache/network/node triple for the current identity. Everything sits
//! behind one `tokio::sync::Mutex`. Handles handed out before a node is
//! bound are not kept; `bind` stores the triple and `clear` resets it in a
//! single critical section, so no caller sees handles without a node.

use crate::core_identity::keystore::{FileKeystore, KdfParams};
use crate::errors::{AccessError, AccessResult};
use crate::ledger::{Cache, FileCache, Network, PeerNetwork};
use crate::node::Node;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Name of the cache directory under the root
pub const CACHE_DIRECTORY: &str = "cache";

#[derive(Default)]
struct SessionState {
    root_override: Option<PathBuf>,
    peers: Vec<String>,
    cache: Option<Arc<dyn Cache>>,
    network: Option<Arc<dyn Network>>,
    node: Option<Arc<Node>>,
}

/// Client session
pub struct Session {
    default_root: PathBuf,
    state: Mutex<SessionState>,
}

impl Session {
    /// New session rooted at `default_root` unless overridden later
    pub fn new(default_root: impl Into<PathBuf>, peers: Vec<String>) -> Self {
        Self {
            default_root: default_root.into(),
            state: Mutex::new(SessionState {
                peers,
                ..Default::default()
            }),
        }
    }

    /// Root directory, created if missing
    pub async fn root(&self) -> AccessResult<PathBuf> {
        let state = self.state.lock().await;
        self.resolve_root(&state)
    }

    fn resolve_root(&self, state: &SessionState) -> AccessResult<PathBuf> {
        let root = state
            .root_override
            .clone()
            .unwrap_or_else(|| self.default_root.clone());
        std::fs::create_dir_all(&root).map_err(|e| {
            AccessError::StorageUnavailable(format!("Cannot create {}: {}", root.display(), e))
        })?;
        Ok(root)
    }

    /// Override the root used for the next identity's handles
    pub async fn set_root(&self, root: impl Into<PathBuf>) {
        let mut state = self.state.lock().await;
        state.root_override = Some(root.into());
        debug!("Root changed");
    }

    pub async fn peers(&self) -> Vec<String> {
        self.state.lock().await.peers.clone()
    }

    /// Replace the peer list used for the next identity's network
    pub async fn set_peers(&self, peers: Vec<String>) {
        let mut state = self.state.lock().await;
        state.peers = peers;
        debug!("Peers changed");
    }

    /// Key store under the current root
    pub async fn open_keystore(&self, kdf: KdfParams) -> AccessResult<FileKeystore> {
        let root = self.root().await?;
        FileKeystore::open(&root, kdf).map_err(|e| AccessError::StorageUnavailable(e.to_string()))
    }

    /// Cache and network for a node about to be materialized.
    ///
    /// Returns the bound handles while a node is bound. Otherwise opens
    /// fresh ones from the root and peer list without keeping them; they
    /// become the session's only through `bind`.
    pub async fn handles(&self) -> AccessResult<(Arc<dyn Cache>, Arc<dyn Network>)> {
        let state = self.state.lock().await;
        if let (Some(cache), Some(network)) = (&state.cache, &state.network) {
            return Ok((Arc::clone(cache), Arc::clone(network)));
        }
        let root = self.resolve_root(&state)?;
        let cache: Arc<dyn Cache> = Arc::new(
            FileCache::open(root.join(CACHE_DIRECTORY))
                .map_err(|e| AccessError::StorageUnavailable(e.to_string()))?,
        );
        let network: Arc<dyn Network> = Arc::new(PeerNetwork::new(state.peers.clone()));
        Ok((cache, network))
    }

    /// Cache bound with the current node
    pub async fn cache(&self) -> Option<Arc<dyn Cache>> {
        self.state.lock().await.cache.clone()
    }

    /// Network bound with the current node
    pub async fn network(&self) -> Option<Arc<dyn Network>> {
        self.state.lock().await.network.clone()
    }

    /// Currently bound node
    pub async fn node(&self) -> Option<Arc<Node>> {
        self.state.lock().await.node.clone()
    }

    /// Bind `node` as the session identity, keeping its handles alongside.
    /// An already bound node wins and is returned instead.
    pub async fn bind(&self, node: Node) -> Arc<Node> {
        let mut state = self.state.lock().await;
        if let Some(existing) = &state.node {
            return Arc::clone(existing);
        }
        state.cache = Some(Arc::clone(node.cache()));
        state.network = Some(Arc::clone(node.network()));
        let node = Arc::new(node);
        state.node = Some(Arc::clone(&node));
        info!(alias = node.alias(), "Node bound to session");
        node
    }

    /// Drop the node, its handles and the root override.
    /// Returns the alias that was bound, if any.
    pub async fn clear(&self) -> Option<String> {
        let mut state = self.state.lock().await;
        let alias = state.node.take().map(|node| node.alias().to_string());
        state.root_override = None;
        state.cache = None;
        state.network = None;
        alias
    }
}
