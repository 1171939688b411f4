//! Node: the in-memory identity bundle
//!
//! A `Node` only exists fully constructed: the factory returns it after the
//! key is decrypted (sign-in) or generated, stored and registered (sign-up).
//! The session hands it out as `Arc<Node>` so repeated `get_node` calls
//! observe the same instance.

use crate::core_identity::keypair::Keypair;
use crate::ledger::{Cache, Network};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

mod factory;

pub use factory::NodeFactory;

/// Handle to a ledger channel opened by this node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHandle {
    pub name: String,
    /// Hash of the head block, once known
    pub head: Option<Vec<u8>>,
}

impl ChannelHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            head: None,
        }
    }
}

/// Identity bound to an alias plus the session's cache and network
pub struct Node {
    alias: String,
    keypair: Keypair,
    cache: Arc<dyn Cache>,
    network: Arc<dyn Network>,
    channels: RwLock<HashMap<String, ChannelHandle>>,
}

impl Node {
    pub(crate) fn new(
        alias: impl Into<String>,
        keypair: Keypair,
        cache: Arc<dyn Cache>,
        network: Arc<dyn Network>,
    ) -> Self {
        Self {
            alias: alias.into(),
            keypair,
            cache,
            network,
            channels: RwLock::new(HashMap::new()),
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn public_key(&self) -> &[u8] {
        self.keypair.public_key()
    }

    /// Public key in the form shown to users
    pub fn public_key_base64(&self) -> String {
        self.keypair.public_key_base64()
    }

    /// Sign with this node's private key
    pub fn sign(&self, msg: &[u8]) -> Result<Vec<u8>, String> {
        self.keypair.sign(msg)
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    pub fn network(&self) -> &Arc<dyn Network> {
        &self.network
    }

    /// Look up an opened channel
    pub fn channel(&self, name: &str) -> Option<ChannelHandle> {
        self.channels.read().unwrap_or_else(PoisonError::into_inner).get(name).cloned()
    }

    /// Record a channel, replacing an earlier handle of the same name
    pub fn add_channel(&self, handle: ChannelHandle) {
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.name.clone(), handle);
    }

    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("alias", &self.alias)
            .field("public_key", &self.keypair.public_key_base64())
            .field("cache", &self.cache)
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}
