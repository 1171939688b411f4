//! Concrete cache and network handles built by the session

use super::{Cache, Network};
use std::fs;
use std::path::{Path, PathBuf};

/// Cache directory rooted in the session root
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Open (creating if needed) the cache directory
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Cache for FileCache {
    fn location(&self) -> String {
        self.dir.display().to_string()
    }
}

/// Network over a fixed peer list
#[derive(Debug, Clone, Default)]
pub struct PeerNetwork {
    peers: Vec<String>,
}

impl PeerNetwork {
    /// Blank and duplicate entries are dropped
    pub fn new(peers: impl IntoIterator<Item = String>) -> Self {
        let mut unique: Vec<String> = Vec::new();
        for peer in peers {
            let peer = peer.trim().to_string();
            if !peer.is_empty() && !unique.contains(&peer) {
                unique.push(peer);
            }
        }
        Self { peers: unique }
    }
}

impl Network for PeerNetwork {
    fn peers(&self) -> Vec<String> {
        self.peers.clone()
    }
}
