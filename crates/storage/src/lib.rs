//! JSON persistence for crawl results.
//!
//! Good peers are stored as a JSON array of `[host]:port` strings in a file
//! named after the network, under the data directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use sonar_crawl::GoodPeerStore;

/// A storage error.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O error.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The peers file does not hold a JSON array of strings.
    #[error("malformed peers file: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk store for the good-peer list, one JSON file per network.
#[derive(Debug, Clone)]
pub struct NodesFile {
    path: PathBuf,
}

impl NodesFile {
    /// Create the store, making sure the data directory exists.
    pub fn create(dir: impl AsRef<Path>, file_name: &str) -> Result<Self, Error> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        Ok(Self {
            path: dir.join(file_name),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load a previously saved peer list, eg. to warm-start a crawl.
    pub fn load(&self) -> Result<Vec<String>, Error> {
        let data = fs::read(&self.path)?;

        Ok(serde_json::from_slice(&data)?)
    }

    /// Write the full list, replacing the previous file. The bytes go to a
    /// temp file first so a reader never observes a half-written list.
    pub fn save(&self, peers: &[String]) -> Result<(), Error> {
        let data = serde_json::to_vec_pretty(peers)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;

        debug!("saved {} peers to {:?}", peers.len(), self.path);
        Ok(())
    }
}

#[async_trait]
impl GoodPeerStore for NodesFile {
    async fn save(&self, peers: &[String]) -> eyre::Result<()> {
        NodesFile::save(self, peers)?;
        Ok(())
    }
}
