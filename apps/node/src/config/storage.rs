use std::path::PathBuf;

use serde::Deserialize;

#[derive(Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory the peer lists are written to.
    #[serde(default = "default_path")]
    pub path: PathBuf,
}

fn default_path() -> PathBuf {
    PathBuf::from("data")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
        }
    }
}
