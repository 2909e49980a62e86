use std::time::Duration;

use serde::Deserialize;

use sonar_wire::Network;

const DEFAULT_TIMEOUT_SECS: u64 = 5;

#[derive(Deserialize, Clone)]
pub struct DnsConfig {
    /// Seed names to resolve. The network's well-known seeds are used when
    /// empty.
    #[serde(default)]
    pub seeds: Vec<String>,

    /// Per-seed lookup timeout, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            timeout: default_timeout(),
        }
    }
}

impl DnsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn seeds(&self, network: Network) -> Vec<String> {
        if self.seeds.is_empty() {
            network
                .dns_seeds()
                .iter()
                .map(|seed| seed.to_string())
                .collect()
        } else {
            self.seeds.clone()
        }
    }
}
