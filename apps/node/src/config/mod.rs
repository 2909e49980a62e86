use std::path::PathBuf;
use std::time::Duration;

use config::Config;
use serde::Deserialize;
use tracing::metadata::Level;

use sonar_crawl::CrawlConfig;
use sonar_wire::Network;

mod crawler;
pub use crawler::CrawlerConfig;

mod dns;
pub use dns::DnsConfig;

mod logger;
pub use logger::LoggerConfig;

mod storage;
pub use storage::StorageConfig;

#[derive(Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_network")]
    pub network: Network,

    #[serde(default)]
    pub crawler: CrawlerConfig,

    #[serde(default)]
    pub dns: DnsConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logger: LoggerConfig,

    #[serde(default)]
    pub shutdown_timeout: Option<u64>,
}

fn default_network() -> Network {
    Network::Mainnet
}

impl NodeConfig {
    /// Load the configuration, starting from built-in defaults, layering the
    /// TOML file when given, and letting the environment knobs win.
    pub fn from_path(path: Option<PathBuf>) -> eyre::Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let mut config: NodeConfig = builder.build()?.try_deserialize()?;
        config.apply_env();

        Ok(config)
    }

    /// `TESTNET=1`, `DEBUG=1` and `CONN=<n>` take precedence over the file.
    fn apply_env(&mut self) {
        if std::env::var("TESTNET").as_deref() == Ok("1") {
            self.network = Network::Testnet;
        }
        if std::env::var("DEBUG").as_deref() == Ok("1") {
            self.logger.level = Level::DEBUG;
            self.crawler.connections = crawler::DEBUG_CONNECTIONS;
        }
        if let Some(connections) = std::env::var("CONN").ok().and_then(|v| v.parse().ok()) {
            self.crawler.connections = connections;
        }
    }

    pub fn to_crawl_config(&self) -> CrawlConfig {
        let mut config = CrawlConfig::new(self.network);
        config.connections = self.crawler.connections;
        config.exit_when_idle = self.crawler.exit_when_idle;
        config.session.dial_timeout = Duration::from_secs(self.crawler.dial_timeout);
        config.session.ping_timeout = Duration::from_secs(self.crawler.ping_timeout);
        config
    }
}
