//! Network selection: wire magic, default port and DNS seeds.

use core::fmt::Display;
use core::str::FromStr;

use bitcoin::network::Magic;
use bitcoin::Network as BitcoinNetwork;

/// DNS seeds maintained by the community for mainnet.
const MAINNET_DNS_SEEDS: &[&str] = &[
    "dnsseed.emzy.de",
    "dnsseed.bluematt.me",
    "dnsseed.bitcoin.dashjr.org",
    "seed.bitcoin.sipa.be",
    "seed.bitcoinstats.com",
    "seed.bitcoin.jonasschnelli.ch",
    "seed.btc.petertodd.org",
    "seed.bitcoin.sprovoost.nl",
    "seed.bitcoin.wiz.biz",
    "seed.bitnodes.io",
];

/// DNS seeds for testnet3.
const TESTNET_DNS_SEEDS: &[&str] = &[
    "testnet-seed.bitcoin.jonasschnelli.ch",
    "seed.tbtc.petertodd.org",
    "seed.testnet.bitcoin.sprovoost.nl",
    "testnet-seed.bluematt.me",
];

/// The Bitcoin network a crawl runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    fn to_bitcoin_network(self) -> BitcoinNetwork {
        match self {
            Network::Mainnet => BitcoinNetwork::Bitcoin,
            Network::Testnet => BitcoinNetwork::Testnet,
        }
    }

    /// Wire magic identifying the network in every frame.
    pub fn magic(&self) -> Magic {
        self.to_bitcoin_network().magic()
    }

    /// The port peers listen on.
    pub fn port(&self) -> u16 {
        match self {
            Network::Mainnet => 8333,
            Network::Testnet => 18333,
        }
    }

    /// Seed names to resolve when bootstrapping a crawl.
    pub fn dns_seeds(&self) -> &'static [&'static str] {
        match self {
            Network::Mainnet => MAINNET_DNS_SEEDS,
            Network::Testnet => TESTNET_DNS_SEEDS,
        }
    }

    /// File name the good-peer list is persisted under.
    pub fn nodes_file(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet.json",
            Network::Testnet => "testnet.json",
        }
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
        }
    }
}

impl FromStr for Network {
    type Err = NetworkParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" | "bitcoin" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            _ => Err(NetworkParseError::UnknownType),
        }
    }
}

impl<'de> serde::Deserialize<'de> for Network {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;

        Network::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl serde::Serialize for Network {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[derive(Debug)]
pub enum NetworkParseError {
    UnknownType,
}

impl Display for NetworkParseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            NetworkParseError::UnknownType => write!(f, "Unknown network type"),
        }
    }
}

impl std::error::Error for NetworkParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_matches_wire_constants() {
        assert_eq!(
            Network::Mainnet.magic().to_bytes(),
            [0xF9, 0xBE, 0xB4, 0xD9]
        );
        assert_eq!(
            Network::Testnet.magic().to_bytes(),
            [0x0B, 0x11, 0x09, 0x07]
        );
    }

    #[test]
    fn parses_from_str() {
        assert_eq!("mainnet".parse::<Network>().unwrap(), Network::Mainnet);
        assert_eq!("testnet".parse::<Network>().unwrap(), Network::Testnet);
        assert!("signet".parse::<Network>().is_err());
    }
}
