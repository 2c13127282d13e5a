use serde::{Deserialize, Serialize};

/// Network variants for BSV.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    pub fn is_mainnet(self) -> bool {
        matches!(self, Network::Mainnet)
    }

    /// Leading byte of a WIF-encoded private key.
    pub fn wif_prefix(self) -> u8 {
        match self {
            Network::Mainnet => 0x80,
            Network::Testnet => 0xef,
        }
    }

    /// Version byte of a P2PKH address.
    pub fn p2pkh_version(self) -> u8 {
        match self {
            Network::Mainnet => 0x00,
            Network::Testnet => 0x6f,
        }
    }

    pub fn from_p2pkh_version(version: u8) -> Option<Self> {
        match version {
            0x00 => Some(Network::Mainnet),
            0x6f => Some(Network::Testnet),
            _ => None,
        }
    }

    pub fn default_oracle_url(self) -> &'static str {
        match self {
            Network::Mainnet => "https://api.whatsonchain.com/v1/bsv/main",
            Network::Testnet => "https://api.whatsonchain.com/v1/bsv/test",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
        }
    }
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" | "bsv" => Ok(Network::Mainnet),
            "testnet" | "test" | "bsv-testnet" => Ok(Network::Testnet),
            _ => Err(format!("invalid network: {}", s)),
        }
    }
}
