use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::network::Network;

/// When the session's last-error slot is cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// A successful operation of the same kind clears the slot.
    #[default]
    ClearOnCategorySuccess,
    /// The slot is only ever overwritten by the next failure.
    Sticky,
    /// The slot is cleared when any operation starts.
    ClearOnAttempt,
}

/// Configuration for a [`WalletSession`](crate::session::WalletSession).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub network: Network,
    /// Ledger oracle base URL. Falls back to the network default.
    pub oracle_url: Option<String>,
    pub error_policy: ErrorPolicy,
    /// Serialize mutating operations so they complete in issue order.
    pub serialize_operations: bool,
    /// Await a balance and history refresh at the end of `initialize`.
    pub sync_on_initialize: bool,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            oracle_url: None,
            error_policy: ErrorPolicy::default(),
            serialize_operations: false,
            sync_on_initialize: true,
        }
    }
}

impl WalletConfig {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            ..Default::default()
        }
    }

    pub fn oracle_url(&self) -> &str {
        self.oracle_url
            .as_deref()
            .unwrap_or_else(|| self.network.default_oracle_url())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config = WalletConfig::from_json_str(r#"{ "network": "testnet" }"#).unwrap();
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.error_policy, ErrorPolicy::ClearOnCategorySuccess);
        assert!(config.sync_on_initialize);
        assert!(!config.serialize_operations);
        assert_eq!(config.oracle_url(), Network::Testnet.default_oracle_url());
    }

    #[test]
    fn explicit_oracle_url_wins() {
        let config = WalletConfig::from_json_str(
            r#"{ "oracle_url": "http://localhost:3000", "error_policy": "sticky" }"#,
        )
        .unwrap();
        assert_eq!(config.oracle_url(), "http://localhost:3000");
        assert_eq!(config.error_policy, ErrorPolicy::Sticky);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallet.json");
        fs::write(&path, r#"{ "serialize_operations": true }"#).unwrap();
        let config = WalletConfig::load(&path).unwrap();
        assert!(config.serialize_operations);
        assert_eq!(config.network, Network::Mainnet);
    }

    #[test]
    fn bad_json_is_config_error() {
        let err = WalletConfig::from_json_str("{ nope").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
