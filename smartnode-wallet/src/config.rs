//! Wallet configuration

use std::path::{Path, PathBuf};

/// Default data directory
pub const DEFAULT_DATA_DIR: &str = "data";

/// Default chain id (Ethereum mainnet)
pub const DEFAULT_CHAIN_ID: u64 = 1;

/// Locations and network settings of a local wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletConfig {
    /// Encrypted wallet file
    pub wallet_path: PathBuf,
    /// File holding the wallet password
    pub password_path: PathBuf,
    /// Directory validator keystores are exported to
    pub validator_keystore_path: PathBuf,
    /// Chain id transactions are signed for
    pub chain_id: u64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self::with_data_dir(DEFAULT_DATA_DIR, DEFAULT_CHAIN_ID)
    }
}

impl WalletConfig {
    /// Lay out the wallet, password and keystores under one data directory
    pub fn with_data_dir(data_dir: impl AsRef<Path>, chain_id: u64) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            wallet_path: data_dir.join("wallet"),
            password_path: data_dir.join("password"),
            validator_keystore_path: data_dir.join("validators"),
            chain_id,
        }
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        let data_dir = std::env::var("SMARTNODE_DATA_DIR")
            .unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string());

        let chain_id = std::env::var("SMARTNODE_CHAIN_ID")
            .unwrap_or_else(|_| DEFAULT_CHAIN_ID.to_string())
            .parse()
            .unwrap_or(DEFAULT_CHAIN_ID);

        let defaults = Self::with_data_dir(&data_dir, chain_id);

        Self {
            wallet_path: std::env::var("SMARTNODE_WALLET_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.wallet_path),
            password_path: std::env::var("SMARTNODE_PASSWORD_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.password_path),
            validator_keystore_path: std::env::var("SMARTNODE_VALIDATOR_KEYSTORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.validator_keystore_path),
            chain_id,
        }
    }
}
