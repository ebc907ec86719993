//! Smartnode Wallet - local key management for a staking node
//!
//! This library derives, encrypts, persists and uses the node's keys: the
//! secp256k1 node key that signs transactions and messages, and the BLS12-381
//! validator keys exported to validator client keystores.

pub mod error;
pub mod config;
pub mod password;
pub mod crypto;
pub mod store;
pub mod account;
pub mod transaction;
pub mod keystore;

// Re-export commonly used types for convenience
pub use account::{LocalWallet, NodeAccount};
pub use config::WalletConfig;
pub use crypto::keys::{NodeKeyPath, ValidatorKey};
pub use error::{Error, Result};
pub use keystore::{Eip2335Exporter, KeystoreExporter, KeystoreRegistry};
pub use password::{FilePasswordProvider, PasswordProvider, StaticPassword};
pub use store::{Encryptor, KdfKind, KeystoreV4Encryptor};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
