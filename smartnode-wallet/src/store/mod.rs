//! Encrypted wallet storage
//!
//! This module provides the seed encryption schemes and the on-disk wallet
//! record built on top of them.

pub mod encryptor;
pub mod wallet_store;

pub use encryptor::{EncryptedSeed, Encryptor, KdfKind, KeystoreV4Encryptor};
pub use wallet_store::{write_atomic, WalletStore, FILE_MODE};
