//! Error types for the smartnode-wallet library

use thiserror::Error;

/// Custom error type for wallet operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Wallet is not initialized")]
    NotInitialized,

    #[error("Wallet is already initialized")]
    AlreadyInitialized,

    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// Wrong password, checksum mismatch or corrupted KDF/cipher parameters.
    #[error("Could not decrypt wallet seed")]
    DecryptionFailure,

    #[error("Key derivation error: {0}")]
    KeyDerivation(String),

    /// A BIP-32 child index produced an unusable key.
    #[error("Invalid child key")]
    InvalidChild,

    #[error("Validator key not found: {0}")]
    ValidatorKeyNotFound(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported encryption scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Could not get wallet password: {0}")]
    Password(String),

    /// The wallet was built by a recovery test and holds no encrypted seed.
    #[error("Wallet has no encrypted seed and cannot be saved")]
    Unsaveable,

    #[error("Keystore error: {0}")]
    Keystore(String),
}

/// Result type for wallet operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
