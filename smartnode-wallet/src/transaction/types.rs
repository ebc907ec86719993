//! Signing capabilities exposed to the transaction submission layer

use ethers_core::types::Address;

use crate::error::Result;

/// Signs raw transactions with the node key
pub trait TransactionSigner {
    /// Chain id signatures are bound to
    fn chain_id(&self) -> u64;

    /// Address of the signing key
    fn address(&self) -> Result<Address>;

    /// Sign an unsigned, RLP-encoded transaction and return its signed encoding
    fn sign_transaction(&self, tx_bytes: &[u8]) -> Result<Vec<u8>>;
}

/// Signs arbitrary messages with the node key
pub trait MessageSigner {
    /// Sign a message under the personal message convention
    fn sign_message(&self, message: &[u8]) -> Result<[u8; 65]>;
}
