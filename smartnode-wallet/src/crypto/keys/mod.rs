//! Key derivation and management
//!
//! This module derives the node's secp256k1 key along BIP-32 path templates
//! and its BLS12-381 validator keys along EIP-2334 paths.

pub mod bls;
pub mod ethereum;
mod derivation;

pub use bls::{derive_validator_key, ValidatorKey, VALIDATOR_KEY_PATH};
pub use derivation::*;
pub use ethereum::{derive_node_key, ExtendedKey, NodeKey};
