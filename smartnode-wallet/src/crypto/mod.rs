//! Cryptographic primitives and operations
//!
//! This module provides mnemonic generation, seed derivation and the
//! hierarchical derivation of node and validator keys.

pub mod mnemonic;
pub mod keys;

pub use mnemonic::*;
pub use keys::*;
