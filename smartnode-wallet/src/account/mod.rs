//! Account management functionality
//!
//! This module provides the local wallet: its lifecycle, the node account
//! and the validator keys minted from the wallet seed.

mod wallet;

pub use wallet::*;
