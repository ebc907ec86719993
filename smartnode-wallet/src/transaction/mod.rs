//! Transaction functionality
//!
//! This module provides signing of Ethereum transactions and personal
//! messages with the node key.

pub mod types;
mod ethereum;

pub use types::*;
pub use ethereum::*;
