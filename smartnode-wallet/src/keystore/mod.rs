//! Validator keystore exporters
//!
//! Each validator client expects its keys in its own on-disk layout. An
//! exporter converts a derived validator key into one such layout, and the
//! registry holds one exporter per client name.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::crypto::keys::ValidatorKey;
use crate::error::Result;

pub mod eip2335;

pub use eip2335::Eip2335Exporter;

/// Writes validator keys in a client specific format
pub trait KeystoreExporter: Send + Sync + fmt::Debug {
    /// Store the key for `validator_index`
    fn store(&self, validator_index: u32, key: &ValidatorKey) -> Result<()>;

    /// Directory keys are written to
    fn keystore_dir(&self) -> &Path;
}

/// Named keystore exporters
#[derive(Debug, Default, Clone)]
pub struct KeystoreRegistry {
    keystores: BTreeMap<String, Arc<dyn KeystoreExporter>>,
}

impl KeystoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an exporter, replacing any exporter already using `name`
    pub fn add(&mut self, name: impl Into<String>, exporter: Arc<dyn KeystoreExporter>) {
        let name = name.into();
        debug!("Registered keystore {}", name);
        self.keystores.insert(name, exporter);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn KeystoreExporter>> {
        self.keystores.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.keystores.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keystores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keystores.is_empty()
    }

    /// Store a key through every registered exporter, in name order
    pub fn store_all(&self, validator_index: u32, key: &ValidatorKey) -> Result<()> {
        for (name, keystore) in &self.keystores {
            debug!("Storing validator key {} in keystore {}", validator_index, name);
            keystore.store(validator_index, key)?;
        }
        Ok(())
    }
}
