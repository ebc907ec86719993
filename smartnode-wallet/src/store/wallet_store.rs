//! The persisted wallet record

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::encryptor::EncryptedSeed;
use crate::crypto::keys::NodeKeyPath;
use crate::error::{Error, Result};

/// Permissions of the wallet file and every keystore written next to it
pub const FILE_MODE: u32 = 0o600;

/// Wallet data as stored on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletStore {
    /// Absent when the wallet only exists to test a recovery
    pub encrypted_seed: Option<EncryptedSeed>,
    pub uuid: Uuid,
    pub derivation_path: NodeKeyPath,
    pub wallet_index: u32,
    pub next_account: u32,
}

/// On-disk JSON layout
#[derive(Debug, Serialize, Deserialize)]
struct StoreRecord {
    crypto: Value,
    name: String,
    version: u32,
    uuid: Uuid,
    #[serde(rename = "derivationPath", default, skip_serializing_if = "String::is_empty")]
    derivation_path: String,
    #[serde(rename = "walletIndex", default, skip_serializing_if = "is_zero")]
    wallet_index: u32,
    #[serde(default)]
    next_account: u32,
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

impl WalletStore {
    /// Create a fresh store with a new UUID and no minted accounts
    pub fn new(
        encrypted_seed: Option<EncryptedSeed>,
        derivation_path: NodeKeyPath,
        wallet_index: u32,
    ) -> Self {
        Self {
            encrypted_seed,
            uuid: Uuid::new_v4(),
            derivation_path,
            wallet_index,
            next_account: 0,
        }
    }

    /// Whether this store can be written to disk
    pub fn is_saveable(&self) -> bool {
        self.encrypted_seed.is_some()
    }

    /// Serialize the store to its JSON record
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let encrypted_seed = self.encrypted_seed.as_ref().ok_or(Error::Unsaveable)?;

        let record = StoreRecord {
            crypto: encrypted_seed.to_json(),
            name: encrypted_seed.name().to_string(),
            version: encrypted_seed.version(),
            uuid: self.uuid,
            derivation_path: self.derivation_path.template().to_string(),
            wallet_index: self.wallet_index,
            next_account: self.next_account,
        };

        Ok(serde_json::to_vec(&record)?)
    }

    /// Parse a store from its JSON record.
    ///
    /// Stores written before the path was recorded get the default template.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let record: StoreRecord = serde_json::from_slice(bytes)?;
        let encrypted_seed = EncryptedSeed::from_parts(&record.name, record.version, &record.crypto)?;

        Ok(Self {
            encrypted_seed: Some(encrypted_seed),
            uuid: record.uuid,
            derivation_path: NodeKeyPath::from_template(&record.derivation_path)?,
            wallet_index: record.wallet_index,
            next_account: record.next_account,
        })
    }

    /// Load the store at `path`. A missing file is not an error.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match fs::read(path) {
            Ok(bytes) => Self::from_bytes(&bytes).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No wallet file at {}", path.display());
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write the store to `path`, replacing any previous file atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.to_bytes()?)
    }

    /// Remove the store file at `path`. Removing a missing file succeeds.
    pub fn remove(path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write `bytes` to a temporary sibling of `path` and rename it into place.
///
/// The previous file at `path` stays intact unless the rename succeeds.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    // Unique per write, so the file is always created with FILE_MODE
    let temp_path = temp_path_for(path);

    #[cfg(unix)]
    let mut temp_file = {
        use std::os::unix::fs::OpenOptionsExt;
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(FILE_MODE)
            .open(&temp_path)?
    };

    #[cfg(not(unix))]
    let mut temp_file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)?;

    let written = temp_file.write_all(bytes).and_then(|_| temp_file.sync_all());
    drop(temp_file);
    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }

    match fs::rename(&temp_path, path) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = fs::remove_file(&temp_path);
            Err(Error::Io(e))
        }
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| OsString::from("wallet"));
    name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
    path.with_file_name(name)
}
