//! Generic EIP-2335 keystore exporter

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use super::KeystoreExporter;
use crate::crypto::keys::bls::parse_pubkey;
use crate::crypto::keys::ValidatorKey;
use crate::error::{Error, Result};
use crate::password::PasswordProvider;
use crate::store::encryptor::{KdfKind, KeystoreCrypto, KeystoreV4Encryptor, KEYSTORE_VERSION};
use crate::store::write_atomic;

/// File name of each key's keystore inside its pubkey directory
pub const KEYSTORE_FILE_NAME: &str = "keystore.json";

#[derive(Debug, Serialize, Deserialize)]
struct KeystoreFile {
    crypto: Value,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    description: String,
    pubkey: String,
    path: String,
    uuid: Uuid,
    version: u32,
}

/// Writes each key to `<dir>/0x<pubkey>/keystore.json`
#[derive(Debug)]
pub struct Eip2335Exporter {
    dir: PathBuf,
    password: Arc<dyn PasswordProvider>,
    encryptor: KeystoreV4Encryptor,
}

impl Eip2335Exporter {
    /// Create an exporter encrypting with the standard scrypt parameters
    pub fn new(dir: impl Into<PathBuf>, password: Arc<dyn PasswordProvider>) -> Self {
        Self::with_kdf(dir, password, KdfKind::scrypt())
    }

    pub fn with_kdf(dir: impl Into<PathBuf>, password: Arc<dyn PasswordProvider>, kdf: KdfKind) -> Self {
        Self {
            dir: dir.into(),
            password,
            encryptor: KeystoreV4Encryptor::with_kdf(kdf),
        }
    }

    /// Location of the keystore for a public key
    pub fn keystore_path(&self, pubkey: &str) -> Result<PathBuf> {
        let pubkey = parse_pubkey(pubkey)?;
        Ok(self
            .dir
            .join(format!("0x{}", hex::encode(pubkey)))
            .join(KEYSTORE_FILE_NAME))
    }

    /// Read back and decrypt the keystore for a public key
    pub fn load(&self, pubkey: &str) -> Result<ValidatorKey> {
        let bytes = fs::read(self.keystore_path(pubkey)?)?;
        let file: KeystoreFile = serde_json::from_slice(&bytes)?;
        if file.version != KEYSTORE_VERSION {
            return Err(Error::UnsupportedScheme(format!("keystore version {}", file.version)));
        }

        let crypto = KeystoreCrypto::from_json(&file.crypto)?;
        let password = self.password.get_password()?;
        let secret = self.encryptor.decrypt_crypto(&crypto, &password)?;

        let key = ValidatorKey::from_bytes(&secret, file.path)?;
        if key.pubkey_bytes() != parse_pubkey(&file.pubkey)? {
            return Err(Error::Keystore(format!(
                "Keystore pubkey {} does not match its secret key",
                file.pubkey
            )));
        }
        Ok(key)
    }
}

impl KeystoreExporter for Eip2335Exporter {
    fn store(&self, validator_index: u32, key: &ValidatorKey) -> Result<()> {
        let password = self.password.get_password()?;
        let crypto = self.encryptor.encrypt_crypto(&key.secret_bytes()[..], &password)?;

        let file = KeystoreFile {
            crypto: crypto.to_json(),
            description: format!("validator {}", validator_index),
            pubkey: key.pubkey_hex(),
            path: key.path().to_string(),
            uuid: Uuid::new_v4(),
            version: KEYSTORE_VERSION,
        };

        let path = self.keystore_path(&file.pubkey)?;
        write_atomic(&path, &serde_json::to_vec_pretty(&file)?)?;

        info!("Stored validator key {} at {}", validator_index, path.display());
        Ok(())
    }

    fn keystore_dir(&self) -> &Path {
        &self.dir
    }
}
