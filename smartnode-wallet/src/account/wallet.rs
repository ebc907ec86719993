//! Local wallet implementation
//!
//! `LocalWallet` owns the decrypted seed and every key derived from it. All
//! state lives behind one lock so signing never observes a half-reloaded
//! wallet.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ethers_core::types::Address;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::WalletConfig;
use crate::crypto::keys::bls::parse_pubkey;
use crate::crypto::keys::{
    derive_node_key, derive_validator_key, ExtendedKey, NodeKey, NodeKeyId, NodeKeyPath,
    ValidatorKey,
};
use crate::crypto::mnemonic::{
    generate_mnemonic, mnemonic_to_seed, validate_mnemonic, MnemonicStrength, Seed,
};
use crate::error::{Error, Result};
use crate::keystore::{KeystoreExporter, KeystoreRegistry};
use crate::password::PasswordProvider;
use crate::store::{Encryptor, WalletStore};
use crate::transaction::{self, MessageSigner, TransactionSigner};

/// Indices searched when recovering a validator key by its public key
pub const MAX_VALIDATOR_KEY_RECOVER_ATTEMPTS: u32 = 1000;

/// The node account: its address and the path its key was derived at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAccount {
    pub address: Address,
    pub path: String,
}

#[derive(Default)]
struct WalletState {
    store: Option<WalletStore>,
    seed: Option<Seed>,
    master: Option<ExtendedKey>,
    node_keys: HashMap<NodeKeyId, (NodeKey, String)>,
    validator_keys: HashMap<u32, ValidatorKey>,
}

impl WalletState {
    fn is_initialized(&self) -> bool {
        self.store.is_some() && self.seed.is_some() && self.master.is_some()
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    fn store(&self) -> Result<&WalletStore> {
        self.store.as_ref().ok_or(Error::NotInitialized)
    }

    fn node_key(&mut self, index: u32) -> Result<(NodeKey, String)> {
        let store = self.store.as_ref().ok_or(Error::NotInitialized)?;
        let master = self.master.as_ref().ok_or(Error::NotInitialized)?;

        let id = NodeKeyId { path: store.derivation_path.clone(), index };
        if let Some(cached) = self.node_keys.get(&id) {
            return Ok(cached.clone());
        }

        let derived = derive_node_key(master, &id.path, index)?;
        debug!("Derived node key at {}", derived.1);
        self.node_keys.insert(id, derived.clone());
        Ok(derived)
    }

    fn validator_key(&mut self, index: u32) -> Result<ValidatorKey> {
        let seed = self.seed.as_ref().ok_or(Error::NotInitialized)?;
        if let Some(cached) = self.validator_keys.get(&index) {
            return Ok(cached.clone());
        }

        let key = derive_validator_key(seed.as_bytes(), index)?;
        self.validator_keys.insert(index, key.clone());
        Ok(key)
    }
}

/// A wallet holding the node key and validator keys of one node
pub struct LocalWallet {
    wallet_path: PathBuf,
    chain_id: u64,
    password: Arc<dyn PasswordProvider>,
    encryptor: Arc<dyn Encryptor>,
    keystores: RwLock<KeystoreRegistry>,
    state: Mutex<WalletState>,
}

impl LocalWallet {
    /// Create a wallet and load the store at the configured path if there is one
    pub fn new(
        config: &WalletConfig,
        password: Arc<dyn PasswordProvider>,
        encryptor: Arc<dyn Encryptor>,
    ) -> Result<Self> {
        let wallet = Self {
            wallet_path: config.wallet_path.clone(),
            chain_id: config.chain_id,
            password,
            encryptor,
            keystores: RwLock::new(KeystoreRegistry::new()),
            state: Mutex::new(WalletState::default()),
        };

        wallet.reload()?;
        Ok(wallet)
    }

    pub fn wallet_path(&self) -> &Path {
        &self.wallet_path
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Register a validator keystore. A keystore with the same name is replaced.
    pub fn add_keystore(&self, name: impl Into<String>, keystore: Arc<dyn KeystoreExporter>) {
        self.keystores.write().add(name, keystore);
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().is_initialized()
    }

    /// Check initialization, loading the wallet from disk if needed
    pub fn get_initialized(&self) -> Result<bool> {
        if self.is_initialized() {
            return Ok(true);
        }
        self.reload()
    }

    /// Initialize the wallet from a new random mnemonic and return the mnemonic
    pub fn initialize(&self, path: NodeKeyPath, wallet_index: u32) -> Result<Zeroizing<String>> {
        let mut state = self.state.lock();
        if state.is_initialized() {
            return Err(Error::AlreadyInitialized);
        }

        let mnemonic = generate_mnemonic(MnemonicStrength::Words24)?;
        *state = self.build_state(path, wallet_index, &mnemonic, true)?;

        info!("Initialized wallet");
        Ok(mnemonic)
    }

    /// Recover the wallet from an existing mnemonic
    pub fn recover(&self, path: NodeKeyPath, wallet_index: u32, mnemonic: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.is_initialized() {
            return Err(Error::AlreadyInitialized);
        }
        if !validate_mnemonic(mnemonic) {
            return Err(Error::InvalidMnemonic("word list or checksum mismatch".to_string()));
        }

        *state = self.build_state(path, wallet_index, mnemonic, true)?;

        info!("Recovered wallet");
        Ok(())
    }

    /// Recover the wallet in memory only, without encrypting the seed.
    ///
    /// Used to check that a mnemonic reproduces an address. The result cannot be saved.
    pub fn test_recovery(&self, path: NodeKeyPath, wallet_index: u32, mnemonic: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.is_initialized() {
            return Err(Error::AlreadyInitialized);
        }
        if !validate_mnemonic(mnemonic) {
            return Err(Error::InvalidMnemonic("word list or checksum mismatch".to_string()));
        }

        *state = self.build_state(path, wallet_index, mnemonic, false)?;

        debug!("Recovered wallet for testing");
        Ok(())
    }

    /// Write the wallet store to disk
    pub fn save(&self) -> Result<()> {
        let state = self.state.lock();
        state.ensure_initialized()?;
        state.store()?.save(&self.wallet_path)?;

        info!("Saved wallet to {}", self.wallet_path.display());
        Ok(())
    }

    /// Delete the wallet file. The in-memory wallet is left as it is.
    pub fn delete(&self) -> Result<()> {
        let _state = self.state.lock();
        WalletStore::remove(&self.wallet_path)?;

        info!("Deleted wallet file {}", self.wallet_path.display());
        Ok(())
    }

    /// Drop all keys and load the wallet again from disk.
    ///
    /// Returns false when there is no wallet file. On any error the wallet is
    /// left uninitialized.
    pub fn reload(&self) -> Result<bool> {
        let mut state = self.state.lock();
        *state = WalletState::default();

        let store = match WalletStore::load(&self.wallet_path)? {
            Some(store) => store,
            None => return Ok(false),
        };
        let encrypted_seed = store.encrypted_seed.as_ref().ok_or(Error::Unsaveable)?;
        if encrypted_seed.name() != self.encryptor.name()
            || encrypted_seed.version() != self.encryptor.version()
        {
            return Err(Error::UnsupportedScheme(format!(
                "{} version {}",
                encrypted_seed.name(),
                encrypted_seed.version()
            )));
        }

        let password = self.password.get_password()?;
        let seed = match self.encryptor.decrypt(encrypted_seed, &password) {
            Ok(seed) => Seed::from_bytes(&seed),
            Err(e) => {
                warn!("Could not decrypt wallet seed at {}", self.wallet_path.display());
                return Err(e);
            }
        };
        let master = ExtendedKey::master(seed.as_bytes())?;

        *state = WalletState {
            store: Some(store),
            seed: Some(seed),
            master: Some(master),
            ..WalletState::default()
        };

        info!("Loaded wallet from {}", self.wallet_path.display());
        Ok(true)
    }

    /// The wallet store record as a JSON string
    pub fn to_json_string(&self) -> Result<String> {
        let state = self.state.lock();
        state.ensure_initialized()?;
        let bytes = state.store()?.to_bytes()?;
        String::from_utf8(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// The node key at the wallet's index and the path it was derived at
    pub fn get_node_key(&self) -> Result<(NodeKey, String)> {
        let mut state = self.state.lock();
        state.ensure_initialized()?;
        let index = state.store()?.wallet_index;
        state.node_key(index)
    }

    /// The node key at another index of the wallet's path template
    pub fn get_node_key_at(&self, index: u32) -> Result<(NodeKey, String)> {
        let mut state = self.state.lock();
        state.ensure_initialized()?;
        state.node_key(index)
    }

    pub fn node_account(&self) -> Result<NodeAccount> {
        let (key, path) = self.get_node_key()?;
        Ok(NodeAccount { address: key.address(), path })
    }

    pub fn node_address(&self) -> Result<Address> {
        Ok(self.node_account()?.address)
    }

    /// Next validator index that `create_validator_key` will use
    pub fn next_account(&self) -> Result<u32> {
        let state = self.state.lock();
        state.ensure_initialized()?;
        Ok(state.store()?.next_account)
    }

    /// Sign an unsigned, RLP-encoded transaction for the wallet's chain
    pub fn sign(&self, tx_bytes: &[u8]) -> Result<Vec<u8>> {
        let mut state = self.state.lock();
        state.ensure_initialized()?;
        let index = state.store()?.wallet_index;
        let (key, _) = state.node_key(index)?;
        transaction::sign_transaction(&key, tx_bytes, self.chain_id)
    }

    /// Sign a personal message with the node key
    pub fn sign_message(&self, message: &[u8]) -> Result<[u8; 65]> {
        let mut state = self.state.lock();
        state.ensure_initialized()?;
        let index = state.store()?.wallet_index;
        let (key, _) = state.node_key(index)?;
        transaction::sign_message(&key, message)
    }

    /// The validator key at `index`
    pub fn get_validator_key_at(&self, index: u32) -> Result<ValidatorKey> {
        let mut state = self.state.lock();
        state.ensure_initialized()?;
        state.validator_key(index)
    }

    /// Derive the next validator key, advance the account counter and save the wallet
    pub fn create_validator_key(&self) -> Result<ValidatorKey> {
        let mut state = self.state.lock();
        state.ensure_initialized()?;

        let index = state.store()?.next_account;
        let next = index
            .checked_add(1)
            .ok_or_else(|| Error::KeyDerivation("Ran out of validator key indices".to_string()))?;
        let key = state.validator_key(index)?;

        let mut store = state.store()?.clone();
        store.next_account = next;
        store.save(&self.wallet_path)?;
        state.store = Some(store);

        info!("Created validator key {} with pubkey 0x{}", index, key.pubkey_hex());
        Ok(key)
    }

    /// Find the validator key for `pubkey` among indices `0..=max_index`
    pub fn validator_key_by_pubkey(&self, pubkey: &str, max_index: u32) -> Result<Option<ValidatorKey>> {
        let target = parse_pubkey(pubkey)?;
        let mut state = self.state.lock();
        state.ensure_initialized()?;

        for index in 0..=max_index {
            let key = state.validator_key(index)?;
            if key.pubkey_bytes() == target {
                return Ok(Some(key));
            }
        }
        Ok(None)
    }

    /// Search for the validator key of `pubkey` from `start_index`, store it in
    /// every keystore and return its index.
    ///
    /// The account counter is moved past the recovered index.
    pub fn recover_validator_key(&self, pubkey: &str, start_index: u32) -> Result<u32> {
        let target = parse_pubkey(pubkey)?;
        let mut state = self.state.lock();
        state.ensure_initialized()?;

        let mut found = None;
        for offset in 0..MAX_VALIDATOR_KEY_RECOVER_ATTEMPTS {
            let index = match start_index.checked_add(offset) {
                Some(index) => index,
                None => break,
            };
            let key = state.validator_key(index)?;
            if key.pubkey_bytes() == target {
                found = Some((index, key));
                break;
            }
        }
        let (index, key) = found.ok_or_else(|| Error::ValidatorKeyNotFound(pubkey.to_string()))?;

        self.keystores.read().store_all(index, &key)?;

        let next = index.saturating_add(1);
        if next > state.store()?.next_account {
            let mut store = state.store()?.clone();
            store.next_account = next;
            if store.is_saveable() {
                store.save(&self.wallet_path)?;
            }
            state.store = Some(store);
        }

        info!("Recovered validator key {} with pubkey 0x{}", index, key.pubkey_hex());
        Ok(index)
    }

    /// Export a validator key through every registered keystore
    pub fn store_validator_key(&self, validator_index: u32, key: &ValidatorKey) -> Result<()> {
        self.keystores.read().store_all(validator_index, key)
    }

    fn build_state(
        &self,
        path: NodeKeyPath,
        wallet_index: u32,
        mnemonic: &str,
        encrypt: bool,
    ) -> Result<WalletState> {
        // Must round-trip through NodeKeyPath::from_template on load
        path.validate()?;

        let seed = mnemonic_to_seed(mnemonic, None)?;
        let master = ExtendedKey::master(seed.as_bytes())?;

        let encrypted_seed = if encrypt {
            let password = self.password.get_password()?;
            Some(self.encryptor.encrypt(seed.as_bytes(), &password)?)
        } else {
            None
        };

        Ok(WalletState {
            store: Some(WalletStore::new(encrypted_seed, path, wallet_index)),
            seed: Some(seed),
            master: Some(master),
            ..WalletState::default()
        })
    }
}

impl fmt::Debug for LocalWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalWallet")
            .field("wallet_path", &self.wallet_path)
            .field("chain_id", &self.chain_id)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl TransactionSigner for LocalWallet {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn address(&self) -> Result<Address> {
        self.node_address()
    }

    fn sign_transaction(&self, tx_bytes: &[u8]) -> Result<Vec<u8>> {
        self.sign(tx_bytes)
    }
}

impl MessageSigner for LocalWallet {
    fn sign_message(&self, message: &[u8]) -> Result<[u8; 65]> {
        LocalWallet::sign_message(self, message)
    }
}
