//! Tests for the local wallet lifecycle

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use smartnode_wallet::crypto::mnemonic::validate_mnemonic;
use smartnode_wallet::keystore::eip2335::KEYSTORE_FILE_NAME;
use smartnode_wallet::{
    Eip2335Exporter, Error, FilePasswordProvider, KdfKind, KeystoreV4Encryptor, LocalWallet,
    NodeKeyPath, PasswordProvider, StaticPassword, WalletConfig,
};
use tempfile::TempDir;

const TEST_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn encryptor() -> Arc<KeystoreV4Encryptor> {
    Arc::new(KeystoreV4Encryptor::with_kdf(KdfKind::Pbkdf2 { rounds: 32 }))
}

fn open(dir: &Path, password: Arc<dyn PasswordProvider>) -> smartnode_wallet::Result<LocalWallet> {
    LocalWallet::new(&WalletConfig::with_data_dir(dir, 1), password, encryptor())
}

fn open_with(dir: &Path, password: &str) -> smartnode_wallet::Result<LocalWallet> {
    open(dir, Arc::new(StaticPassword::new(password)))
}

#[test]
fn test_two_facades_share_one_store() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;

    let first = open_with(dir.path(), "password")?;
    let mnemonic = first.initialize(NodeKeyPath::from_template("m/44'/60'/0'/0/%d")?, 0)?;
    assert!(validate_mnemonic(&mnemonic));
    assert_eq!(mnemonic.split_whitespace().count(), 24);
    first.save()?;

    let second = open_with(dir.path(), "password")?;
    assert!(second.reload()?);

    let (key_a, path_a) = first.get_node_key()?;
    let (key_b, path_b) = second.get_node_key()?;
    assert_eq!(*key_a.secret_bytes(), *key_b.secret_bytes());
    assert_eq!(path_a, path_b);
    Ok(())
}

#[test]
fn test_round_trip_keeps_address() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;

    let wallet = open_with(dir.path(), "password")?;
    wallet.recover(NodeKeyPath::LedgerLive, 3, TEST_MNEMONIC)?;
    let before = wallet.node_account()?;
    wallet.save()?;
    drop(wallet);

    let reopened = open_with(dir.path(), "password")?;
    assert!(reopened.is_initialized());
    assert_eq!(reopened.node_account()?, before);
    assert_eq!(before.path, "m/44'/60'/3/0/0");
    Ok(())
}

#[test]
fn test_recover_is_reproducible() -> Result<()> {
    let a = TempDir::new()?;
    let b = TempDir::new()?;

    let first = open_with(a.path(), "one")?;
    let second = open_with(b.path(), "two")?;
    first.recover(NodeKeyPath::Default, 0, TEST_MNEMONIC)?;
    second.recover(NodeKeyPath::Default, 0, TEST_MNEMONIC)?;

    assert_eq!(first.node_address()?, second.node_address()?);
    assert_eq!(
        format!("{:?}", first.node_address()?),
        "0x9858effd232b4033e47d90003d41ec34ecaeda94"
    );
    Ok(())
}

#[test]
fn test_path_conventions_give_different_addresses() -> Result<()> {
    let a = TempDir::new()?;
    let b = TempDir::new()?;

    let default = open_with(a.path(), "password")?;
    let ledger = open_with(b.path(), "password")?;
    default.recover(NodeKeyPath::Default, 0, TEST_MNEMONIC)?;
    ledger.recover(NodeKeyPath::LedgerLive, 0, TEST_MNEMONIC)?;

    assert_ne!(default.node_address()?, ledger.node_address()?);
    Ok(())
}

#[test]
fn test_wrong_password_fails_closed() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let password_path = dir.path().join("password");
    fs::write(&password_path, "correct")?;

    let password: Arc<dyn PasswordProvider> = Arc::new(FilePasswordProvider::new(&password_path));
    let wallet = open(dir.path(), password.clone())?;
    wallet.recover(NodeKeyPath::Default, 0, TEST_MNEMONIC)?;
    wallet.save()?;
    assert!(wallet.get_node_key().is_ok());
    let on_disk = fs::read(wallet.wallet_path())?;

    fs::write(&password_path, "incorrect")?;
    assert!(matches!(wallet.reload(), Err(Error::DecryptionFailure)));
    assert!(!wallet.is_initialized());
    assert!(matches!(wallet.get_node_key(), Err(Error::NotInitialized)));
    assert!(matches!(wallet.sign_message(b"hello"), Err(Error::NotInitialized)));
    assert_eq!(fs::read(wallet.wallet_path())?, on_disk);

    assert!(matches!(open(dir.path(), password.clone()), Err(Error::DecryptionFailure)));

    fs::write(&password_path, "correct")?;
    assert!(wallet.reload()?);
    assert!(wallet.get_node_key().is_ok());
    Ok(())
}

#[test]
fn test_failed_save_keeps_previous_file() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;

    let wallet = open_with(dir.path(), "password")?;
    wallet.recover(NodeKeyPath::Default, 0, TEST_MNEMONIC)?;
    wallet.save()?;

    // Too long a name for the temporary sibling a save writes first
    let mut config = WalletConfig::with_data_dir(dir.path(), 1);
    config.wallet_path = dir.path().join("w".repeat(230));
    fs::copy(wallet.wallet_path(), &config.wallet_path)?;
    let on_disk = fs::read(&config.wallet_path)?;

    let stuck = LocalWallet::new(&config, Arc::new(StaticPassword::new("password")), encryptor())?;
    assert!(stuck.is_initialized());

    assert!(matches!(stuck.save(), Err(Error::Io(_))));
    assert!(matches!(stuck.create_validator_key(), Err(Error::Io(_))));
    assert_eq!(fs::read(&config.wallet_path)?, on_disk);
    assert_eq!(stuck.next_account()?, 0);
    assert!(stuck.reload()?);
    Ok(())
}

#[test]
fn test_oversized_kdf_params_fail_closed() -> Result<()> {
    let dir = TempDir::new()?;
    let wallet = open_with(dir.path(), "password")?;
    wallet.recover(NodeKeyPath::Default, 0, TEST_MNEMONIC)?;
    wallet.save()?;

    let mut record: Value = serde_json::from_slice(&fs::read(wallet.wallet_path())?)?;
    record["crypto"]["kdf"]["params"]["c"] = Value::from(u32::MAX);
    fs::write(wallet.wallet_path(), record.to_string())?;

    assert!(matches!(wallet.reload(), Err(Error::DecryptionFailure)));
    assert!(!wallet.is_initialized());

    let scrypt_dir = TempDir::new()?;
    let scrypt_wallet = LocalWallet::new(
        &WalletConfig::with_data_dir(scrypt_dir.path(), 1),
        Arc::new(StaticPassword::new("password")),
        Arc::new(KeystoreV4Encryptor::with_kdf(KdfKind::Scrypt { log_n: 4, r: 8, p: 1 })),
    )?;
    scrypt_wallet.recover(NodeKeyPath::Default, 0, TEST_MNEMONIC)?;
    scrypt_wallet.save()?;

    let mut record: Value = serde_json::from_slice(&fs::read(scrypt_wallet.wallet_path())?)?;
    record["crypto"]["kdf"]["params"]["n"] = Value::from(1u64 << 31);
    fs::write(scrypt_wallet.wallet_path(), record.to_string())?;

    assert!(matches!(scrypt_wallet.reload(), Err(Error::DecryptionFailure)));
    assert!(!scrypt_wallet.is_initialized());
    Ok(())
}

#[test]
fn test_missing_file_is_uninitialized() -> Result<()> {
    let dir = TempDir::new()?;
    let wallet = open_with(dir.path(), "password")?;

    assert!(!wallet.reload()?);
    assert!(!wallet.is_initialized());
    assert!(matches!(wallet.to_json_string(), Err(Error::NotInitialized)));
    Ok(())
}

#[test]
fn test_delete_is_idempotent() -> Result<()> {
    let dir = TempDir::new()?;
    let wallet = open_with(dir.path(), "password")?;

    wallet.delete()?;
    wallet.recover(NodeKeyPath::Default, 0, TEST_MNEMONIC)?;
    wallet.save()?;
    assert!(wallet.wallet_path().exists());

    wallet.delete()?;
    wallet.delete()?;
    assert!(!wallet.wallet_path().exists());

    // Deleting the file leaves the loaded keys alone
    assert!(wallet.is_initialized());
    assert!(wallet.node_address().is_ok());

    // Until the next reload
    assert!(!wallet.reload()?);
    assert!(!wallet.is_initialized());
    Ok(())
}

#[test]
fn test_legacy_store_uses_default_path() -> Result<()> {
    let dir = TempDir::new()?;
    let wallet = open_with(dir.path(), "password")?;
    wallet.recover(NodeKeyPath::MyEtherWallet, 0, TEST_MNEMONIC)?;

    let mut record: Value = serde_json::from_str(&wallet.to_json_string()?)?;
    assert_eq!(record["derivationPath"], "m/44'/60'/0'/%d");
    record.as_object_mut().unwrap().remove("derivationPath");
    fs::write(wallet.wallet_path(), record.to_string())?;

    let legacy = open_with(dir.path(), "password")?;
    let account = legacy.node_account()?;
    assert_eq!(account.path, "m/44'/60'/0'/0/0");
    assert_eq!(
        format!("{:?}", account.address),
        "0x9858effd232b4033e47d90003d41ec34ecaeda94"
    );
    Ok(())
}

#[test]
fn test_unknown_scheme_on_load() -> Result<()> {
    let dir = TempDir::new()?;
    let wallet = open_with(dir.path(), "password")?;
    wallet.recover(NodeKeyPath::Default, 0, TEST_MNEMONIC)?;

    let mut record: Value = serde_json::from_str(&wallet.to_json_string()?)?;
    record["version"] = Value::from(99);
    fs::write(wallet.wallet_path(), record.to_string())?;

    assert!(matches!(open_with(dir.path(), "password"), Err(Error::UnsupportedScheme(_))));
    Ok(())
}

#[cfg(unix)]
#[test]
fn test_wallet_file_is_private() -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new()?;
    let wallet = open_with(dir.path(), "password")?;
    wallet.recover(NodeKeyPath::Default, 0, TEST_MNEMONIC)?;
    wallet.save()?;

    let mode = fs::metadata(wallet.wallet_path())?.permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
    Ok(())
}

#[test]
fn test_create_validator_keys() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let wallet = open_with(dir.path(), "password")?;
    wallet.recover(NodeKeyPath::Default, 0, TEST_MNEMONIC)?;
    wallet.save()?;

    let first = wallet.create_validator_key()?;
    let second = wallet.create_validator_key()?;
    assert_eq!(first.path(), "m/12381/3600/0/0/0");
    assert_eq!(second.path(), "m/12381/3600/1/0/0");
    assert_ne!(first.pubkey_bytes(), second.pubkey_bytes());
    assert_eq!(
        hex::encode(*first.secret_bytes()),
        "3ec45abb2792f1f287ab1434acfde9d7aac879eb74c45cf7b59d25f15ba7a650"
    );
    assert_eq!(wallet.next_account()?, 2);

    // The counter survives a restart so indices are never reused
    let reopened = open_with(dir.path(), "password")?;
    assert_eq!(reopened.next_account()?, 2);
    assert_eq!(reopened.create_validator_key()?.path(), "m/12381/3600/2/0/0");
    Ok(())
}

#[test]
fn test_validator_key_lookup() -> Result<()> {
    let dir = TempDir::new()?;
    let wallet = open_with(dir.path(), "password")?;
    wallet.recover(NodeKeyPath::Default, 0, TEST_MNEMONIC)?;

    let key = wallet.get_validator_key_at(3)?;
    let pubkey = format!("0x{}", key.pubkey_hex());

    assert_eq!(wallet.validator_key_by_pubkey(&pubkey, 5)?, Some(key.clone()));
    assert_eq!(wallet.validator_key_by_pubkey(&pubkey, 2)?, None);
    assert!(wallet.validator_key_by_pubkey("0x1234", 2).is_err());
    // Looking keys up does not mint anything
    assert_eq!(wallet.next_account()?, 0);
    Ok(())
}

#[test]
fn test_recover_validator_key_exports_keystore() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let keystore_dir = dir.path().join("validators");

    let wallet = open_with(dir.path(), "password")?;
    wallet.recover(NodeKeyPath::Default, 0, TEST_MNEMONIC)?;
    wallet.save()?;

    let exporter = Arc::new(Eip2335Exporter::with_kdf(
        &keystore_dir,
        Arc::new(StaticPassword::new("validator")),
        KdfKind::Scrypt { log_n: 4, r: 8, p: 1 },
    ));
    wallet.add_keystore("generic", exporter.clone());

    let key = wallet.get_validator_key_at(4)?;
    let index = wallet.recover_validator_key(&key.pubkey_hex(), 2)?;
    assert_eq!(index, 4);

    let keystore_path = keystore_dir
        .join(format!("0x{}", key.pubkey_hex()))
        .join(KEYSTORE_FILE_NAME);
    assert!(keystore_path.exists());
    assert_eq!(exporter.load(&key.pubkey_hex())?, key);

    assert_eq!(wallet.next_account()?, 5);
    assert_eq!(open_with(dir.path(), "password")?.next_account()?, 5);
    Ok(())
}

#[test]
fn test_store_validator_key() -> Result<()> {
    let dir = TempDir::new()?;
    let wallet = open_with(dir.path(), "password")?;
    wallet.recover(NodeKeyPath::Default, 0, TEST_MNEMONIC)?;

    // Without keystores storing is a no-op
    let key = wallet.get_validator_key_at(0)?;
    wallet.store_validator_key(0, &key)?;

    let exporter = Arc::new(Eip2335Exporter::with_kdf(
        dir.path().join("validators"),
        Arc::new(StaticPassword::new("validator")),
        KdfKind::Pbkdf2 { rounds: 16 },
    ));
    wallet.add_keystore("generic", exporter.clone());
    wallet.store_validator_key(0, &key)?;
    assert_eq!(exporter.load(&key.pubkey_hex())?, key);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_signing_and_reload() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;

    let wallet = Arc::new(open_with(dir.path(), "password")?);
    wallet.recover(NodeKeyPath::Default, 0, TEST_MNEMONIC)?;
    wallet.save()?;
    let address = wallet.node_address()?;

    let mut tasks = Vec::new();
    for i in 0..8u8 {
        let wallet = wallet.clone();
        tasks.push(tokio::task::spawn_blocking(move || -> smartnode_wallet::Result<()> {
            for _ in 0..10 {
                if i % 4 == 0 {
                    wallet.reload()?;
                } else {
                    let message = [i; 16];
                    let signature = wallet.sign_message(&message)?;
                    let signer = smartnode_wallet::transaction::recover_message_signer(
                        &message,
                        &signature,
                    )?;
                    assert_eq!(signer, address);
                }
            }
            Ok(())
        }));
    }

    for task in tasks {
        task.await??;
    }
    assert_eq!(wallet.node_address()?, address);
    Ok(())
}
