//! Password-based seed encryption
//!
//! The only scheme is EIP-2335 ("keystore", version 4): a PBKDF2 or scrypt
//! derived key, an AES-128-CTR cipher and a SHA-256 checksum over the second
//! half of the derived key and the ciphertext.
//!
//! The checksum does not cover the cipher IV. A corrupted IV of the right
//! length decrypts without error to different bytes, so callers that need to
//! detect this must compare what the seed derives against a known value.

use std::fmt;

use aes::cipher::{KeyIvInit, StreamCipher};
use aes::Aes128;
use ctr::Ctr128BE;
use hmac::Hmac;
use rand::{rngs::OsRng, RngCore};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Scheme name of EIP-2335 keystores
pub const KEYSTORE_NAME: &str = "keystore";
/// Scheme version of EIP-2335 keystores
pub const KEYSTORE_VERSION: u32 = 4;

/// Standard PBKDF2 iteration count (2^18)
pub const PBKDF2_ROUNDS: u32 = 262_144;
/// Standard scrypt cost, as log2(n)
pub const SCRYPT_LOG_N: u8 = 18;
pub const SCRYPT_R: u32 = 8;
pub const SCRYPT_P: u32 = 1;

/// Largest PBKDF2 iteration count accepted when decrypting (2^24)
pub const MAX_PBKDF2_ROUNDS: u32 = 1 << 24;
/// Largest scrypt cost accepted when decrypting, as log2(n)
pub const MAX_SCRYPT_LOG_N: u8 = 20;
pub const MAX_SCRYPT_R: u32 = 32;
pub const MAX_SCRYPT_P: u32 = 16;
/// Largest scrypt working memory (128 * n * r bytes) accepted when decrypting
pub const MAX_SCRYPT_MEMORY: u64 = 1 << 30;

const DKLEN: usize = 32;
const SALT_LENGTH: usize = 32;
const IV_LENGTH: usize = 16;

const PBKDF2_PRF: &str = "hmac-sha256";
const CHECKSUM_FUNCTION: &str = "sha256";
const CIPHER_FUNCTION: &str = "aes-128-ctr";

type Aes128Ctr = Ctr128BE<Aes128>;

/// A password-based encryption scheme for the wallet seed
pub trait Encryptor: Send + Sync + fmt::Debug {
    /// Scheme name written to the store
    fn name(&self) -> &str;

    /// Scheme version written to the store
    fn version(&self) -> u32;

    /// Encrypt a secret under a password
    fn encrypt(&self, secret: &[u8], password: &str) -> Result<EncryptedSeed>;

    /// Decrypt a secret. Any failure is reported as `DecryptionFailure`.
    fn decrypt(&self, encrypted: &EncryptedSeed, password: &str) -> Result<Zeroizing<Vec<u8>>>;
}

/// Encrypted seed, tagged by the scheme that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncryptedSeed {
    KeystoreV4(KeystoreCrypto),
}

impl EncryptedSeed {
    /// Rebuild an encrypted seed from its persisted scheme identifier and payload
    pub fn from_parts(name: &str, version: u32, crypto: &Value) -> Result<Self> {
        match (name, version) {
            (KEYSTORE_NAME, KEYSTORE_VERSION) => {
                Ok(Self::KeystoreV4(KeystoreCrypto::from_json(crypto)?))
            }
            _ => Err(Error::UnsupportedScheme(format!("{} version {}", name, version))),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::KeystoreV4(_) => KEYSTORE_NAME,
        }
    }

    pub fn version(&self) -> u32 {
        match self {
            Self::KeystoreV4(_) => KEYSTORE_VERSION,
        }
    }

    /// The scheme-specific payload as stored in the `crypto` field
    pub fn to_json(&self) -> Value {
        match self {
            Self::KeystoreV4(crypto) => crypto.to_json(),
        }
    }
}

/// Key derivation function and its parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kdf {
    Pbkdf2(Pbkdf2Params),
    Scrypt(ScryptParams),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pbkdf2Params {
    pub dklen: u32,
    pub c: u32,
    pub prf: String,
    #[serde(with = "hex")]
    pub salt: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScryptParams {
    pub dklen: u32,
    pub n: u32,
    pub r: u32,
    pub p: u32,
    #[serde(with = "hex")]
    pub salt: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CipherParams {
    #[serde(with = "hex")]
    iv: Vec<u8>,
}

/// One `{function, params, message}` entry of the crypto object
#[derive(Debug, Serialize, Deserialize)]
struct Module {
    function: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawCrypto {
    kdf: Module,
    checksum: Module,
    cipher: Module,
}

/// The crypto object of an EIP-2335 keystore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeystoreCrypto {
    pub kdf: Kdf,
    pub checksum: Vec<u8>,
    pub iv: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

impl KeystoreCrypto {
    /// Parse the crypto object.
    ///
    /// Unknown functions are `UnsupportedScheme`, a missing module is a
    /// `Serialization` error and corrupted parameters are `DecryptionFailure`.
    pub fn from_json(value: &Value) -> Result<Self> {
        let raw: RawCrypto = serde_json::from_value(value.clone())?;

        let kdf = match raw.kdf.function.as_str() {
            "pbkdf2" => Kdf::Pbkdf2(parse_params(raw.kdf.params)?),
            "scrypt" => Kdf::Scrypt(parse_params(raw.kdf.params)?),
            other => return Err(Error::UnsupportedScheme(format!("kdf function {}", other))),
        };

        if raw.checksum.function != CHECKSUM_FUNCTION {
            return Err(Error::UnsupportedScheme(format!(
                "checksum function {}",
                raw.checksum.function
            )));
        }
        if raw.cipher.function != CIPHER_FUNCTION {
            return Err(Error::UnsupportedScheme(format!(
                "cipher function {}",
                raw.cipher.function
            )));
        }

        let cipher: CipherParams = parse_params(raw.cipher.params)?;

        Ok(Self {
            kdf,
            checksum: hex::decode(&raw.checksum.message).map_err(|_| Error::DecryptionFailure)?,
            iv: cipher.iv,
            ciphertext: hex::decode(&raw.cipher.message).map_err(|_| Error::DecryptionFailure)?,
        })
    }

    pub fn to_json(&self) -> Value {
        let kdf = match &self.kdf {
            Kdf::Pbkdf2(params) => json!({ "function": "pbkdf2", "params": params, "message": "" }),
            Kdf::Scrypt(params) => json!({ "function": "scrypt", "params": params, "message": "" }),
        };

        json!({
            "kdf": kdf,
            "checksum": {
                "function": CHECKSUM_FUNCTION,
                "params": {},
                "message": hex::encode(&self.checksum),
            },
            "cipher": {
                "function": CIPHER_FUNCTION,
                "params": { "iv": hex::encode(&self.iv) },
                "message": hex::encode(&self.ciphertext),
            },
        })
    }
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(|_| Error::DecryptionFailure)
}

/// KDF and work factor used for new encryptions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KdfKind {
    Pbkdf2 { rounds: u32 },
    Scrypt { log_n: u8, r: u32, p: u32 },
}

impl Default for KdfKind {
    fn default() -> Self {
        Self::Pbkdf2 { rounds: PBKDF2_ROUNDS }
    }
}

impl KdfKind {
    /// Scrypt with the standard EIP-2335 parameters
    pub fn scrypt() -> Self {
        Self::Scrypt { log_n: SCRYPT_LOG_N, r: SCRYPT_R, p: SCRYPT_P }
    }
}

/// EIP-2335 encryptor
#[derive(Debug, Clone, Default)]
pub struct KeystoreV4Encryptor {
    kdf: KdfKind,
}

impl KeystoreV4Encryptor {
    /// Create an encryptor using PBKDF2 with the standard work factor
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an encryptor with an explicit KDF
    pub fn with_kdf(kdf: KdfKind) -> Self {
        Self { kdf }
    }

    /// Encrypt straight into the EIP-2335 crypto object
    pub fn encrypt_crypto(&self, secret: &[u8], password: &str) -> Result<KeystoreCrypto> {
        let mut salt = vec![0u8; SALT_LENGTH];
        let mut iv = vec![0u8; IV_LENGTH];
        OsRng
            .try_fill_bytes(&mut salt)
            .and_then(|_| OsRng.try_fill_bytes(&mut iv))
            .map_err(|e| Error::Keystore(format!("Could not generate randomness: {}", e)))?;

        let kdf = match self.kdf {
            KdfKind::Pbkdf2 { rounds } => Kdf::Pbkdf2(Pbkdf2Params {
                dklen: DKLEN as u32,
                c: rounds,
                prf: PBKDF2_PRF.to_string(),
                salt,
            }),
            KdfKind::Scrypt { log_n, r, p } => Kdf::Scrypt(ScryptParams {
                dklen: DKLEN as u32,
                n: 1u32
                    .checked_shl(log_n as u32)
                    .ok_or_else(|| Error::Keystore(format!("Invalid scrypt cost: 2^{}", log_n)))?,
                r,
                p,
                salt,
            }),
        };

        let dk = derive_key(&kdf, password).map_err(|_| {
            Error::Keystore("Could not derive encryption key".to_string())
        })?;

        let mut ciphertext = secret.to_vec();
        apply_keystream(&dk[..16], &iv, &mut ciphertext)?;
        let checksum = compute_checksum(&dk, &ciphertext);

        Ok(KeystoreCrypto { kdf, checksum, iv, ciphertext })
    }

    /// Decrypt an EIP-2335 crypto object
    pub fn decrypt_crypto(&self, crypto: &KeystoreCrypto, password: &str) -> Result<Zeroizing<Vec<u8>>> {
        let dk = derive_key(&crypto.kdf, password)?;

        if !constant_time_eq(&compute_checksum(&dk, &crypto.ciphertext), &crypto.checksum) {
            return Err(Error::DecryptionFailure);
        }

        let mut plaintext = Zeroizing::new(crypto.ciphertext.clone());
        apply_keystream(&dk[..16], &crypto.iv, &mut plaintext)
            .map_err(|_| Error::DecryptionFailure)?;
        Ok(plaintext)
    }
}

impl Encryptor for KeystoreV4Encryptor {
    fn name(&self) -> &str {
        KEYSTORE_NAME
    }

    fn version(&self) -> u32 {
        KEYSTORE_VERSION
    }

    fn encrypt(&self, secret: &[u8], password: &str) -> Result<EncryptedSeed> {
        Ok(EncryptedSeed::KeystoreV4(self.encrypt_crypto(secret, password)?))
    }

    fn decrypt(&self, encrypted: &EncryptedSeed, password: &str) -> Result<Zeroizing<Vec<u8>>> {
        match encrypted {
            EncryptedSeed::KeystoreV4(crypto) => self.decrypt_crypto(crypto, password),
        }
    }
}

/// Derive the 32-byte key. Unusable parameters are a `DecryptionFailure`.
fn derive_key(kdf: &Kdf, password: &str) -> Result<Zeroizing<Vec<u8>>> {
    let mut dk = Zeroizing::new(vec![0u8; DKLEN]);

    match kdf {
        Kdf::Pbkdf2(params) => {
            if params.dklen as usize != DKLEN
                || params.prf != PBKDF2_PRF
                || params.c == 0
                || params.c > MAX_PBKDF2_ROUNDS
            {
                return Err(Error::DecryptionFailure);
            }
            pbkdf2::pbkdf2::<Hmac<Sha256>>(password.as_bytes(), &params.salt, params.c, &mut dk)
                .map_err(|_| Error::DecryptionFailure)?;
        }
        Kdf::Scrypt(params) => {
            if params.dklen as usize != DKLEN || !params.n.is_power_of_two() || params.n < 2 {
                return Err(Error::DecryptionFailure);
            }
            let log_n = params.n.trailing_zeros() as u8;
            let memory = 128u64
                .saturating_mul(u64::from(params.n))
                .saturating_mul(u64::from(params.r));
            if log_n > MAX_SCRYPT_LOG_N
                || params.r == 0
                || params.r > MAX_SCRYPT_R
                || params.p == 0
                || params.p > MAX_SCRYPT_P
                || memory > MAX_SCRYPT_MEMORY
            {
                return Err(Error::DecryptionFailure);
            }
            let scrypt_params = scrypt::Params::new(log_n, params.r, params.p, DKLEN)
                .map_err(|_| Error::DecryptionFailure)?;
            scrypt::scrypt(password.as_bytes(), &params.salt, &scrypt_params, &mut dk)
                .map_err(|_| Error::DecryptionFailure)?;
        }
    }

    Ok(dk)
}

fn apply_keystream(key: &[u8], iv: &[u8], data: &mut [u8]) -> Result<()> {
    let mut cipher = Aes128Ctr::new_from_slices(key, iv)
        .map_err(|e| Error::Keystore(format!("Invalid cipher parameters: {}", e)))?;
    cipher.apply_keystream(data);
    Ok(())
}

fn compute_checksum(dk: &[u8], ciphertext: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(&dk[16..32]);
    hasher.update(ciphertext);
    hasher.finalize().to_vec()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
