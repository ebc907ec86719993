//! EIP-2333 derivation of BLS12-381 validator keys along EIP-2334 paths

use std::fmt;

use blst::min_pk::{PublicKey, SecretKey, Signature};
use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::derivation::parse_derivation_path;
use crate::error::{Error, Result};

/// EIP-2334 validator signing key path
pub const VALIDATOR_KEY_PATH: &str = "m/12381/3600/%d/0/0";

/// Domain separation tag of the Ethereum consensus BLS signature scheme
pub const ETH2_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

/// Length of a compressed BLS public key
pub const PUBLIC_KEY_LEN: usize = 48;

/// Chunks in one half of a lamport secret key
const LAMPORT_CHUNKS: usize = 255;
const LAMPORT_CHUNK_LEN: usize = 32;

/// A validator's BLS signing key and the path it was derived at
#[derive(Clone)]
pub struct ValidatorKey {
    secret: SecretKey,
    path: String,
}

impl ValidatorKey {
    /// Wrap a 32-byte big-endian secret scalar
    pub fn from_bytes(bytes: &[u8], path: impl Into<String>) -> Result<Self> {
        let secret = SecretKey::from_bytes(bytes)
            .map_err(|e| Error::KeyDerivation(format!("Invalid BLS secret key: {:?}", e)))?;
        Ok(Self { secret, path: path.into() })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The underlying blst secret key
    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    /// Big-endian secret scalar
    pub fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    pub fn public_key(&self) -> PublicKey {
        self.secret.sk_to_pk()
    }

    /// Compressed public key
    pub fn pubkey_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.public_key().compress()
    }

    /// Compressed public key as lowercase hex, without prefix
    pub fn pubkey_hex(&self) -> String {
        hex::encode(self.pubkey_bytes())
    }

    /// Sign a message under the consensus domain separation tag
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.secret.sign(message, ETH2_DST, &[])
    }
}

impl PartialEq for ValidatorKey {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && *self.secret_bytes() == *other.secret_bytes()
    }
}

impl Eq for ValidatorKey {}

impl fmt::Debug for ValidatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorKey")
            .field("path", &self.path)
            .field("pubkey", &self.pubkey_hex())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Parse a compressed public key given as hex, with or without `0x`
pub fn parse_pubkey(pubkey: &str) -> Result<[u8; PUBLIC_KEY_LEN]> {
    let bytes = hex::decode(pubkey.trim_start_matches("0x"))
        .map_err(|e| Error::KeyDerivation(format!("Invalid validator pubkey {}: {}", pubkey, e)))?;
    bytes
        .try_into()
        .map_err(|_| Error::KeyDerivation(format!("Invalid validator pubkey length: {}", pubkey)))
}

/// Derive the validator signing key for `index`
pub fn derive_validator_key(seed: &[u8], index: u32) -> Result<ValidatorKey> {
    let path = VALIDATOR_KEY_PATH.replacen("%d", &index.to_string(), 1);
    derive_key_at_path(seed, &path)
}

/// Derive a BLS key along any EIP-2334 path
pub fn derive_key_at_path(seed: &[u8], path: &str) -> Result<ValidatorKey> {
    let components = parse_derivation_path(path)?;

    let mut secret = derive_master_sk(seed)?;
    for index in components {
        secret = derive_child_sk(&secret, index)?;
    }

    Ok(ValidatorKey { secret, path: path.to_string() })
}

/// EIP-2333 `derive_master_SK`
pub fn derive_master_sk(seed: &[u8]) -> Result<SecretKey> {
    if seed.len() < 32 {
        return Err(Error::KeyDerivation(format!(
            "Seed too short for BLS derivation: {} bytes",
            seed.len()
        )));
    }
    hkdf_mod_r(seed)
}

/// EIP-2333 `derive_child_SK`
pub fn derive_child_sk(parent: &SecretKey, index: u32) -> Result<SecretKey> {
    let lamport_pk = parent_sk_to_lamport_pk(parent, index)?;
    hkdf_mod_r(&lamport_pk)
}

// blst's key generation is the HKDF_mod_r of EIP-2333 with an empty key_info
fn hkdf_mod_r(ikm: &[u8]) -> Result<SecretKey> {
    SecretKey::key_gen(ikm, &[])
        .map_err(|e| Error::KeyDerivation(format!("BLS key generation failed: {:?}", e)))
}

fn parent_sk_to_lamport_pk(parent: &SecretKey, index: u32) -> Result<[u8; 32]> {
    let salt = index.to_be_bytes();
    let ikm = Zeroizing::new(parent.to_bytes());
    let mut not_ikm = Zeroizing::new(*ikm);
    not_ikm.iter_mut().for_each(|b| *b = !*b);

    let lamport_0 = ikm_to_lamport_sk(&ikm[..], &salt)?;
    let lamport_1 = ikm_to_lamport_sk(&not_ikm[..], &salt)?;

    let mut lamport_pk = Sha256::new();
    for chunk in lamport_0
        .chunks(LAMPORT_CHUNK_LEN)
        .chain(lamport_1.chunks(LAMPORT_CHUNK_LEN))
    {
        lamport_pk.update(Sha256::digest(chunk));
    }

    Ok(lamport_pk.finalize().into())
}

fn ikm_to_lamport_sk(ikm: &[u8], salt: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    let mut okm = Zeroizing::new(vec![0u8; LAMPORT_CHUNKS * LAMPORT_CHUNK_LEN]);
    Hkdf::<Sha256>::new(Some(salt), ikm)
        .expand(&[], &mut okm)
        .map_err(|e| Error::KeyDerivation(format!("Lamport key expansion failed: {}", e)))?;
    Ok(okm)
}
