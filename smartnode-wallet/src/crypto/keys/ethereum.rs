//! BIP-32 derivation of the secp256k1 node key

use std::fmt;

use ethers_core::types::Address;
use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey};
use sha2::Sha512;
use sha3::{Digest, Keccak256};
use tracing::warn;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::derivation::{NodeKeyPath, HARDENED_OFFSET};
use crate::error::{Error, Result};

/// Smallest seed accepted by BIP-32
const MIN_SEED_LEN: usize = 16;
/// Largest seed accepted by BIP-32
const MAX_SEED_LEN: usize = 64;

/// A BIP-32 extended private key
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ExtendedKey {
    key: [u8; 32],
    chain_code: [u8; 32],
}

impl ExtendedKey {
    /// Derive the master key from a seed
    pub fn master(seed: &[u8]) -> Result<Self> {
        if seed.len() < MIN_SEED_LEN || seed.len() > MAX_SEED_LEN {
            return Err(Error::KeyDerivation(format!(
                "Invalid seed length: {} bytes",
                seed.len()
            )));
        }

        let (key, chain_code) = hmac_sha512(b"Bitcoin seed", &[seed])?;

        // A master key outside the curve order makes the seed unusable
        SecretKey::from_slice(&key[..])
            .map_err(|e| Error::KeyDerivation(format!("Invalid master key: {}", e)))?;

        Ok(Self { key: *key, chain_code: *chain_code })
    }

    /// Derive a child key. Indices at or above 2^31 are hardened.
    pub fn derive_child(&self, index: u32) -> Result<Self> {
        let secp = Secp256k1::signing_only();
        let parent = SecretKey::from_slice(&self.key)
            .map_err(|e| Error::KeyDerivation(format!("Invalid parent key: {}", e)))?;

        let index_bytes = index.to_be_bytes();
        let (tweak, chain_code) = if index >= HARDENED_OFFSET {
            hmac_sha512(&self.chain_code, &[&[0u8][..], &self.key[..], &index_bytes[..]])?
        } else {
            let parent_public = PublicKey::from_secret_key(&secp, &parent);
            hmac_sha512(&self.chain_code, &[&parent_public.serialize()[..], &index_bytes[..]])?
        };

        // IL >= n or a zero child key both invalidate this index
        let child = SecretKey::from_slice(&tweak[..])
            .map_err(|_| Error::InvalidChild)?
            .add_tweak(&Scalar::from(parent))
            .map_err(|_| Error::InvalidChild)?;

        Ok(Self { key: child.secret_bytes(), chain_code: *chain_code })
    }

    /// Derive along a full path of components
    pub fn derive_path(&self, components: &[u32]) -> Result<Self> {
        let mut key = self.clone();
        for component in components {
            key = key.derive_child(*component)?;
        }
        Ok(key)
    }

    /// Get the private key of this extended key
    pub fn to_node_key(&self) -> Result<NodeKey> {
        let secret = SecretKey::from_slice(&self.key)
            .map_err(|e| Error::KeyDerivation(format!("Invalid secret key: {}", e)))?;
        Ok(NodeKey { secret })
    }
}

impl fmt::Debug for ExtendedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExtendedKey([REDACTED])")
    }
}

/// The node's secp256k1 signing key
#[derive(Clone, PartialEq, Eq)]
pub struct NodeKey {
    secret: SecretKey,
}

impl NodeKey {
    /// Wrap raw private key bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| Error::KeyDerivation(format!("Invalid secret key: {}", e)))?;
        Ok(Self { secret })
    }

    /// The underlying secp256k1 secret key
    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    /// Raw private key bytes
    pub fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.secret.secret_bytes())
    }

    /// The uncompressed public key
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_secret_key(&Secp256k1::signing_only(), &self.secret)
    }

    /// The Ethereum address of this key
    pub fn address(&self) -> Address {
        public_key_to_address(&self.public_key())
    }
}

impl fmt::Debug for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeKey")
            .field("address", &self.address())
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Derive the node key at `index` of a path template.
///
/// Returns the key and the rendered path it was derived at. An index yielding
/// an invalid child is skipped in favour of the next one.
pub fn derive_node_key(
    master: &ExtendedKey,
    path: &NodeKeyPath,
    index: u32,
) -> Result<(NodeKey, String)> {
    let mut index = index;
    loop {
        let rendered = path.render(index);
        let components = path.components(index)?;

        match master.derive_path(&components) {
            Ok(key) => return Ok((key.to_node_key()?, rendered)),
            Err(Error::InvalidChild) => {
                warn!("Invalid child key at {}, trying next index", rendered);
                index = index.checked_add(1).ok_or_else(|| {
                    Error::KeyDerivation("Ran out of node key indices".to_string())
                })?;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Get the Ethereum address from a public key
pub fn public_key_to_address(public_key: &PublicKey) -> Address {
    // Skip the 0x04 prefix of the uncompressed encoding
    let hash = keccak256(&public_key.serialize_uncompressed()[1..]);
    Address::from_slice(&hash[12..])
}

/// Calculate the Keccak-256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

type SplitHash = (Zeroizing<[u8; 32]>, Zeroizing<[u8; 32]>);

fn hmac_sha512(key: &[u8], parts: &[&[u8]]) -> Result<SplitHash> {
    let mut hmac = <Hmac<Sha512> as KeyInit>::new_from_slice(key)
        .map_err(|_| Error::KeyDerivation("HMAC error".to_string()))?;
    for part in parts {
        hmac.update(part);
    }
    let result = hmac.finalize().into_bytes();

    let mut left = Zeroizing::new([0u8; 32]);
    let mut right = Zeroizing::new([0u8; 32]);
    left.copy_from_slice(&result[0..32]);
    right.copy_from_slice(&result[32..64]);

    Ok((left, right))
}
