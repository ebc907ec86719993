//! Ethereum transaction and message signing with the node key

use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{Address, Signature};
use ethers_core::utils::hash_message;
use ethers_core::utils::rlp::{Decodable, Rlp};
use ethers_signers::{LocalWallet, Signer};
use secp256k1::{Message, Secp256k1};

use crate::crypto::keys::NodeKey;
use crate::error::{Error, Result};

/// Offset added to the recovery id of personal message signatures
pub const RECOVERY_ID_OFFSET: u8 = 27;

/// Decode an unsigned transaction, sign it for `chain_id` and return the signed encoding.
///
/// A transaction that already names a different chain is rejected.
pub fn sign_transaction(key: &NodeKey, tx_bytes: &[u8], chain_id: u64) -> Result<Vec<u8>> {
    let mut tx = TypedTransaction::decode(&Rlp::new(tx_bytes))
        .map_err(|e| Error::Signing(format!("Could not decode transaction: {}", e)))?;

    if let Some(tx_chain_id) = tx.chain_id() {
        if tx_chain_id.as_u64() != chain_id {
            return Err(Error::Signing(format!(
                "Transaction is for chain {} but the wallet signs for chain {}",
                tx_chain_id, chain_id
            )));
        }
    }
    tx.set_chain_id(chain_id);

    let wallet = LocalWallet::from_bytes(&key.secret_bytes()[..])
        .map_err(|e| Error::Signing(format!("Invalid node key: {}", e)))?
        .with_chain_id(chain_id);
    let signature = wallet
        .sign_transaction_sync(&tx)
        .map_err(|e| Error::Signing(format!("Could not sign transaction: {}", e)))?;

    Ok(tx.rlp_signed(&signature).to_vec())
}

/// Decode a signed transaction and recover its sender
pub fn recover_transaction_signer(signed_bytes: &[u8]) -> Result<(TypedTransaction, Address)> {
    let (tx, signature) = TypedTransaction::decode_signed(&Rlp::new(signed_bytes))
        .map_err(|e| Error::Signing(format!("Could not decode signed transaction: {}", e)))?;
    let signer = signature
        .recover(tx.sighash())
        .map_err(|e| Error::Signing(format!("Could not recover signer: {}", e)))?;
    Ok((tx, signer))
}

/// Sign a message under the personal message convention.
///
/// Returns `r || s || v` with `v` in {27, 28}.
pub fn sign_message(key: &NodeKey, message: &[u8]) -> Result<[u8; 65]> {
    let hash = hash_message(message);
    let digest = Message::from_digest_slice(hash.as_bytes())
        .map_err(|e| Error::Signing(format!("Invalid message hash: {}", e)))?;

    let (recovery_id, compact) = Secp256k1::signing_only()
        .sign_ecdsa_recoverable(&digest, key.secret_key())
        .serialize_compact();

    let mut signature = [0u8; 65];
    signature[..64].copy_from_slice(&compact);
    signature[64] = recovery_id.to_i32() as u8 + RECOVERY_ID_OFFSET;
    Ok(signature)
}

/// Recover the address that produced a personal message signature
pub fn recover_message_signer(message: &[u8], signature: &[u8]) -> Result<Address> {
    let signature = Signature::try_from(signature)
        .map_err(|e| Error::Signing(format!("Invalid signature: {}", e)))?;
    signature
        .recover(message)
        .map_err(|e| Error::Signing(format!("Could not recover signer: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers_core::types::{Eip1559TransactionRequest, TransactionRequest};

    fn node_key() -> NodeKey {
        NodeKey::from_bytes(
            &hex::decode("1ab42cc412b618bdea3a599e3c9bae199ebf030895b039e9db1e30dafb12b727").unwrap(),
        )
        .unwrap()
    }

    fn eip1559_tx(chain_id: u64) -> Vec<u8> {
        let tx = Eip1559TransactionRequest::new()
            .to(Address::repeat_byte(0x11))
            .value(1_000_000_000u64)
            .nonce(3u64)
            .gas(21_000u64)
            .max_fee_per_gas(30_000_000_000u64)
            .max_priority_fee_per_gas(1_000_000_000u64)
            .chain_id(chain_id);
        TypedTransaction::Eip1559(tx).rlp().to_vec()
    }

    #[test]
    fn test_signed_transaction_recovers_to_node() {
        let key = node_key();
        let signed = sign_transaction(&key, &eip1559_tx(1), 1).unwrap();

        let (tx, signer) = recover_transaction_signer(&signed).unwrap();
        assert_eq!(signer, key.address());
        assert_eq!(tx.chain_id().map(|id| id.as_u64()), Some(1));
    }

    #[test]
    fn test_signature_bound_to_chain() {
        let key = node_key();
        let signed = sign_transaction(&key, &eip1559_tx(1), 1).unwrap();

        let (mut tx, signature) = TypedTransaction::decode_signed(&Rlp::new(&signed)).unwrap();
        tx.set_chain_id(5u64);
        let signer = signature.recover(tx.sighash()).unwrap();
        assert_ne!(signer, key.address());
    }

    #[test]
    fn test_chain_mismatch_rejected() {
        let result = sign_transaction(&node_key(), &eip1559_tx(1), 5);
        assert!(matches!(result, Err(Error::Signing(_))));
    }

    #[test]
    fn test_legacy_transaction() {
        let key = node_key();
        let tx = TransactionRequest::new()
            .to(Address::repeat_byte(0x22))
            .value(5u64)
            .nonce(0u64)
            .gas(21_000u64)
            .gas_price(1_000_000_000u64)
            .data(Vec::<u8>::new())
            .chain_id(17000u64);
        let bytes = TypedTransaction::Legacy(tx).rlp().to_vec();

        let signed = sign_transaction(&key, &bytes, 17000).unwrap();
        let (_, signer) = recover_transaction_signer(&signed).unwrap();
        assert_eq!(signer, key.address());
    }

    #[test]
    fn test_garbage_transaction() {
        let result = sign_transaction(&node_key(), &[0xde, 0xad], 1);
        assert!(matches!(result, Err(Error::Signing(_))));
    }

    #[test]
    fn test_sign_message() {
        let key = node_key();
        let signature = sign_message(&key, b"hello smartnode").unwrap();

        assert!(signature[64] == 27 || signature[64] == 28);
        assert_eq!(recover_message_signer(b"hello smartnode", &signature).unwrap(), key.address());
        assert_ne!(recover_message_signer(b"other message", &signature).unwrap(), key.address());
    }

    #[test]
    fn test_sign_message_matches_ethers() {
        let key = node_key();
        let wallet = LocalWallet::from_bytes(&key.secret_bytes()[..]).unwrap();
        let expected = wallet.sign_hash(hash_message(b"payload")).unwrap();

        let signature = sign_message(&key, b"payload").unwrap();
        assert_eq!(signature.to_vec(), expected.to_vec());
    }
}
