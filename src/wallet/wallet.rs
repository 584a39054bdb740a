use crate::error::{BlockchainError, Result};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use serde::{Deserialize, Serialize};

const VERSION: u8 = 0x00;
pub const ADDRESS_CHECK_SUM_LEN: usize = 4;

/// A P-256 key pair. The private key is kept as a PKCS#8 document, the
/// public key in ring's uncompressed point encoding.
#[derive(Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Wallet {
    pkcs8: Vec<u8>,
    public_key: Vec<u8>,
}

impl Wallet {
    pub fn new() -> Result<Wallet> {
        let pkcs8 = crate::utils::new_key_pair()?;
        let rng = SystemRandom::new();
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng)
                .map_err(|e| {
                    BlockchainError::Crypto(format!("Failed to create key pair from PKCS8: {e}"))
                })?;
        let public_key = key_pair.public_key().as_ref().to_vec();
        Ok(Wallet { pkcs8, public_key })
    }

    /// Base58(version ‖ RIPEMD160(SHA256(pubkey)) ‖ checksum).
    pub fn get_address(&self) -> String {
        let pub_key_hash = hash_pub_key(self.public_key.as_slice());
        let mut payload: Vec<u8> = vec![];
        payload.push(VERSION);
        payload.extend(pub_key_hash.as_slice());
        let checksum = checksum(payload.as_slice());
        payload.extend(checksum.as_slice());
        crate::utils::base58_encode(payload.as_slice())
    }

    pub fn get_public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }

    pub fn get_pkcs8(&self) -> &[u8] {
        self.pkcs8.as_slice()
    }
}

pub fn hash_pub_key(pub_key: &[u8]) -> Vec<u8> {
    let pub_key_sha256 = crate::utils::sha256_digest(pub_key);
    crate::utils::ripemd160_digest(pub_key_sha256.as_slice())
}

fn checksum(payload: &[u8]) -> Vec<u8> {
    let first_sha = crate::utils::sha256_digest(payload);
    let second_sha = crate::utils::sha256_digest(first_sha.as_slice());
    second_sha[0..ADDRESS_CHECK_SUM_LEN].to_vec()
}

/// Checks Base58 shape, version prefix and checksum.
pub fn validate_address(address: &str) -> bool {
    let payload = match crate::utils::base58_decode(address) {
        Ok(payload) => payload,
        Err(_) => return false,
    };

    if payload.len() < ADDRESS_CHECK_SUM_LEN + 1 {
        return false;
    }

    let actual_checksum = payload[payload.len() - ADDRESS_CHECK_SUM_LEN..].to_vec();
    let version = payload[0];
    let pub_key_hash = payload[1..payload.len() - ADDRESS_CHECK_SUM_LEN].to_vec();

    let mut target_vec = vec![version];
    target_vec.extend(pub_key_hash);
    let target_checksum = checksum(target_vec.as_slice());
    actual_checksum.eq(&target_checksum)
}

/// Rebuilds the printable address for a raw public-key hash.
pub fn convert_address(pub_key_hash: &[u8]) -> String {
    let mut payload: Vec<u8> = vec![];
    payload.push(VERSION);
    payload.extend(pub_key_hash);
    let checksum = checksum(payload.as_slice());
    payload.extend(checksum.as_slice());
    crate::utils::base58_encode(payload.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_is_valid() {
        let wallet = Wallet::new().unwrap();
        let address = wallet.get_address();
        assert!(validate_address(&address));
    }

    #[test]
    fn test_known_address_validates() {
        // The genesis coinbase address of Bitcoin, version 0x00.
        assert!(validate_address("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"));
    }

    #[test]
    fn test_corrupted_address_is_rejected() {
        let wallet = Wallet::new().unwrap();
        let mut address = wallet.get_address();
        let last = address.pop().unwrap();
        address.push(if last == '2' { '3' } else { '2' });
        assert!(!validate_address(&address));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(!validate_address(""));
        assert!(!validate_address("0OIl"));
        assert!(!validate_address("zz"));
    }

    #[test]
    fn test_convert_address_roundtrip() {
        let wallet = Wallet::new().unwrap();
        let pub_key_hash = hash_pub_key(wallet.get_public_key());
        assert_eq!(convert_address(&pub_key_hash), wallet.get_address());
    }

    #[test]
    fn test_pub_key_hash_width() {
        let wallet = Wallet::new().unwrap();
        assert_eq!(hash_pub_key(wallet.get_public_key()).len(), 20);
    }
}
