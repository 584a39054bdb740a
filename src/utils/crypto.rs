use ring::digest::{Context, SHA256};
use ring::rand::{SecureRandom, SystemRandom};
use ring::signature::{EcdsaKeyPair, ECDSA_P256_SHA256_FIXED, ECDSA_P256_SHA256_FIXED_SIGNING};
use ripemd::{Digest as RipemdDigest, Ripemd160};

use crate::error::{BlockchainError, Result};

pub fn sha256_digest(data: &[u8]) -> Vec<u8> {
    let mut context = Context::new(&SHA256);
    context.update(data);
    let digest = context.finish();
    digest.as_ref().to_vec()
}

pub fn ripemd160_digest(data: &[u8]) -> Vec<u8> {
    let mut hasher = Ripemd160::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

pub fn base58_encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

pub fn base58_decode(data: &str) -> Result<Vec<u8>> {
    bs58::decode(data)
        .into_vec()
        .map_err(|e| BlockchainError::InvalidAddress(format!("Invalid base58 encoding: {e}")))
}

/// Fills a buffer of the given length from the system CSPRNG.
pub fn random_bytes(len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|e| BlockchainError::Crypto(format!("Failed to gather entropy: {e}")))?;
    Ok(buf)
}

/// Generates a fresh P-256 key pair as a PKCS#8 document.
pub fn new_key_pair() -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
        .map_err(|e| BlockchainError::Crypto(format!("Failed to generate ECDSA key pair: {e}")))?
        .as_ref()
        .to_vec();
    Ok(pkcs8)
}

/// Signs a digest with P-256/SHA-256. The FIXED scheme yields a 64-byte
/// signature: r and s, each zero-padded to 32 bytes.
pub fn ecdsa_p256_sha256_sign_digest(pkcs8: &[u8], message: &[u8]) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8, &rng)
        .map_err(|e| {
            BlockchainError::Crypto(format!("Failed to create key pair from PKCS8: {e}"))
        })?;
    let signature = key_pair
        .sign(&rng, message)
        .map_err(|e| BlockchainError::Crypto(format!("Failed to sign message: {e}")))?
        .as_ref()
        .to_vec();
    Ok(signature)
}

pub fn ecdsa_p256_sha256_sign_verify(public_key: &[u8], signature: &[u8], message: &[u8]) -> bool {
    let peer_public_key =
        ring::signature::UnparsedPublicKey::new(&ECDSA_P256_SHA256_FIXED, public_key);
    let result = peer_public_key.verify(message, signature.as_ref());
    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_digest_known_vector() {
        let digest = sha256_digest(b"abc");
        assert_eq!(
            data_encoding::HEXLOWER.encode(&digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_ripemd160_digest_length() {
        assert_eq!(ripemd160_digest(b"abc").len(), 20);
    }

    #[test]
    fn test_base58_roundtrip() {
        let data = vec![0x00, 0x01, 0x02, 0xff];
        let encoded = base58_encode(&data);
        assert_eq!(base58_decode(&encoded).unwrap(), data);
    }

    #[test]
    fn test_sign_and_verify_digest() {
        let pkcs8 = new_key_pair().unwrap();
        let rng = SystemRandom::new();
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &pkcs8, &rng).unwrap();
        let public_key = ring::signature::KeyPair::public_key(&key_pair).as_ref().to_vec();

        let message = sha256_digest(b"spend output 0");
        let signature = ecdsa_p256_sha256_sign_digest(&pkcs8, &message).unwrap();

        assert_eq!(signature.len(), 64);
        assert!(ecdsa_p256_sha256_sign_verify(&public_key, &signature, &message));
        assert!(!ecdsa_p256_sha256_sign_verify(
            &public_key,
            &signature,
            &sha256_digest(b"spend output 1")
        ));
    }

    #[test]
    fn test_random_bytes_are_distinct() {
        let a = random_bytes(20).unwrap();
        let b = random_bytes(20).unwrap();
        assert_eq!(a.len(), 20);
        assert_ne!(a, b);
    }
}
