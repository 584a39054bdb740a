mod crypto;
mod serialization;

pub use crypto::{
    base58_decode, base58_encode, ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify,
    new_key_pair, random_bytes, ripemd160_digest, sha256_digest,
};
pub use serialization::{deserialize, serialize};

use crate::error::{BlockchainError, Result};
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the unix epoch.
pub fn current_timestamp() -> Result<i64> {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| BlockchainError::Crypto(format!("System time error: {e}")))?
        .as_secs();

    if secs > i64::MAX as u64 {
        return Err(BlockchainError::Crypto("Timestamp overflow".to_string()));
    }

    Ok(secs as i64)
}
