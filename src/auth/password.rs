//! Salted password hashes in `salt$hash` form.
//!
//! `salt` is 16 random bytes, hex-encoded. `hash` is
//! `SHA-256(password || salt)` over the raw salt bytes, hex-encoded.

use constant_time_eq::constant_time_eq;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

pub const SALT_LEN: usize = 16;
const SALT_HEX_LEN: usize = SALT_LEN * 2;
const HASH_HEX_LEN: usize = 64;

/// Hashes `password` with a fresh salt from the OS random source.
pub fn hash_password(password: &str) -> Result<String> {
    if password.is_empty() {
        return Err(Error::InvalidArgument("password must not be empty".to_string()));
    }

    let mut salt = [0u8; SALT_LEN];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|_| Error::Internal("random source unavailable".to_string()))?;
    Ok(hash_with_salt(password, &salt))
}

/// Hashes with a caller-chosen salt. Deterministic; used by tooling and tests.
pub fn hash_with_salt(password: &str, salt: &[u8; SALT_LEN]) -> String {
    format!("{}${}", hex::encode(salt), digest_hex(password, salt))
}

/// Checks `password` against a stored `salt$hash`.
///
/// A stored value that cannot be decoded is a parse failure; a well-formed
/// value that does not match is `AuthenticationFailed`.
pub fn verify_password(password: &str, stored: &str) -> Result<()> {
    let (salt_hex, hash_hex) = stored
        .split_once('$')
        .ok_or_else(|| Error::ParseFailure("stored hash has no salt separator".to_string()))?;

    if salt_hex.len() != SALT_HEX_LEN {
        return Err(Error::ParseFailure("stored salt has the wrong length".to_string()));
    }
    if hash_hex.len() != HASH_HEX_LEN {
        return Err(Error::ParseFailure("stored hash has the wrong length".to_string()));
    }

    let salt = hex::decode(salt_hex)
        .map_err(|_| Error::ParseFailure("stored salt is not hex".to_string()))?;

    let computed = digest_hex(password, &salt);
    if constant_time_eq(computed.as_bytes(), hash_hex.to_ascii_lowercase().as_bytes()) {
        Ok(())
    } else {
        Err(Error::AuthenticationFailed)
    }
}

fn digest_hex(password: &str, salt: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt);
    hex::encode(hasher.finalize())
}
