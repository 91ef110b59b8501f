//! PIN hashing with Argon2id.
//!
//! The PIN is stored only as a PHC string; verification re-derives from the
//! parameters embedded in the hash. Parameters follow the usual interactive
//! login recommendation (64 MiB memory, 3 iterations, 4 lanes).

use crate::error::{Error, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};
use rand::{rngs::OsRng, RngCore};

/// Salt length (bytes)
pub const SALT_LEN: usize = 16;

const ARGON2_MEMORY_KIB: u32 = 64 * 1024; // 64 MiB
const ARGON2_ITERATIONS: u32 = 3;
const ARGON2_PARALLELISM: u32 = 4;

fn hasher() -> Result<Argon2<'static>> {
    let params = Params::new(ARGON2_MEMORY_KIB, ARGON2_ITERATIONS, ARGON2_PARALLELISM, None)
        .map_err(|e| Error::Crypto(format!("invalid Argon2 parameters: {}", e)))?;
    Ok(Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        params,
    ))
}

/// Hash a PIN into a PHC string with a fresh random salt.
pub fn hash_pin(pin: &str) -> Result<String> {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let salt_string = SaltString::encode_b64(&salt)
        .map_err(|e| Error::Crypto(format!("cannot encode salt: {}", e)))?;

    let hash = hasher()?
        .hash_password(pin.as_bytes(), &salt_string)
        .map_err(|e| Error::Crypto(format!("cannot hash PIN: {}", e)))?;

    Ok(hash.to_string())
}

/// Verify a PIN against a stored PHC string. A malformed stored hash counts
/// as a mismatch rather than a panic.
pub fn verify_pin(pin: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(pin.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() -> Result<()> {
        let hash = hash_pin("1234")?;
        assert!(verify_pin("1234", &hash));
        assert!(!verify_pin("4321", &hash));
        Ok(())
    }

    #[test]
    fn test_hashes_are_salted() -> Result<()> {
        let h1 = hash_pin("1234")?;
        let h2 = hash_pin("1234")?;
        assert_ne!(h1, h2);
        Ok(())
    }

    #[test]
    fn test_malformed_hash_is_mismatch() {
        assert!(!verify_pin("1234", "not a phc string"));
    }
}
