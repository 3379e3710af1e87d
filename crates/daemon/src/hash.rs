//! Argon2id password hashing.

use argon2::{Argon2, PasswordHasher as _, PasswordVerifier};
use domain::{HashError, PasswordHasher};
use password_hash::{PasswordHash, SaltString};
use rand::rngs::OsRng;
use rand::RngCore;

/// Salt length in bytes.
const SALT_LENGTH: usize = 16;

/// [`PasswordHasher`] producing PHC-format Argon2id strings.
#[derive(Debug, Default, Clone)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    /// Creates a hasher with the default Argon2id parameters.
    pub fn new() -> Self {
        Self::default()
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, password: &[u8]) -> Result<String, HashError> {
        let mut salt_bytes = [0u8; SALT_LENGTH];
        OsRng
            .try_fill_bytes(&mut salt_bytes)
            .map_err(|e| HashError::Hashing(e.to_string()))?;
        let salt =
            SaltString::encode_b64(&salt_bytes).map_err(|e| HashError::Hashing(e.to_string()))?;

        let phc = self
            .argon2
            .hash_password(password, &salt)
            .map_err(|e| HashError::Hashing(e.to_string()))?;
        Ok(phc.to_string())
    }

    fn verify(&self, hash: &str, password: &[u8]) -> Result<bool, HashError> {
        let parsed = PasswordHash::new(hash).map_err(|e| HashError::MalformedHash(e.to_string()))?;
        match self.argon2.verify_password(password, &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(HashError::MalformedHash(e.to_string())),
        }
    }
}
