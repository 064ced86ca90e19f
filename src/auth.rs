use hmac::{digest::InvalidLength, Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::schemas::new_id;

type HmacSha256 = Hmac<Sha256>;

/// Hashes passwords as `salt$hex(hmac)`, the HMAC being keyed with the
/// SHA-256 of the server secret.
#[derive(Clone)]
pub struct PasswordHasher {
    mac: HmacSha256,
}

impl PasswordHasher {
    pub fn new(secret: &str) -> Result<Self, InvalidLength> {
        let mut sha256_hasher = Sha256::new();
        sha256_hasher.update(secret.as_bytes());
        let secret_hash = sha256_hasher.finalize();

        let mac = HmacSha256::new_from_slice(&secret_hash)?;
        Ok(Self { mac })
    }

    pub fn hash(&self, password: &str) -> String {
        let salt = new_id();
        let digest = self.digest(&salt, password).finalize().into_bytes();
        format!("{}${}", salt, hex::encode(digest))
    }

    #[cfg(test)]
    fn verify(&self, password: &str, stored: &str) -> bool {
        let Some((salt, expected)) = stored.split_once('$') else {
            return false;
        };
        let Ok(expected) = hex::decode(expected) else {
            return false;
        };
        self.digest(salt, password).verify_slice(&expected).is_ok()
    }

    fn digest(&self, salt: &str, password: &str) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(salt.as_bytes());
        mac.update(b"\n");
        mac.update(password.as_bytes());
        mac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_password_verifies() {
        let hasher = PasswordHasher::new("server-secret").unwrap();
        let stored = hasher.hash("hunter22");
        assert!(hasher.verify("hunter22", &stored));
        assert!(!hasher.verify("hunter23", &stored));
    }

    #[test]
    fn same_password_gets_a_fresh_salt() {
        let hasher = PasswordHasher::new("server-secret").unwrap();
        assert_ne!(hasher.hash("hunter22"), hasher.hash("hunter22"));
    }

    #[test]
    fn other_secret_does_not_verify() {
        let stored = PasswordHasher::new("one").unwrap().hash("hunter22");
        let other = PasswordHasher::new("two").unwrap();
        assert!(!other.verify("hunter22", &stored));
    }

    #[test]
    fn malformed_hash_is_rejected() {
        let hasher = PasswordHasher::new("server-secret").unwrap();
        assert!(!hasher.verify("hunter22", "no-separator"));
        assert!(!hasher.verify("hunter22", "salt$not-hex"));
    }
}
