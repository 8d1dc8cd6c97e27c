//! Credential hashing.
//!
//! Identities never store plaintext passwords. The dispatcher talks to a
//! [`CredentialHasher`] through two calls, `hash` on registration and
//! `verify` on every later login. [`Pbkdf2Hasher`] is the production
//! implementation: PBKDF2-HMAC-SHA256 with a per-identity random salt.

use std::fmt;

use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::env::Environment;

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

/// Digest length in bytes.
pub const DIGEST_LEN: usize = 32;

/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 10_000;

/// Errors raised while deriving a credential digest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// PBKDF2 needs at least one iteration.
    #[error("iteration count must be positive")]
    ZeroIterations,
}

/// Stored form of a password: salt, work factor and derived digest.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialHash {
    salt: [u8; SALT_LEN],
    iterations: u32,
    digest: [u8; DIGEST_LEN],
}

impl CredentialHash {
    /// Salt used for this digest.
    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    /// Iteration count used for this digest.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}

impl fmt::Debug for CredentialHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialHash")
            .field("iterations", &self.iterations)
            .field("digest", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Opaque hash/verify capability used by the dispatcher.
pub trait CredentialHasher: Send + 'static {
    /// Derive a storable digest from a plaintext password.
    fn hash(&self, plaintext: &[u8]) -> Result<CredentialHash, CredentialError>;

    /// Check a plaintext password against a stored digest.
    fn verify(&self, stored: &CredentialHash, plaintext: &[u8]) -> bool;
}

/// PBKDF2-HMAC-SHA256 with salts drawn from an [`Environment`].
#[derive(Debug, Clone)]
pub struct Pbkdf2Hasher<E> {
    env: E,
    iterations: u32,
}

impl<E: Environment> Pbkdf2Hasher<E> {
    /// Hasher with [`DEFAULT_ITERATIONS`].
    pub fn new(env: E) -> Self {
        Self::with_iterations(env, DEFAULT_ITERATIONS)
    }

    /// Hasher with a custom work factor (tests use small ones).
    pub fn with_iterations(env: E, iterations: u32) -> Self {
        Self { env, iterations }
    }
}

impl<E: Environment> CredentialHasher for Pbkdf2Hasher<E> {
    fn hash(&self, plaintext: &[u8]) -> Result<CredentialHash, CredentialError> {
        let mut salt = [0u8; SALT_LEN];
        self.env.random_bytes(&mut salt);
        let digest = derive_digest(plaintext, &salt, self.iterations)?;
        Ok(CredentialHash { salt, iterations: self.iterations, digest })
    }

    fn verify(&self, stored: &CredentialHash, plaintext: &[u8]) -> bool {
        match derive_digest(plaintext, &stored.salt, stored.iterations) {
            Ok(candidate) => candidate.as_slice().ct_eq(stored.digest.as_slice()).into(),
            Err(_) => false,
        }
    }
}

fn derive_digest(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
) -> Result<[u8; DIGEST_LEN], CredentialError> {
    if iterations == 0 {
        return Err(CredentialError::ZeroIterations);
    }
    let mut out = [0u8; DIGEST_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::SystemEnv;

    fn hasher() -> Pbkdf2Hasher<SystemEnv> {
        Pbkdf2Hasher::with_iterations(SystemEnv, 64)
    }

    #[test]
    fn verifies_matching_password() {
        let hasher = hasher();
        let stored = hasher.hash(b"secret1").unwrap();
        assert!(hasher.verify(&stored, b"secret1"));
        assert!(!hasher.verify(&stored, b"secret2"));
        assert!(!hasher.verify(&stored, b""));
    }

    #[test]
    fn salts_differ_between_registrations() {
        let hasher = hasher();
        let a = hasher.hash(b"secret1").unwrap();
        let b = hasher.hash(b"secret1").unwrap();
        assert_ne!(a.salt(), b.salt());
        assert_ne!(a, b);
    }

    #[test]
    fn verification_uses_stored_work_factor() {
        let stored = Pbkdf2Hasher::with_iterations(SystemEnv, 10).hash(b"secret1").unwrap();
        assert_eq!(stored.iterations(), 10);
        assert!(hasher().verify(&stored, b"secret1"));
    }

    #[test]
    fn zero_iterations_is_an_error() {
        let hasher = Pbkdf2Hasher::with_iterations(SystemEnv, 0);
        assert_eq!(hasher.hash(b"secret1"), Err(CredentialError::ZeroIterations));
    }

    #[test]
    fn pbkdf2_matches_rfc7914_vector() {
        // RFC 7914 section 11: PBKDF2-HMAC-SHA256, P="passwd", S="salt", c=1
        let out = derive_digest(b"passwd", b"salt", 1).unwrap();
        assert_eq!(out[..8], [0x55, 0xac, 0x04, 0x6e, 0x56, 0xe3, 0x08, 0x9f]);
    }

    #[test]
    fn tampered_digest_is_rejected() {
        let hasher = hasher();
        let mut stored = hasher.hash(b"secret1").unwrap();
        stored.digest[DIGEST_LEN - 1] ^= 1;
        assert!(!hasher.verify(&stored, b"secret1"));
    }

    #[test]
    fn debug_output_hides_digest() {
        let stored = hasher().hash(b"secret1").unwrap();
        assert!(format!("{stored:?}").contains("<redacted>"));
    }
}
