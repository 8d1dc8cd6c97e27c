//! Environment abstraction.
//!
//! The dispatcher never reaches for ambient randomness. Credential salts and
//! quip selection draw from an [`Environment`], so production uses the OS
//! seeded RNG while tests and simulations plug in a seeded one and replay
//! identically.

use rand::RngCore;

/// Source of randomness for the core state machines.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Fill `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Uniform-ish index in `0..len`. Returns 0 when `len` is 0.
    fn random_index(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        (u64::from_le_bytes(bytes) % len as u64) as usize
    }
}

/// Production environment backed by the thread-local OS-seeded RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    fn random_bytes(&self, buffer: &mut [u8]) {
        rand::thread_rng().fill_bytes(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_index_stays_in_range() {
        let env = SystemEnv;
        for len in 1..50 {
            assert!(env.random_index(len) < len);
        }
        assert_eq!(env.random_index(0), 0);
    }

    #[test]
    fn random_bytes_fill_the_buffer() {
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        SystemEnv.random_bytes(&mut a);
        SystemEnv.random_bytes(&mut b);
        assert_ne!(a, b);
    }
}
