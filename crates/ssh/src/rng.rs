//! Session random source.
//!
//! One generator is created per client and shared by reference with every
//! session it opens. Padding, cookies and ephemeral key material all draw
//! from it.

use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// Shared cryptographically secure random source.
#[derive(Clone)]
pub struct SecureRandom {
    inner: Arc<Mutex<StdRng>>,
}

impl SecureRandom {
    /// Creates a generator seeded from the operating system.
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Wraps an existing generator. Tests use this for reproducible runs.
    pub fn from_rng(rng: StdRng) -> Self {
        Self {
            inner: Arc::new(Mutex::new(rng)),
        }
    }

    /// Fills `buf` with random bytes.
    pub fn fill(&self, buf: &mut [u8]) {
        self.with(|rng| rng.fill_bytes(buf));
    }

    /// Runs `f` with exclusive access to the generator.
    ///
    /// The lock is never held across an await point.
    pub fn with<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

impl Default for SecureRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SecureRandom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureRandom").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let a = SecureRandom::from_rng(StdRng::seed_from_u64(7));
        let b = SecureRandom::from_rng(StdRng::seed_from_u64(7));
        let mut x = [0u8; 16];
        let mut y = [0u8; 16];
        a.fill(&mut x);
        b.fill(&mut y);
        assert_eq!(x, y);
    }

    #[test]
    fn test_clones_share_state() {
        let a = SecureRandom::from_rng(StdRng::seed_from_u64(1));
        let b = a.clone();
        let mut x = [0u8; 8];
        let mut y = [0u8; 8];
        a.fill(&mut x);
        b.fill(&mut y);
        assert_ne!(x, y);
    }
}
