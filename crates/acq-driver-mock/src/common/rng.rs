//! Seeded RNG wrapper for reproducible behavior.
//!
//! Provides a thread-safe, seeded random number generator so fault
//! scenarios and synthetic images are deterministic under a fixed seed.

use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seeded RNG wrapper for reproducible random behavior
pub struct MockRng {
    inner: Mutex<ChaCha8Rng>,
}

impl MockRng {
    /// Create a new RNG with optional seed.
    /// If seed is None, uses a random seed from the OS.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            inner: Mutex::new(rng),
        }
    }

    /// Check if an operation should fail based on the given failure rate.
    ///
    /// `rate` is a probability from 0.0 (never fail) to 1.0 (always fail).
    pub fn should_fail(&self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        if rate >= 1.0 {
            return true;
        }
        self.inner.lock().gen::<f64>() < rate
    }

    /// Generate a random f64 value in the range [0.0, 1.0)
    pub fn next_f64(&self) -> f64 {
        self.inner.lock().gen()
    }

    /// Generate a random value in the given range
    pub fn gen_range<T, R>(&self, range: R) -> T
    where
        T: rand::distributions::uniform::SampleUniform,
        R: rand::distributions::uniform::SampleRange<T>,
    {
        self.inner.lock().gen_range(range)
    }
}

impl Default for MockRng {
    fn default() -> Self {
        Self::new(None)
    }
}

impl std::fmt::Debug for MockRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRng")
            .field("inner", &"<Mutex<ChaCha8Rng>>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_rng_is_deterministic() {
        let rng1 = MockRng::new(Some(42));
        let rng2 = MockRng::new(Some(42));
        assert_eq!(rng1.next_f64(), rng2.next_f64());
    }

    #[test]
    fn should_fail_never_at_zero_rate() {
        let rng = MockRng::new(Some(42));
        for _ in 0..100 {
            assert!(!rng.should_fail(0.0));
        }
    }

    #[test]
    fn should_fail_always_at_full_rate() {
        let rng = MockRng::new(Some(42));
        for _ in 0..100 {
            assert!(rng.should_fail(1.0));
        }
    }

    #[test]
    fn should_fail_tracks_probability() {
        let rng = MockRng::new(Some(42));
        let failures = (0..10_000).filter(|_| rng.should_fail(0.3)).count();
        // Expect roughly 3000 failures; allow 10% deviation.
        assert!(
            (2700..3300).contains(&failures),
            "expected ~3000 failures, got {}",
            failures
        );
    }

    #[test]
    fn gen_range_stays_in_range() {
        let rng = MockRng::new(Some(42));
        for _ in 0..100 {
            let val = rng.gen_range(10..20);
            assert!((10..20).contains(&val));
        }
    }
}
