//! Injectable randomness for fault draws and event identifiers.
//!
//! Production uses `rand`'s thread-local generator (a CSPRNG reseeded from
//! the OS). `--fault-seed` or a test can swap in a seeded `StdRng` so a run
//! is reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// Number of random bytes behind every generated source id.
pub const SOURCE_ID_BYTES: usize = 16;

pub trait RandomSource: Send + Sync {
    /// Uniform draw in `[0, 100)`.
    fn percent(&self) -> f64;

    fn fill_bytes(&self, buf: &mut [u8]);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn percent(&self) -> f64 {
        rand::rng().random_range(0.0..100.0)
    }

    fn fill_bytes(&self, buf: &mut [u8]) {
        rand::rng().fill(buf);
    }
}

/// Deterministic source, same seed gives the same sequence.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        // a poisoned lock still holds a usable generator
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut rng)
    }
}

impl RandomSource for SeededRandom {
    fn percent(&self) -> f64 {
        self.with_rng(|rng| rng.random_range(0.0..100.0))
    }

    fn fill_bytes(&self, buf: &mut [u8]) {
        self.with_rng(|rng| rng.fill(buf));
    }
}

/// Fixed-length, hex-encoded identifier drawn from `source`.
pub fn source_id(source: &dyn RandomSource) -> String {
    let mut bytes = [0u8; SOURCE_ID_BYTES];
    source.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_id_is_fixed_length_hex() {
        let id = source_id(&ThreadRandom);
        assert_eq!(id.len(), SOURCE_ID_BYTES * 2);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn source_ids_differ_between_calls() {
        let a = source_id(&ThreadRandom);
        let b = source_id(&ThreadRandom);
        assert_ne!(a, b);
    }

    #[test]
    fn seeded_source_is_reproducible() {
        let a = SeededRandom::new(7);
        let b = SeededRandom::new(7);
        assert_eq!(source_id(&a), source_id(&b));
        assert_eq!(a.percent(), b.percent());
    }

    #[test]
    fn percent_stays_in_range() {
        let src = SeededRandom::new(42);
        for _ in 0..1_000 {
            let p = src.percent();
            assert!((0.0..100.0).contains(&p));
        }
    }
}
