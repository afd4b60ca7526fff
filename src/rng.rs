//! Injectable randomness for the reservoir sampler (spec §9).
//!
//! The sampler's admission decisions must be reproducible under test, so the
//! generator is exposed as a capability (`SamplingRng`) rather than called
//! via a free function, the same way the teacher exposes scheduling state
//! through `Arc`-shared structs instead of global statics.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A source of randomness for the reservoir sampler.
pub trait SamplingRng: Send {
    /// A uniform `f64` in `[0, 1)`, used against `sampling_prob` (spec §4.4).
    fn next_f64(&mut self) -> f64;
    /// A uniform index in `0..bound`, used to pick a reservoir slot to
    /// evict (spec §4.4 step 6, full `0..len()` range per the Open Question
    /// resolution in DESIGN.md).
    fn next_index(&mut self, bound: usize) -> usize;
}

/// The default generator: `rand`'s `StdRng`, seeded from the OS entropy
/// source at construction.
pub struct StdSamplingRng(StdRng);

impl StdSamplingRng {
    pub fn from_entropy() -> Self {
        Self(StdRng::from_entropy())
    }

    pub fn from_seed(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl SamplingRng for StdSamplingRng {
    fn next_f64(&mut self) -> f64 {
        self.0.gen::<f64>()
    }

    fn next_index(&mut self, bound: usize) -> usize {
        self.0.gen_range(0..bound)
    }
}

/// A shared, lock-protected handle to a [`SamplingRng`], cloned into each
/// [`crate::tile::AlignmentTile`] that needs to make an admission decision.
pub type SharedRng = Arc<Mutex<dyn SamplingRng>>;

/// Wrap a generator as a [`SharedRng`].
pub fn shared(rng: impl SamplingRng + 'static) -> SharedRng {
    Arc::new(Mutex::new(rng))
}

/// A default, entropy-seeded [`SharedRng`], for callers that don't need to
/// inject a deterministic one.
pub fn default_shared_rng() -> SharedRng {
    shared(StdSamplingRng::from_entropy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FixedRng;

    #[test]
    fn seeded_rng_is_deterministic() {
        let mut a = StdSamplingRng::from_seed(42);
        let mut b = StdSamplingRng::from_seed(42);
        for _ in 0..8 {
            assert_eq!(a.next_f64(), b.next_f64());
        }
    }

    #[test]
    fn fixed_rng_cycles() {
        let mut rng = FixedRng::new(vec![0.1, 0.9]);
        assert_eq!(rng.next_f64(), 0.1);
        assert_eq!(rng.next_f64(), 0.9);
        assert_eq!(rng.next_f64(), 0.1);
        assert_eq!(rng.next_index(10), 0);
    }

    #[test]
    fn shared_rng_is_usable_through_mutex() {
        let shared = shared(StdSamplingRng::from_seed(7));
        let mut guard = shared.lock();
        let _ = guard.next_f64();
    }
}
