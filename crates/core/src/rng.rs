//! Random source used by every stochastic branch of the engine.
//!
//! All draws go through [`RandomSource`] so tests can pin behaviour with a
//! fixed seed instead of relying on thread-local randomness.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Minimal set of draws the engine needs.
pub trait RandomSource: Send {
    /// Uniform float in `[0, 1)`.
    fn unit(&mut self) -> f64;

    /// Uniform index in `[0, bound)`. `bound` must be non-zero.
    fn index(&mut self, bound: usize) -> usize;

    /// Uniform integer in `[low, high]`. Returns `low` if the range is inverted.
    fn between(&mut self, low: u32, high: u32) -> u32;

    /// Bernoulli trial. `p <= 0` never fires and `p >= 1` always fires.
    fn chance(&mut self, p: f64) -> bool {
        if p <= 0.0 {
            return false;
        }
        if p >= 1.0 {
            return true;
        }
        self.unit() < p
    }
}

/// Pick one element uniformly.
pub fn pick<'a, T>(rng: &mut dyn RandomSource, items: &'a [T]) -> Option<&'a T> {
    if items.is_empty() {
        return None;
    }
    items.get(rng.index(items.len()))
}

/// Pick one element with probability proportional to `weight`.
///
/// Zero total weight degrades to a uniform pick.
pub fn pick_weighted<'a, T>(
    rng: &mut dyn RandomSource,
    items: &'a [T],
    weight: impl Fn(&T) -> u32,
) -> Option<&'a T> {
    let total: u64 = items.iter().map(|item| u64::from(weight(item))).sum();
    if total == 0 {
        return pick(rng, items);
    }
    let mut ticket = (rng.unit() * total as f64) as u64;
    for item in items {
        let w = u64::from(weight(item));
        if ticket < w {
            return Some(item);
        }
        ticket -= w;
    }
    items.last()
}

/// ChaCha8-backed source, deterministic for a given seed.
pub struct SimRng(ChaCha8Rng);

impl SimRng {
    /// Seeded generator; identical seeds give identical draws.
    pub fn from_seed_u64(seed: u64) -> Self {
        Self(ChaCha8Rng::seed_from_u64(seed))
    }

    /// Generator seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self(ChaCha8Rng::from_entropy())
    }

    /// Seeded when `seed` is set, entropy otherwise.
    pub fn from_optional_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::from_seed_u64(seed),
            None => Self::from_entropy(),
        }
    }
}

impl RandomSource for SimRng {
    fn unit(&mut self) -> f64 {
        self.0.gen::<f64>()
    }

    fn index(&mut self, bound: usize) -> usize {
        self.0.gen_range(0..bound.max(1))
    }

    fn between(&mut self, low: u32, high: u32) -> u32 {
        if high <= low {
            return low;
        }
        self.0.gen_range(low..=high)
    }
}
