//! Seeded random number generation owned by an environment.
//!
//! Every [`Environment`](crate::Environment) carries its own generator, so
//! independent environments never share random state and a run is fully
//! reproducible from its seed.

use rand::distr::uniform::{SampleRange, SampleUniform};
use rand::distr::{Distribution, StandardUniform};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Deterministic random number generator for a simulation.
///
/// Uses ChaCha8Rng for deterministic, reproducible randomness.
#[derive(Debug, Clone)]
pub struct SimRng {
    rng: ChaCha8Rng,
    seed: u64,
    draws: u64,
}

impl SimRng {
    /// Creates a generator from a seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
            draws: 0,
        }
    }

    /// Returns the seed this generator was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Returns how many values have been drawn so far.
    pub fn draws(&self) -> u64 {
        self.draws
    }

    /// Generates a random value.
    pub fn random<T>(&mut self) -> T
    where
        StandardUniform: Distribution<T>,
    {
        self.draws += 1;
        self.rng.sample(StandardUniform)
    }

    /// Generates a random value within `range`.
    ///
    /// The range must not be empty.
    pub fn random_range<T, R>(&mut self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.draws += 1;
        self.rng.random_range(range)
    }

    /// Returns `true` with probability `p`, clamped to `[0, 1]`.
    pub fn random_bool(&mut self, p: f64) -> bool {
        let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
        self.draws += 1;
        self.rng.random_bool(p)
    }

    /// Derives an independent generator whose seed is drawn from this one.
    pub fn fork(&mut self) -> SimRng {
        let seed = self.random::<u64>();
        SimRng::new(seed)
    }
}
