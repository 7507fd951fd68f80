//! Seeded random numbers for the simulation
//!
//! Every draw the simulation makes must come from here. The seed is chosen
//! when a session starts (or read from the demo being replayed) so replays
//! reproduce the same sequence.

use rand::{Rng, RngCore, SeedableRng};
use rand_pcg::Pcg32;

/// Deterministic random number generator
#[derive(Debug, Clone)]
pub struct DemoRng {
    seed: u32,
    inner: Pcg32,
}

impl DemoRng {
    pub fn new(seed: u32) -> Self {
        Self {
            seed,
            inner: Pcg32::seed_from_u64(u64::from(seed)),
        }
    }

    /// Seed for a fresh live or recorded session
    pub fn fresh_seed() -> u32 {
        rand::random()
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Restart the sequence from a new seed
    pub fn reseed(&mut self, seed: u32) {
        *self = Self::new(seed);
    }

    pub fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    /// Uniform integer in `[low, high)`; returns `low` for an empty range
    pub fn range(&mut self, low: i32, high: i32) -> i32 {
        if high <= low {
            return low;
        }
        self.inner.random_range(low..high)
    }

    /// True with probability `numerator / denominator`
    pub fn chance(&mut self, numerator: u32, denominator: u32) -> bool {
        denominator != 0 && self.inner.random_range(0..denominator) < numerator
    }
}
