//! Stochastic fault model for the interlock.
//!
//! One Bernoulli trial per cycle decides whether a fault occurs. The same
//! random source picks the fault variant and the mechanical trip duration, so
//! a seeded injector replays an identical fault sequence.

use floorgate_types::FaultKind;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::interlock::InterlockConfig;

pub struct FaultInjector<R: RngCore = ChaCha20Rng> {
    rng: R,
    forced_probability: f64,
    ambient_probability: f64,
    trip_floor_ms: f64,
    trip_jitter_ms: f64,
    catalog: Vec<FaultKind>,
}

impl FaultInjector<ChaCha20Rng> {
    /// Injector with a deterministic ChaCha20 stream.
    pub fn seeded(config: &InterlockConfig, seed: u64) -> Self {
        Self::with_rng(config, ChaCha20Rng::seed_from_u64(seed))
    }

    /// Injector seeded from OS entropy.
    pub fn from_entropy(config: &InterlockConfig) -> Self {
        Self::with_rng(config, ChaCha20Rng::from_entropy())
    }
}

impl<R: RngCore> FaultInjector<R> {
    pub fn with_rng(config: &InterlockConfig, rng: R) -> Self {
        Self {
            rng,
            forced_probability: config.forced_fault_probability,
            ambient_probability: config.ambient_fault_probability,
            trip_floor_ms: config.trip_floor_ms,
            trip_jitter_ms: config.trip_jitter_ms,
            catalog: config.variants.clone(),
        }
    }

    /// Decide whether this cycle faults and, if so, which variant.
    ///
    /// A requested fault raises the probability to the forced rate and is
    /// returned as-is when the trial fires; otherwise a catalog variant is
    /// chosen uniformly.
    pub fn draw(&mut self, requested: Option<FaultKind>) -> Option<FaultKind> {
        let probability = if requested.is_some() {
            self.forced_probability
        } else {
            self.ambient_probability
        };
        if self.rng.gen::<f64>() >= probability {
            return None;
        }
        Some(requested.unwrap_or_else(|| self.random_variant()))
    }

    /// Mechanical trip time: fixed floor plus uniform jitter, in `[floor, floor + jitter)`.
    pub fn trip_duration_ms(&mut self) -> f64 {
        self.trip_floor_ms + self.rng.gen::<f64>() * self.trip_jitter_ms
    }

    fn random_variant(&mut self) -> FaultKind {
        let index = self.rng.gen_range(0..self.catalog.len());
        self.catalog[index]
    }
}
