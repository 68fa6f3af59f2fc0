//! Explicitly seeded random source threaded through partitioners and workers.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seed used when the caller does not pick one.
pub const DEFAULT_SEED: u64 = 42;

/// A reproducible generator that remembers the seed it was built from.
///
/// Workers never share an instance; each receives a stream derived from the
/// search seed, so outcomes do not depend on thread scheduling.
#[derive(Clone, Debug)]
pub struct SeededRng {
    seed: u64,
    inner: ChaCha8Rng,
}

impl SeededRng {
    /// Creates a generator positioned at the start of `seed`'s stream.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            inner: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Restarts the generator from `seed`.
    pub fn set_seed(&mut self, seed: u64) {
        *self = Self::new(seed);
    }

    /// The seed this generator was last (re)started from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// A fresh generator for sub-stream `stream`, independent of how far this
    /// one has advanced.
    pub fn derive(&self, stream: u64) -> Self {
        let mut inner = ChaCha8Rng::seed_from_u64(self.seed);
        inner.set_stream(stream);
        Self {
            seed: self.seed,
            inner,
        }
    }
}

impl Default for SeededRng {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl RngCore for SeededRng {
    fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.inner.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.inner.try_fill_bytes(dest)
    }
}

/// Largest worker count whose stream ids stay distinct.
pub const MAX_WORKERS: usize = 1 << 24;

/// Stream id for a worker: round, phase and partition index packed together.
///
/// The low 24 bits hold the worker index, so indices below [`MAX_WORKERS`]
/// never share a stream within a round and phase.
pub fn worker_stream(round: usize, phase: u8, worker: usize) -> u64 {
    ((round as u64) << 32) | (u64::from(phase) << 24) | (worker as u64 & 0xff_ffff)
}
