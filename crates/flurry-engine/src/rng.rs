//! Deterministic random streams.
//!
//! All musical decisions flow through [`RngStream`], a mulberry32 generator.
//! Its draw order is part of the determinism contract: for a fixed seed the
//! sequence of values depends only on the sequence of calls.
//!
//! Timbral noise is not a decision. Voices read it from a [`NoiseTable`]
//! filled once at construction from a PCG32 seeded with a fixed constant.

use rand::{Rng, RngCore, SeedableRng};
use rand_pcg::Pcg32;

use flurry_params::Seed;

/// Seeded mulberry32 stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RngStream {
    state: u32,
}

impl RngStream {
    /// Creates a stream positioned at the start of `seed`'s sequence.
    pub fn new(seed: Seed) -> Self {
        Self { state: seed }
    }

    /// Draws the next 32-bit value.
    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_add(0x6D2B_79F5);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        t ^ (t >> 14)
    }

    /// Draws a float in `[0, 1)`.
    #[inline]
    pub fn next_float(&mut self) -> f64 {
        self.next_u32() as f64 / 4_294_967_296.0
    }

    /// Draws a float in `[lo, hi)`. Consumes exactly one draw.
    #[inline]
    pub fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_float()
    }

    /// Draws an index in `0..n`. Consumes exactly one draw; `n == 0` yields 0.
    #[inline]
    pub fn below(&mut self, n: usize) -> usize {
        ((self.next_float() * n as f64) as usize).min(n.saturating_sub(1))
    }

    /// Returns true with probability `p`. Consumes exactly one draw.
    #[inline]
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_float() < p
    }

    /// Draws a seed for a sub-stream. Consumes exactly one draw.
    pub fn fork_seed(&mut self) -> Seed {
        self.next_u32()
    }
}

impl RngCore for RngStream {
    fn next_u32(&mut self) -> u32 {
        RngStream::next_u32(self)
    }

    fn next_u64(&mut self) -> u64 {
        let lo = RngStream::next_u32(self) as u64;
        let hi = RngStream::next_u32(self) as u64;
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = RngStream::next_u32(self).to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for RngStream {
    type Seed = [u8; 4];

    fn from_seed(seed: Self::Seed) -> Self {
        Self::new(u32::from_le_bytes(seed))
    }
}

/// Creates a PCG32 RNG from a 32-bit seed.
///
/// The 32-bit seed is expanded to 64 bits by duplicating the value in both
/// halves.
pub fn create_pcg(seed: u32) -> Pcg32 {
    let seed64 = (seed as u64) | ((seed as u64) << 32);
    Pcg32::seed_from_u64(seed64)
}

/// Seed of the shared noise table. Fixed so timbre never depends on the stream.
pub const NOISE_TABLE_SEED: u32 = 0x5EED_0015;

/// Length of the noise table in samples (about 1.4 s at 48 kHz).
pub const NOISE_TABLE_LEN: usize = 1 << 16;

/// A looped table of white noise in `[-1, 1)`.
#[derive(Debug, Clone)]
pub struct NoiseTable {
    samples: Vec<f64>,
}

impl NoiseTable {
    /// Fills a table of `len` samples from `seed`.
    pub fn new(seed: u32, len: usize) -> Self {
        let mut rng = create_pcg(seed);
        let samples = (0..len.max(1)).map(|_| rng.gen_range(-1.0..1.0)).collect();
        Self { samples }
    }

    /// Reads the sample at `index`, wrapping.
    #[inline]
    pub fn at(&self, index: usize) -> f64 {
        self.samples[index % self.samples.len()]
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Default for NoiseTable {
    fn default() -> Self {
        Self::new(NOISE_TABLE_SEED, NOISE_TABLE_LEN)
    }
}
