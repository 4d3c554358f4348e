//! Seed derivation.
//!
//! ```text
//! seed = xmur3(bucket || "|" || canonical(params) || "|" || SEED_DOMAIN)
//! ```
//!
//! xmur3 walks the UTF-16 code units of the input with a multiply-rotate
//! step and finalizes with two multiply-xorshift rounds, so the seed matches
//! implementations that hash JavaScript strings.

use crate::bucket::TimeBucket;
use crate::params::ParameterState;

/// A 32-bit stream seed.
pub type Seed = u32;

/// Domain-separation tag appended to every seed input.
pub const SEED_DOMAIN: &str = "flurry:root=E";

/// xmur3 string hash. Each call to [`Xmur3::next_u32`] yields a new value.
#[derive(Debug, Clone)]
pub struct Xmur3 {
    h: u32,
}

impl Xmur3 {
    /// Absorbs `input`.
    pub fn new(input: &str) -> Self {
        let units: Vec<u16> = input.encode_utf16().collect();
        let mut h = 1_779_033_703u32 ^ units.len() as u32;
        for unit in units {
            h = (h ^ unit as u32).wrapping_mul(3_432_918_353);
            h = h.rotate_left(13);
        }
        Self { h }
    }

    /// Produces the next finalized hash value.
    pub fn next_u32(&mut self) -> u32 {
        let mut h = self.h;
        h = (h ^ (h >> 16)).wrapping_mul(2_246_822_507);
        h = (h ^ (h >> 13)).wrapping_mul(3_266_489_909);
        h ^= h >> 16;
        self.h = h;
        h
    }
}

/// Builds the string that is hashed into a seed.
pub fn seed_material(bucket: &TimeBucket, params: &ParameterState) -> String {
    format!(
        "{}|{}|{}",
        bucket.as_str(),
        params.canonical_string(),
        SEED_DOMAIN
    )
}

/// Derives the stream seed for a bucket and parameter state.
///
/// Pure: identical inputs always yield the identical seed.
///
/// # Example
/// ```
/// use flurry_params::{derive_seed, ParameterState, TimeBucket};
///
/// let bucket = TimeBucket::parse("2024-01-01T00").unwrap();
/// let params = ParameterState::default();
/// assert_eq!(derive_seed(&bucket, &params), derive_seed(&bucket, &params));
/// ```
pub fn derive_seed(bucket: &TimeBucket, params: &ParameterState) -> Seed {
    Xmur3::new(&seed_material(bucket, params)).next_u32()
}
