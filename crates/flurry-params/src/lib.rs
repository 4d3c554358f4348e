//! Flurry Parameter State
//!
//! This crate holds everything that feeds the seed of the generative engine:
//!
//! - [`ParameterState`]: the ~70 named sliders of the control surface, as a
//!   statically enumerated struct with documented ranges and defaults
//! - canonical serialization, stable under key order and numeric formatting
//! - [`TimeBucket`]: UTC hour/day windows that align independent listeners
//! - [`derive_seed`]: xmur3 hashing of bucket + canonical state + domain tag
//!
//! # Example
//!
//! ```
//! use flurry_params::{derive_seed, BucketGranularity, ParameterState, TimeBucket};
//!
//! let mut params = ParameterState::default();
//! params.set("tension", 0.6).unwrap();
//!
//! let bucket = TimeBucket::parse("2024-01-01T00").unwrap();
//! assert_eq!(bucket.granularity(), BucketGranularity::Hour);
//!
//! let seed = derive_seed(&bucket, &params);
//! assert_eq!(seed, derive_seed(&bucket, &params.clone()));
//! ```
//!
//! # Modules
//!
//! - [`params`]: the parameter table and [`ParameterState`]
//! - [`canonical`]: canonical JSON encoding and preset parsing
//! - [`bucket`]: time buckets
//! - [`seed`]: xmur3 seed derivation
//! - [`error`]: error types

pub mod bucket;
pub mod canonical;
pub mod error;
pub mod params;
pub mod seed;

pub use bucket::{BucketGranularity, TimeBucket};
pub use error::{ParamError, ParamResult};
pub use params::{param_spec, ParamSpec, ParameterState, Section, PARAMETERS};
pub use seed::{derive_seed, seed_material, Seed, Xmur3, SEED_DOMAIN};
