//! CLI command implementations

pub mod inspect;
pub mod params;
pub mod render;
pub mod seed;
