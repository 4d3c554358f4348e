//! Flurry CLI library.
//!
//! This crate provides the command implementations behind the `flurry`
//! binary: seed inspection, parameter presets, phrase inspection and offline
//! rendering to WAV.

pub mod commands;
pub mod input;
