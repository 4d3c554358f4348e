//! Flurry Engine
//!
//! Deterministic generative ambient synthesis: a drone of six pad voices in
//! E, reshaped every 16-second phrase, granulated, sent through an
//! algorithmic reverb and layered over a Paulstretch bed.
//!
//! # Determinism
//!
//! Every musical decision is drawn from one mulberry32 [`RngStream`] seeded
//! from the time bucket and the canonical parameter state (see
//! `flurry_params::derive_seed`). The draws happen on the control side in a
//! fixed order per phrase: harmony, grain batch, stretch phase seed. The
//! audio side only plays back what was decided, so two engines given the same
//! bucket and parameters make the same decisions regardless of block size or
//! thread timing.
//!
//! # Example
//!
//! ```no_run
//! use flurry_engine::{Engine, EngineConfig};
//! use flurry_params::{ParameterState, TimeBucket};
//!
//! let params = ParameterState::default();
//! let bucket = TimeBucket::parse("2024-01-01T00").unwrap();
//! let mut engine = Engine::new(EngineConfig::default(), &params, bucket).unwrap();
//! engine.start();
//!
//! let block = engine.tick(&params, 512);
//! assert_eq!(block.frames(), 512);
//! for event in engine.drain_events() {
//!     println!("{event:?}");
//! }
//! ```
//!
//! # Crate Structure
//!
//! - [`Engine`] - single-threaded orchestration and the `tick` render call
//! - [`control`] - parameter diffing, reseeding, phrase planning, stretch jobs
//! - [`graph`] - the real-time signal graph
//! - [`composer`] - the per-phrase decision sequence
//! - [`harmony`] - scales, progressions, voicings, lead line
//! - [`voice`] - pad voice bank and lead voice
//! - [`granular`] - grain batches, scheduler and granulator
//! - [`reverb`] - topology presets and the tap-bank network
//! - [`stretch`] - Paulstretch rendering, worker, cache and player
//! - [`rng`] - the decision stream and fixed noise tables

pub mod block;
pub mod composer;
pub mod config;
pub mod control;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod events;
pub mod filter;
pub mod granular;
pub mod graph;
pub mod harmony;
pub mod oscillator;
pub mod reverb;
pub mod rng;
pub mod smoother;
pub mod stretch;
pub mod voice;

// Re-export main types at crate root
pub use block::AudioBlock;
pub use composer::{Composer, Composition};
pub use config::{EngineConfig, StretchExecution};
pub use control::ControlPlane;
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use events::EngineEvent;
pub use graph::AudioGraph;
pub use harmony::{HarmonyEngine, Phrase, ScaleFamily, ScaleTable, PHRASE_SECONDS};
pub use reverb::ReverbPreset;
pub use rng::RngStream;
