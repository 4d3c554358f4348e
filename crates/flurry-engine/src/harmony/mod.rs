//! Harmony: scale selection, chord progressions, voicings and the lead line.
//!
//! Decisions happen once per phrase and are frozen for its duration.

mod engine;
mod lead;
mod progression;
mod scales;

pub use engine::{e_in_octave, HarmonyEngine, HarmonyState, Phrase};
pub use lead::{generate_lead, slot_count, LeadNote, LeadSettings};
pub use progression::{
    voice_chord, Chord, ChordProgression, Voicing, VoicingSettings, VOICE_COUNT,
};
pub use scales::{weighted_select, ScaleFamily, ScaleTable, TensionClass};

/// Length of every phrase, in seconds.
pub const PHRASE_SECONDS: f64 = 16.0;
