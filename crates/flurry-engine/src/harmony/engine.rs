//! Phrase-level harmonic decisions.

use flurry_params::ParameterState;
use serde::Serialize;

use super::lead::{generate_lead, LeadNote, LeadSettings};
use super::progression::{voice_chord, ChordProgression, Voicing, VoicingSettings};
use super::scales::{ScaleFamily, ScaleTable};
use super::PHRASE_SECONDS;
use crate::rng::RngStream;

/// MIDI note of E in the given octave (E2 = 40).
pub fn e_in_octave(octave: f64) -> u8 {
    let octave = octave.round().clamp(0.0, 8.0) as i32;
    (12 * (octave + 1) + 4) as u8
}

/// Everything decided for one phrase. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Phrase {
    pub index: u64,
    pub start_seconds: f64,
    pub scale: ScaleFamily,
    pub root_midi: u8,
    pub progression: ChordProgression,
    /// One voicing per chord.
    pub voicings: Vec<Voicing>,
    /// Empty when the lead is disabled.
    pub lead: Vec<LeadNote>,
}

impl Phrase {
    /// Seconds each chord lasts.
    pub fn chord_seconds(&self) -> f64 {
        PHRASE_SECONDS / self.voicings.len().max(1) as f64
    }

    /// Chord index at `offset` seconds into the phrase.
    pub fn chord_at(&self, offset: f64) -> usize {
        let count = self.voicings.len().max(1);
        ((offset.max(0.0) / self.chord_seconds()) as usize).min(count - 1)
    }
}

/// Where the engine is in its phrase sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarmonyState {
    /// No phrase decided yet.
    Idle,
    /// The most recently decided phrase.
    PhraseActive { index: u64 },
}

/// Decides scale, progression and voicings once per phrase.
///
/// Decisions read the stream in a fixed order (scale, progression,
/// voicings, lead) and nothing else, so a phrase is a pure function of the
/// stream position and the parameters.
#[derive(Debug, Clone)]
pub struct HarmonyEngine {
    table: ScaleTable,
    state: HarmonyState,
}

impl HarmonyEngine {
    pub fn new(table: ScaleTable) -> Self {
        Self {
            table,
            state: HarmonyState::Idle,
        }
    }

    pub fn table(&self) -> &ScaleTable {
        &self.table
    }

    pub fn state(&self) -> HarmonyState {
        self.state
    }

    /// Index of the next phrase to be decided.
    pub fn next_index(&self) -> u64 {
        match self.state {
            HarmonyState::Idle => 0,
            HarmonyState::PhraseActive { index } => index + 1,
        }
    }

    /// Start time of the next phrase.
    pub fn next_start_seconds(&self) -> f64 {
        self.next_index() as f64 * PHRASE_SECONDS
    }

    /// Returns to `Idle`; the next phrase is phrase 0 again.
    pub fn reset(&mut self) {
        self.state = HarmonyState::Idle;
    }

    /// Decides the next phrase and makes it active.
    pub fn next_phrase(&mut self, params: &ParameterState, rng: &mut RngStream) -> Phrase {
        let index = self.next_index();
        let phrase = self.decide(index, params, rng);
        self.state = HarmonyState::PhraseActive { index };
        phrase
    }

    /// Decides every phrase whose boundary is at or before `elapsed_seconds`.
    ///
    /// Skipped phrases are generated in order so the stream stays aligned
    /// with an engine that never skipped.
    pub fn tick(
        &mut self,
        elapsed_seconds: f64,
        params: &ParameterState,
        rng: &mut RngStream,
    ) -> Vec<Phrase> {
        let mut phrases = Vec::new();
        while self.next_start_seconds() <= elapsed_seconds {
            phrases.push(self.next_phrase(params, rng));
        }
        phrases
    }

    fn decide(&self, index: u64, params: &ParameterState, rng: &mut RngStream) -> Phrase {
        let scale_index = self.table.select(params.tension, rng);
        let scale = self
            .table
            .get(scale_index)
            .or_else(|| self.table.families().first())
            .cloned()
            .unwrap_or_else(|| ScaleFamily::new("unison", &[0], 0.0, super::TensionClass::Consonant));

        let progression = ChordProgression::generate(
            &scale,
            params.progression_bounds(),
            params.chord_complexity,
            rng,
        );

        let root_midi = e_in_octave(params.root_octave);
        let voicing_settings = VoicingSettings {
            root_midi,
            spread: params.voicing_spread,
            octave_span: params.voice_octave_span.round().clamp(1.0, 3.0) as usize,
            pedal_probability: params.pedal_probability,
        };
        let voicings = progression
            .chords
            .iter()
            .map(|chord| voice_chord(chord, &scale, &voicing_settings, rng))
            .collect();

        let lead = if params.lead_enabled() {
            let settings = LeadSettings {
                density: params.lead_density,
                rest_probability: params.lead_rest_prob,
                root_midi: e_in_octave(params.lead_octave),
            };
            generate_lead(&scale, &settings, rng)
        } else {
            Vec::new()
        };

        Phrase {
            index,
            start_seconds: index as f64 * PHRASE_SECONDS,
            scale,
            root_midi,
            progression,
            voicings,
            lead,
        }
    }
}

impl Default for HarmonyEngine {
    fn default() -> Self {
        Self::new(ScaleTable::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_e_in_octave() {
        assert_eq!(e_in_octave(2.0), 40);
        assert_eq!(e_in_octave(4.0), 64);
    }

    #[test]
    fn test_idle_then_active() {
        let mut engine = HarmonyEngine::default();
        assert_eq!(engine.state(), HarmonyState::Idle);
        let mut rng = RngStream::new(1);
        let phrase = engine.next_phrase(&ParameterState::default(), &mut rng);
        assert_eq!(phrase.index, 0);
        assert_eq!(engine.state(), HarmonyState::PhraseActive { index: 0 });
    }

    #[test]
    fn test_tick_only_at_boundaries() {
        let mut engine = HarmonyEngine::default();
        let params = ParameterState::default();
        let mut rng = RngStream::new(77);

        assert_eq!(engine.tick(0.0, &params, &mut rng).len(), 1);
        assert!(engine.tick(15.999, &params, &mut rng).is_empty());
        let next = engine.tick(16.0, &params, &mut rng);
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].start_seconds, 16.0);
    }

    #[test]
    fn test_skipped_phrases_generated_in_order() {
        let params = ParameterState::default();

        let mut stepped = HarmonyEngine::default();
        let mut rng_a = RngStream::new(5);
        let mut seen = Vec::new();
        for step in 0..4 {
            seen.extend(stepped.tick(step as f64 * PHRASE_SECONDS, &params, &mut rng_a));
        }

        let mut jumped = HarmonyEngine::default();
        let mut rng_b = RngStream::new(5);
        let all = jumped.tick(3.5 * PHRASE_SECONDS, &params, &mut rng_b);

        assert_eq!(seen, all);
        assert_eq!(rng_a, rng_b);
    }

    #[test]
    fn test_same_seed_same_phrase() {
        let params = ParameterState::default();
        let a = HarmonyEngine::default().next_phrase(&params, &mut RngStream::new(1234));
        let b = HarmonyEngine::default().next_phrase(&params, &mut RngStream::new(1234));
        assert_eq!(a, b);
    }

    #[test]
    fn test_lead_only_when_enabled() {
        let mut params = ParameterState::default();
        let off = HarmonyEngine::default().next_phrase(&params, &mut RngStream::new(3));
        assert!(off.lead.is_empty());
        params.lead_enabled = 1.0;
        params.lead_rest_prob = 0.0;
        let on = HarmonyEngine::default().next_phrase(&params, &mut RngStream::new(3));
        assert!(!on.lead.is_empty());
        // Lead draws come after voicings, so the harmony is unchanged.
        assert_eq!(off.voicings, on.voicings);
    }

    #[test]
    fn test_chord_at() {
        let params = ParameterState {
            progression_min: 4.0,
            progression_max: 4.0,
            ..ParameterState::default()
        };
        let phrase = HarmonyEngine::default().next_phrase(&params, &mut RngStream::new(8));
        assert_eq!(phrase.chord_seconds(), 4.0);
        assert_eq!(phrase.chord_at(0.0), 0);
        assert_eq!(phrase.chord_at(4.0), 1);
        assert_eq!(phrase.chord_at(15.99), 3);
        assert_eq!(phrase.chord_at(99.0), 3);
    }
}
