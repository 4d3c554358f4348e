//! Lead line generation.
//!
//! The phrase is cut into equal slots. Each slot draws, in order: rest,
//! step, length. A rested slot still consumes all three draws so the line
//! keeps the same draw count whatever the rest probability is.

use serde::Serialize;

use super::scales::ScaleFamily;
use super::PHRASE_SECONDS;
use crate::rng::RngStream;

/// One lead note, timed relative to the phrase start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LeadNote {
    pub onset: f64,
    pub duration: f64,
    pub midi: u8,
}

/// Inputs for lead generation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeadSettings {
    pub density: f64,
    pub rest_probability: f64,
    /// MIDI note of E in the lead octave.
    pub root_midi: u8,
}

/// Number of slots for a density in `[0, 1]`.
pub fn slot_count(density: f64) -> usize {
    2 + (density.clamp(0.0, 1.0) * 10.0).floor() as usize
}

/// Draws the lead line for one phrase.
///
/// Motion is stepwise: each note moves at most two degrees from the last,
/// inside a two-octave window above the lead root.
pub fn generate_lead(scale: &ScaleFamily, settings: &LeadSettings, rng: &mut RngStream) -> Vec<LeadNote> {
    let slots = slot_count(settings.density);
    let slot_len = PHRASE_SECONDS / slots as f64;
    let n = scale.len().max(1);
    let top = 2 * n - 1;

    let mut notes = Vec::with_capacity(slots);
    let mut degree = n;
    for slot in 0..slots {
        let rest = rng.chance(settings.rest_probability);
        let step = rng.below(5) as i64 - 2;
        let length = rng.range(0.5, 1.0);

        degree = (degree as i64 + step).clamp(0, top as i64) as usize;
        if rest {
            continue;
        }
        let midi = (settings.root_midi as i32 + scale.semitones(degree)).clamp(0, 127) as u8;
        notes.push(LeadNote {
            onset: slot as f64 * slot_len,
            duration: slot_len * length,
            midi,
        });
    }
    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harmony::scales::ScaleTable;

    fn settings(rest: f64) -> LeadSettings {
        LeadSettings {
            density: 0.4,
            rest_probability: rest,
            root_midi: 64,
        }
    }

    #[test]
    fn test_slot_count() {
        assert_eq!(slot_count(0.0), 2);
        assert_eq!(slot_count(0.4), 6);
        assert_eq!(slot_count(1.0), 12);
    }

    #[test]
    fn test_notes_inside_phrase() {
        let scale = ScaleTable::default().families()[0].clone();
        for seed in 0..50 {
            let mut rng = RngStream::new(seed);
            for note in generate_lead(&scale, &settings(0.3), &mut rng) {
                assert!(note.onset >= 0.0);
                assert!(note.onset + note.duration <= PHRASE_SECONDS + 1e-9);
                assert!(note.duration > 0.0);
            }
        }
    }

    #[test]
    fn test_rests_keep_draw_count() {
        let scale = ScaleTable::default().families()[0].clone();
        let mut a = RngStream::new(11);
        let mut b = RngStream::new(11);
        let all_rest = generate_lead(&scale, &settings(1.0), &mut a);
        let none_rest = generate_lead(&scale, &settings(0.0), &mut b);
        assert!(all_rest.is_empty());
        assert_eq!(none_rest.len(), slot_count(0.4));
        assert_eq!(a, b);
    }
}
