//! Chord progressions and voicings.
//!
//! Draw order per phrase, after scale selection:
//!
//! 1. progression length (one draw)
//! 2. per chord: root degree, complexity (two draws)
//! 3. per chord voicing: rotation, pedal, then one octave-lift draw per voice
//!
//! Changing this order changes every phrase a seed produces.

use serde::Serialize;

use super::scales::ScaleFamily;
use crate::rng::RngStream;

/// Number of voices in the bank, and notes in every voicing.
pub const VOICE_COUNT: usize = 6;

/// Highest MIDI note a voicing may contain.
const MAX_NOTE: i32 = 120;

/// A chord as scale degrees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chord {
    /// Degree of the chord root within the scale.
    pub root_degree: usize,
    /// Stacked-thirds chord tones as degrees (may exceed the scale size,
    /// which means the next octave up).
    pub degrees: Vec<usize>,
}

impl Chord {
    /// True if the chord carries a seventh.
    pub fn has_seventh(&self) -> bool {
        self.degrees.len() > 3
    }
}

/// An ordered chord sequence for one phrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChordProgression {
    pub chords: Vec<Chord>,
}

impl ChordProgression {
    /// Draws a progression.
    pub fn generate(
        scale: &ScaleFamily,
        bounds: (usize, usize),
        complexity: f64,
        rng: &mut RngStream,
    ) -> Self {
        let (min, max) = bounds;
        let span = max - min + 1;
        let length = min + rng.below(span);
        let n = scale.len().max(1);

        let mut chords = Vec::with_capacity(length);
        let mut previous: Option<usize> = None;
        for _ in 0..length {
            let mut root = rng.below(n);
            if n > 1 && previous == Some(root) {
                root = (root + 1) % n;
            }
            let tones = if rng.chance(complexity) { 4 } else { 3 };
            let degrees = (0..tones).map(|i| root + 2 * i).collect();
            chords.push(Chord {
                root_degree: root,
                degrees,
            });
            previous = Some(root);
        }
        Self { chords }
    }

    pub fn len(&self) -> usize {
        self.chords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chords.is_empty()
    }
}

/// Settings that shape voicings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoicingSettings {
    /// MIDI note of the E root.
    pub root_midi: u8,
    pub spread: f64,
    pub octave_span: usize,
    pub pedal_probability: f64,
}

/// MIDI notes for every voice, ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Voicing {
    pub notes: [u8; VOICE_COUNT],
}

impl Voicing {
    /// Pitch classes relative to E (0..12).
    pub fn pitch_classes(&self, root_midi: u8) -> [u8; VOICE_COUNT] {
        let mut classes = [0; VOICE_COUNT];
        for (class, &note) in classes.iter_mut().zip(&self.notes) {
            *class = ((note as i32 - root_midi as i32).rem_euclid(12)) as u8;
        }
        classes
    }
}

/// Degree order for a chord: the chord tones, then further stacked thirds,
/// then any degree the thirds cycle skipped, ascending.
fn degree_order(chord: &Chord, scale_len: usize) -> Vec<usize> {
    let n = scale_len.max(1);
    let mut order: Vec<usize> = Vec::with_capacity(n);
    for i in 0..n {
        let degree = (chord.root_degree + 2 * i) % n;
        if !order.contains(&degree) {
            order.push(degree);
        }
    }
    for degree in 0..n {
        if !order.contains(&degree) {
            order.push(degree);
        }
    }
    order
}

/// Voices a chord.
///
/// Voices take distinct scale degrees whenever the scale has at least
/// [`VOICE_COUNT`] degrees, so no pitch class repeats. Smaller scales reuse
/// degrees from the top of the order.
pub fn voice_chord(
    chord: &Chord,
    scale: &ScaleFamily,
    settings: &VoicingSettings,
    rng: &mut RngStream,
) -> Voicing {
    let n = scale.len().max(1);
    let order = degree_order(chord, n);
    let chord_tones = chord.degrees.len().clamp(1, order.len());

    let rotation = rng.below(chord_tones);
    let pedal = rng.chance(settings.pedal_probability);

    let mut degrees = [0usize; VOICE_COUNT];
    for (i, slot) in degrees.iter_mut().enumerate() {
        let pick = if i < chord_tones {
            (i + rotation) % chord_tones
        } else {
            i % order.len()
        };
        *slot = order[pick];
    }

    // Stack upward: each voice takes the lowest octave of its degree that
    // sits above the previous voice.
    let root = settings.root_midi as i32;
    let ceiling = (root + 12 * (settings.octave_span as i32 + 1)).min(MAX_NOTE);
    let mut notes = [0i32; VOICE_COUNT];
    let mut floor = root - 1;
    for (note, &degree) in notes.iter_mut().zip(&degrees) {
        let mut candidate = root + scale.semitones(degree);
        while candidate <= floor {
            candidate += 12;
        }
        *note = candidate;
        floor = candidate;
    }

    for note in notes.iter_mut() {
        if rng.chance(settings.spread) && *note + 12 <= ceiling {
            *note += 12;
        }
    }

    if pedal && notes[0] - 12 >= 12 {
        notes[0] -= 12;
    }

    notes.sort_unstable();
    let mut out = [0u8; VOICE_COUNT];
    for (o, n) in out.iter_mut().zip(&notes) {
        *o = (*n).clamp(0, 127) as u8;
    }
    Voicing { notes: out }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harmony::scales::{ScaleTable, TensionClass};
    use std::collections::HashSet;

    fn settings() -> VoicingSettings {
        VoicingSettings {
            root_midi: 40,
            spread: 0.4,
            octave_span: 2,
            pedal_probability: 0.2,
        }
    }

    #[test]
    fn test_length_within_bounds() {
        let scale = &ScaleTable::default().families()[0].clone();
        for seed in 0..100 {
            let mut rng = RngStream::new(seed);
            let prog = ChordProgression::generate(scale, (2, 4), 0.3, &mut rng);
            assert!((2..=4).contains(&prog.len()));
        }
    }

    #[test]
    fn test_no_repeated_roots() {
        let scale = ScaleTable::default().families()[0].clone();
        for seed in 0..100 {
            let mut rng = RngStream::new(seed);
            let prog = ChordProgression::generate(&scale, (8, 8), 0.5, &mut rng);
            for pair in prog.chords.windows(2) {
                assert_ne!(pair[0].root_degree, pair[1].root_degree);
            }
        }
    }

    #[test]
    fn test_draw_count_per_chord() {
        let scale = ScaleTable::default().families()[0].clone();
        let mut a = RngStream::new(9);
        let prog = ChordProgression::generate(&scale, (3, 3), 0.5, &mut a);
        assert_eq!(prog.len(), 3);
        let mut b = RngStream::new(9);
        for _ in 0..(1 + 2 * 3) {
            b.next_u32();
        }
        assert_eq!(a, b);
    }

    #[test]
    fn test_unique_pitch_classes_for_heptatonic() {
        let table = ScaleTable::default();
        for family in table.families().iter().filter(|f| f.len() >= VOICE_COUNT) {
            for seed in 0..50 {
                let mut rng = RngStream::new(seed);
                let prog = ChordProgression::generate(family, (4, 4), 0.5, &mut rng);
                for chord in &prog.chords {
                    let voicing = voice_chord(chord, family, &settings(), &mut rng);
                    let classes: HashSet<u8> =
                        voicing.pitch_classes(40).iter().copied().collect();
                    assert_eq!(classes.len(), VOICE_COUNT, "{}", family.name);
                }
            }
        }
    }

    #[test]
    fn test_voicing_in_scale_and_sorted() {
        let family = ScaleFamily::new("p", &[0, 2, 4, 7, 9], 0.0, TensionClass::Consonant);
        for seed in 0..50 {
            let mut rng = RngStream::new(seed);
            let prog = ChordProgression::generate(&family, (2, 4), 0.5, &mut rng);
            for chord in &prog.chords {
                let voicing = voice_chord(chord, &family, &settings(), &mut rng);
                assert!(voicing.notes.windows(2).all(|w| w[0] <= w[1]));
                for class in voicing.pitch_classes(40) {
                    assert!(family.intervals.contains(&class));
                }
            }
        }
    }

    #[test]
    fn test_voicing_draw_count() {
        let scale = ScaleTable::default().families()[0].clone();
        let chord = Chord {
            root_degree: 0,
            degrees: vec![0, 2, 4],
        };
        let mut a = RngStream::new(3);
        voice_chord(&chord, &scale, &settings(), &mut a);
        let mut b = RngStream::new(3);
        for _ in 0..(2 + VOICE_COUNT) {
            b.next_u32();
        }
        assert_eq!(a, b);
    }

    #[test]
    fn test_stacked_thirds_order() {
        let chord = Chord {
            root_degree: 1,
            degrees: vec![1, 3, 5],
        };
        assert_eq!(degree_order(&chord, 7), vec![1, 3, 5, 0, 2, 4, 6]);
        let octatonic = Chord {
            root_degree: 0,
            degrees: vec![0, 2, 4],
        };
        assert_eq!(degree_order(&octatonic, 8), vec![0, 2, 4, 6, 1, 3, 5, 7]);
    }
}
