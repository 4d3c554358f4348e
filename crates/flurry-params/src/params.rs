//! The statically enumerated parameter state.
//!
//! Every slider the control surface exposes is a named `f64` field with a
//! documented default and inclusive range. The [`PARAMETERS`] table is the
//! single source of truth for names, ranges and defaults; the struct, its
//! `Default` impl and name-based lookup are all generated from it.

use serde::{Deserialize, Serialize};

use crate::error::{ParamError, ParamResult};

/// Parameter sections, mirroring the panels of the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    /// Bus levels and reverb sends.
    Mixer,
    /// Scale, progression and voicing decisions.
    Harmony,
    /// Voice oscillator and filter character.
    Timbre,
    /// Reverb topology and wet-path filters.
    Space,
    /// Grain scheduling.
    Granular,
    /// Offline spectral stretch bed.
    Stretch,
    /// Lead synth line.
    Lead,
}

impl Section {
    /// Returns the lowercase section name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Mixer => "mixer",
            Section::Harmony => "harmony",
            Section::Timbre => "timbre",
            Section::Space => "space",
            Section::Granular => "granular",
            Section::Stretch => "stretch",
            Section::Lead => "lead",
        }
    }
}

/// Static description of one parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    /// Field name, also the canonical serialization key.
    pub name: &'static str,
    /// Owning section.
    pub section: Section,
    /// Default value.
    pub default: f64,
    /// Inclusive lower bound.
    pub min: f64,
    /// Inclusive upper bound.
    pub max: f64,
}

impl ParamSpec {
    /// Returns true if `value` is finite and within range.
    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }

    /// Clamps `value` into range, mapping non-finite values to the default.
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_finite() {
            value.clamp(self.min, self.max)
        } else {
            self.default
        }
    }
}

/// Declares the parameter table.
///
/// ```ignore
/// parameters! {
///     /// Doc comment for the field.
///     name: Section = default, [min, max];
/// }
/// ```
macro_rules! parameters {
    (
        $(
            $(#[$attr:meta])*
            $name:ident : $section:ident = $default:literal, [$min:literal, $max:literal];
        )*
    ) => {
        /// Canonical parameter state handed to the engine on every tick.
        ///
        /// Missing keys take their defaults when deserializing; unknown keys
        /// are rejected so typos in presets surface immediately.
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(default, deny_unknown_fields)]
        pub struct ParameterState {
            $(
                $(#[$attr])*
                pub $name: f64,
            )*
        }

        impl Default for ParameterState {
            fn default() -> Self {
                Self {
                    $( $name: $default, )*
                }
            }
        }

        /// Every parameter, in declaration order.
        pub const PARAMETERS: &[ParamSpec] = &[
            $(
                ParamSpec {
                    name: stringify!($name),
                    section: Section::$section,
                    default: $default,
                    min: $min,
                    max: $max,
                },
            )*
        ];

        impl ParameterState {
            /// Looks up a parameter value by name.
            pub fn get(&self, name: &str) -> Option<f64> {
                match name {
                    $( stringify!($name) => Some(self.$name), )*
                    _ => None,
                }
            }

            fn slot_mut(&mut self, name: &str) -> Option<&mut f64> {
                match name {
                    $( stringify!($name) => Some(&mut self.$name), )*
                    _ => None,
                }
            }
        }
    };
}

parameters! {
    // Mixer
    /// Master output gain.
    master_volume: Mixer = 0.7, [0.0, 1.0];
    /// Voice bank level into the synth bus.
    synth_level: Mixer = 0.6, [0.0, 1.0];
    /// Dry bus level (synth signal bypassing the granulator).
    dry_level: Mixer = 0.35, [0.0, 1.0];
    /// Granulator output level.
    granular_level: Mixer = 0.5, [0.0, 1.0];
    /// Reverb return level.
    reverb_level: Mixer = 0.7, [0.0, 1.0];
    /// Stretch bed level into master.
    stretch_level: Mixer = 0.4, [0.0, 1.0];
    /// Lead synth level.
    lead_level: Mixer = 0.35, [0.0, 1.0];
    /// Synth bus send into the granulator.
    granular_send: Mixer = 0.6, [0.0, 1.0];
    /// Dry bus send into the reverb.
    dry_reverb_send: Mixer = 0.4, [0.0, 1.0];
    /// Granulator send into the reverb.
    granular_reverb_send: Mixer = 0.8, [0.0, 1.0];
    /// Lead send into the reverb.
    lead_reverb_send: Mixer = 0.5, [0.0, 1.0];
    /// Time constant for bus gain smoothing, in milliseconds.
    gain_smoothing_ms: Mixer = 40.0, [1.0, 1000.0];

    // Harmony
    /// Target harmonic tension, selects the scale band.
    tension: Harmony = 0.3, [0.0, 1.0];
    /// Octave of the E root (E2 = MIDI 40).
    root_octave: Harmony = 2.0, [1.0, 4.0];
    /// Minimum chords per phrase.
    progression_min: Harmony = 2.0, [1.0, 8.0];
    /// Maximum chords per phrase.
    progression_max: Harmony = 4.0, [1.0, 8.0];
    /// Probability that a chord gains a seventh.
    chord_complexity: Harmony = 0.3, [0.0, 1.0];
    /// Probability that a voice is lifted an octave.
    voicing_spread: Harmony = 0.4, [0.0, 1.0];
    /// Number of octaves the stacked voicing may span.
    voice_octave_span: Harmony = 2.0, [1.0, 3.0];
    /// Probability that the lowest voice drops an octave as a pedal tone.
    pedal_probability: Harmony = 0.2, [0.0, 1.0];

    // Timbre
    /// Lowpass cutoff control (200 Hz .. 12 kHz, exponential).
    brightness: Timbre = 0.5, [0.0, 1.0];
    /// Drive and envelope speed.
    hardness: Timbre = 0.3, [0.0, 1.0];
    /// Detune between the two sawtooth oscillators, in cents.
    detune_cents: Timbre = 7.0, [0.0, 50.0];
    saw_mix: Timbre = 0.5, [0.0, 1.0];
    triangle_mix: Timbre = 0.6, [0.0, 1.0];
    noise_mix: Timbre = 0.04, [0.0, 1.0];
    /// Lowpass Q.
    filter_resonance: Timbre = 0.8, [0.5, 10.0];
    /// How much the cutoff follows voice pitch.
    filter_key_tracking: Timbre = 0.3, [0.0, 1.0];
    /// Multiplier on the hardness-derived attack time.
    attack_scale: Timbre = 1.0, [0.1, 4.0];
    /// Multiplier on the hardness-derived release time.
    release_scale: Timbre = 1.0, [0.1, 4.0];
    /// Vibrato LFO rate in Hz.
    vibrato_rate: Timbre = 0.2, [0.0, 8.0];
    /// Vibrato depth in cents.
    vibrato_depth: Timbre = 3.0, [0.0, 50.0];

    // Space
    /// Reverb topology: 0 plate, 1 hall, 2 cathedral, 3 dark hall.
    reverb_preset: Space = 1.0, [0.0, 3.0];
    /// Reverb dry/wet mix.
    reverb_mix: Space = 0.45, [0.0, 1.0];
    /// Scales the preset feedback coefficients.
    reverb_decay: Space = 0.85, [0.0, 1.0];
    /// Extra damping on top of the preset damping.
    reverb_damping: Space = 0.4, [0.0, 1.0];
    reverb_predelay_ms: Space = 20.0, [0.0, 250.0];
    /// Stereo decorrelation of the tap outputs.
    reverb_width: Space = 0.8, [0.0, 1.0];
    /// Scales the preset delay times.
    reverb_size: Space = 1.0, [0.5, 2.0];
    wet_lowpass_hz: Space = 9000.0, [200.0, 20000.0];
    wet_highpass_hz: Space = 80.0, [20.0, 2000.0];
    /// Crossfade window when the reverb topology changes.
    preset_crossfade_ms: Space = 250.0, [10.0, 5000.0];
    /// Smoothing time for reverb mix and feedback changes.
    mix_smoothing_ms: Space = 50.0, [1.0, 1000.0];

    // Granular
    grain_size_min_ms: Granular = 80.0, [5.0, 2000.0];
    grain_size_max_ms: Granular = 350.0, [5.0, 4000.0];
    /// Grains per second.
    grain_density: Granular = 6.0, [0.1, 60.0];
    /// Source offset jitter as a fraction of the source window.
    grain_jitter: Granular = 0.3, [0.0, 1.0];
    /// Length of the capture window grains read from, in seconds.
    grain_source_window_s: Granular = 3.0, [0.1, 10.0];
    /// Random detune per grain, in cents.
    grain_pitch_spread: Granular = 0.0, [0.0, 100.0];
    /// Probability that a grain plays an octave up.
    grain_octave_prob: Granular = 0.15, [0.0, 1.0];
    grain_pan_spread: Granular = 0.6, [0.0, 1.0];
    grain_reverse_prob: Granular = 0.1, [0.0, 1.0];
    grain_amp_jitter: Granular = 0.3, [0.0, 1.0];
    /// Grain envelope: 0 hann, 1 triangle, 2 tukey.
    grain_envelope: Granular = 0.0, [0.0, 2.0];

    // Stretch
    /// Values >= 0.5 enable the stretch bed.
    stretch_enabled: Stretch = 1.0, [0.0, 1.0];
    stretch_factor: Stretch = 8.0, [1.0, 64.0];
    /// Analysis window length in seconds.
    stretch_window_s: Stretch = 0.25, [0.02, 2.0];
    /// Length of the synthesized source, in seconds.
    stretch_source_s: Stretch = 4.0, [0.5, 20.0];
    stretch_lowpass_hz: Stretch = 4000.0, [100.0, 20000.0];
    /// Crossfade from the previous bed when a new one arrives.
    stretch_fade_s: Stretch = 2.0, [0.0, 10.0];
    /// Octave shift applied to the source render.
    stretch_octave: Stretch = 0.0, [-2.0, 1.0];
    /// Crossfade at the loop point of the bed.
    stretch_loop_crossfade_s: Stretch = 1.0, [0.0, 5.0];

    // Lead
    /// Values >= 0.5 enable the lead line.
    lead_enabled: Lead = 0.0, [0.0, 1.0];
    /// Notes per phrase (2 + 10 * density).
    lead_density: Lead = 0.4, [0.0, 1.0];
    lead_octave: Lead = 4.0, [2.0, 6.0];
    lead_attack_s: Lead = 0.05, [0.001, 2.0];
    lead_release_s: Lead = 1.2, [0.01, 6.0];
    lead_brightness: Lead = 0.6, [0.0, 1.0];
    /// Probability that a lead slot is a rest.
    lead_rest_prob: Lead = 0.3, [0.0, 1.0];
    /// Vibrato depth on the lead, 0..1 maps to 0..30 cents.
    lead_vibrato: Lead = 0.2, [0.0, 1.0];
    /// Portamento time between lead notes.
    lead_glide_s: Lead = 0.0, [0.0, 1.0];
    lead_detune_cents: Lead = 4.0, [0.0, 30.0];
}

/// Looks up the static spec for a parameter name.
pub fn param_spec(name: &str) -> Option<&'static ParamSpec> {
    PARAMETERS.iter().find(|spec| spec.name == name)
}

impl ParameterState {
    /// Sets a parameter by name, rejecting unknown names and out-of-range values.
    pub fn set(&mut self, name: &str, value: f64) -> ParamResult<()> {
        let spec = param_spec(name).ok_or_else(|| ParamError::UnknownParameter {
            name: name.to_string(),
        })?;
        check(spec, value)?;
        if let Some(slot) = self.slot_mut(name) {
            *slot = value;
        }
        Ok(())
    }

    /// Validates every value against its documented range.
    pub fn validate(&self) -> ParamResult<()> {
        for spec in PARAMETERS {
            check(spec, self.get(spec.name).unwrap_or(spec.default))?;
        }
        Ok(())
    }

    /// Returns a copy with every value clamped into range.
    pub fn clamped(&self) -> Self {
        let mut out = self.clone();
        for spec in PARAMETERS {
            if let Some(slot) = out.slot_mut(spec.name) {
                *slot = spec.clamp(*slot);
            }
        }
        out
    }

    /// Iterates `(name, value)` pairs for one section, in declaration order.
    pub fn section_values(&self, section: Section) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        PARAMETERS
            .iter()
            .filter(move |spec| spec.section == section)
            .map(move |spec| (spec.name, self.get(spec.name).unwrap_or(spec.default)))
    }

    /// Reverb topology index (0..=3).
    pub fn reverb_preset_index(&self) -> usize {
        round_index(self.reverb_preset, 3)
    }

    /// Grain envelope index (0..=2).
    pub fn grain_envelope_index(&self) -> usize {
        round_index(self.grain_envelope, 2)
    }

    pub fn stretch_enabled(&self) -> bool {
        self.stretch_enabled >= 0.5
    }

    pub fn lead_enabled(&self) -> bool {
        self.lead_enabled >= 0.5
    }

    /// Chord count bounds, ordered and clamped to 1..=8.
    pub fn progression_bounds(&self) -> (usize, usize) {
        let a = round_index(self.progression_min - 1.0, 7) + 1;
        let b = round_index(self.progression_max - 1.0, 7) + 1;
        (a.min(b), a.max(b))
    }

    /// Grain duration bounds in milliseconds, ordered.
    pub fn grain_size_bounds_ms(&self) -> (f64, f64) {
        let a = self.grain_size_min_ms;
        let b = self.grain_size_max_ms;
        (a.min(b), a.max(b))
    }
}

fn check(spec: &ParamSpec, value: f64) -> ParamResult<()> {
    if !value.is_finite() {
        return Err(ParamError::NotFinite { name: spec.name });
    }
    if !spec.contains(value) {
        return Err(ParamError::OutOfRange {
            name: spec.name,
            value,
            min: spec.min,
            max: spec.max,
        });
    }
    Ok(())
}

fn round_index(value: f64, max: usize) -> usize {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    (value.round() as usize).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_table_covers_every_section() {
        let sections: HashSet<&str> = PARAMETERS.iter().map(|s| s.section.as_str()).collect();
        assert_eq!(sections.len(), 7);
        assert!(PARAMETERS.len() >= 70);
    }

    #[test]
    fn test_names_unique() {
        let names: HashSet<&str> = PARAMETERS.iter().map(|s| s.name).collect();
        assert_eq!(names.len(), PARAMETERS.len());
    }

    #[test]
    fn test_defaults_within_range() {
        let state = ParameterState::default();
        assert!(state.validate().is_ok());
        for spec in PARAMETERS {
            assert_eq!(state.get(spec.name), Some(spec.default), "{}", spec.name);
        }
    }

    #[test]
    fn test_set_by_name() {
        let mut state = ParameterState::default();
        state.set("tension", 0.9).unwrap();
        assert_eq!(state.tension, 0.9);

        assert!(matches!(
            state.set("tension", 2.0),
            Err(ParamError::OutOfRange { name: "tension", .. })
        ));
        assert!(matches!(
            state.set("nope", 0.0),
            Err(ParamError::UnknownParameter { .. })
        ));
        assert!(matches!(
            state.set("brightness", f64::NAN),
            Err(ParamError::NotFinite { .. })
        ));
    }

    #[test]
    fn test_clamped() {
        let mut state = ParameterState::default();
        state.grain_density = 500.0;
        state.tension = f64::NAN;
        let clamped = state.clamped();
        assert_eq!(clamped.grain_density, 60.0);
        assert_eq!(clamped.tension, 0.3);
        assert!(clamped.validate().is_ok());
    }

    #[test]
    fn test_index_helpers() {
        let mut state = ParameterState::default();
        state.reverb_preset = 2.4;
        assert_eq!(state.reverb_preset_index(), 2);
        state.reverb_preset = 2.6;
        assert_eq!(state.reverb_preset_index(), 3);
        state.grain_envelope = 1.0;
        assert_eq!(state.grain_envelope_index(), 1);
    }

    #[test]
    fn test_progression_bounds_are_ordered() {
        let mut state = ParameterState::default();
        state.progression_min = 6.0;
        state.progression_max = 3.0;
        assert_eq!(state.progression_bounds(), (3, 6));
    }

    #[test]
    fn test_section_values() {
        let state = ParameterState::default();
        let stretch: Vec<_> = state.section_values(Section::Stretch).collect();
        assert_eq!(stretch.len(), 8);
        assert_eq!(stretch[0], ("stretch_enabled", 1.0));
    }
}
