//! Granular texture over the synth bus.
//!
//! Grain decisions are made off the audio thread in batches: one
//! [`GrainSequence`] per phrase, drawn from the shared stream right after the
//! harmony decisions. The audio thread only walks the batch in order and reads
//! grains out of a circular capture of the synth bus.

use std::f64::consts::{FRAC_PI_4, TAU};

use flurry_params::ParameterState;
use serde::Serialize;

use crate::harmony::PHRASE_SECONDS;
use crate::oscillator::cents_to_ratio;
use crate::rng::RngStream;

/// Shortest grain that will be scheduled.
pub const MIN_GRAIN_SECONDS: f64 = 0.005;

/// Grains sounding at once. Grains due while the pool is full are skipped.
pub const MAX_ACTIVE_GRAINS: usize = 64;

/// Length of the capture buffer. Covers the longest source window plus the
/// longest grain read at the highest pitch.
pub const CAPTURE_SECONDS: f64 = 20.0;

/// Output gain per grain before amplitude jitter.
const GRAIN_GAIN: f64 = 0.5;

/// Grain amplitude window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrainEnvelope {
    Hann,
    Triangle,
    /// Flat top with cosine tapers over the outer quarters.
    Tukey,
}

impl GrainEnvelope {
    pub fn from_index(index: usize) -> Self {
        match index {
            1 => GrainEnvelope::Triangle,
            2 => GrainEnvelope::Tukey,
            _ => GrainEnvelope::Hann,
        }
    }

    /// Window value at normalized position `x` in `[0, 1]`.
    #[inline]
    pub fn at(&self, x: f64) -> f64 {
        let x = x.clamp(0.0, 1.0);
        match self {
            GrainEnvelope::Hann => 0.5 * (1.0 - (TAU * x).cos()),
            GrainEnvelope::Triangle => 1.0 - (2.0 * x - 1.0).abs(),
            GrainEnvelope::Tukey => {
                const ALPHA: f64 = 0.5;
                if x < ALPHA / 2.0 {
                    0.5 * (1.0 + (TAU / ALPHA * (x - ALPHA / 2.0)).cos())
                } else if x > 1.0 - ALPHA / 2.0 {
                    0.5 * (1.0 + (TAU / ALPHA * (x - 1.0 + ALPHA / 2.0)).cos())
                } else {
                    1.0
                }
            }
        }
    }
}

/// One pre-decided grain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GrainSpec {
    /// Seconds after the phrase start.
    pub onset: f64,
    pub duration: f64,
    /// How far back from the capture write head the grain starts reading, in seconds.
    pub source_offset: f64,
    pub pitch_ratio: f64,
    /// -1 (left) .. 1 (right).
    pub pan: f64,
    pub amp: f64,
    pub reverse: bool,
}

/// A batch of grains for one phrase, ordered by onset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrainSequence {
    pub grains: Vec<GrainSpec>,
    pub envelope: GrainEnvelope,
}

impl GrainSequence {
    pub fn empty() -> Self {
        Self {
            grains: Vec::new(),
            envelope: GrainEnvelope::Hann,
        }
    }

    pub fn len(&self) -> usize {
        self.grains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grains.is_empty()
    }
}

/// Generation settings, read from the granular section when a batch is drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GranularSettings {
    pub size_min_s: f64,
    pub size_max_s: f64,
    pub density: f64,
    pub jitter: f64,
    pub window_s: f64,
    pub pitch_spread_cents: f64,
    pub octave_probability: f64,
    pub pan_spread: f64,
    pub reverse_probability: f64,
    pub amp_jitter: f64,
    pub envelope: GrainEnvelope,
}

impl GranularSettings {
    pub fn from_params(params: &ParameterState) -> Self {
        let (min_ms, max_ms) = params.grain_size_bounds_ms();
        Self {
            size_min_s: min_ms / 1000.0,
            size_max_s: max_ms / 1000.0,
            density: params.grain_density,
            jitter: params.grain_jitter,
            window_s: params.grain_source_window_s,
            pitch_spread_cents: params.grain_pitch_spread,
            octave_probability: params.grain_octave_prob,
            pan_spread: params.grain_pan_spread,
            reverse_probability: params.grain_reverse_prob,
            amp_jitter: params.grain_amp_jitter,
            envelope: GrainEnvelope::from_index(params.grain_envelope_index()),
        }
    }

    /// Grains needed to cover one phrase, capped at `cap`.
    pub fn batch_size(&self, cap: usize) -> usize {
        let needed = (self.density.max(0.0) * PHRASE_SECONDS).ceil() as usize;
        needed.clamp(1, cap.max(1))
    }
}

impl Default for GranularSettings {
    fn default() -> Self {
        Self::from_params(&ParameterState::default())
    }
}

/// Draws `count` grains.
///
/// Each grain consumes eight draws, in order: gap, duration, offset, octave,
/// detune, pan, reverse, amplitude. When `count` is too small to cover a
/// phrase at the set density, the gaps widen so the batch still spans it.
pub fn generate_sequence(
    rng: &mut RngStream,
    count: usize,
    settings: &GranularSettings,
) -> GrainSequence {
    let spread = PHRASE_SECONDS / count.max(1) as f64;
    let mean_gap = (1.0 / settings.density.max(1e-3)).max(spread);
    let mut grains = Vec::with_capacity(count);
    let mut onset = 0.0;

    for _ in 0..count {
        let gap = mean_gap * (1.0 + settings.jitter * (2.0 * rng.next_float() - 1.0));
        let duration = rng
            .range(settings.size_min_s, settings.size_max_s)
            .max(MIN_GRAIN_SECONDS);
        let offset_draw = rng.next_float();
        let octave = if rng.chance(settings.octave_probability) {
            2.0
        } else {
            1.0
        };
        let detune = rng.range(-settings.pitch_spread_cents, settings.pitch_spread_cents);
        let pan = settings.pan_spread * (2.0 * rng.next_float() - 1.0);
        let reverse = rng.chance(settings.reverse_probability);
        let amp = 1.0 - settings.amp_jitter * rng.next_float();

        let pitch_ratio = octave * cents_to_ratio(detune);
        // A forward grain faster than real time must start far enough back
        // not to overtake the write head.
        let min_offset = (pitch_ratio - 1.0).max(0.0) * duration + 0.01;
        let nominal = settings.window_s * (0.5 + (offset_draw - 0.5) * settings.jitter);
        let source_offset = nominal.clamp(min_offset, settings.window_s.max(min_offset));

        grains.push(GrainSpec {
            onset,
            duration,
            source_offset,
            pitch_ratio,
            pan,
            amp,
            reverse,
        });
        onset += gap.max(0.0);
    }

    GrainSequence {
        grains,
        envelope: settings.envelope,
    }
}

/// Walks a grain batch in order.
#[derive(Debug, Clone, Default)]
pub struct GranularScheduler {
    cursor: usize,
}

impl GranularScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewinds for a new batch.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Returns the next grain if its onset is at or before `time`.
    pub fn schedule_next<'a>(
        &mut self,
        sequence: &'a GrainSequence,
        time: f64,
    ) -> Option<&'a GrainSpec> {
        let grain = sequence.grains.get(self.cursor)?;
        if grain.onset <= time {
            self.cursor += 1;
            Some(grain)
        } else {
            None
        }
    }

    /// Grains consumed so far.
    pub fn position(&self) -> usize {
        self.cursor
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ActiveGrain {
    active: bool,
    position: f64,
    step: f64,
    length: usize,
    age: usize,
    gain_left: f64,
    gain_right: f64,
}

/// Real-time grain player.
#[derive(Debug, Clone)]
pub struct Granulator {
    sample_rate: f64,
    capture: Vec<f64>,
    write: usize,
    grains: Vec<ActiveGrain>,
    scheduler: GranularScheduler,
    envelope: GrainEnvelope,
    dropped: u64,
}

impl Granulator {
    pub fn new(sample_rate: f64) -> Self {
        let len = (CAPTURE_SECONDS * sample_rate).ceil().max(2.0) as usize;
        Self {
            sample_rate,
            capture: vec![0.0; len],
            write: 0,
            grains: vec![ActiveGrain::default(); MAX_ACTIVE_GRAINS],
            scheduler: GranularScheduler::new(),
            envelope: GrainEnvelope::Hann,
            dropped: 0,
        }
    }

    /// Starts walking a new batch. Sounding grains play out.
    pub fn begin_sequence(&mut self, sequence: &GrainSequence) {
        self.scheduler.reset();
        self.envelope = sequence.envelope;
    }

    /// Grains skipped because the pool was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn active_grains(&self) -> usize {
        self.grains.iter().filter(|g| g.active).count()
    }

    /// Captures `input` and renders grains into `left` and `right`, overwriting them.
    ///
    /// `phrase_frame` is the phrase-relative frame of the first sample.
    pub fn process(
        &mut self,
        input: &[f64],
        sequence: Option<&GrainSequence>,
        phrase_frame: u64,
        left: &mut [f64],
        right: &mut [f64],
    ) {
        let frames = input.len().min(left.len()).min(right.len());
        let len = self.capture.len();
        for i in 0..frames {
            self.capture[self.write] = input[i];
            self.write = (self.write + 1) % len;

            if let Some(sequence) = sequence {
                let now = (phrase_frame + i as u64) as f64 / self.sample_rate;
                while let Some(spec) = self.scheduler.schedule_next(sequence, now) {
                    self.spawn(spec);
                }
            }

            let mut l = 0.0;
            let mut r = 0.0;
            for grain in self.grains.iter_mut().filter(|g| g.active) {
                let x = grain.age as f64 / grain.length as f64;
                let sample = read_interpolated(&self.capture, grain.position) * self.envelope.at(x);
                l += sample * grain.gain_left;
                r += sample * grain.gain_right;
                grain.position = (grain.position + grain.step).rem_euclid(len as f64);
                grain.age += 1;
                if grain.age >= grain.length {
                    grain.active = false;
                }
            }
            left[i] = l;
            right[i] = r;
        }
    }

    fn spawn(&mut self, spec: &GrainSpec) {
        let Some(slot) = self.grains.iter_mut().find(|g| !g.active) else {
            self.dropped += 1;
            return;
        };
        let len = self.capture.len() as f64;
        let length = ((spec.duration.max(MIN_GRAIN_SECONDS)) * self.sample_rate).max(2.0) as usize;
        let start = self.write as f64 - spec.source_offset * self.sample_rate;
        let angle = (spec.pan.clamp(-1.0, 1.0) + 1.0) * FRAC_PI_4;
        let gain = GRAIN_GAIN * spec.amp;
        *slot = ActiveGrain {
            active: true,
            position: start.rem_euclid(len),
            step: if spec.reverse {
                -spec.pitch_ratio
            } else {
                spec.pitch_ratio
            },
            length,
            age: 0,
            gain_left: gain * angle.cos(),
            gain_right: gain * angle.sin(),
        };
    }
}

#[inline]
fn read_interpolated(buffer: &[f64], position: f64) -> f64 {
    let len = buffer.len();
    let index = position.floor() as usize % len;
    let frac = position - position.floor();
    let a = buffer[index];
    let b = buffer[(index + 1) % len];
    a + (b - a) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 48_000.0;

    #[test]
    fn test_sequence_reproducible() {
        let settings = GranularSettings::default();
        let a = generate_sequence(&mut RngStream::new(99), 32, &settings);
        let b = generate_sequence(&mut RngStream::new(99), 32, &settings);
        assert_eq!(a, b);
        let c = generate_sequence(&mut RngStream::new(100), 32, &settings);
        assert_ne!(a, c);
    }

    #[test]
    fn test_eight_draws_per_grain() {
        let settings = GranularSettings::default();
        let mut a = RngStream::new(4);
        generate_sequence(&mut a, 10, &settings);
        let mut b = RngStream::new(4);
        for _ in 0..80 {
            b.next_u32();
        }
        assert_eq!(a, b);
    }

    #[test]
    fn test_onsets_ordered_and_durations_floored() {
        let settings = GranularSettings {
            size_min_s: 0.0,
            size_max_s: 0.001,
            ..GranularSettings::default()
        };
        let seq = generate_sequence(&mut RngStream::new(1), 64, &settings);
        assert!(seq.grains.windows(2).all(|w| w[0].onset <= w[1].onset));
        assert!(seq.grains.iter().all(|g| g.duration >= MIN_GRAIN_SECONDS));
    }

    #[test]
    fn test_offsets_stay_inside_capture() {
        let settings = GranularSettings {
            size_max_s: 4.0,
            window_s: 10.0,
            pitch_spread_cents: 100.0,
            octave_probability: 1.0,
            ..GranularSettings::default()
        };
        let seq = generate_sequence(&mut RngStream::new(2), 128, &settings);
        for g in &seq.grains {
            assert!(g.source_offset >= (g.pitch_ratio - 1.0).max(0.0) * g.duration);
            assert!(g.source_offset + g.pitch_ratio * g.duration < CAPTURE_SECONDS);
        }
    }

    #[test]
    fn test_batch_size() {
        let settings = GranularSettings {
            density: 6.0,
            ..GranularSettings::default()
        };
        assert_eq!(settings.batch_size(256), 96);
        assert_eq!(settings.batch_size(50), 50);
    }

    #[test]
    fn test_capped_batch_spans_phrase() {
        let settings = GranularSettings {
            density: 60.0,
            jitter: 0.0,
            ..GranularSettings::default()
        };
        let count = settings.batch_size(256);
        assert_eq!(count, 256);
        let seq = generate_sequence(&mut RngStream::new(5), count, &settings);
        let last = seq.grains.last().map_or(0.0, |g| g.onset);
        assert!(last >= PHRASE_SECONDS - 1.0, "last onset {last}");
        assert!(last < PHRASE_SECONDS);
    }

    #[test]
    fn test_uncapped_batch_keeps_density() {
        let settings = GranularSettings {
            density: 6.0,
            jitter: 0.0,
            ..GranularSettings::default()
        };
        let seq = generate_sequence(&mut RngStream::new(5), settings.batch_size(256), &settings);
        let gap = seq.grains[1].onset - seq.grains[0].onset;
        assert!((gap - 1.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_scheduler_consumes_in_order() {
        let seq = generate_sequence(&mut RngStream::new(3), 20, &GranularSettings::default());
        let mut scheduler = GranularScheduler::new();
        let mut seen = Vec::new();
        let mut t = 0.0;
        while t < 60.0 {
            while let Some(g) = scheduler.schedule_next(&seq, t) {
                seen.push(*g);
            }
            t += 0.01;
        }
        assert_eq!(seen, seq.grains);
        assert!(scheduler.schedule_next(&seq, 1e9).is_none());
    }

    #[test]
    fn test_envelopes_shape() {
        for env in [GrainEnvelope::Hann, GrainEnvelope::Triangle, GrainEnvelope::Tukey] {
            assert!(env.at(0.0).abs() < 1e-9);
            assert!((env.at(0.5) - 1.0).abs() < 1e-9);
            assert!(env.at(1.0).abs() < 1e-9);
        }
        assert_eq!(GrainEnvelope::Tukey.at(0.4), 1.0);
    }

    #[test]
    fn test_granulator_silent_without_sequence() {
        let mut gran = Granulator::new(SR);
        let input = vec![0.5; 512];
        let mut l = vec![1.0; 512];
        let mut r = vec![1.0; 512];
        gran.process(&input, None, 0, &mut l, &mut r);
        assert!(l.iter().chain(&r).all(|&s| s == 0.0));
    }

    #[test]
    fn test_granulator_plays_captured_signal() {
        let mut gran = Granulator::new(SR);
        let seq = generate_sequence(&mut RngStream::new(8), 32, &GranularSettings::default());
        gran.begin_sequence(&seq);
        let input: Vec<f64> = (0..512).map(|i| (i as f64 * 0.05).sin()).collect();
        let mut l = vec![0.0; 512];
        let mut r = vec![0.0; 512];
        let mut energy = 0.0;
        for block in 0..400u64 {
            gran.process(&input, Some(&seq), block * 512, &mut l, &mut r);
            energy += l.iter().map(|s| s * s).sum::<f64>();
        }
        assert!(energy > 0.0);
        assert!(l.iter().all(|s| s.is_finite()));
    }
}
