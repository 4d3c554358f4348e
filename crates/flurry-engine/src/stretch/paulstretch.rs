//! Offline Paulstretch rendering.
//!
//! Each analysis frame keeps its magnitude spectrum and gets a fresh phase
//! per bin drawn from a seeded stream, then is overlap-added at a wider hop.
//! The output is a pure function of the source, the settings and the phase
//! seed.

use std::f64::consts::{PI, TAU};

use flurry_params::{ParameterState, Seed};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::rng::RngStream;

/// Mixed into the phase seed for the right channel.
const RIGHT_CHANNEL_SALT: u32 = 0x9E37_79B9;

const MIN_WINDOW: usize = 256;
const MAX_WINDOW: usize = 1 << 17;

/// Peak level of a rendered bed.
const OUTPUT_PEAK: f64 = 0.5;

/// Stretch section of the parameter state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StretchSettings {
    pub factor: f64,
    pub window_s: f64,
    pub source_s: f64,
    pub lowpass_hz: f64,
    pub fade_s: f64,
    pub octave: i32,
    pub loop_crossfade_s: f64,
}

impl StretchSettings {
    pub fn from_params(params: &ParameterState) -> Self {
        Self {
            factor: params.stretch_factor,
            window_s: params.stretch_window_s,
            source_s: params.stretch_source_s,
            lowpass_hz: params.stretch_lowpass_hz,
            fade_s: params.stretch_fade_s,
            octave: params.stretch_octave.round().clamp(-2.0, 1.0) as i32,
            loop_crossfade_s: params.stretch_loop_crossfade_s,
        }
    }

    /// Analysis window length in samples (a power of two).
    pub fn window_samples(&self, sample_rate: f64) -> usize {
        let wanted = (self.window_s * sample_rate).max(1.0) as usize;
        wanted.next_power_of_two().clamp(MIN_WINDOW, MAX_WINDOW)
    }
}

impl Default for StretchSettings {
    fn default() -> Self {
        Self::from_params(&ParameterState::default())
    }
}

/// A rendered, loopable stretch bed.
#[derive(Debug, Clone, PartialEq)]
pub struct StretchBuffer {
    pub left: Vec<f64>,
    pub right: Vec<f64>,
    pub sample_rate: f64,
    pub phase_seed: Seed,
}

impl StretchBuffer {
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.left.len() as f64 / self.sample_rate
    }
}

/// Renders a stretch bed. Never cancels.
pub fn render(
    source: &[f64],
    sample_rate: f64,
    settings: &StretchSettings,
    phase_seed: Seed,
) -> StretchBuffer {
    match render_cancellable(source, sample_rate, settings, phase_seed, || false) {
        Some(buffer) => buffer,
        None => StretchBuffer {
            left: Vec::new(),
            right: Vec::new(),
            sample_rate,
            phase_seed,
        },
    }
}

/// Renders a stretch bed, polling `should_cancel` once per frame.
///
/// Returns `None` if cancelled.
pub fn render_cancellable(
    source: &[f64],
    sample_rate: f64,
    settings: &StretchSettings,
    phase_seed: Seed,
    should_cancel: impl Fn() -> bool,
) -> Option<StretchBuffer> {
    let window = settings.window_samples(sample_rate);
    let factor = settings.factor.max(1.0);
    let out_len = ((source.len() as f64 * factor).ceil() as usize).max(window);

    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(window);
    let inverse = planner.plan_fft_inverse(window);
    let hann: Vec<f64> = (0..window).map(|i| hann_window(i, window)).collect();
    let cutoff_bin = ((settings.lowpass_hz / sample_rate) * window as f64).ceil() as usize;

    let mut channels = [Vec::new(), Vec::new()];
    for (channel, seed) in [phase_seed, phase_seed ^ RIGHT_CHANNEL_SALT]
        .into_iter()
        .enumerate()
    {
        let mut rng = RngStream::new(seed);
        let mut output = vec![0.0; out_len + window];
        let hop_out = window / 4;
        let hop_in = hop_out as f64 / factor;
        let mut spectrum = vec![Complex::new(0.0, 0.0); window];

        let mut frame = 0usize;
        while frame * hop_out < out_len {
            if should_cancel() {
                return None;
            }
            let start = (frame as f64 * hop_in) as usize;
            for (i, bin) in spectrum.iter_mut().enumerate() {
                let sample = source.get(start + i).copied().unwrap_or(0.0);
                *bin = Complex::new(sample * hann[i], 0.0);
            }
            forward.process(&mut spectrum);

            let half = window / 2;
            for bin in 0..=half {
                let magnitude = if bin > cutoff_bin {
                    0.0
                } else {
                    spectrum[bin].norm()
                };
                let phase = if bin == 0 || bin == half {
                    0.0
                } else {
                    rng.next_float() * TAU
                };
                spectrum[bin] = Complex::from_polar(magnitude, phase);
                if bin != 0 && bin != half {
                    spectrum[window - bin] = spectrum[bin].conj();
                }
            }
            inverse.process(&mut spectrum);

            let offset = frame * hop_out;
            let scale = 1.0 / window as f64;
            for (i, bin) in spectrum.iter().enumerate() {
                output[offset + i] += bin.re * scale * hann[i];
            }
            frame += 1;
        }

        output.truncate(out_len);
        channels[channel] = output;
    }

    let [mut left, mut right] = channels;
    let crossfade = ((settings.loop_crossfade_s * sample_rate) as usize).min(out_len / 2);
    loop_crossfade(&mut left, crossfade);
    loop_crossfade(&mut right, crossfade);
    normalize(&mut left, &mut right);

    Some(StretchBuffer {
        left,
        right,
        sample_rate,
        phase_seed,
    })
}

/// Folds the last `crossfade` samples into the head so the buffer loops
/// without a seam, then drops the tail.
fn loop_crossfade(buffer: &mut Vec<f64>, crossfade: usize) {
    if crossfade == 0 || crossfade * 2 > buffer.len() {
        return;
    }
    let tail_start = buffer.len() - crossfade;
    for i in 0..crossfade {
        let x = i as f64 / crossfade as f64;
        let head = buffer[i] * (x * PI / 2.0).sin();
        let tail = buffer[tail_start + i] * (x * PI / 2.0).cos();
        buffer[i] = head + tail;
    }
    buffer.truncate(tail_start);
}

fn normalize(left: &mut [f64], right: &mut [f64]) {
    let peak = left
        .iter()
        .chain(right.iter())
        .fold(0.0f64, |m, s| m.max(s.abs()));
    if peak > 0.0 {
        let gain = OUTPUT_PEAK / peak;
        for s in left.iter_mut().chain(right.iter_mut()) {
            *s *= gain;
        }
    }
}

/// Hann window value.
#[inline]
fn hann_window(i: usize, size: usize) -> f64 {
    0.5 * (1.0 - (2.0 * PI * i as f64 / size as f64).cos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    const SR: f64 = 8_000.0;

    fn source() -> Vec<f64> {
        (0..4000)
            .map(|i| (i as f64 * TAU * 220.0 / SR).sin() * 0.5)
            .collect()
    }

    fn settings() -> StretchSettings {
        StretchSettings {
            factor: 4.0,
            window_s: 0.05,
            loop_crossfade_s: 0.1,
            ..StretchSettings::default()
        }
    }

    #[test]
    fn test_render_is_deterministic() {
        let a = render(&source(), SR, &settings(), 1234);
        let b = render(&source(), SR, &settings(), 1234);
        assert_eq!(a, b);
    }

    #[test]
    fn test_phase_seed_changes_output() {
        let a = render(&source(), SR, &settings(), 1);
        let b = render(&source(), SR, &settings(), 2);
        assert_ne!(a.left, b.left);
    }

    #[test]
    fn test_output_length_and_level() {
        let buffer = render(&source(), SR, &settings(), 7);
        let crossfade = (0.1 * SR) as usize;
        assert_eq!(buffer.len(), 16_000 - crossfade);
        assert_eq!(buffer.left.len(), buffer.right.len());
        let peak = buffer
            .left
            .iter()
            .chain(&buffer.right)
            .fold(0.0f64, |m, s| m.max(s.abs()));
        assert!((peak - OUTPUT_PEAK).abs() < 1e-9);
    }

    #[test]
    fn test_channels_decorrelated() {
        let buffer = render(&source(), SR, &settings(), 7);
        assert_ne!(buffer.left, buffer.right);
    }

    #[test]
    fn test_cancel_returns_none() {
        let polls = Cell::new(0);
        let result = render_cancellable(&source(), SR, &settings(), 3, || {
            polls.set(polls.get() + 1);
            polls.get() > 2
        });
        assert!(result.is_none());
        assert_eq!(polls.get(), 3);
    }

    #[test]
    fn test_window_is_power_of_two() {
        let s = StretchSettings {
            window_s: 0.25,
            ..StretchSettings::default()
        };
        assert_eq!(s.window_samples(48_000.0), 16_384);
        let tiny = StretchSettings {
            window_s: 0.001,
            ..StretchSettings::default()
        };
        assert_eq!(tiny.window_samples(48_000.0), MIN_WINDOW);
    }

    #[test]
    fn test_silent_source_stays_silent() {
        let buffer = render(&vec![0.0; 2000], SR, &settings(), 9);
        assert!(buffer.left.iter().all(|&s| s == 0.0));
    }
}
