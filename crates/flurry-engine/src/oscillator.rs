//! Basic waveform generators.
//!
//! Phases are normalized to `[0, 1)`. The sawtooth is band-limited with
//! PolyBLEP so high voices do not alias.

use std::f64::consts::TAU;

/// Normalized phase accumulator.
#[derive(Debug, Clone)]
pub struct PhaseAccumulator {
    phase: f64,
    sample_rate: f64,
}

impl PhaseAccumulator {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            phase: 0.0,
            sample_rate,
        }
    }

    /// Starts at the given phase instead of zero.
    pub fn with_phase(sample_rate: f64, phase: f64) -> Self {
        Self {
            phase: phase.rem_euclid(1.0),
            sample_rate,
        }
    }

    /// Returns the current phase and advances by one sample at `frequency`.
    #[inline]
    pub fn advance(&mut self, frequency: f64) -> f64 {
        let current = self.phase;
        self.phase += frequency / self.sample_rate;
        if self.phase >= 1.0 {
            self.phase -= self.phase.floor();
        }
        current
    }

    /// Phase increment per sample at `frequency`.
    #[inline]
    pub fn increment(&self, frequency: f64) -> f64 {
        frequency / self.sample_rate
    }

    pub fn phase(&self) -> f64 {
        self.phase
    }
}

/// Sine of a normalized phase.
#[inline]
pub fn sine(phase: f64) -> f64 {
    (phase * TAU).sin()
}

/// Naive triangle of a normalized phase.
#[inline]
pub fn triangle(phase: f64) -> f64 {
    if phase < 0.5 {
        4.0 * phase - 1.0
    } else {
        3.0 - 4.0 * phase
    }
}

/// PolyBLEP residual for a discontinuity at phase 0.
#[inline]
fn polyblep(phase: f64, dt: f64) -> f64 {
    if dt <= 0.0 {
        return 0.0;
    }
    if phase < dt {
        let t = phase / dt;
        t + t - t * t - 1.0
    } else if phase > 1.0 - dt {
        let t = (phase - 1.0) / dt;
        t * t + t + t + 1.0
    } else {
        0.0
    }
}

/// Band-limited sawtooth.
#[inline]
pub fn polyblep_saw(phase: f64, dt: f64) -> f64 {
    (2.0 * phase - 1.0) - polyblep(phase, dt)
}

/// Converts a MIDI note number to frequency in Hz.
#[inline]
pub fn midi_to_freq(note: f64) -> f64 {
    440.0 * 2.0_f64.powf((note - 69.0) / 12.0)
}

/// Converts cents to a frequency ratio.
#[inline]
pub fn cents_to_ratio(cents: f64) -> f64 {
    2.0_f64.powf(cents / 1200.0)
}

/// Soft-saturating waveshaper. `drive` of 1 is nearly linear for small signals.
#[inline]
pub fn saturate(input: f64, drive: f64) -> f64 {
    let drive = drive.max(1.0);
    (input * drive).tanh() / drive.tanh()
}
