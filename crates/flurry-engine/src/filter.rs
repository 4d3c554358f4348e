//! Filters used across the signal chain.
//!
//! Biquad coefficients follow the Audio EQ Cookbook. All filters update
//! coefficients in place without clearing state, so cutoff changes between
//! blocks never click.

use std::f64::consts::PI;

/// Biquad filter coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoeffs {
    /// Creates lowpass filter coefficients.
    ///
    /// # Arguments
    /// * `cutoff` - Cutoff frequency in Hz (clamped below Nyquist)
    /// * `q` - Q factor, 0.707 is Butterworth
    /// * `sample_rate` - Audio sample rate in Hz
    pub fn lowpass(cutoff: f64, q: f64, sample_rate: f64) -> Self {
        let q = q.max(0.5);
        let omega = 2.0 * PI * clamp_cutoff(cutoff, sample_rate) / sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);

        let b0 = (1.0 - cos_omega) / 2.0;
        let b1 = 1.0 - cos_omega;
        let b2 = (1.0 - cos_omega) / 2.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Creates highpass filter coefficients.
    pub fn highpass(cutoff: f64, q: f64, sample_rate: f64) -> Self {
        let q = q.max(0.5);
        let omega = 2.0 * PI * clamp_cutoff(cutoff, sample_rate) / sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);

        let b0 = (1.0 + cos_omega) / 2.0;
        let b1 = -(1.0 + cos_omega);
        let b2 = (1.0 + cos_omega) / 2.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

fn clamp_cutoff(cutoff: f64, sample_rate: f64) -> f64 {
    cutoff.clamp(10.0, sample_rate * 0.45)
}

/// Biquad filter state.
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    coeffs: BiquadCoeffs,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadFilter {
    /// Creates a new biquad filter with the given coefficients.
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    pub fn lowpass(cutoff: f64, q: f64, sample_rate: f64) -> Self {
        Self::new(BiquadCoeffs::lowpass(cutoff, q, sample_rate))
    }

    pub fn highpass(cutoff: f64, q: f64, sample_rate: f64) -> Self {
        Self::new(BiquadCoeffs::highpass(cutoff, q, sample_rate))
    }

    /// Updates the coefficients, keeping the delay state.
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }

    /// Processes a single sample through the filter.
    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let output = self.coeffs.b0 * input + self.coeffs.b1 * self.x1 + self.coeffs.b2 * self.x2
            - self.coeffs.a1 * self.y1
            - self.coeffs.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }

    /// Processes a buffer of samples in place.
    pub fn process_buffer(&mut self, buffer: &mut [f64]) {
        for sample in buffer.iter_mut() {
            *sample = self.process(*sample);
        }
    }
}

/// One-pole lowpass filter (simple RC filter).
#[derive(Debug, Clone)]
pub struct OnePoleFilter {
    a0: f64,
    b1: f64,
    y1: f64,
}

impl OnePoleFilter {
    /// Creates a new one-pole lowpass filter.
    pub fn new(cutoff: f64, sample_rate: f64) -> Self {
        let mut filter = Self {
            a0: 1.0,
            b1: 0.0,
            y1: 0.0,
        };
        filter.set_cutoff(cutoff, sample_rate);
        filter
    }

    pub fn set_cutoff(&mut self, cutoff: f64, sample_rate: f64) {
        let b1 = (-2.0 * PI * cutoff.max(0.0) / sample_rate).exp();
        self.a0 = 1.0 - b1;
        self.b1 = b1;
    }

    pub fn reset(&mut self) {
        self.y1 = 0.0;
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        self.y1 = self.a0 * input + self.b1 * self.y1;
        self.y1
    }
}

/// DC blocker filter.
#[derive(Debug, Clone)]
pub struct DcBlocker {
    x1: f64,
    y1: f64,
    r: f64,
}

impl DcBlocker {
    /// Creates a new DC blocker.
    ///
    /// # Arguments
    /// * `r` - Pole radius, typically 0.995 to 0.999. Higher values = lower cutoff.
    pub fn new(r: f64) -> Self {
        Self { x1: 0.0, y1: 0.0, r }
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let output = input - self.x1 + self.r * self.y1;
        self.x1 = input;
        self.y1 = output;
        output
    }
}

impl Default for DcBlocker {
    fn default() -> Self {
        Self::new(0.995)
    }
}

/// Maps brightness (0..1) to a lowpass cutoff, 200 Hz .. 12 kHz exponentially.
pub fn brightness_to_cutoff(brightness: f64) -> f64 {
    200.0 * 60.0_f64.powf(brightness.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowpass_filter() {
        let mut filter = BiquadFilter::lowpass(1000.0, 0.707, 44100.0);

        let mut output = Vec::new();
        for _ in 0..100 {
            output.push(filter.process(1.0));
        }

        // Lowpass passes DC
        assert!((output[99] - 1.0).abs() < 0.1);
    }

    #[test]
    fn test_highpass_filter() {
        let mut filter = BiquadFilter::highpass(1000.0, 0.707, 44100.0);

        let mut output = Vec::new();
        for _ in 0..1000 {
            output.push(filter.process(1.0));
        }

        assert!(output[999].abs() < 0.1);
    }

    #[test]
    fn test_cutoff_above_nyquist_is_stable() {
        let mut filter = BiquadFilter::lowpass(40_000.0, 0.707, 44100.0);
        for i in 0..1000 {
            let out = filter.process(if i % 2 == 0 { 1.0 } else { -1.0 });
            assert!(out.is_finite());
        }
    }

    #[test]
    fn test_set_coeffs_keeps_state() {
        let mut filter = BiquadFilter::lowpass(500.0, 0.707, 48000.0);
        for _ in 0..500 {
            filter.process(1.0);
        }
        filter.set_coeffs(BiquadCoeffs::lowpass(800.0, 0.707, 48000.0));
        let next = filter.process(1.0);
        assert!((next - 1.0).abs() < 0.05);
    }

    #[test]
    fn test_one_pole_filter() {
        let mut filter = OnePoleFilter::new(100.0, 44100.0);

        let mut output = Vec::new();
        for _ in 0..1000 {
            output.push(filter.process(1.0));
        }

        assert!((output[999] - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_dc_blocker() {
        let mut blocker = DcBlocker::default();

        let mut last = 0.0;
        for _ in 0..10000 {
            last = blocker.process(0.5);
        }

        assert!(last.abs() < 0.01);
    }

    #[test]
    fn test_brightness_mapping() {
        assert!((brightness_to_cutoff(0.0) - 200.0).abs() < 1e-9);
        assert!((brightness_to_cutoff(1.0) - 12_000.0).abs() < 1e-6);
    }
}
