//! One-pole parameter smoothing.
//!
//! Every gain and mix value the control side changes reaches the signal
//! through a [`Smoothed`], so a stepped slider becomes a short exponential
//! glide instead of a click.

/// A value that glides toward its target.
#[derive(Debug, Clone)]
pub struct Smoothed {
    target: f64,
    current: f64,
    /// 0.0 = instant, closer to 1.0 = slower.
    coeff: f64,
}

impl Smoothed {
    pub fn new(value: f64) -> Self {
        Self {
            target: value,
            current: value,
            coeff: 0.0,
        }
    }

    /// Sets the time constant: after `ms` milliseconds the value has covered ~63% of the gap.
    pub fn with_time_ms(mut self, ms: f64, sample_rate: f64) -> Self {
        self.set_time_ms(ms, sample_rate);
        self
    }

    pub fn set_time_ms(&mut self, ms: f64, sample_rate: f64) {
        let samples = (ms / 1000.0) * sample_rate;
        self.coeff = if samples > 0.0 {
            (-1.0 / samples).exp()
        } else {
            0.0
        };
    }

    pub fn set_target(&mut self, target: f64) {
        self.target = target;
    }

    /// Jumps straight to `value`.
    pub fn snap(&mut self, value: f64) {
        self.target = value;
        self.current = value;
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    /// Advances one sample.
    #[inline]
    pub fn next_value(&mut self) -> f64 {
        self.current = self.target + self.coeff * (self.current - self.target);
        self.current
    }
}
