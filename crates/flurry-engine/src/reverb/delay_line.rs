//! Ring-buffer delay line.

/// A ring buffer with integer and interpolated reads.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f64>,
    write_pos: usize,
}

impl DelayLine {
    /// Creates a delay line holding up to `max_samples` samples.
    pub fn new(max_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; max_samples.max(4)],
            write_pos: 0,
        }
    }

    /// Longest delay that can be read back.
    pub fn capacity(&self) -> usize {
        self.buffer.len() - 1
    }

    /// Writes a sample and advances the write position.
    #[inline]
    pub fn write(&mut self, sample: f64) {
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
    }

    /// Reads the sample written `delay_samples` writes ago (1 = most recent).
    #[inline]
    pub fn read(&self, delay_samples: usize) -> f64 {
        let len = self.buffer.len();
        let delay = delay_samples.min(len);
        self.buffer[(self.write_pos + len - delay) % len]
    }

    /// Reads at a fractional delay with linear interpolation.
    #[inline]
    pub fn read_interpolated(&self, delay_samples: f64) -> f64 {
        let delay = delay_samples.clamp(0.0, (self.capacity() - 1) as f64);
        let whole = delay.floor() as usize;
        let frac = delay - whole as f64;
        self.read(whole) * (1.0 - frac) + self.read(whole + 1) * frac
    }

    /// Reads at `delay_samples` before writing `input`, returning the delayed sample.
    ///
    /// A delay of zero passes `input` straight through.
    #[inline]
    pub fn process(&mut self, input: f64, delay_samples: f64) -> f64 {
        self.write(input);
        self.read_interpolated(delay_samples.max(0.0) + 1.0)
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}
