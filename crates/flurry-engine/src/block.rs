//! Stereo sample blocks.

/// A block of stereo output, non-interleaved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioBlock {
    pub left: Vec<f64>,
    pub right: Vec<f64>,
}

impl AudioBlock {
    /// Creates a silent block of `frames` frames.
    pub fn silence(frames: usize) -> Self {
        Self {
            left: vec![0.0; frames],
            right: vec![0.0; frames],
        }
    }

    pub fn frames(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    /// Resizes to `frames`, zeroing the contents.
    pub fn reset(&mut self, frames: usize) {
        self.left.clear();
        self.left.resize(frames, 0.0);
        self.right.clear();
        self.right.resize(frames, 0.0);
    }

    /// Mutable views of both channels.
    pub fn channels_mut(&mut self) -> (&mut [f64], &mut [f64]) {
        (&mut self.left, &mut self.right)
    }

    /// Peak absolute sample across both channels.
    pub fn peak(&self) -> f64 {
        self.left
            .iter()
            .chain(&self.right)
            .fold(0.0, |peak, s| peak.max(s.abs()))
    }

    /// Interleaved `[l, r, l, r, ...]` samples.
    pub fn interleaved(&self) -> impl Iterator<Item = f64> + '_ {
        self.left
            .iter()
            .zip(&self.right)
            .flat_map(|(&l, &r)| [l, r])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_and_reset() {
        let mut block = AudioBlock::silence(4);
        assert_eq!(block.frames(), 4);
        block.left[0] = 0.5;
        block.right[1] = -0.75;
        assert_eq!(block.peak(), 0.75);
        block.reset(2);
        assert_eq!(block.frames(), 2);
        assert_eq!(block.peak(), 0.0);
    }

    #[test]
    fn test_interleaved() {
        let block = AudioBlock {
            left: vec![1.0, 2.0],
            right: vec![-1.0, -2.0],
        };
        let samples: Vec<f64> = block.interleaved().collect();
        assert_eq!(samples, vec![1.0, -1.0, 2.0, -2.0]);
    }
}
