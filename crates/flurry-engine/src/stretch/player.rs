//! Real-time playback of the stretch bed.
//!
//! Plays the installed buffer in a loop. A new buffer fades in over the old
//! one, or over silence when it is the first. With no buffer the player outputs silence and counts the shortfall;
//! it never waits.

use std::f64::consts::FRAC_PI_2;

use super::paulstretch::StretchBuffer;

#[derive(Debug)]
struct Playing {
    buffer: Box<StretchBuffer>,
    position: usize,
}

impl Playing {
    #[inline]
    fn next(&mut self) -> (f64, f64) {
        let len = self.buffer.len();
        if len == 0 {
            return (0.0, 0.0);
        }
        let frame = (self.buffer.left[self.position], self.buffer.right[self.position]);
        self.position += 1;
        if self.position >= len {
            self.position = 0;
        }
        frame
    }
}

/// Loops the current stretch bed.
#[derive(Debug)]
pub struct StretchPlayer {
    sample_rate: f64,
    current: Option<Playing>,
    previous: Option<Playing>,
    fade_position: usize,
    fade_length: usize,
    underruns: u64,
}

impl StretchPlayer {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            current: None,
            previous: None,
            fade_position: 0,
            fade_length: 0,
            underruns: 0,
        }
    }

    /// True once a bed has been installed.
    pub fn is_ready(&self) -> bool {
        self.current.is_some()
    }

    /// Blocks rendered while no bed was installed.
    pub fn underruns(&self) -> u64 {
        self.underruns
    }

    /// Installs a new bed, fading from the current one (or from silence) over
    /// `fade_s`.
    ///
    /// Returns a buffer that left the player (a bed still fading out when the
    /// next one arrived) so the caller can free it elsewhere.
    pub fn install(&mut self, buffer: Box<StretchBuffer>, fade_s: f64) -> Option<Box<StretchBuffer>> {
        let incoming = Playing {
            buffer,
            position: 0,
        };
        let outgoing = self.current.replace(incoming);
        let retired = match outgoing {
            Some(old) => self.previous.replace(old).map(|p| p.buffer),
            None => None,
        };
        self.fade_position = 0;
        self.fade_length = (fade_s.max(0.0) * self.sample_rate) as usize;
        retired
    }

    /// Renders into `left` and `right`, overwriting them.
    ///
    /// Returns the faded-out buffer once a crossfade completes.
    pub fn render(&mut self, left: &mut [f64], right: &mut [f64]) -> Option<Box<StretchBuffer>> {
        let frames = left.len().min(right.len());
        let Some(current) = self.current.as_mut() else {
            left[..frames].fill(0.0);
            right[..frames].fill(0.0);
            if frames > 0 {
                self.underruns += 1;
            }
            return None;
        };

        let mut retired = None;
        for i in 0..frames {
            let (mut l, mut r) = current.next();
            if self.fade_position < self.fade_length {
                let x = self.fade_position as f64 / self.fade_length as f64;
                let (pl, pr) = self.previous.as_mut().map_or((0.0, 0.0), Playing::next);
                let gain_in = (x * FRAC_PI_2).sin();
                let gain_out = (x * FRAC_PI_2).cos();
                l = l * gain_in + pl * gain_out;
                r = r * gain_in + pr * gain_out;
                self.fade_position += 1;
            }
            if self.fade_position >= self.fade_length && self.previous.is_some() {
                retired = self.previous.take().map(|p| p.buffer);
            }
            left[i] = l;
            right[i] = r;
        }
        retired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bed(value: f64, len: usize) -> Box<StretchBuffer> {
        Box::new(StretchBuffer {
            left: vec![value; len],
            right: vec![value; len],
            sample_rate: 1000.0,
            phase_seed: 0,
        })
    }

    #[test]
    fn test_silence_until_ready() {
        let mut player = StretchPlayer::new(1000.0);
        let mut l = vec![1.0; 64];
        let mut r = vec![1.0; 64];
        player.render(&mut l, &mut r);
        assert!(l.iter().chain(&r).all(|&s| s == 0.0));
        assert_eq!(player.underruns(), 1);
        assert!(!player.is_ready());
    }

    #[test]
    fn test_loops_buffer() {
        let mut player = StretchPlayer::new(1000.0);
        let buffer = Box::new(StretchBuffer {
            left: vec![1.0, 2.0, 3.0],
            right: vec![-1.0, -2.0, -3.0],
            sample_rate: 1000.0,
            phase_seed: 0,
        });
        assert!(player.install(buffer, 0.0).is_none());
        let mut l = vec![0.0; 7];
        let mut r = vec![0.0; 7];
        player.render(&mut l, &mut r);
        assert_eq!(l, vec![1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 1.0]);
        assert_eq!(r[1], -2.0);
        assert_eq!(player.underruns(), 0);
    }

    #[test]
    fn test_crossfade_between_beds() {
        let mut player = StretchPlayer::new(1000.0);
        player.install(bed(1.0, 100), 0.0);
        assert!(player.install(bed(0.0, 100), 0.01).is_none());

        let mut l = vec![0.0; 20];
        let mut r = vec![0.0; 20];
        let retired = player.render(&mut l, &mut r);
        assert!((l[0] - 1.0).abs() < 1e-9);
        assert!(l.windows(2).take(10).all(|w| w[1] <= w[0] + 1e-12));
        assert_eq!(l[19], 0.0);
        assert_eq!(retired.map(|b| b.left[0]), Some(1.0));
    }

    #[test]
    fn test_first_bed_fades_in_from_silence() {
        let mut player = StretchPlayer::new(1000.0);
        assert!(player.install(bed(0.5, 100), 0.05).is_none());

        let mut l = vec![0.0; 80];
        let mut r = vec![0.0; 80];
        assert!(player.render(&mut l, &mut r).is_none());
        assert_eq!(l[0], 0.0);
        assert!(l[1] > 0.0 && l[1] < 0.05);
        assert!(l.windows(2).take(50).all(|w| w[1] >= w[0]));
        assert_eq!(l[50], 0.5);
        assert_eq!(r[79], 0.5);
    }

    #[test]
    fn test_install_mid_fade_retires_oldest() {
        let mut player = StretchPlayer::new(1000.0);
        player.install(bed(1.0, 10), 0.0);
        player.install(bed(2.0, 10), 1.0);
        let retired = player.install(bed(3.0, 10), 1.0);
        assert_eq!(retired.map(|b| b.left[0]), Some(1.0));
    }
}
