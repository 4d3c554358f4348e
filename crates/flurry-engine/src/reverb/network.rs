//! Comb/allpass reverb network with smoothed controls and topology crossfades.
//!
//! A [`TapBank`] is one built topology: parallel damped feedback combs into
//! serial allpass diffusers, per channel. Building a bank allocates, so the
//! control side builds it and hands it to the audio side, which fades the old
//! bank out and the new one in.

use std::f64::consts::FRAC_PI_2;

use flurry_params::ParameterState;

use super::delay_line::DelayLine;
use super::presets::ReverbPreset;
use crate::smoother::Smoothed;

/// Extra delay on right-channel taps, in milliseconds.
const STEREO_SPREAD_MS: f64 = 0.52;

/// Wet output gain summed over all combs.
const WET_GAIN: f64 = 0.36;

/// Longest predelay the network can hold.
const MAX_PREDELAY_MS: f64 = 250.0;

/// Comb filter with a one-pole lowpass in the feedback path.
#[derive(Debug, Clone)]
struct CombFilter {
    buffer: Vec<f64>,
    index: usize,
    store: f64,
    feedback: f64,
}

impl CombFilter {
    fn new(size: usize, feedback: f64) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
            store: 0.0,
            feedback,
        }
    }

    #[inline]
    fn process(&mut self, input: f64, feedback_scale: f64, damping: f64) -> f64 {
        let output = self.buffer[self.index];
        self.store = output * (1.0 - damping) + self.store * damping;
        self.buffer[self.index] = input + self.store * (self.feedback * feedback_scale).min(0.98);
        self.index += 1;
        if self.index >= self.buffer.len() {
            self.index = 0;
        }
        output
    }
}

/// Schroeder allpass diffuser.
#[derive(Debug, Clone)]
struct AllpassFilter {
    buffer: Vec<f64>,
    index: usize,
}

impl AllpassFilter {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            index: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f64) -> f64 {
        let buffered = self.buffer[self.index];
        let output = buffered - input;
        self.buffer[self.index] = input + buffered * 0.5;
        self.index += 1;
        if self.index >= self.buffer.len() {
            self.index = 0;
        }
        output
    }
}

/// One built topology.
#[derive(Debug, Clone)]
pub struct TapBank {
    preset: ReverbPreset,
    size: f64,
    combs_left: Vec<CombFilter>,
    combs_right: Vec<CombFilter>,
    allpasses_left: Vec<AllpassFilter>,
    allpasses_right: Vec<AllpassFilter>,
    damping: f64,
    wet_gain: f64,
}

impl TapBank {
    /// Builds a bank for `preset` with delays scaled by `size`.
    pub fn new(preset: ReverbPreset, size: f64, sample_rate: f64) -> Self {
        let table = preset.table();
        let to_samples = |ms: f64| ((ms / 1000.0) * sample_rate).round().max(1.0) as usize;
        let spread = STEREO_SPREAD_MS;

        Self {
            preset,
            size,
            combs_left: table
                .combs
                .iter()
                .map(|t| CombFilter::new(to_samples(t.delay_ms * size), t.feedback))
                .collect(),
            combs_right: table
                .combs
                .iter()
                .map(|t| CombFilter::new(to_samples(t.delay_ms * size + spread), t.feedback))
                .collect(),
            allpasses_left: table
                .allpasses_ms
                .iter()
                .map(|&ms| AllpassFilter::new(to_samples(ms)))
                .collect(),
            allpasses_right: table
                .allpasses_ms
                .iter()
                .map(|&ms| AllpassFilter::new(to_samples(ms + spread)))
                .collect(),
            damping: table.damping,
            wet_gain: WET_GAIN / table.combs.len().max(1) as f64,
        }
    }

    pub fn preset(&self) -> ReverbPreset {
        self.preset
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    /// Processes one mono input sample into a wet stereo pair.
    #[inline]
    fn process(&mut self, input: f64, feedback_scale: f64, extra_damping: f64) -> (f64, f64) {
        let damping = self.damping + (1.0 - self.damping) * extra_damping * 0.6;
        let input = input * self.wet_gain;

        let mut left = 0.0;
        for comb in &mut self.combs_left {
            left += comb.process(input, feedback_scale, damping);
        }
        let mut right = 0.0;
        for comb in &mut self.combs_right {
            right += comb.process(input, feedback_scale, damping);
        }
        for allpass in &mut self.allpasses_left {
            left = allpass.process(left);
        }
        for allpass in &mut self.allpasses_right {
            right = allpass.process(right);
        }
        (left, right)
    }
}

/// Control values for the network.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReverbSettings {
    pub preset: ReverbPreset,
    pub size: f64,
    pub decay: f64,
    pub damping: f64,
    pub width: f64,
    pub predelay_ms: f64,
    pub smoothing_ms: f64,
    pub crossfade_ms: f64,
}

impl ReverbSettings {
    pub fn from_params(params: &ParameterState) -> Self {
        Self {
            preset: ReverbPreset::from_index(params.reverb_preset_index()),
            size: params.reverb_size,
            decay: params.reverb_decay,
            damping: params.reverb_damping,
            width: params.reverb_width,
            predelay_ms: params.reverb_predelay_ms,
            smoothing_ms: params.mix_smoothing_ms,
            crossfade_ms: params.preset_crossfade_ms,
        }
    }

    /// True if `other` needs a different tap bank.
    pub fn topology_differs(&self, other: &ReverbSettings) -> bool {
        self.preset != other.preset || self.size != other.size
    }

    /// Multiplier on the preset feedback coefficients.
    pub fn feedback_scale(&self) -> f64 {
        0.6 + 0.45 * self.decay.clamp(0.0, 1.0)
    }
}

impl Default for ReverbSettings {
    fn default() -> Self {
        Self::from_params(&ParameterState::default())
    }
}

/// Stereo reverb with smoothed mix, feedback and predelay.
#[derive(Debug)]
pub struct ReverbNetwork {
    sample_rate: f64,
    settings: ReverbSettings,
    current: Box<TapBank>,
    fading: Option<Box<TapBank>>,
    fade_position: usize,
    fade_length: usize,
    mix: Smoothed,
    feedback: Smoothed,
    damping: Smoothed,
    width: Smoothed,
    predelay: Smoothed,
    predelay_line: DelayLine,
}

impl ReverbNetwork {
    pub fn new(sample_rate: f64, settings: ReverbSettings, mix: f64) -> Self {
        let bank = Box::new(TapBank::new(settings.preset, settings.size, sample_rate));
        Self::with_bank(sample_rate, settings, mix, bank)
    }

    /// Builds the network around an already-built bank.
    pub fn with_bank(
        sample_rate: f64,
        settings: ReverbSettings,
        mix: f64,
        bank: Box<TapBank>,
    ) -> Self {
        let ms = settings.smoothing_ms;
        let max_predelay = ((MAX_PREDELAY_MS / 1000.0) * sample_rate).ceil() as usize + 4;
        Self {
            sample_rate,
            settings,
            current: bank,
            fading: None,
            fade_position: 0,
            fade_length: 0,
            mix: Smoothed::new(mix).with_time_ms(ms, sample_rate),
            feedback: Smoothed::new(settings.feedback_scale()).with_time_ms(ms, sample_rate),
            damping: Smoothed::new(settings.damping).with_time_ms(ms, sample_rate),
            width: Smoothed::new(settings.width).with_time_ms(ms, sample_rate),
            predelay: Smoothed::new(ms_to_samples(settings.predelay_ms, sample_rate))
                .with_time_ms(ms, sample_rate),
            predelay_line: DelayLine::new(max_predelay),
        }
    }

    pub fn settings(&self) -> &ReverbSettings {
        &self.settings
    }

    /// Preset of the bank fading in (or fully in).
    pub fn preset(&self) -> ReverbPreset {
        self.current.preset()
    }

    pub fn is_crossfading(&self) -> bool {
        self.fading.is_some()
    }

    /// Updates continuous controls. Topology fields are ignored here; see
    /// [`ReverbNetwork::set_topology`].
    pub fn set_settings(&mut self, settings: ReverbSettings) {
        let ms = settings.smoothing_ms;
        for smoother in [
            &mut self.mix,
            &mut self.feedback,
            &mut self.damping,
            &mut self.width,
            &mut self.predelay,
        ] {
            smoother.set_time_ms(ms, self.sample_rate);
        }
        self.feedback.set_target(settings.feedback_scale());
        self.damping.set_target(settings.damping);
        self.width.set_target(settings.width);
        self.predelay
            .set_target(ms_to_samples(settings.predelay_ms, self.sample_rate));
        self.settings = ReverbSettings {
            preset: self.settings.preset,
            size: self.settings.size,
            ..settings
        };
    }

    /// Starts a crossfade to `bank`.
    ///
    /// Returns the bank that left the network, if any, so the caller can
    /// free it off the audio thread. A change arriving mid-fade drops the
    /// bank that was already fading out.
    pub fn set_topology(&mut self, bank: Box<TapBank>, crossfade_ms: f64) -> Option<Box<TapBank>> {
        let previous = std::mem::replace(&mut self.current, bank);
        let retired = self.fading.replace(previous);
        self.fade_position = 0;
        self.fade_length = ms_to_samples(crossfade_ms, self.sample_rate).max(1.0) as usize;
        self.settings.preset = self.current.preset();
        self.settings.size = self.current.size();
        retired
    }

    /// Processes a stereo block with the given dry/wet mix target.
    ///
    /// Input and output slices must all have the same length.
    pub fn process(
        &mut self,
        input_left: &[f64],
        input_right: &[f64],
        dry_wet_mix: f64,
        output_left: &mut [f64],
        output_right: &mut [f64],
    ) -> Option<Box<TapBank>> {
        self.mix.set_target(dry_wet_mix.clamp(0.0, 1.0));
        let frames = input_left
            .len()
            .min(input_right.len())
            .min(output_left.len())
            .min(output_right.len());
        let mut retired = None;

        for i in 0..frames {
            let dry_l = input_left[i];
            let dry_r = input_right[i];
            let delay = self.predelay.next_value();
            let mono = self.predelay_line.process(0.5 * (dry_l + dry_r), delay);

            let feedback = self.feedback.next_value();
            let damping = self.damping.next_value();
            let (mut wet_l, mut wet_r) = self.current.process(mono, feedback, damping);

            if let Some(fading) = self.fading.as_mut() {
                let x = self.fade_position as f64 / self.fade_length as f64;
                let gain_in = (x * FRAC_PI_2).sin();
                let gain_out = (x * FRAC_PI_2).cos();
                let (old_l, old_r) = fading.process(mono, feedback, damping);
                wet_l = wet_l * gain_in + old_l * gain_out;
                wet_r = wet_r * gain_in + old_r * gain_out;
                self.fade_position += 1;
                if self.fade_position >= self.fade_length {
                    retired = self.fading.take();
                }
            }

            let width = self.width.next_value();
            let wet1 = width / 2.0 + 0.5;
            let wet2 = (1.0 - width) / 2.0;
            let out_l = wet_l * wet1 + wet_r * wet2;
            let out_r = wet_r * wet1 + wet_l * wet2;

            let mix = self.mix.next_value();
            output_left[i] = dry_l * (1.0 - mix) + out_l * mix;
            output_right[i] = dry_r * (1.0 - mix) + out_r * mix;
        }
        retired
    }
}

fn ms_to_samples(ms: f64, sample_rate: f64) -> f64 {
    (ms.clamp(0.0, MAX_PREDELAY_MS) / 1000.0) * sample_rate
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f64 = 48_000.0;

    fn impulse_response(preset: ReverbPreset, frames: usize) -> Vec<f64> {
        let settings = ReverbSettings {
            preset,
            predelay_ms: 0.0,
            ..ReverbSettings::default()
        };
        let mut net = ReverbNetwork::new(SR, settings, 1.0);
        let mut input = vec![0.0; frames];
        input[0] = 1.0;
        let mut l = vec![0.0; frames];
        let mut r = vec![0.0; frames];
        net.process(&input, &input, 1.0, &mut l, &mut r);
        l
    }

    #[test]
    fn test_dry_mix_passes_input() {
        let mut net = ReverbNetwork::new(SR, ReverbSettings::default(), 0.0);
        let input: Vec<f64> = (0..256).map(|i| (i as f64 * 0.1).sin()).collect();
        let mut l = vec![0.0; 256];
        let mut r = vec![0.0; 256];
        net.process(&input, &input, 0.0, &mut l, &mut r);
        for (a, b) in input.iter().zip(&l) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_impulse_decays() {
        let ir = impulse_response(ReverbPreset::Hall, 48_000 * 3);
        let early: f64 = ir[..4800].iter().map(|s| s * s).sum();
        let late: f64 = ir[ir.len() - 4800..].iter().map(|s| s * s).sum();
        assert!(early > 0.0);
        assert!(late < early);
        assert!(ir.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_topology_is_seed_independent() {
        assert_eq!(
            impulse_response(ReverbPreset::Cathedral, 9600),
            impulse_response(ReverbPreset::Cathedral, 9600)
        );
    }

    #[test]
    fn test_crossfade_retires_old_bank() {
        let mut net = ReverbNetwork::new(SR, ReverbSettings::default(), 0.5);
        let bank = Box::new(TapBank::new(ReverbPreset::Cathedral, 1.0, SR));
        assert!(net.set_topology(bank, 10.0).is_none());
        assert!(net.is_crossfading());
        assert_eq!(net.preset(), ReverbPreset::Cathedral);

        let input = vec![0.1; 1024];
        let mut l = vec![0.0; 1024];
        let mut r = vec![0.0; 1024];
        let retired = net.process(&input, &input, 0.5, &mut l, &mut r);
        assert_eq!(retired.map(|b| b.preset()), Some(ReverbPreset::Hall));
        assert!(!net.is_crossfading());
    }

    #[test]
    fn test_mix_change_is_smoothed() {
        let mut net = ReverbNetwork::new(SR, ReverbSettings::default(), 0.0);
        let input = vec![0.5; 64];
        let mut l = vec![0.0; 64];
        let mut r = vec![0.0; 64];
        net.process(&input, &input, 1.0, &mut l, &mut r);
        // Mix ramps, so the first sample is still almost fully dry.
        assert!((l[0] - 0.5).abs() < 0.05);
    }
}
