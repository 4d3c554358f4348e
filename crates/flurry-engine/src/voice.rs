//! The polyphonic pad voice bank and the lead voice.
//!
//! Each pad voice is two detuned PolyBLEP saws, a triangle and a tap of the
//! shared noise table, through a resonant lowpass and a soft waveshaper, under
//! an attack/release envelope. A voice owns a small pool of layers so a retune
//! can fade the old pitch out while the new one fades in. A layer is only
//! re-pitched once it is silent.

use flurry_params::ParameterState;

use crate::envelope::{ArEnvelope, ArParams, EnvelopeState};
use crate::filter::{brightness_to_cutoff, BiquadCoeffs, BiquadFilter};
use crate::harmony::{Voicing, VOICE_COUNT};
use crate::oscillator::{
    cents_to_ratio, midi_to_freq, polyblep_saw, saturate, sine, triangle, PhaseAccumulator,
};
use crate::rng::NoiseTable;
use crate::smoother::Smoothed;

/// Per-voice output gain before panning.
const VOICE_GAIN: f64 = 0.22;

/// Layers per voice. Covers long releases at the chord rate; beyond that the
/// quietest layer is choked before it takes the new pitch.
const LAYERS: usize = 4;

/// Fade applied to a layer stolen while still sounding.
const CHOKE_SECONDS: f64 = 0.01;

/// Cutoff key tracking is relative to middle C.
const KEY_TRACK_REFERENCE_HZ: f64 = 261.63;

/// Timbre settings for the pad voices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceSettings {
    pub cutoff_hz: f64,
    pub resonance: f64,
    pub key_tracking: f64,
    pub drive: f64,
    pub detune_cents: f64,
    pub saw_mix: f64,
    pub triangle_mix: f64,
    pub noise_mix: f64,
    pub envelope: ArParams,
    pub vibrato_rate: f64,
    pub vibrato_cents: f64,
}

impl VoiceSettings {
    pub fn from_params(params: &ParameterState) -> Self {
        Self {
            cutoff_hz: brightness_to_cutoff(params.brightness),
            resonance: params.filter_resonance,
            key_tracking: params.filter_key_tracking,
            drive: 1.0 + params.hardness * 5.0,
            detune_cents: params.detune_cents,
            saw_mix: params.saw_mix,
            triangle_mix: params.triangle_mix,
            noise_mix: params.noise_mix,
            envelope: ArParams::from_hardness(
                params.hardness,
                params.attack_scale,
                params.release_scale,
            ),
            vibrato_rate: params.vibrato_rate,
            vibrato_cents: params.vibrato_depth,
        }
    }
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self::from_params(&ParameterState::default())
    }
}

#[derive(Debug, Clone)]
struct Layer {
    frequency: f64,
    saw_a: PhaseAccumulator,
    saw_b: PhaseAccumulator,
    tri: PhaseAccumulator,
    env: ArEnvelope,
    /// Pitch and times waiting for the envelope to reach silence.
    pending: Option<(f64, ArParams)>,
}

impl Layer {
    fn new(sample_rate: f64, envelope: ArParams, phase: f64) -> Self {
        Self {
            frequency: 0.0,
            saw_a: PhaseAccumulator::with_phase(sample_rate, phase),
            saw_b: PhaseAccumulator::with_phase(sample_rate, phase + 0.37),
            tri: PhaseAccumulator::with_phase(sample_rate, phase + 0.11),
            env: ArEnvelope::new(envelope, sample_rate),
            pending: None,
        }
    }

    /// Starts `frequency` now if silent, otherwise chokes and defers it.
    fn start(&mut self, frequency: f64, envelope: ArParams) {
        if self.env.is_idle() {
            self.frequency = frequency;
            self.env.set_params(envelope);
            self.env.trigger();
            self.pending = None;
        } else {
            self.env.choke(CHOKE_SECONDS);
            self.pending = Some((frequency, envelope));
        }
    }

    #[inline]
    fn next(&mut self, settings: &VoiceSettings, vibrato: f64, noise: f64) -> f64 {
        if self.pending.is_some() && self.env.is_idle() {
            if let Some((frequency, envelope)) = self.pending.take() {
                self.start(frequency, envelope);
            }
        }
        let level = self.env.next_sample();
        if level <= 0.0 && self.env.is_idle() {
            return 0.0;
        }
        let detune = cents_to_ratio(settings.detune_cents * 0.5);
        let freq = self.frequency * vibrato;
        let fa = freq * detune;
        let fb = freq / detune;
        let dta = self.saw_a.increment(fa);
        let dtb = self.saw_b.increment(fb);
        let saws = 0.5 * (polyblep_saw(self.saw_a.advance(fa), dta) + polyblep_saw(self.saw_b.advance(fb), dtb));
        let tri = triangle(self.tri.advance(freq));
        (settings.saw_mix * saws + settings.triangle_mix * tri + settings.noise_mix * noise) * level
    }
}

/// One pad voice.
#[derive(Debug, Clone)]
pub struct Voice {
    layers: [Layer; LAYERS],
    active: usize,
    note: Option<u8>,
    filter: BiquadFilter,
    gain_left: f64,
    gain_right: f64,
    noise_offset: usize,
}

impl Voice {
    fn new(index: usize, sample_rate: f64, settings: &VoiceSettings) -> Self {
        let pan = if VOICE_COUNT > 1 {
            (index as f64 / (VOICE_COUNT - 1) as f64) * 2.0 - 1.0
        } else {
            0.0
        };
        let angle = (pan * 0.6 + 1.0) * std::f64::consts::FRAC_PI_4;
        let phase = index as f64 * 0.173;
        Self {
            layers: std::array::from_fn(|i| {
                Layer::new(sample_rate, settings.envelope, phase + i as f64 / LAYERS as f64)
            }),
            active: 0,
            note: None,
            filter: BiquadFilter::lowpass(settings.cutoff_hz, settings.resonance, sample_rate),
            gain_left: angle.cos(),
            gain_right: angle.sin(),
            noise_offset: index * 9973,
        }
    }

    /// Moves to `note`. A held note of the same pitch is left alone.
    fn retune(&mut self, note: u8, envelope: ArParams) {
        let current = &self.layers[self.active];
        let held = current.pending.is_some()
            || matches!(
                current.env.state(),
                EnvelopeState::Attack | EnvelopeState::Sustain
            );
        if self.note == Some(note) && held {
            return;
        }
        self.layers[self.active].env.release();
        self.layers[self.active].pending = None;
        self.active = self.free_layer();
        self.layers[self.active].start(midi_to_freq(note as f64), envelope);
        self.note = Some(note);
    }

    /// An idle layer other than the active one, else the quietest.
    fn free_layer(&self) -> usize {
        let others = (0..LAYERS).filter(|&i| i != self.active);
        if let Some(idle) = others.clone().find(|&i| self.layers[i].env.is_idle()) {
            return idle;
        }
        others
            .min_by(|&a, &b| {
                self.layers[a]
                    .env
                    .level()
                    .total_cmp(&self.layers[b].env.level())
            })
            .unwrap_or(self.active)
    }

    fn release(&mut self) {
        for layer in &mut self.layers {
            layer.env.release();
            layer.pending = None;
        }
        self.note = None;
    }

    fn is_silent(&self) -> bool {
        self.layers
            .iter()
            .all(|l| l.env.is_idle() && l.pending.is_none())
    }

    fn update_filter(&mut self, settings: &VoiceSettings, sample_rate: f64) {
        let active = &self.layers[self.active];
        let freq = active
            .pending
            .map_or(active.frequency, |(frequency, _)| frequency)
            .max(1.0);
        let tracking = (freq / KEY_TRACK_REFERENCE_HZ).powf(settings.key_tracking);
        self.filter.set_coeffs(BiquadCoeffs::lowpass(
            settings.cutoff_hz * tracking,
            settings.resonance,
            sample_rate,
        ));
    }
}

/// The six pad voices.
#[derive(Debug, Clone)]
pub struct VoiceBank {
    voices: Vec<Voice>,
    settings: VoiceSettings,
    sample_rate: f64,
    noise: NoiseTable,
    noise_position: usize,
    vibrato: PhaseAccumulator,
}

impl VoiceBank {
    pub fn new(sample_rate: f64, settings: VoiceSettings) -> Self {
        Self {
            voices: (0..VOICE_COUNT)
                .map(|i| Voice::new(i, sample_rate, &settings))
                .collect(),
            settings,
            sample_rate,
            noise: NoiseTable::default(),
            noise_position: 0,
            vibrato: PhaseAccumulator::new(sample_rate),
        }
    }

    pub fn settings(&self) -> &VoiceSettings {
        &self.settings
    }

    /// Changes timbre. Envelope times apply to the next retune.
    pub fn set_settings(&mut self, settings: VoiceSettings) {
        self.settings = settings;
    }

    /// Retunes every voice to the voicing, crossfading changed pitches.
    pub fn apply_voicing(&mut self, voicing: &Voicing) {
        let envelope = self.settings.envelope;
        for (voice, &note) in self.voices.iter_mut().zip(&voicing.notes) {
            voice.retune(note, envelope);
        }
    }

    /// Starts the release on every voice.
    pub fn release_all(&mut self) {
        for voice in &mut self.voices {
            voice.release();
        }
    }

    /// Currently sounding notes, one per voice.
    pub fn notes(&self) -> impl Iterator<Item = Option<u8>> + '_ {
        self.voices.iter().map(|v| v.note)
    }

    pub fn is_silent(&self) -> bool {
        self.voices.iter().all(Voice::is_silent)
    }

    /// Renders into `left` and `right`, overwriting them.
    pub fn render(&mut self, left: &mut [f64], right: &mut [f64]) {
        let frames = left.len().min(right.len());
        left[..frames].fill(0.0);
        right[..frames].fill(0.0);

        let settings = self.settings;
        for voice in &mut self.voices {
            voice.update_filter(&settings, self.sample_rate);
        }

        for i in 0..frames {
            let lfo = sine(self.vibrato.advance(settings.vibrato_rate));
            let vibrato = cents_to_ratio(lfo * settings.vibrato_cents);
            let position = self.noise_position + i;
            for voice in &mut self.voices {
                let noise = self.noise.at(position + voice.noise_offset);
                let raw: f64 = voice
                    .layers
                    .iter_mut()
                    .map(|layer| layer.next(&settings, vibrato, noise))
                    .sum();
                let shaped = saturate(voice.filter.process(raw), settings.drive) * VOICE_GAIN;
                left[i] += shaped * voice.gain_left;
                right[i] += shaped * voice.gain_right;
            }
        }
        self.noise_position = (self.noise_position + frames) % self.noise.len().max(1);
    }

    /// Renders a held voicing offline and returns the mono mix.
    ///
    /// Used as the source material for the stretch bed. The attack is capped
    /// at half a second so the source is mostly sustain.
    pub fn render_offline(
        voicing: &Voicing,
        settings: VoiceSettings,
        sample_rate: f64,
        seconds: f64,
    ) -> Vec<f64> {
        let mut settings = settings;
        settings.envelope.attack = settings.envelope.attack.min(0.5);
        let mut bank = VoiceBank::new(sample_rate, settings);
        bank.apply_voicing(voicing);

        let frames = (seconds.max(0.0) * sample_rate) as usize;
        let mut out = Vec::with_capacity(frames);
        let mut left = [0.0; 256];
        let mut right = [0.0; 256];
        while out.len() < frames {
            let n = (frames - out.len()).min(left.len());
            bank.render(&mut left[..n], &mut right[..n]);
            out.extend(left[..n].iter().zip(&right[..n]).map(|(l, r)| 0.5 * (l + r)));
        }
        out
    }
}

/// Settings for the lead voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeadVoiceSettings {
    pub envelope: ArParams,
    pub cutoff_hz: f64,
    pub vibrato_cents: f64,
    pub glide_s: f64,
    pub detune_cents: f64,
}

impl LeadVoiceSettings {
    pub fn from_params(params: &ParameterState) -> Self {
        Self {
            envelope: ArParams::new(params.lead_attack_s, params.lead_release_s),
            cutoff_hz: brightness_to_cutoff(params.lead_brightness),
            vibrato_cents: params.lead_vibrato * 30.0,
            glide_s: params.lead_glide_s,
            detune_cents: params.lead_detune_cents,
        }
    }
}

impl Default for LeadVoiceSettings {
    fn default() -> Self {
        Self::from_params(&ParameterState::default())
    }
}

/// Monophonic lead: a sine plus a quiet detuned saw, with glide.
#[derive(Debug, Clone)]
pub struct LeadVoice {
    settings: LeadVoiceSettings,
    sample_rate: f64,
    sine: PhaseAccumulator,
    saw: PhaseAccumulator,
    vibrato: PhaseAccumulator,
    pitch: Smoothed,
    env: ArEnvelope,
    filter: BiquadFilter,
    gate: bool,
}

impl LeadVoice {
    pub fn new(sample_rate: f64, settings: LeadVoiceSettings) -> Self {
        Self {
            settings,
            sample_rate,
            sine: PhaseAccumulator::new(sample_rate),
            saw: PhaseAccumulator::new(sample_rate),
            vibrato: PhaseAccumulator::new(sample_rate),
            pitch: Smoothed::new(60.0).with_time_ms(settings.glide_s * 1000.0, sample_rate),
            env: ArEnvelope::new(settings.envelope, sample_rate),
            filter: BiquadFilter::lowpass(settings.cutoff_hz, 0.707, sample_rate),
            gate: false,
        }
    }

    pub fn set_settings(&mut self, settings: LeadVoiceSettings) {
        self.settings = settings;
        self.pitch.set_time_ms(settings.glide_s * 1000.0, self.sample_rate);
        self.env.set_params(settings.envelope);
        self.filter.set_coeffs(BiquadCoeffs::lowpass(
            settings.cutoff_hz,
            0.707,
            self.sample_rate,
        ));
    }

    /// Starts a note. From silence the pitch jumps; otherwise it glides.
    pub fn note_on(&mut self, midi: u8) {
        if self.env.is_idle() {
            self.pitch.snap(midi as f64);
        } else {
            self.pitch.set_target(midi as f64);
        }
        self.env.trigger();
        self.gate = true;
    }

    pub fn note_off(&mut self) {
        self.env.release();
        self.gate = false;
    }

    pub fn is_gated(&self) -> bool {
        self.gate
    }

    /// Renders into `left` and `right`, overwriting them.
    pub fn render(&mut self, left: &mut [f64], right: &mut [f64]) {
        let frames = left.len().min(right.len());
        if self.env.is_idle() {
            left[..frames].fill(0.0);
            right[..frames].fill(0.0);
            return;
        }
        let detune = cents_to_ratio(self.settings.detune_cents);
        for i in 0..frames {
            let lfo = sine(self.vibrato.advance(5.0));
            let note = self.pitch.next_value() + lfo * self.settings.vibrato_cents / 100.0;
            let freq = midi_to_freq(note);
            let dt = self.saw.increment(freq * detune);
            let raw = sine(self.sine.advance(freq)) + 0.25 * polyblep_saw(self.saw.advance(freq * detune), dt);
            let out = self.filter.process(raw) * self.env.next_sample() * 0.3;
            left[i] = out;
            right[i] = out;
        }
    }
}
