//! The real-time side of the engine.
//!
//! Fixed topology:
//!
//! ```text
//! voices -> synth bus -+-> granular send -> granulator -> wet HP/LP -+
//!                      |                                             +-> reverb -> master
//!                      +-> dry bus --------------------------------- +       ^
//! lead ----------------------------------------------------------------+-----+
//! stretch bed ----------------------------------------------------------> master
//! ```
//!
//! Everything the graph needs arrives over a lock-free ring: settings,
//! pre-decided phrases with their grain batches, built reverb banks and
//! rendered stretch beds. Anything the graph lets go of goes back over a
//! second ring so the audio thread never frees memory. The graph draws no
//! randomness and never blocks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use flurry_params::ParameterState;
use rtrb::{Consumer, Producer};

use crate::filter::{BiquadCoeffs, BiquadFilter};
use crate::granular::{GrainSequence, Granulator};
use crate::harmony::{Phrase, PHRASE_SECONDS};
use crate::reverb::{ReverbNetwork, ReverbPreset, ReverbSettings, TapBank};
use crate::smoother::Smoothed;
use crate::stretch::{StretchBuffer, StretchPlayer};
use crate::voice::{LeadVoice, LeadVoiceSettings, VoiceBank, VoiceSettings};

/// Plans queued ahead of the one playing.
const PENDING_PLANS: usize = 4;

const WET_FILTER_Q: f64 = 0.707;

/// First frame of phrase `index`.
pub fn phrase_start_frame(index: u64, sample_rate: f64) -> u64 {
    (index as f64 * PHRASE_SECONDS * sample_rate).round() as u64
}

/// Bus levels and sends, all smoothed on the audio side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixSettings {
    pub master_volume: f64,
    pub synth_level: f64,
    pub dry_level: f64,
    pub granular_level: f64,
    pub reverb_level: f64,
    pub stretch_level: f64,
    pub lead_level: f64,
    pub granular_send: f64,
    pub dry_reverb_send: f64,
    pub granular_reverb_send: f64,
    pub lead_reverb_send: f64,
    pub smoothing_ms: f64,
    pub reverb_mix: f64,
    pub wet_lowpass_hz: f64,
    pub wet_highpass_hz: f64,
    pub stretch_enabled: bool,
    pub lead_enabled: bool,
    pub stretch_fade_s: f64,
}

impl MixSettings {
    pub fn from_params(params: &ParameterState) -> Self {
        Self {
            master_volume: params.master_volume,
            synth_level: params.synth_level,
            dry_level: params.dry_level,
            granular_level: params.granular_level,
            reverb_level: params.reverb_level,
            stretch_level: params.stretch_level,
            lead_level: params.lead_level,
            granular_send: params.granular_send,
            dry_reverb_send: params.dry_reverb_send,
            granular_reverb_send: params.granular_reverb_send,
            lead_reverb_send: params.lead_reverb_send,
            smoothing_ms: params.gain_smoothing_ms,
            reverb_mix: params.reverb_mix,
            wet_lowpass_hz: params.wet_lowpass_hz,
            wet_highpass_hz: params.wet_highpass_hz,
            stretch_enabled: params.stretch_enabled(),
            lead_enabled: params.lead_enabled(),
            stretch_fade_s: params.stretch_fade_s,
        }
    }
}

impl Default for MixSettings {
    fn default() -> Self {
        Self::from_params(&ParameterState::default())
    }
}

/// A decided phrase, its grain batch and the frame it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct PhrasePlan {
    pub phrase: Phrase,
    pub grains: GrainSequence,
    pub start_frame: u64,
}

impl PhrasePlan {
    pub fn new(phrase: Phrase, grains: GrainSequence, sample_rate: f64) -> Self {
        let start_frame = phrase_start_frame(phrase.index, sample_rate);
        Self {
            phrase,
            grains,
            start_frame,
        }
    }

    /// Frame on which chord `chord` starts. Chords split the phrase evenly.
    pub fn chord_start_frame(&self, chord: usize, sample_rate: f64) -> u64 {
        let end = phrase_start_frame(self.phrase.index + 1, sample_rate);
        let length = end - self.start_frame;
        let count = self.phrase.voicings.len().max(1) as u64;
        self.start_frame + (chord as u64 * length) / count
    }

    fn lead_frames(&self, note: usize, sample_rate: f64) -> Option<(u64, u64)> {
        let note = self.phrase.lead.get(note)?;
        let on = self.start_frame + (note.onset * sample_rate).round() as u64;
        let off = self.start_frame + ((note.onset + note.duration) * sample_rate).round() as u64;
        Some((on, off.max(on + 1)))
    }
}

/// Control-to-audio messages.
#[derive(Debug)]
pub enum GraphMessage {
    Mix(MixSettings),
    Voices(VoiceSettings),
    Lead(LeadVoiceSettings),
    /// Continuous reverb controls. Topology changes come as [`GraphMessage::Topology`].
    Reverb(ReverbSettings),
    Topology {
        bank: Box<TapBank>,
        crossfade_ms: f64,
    },
    Phrase(Box<PhrasePlan>),
    Stretch {
        buffer: Box<StretchBuffer>,
        fade_s: f64,
    },
    Transport(bool),
}

/// Allocations the audio side is done with, handed back to be freed.
#[derive(Debug)]
pub enum Retired {
    Phrase(Box<PhrasePlan>),
    Topology(Box<TapBank>),
    Stretch(Box<StretchBuffer>),
}

/// Audio-side ends of the rings between the control plane and the graph.
#[derive(Debug)]
pub struct GraphLink {
    pub messages: Consumer<GraphMessage>,
    pub retired: Producer<Retired>,
    pub position: Arc<AtomicU64>,
}

/// Per-sample bus gains.
#[derive(Debug, Clone, Copy)]
struct BusFrame {
    master: f64,
    synth: f64,
    dry: f64,
    granular: f64,
    reverb: f64,
    stretch: f64,
    lead: f64,
    granular_send: f64,
    dry_reverb_send: f64,
    granular_reverb_send: f64,
    lead_reverb_send: f64,
}

#[derive(Debug, Clone)]
struct BusGains {
    master: Smoothed,
    synth: Smoothed,
    dry: Smoothed,
    granular: Smoothed,
    reverb: Smoothed,
    stretch: Smoothed,
    lead: Smoothed,
    granular_send: Smoothed,
    dry_reverb_send: Smoothed,
    granular_reverb_send: Smoothed,
    lead_reverb_send: Smoothed,
}

impl BusGains {
    fn new(mix: &MixSettings, sample_rate: f64) -> Self {
        let (stretch, lead) = gated_levels(mix);
        let smoothed = |value: f64| Smoothed::new(value).with_time_ms(mix.smoothing_ms, sample_rate);
        Self {
            master: smoothed(mix.master_volume),
            synth: smoothed(mix.synth_level),
            dry: smoothed(mix.dry_level),
            granular: smoothed(mix.granular_level),
            reverb: smoothed(mix.reverb_level),
            stretch: smoothed(stretch),
            lead: smoothed(lead),
            granular_send: smoothed(mix.granular_send),
            dry_reverb_send: smoothed(mix.dry_reverb_send),
            granular_reverb_send: smoothed(mix.granular_reverb_send),
            lead_reverb_send: smoothed(mix.lead_reverb_send),
        }
    }

    fn all_mut(&mut self) -> [&mut Smoothed; 11] {
        [
            &mut self.master,
            &mut self.synth,
            &mut self.dry,
            &mut self.granular,
            &mut self.reverb,
            &mut self.stretch,
            &mut self.lead,
            &mut self.granular_send,
            &mut self.dry_reverb_send,
            &mut self.granular_reverb_send,
            &mut self.lead_reverb_send,
        ]
    }

    fn set(&mut self, mix: &MixSettings, sample_rate: f64) {
        for gain in self.all_mut() {
            gain.set_time_ms(mix.smoothing_ms, sample_rate);
        }
        let (stretch, lead) = gated_levels(mix);
        self.master.set_target(mix.master_volume);
        self.synth.set_target(mix.synth_level);
        self.dry.set_target(mix.dry_level);
        self.granular.set_target(mix.granular_level);
        self.reverb.set_target(mix.reverb_level);
        self.stretch.set_target(stretch);
        self.lead.set_target(lead);
        self.granular_send.set_target(mix.granular_send);
        self.dry_reverb_send.set_target(mix.dry_reverb_send);
        self.granular_reverb_send.set_target(mix.granular_reverb_send);
        self.lead_reverb_send.set_target(mix.lead_reverb_send);
    }

    #[inline]
    fn next(&mut self) -> BusFrame {
        BusFrame {
            master: self.master.next_value(),
            synth: self.synth.next_value(),
            dry: self.dry.next_value(),
            granular: self.granular.next_value(),
            reverb: self.reverb.next_value(),
            stretch: self.stretch.next_value(),
            lead: self.lead.next_value(),
            granular_send: self.granular_send.next_value(),
            dry_reverb_send: self.dry_reverb_send.next_value(),
            granular_reverb_send: self.granular_reverb_send.next_value(),
            lead_reverb_send: self.lead_reverb_send.next_value(),
        }
    }
}

/// Stretch and lead levels, muted when their section is off.
fn gated_levels(mix: &MixSettings) -> (f64, f64) {
    let stretch = if mix.stretch_enabled {
        mix.stretch_level
    } else {
        0.0
    };
    let lead = if mix.lead_enabled { mix.lead_level } else { 0.0 };
    (stretch, lead)
}

#[derive(Debug, Clone)]
struct Scratch {
    synth_l: Vec<f64>,
    synth_r: Vec<f64>,
    lead_l: Vec<f64>,
    lead_r: Vec<f64>,
    stretch_l: Vec<f64>,
    stretch_r: Vec<f64>,
    granular_in: Vec<f64>,
    granular_l: Vec<f64>,
    granular_r: Vec<f64>,
    reverb_in_l: Vec<f64>,
    reverb_in_r: Vec<f64>,
    reverb_l: Vec<f64>,
    reverb_r: Vec<f64>,
    wet_gain: Vec<f64>,
    return_gain: Vec<f64>,
    master_gain: Vec<f64>,
}

impl Scratch {
    fn new(frames: usize) -> Self {
        let buffer = || vec![0.0; frames];
        Self {
            synth_l: buffer(),
            synth_r: buffer(),
            lead_l: buffer(),
            lead_r: buffer(),
            stretch_l: buffer(),
            stretch_r: buffer(),
            granular_in: buffer(),
            granular_l: buffer(),
            granular_r: buffer(),
            reverb_in_l: buffer(),
            reverb_in_r: buffer(),
            reverb_l: buffer(),
            reverb_r: buffer(),
            wet_gain: buffer(),
            return_gain: buffer(),
            master_gain: buffer(),
        }
    }
}

/// Wet-path filters, per channel.
#[derive(Debug, Clone)]
struct WetFilters {
    highpass: [BiquadFilter; 2],
    lowpass: [BiquadFilter; 2],
}

impl WetFilters {
    fn new(mix: &MixSettings, sample_rate: f64) -> Self {
        let hp = || BiquadFilter::highpass(mix.wet_highpass_hz, WET_FILTER_Q, sample_rate);
        let lp = || BiquadFilter::lowpass(mix.wet_lowpass_hz, WET_FILTER_Q, sample_rate);
        Self {
            highpass: [hp(), hp()],
            lowpass: [lp(), lp()],
        }
    }

    fn set(&mut self, mix: &MixSettings, sample_rate: f64) {
        let hp = BiquadCoeffs::highpass(mix.wet_highpass_hz, WET_FILTER_Q, sample_rate);
        let lp = BiquadCoeffs::lowpass(mix.wet_lowpass_hz, WET_FILTER_Q, sample_rate);
        for filter in &mut self.highpass {
            filter.set_coeffs(hp);
        }
        for filter in &mut self.lowpass {
            filter.set_coeffs(lp);
        }
    }

    #[inline]
    fn process(&mut self, channel: usize, input: f64) -> f64 {
        self.lowpass[channel].process(self.highpass[channel].process(input))
    }
}

/// The audio graph. Lives on the audio thread once split off the engine.
#[derive(Debug)]
pub struct AudioGraph {
    sample_rate: f64,
    max_block: usize,
    link: GraphLink,
    running: bool,
    frame: u64,

    current: Option<Box<PhrasePlan>>,
    pending: VecDeque<Box<PhrasePlan>>,
    chord: usize,
    lead_cursor: usize,
    lead_off: Option<u64>,

    voices: VoiceBank,
    lead: LeadVoice,
    granulator: Granulator,
    reverb: ReverbNetwork,
    stretch: StretchPlayer,
    wet: WetFilters,
    gains: BusGains,
    mix: MixSettings,
    scratch: Scratch,
    retire_overflows: u64,
}

impl AudioGraph {
    /// Builds the graph. All allocation happens here.
    pub fn new(
        sample_rate: f64,
        max_block: usize,
        params: &ParameterState,
        reverb: ReverbNetwork,
        link: GraphLink,
    ) -> Self {
        let max_block = max_block.max(1);
        let mix = MixSettings::from_params(params);
        Self {
            sample_rate,
            max_block,
            link,
            running: false,
            frame: 0,
            current: None,
            pending: VecDeque::with_capacity(PENDING_PLANS),
            chord: 0,
            lead_cursor: 0,
            lead_off: None,
            voices: VoiceBank::new(sample_rate, VoiceSettings::from_params(params)),
            lead: LeadVoice::new(sample_rate, LeadVoiceSettings::from_params(params)),
            granulator: Granulator::new(sample_rate),
            reverb,
            stretch: StretchPlayer::new(sample_rate),
            wet: WetFilters::new(&mix, sample_rate),
            gains: BusGains::new(&mix, sample_rate),
            mix,
            scratch: Scratch::new(max_block),
            retire_overflows: 0,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Frames of musical time rendered so far.
    pub fn position_frames(&self) -> u64 {
        self.frame
    }

    /// Index of the phrase currently sounding.
    pub fn phrase_index(&self) -> Option<u64> {
        self.current.as_ref().map(|plan| plan.phrase.index)
    }

    /// Chord of the current phrase that is sounding.
    pub fn chord_index(&self) -> usize {
        self.chord
    }

    pub fn reverb_preset(&self) -> ReverbPreset {
        self.reverb.preset()
    }

    /// Blocks rendered with no stretch bed installed.
    pub fn underruns(&self) -> u64 {
        self.stretch.underruns()
    }

    /// Grains skipped because the grain pool was full.
    pub fn dropped_grains(&self) -> u64 {
        self.granulator.dropped()
    }

    /// Retired allocations freed on the audio thread because the return ring was full.
    pub fn retire_overflows(&self) -> u64 {
        self.retire_overflows
    }

    /// Renders the next block into `left` and `right`, overwriting them.
    ///
    /// Any block length works; work is split at phrase, chord and lead note
    /// boundaries and at the configured maximum block size.
    pub fn process(&mut self, left: &mut [f64], right: &mut [f64]) {
        self.drain_messages();
        let frames = left.len().min(right.len());
        if !self.running {
            left[..frames].fill(0.0);
            right[..frames].fill(0.0);
            return;
        }

        let mut offset = 0;
        while offset < frames {
            self.apply_due_events();
            let limit = (frames - offset).min(self.max_block);
            let n = self.frames_until_next_event().clamp(1, limit as u64) as usize;
            self.render_segment(
                &mut left[offset..offset + n],
                &mut right[offset..offset + n],
            );
            self.frame += n as u64;
            offset += n;
        }
        self.link.position.store(self.frame, Ordering::Release);
    }

    fn drain_messages(&mut self) {
        while let Ok(message) = self.link.messages.pop() {
            match message {
                GraphMessage::Mix(mix) => {
                    self.gains.set(&mix, self.sample_rate);
                    self.wet.set(&mix, self.sample_rate);
                    self.mix = mix;
                }
                GraphMessage::Voices(settings) => self.voices.set_settings(settings),
                GraphMessage::Lead(settings) => self.lead.set_settings(settings),
                GraphMessage::Reverb(settings) => self.reverb.set_settings(settings),
                GraphMessage::Topology { bank, crossfade_ms } => {
                    if let Some(old) = self.reverb.set_topology(bank, crossfade_ms) {
                        self.retire(Retired::Topology(old));
                    }
                }
                GraphMessage::Phrase(plan) => {
                    if self.pending.len() < PENDING_PLANS {
                        self.pending.push_back(plan);
                    } else {
                        self.retire(Retired::Phrase(plan));
                    }
                }
                GraphMessage::Stretch { buffer, fade_s } => {
                    if let Some(old) = self.stretch.install(buffer, fade_s) {
                        self.retire(Retired::Stretch(old));
                    }
                }
                GraphMessage::Transport(running) => self.running = running,
            }
        }
    }

    fn retire(&mut self, item: Retired) {
        if self.link.retired.push(item).is_err() {
            self.retire_overflows += 1;
        }
    }

    /// Applies everything scheduled at or before the current frame.
    fn apply_due_events(&mut self) {
        let now = self.frame;

        while self
            .pending
            .front()
            .is_some_and(|plan| plan.start_frame <= now)
        {
            let Some(plan) = self.pending.pop_front() else {
                break;
            };
            if let Some(voicing) = plan.phrase.voicings.first() {
                self.voices.apply_voicing(voicing);
            }
            self.granulator.begin_sequence(&plan.grains);
            self.chord = 0;
            self.lead_cursor = 0;
            if let Some(old) = self.current.replace(plan) {
                self.retire(Retired::Phrase(old));
            }
        }

        let Some(plan) = self.current.as_deref() else {
            return;
        };

        let count = plan.phrase.voicings.len();
        while self.chord + 1 < count && plan.chord_start_frame(self.chord + 1, self.sample_rate) <= now {
            self.chord += 1;
            self.voices.apply_voicing(&plan.phrase.voicings[self.chord]);
        }

        if self.lead_off.is_some_and(|off| off <= now) {
            self.lead.note_off();
            self.lead_off = None;
        }
        while let Some((on, off)) = plan.lead_frames(self.lead_cursor, self.sample_rate) {
            if on > now {
                break;
            }
            if off > now {
                self.lead.note_on(plan.phrase.lead[self.lead_cursor].midi);
                self.lead_off = Some(off);
            }
            self.lead_cursor += 1;
        }
    }

    /// Frames until the next phrase, chord or lead event.
    fn frames_until_next_event(&self) -> u64 {
        let now = self.frame;
        let mut next = u64::MAX;
        if let Some(plan) = self.pending.front() {
            next = next.min(plan.start_frame);
        }
        if let Some(plan) = self.current.as_deref() {
            if self.chord + 1 < plan.phrase.voicings.len() {
                next = next.min(plan.chord_start_frame(self.chord + 1, self.sample_rate));
            }
            if let Some((on, _)) = plan.lead_frames(self.lead_cursor, self.sample_rate) {
                next = next.min(on);
            }
        }
        if let Some(off) = self.lead_off {
            next = next.min(off);
        }
        next.saturating_sub(now)
    }

    fn render_segment(&mut self, left: &mut [f64], right: &mut [f64]) {
        let n = left.len();
        let s = &mut self.scratch;

        self.voices.render(&mut s.synth_l[..n], &mut s.synth_r[..n]);
        self.lead.render(&mut s.lead_l[..n], &mut s.lead_r[..n]);
        if let Some(old) = self.stretch.render(&mut s.stretch_l[..n], &mut s.stretch_r[..n]) {
            if self.link.retired.push(Retired::Stretch(old)).is_err() {
                self.retire_overflows += 1;
            }
        }

        for i in 0..n {
            let g = self.gains.next();
            let synth_l = s.synth_l[i] * g.synth;
            let synth_r = s.synth_r[i] * g.synth;
            s.granular_in[i] = 0.5 * (synth_l + synth_r) * g.granular_send;

            let dry = g.dry * g.dry_reverb_send;
            s.reverb_in_l[i] = synth_l * dry + s.lead_l[i] * g.lead_reverb_send;
            s.reverb_in_r[i] = synth_r * dry + s.lead_r[i] * g.lead_reverb_send;

            left[i] = s.stretch_l[i] * g.stretch + s.lead_l[i] * g.lead;
            right[i] = s.stretch_r[i] * g.stretch + s.lead_r[i] * g.lead;

            s.wet_gain[i] = g.granular * g.granular_reverb_send;
            s.return_gain[i] = g.reverb;
            s.master_gain[i] = g.master;
        }

        let (grains, phrase_frame) = match self.current.as_deref() {
            Some(plan) => (
                Some(&plan.grains),
                self.frame.saturating_sub(plan.start_frame),
            ),
            None => (None, 0),
        };
        self.granulator.process(
            &s.granular_in[..n],
            grains,
            phrase_frame,
            &mut s.granular_l[..n],
            &mut s.granular_r[..n],
        );

        for i in 0..n {
            s.reverb_in_l[i] += self.wet.process(0, s.granular_l[i]) * s.wet_gain[i];
            s.reverb_in_r[i] += self.wet.process(1, s.granular_r[i]) * s.wet_gain[i];
        }

        let retired = self.reverb.process(
            &s.reverb_in_l[..n],
            &s.reverb_in_r[..n],
            self.mix.reverb_mix,
            &mut s.reverb_l[..n],
            &mut s.reverb_r[..n],
        );
        if let Some(old) = retired {
            if self.link.retired.push(Retired::Topology(old)).is_err() {
                self.retire_overflows += 1;
            }
        }

        for i in 0..n {
            let l = (s.reverb_l[i] * s.return_gain[i] + left[i]) * s.master_gain[i];
            let r = (s.reverb_r[i] * s.return_gain[i] + right[i]) * s.master_gain[i];
            left[i] = soft_clip(l);
            right[i] = soft_clip(r);
        }
    }
}

#[inline]
fn soft_clip(x: f64) -> f64 {
    x.tanh()
}
