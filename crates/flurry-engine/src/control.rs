//! The control side of the engine.
//!
//! The [`ControlPlane`] turns parameter changes into graph messages, plans
//! phrases a little ahead of the audio position, re-derives the seed when
//! the bucket or the canonical parameters change, and runs stretch renders.
//! It is the only place that draws randomness. It may allocate, log and
//! block; the [`AudioGraph`] it feeds does none of those.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use flurry_params::{derive_seed, ParameterState, Section, Seed, TimeBucket};
use rtrb::{Consumer, Producer, PushError, RingBuffer};
use tracing::{debug, info, warn};

use crate::composer::{Composer, Composition};
use crate::config::{EngineConfig, StretchExecution};
use crate::error::EngineResult;
use crate::events::EngineEvent;
use crate::graph::{
    phrase_start_frame, AudioGraph, GraphLink, GraphMessage, MixSettings, PhrasePlan, Retired,
};
use crate::harmony::{Phrase, ScaleTable, Voicing};
use crate::reverb::{ReverbNetwork, ReverbPreset, ReverbSettings, TapBank};
use crate::stretch::{
    render, StretchBuffer, StretchCache, StretchJob, StretchKey, StretchOutcome, StretchSettings,
    StretchWorker,
};
use crate::voice::{LeadVoiceSettings, VoiceBank, VoiceSettings};

/// How far ahead of the audio position phrases are decided.
pub const LOOKAHEAD_SECONDS: f64 = 2.0;

/// Control-side state of a running engine.
#[derive(Debug)]
pub struct ControlPlane {
    sample_rate: f64,
    execution: StretchExecution,
    params: ParameterState,
    bucket: TimeBucket,
    composer: Composer,
    reverb_override: Option<ReverbPreset>,
    reverb: ReverbSettings,

    messages: Producer<GraphMessage>,
    retired: Consumer<Retired>,
    position: Arc<AtomicU64>,
    backlog: VecDeque<GraphMessage>,

    stretch_wanted: bool,
    stretch_in_flight: bool,
    worker: Option<StretchWorker>,
    cache: StretchCache,

    last_phrase: Option<Phrase>,
    events: Vec<EngineEvent>,
}

impl ControlPlane {
    /// Builds the control plane and the audio graph it drives.
    ///
    /// A malformed scale table or reverb override is not fatal: the built-in
    /// table or the hall preset is used and a `ConfigFallback` event queued.
    pub fn new(
        config: &EngineConfig,
        params: &ParameterState,
        bucket: TimeBucket,
    ) -> EngineResult<(Self, AudioGraph)> {
        config.validate()?;
        let sample_rate = config.sample_rate_f64();
        let params = params.clamped();
        let mut events = Vec::new();

        let table = match &config.scale_table {
            Some(families) => ScaleTable::new(families.clone()).unwrap_or_else(|err| {
                warn!(code = err.code(), "scale table rejected, using built-in table: {err}");
                events.push(EngineEvent::ConfigFallback {
                    message: err.to_string(),
                });
                ScaleTable::default()
            }),
            None => ScaleTable::default(),
        };

        let reverb_override = config.reverb_preset_override.as_deref().map(|name| {
            name.parse::<ReverbPreset>().unwrap_or_else(|err| {
                warn!(code = err.code(), "reverb override rejected, using hall: {err}");
                events.push(EngineEvent::ConfigFallback {
                    message: err.to_string(),
                });
                ReverbPreset::Hall
            })
        });

        let mut execution = config.stretch_execution;
        let worker = match execution {
            StretchExecution::Inline => None,
            StretchExecution::Background => match StretchWorker::spawn() {
                Ok(worker) => Some(worker),
                Err(err) => {
                    warn!(code = err.code(), "stretch worker unavailable, rendering inline: {err}");
                    events.push(EngineEvent::ConfigFallback {
                        message: err.to_string(),
                    });
                    execution = StretchExecution::Inline;
                    None
                }
            },
        };

        let seed = derive_seed(&bucket, &params);
        info!(bucket = bucket.as_str(), seed, "engine seeded");

        let capacity = config.message_capacity;
        let (messages, message_rx) = RingBuffer::new(capacity);
        let (retire_tx, retired) = RingBuffer::new(capacity * 2);
        let position = Arc::new(AtomicU64::new(0));
        let link = GraphLink {
            messages: message_rx,
            retired: retire_tx,
            position: Arc::clone(&position),
        };

        let reverb = apply_override(ReverbSettings::from_params(&params), reverb_override);
        let network = ReverbNetwork::new(sample_rate, reverb, params.reverb_mix);
        let graph = AudioGraph::new(sample_rate, config.max_block_size, &params, network, link);

        let mut control = Self {
            sample_rate,
            execution,
            params,
            bucket,
            composer: Composer::new(seed, table, config.grain_batch_size),
            reverb_override,
            reverb,
            messages,
            retired,
            position,
            backlog: VecDeque::new(),
            stretch_wanted: true,
            stretch_in_flight: false,
            worker,
            cache: StretchCache::default(),
            last_phrase: None,
            events,
        };
        control.plan_ahead();
        Ok((control, graph))
    }

    /// Seed of the stream in use.
    pub fn seed(&self) -> Seed {
        self.composer.seed()
    }

    /// Seed waiting for the next phrase boundary.
    pub fn pending_seed(&self) -> Option<Seed> {
        self.composer.pending_seed()
    }

    pub fn bucket(&self) -> &TimeBucket {
        &self.bucket
    }

    pub fn params(&self) -> &ParameterState {
        &self.params
    }

    /// The most recently decided phrase.
    pub fn last_phrase(&self) -> Option<&Phrase> {
        self.last_phrase.as_ref()
    }

    /// Audio position as last published by the graph.
    pub fn position_frames(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }

    pub fn stretch_in_flight(&self) -> bool {
        self.stretch_in_flight
    }

    pub fn cached_beds(&self) -> usize {
        self.cache.len()
    }

    /// Takes the queued events.
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    /// Starts or stops the graph.
    pub fn set_running(&mut self, running: bool) {
        debug!(running, "transport");
        self.send(GraphMessage::Transport(running));
    }

    /// Moves to a new time bucket. A seed change takes effect at the next
    /// phrase boundary.
    pub fn set_bucket(&mut self, bucket: TimeBucket) {
        if bucket != self.bucket {
            self.bucket = bucket;
            self.refresh_seed();
        }
    }

    /// Brings the graph up to date with `params` and plans ahead.
    ///
    /// Call before every block (or at least every few hundred milliseconds).
    pub fn update(&mut self, params: &ParameterState) {
        self.collect_retired();
        self.poll_stretch();

        let params = params.clamped();
        if params != self.params {
            let previous = std::mem::replace(&mut self.params, params);
            self.apply_changes(&previous);
            self.refresh_seed();
        }

        self.flush();
        self.plan_ahead();
    }

    /// Handles finished stretch renders. Results from superseded jobs are
    /// cached but never played.
    pub fn poll_stretch(&mut self) {
        let outcomes: Vec<StretchOutcome> = match &self.worker {
            Some(worker) => std::iter::from_fn(|| worker.try_recv()).collect(),
            None => return,
        };
        for outcome in outcomes {
            self.handle_outcome(outcome);
        }
    }

    /// Waits up to `timeout` for the render in flight to reach the graph.
    ///
    /// Returns true once no render is outstanding.
    pub fn wait_for_stretch(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.stretch_in_flight {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let outcome = match &self.worker {
                Some(worker) if !remaining.is_zero() => worker.recv_timeout(remaining),
                _ => None,
            };
            match outcome {
                Some(outcome) => self.handle_outcome(outcome),
                None => break,
            }
        }
        !self.stretch_in_flight
    }

    fn handle_outcome(&mut self, outcome: StretchOutcome) {
        let latest = self.worker.as_ref().map_or(0, StretchWorker::generation);
        match outcome {
            StretchOutcome::Ready {
                generation,
                key,
                buffer,
            } => {
                self.cache.insert(key, (*buffer).clone());
                if generation != latest {
                    debug!(generation, latest, "stale stretch bed cached, not played");
                    return;
                }
                self.stretch_in_flight = false;
                self.deliver_stretch(buffer);
            }
            StretchOutcome::Cancelled { generation, key } => {
                debug!(generation, ?key, "stretch render cancelled");
                if generation == latest {
                    self.stretch_in_flight = false;
                }
                self.events.push(EngineEvent::StretchCancelled);
            }
        }
    }

    fn deliver_stretch(&mut self, buffer: Box<StretchBuffer>) {
        let phase_seed = buffer.phase_seed;
        info!(
            phase_seed,
            seconds = buffer.duration_seconds(),
            "stretch bed ready"
        );
        self.events.push(EngineEvent::StretchReady { phase_seed });
        self.send(GraphMessage::Stretch {
            buffer,
            fade_s: self.params.stretch_fade_s,
        });
    }

    fn apply_changes(&mut self, previous: &ParameterState) {
        let mix = MixSettings::from_params(&self.params);
        if mix != MixSettings::from_params(previous) {
            self.send(GraphMessage::Mix(mix));
        }

        let voices = VoiceSettings::from_params(&self.params);
        if voices != VoiceSettings::from_params(previous) {
            self.send(GraphMessage::Voices(voices));
        }

        let lead = LeadVoiceSettings::from_params(&self.params);
        if lead != LeadVoiceSettings::from_params(previous) {
            self.send(GraphMessage::Lead(lead));
        }

        let reverb = apply_override(ReverbSettings::from_params(&self.params), self.reverb_override);
        if reverb.topology_differs(&self.reverb) {
            info!(
                from = %self.reverb.preset,
                to = %reverb.preset,
                size = reverb.size,
                "reverb topology change"
            );
            let bank = Box::new(TapBank::new(reverb.preset, reverb.size, self.sample_rate));
            self.send(GraphMessage::Topology {
                bank,
                crossfade_ms: reverb.crossfade_ms,
            });
        }
        if reverb != self.reverb {
            self.send(GraphMessage::Reverb(reverb));
            self.reverb = reverb;
        }

        let stretch_changed = [Section::Stretch, Section::Timbre]
            .into_iter()
            .any(|section| self.params.canonical_section(section) != previous.canonical_section(section));
        if stretch_changed {
            self.invalidate_stretch();
        }
    }

    /// Drops the bed in progress; a new one is requested at the next phrase.
    fn invalidate_stretch(&mut self) {
        self.stretch_wanted = true;
        if self.stretch_in_flight {
            if let Some(worker) = &self.worker {
                debug!("cancelling stretch render");
                worker.cancel();
            }
            self.stretch_in_flight = false;
        }
    }

    fn refresh_seed(&mut self) {
        let seed = derive_seed(&self.bucket, &self.params);
        if seed != self.composer.effective_seed() {
            info!(bucket = self.bucket.as_str(), seed, "reseed queued for next phrase");
        }
        self.composer.reseed(seed);
    }

    /// Decides every phrase that starts within the lookahead window.
    fn plan_ahead(&mut self) {
        let lookahead = (LOOKAHEAD_SECONDS * self.sample_rate) as u64;
        let horizon = self.position_frames() + lookahead;
        while phrase_start_frame(self.composer.next_index(), self.sample_rate) <= horizon {
            // Room for the plan plus a stretch bed.
            if !self.backlog.is_empty() || self.messages.slots() < 2 {
                break;
            }
            self.plan_phrase();
        }
    }

    fn plan_phrase(&mut self) {
        // A new seed also wants a new bed, drawn from the new stream.
        let want_stretch = self.params.stretch_enabled()
            && (self.stretch_wanted || self.composer.pending_seed().is_some());
        let Composition {
            phrase,
            grains,
            stretch_seed,
            reseeded,
        } = self.composer.compose(&self.params, want_stretch);

        if let Some(seed) = reseeded {
            info!(seed, index = phrase.index, "reseeded at phrase boundary");
            self.events.push(EngineEvent::Reseeded { seed });
        }
        debug!(
            index = phrase.index,
            scale = %phrase.scale.name,
            chords = phrase.progression.len(),
            grains = grains.len(),
            lead_notes = phrase.lead.len(),
            "phrase decided"
        );
        self.events.push(EngineEvent::PhraseBoundary {
            index: phrase.index,
            start_seconds: phrase.start_seconds,
            scale: phrase.scale.name.clone(),
        });

        if let Some(phase_seed) = stretch_seed {
            self.stretch_wanted = false;
            self.request_stretch(&phrase, phase_seed);
        }

        self.last_phrase = Some(phrase.clone());
        let plan = PhrasePlan::new(phrase, grains, self.sample_rate);
        self.send(GraphMessage::Phrase(Box::new(plan)));
    }

    /// Renders (or fetches) a bed from the first chord of `phrase`.
    fn request_stretch(&mut self, phrase: &Phrase, phase_seed: Seed) {
        let Some(voicing) = phrase.voicings.first() else {
            return;
        };
        let settings = StretchSettings::from_params(&self.params);
        let shift = 12 * settings.octave;
        let source_voicing = Voicing {
            notes: voicing
                .notes
                .map(|note| (note as i32 + shift).clamp(0, 127) as u8),
        };
        let key = stretch_key(&self.params, &source_voicing, phase_seed);

        if let Some(buffer) = self.cache.get(&key) {
            debug!(?key, "stretch bed from cache");
            let buffer = Box::new(buffer.clone());
            if let Some(worker) = &self.worker {
                worker.cancel();
            }
            self.stretch_in_flight = false;
            self.deliver_stretch(buffer);
            return;
        }

        let source = VoiceBank::render_offline(
            &source_voicing,
            VoiceSettings::from_params(&self.params),
            self.sample_rate,
            settings.source_s,
        );

        if self.execution == StretchExecution::Background {
            if let Some(worker) = &self.worker {
                let generation = worker.submit(StretchJob {
                    key,
                    source,
                    sample_rate: self.sample_rate,
                    settings,
                    phase_seed,
                });
                debug!(generation, ?key, phase_seed, "stretch render submitted");
                self.stretch_in_flight = true;
                return;
            }
        }

        debug!(?key, phase_seed, "rendering stretch bed inline");
        let buffer = render(&source, self.sample_rate, &settings, phase_seed);
        self.cache.insert(key, buffer.clone());
        self.deliver_stretch(Box::new(buffer));
    }

    /// Frees whatever the graph handed back.
    fn collect_retired(&mut self) {
        while let Ok(item) = self.retired.pop() {
            drop(item);
        }
    }

    /// Queues `message` behind anything not yet delivered.
    fn send(&mut self, message: GraphMessage) {
        self.backlog.push_back(message);
        self.flush();
    }

    fn flush(&mut self) {
        while let Some(message) = self.backlog.pop_front() {
            if let Err(PushError::Full(message)) = self.messages.push(message) {
                self.backlog.push_front(message);
                break;
            }
        }
    }
}

fn apply_override(mut settings: ReverbSettings, preset: Option<ReverbPreset>) -> ReverbSettings {
    if let Some(preset) = preset {
        settings.preset = preset;
    }
    settings
}

/// Everything a bed depends on: the stretch and timbre sections, the
/// source notes and the phase seed.
fn stretch_key(params: &ParameterState, source: &Voicing, phase_seed: Seed) -> StretchKey {
    let settings = format!(
        "{}|{}",
        params.canonical_section(Section::Stretch),
        params.canonical_section(Section::Timbre)
    );
    StretchKey::new(&settings, &source.notes, phase_seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harmony::ScaleFamily;

    const SR: u32 = 8_000;

    fn config() -> EngineConfig {
        EngineConfig {
            sample_rate: SR,
            stretch_execution: StretchExecution::Inline,
            ..EngineConfig::default()
        }
    }

    fn quiet_params() -> ParameterState {
        ParameterState {
            stretch_enabled: 0.0,
            ..ParameterState::default()
        }
    }

    fn bucket() -> TimeBucket {
        TimeBucket::parse("2024-01-01T00").unwrap()
    }

    #[test]
    fn test_first_phrase_planned_at_construction() {
        let (mut control, _graph) = ControlPlane::new(&config(), &quiet_params(), bucket()).unwrap();
        let events = control.drain_events();
        assert!(matches!(
            events.as_slice(),
            [EngineEvent::PhraseBoundary { index: 0, .. }]
        ));
        assert_eq!(control.last_phrase().map(|p| p.index), Some(0));
    }

    #[test]
    fn test_bad_scale_table_falls_back() {
        let mut config = config();
        config.scale_table = Some(vec![ScaleFamily::new(
            "broken",
            &[],
            0.5,
            crate::harmony::TensionClass::Color,
        )]);
        let (mut control, _graph) = ControlPlane::new(&config, &quiet_params(), bucket()).unwrap();
        let events = control.drain_events();
        assert!(matches!(events[0], EngineEvent::ConfigFallback { .. }));
        // The built-in table was used, so a real scale was chosen.
        assert_ne!(control.last_phrase().map(|p| p.scale.name.as_str()), Some("broken"));
    }

    #[test]
    fn test_bad_reverb_override_falls_back_to_hall() {
        let mut config = config();
        config.reverb_preset_override = Some("bathroom".to_string());
        let (mut control, graph) = ControlPlane::new(&config, &quiet_params(), bucket()).unwrap();
        assert_eq!(graph.reverb_preset(), ReverbPreset::Hall);
        let events = control.drain_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::ConfigFallback { message } if message.contains("bathroom"))));
    }

    #[test]
    fn test_param_change_queues_reseed() {
        let (mut control, _graph) = ControlPlane::new(&config(), &quiet_params(), bucket()).unwrap();
        let seed = control.seed();
        let mut params = quiet_params();
        params.tension = 0.9;
        control.update(&params);
        assert_eq!(control.seed(), seed);
        assert_eq!(control.pending_seed(), Some(derive_seed(&bucket(), &params)));
    }

    #[test]
    fn test_bucket_change_queues_reseed() {
        let (mut control, _graph) = ControlPlane::new(&config(), &quiet_params(), bucket()).unwrap();
        let next = TimeBucket::parse("2024-01-01T01").unwrap();
        control.set_bucket(next.clone());
        assert_eq!(
            control.pending_seed(),
            Some(derive_seed(&next, &quiet_params()))
        );
    }

    #[test]
    fn test_inline_stretch_delivered_with_first_phrase() {
        let mut params = ParameterState::default();
        params.stretch_source_s = 0.5;
        params.stretch_factor = 2.0;
        let (mut control, _graph) = ControlPlane::new(&config(), &params, bucket()).unwrap();
        let events = control.drain_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::StretchReady { .. })));
        assert_eq!(control.cached_beds(), 1);
        assert!(!control.stretch_in_flight());
    }

    #[test]
    fn test_stretch_key_tracks_source_and_settings() {
        let params = ParameterState::default();
        let a = Voicing {
            notes: [40, 44, 47, 51, 54, 57],
        };
        let b = Voicing {
            notes: [41, 44, 47, 51, 54, 57],
        };
        assert_eq!(stretch_key(&params, &a, 1), stretch_key(&params, &a, 1));
        assert_ne!(stretch_key(&params, &a, 1), stretch_key(&params, &b, 1));
        assert_ne!(stretch_key(&params, &a, 1), stretch_key(&params, &a, 2));
        let mut brighter = params.clone();
        brighter.brightness = 0.9;
        assert_ne!(stretch_key(&params, &a, 1), stretch_key(&brighter, &a, 1));
    }
}
