//! Single-threaded orchestration of the control plane and the audio graph.
//!
//! [`Engine::tick`] is the pull-based render call: it brings the control
//! plane up to date and renders the next block. Hosts with a real audio
//! thread use [`Engine::into_parts`] and drive the two halves separately.

use std::time::Duration;

use flurry_params::{ParameterState, Seed, TimeBucket};
use tracing::info;

use crate::block::AudioBlock;
use crate::config::EngineConfig;
use crate::control::ControlPlane;
use crate::error::EngineResult;
use crate::events::EngineEvent;
use crate::graph::AudioGraph;
use crate::harmony::Phrase;
use crate::reverb::ReverbPreset;

/// The generative engine.
#[derive(Debug)]
pub struct Engine {
    control: ControlPlane,
    graph: AudioGraph,
    block: AudioBlock,
    max_block: usize,
    running: bool,
}

impl Engine {
    /// Builds an engine. The transport starts stopped.
    pub fn new(config: EngineConfig, params: &ParameterState, bucket: TimeBucket) -> EngineResult<Self> {
        let (control, graph) = ControlPlane::new(&config, params, bucket)?;
        info!(
            sample_rate = config.sample_rate,
            max_block = config.max_block_size,
            "engine ready"
        );
        Ok(Self {
            control,
            graph,
            block: AudioBlock::silence(config.max_block_size),
            max_block: config.max_block_size.max(1),
            running: false,
        })
    }

    pub fn start(&mut self) {
        self.running = true;
        self.control.set_running(true);
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.control.set_running(false);
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Renders the next `frames` frames with `params` applied.
    ///
    /// While stopped the block is silent and musical time holds still.
    pub fn tick(&mut self, params: &ParameterState, frames: usize) -> &AudioBlock {
        self.block.reset(frames);
        let mut offset = 0;
        while offset < frames {
            let n = (frames - offset).min(self.max_block);
            self.control.update(params);
            let (left, right) = self.block.channels_mut();
            self.graph
                .process(&mut left[offset..offset + n], &mut right[offset..offset + n]);
            offset += n;
        }
        &self.block
    }

    /// Moves to a new time bucket; the seed changes at the next phrase.
    pub fn set_bucket(&mut self, bucket: TimeBucket) {
        self.control.set_bucket(bucket);
    }

    pub fn seed(&self) -> Seed {
        self.control.seed()
    }

    pub fn pending_seed(&self) -> Option<Seed> {
        self.control.pending_seed()
    }

    pub fn bucket(&self) -> &TimeBucket {
        self.control.bucket()
    }

    /// Takes the events queued since the last call.
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        self.control.drain_events()
    }

    /// Waits up to `timeout` for a background stretch render. Returns true
    /// once none is outstanding.
    pub fn wait_for_stretch(&mut self, timeout: Duration) -> bool {
        self.control.wait_for_stretch(timeout)
    }

    /// The most recently decided phrase (up to a couple of seconds ahead of
    /// what is sounding).
    pub fn last_phrase(&self) -> Option<&Phrase> {
        self.control.last_phrase()
    }

    /// Index of the phrase currently sounding.
    pub fn phrase_index(&self) -> Option<u64> {
        self.graph.phrase_index()
    }

    /// Musical time in seconds.
    pub fn position_seconds(&self) -> f64 {
        self.graph.position_frames() as f64 / self.graph.sample_rate()
    }

    pub fn reverb_preset(&self) -> ReverbPreset {
        self.graph.reverb_preset()
    }

    /// Blocks rendered with no stretch bed available.
    pub fn underruns(&self) -> u64 {
        self.graph.underruns()
    }

    pub fn dropped_grains(&self) -> u64 {
        self.graph.dropped_grains()
    }

    /// Splits into the control half and the real-time half.
    pub fn into_parts(self) -> (ControlPlane, AudioGraph) {
        (self.control, self.graph)
    }
}
