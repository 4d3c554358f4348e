//! The decision sequence.
//!
//! A [`Composer`] owns the one [`RngStream`] of an engine and hands it, in
//! strict order, to each consumer for one phrase:
//!
//! 1. harmony (scale, progression, voicings, lead line when enabled)
//! 2. the grain batch
//! 3. the stretch phase seed, only when a new bed is wanted
//!
//! A pending reseed replaces the stream before step 1 of the next phrase, so
//! a new seed never lands mid-phrase.

use flurry_params::{ParameterState, Seed};
use serde::Serialize;

use crate::granular::{generate_sequence, GrainSequence, GranularSettings};
use crate::harmony::{HarmonyEngine, Phrase, ScaleTable};
use crate::rng::RngStream;

/// Everything decided for one phrase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Composition {
    pub phrase: Phrase,
    pub grains: GrainSequence,
    /// Phase seed for a new stretch bed, when one was requested.
    pub stretch_seed: Option<Seed>,
    /// Set when this phrase is the first on a new seed.
    pub reseeded: Option<Seed>,
}

/// Owns the stream and the harmony state.
#[derive(Debug, Clone)]
pub struct Composer {
    seed: Seed,
    pending: Option<Seed>,
    rng: RngStream,
    harmony: HarmonyEngine,
    grain_cap: usize,
}

impl Composer {
    pub fn new(seed: Seed, table: ScaleTable, grain_cap: usize) -> Self {
        Self {
            seed,
            pending: None,
            rng: RngStream::new(seed),
            harmony: HarmonyEngine::new(table),
            grain_cap: grain_cap.max(1),
        }
    }

    /// Seed of the stream in use.
    pub fn seed(&self) -> Seed {
        self.seed
    }

    /// Seed waiting for the next phrase boundary.
    pub fn pending_seed(&self) -> Option<Seed> {
        self.pending
    }

    /// Seed that the next phrase will be drawn from.
    pub fn effective_seed(&self) -> Seed {
        self.pending.unwrap_or(self.seed)
    }

    /// Index of the next phrase.
    pub fn next_index(&self) -> u64 {
        self.harmony.next_index()
    }

    pub fn harmony(&self) -> &HarmonyEngine {
        &self.harmony
    }

    /// Queues `seed` for the next phrase. Re-queuing the live seed cancels a
    /// pending change.
    pub fn reseed(&mut self, seed: Seed) {
        self.pending = (seed != self.seed).then_some(seed);
    }

    /// Decides the next phrase.
    pub fn compose(&mut self, params: &ParameterState, want_stretch: bool) -> Composition {
        let reseeded = self.pending.take().map(|seed| {
            self.seed = seed;
            self.rng = RngStream::new(seed);
            seed
        });

        let phrase = self.harmony.next_phrase(params, &mut self.rng);
        let settings = GranularSettings::from_params(params);
        let grains = generate_sequence(
            &mut self.rng,
            settings.batch_size(self.grain_cap),
            &settings,
        );
        let stretch_seed = want_stretch.then(|| self.rng.fork_seed());

        Composition {
            phrase,
            grains,
            stretch_seed,
            reseeded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn composer(seed: Seed) -> Composer {
        Composer::new(seed, ScaleTable::default(), 256)
    }

    #[test]
    fn test_same_seed_same_compositions() {
        let params = ParameterState::default();
        let mut a = composer(77);
        let mut b = composer(77);
        for i in 0..4 {
            let want = i == 0;
            assert_eq!(a.compose(&params, want), b.compose(&params, want));
        }
    }

    #[test]
    fn test_stretch_seed_is_drawn_last() {
        let params = ParameterState::default();
        let mut composer = composer(3);
        let with = composer.compose(&params, true);

        // Replay harmony and grains by hand, then the next draw is the seed.
        let mut rng = RngStream::new(3);
        let mut harmony = HarmonyEngine::default();
        let phrase = harmony.next_phrase(&params, &mut rng);
        let settings = GranularSettings::from_params(&params);
        let grains = generate_sequence(&mut rng, settings.batch_size(256), &settings);
        assert_eq!(with.phrase, phrase);
        assert_eq!(with.grains, grains);
        assert_eq!(with.stretch_seed, Some(rng.next_u32()));
    }

    #[test]
    fn test_no_stretch_draw_when_not_wanted() {
        let params = ParameterState::default();
        let mut a = composer(9);
        let mut b = composer(9);
        a.compose(&params, false);
        b.compose(&params, true);
        // The extra draw shifts everything after it.
        assert_ne!(a.compose(&params, false), b.compose(&params, false));
    }

    #[test]
    fn test_reseed_waits_for_next_phrase() {
        let params = ParameterState::default();
        let mut composer = composer(1);
        composer.compose(&params, false);
        composer.reseed(2);
        assert_eq!(composer.seed(), 1);
        assert_eq!(composer.pending_seed(), Some(2));

        let next = composer.compose(&params, false);
        assert_eq!(next.reseeded, Some(2));
        assert_eq!(next.phrase.index, 1);
        assert_eq!(composer.seed(), 2);

        let mut fresh = RngStream::new(2);
        let mut harmony = HarmonyEngine::default();
        harmony.next_phrase(&params, &mut RngStream::new(1));
        let expected = harmony.next_phrase(&params, &mut fresh);
        assert_eq!(next.phrase, expected);
    }

    #[test]
    fn test_reseed_to_live_seed_cancels() {
        let mut composer = composer(1);
        composer.reseed(5);
        composer.reseed(1);
        assert_eq!(composer.pending_seed(), None);
    }
}
