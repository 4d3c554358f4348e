//! Attack/release envelope generator.
//!
//! Voices hold at full level between attack and release. A re-trigger starts
//! the attack from the current level, so the envelope never jumps.

/// Envelope generator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeState {
    /// Rising toward 1.
    Attack,
    /// Held at 1.
    Sustain,
    /// Falling toward 0.
    Release,
    /// Silent.
    Idle,
}

/// Attack/release times in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArParams {
    pub attack: f64,
    pub release: f64,
}

impl ArParams {
    pub fn new(attack: f64, release: f64) -> Self {
        Self {
            attack: attack.max(0.0),
            release: release.max(0.0),
        }
    }

    /// Derives voice times from the hardness control.
    ///
    /// Soft (0) gives slow swells, hard (1) gives near-plucked onsets.
    pub fn from_hardness(hardness: f64, attack_scale: f64, release_scale: f64) -> Self {
        let h = hardness.clamp(0.0, 1.0);
        let attack = 3.0 + (0.02 - 3.0) * h;
        let release = 6.0 + (0.3 - 6.0) * h;
        Self::new(attack * attack_scale, release * release_scale)
    }
}

impl Default for ArParams {
    fn default() -> Self {
        Self {
            attack: 0.5,
            release: 2.0,
        }
    }
}

/// Linear attack/release envelope.
#[derive(Debug, Clone)]
pub struct ArEnvelope {
    params: ArParams,
    sample_rate: f64,
    state: EnvelopeState,
    level: f64,
    release_step: f64,
}

impl ArEnvelope {
    pub fn new(params: ArParams, sample_rate: f64) -> Self {
        Self {
            params,
            sample_rate,
            state: EnvelopeState::Idle,
            level: 0.0,
            release_step: 0.0,
        }
    }

    /// Changes times. Takes effect on the next stage transition.
    pub fn set_params(&mut self, params: ArParams) {
        self.params = params;
    }

    /// Starts (or restarts) the attack from the current level.
    pub fn trigger(&mut self) {
        self.state = EnvelopeState::Attack;
    }

    /// Starts the release from the current level.
    pub fn release(&mut self) {
        if self.state == EnvelopeState::Idle {
            return;
        }
        let samples = self.params.release * self.sample_rate;
        self.release_step = if samples > 0.0 {
            self.level / samples
        } else {
            self.level
        };
        self.state = EnvelopeState::Release;
    }

    /// Falls to silence over `seconds`, ignoring the configured release.
    pub fn choke(&mut self, seconds: f64) {
        if self.state == EnvelopeState::Idle {
            return;
        }
        let samples = seconds.max(0.0) * self.sample_rate;
        self.release_step = if samples > 1.0 {
            self.level / samples
        } else {
            self.level
        };
        self.state = EnvelopeState::Release;
    }

    pub fn state(&self) -> EnvelopeState {
        self.state
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn is_idle(&self) -> bool {
        self.state == EnvelopeState::Idle
    }

    /// Generates the next envelope sample.
    #[inline]
    pub fn next_sample(&mut self) -> f64 {
        match self.state {
            EnvelopeState::Attack => {
                let samples = self.params.attack * self.sample_rate;
                if samples > 1.0 {
                    self.level += 1.0 / samples;
                } else {
                    self.level = 1.0;
                }
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.state = EnvelopeState::Sustain;
                }
            }
            EnvelopeState::Sustain => {
                self.level = 1.0;
            }
            EnvelopeState::Release => {
                self.level -= self.release_step;
                if self.level <= 0.0 {
                    self.level = 0.0;
                    self.state = EnvelopeState::Idle;
                }
            }
            EnvelopeState::Idle => {
                self.level = 0.0;
            }
        }
        self.level
    }
}
