//! Scale families and tension-weighted selection.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::rng::RngStream;

/// Tension band a scale family belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensionClass {
    Consonant,
    Color,
    High,
}

impl TensionClass {
    /// Classes admitted at a given target tension.
    pub fn band(tension: f64) -> &'static [TensionClass] {
        if tension <= 0.25 {
            &[TensionClass::Consonant]
        } else if tension <= 0.55 {
            &[TensionClass::Consonant, TensionClass::Color]
        } else if tension <= 0.80 {
            &[TensionClass::Color, TensionClass::High]
        } else {
            &[TensionClass::High]
        }
    }
}

fn default_weight() -> f64 {
    1.0
}

/// A named set of semitone offsets from the E root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleFamily {
    pub name: String,
    /// Ascending, unique offsets in `0..12`, starting at 0.
    pub intervals: Vec<u8>,
    /// Position on the tension axis, in `[0, 1]`.
    pub tension: f64,
    pub class: TensionClass,
    /// Selection weight multiplier in `[0, 1]`.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

impl ScaleFamily {
    pub fn new(name: &str, intervals: &[u8], tension: f64, class: TensionClass) -> Self {
        Self {
            name: name.to_string(),
            intervals: intervals.to_vec(),
            tension,
            class,
            weight: 1.0,
        }
    }

    /// Number of degrees.
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Semitone offset of an extended degree (degrees past the top wrap up an octave).
    pub fn semitones(&self, degree: usize) -> i32 {
        let n = self.intervals.len().max(1);
        let octave = (degree / n) as i32;
        self.intervals.get(degree % n).copied().unwrap_or(0) as i32 + 12 * octave
    }
}

/// A validated table of scale families.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleTable {
    families: Vec<ScaleFamily>,
}

impl ScaleTable {
    /// Validates and wraps a family list.
    ///
    /// Rejects empty tables, empty or out-of-range interval sets, tensions or
    /// weights outside `[0, 1]`, and tables whose weights sum to zero.
    pub fn new(families: Vec<ScaleFamily>) -> EngineResult<Self> {
        if families.is_empty() {
            return Err(EngineError::scale_table("table has no families"));
        }
        for family in &families {
            if family.intervals.is_empty() {
                return Err(EngineError::scale_table(format!(
                    "family '{}' has no intervals",
                    family.name
                )));
            }
            if family.intervals[0] != 0 {
                return Err(EngineError::scale_table(format!(
                    "family '{}' must start at 0",
                    family.name
                )));
            }
            let ascending = family.intervals.windows(2).all(|w| w[0] < w[1]);
            if !ascending || family.intervals.iter().any(|&i| i >= 12) {
                return Err(EngineError::scale_table(format!(
                    "family '{}' intervals must be ascending and below 12",
                    family.name
                )));
            }
            if !(0.0..=1.0).contains(&family.tension) {
                return Err(EngineError::scale_table(format!(
                    "family '{}' tension {} outside 0..1",
                    family.name, family.tension
                )));
            }
            if !(0.0..=1.0).contains(&family.weight) {
                return Err(EngineError::scale_table(format!(
                    "family '{}' weight {} outside 0..1",
                    family.name, family.weight
                )));
            }
        }
        let total: f64 = families.iter().map(|f| f.weight).sum();
        if total <= 0.0 {
            return Err(EngineError::ZeroSelectionWeight);
        }
        Ok(Self { families })
    }

    pub fn families(&self) -> &[ScaleFamily] {
        &self.families
    }

    pub fn get(&self, index: usize) -> Option<&ScaleFamily> {
        self.families.get(index)
    }

    /// Selection weights at a target tension.
    ///
    /// Families outside the tension band get zero. If the band is empty or
    /// all-zero, every family is a candidate.
    pub fn weights(&self, tension: f64) -> Vec<f64> {
        let band = TensionClass::band(tension);
        let weigh = |f: &ScaleFamily| f.weight / ((f.tension - tension).abs() + 0.1);
        let banded: Vec<f64> = self
            .families
            .iter()
            .map(|f| if band.contains(&f.class) { weigh(f) } else { 0.0 })
            .collect();
        if banded.iter().any(|&w| w > 0.0) {
            banded
        } else {
            self.families.iter().map(weigh).collect()
        }
    }

    /// Picks a family index with one draw.
    pub fn select(&self, tension: f64, rng: &mut RngStream) -> usize {
        weighted_select(&self.weights(tension), rng)
    }
}

impl Default for ScaleTable {
    fn default() -> Self {
        use TensionClass::*;
        Self {
            families: vec![
                ScaleFamily::new("major", &[0, 2, 4, 5, 7, 9, 11], 0.00, Consonant),
                ScaleFamily::new("major_pentatonic", &[0, 2, 4, 7, 9], 0.03, Consonant),
                ScaleFamily::new("lydian", &[0, 2, 4, 6, 7, 9, 11], 0.10, Consonant),
                ScaleFamily::new("mixolydian", &[0, 2, 4, 5, 7, 9, 10], 0.18, Consonant),
                ScaleFamily::new("minor_pentatonic", &[0, 3, 5, 7, 10], 0.22, Consonant),
                ScaleFamily::new("dorian", &[0, 2, 3, 5, 7, 9, 10], 0.25, Consonant),
                ScaleFamily::new("aeolian", &[0, 2, 3, 5, 7, 8, 10], 0.35, Color),
                ScaleFamily::new("harmonic_minor", &[0, 2, 3, 5, 7, 8, 11], 0.50, Color),
                ScaleFamily::new("melodic_minor", &[0, 2, 3, 5, 7, 9, 11], 0.55, Color),
                ScaleFamily::new("octatonic", &[0, 1, 3, 4, 6, 7, 9, 10], 0.85, High),
                ScaleFamily::new("phrygian_dominant", &[0, 1, 4, 5, 7, 8, 10], 0.90, High),
            ],
        }
    }
}

/// Weighted selection with one draw.
///
/// The threshold is `draw * total`; the first positive-weight candidate whose
/// cumulative weight reaches it wins, so ties resolve to the earlier entry.
pub fn weighted_select(weights: &[f64], rng: &mut RngStream) -> usize {
    let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
    let threshold = rng.next_float() * total;
    let mut cumulative = 0.0;
    let mut last_positive = 0;
    for (i, &w) in weights.iter().enumerate() {
        if w <= 0.0 {
            continue;
        }
        cumulative += w;
        last_positive = i;
        if cumulative >= threshold {
            return i;
        }
    }
    last_positive
}
