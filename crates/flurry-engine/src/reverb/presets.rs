//! Reverb topology presets.
//!
//! Each preset is a fixed table of comb taps and allpass diffusers. Tables
//! are constant data and never depend on the seed.

use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// One feedback comb tap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tap {
    pub delay_ms: f64,
    pub feedback: f64,
}

/// Constant description of a topology.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresetTable {
    pub combs: &'static [Tap],
    pub allpasses_ms: &'static [f64],
    /// Damping in the comb feedback path, 0 (bright) .. 1 (dark).
    pub damping: f64,
}

const fn tap(delay_ms: f64, feedback: f64) -> Tap {
    Tap { delay_ms, feedback }
}

const DIFFUSERS: [f64; 4] = [12.61, 10.0, 7.73, 5.1];

const PLATE: PresetTable = PresetTable {
    combs: &[
        tap(19.7, 0.78),
        tap(23.3, 0.77),
        tap(27.1, 0.78),
        tap(29.9, 0.76),
        tap(33.7, 0.77),
        tap(37.1, 0.75),
    ],
    allpasses_ms: &[5.1, 3.7, 2.3],
    damping: 0.15,
};

const HALL: PresetTable = PresetTable {
    combs: &[
        tap(25.3, 0.84),
        tap(26.9, 0.84),
        tap(28.9, 0.83),
        tap(30.7, 0.84),
        tap(32.2, 0.83),
        tap(33.8, 0.82),
        tap(35.3, 0.83),
        tap(36.7, 0.82),
    ],
    allpasses_ms: &DIFFUSERS,
    damping: 0.3,
};

const CATHEDRAL: PresetTable = PresetTable {
    combs: &[
        tap(43.1, 0.90),
        tap(47.9, 0.90),
        tap(53.3, 0.89),
        tap(59.1, 0.90),
        tap(61.7, 0.89),
        tap(67.3, 0.88),
        tap(71.9, 0.89),
        tap(79.3, 0.88),
    ],
    allpasses_ms: &DIFFUSERS,
    damping: 0.35,
};

const DARK_HALL: PresetTable = PresetTable {
    combs: &[
        tap(27.8, 0.86),
        tap(29.6, 0.86),
        tap(31.8, 0.85),
        tap(33.8, 0.86),
        tap(35.4, 0.85),
        tap(37.2, 0.84),
        tap(38.8, 0.85),
        tap(40.4, 0.84),
    ],
    allpasses_ms: &DIFFUSERS,
    damping: 0.65,
};

/// Named reverb topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReverbPreset {
    Plate,
    #[default]
    Hall,
    Cathedral,
    DarkHall,
}

impl ReverbPreset {
    pub const ALL: [ReverbPreset; 4] = [
        ReverbPreset::Plate,
        ReverbPreset::Hall,
        ReverbPreset::Cathedral,
        ReverbPreset::DarkHall,
    ];

    /// Maps the `reverb_preset` slider index; out-of-range indices clamp.
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index.min(Self::ALL.len() - 1)]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReverbPreset::Plate => "plate",
            ReverbPreset::Hall => "hall",
            ReverbPreset::Cathedral => "cathedral",
            ReverbPreset::DarkHall => "dark_hall",
        }
    }

    pub fn table(&self) -> &'static PresetTable {
        match self {
            ReverbPreset::Plate => &PLATE,
            ReverbPreset::Hall => &HALL,
            ReverbPreset::Cathedral => &CATHEDRAL,
            ReverbPreset::DarkHall => &DARK_HALL,
        }
    }
}

impl fmt::Display for ReverbPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReverbPreset {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "plate" => Ok(ReverbPreset::Plate),
            "hall" => Ok(ReverbPreset::Hall),
            "cathedral" => Ok(ReverbPreset::Cathedral),
            "dark_hall" | "darkhall" => Ok(ReverbPreset::DarkHall),
            _ => Err(EngineError::UnknownReverbPreset {
                name: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!("hall".parse::<ReverbPreset>().unwrap(), ReverbPreset::Hall);
        assert_eq!("Dark Hall".parse::<ReverbPreset>().unwrap(), ReverbPreset::DarkHall);
        assert_eq!("dark-hall".parse::<ReverbPreset>().unwrap(), ReverbPreset::DarkHall);
        let err = "bathroom".parse::<ReverbPreset>().unwrap_err();
        assert_eq!(err.code(), "ENGINE_003");
    }

    #[test]
    fn test_tables_are_stable() {
        for preset in ReverbPreset::ALL {
            let table = preset.table();
            assert!(!table.combs.is_empty());
            assert!(table.combs.iter().all(|t| t.feedback < 1.0 && t.delay_ms > 0.0));
            assert!((0.0..1.0).contains(&table.damping));
        }
    }

    #[test]
    fn test_cathedral_longer_than_hall() {
        let longest = |p: ReverbPreset| {
            p.table()
                .combs
                .iter()
                .map(|t| t.delay_ms)
                .fold(0.0, f64::max)
        };
        assert!(longest(ReverbPreset::Cathedral) > longest(ReverbPreset::Hall));
    }

    #[test]
    fn test_from_index_clamps() {
        assert_eq!(ReverbPreset::from_index(0), ReverbPreset::Plate);
        assert_eq!(ReverbPreset::from_index(9), ReverbPreset::DarkHall);
    }
}
