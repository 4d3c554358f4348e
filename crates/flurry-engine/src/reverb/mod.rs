//! Reverb: fixed topology presets, the tap-bank network and its delay line.

mod delay_line;
mod network;
mod presets;

pub use delay_line::DelayLine;
pub use network::{ReverbNetwork, ReverbSettings, TapBank};
pub use presets::{PresetTable, ReverbPreset, Tap};
