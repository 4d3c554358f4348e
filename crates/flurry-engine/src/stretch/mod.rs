//! The stretch bed: offline Paulstretch rendering, its background worker,
//! a content-addressed cache and the real-time player.

mod cache;
mod paulstretch;
mod player;
mod worker;

pub use cache::{StretchCache, StretchKey};
pub use paulstretch::{render, render_cancellable, StretchBuffer, StretchSettings};
pub use player::StretchPlayer;
pub use worker::{StretchJob, StretchOutcome, StretchWorker};
