//! Notifications for visualization and diagnostics.

use flurry_params::Seed;
use serde::Serialize;

/// Something the control plane did that a collaborator may want to show.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A phrase was decided. `start_seconds` is its position in musical time.
    PhraseBoundary {
        index: u64,
        start_seconds: f64,
        scale: String,
    },
    /// A new seed took effect at a phrase boundary.
    Reseeded { seed: Seed },
    /// A stretch bed finished rendering and was handed to the audio side.
    StretchReady { phase_seed: Seed },
    /// A stretch render was superseded before it finished.
    StretchCancelled,
    /// A configuration value was rejected and a default used instead.
    ConfigFallback { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_serialize_tagged() {
        let json = serde_json::to_string(&EngineEvent::Reseeded { seed: 7 }).unwrap();
        assert_eq!(json, r#"{"event":"reseeded","seed":7}"#);
        let json = serde_json::to_string(&EngineEvent::StretchCancelled).unwrap();
        assert_eq!(json, r#"{"event":"stretch_cancelled"}"#);
    }
}
