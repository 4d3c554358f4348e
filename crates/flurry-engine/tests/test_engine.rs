//! End-to-end engine tests: determinism, phrase timing, reverb crossfades,
//! stretch handoff and configuration fallbacks.

use std::time::Duration;

use flurry_engine::granular::{generate_sequence, GranularSettings};
use flurry_engine::stretch::{render, StretchSettings};
use flurry_engine::voice::{VoiceBank, VoiceSettings};
use flurry_engine::{
    Composer, Engine, EngineConfig, EngineEvent, ReverbPreset, RngStream, ScaleTable,
    StretchExecution, PHRASE_SECONDS,
};
use flurry_params::{derive_seed, ParameterState, TimeBucket};
use pretty_assertions::assert_eq;

const SR: u32 = 8_000;

fn bucket() -> TimeBucket {
    TimeBucket::parse("2024-01-01T00").unwrap()
}

fn config(sample_rate: u32) -> EngineConfig {
    EngineConfig {
        sample_rate,
        stretch_execution: StretchExecution::Inline,
        ..EngineConfig::default()
    }
}

/// Defaults without the stretch bed, which keeps renders cheap.
fn dry_params() -> ParameterState {
    ParameterState {
        stretch_enabled: 0.0,
        ..ParameterState::default()
    }
}

fn render_seconds(engine: &mut Engine, params: &ParameterState, seconds: f64, block: usize) -> Vec<f64> {
    let total = (seconds * SR as f64) as usize;
    let mut out = Vec::with_capacity(total);
    while out.len() < total {
        let n = block.min(total - out.len());
        out.extend_from_slice(&engine.tick(params, n).left);
    }
    out
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn test_scenario_a_same_bucket_same_first_phrase() {
    let params = ParameterState::default();
    let a = Engine::new(config(16_000), &params, bucket()).unwrap();
    let b = Engine::new(config(16_000), &params, bucket()).unwrap();

    assert_eq!(a.seed(), b.seed());
    let first_a = a.last_phrase().unwrap();
    let first_b = b.last_phrase().unwrap();
    assert_eq!(first_a.index, 0);
    assert_eq!(first_a.scale.name, first_b.scale.name);
    assert_eq!(first_a.progression, first_b.progression);
    assert_eq!(first_a.voicings, first_b.voicings);
}

#[test]
fn test_scenario_b_one_slider_changes_decisions() {
    let base = ParameterState::default();
    let mut nudged = base.clone();
    nudged.reverb_width += 0.001;
    assert_ne!(derive_seed(&bucket(), &base), derive_seed(&bucket(), &nudged));
}

#[test]
fn test_output_independent_of_block_size() {
    let params = dry_params();
    let mut small = Engine::new(config(SR), &params, bucket()).unwrap();
    let mut large = Engine::new(config(SR), &params, bucket()).unwrap();
    small.start();
    large.start();

    let a = render_seconds(&mut small, &params, 3.0, 64);
    let b = render_seconds(&mut large, &params, 3.0, 1000);
    assert_eq!(a.len(), b.len());
    assert!(a.iter().zip(&b).all(|(x, y)| x == y));
    assert!(a.iter().any(|s| s.abs() > 1e-4));
}

#[test]
fn test_grain_batches_reproducible() {
    let params = ParameterState::default();
    let seed = derive_seed(&bucket(), &params);
    let mut a = Composer::new(seed, ScaleTable::default(), 256);
    let mut b = Composer::new(seed, ScaleTable::default(), 256);
    for _ in 0..3 {
        let x = a.compose(&params, false);
        let y = b.compose(&params, false);
        assert_eq!(x.grains, y.grains);
        assert!(!x.grains.is_empty());
    }

    let settings = GranularSettings::from_params(&params);
    let first = generate_sequence(&mut RngStream::new(seed), 48, &settings);
    let second = generate_sequence(&mut RngStream::new(seed), 48, &settings);
    assert_eq!(first, second);
}

#[test]
fn test_paulstretch_bit_identical() {
    let params = ParameterState::default();
    let mut composer = Composer::new(7, ScaleTable::default(), 16);
    let phrase = composer.compose(&params, false).phrase;
    let source = VoiceBank::render_offline(
        &phrase.voicings[0],
        VoiceSettings::from_params(&params),
        SR as f64,
        1.0,
    );
    let settings = StretchSettings {
        factor: 3.0,
        ..StretchSettings::from_params(&params)
    };
    let a = render(&source, SR as f64, &settings, 0xC0FFEE);
    let b = render(&source, SR as f64, &settings, 0xC0FFEE);
    assert_eq!(a, b);
    assert!(!a.is_empty());
}

// ============================================================================
// Phrase Timing
// ============================================================================

#[test]
fn test_phrase_changes_only_on_sixteen_second_grid() {
    let params = dry_params();
    let mut engine = Engine::new(config(SR), &params, bucket()).unwrap();
    engine.start();

    let block = 400;
    let mut frame = 0u64;
    let mut current = None;
    while frame < (40.0 * SR as f64) as u64 {
        engine.tick(&params, block);
        let index = engine.phrase_index();
        if index != current {
            let index = index.unwrap();
            let boundary = (index as f64 * PHRASE_SECONDS * SR as f64) as u64;
            assert!(
                boundary >= frame && boundary < frame + block as u64,
                "phrase {index} started in block at frame {frame}"
            );
            current = Some(index);
        }
        frame += block as u64;
    }
    assert_eq!(current, Some(2));

    let starts: Vec<f64> = engine
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            EngineEvent::PhraseBoundary { start_seconds, .. } => Some(start_seconds),
            _ => None,
        })
        .collect();
    assert_eq!(starts, vec![0.0, 16.0, 32.0]);
}

#[test]
fn test_reseed_lands_on_phrase_boundary() {
    let params = dry_params();
    let mut engine = Engine::new(config(SR), &params, bucket()).unwrap();
    engine.start();
    let original = engine.seed();
    render_seconds(&mut engine, &params, 4.0, 500);
    engine.drain_events();

    let mut changed = params.clone();
    changed.tension = 0.9;
    render_seconds(&mut engine, &changed, 4.0, 500);
    assert_eq!(engine.seed(), original);
    let expected = derive_seed(&bucket(), &changed);
    assert_eq!(engine.pending_seed(), Some(expected));

    // Phrase 1 is decided two seconds before it starts.
    render_seconds(&mut engine, &changed, 8.0, 500);
    assert_eq!(engine.seed(), expected);
    let events = engine.drain_events();
    let reseed = events
        .iter()
        .position(|e| matches!(e, EngineEvent::Reseeded { seed } if *seed == expected))
        .expect("reseed event");
    assert!(matches!(
        events[reseed + 1],
        EngineEvent::PhraseBoundary { index: 1, .. }
    ));
}

// ============================================================================
// Reverb Crossfade
// ============================================================================

#[test]
fn test_scenario_c_hall_to_cathedral_is_continuous() {
    let mut hall = dry_params();
    hall.reverb_preset = 1.0;
    let mut cathedral = hall.clone();
    cathedral.reverb_preset = 2.0;

    let mut switched = Engine::new(config(SR), &hall, bucket()).unwrap();
    let mut steady = Engine::new(config(SR), &hall, bucket()).unwrap();
    switched.start();
    steady.start();

    let before = render_seconds(&mut switched, &hall, 3.0, 256);
    render_seconds(&mut steady, &hall, 3.0, 256);
    assert_eq!(switched.reverb_preset(), ReverbPreset::Hall);

    let after = render_seconds(&mut switched, &cathedral, 1.0, 256);
    let reference = render_seconds(&mut steady, &hall, 1.0, 256);
    assert_eq!(switched.reverb_preset(), ReverbPreset::Cathedral);

    // At the switch instant the output still follows the old bank.
    for i in 0..8 {
        assert!((after[i] - reference[i]).abs() < 0.01, "sample {i}");
    }

    // No step larger than the signal already makes on its own.
    let max_step = |s: &[f64]| s.windows(2).fold(0.0f64, |m, w| m.max((w[1] - w[0]).abs()));
    let pre = max_step(&before[before.len() - SR as usize..]);
    let mut joined = vec![before[before.len() - 1]];
    joined.extend_from_slice(&after[..400]);
    let at_switch = max_step(&joined);
    assert!(at_switch <= pre * 2.0 + 1e-3, "{at_switch} vs {pre}");
}

// ============================================================================
// Stretch Bed
// ============================================================================

#[test]
fn test_background_stretch_arrives_and_stops_underruns() {
    let config = EngineConfig {
        sample_rate: SR,
        stretch_execution: StretchExecution::Background,
        ..EngineConfig::default()
    };
    let mut params = ParameterState::default();
    params.stretch_source_s = 0.5;
    params.stretch_factor = 2.0;
    params.stretch_window_s = 0.05;

    let mut engine = Engine::new(config, &params, bucket()).unwrap();
    engine.start();
    engine.tick(&params, 256);
    assert!(engine.wait_for_stretch(Duration::from_secs(60)));

    engine.tick(&params, 256);
    let underruns = engine.underruns();
    engine.tick(&params, 2048);
    assert_eq!(engine.underruns(), underruns);

    let events = engine.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::StretchReady { .. })));
}

#[test]
fn test_stretch_disabled_never_renders() {
    let mut engine = Engine::new(config(SR), &dry_params(), bucket()).unwrap();
    engine.start();
    render_seconds(&mut engine, &dry_params(), 1.0, 512);
    assert!(!engine
        .drain_events()
        .iter()
        .any(|e| matches!(e, EngineEvent::StretchReady { .. })));
}

// ============================================================================
// Transport and Configuration
// ============================================================================

#[test]
fn test_stopped_engine_is_silent_and_holds_time() {
    let params = dry_params();
    let mut engine = Engine::new(config(SR), &params, bucket()).unwrap();
    engine.start();
    render_seconds(&mut engine, &params, 1.0, 512);
    let position = engine.position_seconds();

    engine.stop();
    let silent = render_seconds(&mut engine, &params, 1.0, 512);
    assert!(silent.iter().all(|&s| s == 0.0));
    assert_eq!(engine.position_seconds(), position);

    engine.start();
    render_seconds(&mut engine, &params, 0.5, 512);
    assert!(engine.position_seconds() > position);
}

#[test]
fn test_config_fallbacks_emit_events() {
    let config = EngineConfig {
        reverb_preset_override: Some("swimming pool".to_string()),
        ..config(SR)
    };
    let mut engine = Engine::new(config, &dry_params(), bucket()).unwrap();
    assert_eq!(engine.reverb_preset(), ReverbPreset::Hall);
    let fallbacks = engine
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, EngineEvent::ConfigFallback { .. }))
        .count();
    assert_eq!(fallbacks, 1);
}

#[test]
fn test_reverb_override_ignores_slider() {
    let config = EngineConfig {
        reverb_preset_override: Some("dark hall".to_string()),
        ..config(SR)
    };
    let mut params = dry_params();
    params.reverb_preset = 0.0;
    let mut engine = Engine::new(config, &params, bucket()).unwrap();
    assert_eq!(engine.reverb_preset(), ReverbPreset::DarkHall);

    params.reverb_preset = 2.0;
    engine.start();
    engine.tick(&params, 512);
    assert_eq!(engine.reverb_preset(), ReverbPreset::DarkHall);
}
