//! End-to-end engine scenarios over the simulated backend

use super::fixtures::{silent_wav, write_temp, WavBuilder};
use crate::audio::backend::{AudioBackend, SimulatedBackend, SourceState};
use crate::audio::AudioError;
use crate::config::AudioConfig;
use crate::engine::{AudioEngine, Status};
use approx::assert_relative_eq;
use std::thread;
use std::time::Duration;

const TEARDOWN: Duration = Duration::from_millis(60);

fn engine_without_monitor() -> AudioEngine<SimulatedBackend> {
    crate::foundation::logging::init_for_tests();
    AudioEngine::new(SimulatedBackend::new(), AudioConfig::default().without_idle_teardown())
        .unwrap()
}

fn engine_with_monitor() -> AudioEngine<SimulatedBackend> {
    engine_with_teardown(TEARDOWN)
}

fn engine_with_teardown(delay: Duration) -> AudioEngine<SimulatedBackend> {
    crate::foundation::logging::init_for_tests();
    AudioEngine::new(SimulatedBackend::new(), AudioConfig::default().with_idle_teardown(delay))
        .unwrap()
}

fn voice_states(engine: &AudioEngine<SimulatedBackend>, id: &str) -> Vec<SourceState> {
    let sources: Vec<_> = engine.pool(id).unwrap().voices().iter().map(|v| v.source()).collect();
    engine
        .with_backend(|backend| sources.iter().map(|&s| backend.query_state(s)).collect())
        .unwrap()
}

fn device_acquired(engine: &AudioEngine<SimulatedBackend>) -> bool {
    engine.with_backend(|backend| backend.is_device_acquired()).unwrap()
}

fn advance(engine: &AudioEngine<SimulatedBackend>, seconds: f32) {
    engine.with_backend(|backend| backend.advance(seconds)).unwrap();
}

fn wait_for_teardown() {
    thread::sleep(TEARDOWN * 8);
}

#[test]
fn test_boom_scenario() {
    let mut engine = engine_without_monitor();
    let path = silent_wav("boom.wav", 1.0);

    assert_eq!(
        engine.preload_audio("boom", &path, 0.8, 3).unwrap(),
        Status::Loaded("boom".into())
    );
    let pool = engine.pool("boom").unwrap();
    assert_eq!(pool.len(), 3);
    for voice in pool.voices() {
        assert_relative_eq!(voice.gain(), 0.8);
    }

    // Rapid plays take distinct idle voices in pool order
    let mut started = Vec::new();
    for _ in 0..3 {
        match engine.play("boom").unwrap() {
            Status::Playing { voice, .. } => started.push(voice),
            other => panic!("expected an idle voice, got {other:?}"),
        }
        advance(&engine, 0.1);
    }
    assert_eq!(started, vec![0, 1, 2]);

    // All busy: the first voice has played longest and is restarted
    assert_eq!(
        engine.play("boom").unwrap(),
        Status::Overwriting { id: "boom".into(), voice: 0 }
    );
    let first = engine.pool("boom").unwrap().voices()[0].source();
    assert_eq!(engine.with_backend(|b| b.query_elapsed(first)).unwrap(), 0.0);

    assert_eq!(engine.stop("boom").unwrap(), Status::Stopped("boom".into()));
    assert_eq!(voice_states(&engine, "boom"), vec![SourceState::Idle; 3]);

    assert_eq!(engine.unload("boom").unwrap(), Status::Unloaded("boom".into()));
    assert!(matches!(engine.play("boom"), Err(AudioError::NotLoaded(_))));
    assert!(matches!(engine.loop_sound("boom"), Err(AudioError::NotLoaded(_))));
    assert!(matches!(engine.stop("boom"), Err(AudioError::NotLoaded(_))));
    assert!(matches!(engine.unload("boom"), Err(AudioError::NotLoaded(_))));
}

#[test]
fn test_third_play_on_two_voices_steals_longest_playing() {
    let mut engine = engine_without_monitor();
    let path = silent_wav("boom_pair.wav", 1.0);
    engine.preload_audio("boom", &path, 0.8, 2).unwrap();

    assert!(matches!(engine.play("boom").unwrap(), Status::Playing { voice: 0, .. }));
    advance(&engine, 0.3);
    assert!(matches!(engine.play("boom").unwrap(), Status::Playing { voice: 1, .. }));
    advance(&engine, 0.1);

    assert_eq!(
        engine.execute("play boom"),
        "Every single voice is currently being played, now overwriting previous ones"
    );
    let sources: Vec<_> = engine.pool("boom").unwrap().voices().iter().map(|v| v.source()).collect();
    assert_eq!(engine.with_backend(|b| b.start_count(sources[0])).unwrap(), 2);
    assert_eq!(engine.with_backend(|b| b.start_count(sources[1])).unwrap(), 1);
}

#[test]
fn test_missing_data_chunk_then_retry() {
    let mut engine = engine_without_monitor();
    let broken = WavBuilder::new(1, 8_000, 16).without_data().build();
    let path = write_temp("retry.wav", &broken);

    let status = engine.execute(&format!("preloadAudio crash {} 1.0 2", path.display()));
    assert!(status.starts_with("Not loaded. Failed to decode crash"), "{status}");
    assert!(!engine.is_loaded("crash"));
    assert_eq!(engine.voice_count("crash"), 0);

    let fixed = WavBuilder::new(1, 8_000, 16).samples_16(&[0; 800]).build();
    std::fs::write(&path, fixed).unwrap();
    assert_eq!(
        engine.preload_audio("crash", &path, 1.0, 2).unwrap(),
        Status::Loaded("crash".into())
    );
    assert_eq!(engine.voice_count("crash"), 2);
}

#[test]
fn test_repreload_changes_nothing() {
    let mut engine = engine_without_monitor();
    let path = silent_wav("repreload.wav", 0.5);
    engine.preload_audio("hum", &path, 0.4, 2).unwrap();
    let before = engine.pool("hum").unwrap().clone();

    assert_eq!(
        engine.preload_audio("hum", &path, 1.0, 5).unwrap(),
        Status::AlreadyLoaded("hum".into())
    );
    assert_eq!(
        engine.preload_fx("hum", &path).unwrap(),
        Status::AlreadyLoaded("hum".into())
    );
    assert_eq!(engine.pool("hum").unwrap(), &before);
    assert_eq!(engine.with_backend(|b| b.buffer_count()).unwrap(), 1);
}

#[test]
fn test_missing_file_is_reported() {
    let mut engine = engine_without_monitor();
    let missing = std::env::temp_dir().join("lowlatency_audio_no_such_asset.wav");

    assert!(matches!(
        engine.preload_fx("ghost", &missing),
        Err(AudioError::AssetNotFound { .. })
    ));
    assert!(!engine.is_loaded("ghost"));
}

#[test]
fn test_protocol_session() {
    let mut engine = engine_without_monitor();
    let fx = silent_wav("session_fx.wav", 0.2);
    let hum = silent_wav("session_hum.wav", 1.0);

    let session = [
        (format!("preloadFX click {}", fx.display()), "File: <click> is loaded".to_string()),
        (format!("preloadFX click {}", fx.display()), "Already preloaded click".to_string()),
        ("play click".to_string(), "Playing click".to_string()),
        (
            "loop click".to_string(),
            "Voices loaded via preloadFX are not intended to be looped or stopped.".to_string(),
        ),
        (format!("preloadAudio hum {} 0.5 2", hum.display()), "File: <hum> is loaded".to_string()),
        ("loop hum".to_string(), "Looping hum".to_string()),
        ("loop hum".to_string(), "hum is already playing".to_string()),
        ("stop hum".to_string(), "Stopped hum".to_string()),
        ("unload hum".to_string(), "Unloading hum".to_string()),
        (
            "stop hum".to_string(),
            "Could not find the file hum. Maybe it hasn't been loaded.".to_string(),
        ),
        (
            "fade hum".to_string(),
            "Command not found, choose either: preloadFX, preloadAudio, play, loop, stop, or unload"
                .to_string(),
        ),
    ];

    for (line, expected) in session {
        assert_eq!(engine.execute(&line), expected, "for '{line}'");
    }
}

#[test]
fn test_idle_device_is_torn_down() {
    let mut engine = engine_with_monitor();
    let path = silent_wav("idle.wav", 0.5);
    engine.preload_fx("blip", &path).unwrap();
    assert!(device_acquired(&engine));

    wait_for_teardown();

    assert!(!device_acquired(&engine));
    assert_eq!(engine.monitor().unwrap().teardown_count(), 1);
    // Records survive the teardown
    assert!(engine.is_loaded("blip"));
}

#[test]
fn test_play_pushes_teardown_out() {
    let mut engine = engine_with_teardown(Duration::from_millis(500));
    let path = silent_wav("busy.wav", 0.5);
    engine.preload_fx("blip", &path).unwrap();

    thread::sleep(Duration::from_millis(300));
    engine.play("blip").unwrap();
    thread::sleep(Duration::from_millis(300));
    // Past the preload's deadline, but within the play's
    assert!(device_acquired(&engine));
    assert_eq!(engine.monitor().unwrap().teardown_count(), 0);

    thread::sleep(Duration::from_millis(1_000));
    assert!(!device_acquired(&engine));
    assert_eq!(engine.monitor().unwrap().teardown_count(), 1);
}

#[test]
fn test_device_released_after_last_play() {
    let mut engine = engine_with_monitor();
    let path = silent_wav("last_play.wav", 0.5);
    engine.preload_fx("blip", &path).unwrap();
    engine.play("blip").unwrap();
    engine.play("blip").unwrap();

    wait_for_teardown();

    assert!(!device_acquired(&engine));
    assert!(!engine.monitor().unwrap().is_armed());
    assert_eq!(engine.monitor().unwrap().teardown_count(), 1);
}

#[test]
fn test_already_loaded_preload_pushes_teardown_out() {
    let mut engine = engine_with_teardown(Duration::from_millis(500));
    let path = silent_wav("busy_repreload.wav", 0.5);
    engine.preload_fx("blip", &path).unwrap();

    thread::sleep(Duration::from_millis(300));
    assert_eq!(
        engine.preload_fx("blip", &path).unwrap(),
        Status::AlreadyLoaded("blip".into())
    );
    thread::sleep(Duration::from_millis(300));
    assert!(device_acquired(&engine));

    thread::sleep(Duration::from_millis(1_000));
    assert!(!device_acquired(&engine));
}

#[test]
fn test_play_after_teardown_rebuilds_pool() {
    let mut engine = engine_with_monitor();
    let path = silent_wav("rebuild.wav", 1.0);
    engine.preload_audio("boom", &path, 0.8, 3).unwrap();
    let old_sources: Vec<_> = engine.pool("boom").unwrap().voices().iter().map(|v| v.source()).collect();

    wait_for_teardown();
    assert!(!device_acquired(&engine));

    assert_eq!(
        engine.play("boom").unwrap(),
        Status::Playing { id: "boom".into(), voice: 0 }
    );
    assert!(device_acquired(&engine));
    assert_eq!(engine.with_backend(|b| b.device_generation()).unwrap(), 2);

    let pool = engine.pool("boom").unwrap();
    assert_eq!(pool.len(), 3);
    for (voice, old) in pool.voices().iter().zip(&old_sources) {
        assert_ne!(voice.source(), *old);
        assert_relative_eq!(voice.gain(), 0.8);
    }
    assert_eq!(engine.with_backend(|b| b.source_count()).unwrap(), 3);
    assert_eq!(engine.with_backend(|b| b.buffer_count()).unwrap(), 1);
    assert_eq!(
        voice_states(&engine, "boom"),
        vec![SourceState::Playing, SourceState::Idle, SourceState::Idle]
    );

    // The reopened device is released again once requests stop
    wait_for_teardown();
    assert!(!device_acquired(&engine));
    assert_eq!(engine.monitor().unwrap().teardown_count(), 2);
}

#[test]
fn test_stop_and_unload_do_not_reopen_device() {
    let mut engine = engine_with_monitor();
    let path = silent_wav("closed.wav", 0.5);
    engine.preload_audio("hum", &path, 1.0, 2).unwrap();

    wait_for_teardown();
    assert!(!device_acquired(&engine));

    assert_eq!(engine.stop("hum").unwrap(), Status::Stopped("hum".into()));
    assert!(!device_acquired(&engine));

    assert_eq!(engine.unload("hum").unwrap(), Status::Unloaded("hum".into()));
    assert!(!device_acquired(&engine));
    assert!(!engine.is_loaded("hum"));
    assert!(engine.pool("hum").is_none());
}

#[test]
fn test_new_preload_rearms_after_teardown() {
    let mut engine = engine_with_monitor();
    let first = silent_wav("rearm_a.wav", 0.5);
    let second = silent_wav("rearm_b.wav", 0.5);
    engine.preload_fx("a", &first).unwrap();

    wait_for_teardown();
    assert_eq!(engine.monitor().unwrap().teardown_count(), 1);

    engine.preload_fx("b", &second).unwrap();
    assert!(device_acquired(&engine));
    // Both assets live on the new device
    assert_eq!(engine.with_backend(|b| b.buffer_count()).unwrap(), 2);

    wait_for_teardown();
    assert_eq!(engine.monitor().unwrap().teardown_count(), 2);
}
