//! Playback adapter tests
//!
//! Drives the adapter with scripted backends and checks routing, fallback
//! and the emitted events.

use orb_core::{AudioFormat, TrackId, TrackInfo};
use orb_playback::{
    BackendStatus, DecodeBackend, DecodePath, LoadRequest, PlaybackAdapter, PlaybackError,
    PlaybackEvent, PlayerState, Result,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ===== Test backend =====

#[derive(Debug, Default)]
struct Script {
    loads: Vec<LoadRequest>,
    calls: Vec<&'static str>,
    gain: Option<f32>,
    status: BackendStatus,
    refuse_loads: bool,
}

#[derive(Clone, Default)]
struct ScriptedBackend(Arc<Mutex<Script>>);

impl ScriptedBackend {
    fn refusing() -> Self {
        let backend = Self::default();
        backend.0.lock().unwrap().refuse_loads = true;
        backend
    }

    fn loads(&self) -> usize {
        self.0.lock().unwrap().loads.len()
    }

    fn last_load(&self) -> LoadRequest {
        self.0.lock().unwrap().loads.last().cloned().unwrap()
    }

    fn calls(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().calls.clone()
    }

    fn gain(&self) -> Option<f32> {
        self.0.lock().unwrap().gain
    }

    fn set_status(&self, status: BackendStatus) {
        self.0.lock().unwrap().status = status;
    }
}

impl DecodeBackend for ScriptedBackend {
    fn load(&mut self, request: &LoadRequest) -> Result<()> {
        let mut script = self.0.lock().unwrap();
        script.calls.push("load");
        if script.refuse_loads {
            return Err(PlaybackError::DecodeUnavailable("no 24-bit output".into()));
        }
        script.loads.push(request.clone());
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        self.0.lock().unwrap().calls.push("play");
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.0.lock().unwrap().calls.push("pause");
        Ok(())
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        let mut script = self.0.lock().unwrap();
        script.calls.push("seek");
        script.status.position = position;
        Ok(())
    }

    fn set_gain(&mut self, gain: f32) {
        self.0.lock().unwrap().gain = Some(gain);
    }

    fn stop(&mut self) {
        self.0.lock().unwrap().calls.push("stop");
    }

    fn status(&self) -> BackendStatus {
        self.0.lock().unwrap().status
    }
}

fn track(format: AudioFormat, bit_depth: Option<u8>) -> TrackInfo {
    TrackInfo {
        id: TrackId::new("track-1"),
        album_id: None,
        title: "Track One".to_string(),
        artist_name: None,
        format,
        bit_depth,
        sample_rate: 96_000,
        duration_ms: 180_000,
    }
}

// ===== Routing =====

#[test]
fn test_mp3_plays_natively() {
    let (native, hires) = (ScriptedBackend::default(), ScriptedBackend::default());
    let (mut adapter, events) = PlaybackAdapter::new(native.clone(), hires.clone());

    adapter
        .play("http://h/api/stream/track-1", Some("tok"), 12.5, &track(AudioFormat::Mp3, None))
        .unwrap();

    assert_eq!(native.loads(), 1);
    assert_eq!(hires.loads(), 0);
    assert_eq!(adapter.decode_path(), Some(DecodePath::Native));
    assert_eq!(adapter.state(), PlayerState::Playing);

    let load = native.last_load();
    assert_eq!(load.start_offset, Duration::from_millis(12_500));
    assert_eq!(load.auth_token.as_deref(), Some("tok"));

    let events: Vec<_> = events.try_iter().collect();
    assert_eq!(
        events,
        vec![
            PlaybackEvent::PathSelected {
                track_id: TrackId::new("track-1"),
                path: DecodePath::Native,
                advertised_bit_depth: None,
                fell_back: false,
                start_ms: 12_500,
            },
            PlaybackEvent::StateChanged {
                state: PlayerState::Playing
            },
        ]
    );
}

#[test]
fn test_24_bit_flac_uses_high_res() {
    let (native, hires) = (ScriptedBackend::default(), ScriptedBackend::default());
    let (mut adapter, _events) = PlaybackAdapter::new(native.clone(), hires.clone());

    adapter
        .play("u", None, 0.0, &track(AudioFormat::Flac, Some(24)))
        .unwrap();

    assert_eq!(hires.loads(), 1);
    assert_eq!(native.loads(), 0);
    assert_eq!(adapter.decode_path(), Some(DecodePath::HighRes));
    assert_eq!(adapter.advertised_bit_depth(), Some(24));
}

#[test]
fn test_high_res_refusal_falls_back_to_native() {
    let (native, hires) = (ScriptedBackend::default(), ScriptedBackend::refusing());
    let (mut adapter, events) = PlaybackAdapter::new(native.clone(), hires.clone());

    // No error surfaces to the caller
    adapter
        .play("u", None, 0.0, &track(AudioFormat::Wav, Some(32)))
        .unwrap();

    assert_eq!(hires.calls(), vec!["load"]);
    assert_eq!(native.calls(), vec!["load", "play"]);
    assert_eq!(adapter.decode_path(), Some(DecodePath::Native));
    assert_eq!(adapter.advertised_bit_depth(), Some(16));

    let first = events.try_recv().unwrap();
    assert_eq!(
        first,
        PlaybackEvent::PathSelected {
            track_id: TrackId::new("track-1"),
            path: DecodePath::Native,
            advertised_bit_depth: Some(16),
            fell_back: true,
            start_ms: 0,
        }
    );
}

#[test]
fn test_new_track_stops_previous_backend() {
    let (native, hires) = (ScriptedBackend::default(), ScriptedBackend::default());
    let (mut adapter, _events) = PlaybackAdapter::new(native.clone(), hires.clone());

    adapter
        .play("u", None, 0.0, &track(AudioFormat::Flac, Some(24)))
        .unwrap();
    adapter
        .play("u", None, 0.0, &track(AudioFormat::Mp3, None))
        .unwrap();

    assert_eq!(hires.calls(), vec!["load", "play", "stop"]);
    assert_eq!(adapter.decode_path(), Some(DecodePath::Native));
}

// ===== Controls =====

#[test]
fn test_controls_require_loaded_track() {
    let (mut adapter, _events) =
        PlaybackAdapter::new(ScriptedBackend::default(), ScriptedBackend::default());

    assert!(matches!(adapter.pause(), Err(PlaybackError::NoTrackLoaded)));
    assert!(matches!(adapter.resume(), Err(PlaybackError::NoTrackLoaded)));
    assert!(matches!(adapter.seek(3.0), Err(PlaybackError::NoTrackLoaded)));
}

#[test]
fn test_pause_resume_and_seek() {
    let native = ScriptedBackend::default();
    let (mut adapter, events) = PlaybackAdapter::new(native.clone(), ScriptedBackend::default());
    adapter
        .play("u", None, 0.0, &track(AudioFormat::Mp3, None))
        .unwrap();
    let _ = events.try_iter().count();

    adapter.pause().unwrap();
    adapter.seek(42.0).unwrap();
    adapter.resume().unwrap();

    assert_eq!(native.calls(), vec!["load", "play", "pause", "seek", "play"]);
    let events: Vec<_> = events.try_iter().collect();
    assert_eq!(
        events,
        vec![
            PlaybackEvent::StateChanged {
                state: PlayerState::Paused
            },
            PlaybackEvent::Seeked {
                position_ms: 42_000
            },
            PlaybackEvent::Position {
                position_ms: 42_000
            },
            PlaybackEvent::StateChanged {
                state: PlayerState::Playing
            },
        ]
    );
    assert!(matches!(
        adapter.seek(-1.0),
        Err(PlaybackError::InvalidSeekPosition(_))
    ));
}

#[test]
fn test_volume_is_clamped_and_pushed_to_backend() {
    let native = ScriptedBackend::default();
    let (mut adapter, _events) = PlaybackAdapter::new(native.clone(), ScriptedBackend::default());

    assert_eq!(adapter.set_volume(2.0).unwrap(), 1.0);
    adapter.set_volume(0.3).unwrap();
    adapter
        .play("u", None, 0.0, &track(AudioFormat::Mp3, None))
        .unwrap();
    assert_eq!(native.gain(), Some(0.3));

    assert!(adapter.set_volume(f32::NAN).is_err());
    assert_eq!(native.gain(), Some(0.3));

    adapter.set_muted(true);
    assert_eq!(native.gain(), Some(0.0));
    assert_eq!(adapter.volume().level(), 0.3);
}

// ===== Progress =====

#[test]
fn test_tick_emits_changes_and_ends_once() {
    let native = ScriptedBackend::default();
    let (mut adapter, events) = PlaybackAdapter::new(native.clone(), ScriptedBackend::default());
    adapter
        .play("u", None, 0.0, &track(AudioFormat::Flac, Some(16)))
        .unwrap();
    let _ = events.try_iter().count();

    native.set_status(BackendStatus {
        position: Duration::from_millis(1_000),
        duration: Some(Duration::from_secs(180)),
        buffered: 0.25,
        finished: false,
    });
    adapter.tick();
    // Unchanged status emits nothing
    adapter.tick();

    let collected: Vec<_> = events.try_iter().collect();
    assert_eq!(
        collected,
        vec![
            PlaybackEvent::Duration {
                duration_ms: 180_000
            },
            PlaybackEvent::Position { position_ms: 1_000 },
            PlaybackEvent::Buffered { percent: 25 },
        ]
    );

    native.set_status(BackendStatus {
        position: Duration::from_secs(180),
        duration: Some(Duration::from_secs(180)),
        buffered: 1.0,
        finished: true,
    });
    adapter.tick();
    adapter.tick();

    let ended = events
        .try_iter()
        .filter(|e| matches!(e, PlaybackEvent::Ended { .. }))
        .count();
    assert_eq!(ended, 1);
    assert_eq!(adapter.state(), PlayerState::Stopped);
}

#[test]
fn test_full_event_channel_does_not_block() {
    let native = ScriptedBackend::default();
    let (mut adapter, _events) = PlaybackAdapter::new(native.clone(), ScriptedBackend::default());
    adapter
        .play("u", None, 0.0, &track(AudioFormat::Mp3, None))
        .unwrap();

    for i in 0..(orb_playback::EVENT_CAPACITY as u64 * 2) {
        native.set_status(BackendStatus {
            position: Duration::from_millis(i),
            ..BackendStatus::default()
        });
        adapter.tick();
    }
    assert_eq!(adapter.position_ms(), Some(orb_playback::EVENT_CAPACITY as u64 * 2 - 1));
}
