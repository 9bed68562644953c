//! Listen party client tests
//!
//! Feeds scripted server messages through `PartyClient` and checks the
//! reconciliation steps a guest's player receives.

use chrono::Utc;
use orb_buffer::StreamAuth;
use orb_core::protocol::{EndReason, ErrorCode, Participant, PlaybackState, Role, ServerMessage};
use orb_core::{AudioFormat, GuestToken, ParticipantId, SessionId, TrackId, TrackInfo};
use orb_party::{ConnectionStatus, PartyClient, PartyError, Reconcile};
use proptest::prelude::*;

// =============================================================================
// Helpers
// =============================================================================

fn track(id: &str) -> TrackInfo {
    TrackInfo {
        id: TrackId::new(id),
        album_id: None,
        title: format!("Track {}", id),
        artist_name: None,
        format: AudioFormat::Flac,
        bit_depth: Some(16),
        sample_rate: 44_100,
        duration_ms: 240_000,
    }
}

fn host_state(track_id: Option<&str>, position_ms: u64, playing: bool, at: i64) -> PlaybackState {
    PlaybackState {
        track: track_id.map(track),
        position_ms,
        playing,
        updated_at_ms: at,
    }
}

fn joined(state: PlaybackState) -> ServerMessage {
    ServerMessage::Joined {
        role: Role::Guest,
        session_id: SessionId::new("sess-1"),
        participant_id: Some(ParticipantId::new("p-1")),
        guest_token: Some(GuestToken::new("tok-1")),
        state,
    }
}

fn update(state: PlaybackState) -> ServerMessage {
    ServerMessage::StateUpdate { state }
}

fn joined_guest(state: PlaybackState, now: i64) -> (PartyClient, Vec<Reconcile>) {
    let mut client = PartyClient::new(Role::Guest);
    let steps = client.apply(joined(state), now);
    (client, steps)
}

// =============================================================================
// Joining
// =============================================================================

mod joining {
    use super::*;

    #[test]
    fn test_join_snapshot_loads_host_track_at_extrapolated_position() {
        let (client, steps) = joined_guest(host_state(Some("t1"), 10_000, true, 1_000), 4_000);

        assert_eq!(
            steps,
            vec![Reconcile::LoadTrack {
                track: track("t1"),
                position_ms: 13_000,
                playing: true,
            }]
        );
        assert_eq!(client.status(), ConnectionStatus::Connected);
        assert_eq!(client.participant_id(), Some(&ParticipantId::new("p-1")));
        assert!(client.can_stream());
    }

    #[test]
    fn test_join_with_nothing_playing_yields_no_steps() {
        let (_, steps) = joined_guest(PlaybackState::default(), 0);
        assert!(steps.is_empty());
    }

    #[test]
    fn test_stream_auth_uses_guest_token() {
        let (client, _) = joined_guest(PlaybackState::default(), 0);
        assert_eq!(
            client.stream_auth(),
            Some(StreamAuth::Guest {
                session_id: SessionId::new("sess-1"),
                token: GuestToken::new("tok-1"),
            })
        );
    }

    #[test]
    fn test_capacity_error_before_join_is_terminal() {
        let mut client = PartyClient::new(Role::Guest);
        client.apply(
            ServerMessage::Error {
                code: ErrorCode::SessionFull,
                message: "session is full".into(),
            },
            0,
        );

        assert_eq!(
            client.status(),
            ConnectionStatus::Rejected(ErrorCode::SessionFull)
        );
        assert!(!client.can_stream());
    }

    #[test]
    fn test_roster_update_replaces_roster() {
        let (mut client, _) = joined_guest(PlaybackState::default(), 0);
        let roster = vec![Participant {
            id: ParticipantId::new("p-1"),
            nickname: "ana".into(),
            joined_at: Utc::now(),
        }];

        let steps = client.apply(
            ServerMessage::RosterUpdate {
                participants: roster.clone(),
            },
            10,
        );

        assert!(steps.is_empty());
        assert_eq!(client.roster(), &roster[..]);
    }

    #[test]
    fn test_invalid_frame_is_an_error() {
        let mut client = PartyClient::new(Role::Guest);
        assert!(matches!(
            client.apply_text("{\"type\":\"bogus\"}", 0),
            Err(PartyError::InvalidMessage(_))
        ));
        assert_eq!(client.status(), ConnectionStatus::Connecting);
    }

    #[test]
    fn test_apply_text_parses_frames() {
        let mut client = PartyClient::new(Role::Guest);
        let steps = client
            .apply_text(
                r#"{"type":"joined","role":"guest","session_id":"s","participant_id":"p","guest_token":"g","state":{"position_ms":0,"playing":false}}"#,
                0,
            )
            .unwrap();
        assert!(steps.is_empty());
        assert!(client.can_stream());
    }
}

// =============================================================================
// Following the host
// =============================================================================

mod following {
    use super::*;

    #[test]
    fn test_duplicate_heartbeat_only_bumps_last_seen() {
        let state = host_state(Some("t1"), 5_000, true, 1_000);
        let (mut client, _) = joined_guest(state.clone(), 1_000);

        let steps = client.apply(update(state), 3_000);

        assert!(steps.is_empty());
        assert_eq!(client.last_seen_ms(), Some(3_000));
    }

    #[test]
    fn test_small_drift_does_not_seek() {
        let (mut client, _) = joined_guest(host_state(Some("t1"), 0, true, 1_000), 1_000);

        // Host reports 2.8 s after 2 s of wall time: 800 ms ahead of us
        let steps = client.apply(update(host_state(Some("t1"), 2_800, true, 3_000)), 3_000);

        assert!(steps.is_empty());
    }

    #[test]
    fn test_large_drift_seeks() {
        let (mut client, _) = joined_guest(host_state(Some("t1"), 0, true, 1_000), 1_000);

        let steps = client.apply(update(host_state(Some("t1"), 60_000, true, 2_000)), 2_000);

        assert_eq!(steps, vec![Reconcile::Seek { position_ms: 60_000 }]);
    }

    #[test]
    fn test_reported_local_position_feeds_drift() {
        let (mut client, _) = joined_guest(host_state(Some("t1"), 0, true, 1_000), 1_000);
        // Local player stalled while buffering
        client.report_local_position(0, 5_000);

        let steps = client.apply(update(host_state(Some("t1"), 4_000, true, 5_000)), 5_000);

        assert_eq!(steps, vec![Reconcile::Seek { position_ms: 4_000 }]);
    }

    #[test]
    fn test_pause_and_play() {
        let (mut client, _) = joined_guest(host_state(Some("t1"), 0, true, 1_000), 1_000);

        let steps = client.apply(update(host_state(Some("t1"), 2_000, false, 3_000)), 3_000);
        assert_eq!(steps, vec![Reconcile::Pause]);

        let steps = client.apply(update(host_state(Some("t1"), 2_000, true, 9_000)), 9_000);
        assert_eq!(steps, vec![Reconcile::Play]);
    }

    #[test]
    fn test_track_change_loads_new_track() {
        let (mut client, _) = joined_guest(host_state(Some("t1"), 0, true, 1_000), 1_000);

        let steps = client.apply(update(host_state(Some("t2"), 0, true, 2_000)), 2_000);

        assert_eq!(
            steps,
            vec![Reconcile::LoadTrack {
                track: track("t2"),
                position_ms: 0,
                playing: true,
            }]
        );
    }

    #[test]
    fn test_host_clearing_track_stops() {
        let (mut client, _) = joined_guest(host_state(Some("t1"), 0, true, 1_000), 1_000);

        let steps = client.apply(update(host_state(None, 0, false, 2_000)), 2_000);

        assert_eq!(steps, vec![Reconcile::Stop]);
    }
}

// =============================================================================
// Leaving
// =============================================================================

mod leaving {
    use super::*;

    #[test]
    fn test_kicked_stops_and_ignores_later_messages() {
        let (mut client, _) = joined_guest(host_state(Some("t1"), 0, true, 1_000), 1_000);

        let steps = client.apply(ServerMessage::Kicked, 2_000);
        assert_eq!(steps, vec![Reconcile::Stop]);
        assert_eq!(client.status(), ConnectionStatus::Kicked);
        assert!(!client.can_stream());
        assert!(client.stream_auth().is_none());

        let steps = client.apply(update(host_state(Some("t2"), 0, true, 3_000)), 3_000);
        assert!(steps.is_empty());
        assert_eq!(client.last_seen_ms(), Some(2_000));
    }

    #[test]
    fn test_ended_is_terminal() {
        let (mut client, _) = joined_guest(host_state(Some("t1"), 0, true, 1_000), 1_000);

        let steps = client.apply(
            ServerMessage::Ended {
                reason: EndReason::HostDisconnected,
            },
            2_000,
        );

        assert_eq!(steps, vec![Reconcile::Stop]);
        assert_eq!(
            client.status(),
            ConnectionStatus::Ended(EndReason::HostDisconnected)
        );
        assert!(client.is_terminal());
    }
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    /// Property: re-applying the state just applied never yields steps
    #[test]
    fn reapplying_a_state_is_a_no_op(
        position in 0u64..240_000,
        playing in any::<bool>(),
        at in 1i64..1_000_000,
        later in 0i64..10_000,
    ) {
        let (mut client, _) = joined_guest(PlaybackState::default(), 0);
        let state = host_state(Some("t1"), position, playing, at);

        client.apply(update(state.clone()), at);
        let steps = client.apply(update(state), at + later);

        prop_assert!(steps.is_empty());
    }
}
