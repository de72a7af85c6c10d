//! End-to-end call scenarios against the mock media engine

use std::sync::Arc;
use std::time::Duration;

use huddle_core::engine::RemoteTrack;
use huddle_core::media::{TrackKind, VideoTrack};
use huddle_core::mock::MockEnvironment;
use huddle_core::{
    CallClient, CallEndReason, ParticipantIdentity, ReconnectPolicy, RemoteTrackEvent, RetryConfig, RoomEvent,
    SessionState, StartupOutcome, TrackPublication, UiNotice,
};
use pretty_assertions::assert_eq;
use tokio::sync::broadcast;

async fn start(env: &MockEnvironment) -> (CallClient, broadcast::Receiver<UiNotice>) {
    let startup = env.startup().expect("valid config");
    let notices = startup.notices().receiver();
    match startup.run().await.expect("startup") {
        StartupOutcome::Started(call) => (call, notices),
        other => panic!("call did not start: {other:?}"),
    }
}

fn drain(rx: &mut broadcast::Receiver<UiNotice>) -> Vec<UiNotice> {
    let mut seen = Vec::new();
    while let Ok(notice) = rx.try_recv() {
        seen.push(notice);
    }
    seen
}

fn video_subscribed(identity: &str, track: &Arc<VideoTrack>) -> RoomEvent {
    RoomEvent::RemoteTrack {
        participant: identity.into(),
        event: RemoteTrackEvent::Subscribed {
            publication: TrackPublication::new("MT-alice-video", "camera", TrackKind::Video),
            track: RemoteTrack::Video(track.clone()),
        },
    }
}

async fn wait(call: CallClient) -> CallEndReason {
    tokio::time::timeout(Duration::from_secs(5), call.wait())
        .await
        .expect("call did not end in time")
        .expect("call task")
}

#[tokio::test]
async fn test_connect_fails_once_then_succeeds() {
    let env = MockEnvironment::new();
    let (call, mut notices) = start(&env).await;

    env.transport.emit(RoomEvent::ConnectFailure { reason: "signaling timeout".into() });
    env.transport.emit(RoomEvent::Connected);

    let snapshot = call.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Connected);
    assert_eq!(snapshot.connect_attempts, 2);
    assert_eq!(env.transport.connect_count(), 2);

    let states: Vec<SessionState> = drain(&mut notices)
        .into_iter()
        .filter_map(|n| match n {
            UiNotice::SessionStateChanged { current, .. } => Some(current),
            _ => None,
        })
        .collect();
    assert_eq!(states, vec![SessionState::Connecting, SessionState::Connecting, SessionState::Connected]);

    call.end_call().unwrap();
    wait(call).await;
}

#[tokio::test]
async fn test_remote_leaving_clears_sink_and_ends_call() {
    let env = MockEnvironment::new().with_remote("alice");
    let (call, mut notices) = start(&env).await;
    let alice_video = Arc::new(VideoTrack::remote("camera", true));

    env.transport.emit(RoomEvent::Connected);
    env.transport.emit(video_subscribed("alice", &alice_video));
    let snapshot = call.snapshot().await.unwrap();
    assert_eq!(snapshot.bindings.primary, Some(alice_video.id()));

    env.transport.emit(RoomEvent::ParticipantDisconnected { identity: "alice".into() });
    let reason = wait(call).await;

    assert_eq!(reason, CallEndReason::RemoteLeft { identity: "alice".into() });
    assert!(alice_video.sink_ids().is_empty());
    assert!(env.primary.clears() >= 1);
    assert_eq!(env.journal.count("room:disconnect"), 1);

    let messages: Vec<String> = drain(&mut notices).iter().filter_map(|n| n.message()).collect();
    assert!(messages.contains(&"alice joined".to_string()));
}

#[tokio::test]
async fn test_hangup_clears_remote_video_before_leaving_room() {
    let env = MockEnvironment::new().with_remote("alice");
    let (call, _notices) = start(&env).await;
    let alice_video = Arc::new(VideoTrack::remote("camera", true));

    env.transport.emit(RoomEvent::Connected);
    env.transport.emit(video_subscribed("alice", &alice_video));
    call.snapshot().await.unwrap();
    env.journal.clear();

    call.end_call().unwrap();
    assert_eq!(wait(call).await, CallEndReason::LocalHangup);

    let cleared = env.journal.position("surface:primary:clear").expect("primary cleared");
    let left = env.journal.position("room:disconnect").expect("room left");
    assert!(cleared < left, "journal: {:?}", env.journal.entries());
    assert!(env.transport.last_room().unwrap().is_disconnected());
}

#[tokio::test]
async fn test_camera_round_trip_restores_publish_state() {
    let env = MockEnvironment::new().with_remote("alice");
    let (call, _notices) = start(&env).await;
    env.transport.emit(RoomEvent::Connected);

    let before = call.snapshot().await.unwrap();
    let participant = env.transport.last_room().unwrap().local().clone();
    assert_eq!(participant.published_count(), 2);

    call.toggle_camera().unwrap();
    let off = call.snapshot().await.unwrap();
    assert!(!off.bindings.camera_on);
    assert_eq!(off.bindings.thumbnail, None);
    assert_eq!(participant.published_count(), 1);

    call.toggle_camera().unwrap();
    let on = call.snapshot().await.unwrap();
    assert_eq!(on.bindings, before.bindings);
    assert_eq!(participant.published_count(), 2);

    call.end_call().unwrap();
    wait(call).await;
}

#[tokio::test]
async fn test_preview_toggle_twice_restores_bindings() {
    let env = MockEnvironment::new().with_remote("alice");
    let (call, _notices) = start(&env).await;
    let alice_video = Arc::new(VideoTrack::remote("camera", true));
    env.transport.emit(RoomEvent::Connected);
    env.transport.emit(video_subscribed("alice", &alice_video));

    let before = call.snapshot().await.unwrap().bindings;
    call.toggle_preview().unwrap();
    let swapped = call.snapshot().await.unwrap().bindings;
    assert_eq!(swapped.primary, before.thumbnail);
    assert_eq!(swapped.thumbnail, before.primary);

    call.toggle_preview().unwrap();
    assert_eq!(call.snapshot().await.unwrap().bindings, before);

    call.end_call().unwrap();
    wait(call).await;
}

#[tokio::test]
async fn test_alone_in_room_notice() {
    let env = MockEnvironment::new();
    let (call, mut notices) = start(&env).await;
    env.transport.emit(RoomEvent::Connected);
    call.snapshot().await.unwrap();

    let seen = drain(&mut notices);
    assert!(seen.contains(&UiNotice::CallControlsReady));
    assert!(seen.contains(&UiNotice::AloneInRoom));

    call.end_call().unwrap();
    wait(call).await;
}

#[tokio::test]
async fn test_reconnecting_keeps_call_alive() {
    let env = MockEnvironment::new().with_remote("alice");
    let (call, mut notices) = start(&env).await;
    env.transport.emit(RoomEvent::Connected);
    env.transport.emit(RoomEvent::Reconnecting { reason: "network handover".into() });

    assert_eq!(call.snapshot().await.unwrap().state, SessionState::Reconnecting);
    assert!(drain(&mut notices).contains(&UiNotice::ConnectionLost));

    env.transport.emit(RoomEvent::Reconnected);
    let snapshot = call.snapshot().await.unwrap();
    assert_eq!(snapshot.state, SessionState::Connected);
    assert_eq!(snapshot.remote_participants, vec![ParticipantIdentity::new("alice")]);
    assert_eq!(env.transport.connect_count(), 1);

    call.end_call().unwrap();
    wait(call).await;
}

#[tokio::test]
async fn test_backoff_exhaustion_fails_the_call() {
    let policy = ReconnectPolicy::Backoff(RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(10),
        use_jitter: false,
        ..Default::default()
    });
    let env = MockEnvironment::new().with_policy(policy);
    let (call, _notices) = start(&env).await;

    env.transport.emit(RoomEvent::ConnectFailure { reason: "timeout".into() });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(env.transport.connect_count(), 2);
    env.transport.emit(RoomEvent::ConnectFailure { reason: "timeout".into() });

    assert_eq!(wait(call).await, CallEndReason::ConnectFailed { reason: "timeout".into() });
    assert_eq!(env.journal.count("route:stop"), 1);
}

#[tokio::test]
async fn test_call_without_microphone_still_connects() {
    let env = MockEnvironment::new().with_failing_audio();
    let (call, _notices) = start(&env).await;
    env.transport.emit(RoomEvent::Connected);

    assert_eq!(call.snapshot().await.unwrap().state, SessionState::Connected);
    let options = env.transport.last_options().unwrap();
    assert!(options.audio_tracks.is_empty());
    assert_eq!(options.video_tracks.len(), 1);

    call.end_call().unwrap();
    wait(call).await;
}
