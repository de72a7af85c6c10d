//! Event types
//!
//! Two directions:
//!
//! - [`RoomEvent`]: lifecycle callbacks of the media transport, marshaled onto
//!   the call owner's queue and dispatched by the [`crate::router::EventRouter`].
//! - [`UiNotice`]: what the call tells its UI, broadcast through a
//!   [`NoticeEmitter`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::engine::{ParticipantIdentity, RemoteParticipantInfo, RemoteTrack, TrackPublication};
use crate::media::TrackKind;
use crate::session::SessionState;

/// Events reported by the media transport for the current room
#[derive(Debug, Clone)]
pub enum RoomEvent {
    /// Handshake completed
    Connected,

    /// Handshake failed
    ConnectFailure { reason: String },

    /// Media connection dropped, the transport is trying to recover
    Reconnecting { reason: String },

    Reconnected,

    /// The room went away
    Disconnected { reason: Option<String> },

    ParticipantConnected(RemoteParticipantInfo),

    ParticipantDisconnected { identity: ParticipantIdentity },

    RecordingStarted,

    RecordingStopped,

    /// Something happened to a remote participant's track
    RemoteTrack {
        participant: ParticipantIdentity,
        event: RemoteTrackEvent,
    },

    /// Outcome of a local publish request
    LocalTrack(LocalTrackEvent),
}

impl RoomEvent {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            RoomEvent::Connected => "connected",
            RoomEvent::ConnectFailure { .. } => "connect_failure",
            RoomEvent::Reconnecting { .. } => "reconnecting",
            RoomEvent::Reconnected => "reconnected",
            RoomEvent::Disconnected { .. } => "disconnected",
            RoomEvent::ParticipantConnected(_) => "participant_connected",
            RoomEvent::ParticipantDisconnected { .. } => "participant_disconnected",
            RoomEvent::RecordingStarted => "recording_started",
            RoomEvent::RecordingStopped => "recording_stopped",
            RoomEvent::RemoteTrack { .. } => "remote_track",
            RoomEvent::LocalTrack(_) => "local_track",
        }
    }
}

/// Remote track lifecycle, shared by audio, video and data tracks
#[derive(Debug, Clone)]
pub enum RemoteTrackEvent {
    Published(TrackPublication),
    Unpublished(TrackPublication),
    Subscribed { publication: TrackPublication, track: RemoteTrack },
    Unsubscribed { publication: TrackPublication, track: RemoteTrack },
    SubscriptionFailed { publication: TrackPublication, reason: String },
    Enabled(TrackPublication),
    Disabled(TrackPublication),
}

impl RemoteTrackEvent {
    pub fn publication(&self) -> &TrackPublication {
        match self {
            RemoteTrackEvent::Published(publication)
            | RemoteTrackEvent::Unpublished(publication)
            | RemoteTrackEvent::Enabled(publication)
            | RemoteTrackEvent::Disabled(publication) => publication,
            RemoteTrackEvent::Subscribed { publication, .. }
            | RemoteTrackEvent::Unsubscribed { publication, .. }
            | RemoteTrackEvent::SubscriptionFailed { publication, .. } => publication,
        }
    }
}

/// Local publish outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalTrackEvent {
    Published { kind: TrackKind, name: String, sid: String },
    PublicationFailed { kind: TrackKind, name: String, reason: String },
}

/// Why a call ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallEndReason {
    /// The user hung up
    LocalHangup,
    /// The other party left
    RemoteLeft { identity: ParticipantIdentity },
    /// The transport closed the room
    SessionDisconnected { reason: Option<String> },
    /// Connecting gave up
    ConnectFailed { reason: String },
}

impl fmt::Display for CallEndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallEndReason::LocalHangup => f.write_str("local hangup"),
            CallEndReason::RemoteLeft { identity } => write!(f, "{identity} left"),
            CallEndReason::SessionDisconnected { reason: Some(reason) } => write!(f, "disconnected: {reason}"),
            CallEndReason::SessionDisconnected { reason: None } => f.write_str("disconnected"),
            CallEndReason::ConnectFailed { reason } => write!(f, "connect failed: {reason}"),
        }
    }
}

/// Notices for the UI layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UiNotice {
    SessionStateChanged {
        previous: SessionState,
        current: SessionState,
        timestamp: DateTime<Utc>,
    },
    /// Connected: hide progress, show the end-call control
    CallControlsReady,
    AloneInRoom,
    ConnectionLost,
    /// A remote participant's video is now showing
    ParticipantJoined { identity: ParticipantIdentity },
    CameraControlChanged { enabled: bool },
    MicControlChanged { enabled: bool },
    ThumbnailVisibility { visible: bool },
    PreviewSwapped { self_preview: bool },
    CallEnded { reason: CallEndReason },
}

impl UiNotice {
    /// Transient user-facing text, if this notice has any
    pub fn message(&self) -> Option<String> {
        match self {
            UiNotice::AloneInRoom => Some("You're here alone, wait for other user's to join".to_string()),
            UiNotice::ConnectionLost => Some("Connection lost! Reconnecting....".to_string()),
            UiNotice::ParticipantJoined { identity } => Some(format!("{identity} joined")),
            _ => None,
        }
    }
}

/// Stream of UI notices
pub type NoticeStream = BroadcastStream<UiNotice>;

/// Broadcasts UI notices to any number of subscribers
#[derive(Debug, Clone)]
pub struct NoticeEmitter {
    sender: broadcast::Sender<UiNotice>,
}

impl NoticeEmitter {
    /// Create a new emitter with the specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit a notice
    pub fn emit(&self, notice: UiNotice) {
        // Ignore send errors (no receivers)
        let _ = self.sender.send(notice);
    }

    /// Subscribe as a stream
    pub fn subscribe(&self) -> NoticeStream {
        BroadcastStream::new(self.sender.subscribe())
    }

    /// Subscribe with a plain receiver
    pub fn receiver(&self) -> broadcast::Receiver<UiNotice> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for NoticeEmitter {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[test]
    fn test_notice_messages() {
        assert_eq!(
            UiNotice::ParticipantJoined { identity: "alice".into() }.message().as_deref(),
            Some("alice joined")
        );
        assert_eq!(
            UiNotice::ConnectionLost.message().as_deref(),
            Some("Connection lost! Reconnecting....")
        );
        assert!(UiNotice::CallControlsReady.message().is_none());
    }

    #[tokio::test]
    async fn test_emitter_fans_out() {
        let emitter = NoticeEmitter::new(8);
        emitter.emit(UiNotice::AloneInRoom);

        let mut stream = emitter.subscribe();
        let mut rx = emitter.receiver();
        assert_eq!(emitter.receiver_count(), 2);

        emitter.emit(UiNotice::CameraControlChanged { enabled: false });
        assert_eq!(stream.next().await.unwrap().unwrap(), UiNotice::CameraControlChanged { enabled: false });
        assert_eq!(rx.recv().await.unwrap(), UiNotice::CameraControlChanged { enabled: false });
    }

    #[test]
    fn test_end_reason_display() {
        let reason = CallEndReason::RemoteLeft { identity: "alice".into() };
        assert_eq!(reason.to_string(), "alice left");
        assert_eq!(CallEndReason::SessionDisconnected { reason: None }.to_string(), "disconnected");
    }
}
