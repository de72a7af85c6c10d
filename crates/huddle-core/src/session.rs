//! Session controller
//!
//! The authoritative answer to "are we in a call". Owns the single room
//! session of the process and drives its connection state:
//!
//! ```text
//!  Idle ──► Connecting ──► Connected ◄──► Reconnecting
//!             │  ▲             │               │
//!             │  └─ retry      ▼               ▼
//!             └──► Failed    Disconnected ◄────┘
//! ```
//!
//! `Failed` and `Disconnected` are terminal for the session; a new call needs a
//! new controller. Every transition, including a retry from `Connecting` back
//! into `Connecting`, is announced as a [`UiNotice::SessionStateChanged`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::ReconnectPolicy;
use crate::engine::{
    ConnectOptions, LocalParticipantHandle, MediaTransport, ParticipantIdentity, RemoteParticipantInfo, RoomEventSender,
    RoomHandle, TrackPublication,
};
use crate::error::{HuddleError, HuddleResult};
use crate::events::{NoticeEmitter, UiNotice};
use crate::media::{LocalTrack, LocalTrackManager};

/// Connection state of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Before the first connect
    Idle,
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
    /// Connecting gave up
    Failed,
}

impl SessionState {
    /// Whether a room session exists in this state
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Connected | SessionState::Reconnecting)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => f.write_str("idle"),
            SessionState::Connecting => f.write_str("connecting"),
            SessionState::Connected => f.write_str("connected"),
            SessionState::Reconnecting => f.write_str("reconnecting"),
            SessionState::Disconnected => f.write_str("disconnected"),
            SessionState::Failed => f.write_str("failed"),
        }
    }
}

/// A remote participant as tracked by the session
#[derive(Debug, Clone)]
pub struct RemoteParticipant {
    pub identity: ParticipantIdentity,
    /// Publications keyed by track sid, in publish order
    pub publications: IndexMap<String, TrackPublication>,
    /// Whether track events of this participant are being followed
    pub listening: bool,
}

impl RemoteParticipant {
    fn from_info(info: RemoteParticipantInfo, listening: bool) -> Self {
        let publications = info.publications.into_iter().map(|p| (p.sid.clone(), p)).collect();
        Self { identity: info.identity, publications, listening }
    }
}

/// The room session
#[derive(Debug)]
pub struct Session {
    room_name: String,
    room: Option<Arc<dyn RoomHandle>>,
    local_participant: Option<Arc<dyn LocalParticipantHandle>>,
    remotes: IndexMap<ParticipantIdentity, RemoteParticipant>,
    published: bool,
}

impl Session {
    fn new(room_name: String) -> Self {
        Self { room_name, room: None, local_participant: None, remotes: IndexMap::new(), published: false }
    }

    pub fn room_name(&self) -> &str {
        &self.room_name
    }

    pub fn local_participant(&self) -> Option<&Arc<dyn LocalParticipantHandle>> {
        self.local_participant.as_ref()
    }

    /// Remote participants in join order
    pub fn remote_participants(&self) -> impl Iterator<Item = &RemoteParticipant> {
        self.remotes.values()
    }

    pub fn remote_participant(&self, identity: &ParticipantIdentity) -> Option<&RemoteParticipant> {
        self.remotes.get(identity)
    }
}

/// What to do after a failed connect attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryNow,
    RetryAfter(Duration),
    GiveUp,
}

/// Connect/reconnect/disconnect state machine
pub struct SessionController {
    transport: Arc<dyn MediaTransport>,
    events: RoomEventSender,
    policy: ReconnectPolicy,
    notices: NoticeEmitter,
    state: SessionState,
    session: Option<Session>,
    params: Option<ConnectOptions>,
    attempts: u32,
}

impl SessionController {
    pub fn new(
        transport: Arc<dyn MediaTransport>,
        events: RoomEventSender,
        policy: ReconnectPolicy,
        notices: NoticeEmitter,
    ) -> Self {
        Self {
            transport,
            events,
            policy,
            notices,
            state: SessionState::Idle,
            session: None,
            params: None,
            attempts: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Number of connect attempts made so far
    pub fn connect_attempts(&self) -> u32 {
        self.attempts
    }

    /// Start connecting to a room with the given local tracks
    ///
    /// Returns once the attempt is under way; completion arrives as room
    /// events. Only valid from `Idle`.
    pub async fn connect(
        &mut self,
        access_token: impl Into<String>,
        room_name: impl Into<String>,
        local_tracks: &[LocalTrack],
    ) -> HuddleResult<()> {
        if self.state != SessionState::Idle {
            return Err(HuddleError::invalid_state("idle", self.state));
        }

        let mut options = ConnectOptions {
            access_token: access_token.into(),
            room_name: room_name.into(),
            audio_tracks: Vec::new(),
            video_tracks: Vec::new(),
        };
        for track in local_tracks {
            match track {
                LocalTrack::Audio(audio) => options.audio_tracks.push(audio.clone()),
                LocalTrack::Video(video) => options.video_tracks.push(video.clone()),
            }
        }

        self.session = Some(Session::new(options.room_name.clone()));
        self.params = Some(options);
        self.initiate().await
    }

    /// Connect again with the parameters of the first attempt
    ///
    /// Ignored unless still connecting; a disconnect supersedes pending retries.
    pub async fn retry_connect(&mut self) -> HuddleResult<()> {
        if self.state != SessionState::Connecting {
            debug!(state = %self.state, "Skipping connect retry");
            return Ok(());
        }
        self.initiate().await
    }

    async fn initiate(&mut self) -> HuddleResult<()> {
        let Some(options) = self.params.clone() else {
            return Err(HuddleError::internal_error("connect parameters missing"));
        };

        self.attempts += 1;
        self.transition(SessionState::Connecting);
        info!(room = %options.room_name, attempt = self.attempts, "Connecting to room");

        let room_name = options.room_name.clone();
        match self.transport.connect(options, self.events.clone()).await {
            Ok(room) => {
                if let Some(session) = self.session.as_mut() {
                    session.room = Some(room);
                }
                Ok(())
            }
            Err(e) => {
                error!(room = %room_name, error = %e, "Connect could not be started");
                self.transition(SessionState::Failed);
                self.session = None;
                Err(HuddleError::connect_failed(room_name, e.to_string()))
            }
        }
    }

    /// The room accepted us
    ///
    /// On the first entry the local tracks are published, the local participant
    /// is handed to the track manager and the roster is seeded from the room.
    /// Returns `true` on the first entry.
    pub fn on_connected(&mut self, tracks: &mut LocalTrackManager) -> bool {
        if self.state != SessionState::Connecting {
            debug!(state = %self.state, "Ignoring connected event");
            return false;
        }
        self.transition(SessionState::Connected);

        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if session.published {
            return false;
        }
        session.published = true;

        let Some(room) = session.room.clone() else {
            warn!(room = %session.room_name, "Connected without a room handle");
            return false;
        };

        session.local_participant = room.local_participant();
        tracks.set_local_participant(session.local_participant.clone());
        for track in tracks.local_tracks() {
            tracks.publish(&track);
        }

        for (i, info) in room.remote_participants().into_iter().enumerate() {
            let participant = RemoteParticipant::from_info(info, i == 0);
            if participant.listening {
                debug!(identity = %participant.identity, "Listening to remote participant");
            }
            session.remotes.insert(participant.identity.clone(), participant);
        }

        info!(
            room = %session.room_name,
            remotes = session.remotes.len(),
            attempts = self.attempts,
            "Connected to room"
        );
        self.notices.emit(UiNotice::CallControlsReady);
        if session.remotes.is_empty() {
            self.notices.emit(UiNotice::AloneInRoom);
        }
        true
    }

    /// A connect attempt failed
    pub fn on_connect_failure(&mut self, reason: &str) -> RetryDecision {
        if self.state != SessionState::Connecting {
            debug!(state = %self.state, reason, "Ignoring connect failure");
            return RetryDecision::GiveUp;
        }
        warn!(attempt = self.attempts, reason, "Connect failed");

        let decision = match &self.policy {
            ReconnectPolicy::Immediate => RetryDecision::RetryNow,
            ReconnectPolicy::Backoff(retry) if self.attempts < retry.max_attempts => {
                RetryDecision::RetryAfter(retry.delay_for_retry(self.attempts))
            }
            ReconnectPolicy::Backoff(_) => RetryDecision::GiveUp,
        };

        if decision == RetryDecision::GiveUp {
            error!(attempts = self.attempts, reason, "Giving up connecting");
            self.transition(SessionState::Failed);
            self.session = None;
        }
        decision
    }

    pub fn on_reconnecting(&mut self, reason: &str) {
        if self.state != SessionState::Connected {
            debug!(state = %self.state, "Ignoring reconnecting event");
            return;
        }
        warn!(reason, "Connection lost, reconnecting");
        self.transition(SessionState::Reconnecting);
        self.notices.emit(UiNotice::ConnectionLost);
    }

    pub fn on_reconnected(&mut self) {
        if self.state != SessionState::Reconnecting {
            debug!(state = %self.state, "Ignoring reconnected event");
            return;
        }
        info!("Reconnected");
        self.transition(SessionState::Connected);
    }

    /// The transport closed the room
    ///
    /// Returns whether this ended an active session.
    pub fn on_disconnected(&mut self, reason: Option<&str>) -> bool {
        if !self.state.is_active() {
            debug!(state = %self.state, "Ignoring disconnected event");
            return false;
        }
        info!(reason = reason.unwrap_or("none"), "Disconnected from room");
        self.transition(SessionState::Disconnected);
        self.session = None;
        true
    }

    /// Leave the room and release the handle
    pub fn disconnect(&mut self) -> HuddleResult<()> {
        if !self.state.is_active() {
            return Err(HuddleError::invalid_state("active session", self.state));
        }

        if let Some(room) = self.session.take().and_then(|s| s.room) {
            info!(room = %room.name(), "Leaving room");
            room.disconnect();
        }
        self.transition(SessionState::Disconnected);
        Ok(())
    }

    /// Track a participant that joined after us
    pub fn add_participant(&mut self, info: RemoteParticipantInfo) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let participant = RemoteParticipant::from_info(info, true);
        info!(identity = %participant.identity, "Remote participant connected");
        session.remotes.insert(participant.identity.clone(), participant);
    }

    pub fn remove_participant(&mut self, identity: &ParticipantIdentity) -> Option<RemoteParticipant> {
        self.session.as_mut()?.remotes.shift_remove(identity)
    }

    /// Record a publication on a tracked participant
    pub fn record_publication(&mut self, identity: &ParticipantIdentity, publication: TrackPublication) {
        if let Some(participant) = self.session.as_mut().and_then(|s| s.remotes.get_mut(identity)) {
            participant.publications.insert(publication.sid.clone(), publication);
        }
    }

    pub fn remove_publication(&mut self, identity: &ParticipantIdentity, sid: &str) -> Option<TrackPublication> {
        self.session.as_mut()?.remotes.get_mut(identity)?.publications.shift_remove(sid)
    }

    pub fn is_tracked(&self, identity: &ParticipantIdentity) -> bool {
        self.session.as_ref().is_some_and(|s| s.remotes.contains_key(identity))
    }

    /// Whether track events of this participant are followed
    pub fn is_listening(&self, identity: &ParticipantIdentity) -> bool {
        self.session
            .as_ref()
            .and_then(|s| s.remotes.get(identity))
            .is_some_and(|p| p.listening)
    }

    fn transition(&mut self, next: SessionState) {
        let previous = self.state;
        self.state = next;
        debug!(from = %previous, to = %next, "Session state changed");
        self.notices.emit(UiNotice::SessionStateChanged { previous, current: next, timestamp: Utc::now() });
    }
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("state", &self.state)
            .field("attempts", &self.attempts)
            .field("session", &self.session)
            .finish()
    }
}
