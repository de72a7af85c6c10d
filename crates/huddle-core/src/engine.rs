//! Boundaries to the external media engine
//!
//! Everything that actually touches hardware or the network lives outside this
//! crate and is reached through the traits below:
//!
//! ```text
//! ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐
//! │  CameraSystem    │   │  CaptureBackend  │   │  MediaTransport  │
//! │ probe + lookup   │   │ capturer, mic    │   │ connect → room   │
//! └────────┬─────────┘   └────────┬─────────┘   └────────┬─────────┘
//!          │                      │                      │ RoomEvent
//!          ▼                      ▼                      ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  call owner (single consumer)                  │
//! └─────────────────────────────────────────────────────────────────┘
//!          ▲                      ▲
//!          │ RouteChange          │
//! ┌────────┴─────────┐   ┌────────┴─────────┐
//! │ AudioRouteEngine │   │  PermissionGate  │
//! └──────────────────┘   └──────────────────┘
//! ```
//!
//! Implementations may invoke their callbacks from any thread. They never touch
//! call state directly: room events go through the [`RoomEventSender`] handed
//! to [`MediaTransport::connect`] and are applied by the call owner.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::EngineError;
use crate::events::RoomEvent;
use crate::media::{AudioOptions, AudioTrack, CaptureFormat, DataTrack, LocalTrack, TrackKind, VideoTrack};
use crate::route::{AudioDeviceClass, AudioRoute, RouteChangeSender};

/// Camera identifier as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CameraId(String);

impl CameraId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hardware support level a camera reports for the full capture pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HardwareLevel {
    Legacy,
    Limited,
    Full,
    /// Any level this crate does not know about
    Other(i32),
}

/// Camera API family used for enumeration and capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CameraApi {
    /// Legacy camera pipeline
    Legacy,
    /// Full-featured camera pipeline
    Full,
}

impl fmt::Display for CameraApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraApi::Legacy => f.write_str("legacy"),
            CameraApi::Full => f.write_str("full"),
        }
    }
}

/// Camera enumeration and characteristics
pub trait CameraSystem: Send + Sync {
    /// All cameras known to the device
    fn camera_ids(&self) -> Result<Vec<CameraId>, EngineError>;

    /// Hardware support level of one camera
    fn hardware_level(&self, camera: &CameraId) -> Result<HardwareLevel, EngineError>;

    /// Device names as seen by the enumerator of the given API
    fn device_names(&self, api: CameraApi) -> Vec<CameraId>;

    /// Whether the enumerator of the given API reports this camera as front facing
    fn is_front_facing(&self, api: CameraApi, camera: &CameraId) -> bool;
}

/// A running camera capturer
pub trait Capturer: Send + Sync + fmt::Debug {
    fn change_capture_format(&self, format: CaptureFormat);

    fn release(&self);
}

/// A running microphone source
pub trait AudioSource: Send + Sync + fmt::Debug {
    fn release(&self);
}

/// Creates capture resources for local tracks
pub trait CaptureBackend: Send + Sync {
    fn create_capturer(&self, camera: &CameraId, api: CameraApi) -> Result<Box<dyn Capturer>, EngineError>;

    fn create_audio_source(&self, options: &AudioOptions) -> Result<Box<dyn AudioSource>, EngineError>;
}

/// Session-assigned participant identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantIdentity(String);

impl ParticipantIdentity {
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantIdentity {
    fn from(identity: &str) -> Self {
        Self::new(identity)
    }
}

/// A subscribed remote track
#[derive(Debug, Clone)]
pub enum RemoteTrack {
    Audio(Arc<AudioTrack>),
    Video(Arc<VideoTrack>),
    Data(Arc<DataTrack>),
}

impl RemoteTrack {
    pub fn kind(&self) -> TrackKind {
        match self {
            RemoteTrack::Audio(_) => TrackKind::Audio,
            RemoteTrack::Video(_) => TrackKind::Video,
            RemoteTrack::Data(_) => TrackKind::Data,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RemoteTrack::Audio(track) => track.name(),
            RemoteTrack::Video(track) => track.name(),
            RemoteTrack::Data(track) => &track.name,
        }
    }
}

/// A track published by a remote participant
#[derive(Debug, Clone)]
pub struct TrackPublication {
    /// Session-assigned track sid
    pub sid: String,
    pub name: String,
    pub kind: TrackKind,
    /// Present once subscribed
    pub track: Option<RemoteTrack>,
}

impl TrackPublication {
    pub fn new(sid: impl Into<String>, name: impl Into<String>, kind: TrackKind) -> Self {
        Self { sid: sid.into(), name: name.into(), kind, track: None }
    }

    pub fn with_track(mut self, track: RemoteTrack) -> Self {
        self.track = Some(track);
        self
    }
}

/// Snapshot of a remote participant as reported by the transport
#[derive(Debug, Clone)]
pub struct RemoteParticipantInfo {
    pub identity: ParticipantIdentity,
    pub publications: Vec<TrackPublication>,
}

impl RemoteParticipantInfo {
    pub fn new(identity: impl Into<ParticipantIdentity>) -> Self {
        Self { identity: identity.into(), publications: Vec::new() }
    }
}

impl From<String> for ParticipantIdentity {
    fn from(identity: String) -> Self {
        Self(identity)
    }
}

/// Everything needed for one connect attempt
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub access_token: String,
    pub room_name: String,
    pub audio_tracks: Vec<Arc<AudioTrack>>,
    pub video_tracks: Vec<Arc<VideoTrack>>,
}

/// Channel the transport uses to report room events
pub type RoomEventSender = mpsc::UnboundedSender<RoomEvent>;

/// Signaling/media transport
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Start connecting to a room
    ///
    /// Returns as soon as the handshake is initiated. Completion or failure is
    /// reported later as [`RoomEvent::Connected`] / [`RoomEvent::ConnectFailure`].
    /// An `Err` here means the attempt could not even be started.
    async fn connect(
        &self,
        options: ConnectOptions,
        events: RoomEventSender,
    ) -> Result<Arc<dyn RoomHandle>, EngineError>;
}

/// Handle to a room returned by [`MediaTransport::connect`]
pub trait RoomHandle: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Available once connected
    fn local_participant(&self) -> Option<Arc<dyn LocalParticipantHandle>>;

    /// Remote participants in join order
    fn remote_participants(&self) -> Vec<RemoteParticipantInfo>;

    /// Leave the room. Must be called at most once per handle.
    fn disconnect(&self);
}

/// The local participant of a connected room
pub trait LocalParticipantHandle: Send + Sync + fmt::Debug {
    fn identity(&self) -> &str;

    /// Returns whether the transport accepted the request; the outcome arrives
    /// later as a [`crate::events::LocalTrackEvent`]
    fn publish_track(&self, track: &LocalTrack) -> bool;

    fn unpublish_track(&self, track: &LocalTrack) -> bool;
}

/// External audio route negotiation
pub trait AudioRouteEngine: Send + Sync {
    fn set_preferred_devices(&self, preference: &[AudioDeviceClass]);

    /// Begin tracking devices, reporting changes through `listener`
    fn start(&self, listener: RouteChangeSender);

    /// Route audio to the best available device
    fn activate(&self);

    fn stop(&self);

    fn set_speakerphone_on(&self, on: bool);

    fn selected_device(&self) -> Option<AudioRoute>;
}

/// Runtime permissions the call needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    Camera,
    Microphone,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::Camera => f.write_str("camera"),
            Permission::Microphone => f.write_str("microphone"),
        }
    }
}

/// Platform permission checks and prompts
pub trait PermissionGate: Send + Sync {
    fn is_granted(&self, permission: Permission) -> bool;

    /// Ask the user; the answer comes back through
    /// [`crate::call::Startup::on_permission_result`]
    fn request(&self, permissions: &[Permission]);
}
