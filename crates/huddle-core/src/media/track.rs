//! Track handles
//!
//! [`VideoTrack`] and [`AudioTrack`] are used for both local and remote media;
//! the [`TrackOrigin`] tells them apart. Local tracks additionally own the
//! capture resource (a camera capturer or an audio source) they were built on,
//! which is handed back to the engine on [`VideoTrack::release`] /
//! [`AudioTrack::release`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::engine::{AudioSource, Capturer};
use crate::media::sink::{SinkId, VideoFrame, VideoSink};

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
    Data,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => f.write_str("audio"),
            TrackKind::Video => f.write_str("video"),
            TrackKind::Data => f.write_str("data"),
        }
    }
}

/// Whether a track was captured here or received from the room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackOrigin {
    Local,
    Remote,
}

/// Unique track identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackId(Uuid);

impl TrackId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TrackId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Camera capture format
///
/// Requested once when the local video track is built and never renegotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureFormat {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl CaptureFormat {
    pub const fn new(width: u32, height: u32, fps: u32) -> Self {
        Self { width, height, fps }
    }

    /// Portrait 1080p at 60 fps
    pub const fn portrait_1080p60() -> Self {
        Self::new(1080, 1920, 60)
    }
}

impl Default for CaptureFormat {
    fn default() -> Self {
        Self::portrait_1080p60()
    }
}

impl fmt::Display for CaptureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}@{}", self.width, self.height, self.fps)
    }
}

/// Processing applied to the local microphone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioOptions {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
}

impl Default for AudioOptions {
    fn default() -> Self {
        Self { echo_cancellation: true, noise_suppression: true }
    }
}

/// A video track and the render sinks it currently delivers to
#[derive(Debug)]
pub struct VideoTrack {
    id: TrackId,
    name: String,
    origin: TrackOrigin,
    enabled: AtomicBool,
    sinks: RwLock<Vec<Arc<dyn VideoSink>>>,
    capturer: Mutex<Option<Box<dyn Capturer>>>,
    released: AtomicBool,
}

impl VideoTrack {
    /// Wrap a camera capturer as a local video track
    pub fn local(name: impl Into<String>, capturer: Box<dyn Capturer>, enabled: bool) -> Self {
        Self::build(name.into(), TrackOrigin::Local, enabled, Some(capturer))
    }

    /// A track received from a remote participant
    pub fn remote(name: impl Into<String>, enabled: bool) -> Self {
        Self::build(name.into(), TrackOrigin::Remote, enabled, None)
    }

    fn build(name: String, origin: TrackOrigin, enabled: bool, capturer: Option<Box<dyn Capturer>>) -> Self {
        Self {
            id: TrackId::new(),
            name,
            origin,
            enabled: AtomicBool::new(enabled),
            sinks: RwLock::new(Vec::new()),
            capturer: Mutex::new(capturer),
            released: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> TrackOrigin {
        self.origin
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Attach a render sink
    ///
    /// Returns `false` when this sink is already attached; a track is bound to
    /// a given surface at most once.
    pub fn add_sink(&self, sink: Arc<dyn VideoSink>) -> bool {
        let mut sinks = self.sinks.write();
        if sinks.iter().any(|s| s.id() == sink.id()) {
            return false;
        }
        debug!(track = %self.id, sink = %sink.id(), "Attached render sink");
        sinks.push(sink);
        true
    }

    /// Detach a render sink, returns whether it was attached
    pub fn remove_sink(&self, sink_id: &SinkId) -> bool {
        let mut sinks = self.sinks.write();
        let before = sinks.len();
        sinks.retain(|s| s.id() != sink_id);
        let removed = sinks.len() != before;
        if removed {
            debug!(track = %self.id, sink = %sink_id, "Detached render sink");
        }
        removed
    }

    pub fn has_sink(&self, sink_id: &SinkId) -> bool {
        self.sinks.read().iter().any(|s| s.id() == sink_id)
    }

    pub fn sink_ids(&self) -> Vec<SinkId> {
        self.sinks.read().iter().map(|s| s.id().clone()).collect()
    }

    pub fn remove_all_sinks(&self) {
        self.sinks.write().clear();
    }

    /// Deliver a frame to every attached sink
    ///
    /// Called by the media pipeline. Frames are dropped while the track is
    /// disabled or released.
    pub fn deliver_frame(&self, frame: &VideoFrame) {
        if !self.is_enabled() || self.is_released() {
            return;
        }
        for sink in self.sinks.read().iter() {
            sink.render_frame(frame);
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Detach all sinks and release the capturer
    ///
    /// Safe to call more than once; only the first call does anything.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.remove_all_sinks();
        if let Some(capturer) = self.capturer.lock().take() {
            capturer.release();
        }
        debug!(track = %self.id, name = %self.name, "Released video track");
        true
    }
}

/// An audio track
#[derive(Debug)]
pub struct AudioTrack {
    id: TrackId,
    name: String,
    origin: TrackOrigin,
    enabled: AtomicBool,
    playback_enabled: AtomicBool,
    options: Option<AudioOptions>,
    source: Mutex<Option<Box<dyn AudioSource>>>,
    released: AtomicBool,
}

impl AudioTrack {
    /// Wrap a microphone source as a local audio track
    pub fn local(name: impl Into<String>, options: AudioOptions, source: Box<dyn AudioSource>, enabled: bool) -> Self {
        Self {
            id: TrackId::new(),
            name: name.into(),
            origin: TrackOrigin::Local,
            enabled: AtomicBool::new(enabled),
            playback_enabled: AtomicBool::new(false),
            options: Some(options),
            source: Mutex::new(Some(source)),
            released: AtomicBool::new(false),
        }
    }

    /// A track received from a remote participant
    ///
    /// Playback stays off until the router enables it on subscription.
    pub fn remote(name: impl Into<String>, enabled: bool) -> Self {
        Self {
            id: TrackId::new(),
            name: name.into(),
            origin: TrackOrigin::Remote,
            enabled: AtomicBool::new(enabled),
            playback_enabled: AtomicBool::new(false),
            options: None,
            source: Mutex::new(None),
            released: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> TrackOrigin {
        self.origin
    }

    pub fn options(&self) -> Option<AudioOptions> {
        self.options
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn enable_playback(&self, enabled: bool) {
        self.playback_enabled.store(enabled, Ordering::Release);
    }

    pub fn is_playback_enabled(&self) -> bool {
        self.playback_enabled.load(Ordering::Acquire)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Release the microphone source; idempotent
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(source) = self.source.lock().take() {
            source.release();
        }
        debug!(track = %self.id, name = %self.name, "Released audio track");
        true
    }
}

/// A remote data track, only ever logged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataTrack {
    pub id: TrackId,
    pub name: String,
}

impl DataTrack {
    pub fn new(name: impl Into<String>) -> Self {
        Self { id: TrackId::new(), name: name.into() }
    }
}

/// A local track as handed to the session for publishing
#[derive(Debug, Clone)]
pub enum LocalTrack {
    Audio(Arc<AudioTrack>),
    Video(Arc<VideoTrack>),
}

impl LocalTrack {
    pub fn kind(&self) -> TrackKind {
        match self {
            LocalTrack::Audio(_) => TrackKind::Audio,
            LocalTrack::Video(_) => TrackKind::Video,
        }
    }

    pub fn id(&self) -> TrackId {
        match self {
            LocalTrack::Audio(track) => track.id(),
            LocalTrack::Video(track) => track.id(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            LocalTrack::Audio(track) => track.name(),
            LocalTrack::Video(track) => track.name(),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        match self {
            LocalTrack::Audio(track) => track.set_enabled(enabled),
            LocalTrack::Video(track) => track.set_enabled(enabled),
        }
    }

    pub fn release(&self) -> bool {
        match self {
            LocalTrack::Audio(track) => track.release(),
            LocalTrack::Video(track) => track.release(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Journal, MockCapturer, MockSurface};

    fn frame() -> VideoFrame {
        VideoFrame::new(2, 2, 0, bytes::Bytes::from_static(&[0u8; 6]))
    }

    #[test]
    fn test_sink_attached_once() {
        let journal = Journal::new();
        let track = VideoTrack::remote("camera", true);
        let surface = MockSurface::shared("primary", journal.clone());

        assert!(track.add_sink(surface.clone()));
        assert!(!track.add_sink(surface.clone()));
        assert_eq!(track.sink_ids(), vec![SinkId::new("primary")]);

        track.deliver_frame(&frame());
        assert_eq!(surface.frames_rendered(), 1);

        assert!(track.remove_sink(surface.id()));
        assert!(!track.remove_sink(surface.id()));
    }

    #[test]
    fn test_disabled_track_drops_frames() {
        let track = VideoTrack::remote("camera", false);
        let surface = MockSurface::shared("primary", Journal::new());
        track.add_sink(surface.clone());

        track.deliver_frame(&frame());
        assert_eq!(surface.frames_rendered(), 0);

        track.set_enabled(true);
        track.deliver_frame(&frame());
        assert_eq!(surface.frames_rendered(), 1);
    }

    #[test]
    fn test_release_is_idempotent() {
        let journal = Journal::new();
        let capturer = MockCapturer::new(journal.clone());
        let track = VideoTrack::local("camera", Box::new(capturer), true);
        track.add_sink(MockSurface::shared("thumbnail", journal.clone()));

        assert!(track.release());
        assert!(!track.release());
        assert!(track.sink_ids().is_empty());
        assert_eq!(journal.count("capturer:release"), 1);
    }

    #[test]
    fn test_remote_audio_playback_starts_off() {
        let track = AudioTrack::remote("microphone", true);
        assert!(!track.is_playback_enabled());
        track.enable_playback(true);
        assert!(track.is_playback_enabled());
        assert_eq!(track.origin(), TrackOrigin::Remote);
        assert!(track.options().is_none());
    }
}
