//! Local track manager
//!
//! Owns the local audio and video tracks for the lifetime of a call. Each track
//! is created at most once; the session and the preview compositor only ever
//! hold clones of the shared handles.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::capability::CapabilityTier;
use crate::config::HuddleConfig;
use crate::engine::{CameraId, CaptureBackend, LocalParticipantHandle};
use crate::error::{HuddleError, HuddleResult};
use crate::media::track::{AudioOptions, AudioTrack, CaptureFormat, LocalTrack, TrackKind, VideoTrack};

pub struct LocalTrackManager {
    backend: Arc<dyn CaptureBackend>,
    capture_format: CaptureFormat,
    audio_options: AudioOptions,
    microphone_track_name: String,
    camera_track_name: String,
    start_enabled: bool,
    video: Option<Arc<VideoTrack>>,
    audio: Option<Arc<AudioTrack>>,
    participant: Option<Arc<dyn LocalParticipantHandle>>,
}

impl LocalTrackManager {
    pub fn new(backend: Arc<dyn CaptureBackend>, config: &HuddleConfig) -> Self {
        Self {
            backend,
            capture_format: config.capture_format,
            audio_options: config.audio,
            microphone_track_name: config.microphone_track_name.clone(),
            camera_track_name: config.camera_track_name.clone(),
            start_enabled: config.start_enabled,
            video: None,
            audio: None,
            participant: None,
        }
    }

    /// Build the local camera track
    ///
    /// The capturer matches the tier's camera pipeline and the capture format
    /// is applied exactly once, before the track is handed out.
    pub fn create_video_track(&mut self, camera: &CameraId, tier: CapabilityTier) -> HuddleResult<Arc<VideoTrack>> {
        if self.video.is_some() {
            return Err(HuddleError::TrackAlreadyExists { kind: TrackKind::Video });
        }

        let api = tier.camera_api();
        let capturer = self.backend.create_capturer(camera, api).map_err(|e| HuddleError::TrackCreationFailed {
            kind: TrackKind::Video,
            reason: e.to_string(),
        })?;
        capturer.change_capture_format(self.capture_format);

        let track = Arc::new(VideoTrack::local(self.camera_track_name.clone(), capturer, self.start_enabled));
        info!(
            camera = %camera,
            api = %api,
            format = %self.capture_format,
            track = %track.id(),
            "Created local video track"
        );
        self.video = Some(track.clone());
        Ok(track)
    }

    /// Build the local microphone track
    ///
    /// Failure is logged and leaves the call without audio. Returns the
    /// existing track if one was already created.
    pub fn create_audio_track(&mut self) -> Option<Arc<AudioTrack>> {
        if let Some(track) = &self.audio {
            debug!(track = %track.id(), "Local audio track already exists");
            return Some(track.clone());
        }

        match self.backend.create_audio_source(&self.audio_options) {
            Ok(source) => {
                let track = Arc::new(AudioTrack::local(
                    self.microphone_track_name.clone(),
                    self.audio_options,
                    source,
                    self.start_enabled,
                ));
                info!(
                    track = %track.id(),
                    echo_cancellation = self.audio_options.echo_cancellation,
                    noise_suppression = self.audio_options.noise_suppression,
                    "Created local audio track"
                );
                self.audio = Some(track.clone());
                Some(track)
            }
            Err(e) => {
                error!(error = %e, "Failed to create local audio track, continuing without audio");
                None
            }
        }
    }

    pub fn video_track(&self) -> Option<Arc<VideoTrack>> {
        self.video.clone()
    }

    pub fn audio_track(&self) -> Option<Arc<AudioTrack>> {
        self.audio.clone()
    }

    /// Every created track, audio first
    pub fn local_tracks(&self) -> Vec<LocalTrack> {
        let mut tracks = Vec::with_capacity(2);
        if let Some(audio) = &self.audio {
            tracks.push(LocalTrack::Audio(audio.clone()));
        }
        if let Some(video) = &self.video {
            tracks.push(LocalTrack::Video(video.clone()));
        }
        tracks
    }

    pub fn local_video(&self) -> Option<LocalTrack> {
        self.video.clone().map(LocalTrack::Video)
    }

    pub fn local_audio(&self) -> Option<LocalTrack> {
        self.audio.clone().map(LocalTrack::Audio)
    }

    pub fn set_local_participant(&mut self, participant: Option<Arc<dyn LocalParticipantHandle>>) {
        self.participant = participant;
    }

    pub fn local_participant(&self) -> Option<&Arc<dyn LocalParticipantHandle>> {
        self.participant.as_ref()
    }

    pub fn set_enabled(&self, track: &LocalTrack, enabled: bool) {
        track.set_enabled(enabled);
        debug!(kind = %track.kind(), enabled, "Local track enable flag changed");
    }

    /// Publish a track through the local participant
    ///
    /// Silently does nothing before the room has handed out a local
    /// participant.
    pub fn publish(&self, track: &LocalTrack) -> bool {
        let Some(participant) = &self.participant else {
            debug!(kind = %track.kind(), "No local participant, skipping publish");
            return false;
        };
        let accepted = participant.publish_track(track);
        debug!(kind = %track.kind(), name = %track.name(), accepted, "Publish requested");
        accepted
    }

    pub fn unpublish(&self, track: &LocalTrack) -> bool {
        let Some(participant) = &self.participant else {
            debug!(kind = %track.kind(), "No local participant, skipping unpublish");
            return false;
        };
        let accepted = participant.unpublish_track(track);
        debug!(kind = %track.kind(), name = %track.name(), accepted, "Unpublish requested");
        accepted
    }

    /// Release a track and forget it
    ///
    /// `None` and already released tracks are ignored.
    pub fn release(&mut self, track: Option<LocalTrack>) {
        let Some(track) = track else {
            return;
        };
        let released = track.release();

        match &track {
            LocalTrack::Video(video) => {
                if self.video.as_ref().is_some_and(|own| own.id() == video.id()) {
                    self.video = None;
                }
            }
            LocalTrack::Audio(audio) => {
                if self.audio.as_ref().is_some_and(|own| own.id() == audio.id()) {
                    self.audio = None;
                }
            }
        }

        if released {
            info!(kind = %track.kind(), name = %track.name(), "Released local track");
        }
    }
}

impl std::fmt::Debug for LocalTrackManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTrackManager")
            .field("capture_format", &self.capture_format)
            .field("video", &self.video.as_ref().map(|t| t.id()))
            .field("audio", &self.audio.as_ref().map(|t| t.id()))
            .field("has_participant", &self.participant.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CameraApi;
    use crate::media::VideoFrame;
    use crate::mock::{Journal, MockCaptureBackend, MockLocalParticipant, MockSurface};

    fn manager(journal: &Journal) -> (LocalTrackManager, Arc<MockCaptureBackend>) {
        let backend = Arc::new(MockCaptureBackend::new(journal.clone()));
        let config = HuddleConfig::new("token", "room");
        (LocalTrackManager::new(backend.clone(), &config), backend)
    }

    #[test]
    fn test_video_track_created_once_with_fixed_format() {
        let journal = Journal::new();
        let (mut tracks, backend) = manager(&journal);
        let camera = CameraId::new("1");

        let video = tracks.create_video_track(&camera, CapabilityTier::Limited).unwrap();
        assert!(video.is_enabled());
        assert_eq!(backend.last_api(), Some(CameraApi::Full));
        assert_eq!(journal.count("capturer:format:1080x1920@60"), 1);

        let err = tracks.create_video_track(&camera, CapabilityTier::Limited).unwrap_err();
        assert_eq!(err, HuddleError::TrackAlreadyExists { kind: TrackKind::Video });
        assert_eq!(journal.count("backend:capturer"), 1);
    }

    #[test]
    fn test_legacy_tier_uses_legacy_capturer() {
        let journal = Journal::new();
        let (mut tracks, backend) = manager(&journal);
        tracks.create_video_track(&CameraId::new("0"), CapabilityTier::Legacy).unwrap();
        assert_eq!(backend.last_api(), Some(CameraApi::Legacy));
    }

    #[test]
    fn test_audio_failure_leaves_call_audio_less() {
        let journal = Journal::new();
        let backend = Arc::new(MockCaptureBackend::new(journal.clone()).fail_audio());
        let mut tracks = LocalTrackManager::new(backend, &HuddleConfig::new("token", "room"));

        assert!(tracks.create_audio_track().is_none());
        assert!(tracks.audio_track().is_none());
        assert!(tracks.local_tracks().is_empty());
    }

    #[test]
    fn test_audio_track_created_at_most_once() {
        let journal = Journal::new();
        let (mut tracks, _) = manager(&journal);

        let first = tracks.create_audio_track().unwrap();
        let second = tracks.create_audio_track().unwrap();
        assert_eq!(first.id(), second.id());
        assert_eq!(journal.count("backend:audio_source"), 1);
        assert_eq!(first.options(), Some(AudioOptions::default()));
        assert_eq!(first.name(), "microphone");
    }

    #[test]
    fn test_publish_without_participant_is_noop() {
        let journal = Journal::new();
        let (mut tracks, _) = manager(&journal);
        tracks.create_audio_track();
        let audio = tracks.local_audio().unwrap();

        assert!(!tracks.publish(&audio));
        assert!(!tracks.unpublish(&audio));
        assert_eq!(journal.count("participant:publish:audio"), 0);

        let participant = Arc::new(MockLocalParticipant::new("me", journal.clone()));
        tracks.set_local_participant(Some(participant.clone()));
        assert!(tracks.publish(&audio));
        assert!(participant.is_published(audio.id()));
    }

    #[test]
    fn test_disabled_video_drops_frames() {
        let journal = Journal::new();
        let (mut tracks, _) = manager(&journal);
        let video = tracks.create_video_track(&CameraId::new("1"), CapabilityTier::Full).unwrap();
        let surface = MockSurface::shared("thumbnail", journal.clone());
        video.add_sink(surface.clone());
        let frame = VideoFrame::new(2, 2, 0, bytes::Bytes::from_static(&[0u8; 6]));
        let local = tracks.local_video().unwrap();

        tracks.set_enabled(&local, false);
        assert!(!video.is_enabled());
        video.deliver_frame(&frame);
        assert_eq!(surface.frames_rendered(), 0);

        tracks.set_enabled(&local, true);
        assert!(video.is_enabled());
        video.deliver_frame(&frame);
        assert_eq!(surface.frames_rendered(), 1);
    }

    #[test]
    fn test_disabling_audio_leaves_video_alone() {
        let journal = Journal::new();
        let (mut tracks, _) = manager(&journal);
        let video = tracks.create_video_track(&CameraId::new("1"), CapabilityTier::Full).unwrap();
        let audio = tracks.create_audio_track().unwrap();

        tracks.set_enabled(&tracks.local_audio().unwrap(), false);
        assert!(!audio.is_enabled());
        assert!(video.is_enabled());
    }

    #[test]
    fn test_release_ignores_absent_and_repeated() {
        let journal = Journal::new();
        let (mut tracks, _) = manager(&journal);
        tracks.release(None);

        tracks.create_video_track(&CameraId::new("1"), CapabilityTier::Full).unwrap();
        let video = tracks.local_video();
        tracks.release(video.clone());
        tracks.release(video);

        assert!(tracks.video_track().is_none());
        assert_eq!(journal.count("capturer:release"), 1);
    }
}
