//! Preview compositor
//!
//! Decides which video track renders on which of the two surfaces. In the
//! default layout the remote participant fills the primary surface and the
//! local camera sits in the thumbnail; self-preview swaps the two.
//!
//! A track is bound to at most one surface and a surface shows at most one
//! track: binding a track to a slot first detaches whatever else was there.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::ParticipantIdentity;
use crate::events::{NoticeEmitter, UiNotice};
use crate::media::{LocalTrackManager, SurfaceSlot, TrackId, VideoSink, VideoTrack};

#[derive(Debug, Clone)]
struct RemoteVideo {
    identity: ParticipantIdentity,
    track: Arc<VideoTrack>,
}

/// Snapshot of what is bound where
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewBindings {
    pub primary: Option<TrackId>,
    pub thumbnail: Option<TrackId>,
    pub self_preview: bool,
    pub camera_on: bool,
    pub mic_on: bool,
    pub thumbnail_visible: bool,
}

pub struct PreviewCompositor {
    primary: Arc<dyn VideoSink>,
    thumbnail: Arc<dyn VideoSink>,
    notices: NoticeEmitter,
    self_preview: bool,
    camera_on: bool,
    mic_on: bool,
    thumbnail_visible: bool,
    local_video: Option<Arc<VideoTrack>>,
    remote: Option<RemoteVideo>,
}

impl PreviewCompositor {
    pub fn new(primary: Arc<dyn VideoSink>, thumbnail: Arc<dyn VideoSink>, notices: NoticeEmitter) -> Self {
        Self {
            primary,
            thumbnail,
            notices,
            self_preview: false,
            camera_on: true,
            mic_on: true,
            thumbnail_visible: true,
            local_video: None,
            remote: None,
        }
    }

    fn sink(&self, slot: SurfaceSlot) -> &Arc<dyn VideoSink> {
        match slot {
            SurfaceSlot::Primary => &self.primary,
            SurfaceSlot::Thumbnail => &self.thumbnail,
        }
    }

    /// Slot the local camera renders on
    pub fn local_slot(&self) -> SurfaceSlot {
        if self.self_preview { SurfaceSlot::Primary } else { SurfaceSlot::Thumbnail }
    }

    /// Slot the remote participant renders on
    pub fn remote_slot(&self) -> SurfaceSlot {
        self.local_slot().opposite()
    }

    pub fn is_self_preview(&self) -> bool {
        self.self_preview
    }

    pub fn camera_on(&self) -> bool {
        self.camera_on
    }

    pub fn mic_on(&self) -> bool {
        self.mic_on
    }

    pub fn remote_identity(&self) -> Option<&ParticipantIdentity> {
        self.remote.as_ref().map(|r| &r.identity)
    }

    pub fn remote_video(&self) -> Option<&Arc<VideoTrack>> {
        self.remote.as_ref().map(|r| &r.track)
    }

    fn bind(&self, slot: SurfaceSlot, track: &Arc<VideoTrack>) {
        let sink = self.sink(slot).clone();
        let others = self.local_video.iter().chain(self.remote.as_ref().map(|r| &r.track));
        for other in others.filter(|other| other.id() != track.id()) {
            other.remove_sink(sink.id());
        }
        track.remove_sink(self.sink(slot.opposite()).id());
        track.add_sink(sink);
        debug!(track = %track.id(), slot = %slot, "Bound video track");
    }

    fn unbind_everywhere(&self, track: &VideoTrack) {
        track.remove_sink(self.primary.id());
        track.remove_sink(self.thumbnail.id());
    }

    /// Show the local camera on its slot
    pub fn attach_local_preview(&mut self, track: Arc<VideoTrack>) {
        self.local_video = Some(track.clone());
        if self.camera_on {
            self.bind(self.local_slot(), &track);
        }
        self.set_thumbnail_visible(self.camera_on);
        info!(track = %track.id(), "Local preview attached");
    }

    /// Swap local and remote between the two surfaces
    ///
    /// Both surfaces are blanked before anything is re-bound. Applying this
    /// twice restores the previous bindings.
    pub fn toggle_preview(&mut self) {
        self.primary.clear_image();
        self.thumbnail.clear_image();
        if let Some(local) = &self.local_video {
            self.unbind_everywhere(local);
        }
        if let Some(remote) = &self.remote {
            self.unbind_everywhere(&remote.track);
        }

        self.self_preview = !self.self_preview;

        if let Some(local) = self.local_video.clone().filter(|_| self.camera_on) {
            self.bind(self.local_slot(), &local);
        }
        if let Some(remote) = self.remote.as_ref().map(|r| r.track.clone()) {
            self.bind(self.remote_slot(), &remote);
        }

        debug!(self_preview = self.self_preview, "Preview swapped");
        self.notices.emit(UiNotice::PreviewSwapped { self_preview: self.self_preview });
    }

    /// Turn the local camera on or off
    ///
    /// Resets to the default layout, then publishes or unpublishes the local
    /// video and shows or hides it in the thumbnail.
    pub fn set_camera_enabled(&mut self, tracks: &LocalTrackManager, enabled: bool) {
        if self.self_preview {
            self.toggle_preview();
        }
        self.camera_on = enabled;

        if let Some(video) = tracks.local_video() {
            if enabled {
                tracks.publish(&video);
            } else {
                tracks.unpublish(&video);
            }
        }
        if let Some(local) = self.local_video.clone() {
            if enabled {
                self.bind(self.local_slot(), &local);
            } else {
                self.unbind_everywhere(&local);
            }
        }

        self.set_thumbnail_visible(enabled);
        info!(enabled, "Camera toggled");
        self.notices.emit(UiNotice::CameraControlChanged { enabled });
    }

    pub fn toggle_camera(&mut self, tracks: &LocalTrackManager) {
        self.set_camera_enabled(tracks, !self.camera_on);
    }

    /// Publish or unpublish the local microphone
    pub fn set_mic_enabled(&mut self, tracks: &LocalTrackManager, enabled: bool) {
        self.mic_on = enabled;
        if let Some(audio) = tracks.local_audio() {
            if enabled {
                tracks.publish(&audio);
            } else {
                tracks.unpublish(&audio);
            }
        }
        info!(enabled, "Microphone toggled");
        self.notices.emit(UiNotice::MicControlChanged { enabled });
    }

    pub fn toggle_mic(&mut self, tracks: &LocalTrackManager) {
        self.set_mic_enabled(tracks, !self.mic_on);
    }

    fn set_thumbnail_visible(&mut self, visible: bool) {
        self.thumbnail.set_visible(visible);
        if self.thumbnail_visible != visible {
            self.thumbnail_visible = visible;
            self.notices.emit(UiNotice::ThumbnailVisibility { visible });
        }
    }

    /// Render a newly subscribed remote video
    ///
    /// There is one tracked remote video; a later subscription replaces the
    /// earlier one.
    pub fn attach_remote_video(&mut self, identity: ParticipantIdentity, track: Arc<VideoTrack>) {
        if let Some(previous) = self.remote.take() {
            if previous.track.id() != track.id() {
                debug!(previous = %previous.track.id(), "Replacing remote video");
                self.unbind_everywhere(&previous.track);
            }
        }

        let slot = self.remote_slot();
        self.sink(slot).set_mirror(true);
        self.remote = Some(RemoteVideo { identity: identity.clone(), track: track.clone() });
        self.bind(slot, &track);
        info!(identity = %identity, track = %track.id(), slot = %slot, "Remote video attached");
    }

    /// Drop the remote video if it is this track
    pub fn detach_remote_video(&mut self, track: TrackId) -> bool {
        if self.remote.as_ref().is_some_and(|r| r.track.id() == track) {
            self.clear_remote_binding()
        } else {
            false
        }
    }

    /// Drop the remote video if it belongs to this participant
    pub fn clear_remote_participant(&mut self, identity: &ParticipantIdentity) -> bool {
        if self.remote.as_ref().is_some_and(|r| &r.identity == identity) {
            self.clear_remote_binding()
        } else {
            false
        }
    }

    /// Blank the surface showing the remote video and detach it
    pub fn clear_remote_binding(&mut self) -> bool {
        let Some(remote) = self.remote.take() else {
            return false;
        };
        let slot = self.remote_slot();
        self.unbind_everywhere(&remote.track);
        self.sink(slot).clear_image();
        info!(identity = %remote.identity, slot = %slot, "Remote video cleared");
        true
    }

    /// Detach the local camera from every surface
    pub fn release_local_preview(&mut self) -> Option<Arc<VideoTrack>> {
        let local = self.local_video.take()?;
        self.unbind_everywhere(&local);
        Some(local)
    }

    pub fn bindings(&self) -> PreviewBindings {
        let bound_to = |sink: &Arc<dyn VideoSink>| {
            self.local_video
                .iter()
                .chain(self.remote.as_ref().map(|r| &r.track))
                .find(|track| track.has_sink(sink.id()))
                .map(|track| track.id())
        };
        PreviewBindings {
            primary: bound_to(&self.primary),
            thumbnail: bound_to(&self.thumbnail),
            self_preview: self.self_preview,
            camera_on: self.camera_on,
            mic_on: self.mic_on,
            thumbnail_visible: self.thumbnail_visible,
        }
    }
}

impl std::fmt::Debug for PreviewCompositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewCompositor").field("bindings", &self.bindings()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityTier;
    use crate::config::HuddleConfig;
    use crate::engine::CameraId;
    use crate::media::VideoFrame;
    use crate::mock::{Journal, MockCaptureBackend, MockLocalParticipant, MockSurface};
    use pretty_assertions::assert_eq;

    struct Fixture {
        journal: Journal,
        primary: Arc<MockSurface>,
        thumbnail: Arc<MockSurface>,
        tracks: LocalTrackManager,
        participant: Arc<MockLocalParticipant>,
        compositor: PreviewCompositor,
    }

    fn fixture() -> Fixture {
        let journal = Journal::new();
        let primary = MockSurface::shared("primary", journal.clone());
        let thumbnail = MockSurface::shared("thumbnail", journal.clone());
        let backend = Arc::new(MockCaptureBackend::new(journal.clone()));
        let mut tracks = LocalTrackManager::new(backend, &HuddleConfig::new("token", "room"));
        let video = tracks.create_video_track(&CameraId::new("1"), CapabilityTier::Full).unwrap();
        tracks.create_audio_track();
        let participant = Arc::new(MockLocalParticipant::new("me", journal.clone()));
        tracks.set_local_participant(Some(participant.clone()));
        for track in tracks.local_tracks() {
            tracks.publish(&track);
        }

        let mut compositor = PreviewCompositor::new(primary.clone(), thumbnail.clone(), NoticeEmitter::new(16));
        compositor.attach_local_preview(video);
        Fixture { journal, primary, thumbnail, tracks, participant, compositor }
    }

    #[test]
    fn test_default_layout() {
        let mut f = fixture();
        let remote = Arc::new(VideoTrack::remote("camera", true));
        f.compositor.attach_remote_video("alice".into(), remote.clone());

        let local = f.tracks.video_track().unwrap();
        assert_eq!(
            f.compositor.bindings(),
            PreviewBindings {
                primary: Some(remote.id()),
                thumbnail: Some(local.id()),
                self_preview: false,
                camera_on: true,
                mic_on: true,
                thumbnail_visible: true,
            }
        );
        assert!(f.primary.is_mirrored());
    }

    #[test]
    fn test_toggle_preview_is_involution() {
        let mut f = fixture();
        let remote = Arc::new(VideoTrack::remote("camera", true));
        f.compositor.attach_remote_video("alice".into(), remote.clone());
        let before = f.compositor.bindings();

        f.compositor.toggle_preview();
        let swapped = f.compositor.bindings();
        assert_eq!(swapped.primary, before.thumbnail);
        assert_eq!(swapped.thumbnail, before.primary);
        assert!(f.primary.clears() >= 1 && f.thumbnail.clears() >= 1);

        f.compositor.toggle_preview();
        assert_eq!(f.compositor.bindings(), before);
    }

    #[test]
    fn test_swap_clears_before_rebinding() {
        let mut f = fixture();
        f.journal.clear();
        f.compositor.toggle_preview();

        let frame = VideoFrame::new(2, 2, 0, bytes::Bytes::from_static(&[0u8; 6]));
        f.tracks.video_track().unwrap().deliver_frame(&frame);

        let clear = f.journal.position("surface:primary:clear").unwrap();
        let render = f.journal.position("surface:primary:frame").unwrap();
        assert!(clear < render);
        assert_eq!(f.thumbnail.frames_rendered(), 0);
    }

    #[test]
    fn test_camera_round_trip_restores_publish_state() {
        let mut f = fixture();
        let video = f.tracks.local_video().unwrap();
        let before = f.compositor.bindings();
        assert!(f.participant.is_published(video.id()));

        f.compositor.set_camera_enabled(&f.tracks, false);
        assert!(!f.participant.is_published(video.id()));
        assert_eq!(f.compositor.bindings().thumbnail, None);
        assert!(!f.thumbnail.is_visible());

        f.compositor.set_camera_enabled(&f.tracks, true);
        assert!(f.participant.is_published(video.id()));
        assert!(f.thumbnail.is_visible());
        assert_eq!(f.compositor.bindings(), before);
    }

    #[test]
    fn test_camera_toggle_resets_layout() {
        let mut f = fixture();
        f.compositor.toggle_preview();
        assert!(f.compositor.is_self_preview());

        f.compositor.toggle_camera(&f.tracks);
        assert!(!f.compositor.is_self_preview());
        assert!(!f.compositor.camera_on());
    }

    #[test]
    fn test_mic_toggle_only_touches_audio() {
        let mut f = fixture();
        let audio = f.tracks.local_audio().unwrap();
        let video = f.tracks.local_video().unwrap();

        f.compositor.toggle_mic(&f.tracks);
        assert!(!f.participant.is_published(audio.id()));
        assert!(f.participant.is_published(video.id()));

        f.compositor.toggle_mic(&f.tracks);
        assert!(f.participant.is_published(audio.id()));
    }

    #[test]
    fn test_last_remote_subscription_wins() {
        let mut f = fixture();
        let first = Arc::new(VideoTrack::remote("camera", true));
        let second = Arc::new(VideoTrack::remote("screen", true));

        f.compositor.attach_remote_video("alice".into(), first.clone());
        f.compositor.attach_remote_video("bob".into(), second.clone());

        assert!(first.sink_ids().is_empty());
        assert_eq!(f.compositor.bindings().primary, Some(second.id()));
        assert_eq!(f.compositor.remote_identity(), Some(&ParticipantIdentity::new("bob")));
    }

    #[test]
    fn test_clear_remote_participant() {
        let mut f = fixture();
        let remote = Arc::new(VideoTrack::remote("camera", true));
        f.compositor.attach_remote_video("alice".into(), remote.clone());

        assert!(!f.compositor.clear_remote_participant(&"bob".into()));
        assert!(f.compositor.clear_remote_participant(&"alice".into()));
        assert!(remote.sink_ids().is_empty());
        assert_eq!(f.primary.clears(), 1);
        assert!(!f.compositor.clear_remote_binding());
    }
}
