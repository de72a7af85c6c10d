//! Participant and track event routing
//!
//! Maps every [`RoomEvent`] onto the session controller and the preview
//! compositor held by the [`CallCore`]. The router keeps no state of its own.
//!
//! Two-party policy: there is one tracked remote video, and any remote
//! participant leaving ends the call.

use tracing::{debug, info, warn};

use crate::call::{CallCore, CallFlow};
use crate::engine::{ParticipantIdentity, RemoteTrack};
use crate::events::{CallEndReason, LocalTrackEvent, RemoteTrackEvent, RoomEvent, UiNotice};
use crate::session::{RetryDecision, SessionState};

#[derive(Debug, Default, Clone, Copy)]
pub struct EventRouter;

impl EventRouter {
    pub fn new() -> Self {
        Self
    }

    /// Apply one room event
    pub fn route(&self, core: &mut CallCore, event: RoomEvent) -> CallFlow {
        debug!(event = event.name(), "Routing room event");

        match event {
            RoomEvent::Connected => {
                core.session.on_connected(&mut core.tracks);
                CallFlow::Continue
            }
            RoomEvent::ConnectFailure { reason } => match core.session.on_connect_failure(&reason) {
                RetryDecision::RetryNow => CallFlow::Reconnect,
                RetryDecision::RetryAfter(delay) => CallFlow::ReconnectAfter(delay),
                RetryDecision::GiveUp if core.session.state() == SessionState::Failed => {
                    CallFlow::Finished(CallEndReason::ConnectFailed { reason })
                }
                RetryDecision::GiveUp => CallFlow::Continue,
            },
            RoomEvent::Reconnecting { reason } => {
                core.session.on_reconnecting(&reason);
                CallFlow::Continue
            }
            RoomEvent::Reconnected => {
                core.session.on_reconnected();
                CallFlow::Continue
            }
            RoomEvent::Disconnected { reason } => {
                // remote video must be off its surface before the room handle goes
                if core.session.state().is_active() {
                    core.compositor.clear_remote_binding();
                }
                if core.session.on_disconnected(reason.as_deref()) {
                    CallFlow::Finished(CallEndReason::SessionDisconnected { reason })
                } else {
                    CallFlow::Continue
                }
            }
            RoomEvent::ParticipantConnected(info) => {
                core.session.add_participant(info);
                CallFlow::Continue
            }
            RoomEvent::ParticipantDisconnected { identity } => self.participant_left(core, identity),
            RoomEvent::RecordingStarted => {
                info!("Room recording started");
                CallFlow::Continue
            }
            RoomEvent::RecordingStopped => {
                info!("Room recording stopped");
                CallFlow::Continue
            }
            RoomEvent::RemoteTrack { participant, event } => {
                self.remote_track(core, participant, event);
                CallFlow::Continue
            }
            RoomEvent::LocalTrack(event) => {
                match event {
                    LocalTrackEvent::Published { kind, name, sid } => {
                        info!(kind = %kind, name = %name, sid = %sid, "Local track published");
                    }
                    LocalTrackEvent::PublicationFailed { kind, name, reason } => {
                        warn!(kind = %kind, name = %name, reason = %reason, "Local track publication failed");
                    }
                }
                CallFlow::Continue
            }
        }
    }

    fn participant_left(&self, core: &mut CallCore, identity: ParticipantIdentity) -> CallFlow {
        info!(identity = %identity, "Remote participant disconnected");
        core.compositor.clear_remote_participant(&identity);
        core.session.remove_participant(&identity);

        if core.session.state().is_active() {
            CallFlow::Finished(CallEndReason::RemoteLeft { identity })
        } else {
            CallFlow::Continue
        }
    }

    fn remote_track(&self, core: &mut CallCore, participant: ParticipantIdentity, event: RemoteTrackEvent) {
        if !core.session.is_listening(&participant) {
            debug!(identity = %participant, "Ignoring track event of unfollowed participant");
            return;
        }

        let publication = event.publication();
        let (kind, sid) = (publication.kind, publication.sid.clone());

        match event {
            RemoteTrackEvent::Published(publication) => {
                debug!(identity = %participant, kind = %kind, sid = %sid, "Remote track published");
                core.session.record_publication(&participant, publication);
            }
            RemoteTrackEvent::Unpublished(_) => {
                debug!(identity = %participant, kind = %kind, sid = %sid, "Remote track unpublished");
                core.session.remove_publication(&participant, &sid);
            }
            RemoteTrackEvent::Subscribed { publication, track } => {
                info!(identity = %participant, kind = %kind, name = %track.name(), "Remote track subscribed");
                core.session.record_publication(&participant, publication.with_track(track.clone()));
                match track {
                    RemoteTrack::Video(video) => {
                        core.compositor.attach_remote_video(participant.clone(), video);
                        core.notices.emit(UiNotice::ParticipantJoined { identity: participant });
                    }
                    RemoteTrack::Audio(audio) => audio.enable_playback(true),
                    RemoteTrack::Data(_) => {}
                }
            }
            RemoteTrackEvent::Unsubscribed { track, .. } => {
                info!(identity = %participant, kind = %kind, name = %track.name(), "Remote track unsubscribed");
                if let RemoteTrack::Video(video) = track {
                    core.compositor.detach_remote_video(video.id());
                }
            }
            RemoteTrackEvent::SubscriptionFailed { reason, .. } => {
                warn!(
                    identity = %participant,
                    kind = %kind,
                    sid = %sid,
                    reason = %reason,
                    "Remote track subscription failed"
                );
            }
            RemoteTrackEvent::Enabled(publication) => {
                debug!(identity = %participant, kind = %kind, sid = %sid, "Remote track enabled");
                if let Some(RemoteTrack::Audio(audio)) = publication.track {
                    audio.enable_playback(true);
                }
            }
            RemoteTrackEvent::Disabled(_) => {
                debug!(identity = %participant, kind = %kind, sid = %sid, "Remote track disabled");
            }
        }
    }
}
