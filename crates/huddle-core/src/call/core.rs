//! The call owner
//!
//! [`CallCore`] holds every component of a running call and is the only place
//! call state is mutated. It is driven by the actor in [`super::actor`], or
//! directly by tests.

use std::time::Duration;

use tracing::{error, info, warn};

use super::actor::{CallCommand, CallSnapshot};
use crate::config::HuddleConfig;
use crate::events::{CallEndReason, NoticeEmitter, RoomEvent, UiNotice};
use crate::media::LocalTrackManager;
use crate::preview::{PreviewBindings, PreviewCompositor};
use crate::route::RouteSelector;
use crate::router::EventRouter;
use crate::session::{SessionController, SessionState};

/// What the driver of a [`CallCore`] should do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallFlow {
    Continue,
    /// Connect again right away
    Reconnect,
    /// Connect again after the delay
    ReconnectAfter(Duration),
    /// The call is over and torn down
    Finished(CallEndReason),
}

pub struct CallCore {
    pub(crate) config: HuddleConfig,
    pub(crate) tracks: LocalTrackManager,
    pub(crate) session: SessionController,
    pub(crate) compositor: PreviewCompositor,
    pub(crate) notices: NoticeEmitter,
    route: Option<RouteSelector>,
    router: EventRouter,
    ended: Option<CallEndReason>,
}

impl CallCore {
    pub fn new(
        config: HuddleConfig,
        tracks: LocalTrackManager,
        session: SessionController,
        compositor: PreviewCompositor,
        route: RouteSelector,
        notices: NoticeEmitter,
    ) -> Self {
        Self {
            config,
            tracks,
            session,
            compositor,
            notices,
            route: Some(route),
            router: EventRouter::new(),
            ended: None,
        }
    }

    pub fn config(&self) -> &HuddleConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    pub fn tracks(&self) -> &LocalTrackManager {
        &self.tracks
    }

    pub fn compositor(&self) -> &PreviewCompositor {
        &self.compositor
    }

    pub fn bindings(&self) -> PreviewBindings {
        self.compositor.bindings()
    }

    pub fn notices(&self) -> &NoticeEmitter {
        &self.notices
    }

    pub fn end_reason(&self) -> Option<&CallEndReason> {
        self.ended.as_ref()
    }

    pub fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            state: self.state(),
            bindings: self.bindings(),
            remote_participants: self
                .session
                .session()
                .map(|s| s.remote_participants().map(|p| p.identity.clone()).collect())
                .unwrap_or_default(),
            connect_attempts: self.session.connect_attempts(),
            ended: self.ended.clone(),
        }
    }

    /// Begin connecting with the created local tracks
    pub async fn connect(&mut self) -> CallFlow {
        let tracks = self.tracks.local_tracks();
        let token = self.config.access_token.clone();
        let room = self.config.room_name.clone();
        match self.session.connect(token, room, &tracks).await {
            Ok(()) => CallFlow::Continue,
            Err(e) => self.end_call(CallEndReason::ConnectFailed { reason: e.to_string() }),
        }
    }

    /// Apply a room event
    pub async fn handle_event(&mut self, event: RoomEvent) -> CallFlow {
        if self.ended.is_some() {
            return CallFlow::Continue;
        }
        let router = self.router;
        match router.route(self, event) {
            CallFlow::Reconnect => self.retry_connect().await,
            CallFlow::Finished(reason) => self.end_call(reason),
            flow => flow,
        }
    }

    /// Apply a UI command
    pub async fn handle_command(&mut self, command: CallCommand) -> CallFlow {
        if self.ended.is_some() {
            if let CallCommand::Inspect(reply) = command {
                let _ = reply.send(self.snapshot());
            }
            return CallFlow::Continue;
        }

        match command {
            CallCommand::EndCall => self.end_call(CallEndReason::LocalHangup),
            CallCommand::ToggleCamera => {
                self.compositor.toggle_camera(&self.tracks);
                CallFlow::Continue
            }
            CallCommand::ToggleMicrophone => {
                self.compositor.toggle_mic(&self.tracks);
                CallFlow::Continue
            }
            CallCommand::TogglePreview => {
                self.compositor.toggle_preview();
                CallFlow::Continue
            }
            CallCommand::RetryConnect => self.retry_connect().await,
            CallCommand::Inspect(reply) => {
                let _ = reply.send(self.snapshot());
                CallFlow::Continue
            }
        }
    }

    /// Run a pending connect retry
    pub async fn retry_connect(&mut self) -> CallFlow {
        match self.session.retry_connect().await {
            Ok(()) => CallFlow::Continue,
            Err(e) => self.end_call(CallEndReason::ConnectFailed { reason: e.to_string() }),
        }
    }

    /// End the call and tear everything down
    ///
    /// The remote video is cleared before the room handle is released.
    /// Calling this again returns the first end reason.
    pub fn end_call(&mut self, reason: CallEndReason) -> CallFlow {
        if let Some(ended) = &self.ended {
            return CallFlow::Finished(ended.clone());
        }
        info!(reason = %reason, "Ending call");

        self.compositor.clear_remote_binding();
        if self.session.state().is_active() {
            if let Err(e) = self.session.disconnect() {
                warn!(error = %e, "Disconnect failed");
            }
        }
        self.teardown();

        self.notices.emit(UiNotice::CallEnded { reason: reason.clone() });
        self.ended = Some(reason.clone());
        CallFlow::Finished(reason)
    }

    fn teardown(&mut self) {
        let local_video = self.compositor.release_local_preview().map(crate::media::LocalTrack::Video);
        self.tracks.release(local_video);

        match self.route.take() {
            Some(route) => route.stop(),
            None => error!("Route selector already stopped"),
        }

        let local_audio = self.tracks.local_audio();
        self.tracks.release(local_audio);
        self.tracks.set_local_participant(None);
        info!("Call torn down");
    }
}

impl std::fmt::Debug for CallCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallCore")
            .field("session", &self.session)
            .field("compositor", &self.compositor)
            .field("ended", &self.ended)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{RemoteTrack, TrackPublication};
    use crate::events::RemoteTrackEvent;
    use crate::media::{TrackKind, VideoTrack};
    use crate::mock::MockEnvironment;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_teardown_order() {
        let env = MockEnvironment::new();
        let mut core = env.core().await.unwrap();
        core.handle_event(RoomEvent::Connected).await;
        env.journal.clear();

        let flow = core.handle_command(CallCommand::EndCall).await;
        assert_eq!(flow, CallFlow::Finished(CallEndReason::LocalHangup));

        let order: Vec<usize> = ["room:disconnect", "capturer:release", "route:stop", "audio_source:release"]
            .iter()
            .map(|entry| env.journal.position(entry).unwrap())
            .collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]), "teardown order was {:?}", env.journal.entries());
    }

    #[tokio::test]
    async fn test_end_call_is_idempotent() {
        let env = MockEnvironment::new();
        let mut core = env.core().await.unwrap();

        core.end_call(CallEndReason::LocalHangup);
        let flow = core.end_call(CallEndReason::SessionDisconnected { reason: None });
        assert_eq!(flow, CallFlow::Finished(CallEndReason::LocalHangup));
        assert_eq!(env.journal.count("room:disconnect"), 1);
        assert_eq!(env.journal.count("route:stop"), 1);
    }

    #[tokio::test]
    async fn test_events_after_end_are_ignored() {
        let env = MockEnvironment::new();
        let mut core = env.core().await.unwrap();
        core.end_call(CallEndReason::LocalHangup);

        assert_eq!(core.handle_event(RoomEvent::Connected).await, CallFlow::Continue);
        assert_eq!(core.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_remote_disconnect_event_ends_call() {
        let env = MockEnvironment::new().with_remote("alice");
        let mut core = env.core().await.unwrap();
        core.handle_event(RoomEvent::Connected).await;
        let remote = Arc::new(VideoTrack::remote("camera", true));
        core.handle_event(RoomEvent::RemoteTrack {
            participant: "alice".into(),
            event: RemoteTrackEvent::Subscribed {
                publication: TrackPublication::new("MT-video", "camera", TrackKind::Video),
                track: RemoteTrack::Video(remote.clone()),
            },
        })
        .await;
        env.journal.clear();

        let flow = core.handle_event(RoomEvent::Disconnected { reason: Some("room closed".into()) }).await;
        assert_eq!(
            flow,
            CallFlow::Finished(CallEndReason::SessionDisconnected { reason: Some("room closed".into()) })
        );
        assert_eq!(env.journal.count("room:disconnect"), 0);
        assert_eq!(env.journal.count("route:stop"), 1);
        assert!(remote.sink_ids().is_empty());
        assert_eq!(env.journal.position("surface:primary:clear"), Some(0));
    }
}
