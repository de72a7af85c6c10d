//! Call startup
//!
//! Runs the setup phase in a fixed order: permissions, capability probe, front
//! camera lookup, local tracks, local preview, audio routing, connect.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use super::actor::CallClient;
use super::core::{CallCore, CallFlow};
use crate::capability::CapabilityProber;
use crate::config::HuddleConfig;
use crate::engine::{AudioRouteEngine, CameraSystem, CaptureBackend, MediaTransport, Permission, PermissionGate};
use crate::error::{HuddleError, HuddleResult};
use crate::events::{NoticeEmitter, RoomEvent};
use crate::media::{LocalTrackManager, VideoSink};
use crate::preview::PreviewCompositor;
use crate::route::RouteSelector;
use crate::session::SessionController;

const REQUIRED_PERMISSIONS: [Permission; 2] = [Permission::Camera, Permission::Microphone];

/// External collaborators of a call
#[derive(Clone)]
pub struct Collaborators {
    pub cameras: Arc<dyn CameraSystem>,
    pub capture: Arc<dyn CaptureBackend>,
    pub transport: Arc<dyn MediaTransport>,
    pub audio_routes: Arc<dyn AudioRouteEngine>,
    pub permissions: Arc<dyn PermissionGate>,
    pub primary: Arc<dyn VideoSink>,
    pub thumbnail: Arc<dyn VideoSink>,
}

/// Result of [`Startup::run`]
#[derive(Debug)]
pub enum StartupOutcome {
    /// The call is running
    Started(CallClient),
    /// Permissions were requested; answer with [`Startup::on_permission_result`]
    PermissionRequested,
    /// The user refused; nothing was started
    PermissionDenied,
}

pub struct Startup {
    config: HuddleConfig,
    collaborators: Collaborators,
    notices: NoticeEmitter,
}

impl Startup {
    pub fn new(config: HuddleConfig, collaborators: Collaborators) -> HuddleResult<Self> {
        config.validate()?;
        let notices = NoticeEmitter::new(config.notice_capacity);
        Ok(Self { config, collaborators, notices })
    }

    /// Notices of every call this startup produces
    ///
    /// Subscribe before [`Startup::run`] to see the first state changes.
    pub fn notices(&self) -> &NoticeEmitter {
        &self.notices
    }

    pub fn config(&self) -> &HuddleConfig {
        &self.config
    }

    /// Start the call if permissions allow
    pub async fn run(&self) -> HuddleResult<StartupOutcome> {
        let missing: Vec<Permission> = REQUIRED_PERMISSIONS
            .into_iter()
            .filter(|p| !self.collaborators.permissions.is_granted(*p))
            .collect();
        if !missing.is_empty() {
            info!(missing = ?missing, "Requesting permissions");
            self.collaborators.permissions.request(&missing);
            return Ok(StartupOutcome::PermissionRequested);
        }

        let (core, events) = self.start_core().await?;
        Ok(StartupOutcome::Started(CallClient::spawn(core, events)))
    }

    /// Continue after the user answered the permission prompt
    ///
    /// A refusal is final.
    pub async fn on_permission_result(&self, granted: bool) -> HuddleResult<StartupOutcome> {
        if !granted {
            warn!("Permissions denied, not starting the call");
            return Ok(StartupOutcome::PermissionDenied);
        }
        self.run().await
    }

    /// Build every component and start connecting
    ///
    /// Returns the call owner and the room event queue it consumes.
    pub async fn start_core(&self) -> HuddleResult<(CallCore, mpsc::UnboundedReceiver<RoomEvent>)> {
        let c = &self.collaborators;

        let prober = CapabilityProber::new(c.cameras.clone());
        let tier = prober.probe();
        let camera = prober.front_facing_camera_id(tier)?;

        let mut tracks = LocalTrackManager::new(c.capture.clone(), &self.config);
        let video = tracks.create_video_track(&camera, tier)?;
        tracks.create_audio_track();

        let mut compositor = PreviewCompositor::new(c.primary.clone(), c.thumbnail.clone(), self.notices.clone());
        compositor.attach_local_preview(video);

        let route = RouteSelector::start(c.audio_routes.clone(), self.config.route_preference.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        let session =
            SessionController::new(c.transport.clone(), tx, self.config.reconnect.clone(), self.notices.clone());

        let mut core = CallCore::new(self.config.clone(), tracks, session, compositor, route, self.notices.clone());
        match core.connect().await {
            CallFlow::Finished(reason) => Err(HuddleError::connect_failed(&self.config.room_name, reason.to_string())),
            _ => {
                info!(room = %self.config.room_name, tier = %tier, camera = %camera, "Call started");
                Ok((core, rx))
            }
        }
    }
}

impl std::fmt::Debug for Startup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Startup").field("room", &self.config.room_name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::HardwareLevel;
    use crate::error::EngineError;
    use crate::mock::{MockCameraSystem, MockEnvironment};

    #[tokio::test]
    async fn test_missing_permissions_are_requested() {
        let env = MockEnvironment::new().deny_permissions();
        let startup = env.startup().unwrap();

        assert!(matches!(startup.run().await.unwrap(), StartupOutcome::PermissionRequested));
        assert_eq!(env.journal.count("permissions:request:camera,microphone"), 1);
        assert_eq!(env.transport.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_denied_permissions_do_not_start() {
        let env = MockEnvironment::new().deny_permissions();
        let startup = env.startup().unwrap();
        startup.run().await.unwrap();

        assert!(matches!(startup.on_permission_result(false).await.unwrap(), StartupOutcome::PermissionDenied));
        assert_eq!(env.journal.count("permissions:request:camera,microphone"), 1);
        assert_eq!(env.transport.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_granted_permissions_restart() {
        let env = MockEnvironment::new().deny_permissions();
        let startup = env.startup().unwrap();
        startup.run().await.unwrap();

        env.permissions.grant_all();
        match startup.on_permission_result(true).await.unwrap() {
            StartupOutcome::Started(client) => {
                client.end_call().unwrap();
                client.wait().await.unwrap();
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(env.transport.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_front_camera_aborts_startup() {
        let cameras = MockCameraSystem::new().with_camera("0", Ok(HardwareLevel::Full), false);
        let env = MockEnvironment::new().with_cameras(cameras);

        let err = env.startup().unwrap().start_core().await.unwrap_err();
        assert!(matches!(err, HuddleError::FrontCameraMissing { .. }));
        assert_eq!(env.transport.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_transport_refusal_tears_down() {
        let env = MockEnvironment::new().with_connect_error(EngineError::Unavailable("no network".into()));

        let err = env.startup().unwrap().start_core().await.unwrap_err();
        assert_eq!(err.category(), "session");
        assert_eq!(env.journal.count("route:stop"), 1);
        assert_eq!(env.journal.count("capturer:release"), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let env = MockEnvironment::new();
        let result = Startup::new(HuddleConfig::new("", "room"), env.collaborators());
        assert!(matches!(result, Err(HuddleError::InvalidConfiguration { .. })));
    }
}
