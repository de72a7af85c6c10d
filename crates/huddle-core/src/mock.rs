//! In-process stand-ins for the external media engine
//!
//! Every boundary trait in [`crate::engine`] has a recording fake here. All
//! fakes of one [`MockEnvironment`] write to a shared [`Journal`], so tests can
//! assert on the order in which the call touched its collaborators. The `huddle`
//! demo binary runs against these as well.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::call::{CallClient, CallCore, Collaborators, Startup};
use crate::config::{HuddleConfig, ReconnectPolicy};
use crate::engine::{
    AudioRouteEngine, AudioSource, CameraApi, CameraId, CameraSystem, CaptureBackend, Capturer, ConnectOptions,
    HardwareLevel, LocalParticipantHandle, MediaTransport, Permission, PermissionGate, RemoteParticipantInfo,
    RoomEventSender, RoomHandle,
};
use crate::error::{EngineError, HuddleResult};
use crate::events::RoomEvent;
use crate::media::{AudioOptions, CaptureFormat, LocalTrack, SinkId, TrackId, VideoFrame, VideoSink};
use crate::route::{AudioDeviceClass, AudioRoute, RouteChange, RouteChangeSender};

/// Ordered record of calls into the fakes
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries.lock().iter().filter(|e| e.as_str() == entry).count()
    }

    /// Index of the first matching entry
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries.lock().iter().position(|e| e == entry)
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.position(entry).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[derive(Debug, Clone)]
struct MockCamera {
    id: CameraId,
    legacy_name: CameraId,
    level: Result<HardwareLevel, EngineError>,
    front: bool,
}

/// Camera system with a scripted device list
#[derive(Debug, Clone, Default)]
pub struct MockCameraSystem {
    cameras: Vec<MockCamera>,
    enumeration_error: Option<EngineError>,
}

impl MockCameraSystem {
    /// No cameras at all
    pub fn new() -> Self {
        Self::default()
    }

    /// A back camera and a front camera, both full-featured
    pub fn phone() -> Self {
        Self::new()
            .with_camera("0", Ok(HardwareLevel::Full), false)
            .with_camera("1", Ok(HardwareLevel::Full), true)
    }

    pub fn with_camera(mut self, id: &str, level: Result<HardwareLevel, EngineError>, front: bool) -> Self {
        self.cameras.push(MockCamera { id: CameraId::new(id), legacy_name: CameraId::new(id), level, front });
        self
    }

    /// Name the legacy enumerator reports for a camera
    pub fn with_legacy_name(mut self, id: &str, name: &str) -> Self {
        if let Some(camera) = self.cameras.iter_mut().find(|c| c.id.as_str() == id) {
            camera.legacy_name = CameraId::new(name);
        }
        self
    }

    pub fn fail_enumeration(mut self, reason: &str) -> Self {
        self.enumeration_error = Some(EngineError::Unavailable(reason.to_string()));
        self
    }

    fn name(camera: &MockCamera, api: CameraApi) -> &CameraId {
        match api {
            CameraApi::Legacy => &camera.legacy_name,
            CameraApi::Full => &camera.id,
        }
    }
}

impl CameraSystem for MockCameraSystem {
    fn camera_ids(&self) -> Result<Vec<CameraId>, EngineError> {
        if let Some(e) = &self.enumeration_error {
            return Err(e.clone());
        }
        Ok(self.cameras.iter().map(|c| c.id.clone()).collect())
    }

    fn hardware_level(&self, camera: &CameraId) -> Result<HardwareLevel, EngineError> {
        self.cameras
            .iter()
            .find(|c| &c.id == camera)
            .map(|c| c.level.clone())
            .unwrap_or_else(|| Err(EngineError::CameraAccess(format!("unknown camera {camera}"))))
    }

    fn device_names(&self, api: CameraApi) -> Vec<CameraId> {
        self.cameras.iter().map(|c| Self::name(c, api).clone()).collect()
    }

    fn is_front_facing(&self, api: CameraApi, camera: &CameraId) -> bool {
        self.cameras.iter().any(|c| Self::name(c, api) == camera && c.front)
    }
}

#[derive(Debug)]
pub struct MockCapturer {
    journal: Journal,
}

impl MockCapturer {
    pub fn new(journal: Journal) -> Self {
        Self { journal }
    }
}

impl Capturer for MockCapturer {
    fn change_capture_format(&self, format: CaptureFormat) {
        self.journal.record(format!("capturer:format:{format}"));
    }

    fn release(&self) {
        self.journal.record("capturer:release");
    }
}

#[derive(Debug)]
pub struct MockAudioSource {
    journal: Journal,
}

impl MockAudioSource {
    pub fn new(journal: Journal) -> Self {
        Self { journal }
    }
}

impl AudioSource for MockAudioSource {
    fn release(&self) {
        self.journal.record("audio_source:release");
    }
}

/// Capture backend handing out recording capturers
#[derive(Debug)]
pub struct MockCaptureBackend {
    journal: Journal,
    fail_audio: bool,
    last_api: Mutex<Option<CameraApi>>,
}

impl MockCaptureBackend {
    pub fn new(journal: Journal) -> Self {
        Self { journal, fail_audio: false, last_api: Mutex::new(None) }
    }

    /// Make microphone creation fail
    pub fn fail_audio(mut self) -> Self {
        self.fail_audio = true;
        self
    }

    /// Pipeline of the last capturer created
    pub fn last_api(&self) -> Option<CameraApi> {
        *self.last_api.lock()
    }
}

impl CaptureBackend for MockCaptureBackend {
    fn create_capturer(&self, camera: &CameraId, api: CameraApi) -> Result<Box<dyn Capturer>, EngineError> {
        self.journal.record("backend:capturer");
        *self.last_api.lock() = Some(api);
        debug!(camera = %camera, api = %api, "Mock capturer created");
        Ok(Box::new(MockCapturer::new(self.journal.clone())))
    }

    fn create_audio_source(&self, _options: &AudioOptions) -> Result<Box<dyn AudioSource>, EngineError> {
        if self.fail_audio {
            return Err(EngineError::Unavailable("microphone in use".into()));
        }
        self.journal.record("backend:audio_source");
        Ok(Box::new(MockAudioSource::new(self.journal.clone())))
    }
}

/// A display surface that counts what happens to it
#[derive(Debug)]
pub struct MockSurface {
    id: SinkId,
    journal: Journal,
    frames: AtomicUsize,
    clears: AtomicUsize,
    mirrored: AtomicBool,
    visible: AtomicBool,
}

impl MockSurface {
    pub fn new(name: &str, journal: Journal) -> Self {
        Self {
            id: SinkId::new(name),
            journal,
            frames: AtomicUsize::new(0),
            clears: AtomicUsize::new(0),
            mirrored: AtomicBool::new(false),
            visible: AtomicBool::new(true),
        }
    }

    pub fn shared(name: &str, journal: Journal) -> Arc<Self> {
        Arc::new(Self::new(name, journal))
    }

    pub fn frames_rendered(&self) -> usize {
        self.frames.load(Ordering::Acquire)
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::Acquire)
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirrored.load(Ordering::Acquire)
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Acquire)
    }
}

impl VideoSink for MockSurface {
    fn id(&self) -> &SinkId {
        &self.id
    }

    fn render_frame(&self, _frame: &VideoFrame) {
        self.frames.fetch_add(1, Ordering::AcqRel);
        self.journal.record(format!("surface:{}:frame", self.id));
    }

    fn clear_image(&self) {
        self.clears.fetch_add(1, Ordering::AcqRel);
        self.journal.record(format!("surface:{}:clear", self.id));
    }

    fn set_mirror(&self, mirror: bool) {
        self.mirrored.store(mirror, Ordering::Release);
        self.journal.record(format!("surface:{}:mirror:{mirror}", self.id));
    }

    fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::Release);
        self.journal.record(format!("surface:{}:visible:{visible}", self.id));
    }
}

/// Local participant that remembers what is published
#[derive(Debug)]
pub struct MockLocalParticipant {
    identity: String,
    journal: Journal,
    published: Mutex<HashSet<TrackId>>,
}

impl MockLocalParticipant {
    pub fn new(identity: &str, journal: Journal) -> Self {
        Self { identity: identity.to_string(), journal, published: Mutex::new(HashSet::new()) }
    }

    pub fn is_published(&self, track: TrackId) -> bool {
        self.published.lock().contains(&track)
    }

    pub fn published_count(&self) -> usize {
        self.published.lock().len()
    }
}

impl LocalParticipantHandle for MockLocalParticipant {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn publish_track(&self, track: &LocalTrack) -> bool {
        self.journal.record(format!("participant:publish:{}", track.kind()));
        self.published.lock().insert(track.id());
        true
    }

    fn unpublish_track(&self, track: &LocalTrack) -> bool {
        self.journal.record(format!("participant:unpublish:{}", track.kind()));
        self.published.lock().remove(&track.id())
    }
}

#[derive(Debug)]
pub struct MockRoom {
    name: String,
    journal: Journal,
    local: Arc<MockLocalParticipant>,
    remotes: Vec<RemoteParticipantInfo>,
    disconnected: AtomicBool,
}

impl MockRoom {
    pub fn local(&self) -> &Arc<MockLocalParticipant> {
        &self.local
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }
}

impl RoomHandle for MockRoom {
    fn name(&self) -> &str {
        &self.name
    }

    fn local_participant(&self) -> Option<Arc<dyn LocalParticipantHandle>> {
        Some(self.local.clone())
    }

    fn remote_participants(&self) -> Vec<RemoteParticipantInfo> {
        self.remotes.clone()
    }

    fn disconnect(&self) {
        self.disconnected.store(true, Ordering::Release);
        self.journal.record("room:disconnect");
    }
}

/// Transport that hands out [`MockRoom`]s and lets tests inject room events
#[derive(Debug)]
pub struct MockTransport {
    journal: Journal,
    remotes: Mutex<Vec<RemoteParticipantInfo>>,
    connect_error: Mutex<Option<EngineError>>,
    attempts: Mutex<Vec<ConnectOptions>>,
    events: Mutex<Option<RoomEventSender>>,
    last_room: Mutex<Option<Arc<MockRoom>>>,
}

impl MockTransport {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            remotes: Mutex::new(Vec::new()),
            connect_error: Mutex::new(None),
            attempts: Mutex::new(Vec::new()),
            events: Mutex::new(None),
            last_room: Mutex::new(None),
        }
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Refuse every connect
    pub fn connect_error(self, error: EngineError) -> Self {
        self.set_connect_error(Some(error));
        self
    }

    /// Participant already in the room when we connect
    pub fn with_remote(self, info: RemoteParticipantInfo) -> Self {
        self.add_remote(info);
        self
    }

    pub fn set_connect_error(&self, error: Option<EngineError>) {
        *self.connect_error.lock() = error;
    }

    pub fn add_remote(&self, info: RemoteParticipantInfo) {
        self.remotes.lock().push(info);
    }

    pub fn connect_count(&self) -> usize {
        self.attempts.lock().len()
    }

    pub fn last_options(&self) -> Option<ConnectOptions> {
        self.attempts.lock().last().cloned()
    }

    pub fn last_room(&self) -> Option<Arc<MockRoom>> {
        self.last_room.lock().clone()
    }

    /// Deliver a room event to the connected call
    ///
    /// Returns `false` when nobody is listening.
    pub fn emit(&self, event: RoomEvent) -> bool {
        match self.events.lock().as_ref() {
            Some(events) => events.send(event).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl MediaTransport for MockTransport {
    async fn connect(
        &self,
        options: ConnectOptions,
        events: RoomEventSender,
    ) -> Result<Arc<dyn RoomHandle>, EngineError> {
        self.journal.record(format!("transport:connect:{}", options.room_name));
        let name = options.room_name.clone();
        self.attempts.lock().push(options);

        if let Some(error) = self.connect_error.lock().clone() {
            return Err(error);
        }

        *self.events.lock() = Some(events);
        let room = Arc::new(MockRoom {
            name,
            journal: self.journal.clone(),
            local: Arc::new(MockLocalParticipant::new("local", self.journal.clone())),
            remotes: self.remotes.lock().clone(),
            disconnected: AtomicBool::new(false),
        });
        *self.last_room.lock() = Some(room.clone());
        Ok(room)
    }
}

/// Route engine that records calls and reports scripted device changes
#[derive(Debug)]
pub struct MockAudioRouteEngine {
    journal: Journal,
    listener: Mutex<Option<RouteChangeSender>>,
    selected: Mutex<Option<AudioRoute>>,
}

impl MockAudioRouteEngine {
    pub fn new(journal: Journal) -> Self {
        Self { journal, listener: Mutex::new(None), selected: Mutex::new(None) }
    }

    /// Pretend the engine switched to this route
    pub fn select(&self, route: AudioRoute) {
        *self.selected.lock() = Some(route.clone());
        if let Some(listener) = self.listener.lock().as_ref() {
            let _ = listener.send(RouteChange { available: vec![route.clone()], selected: Some(route) });
        }
    }
}

impl AudioRouteEngine for MockAudioRouteEngine {
    fn set_preferred_devices(&self, preference: &[AudioDeviceClass]) {
        let names: Vec<String> = preference.iter().map(|c| c.to_string()).collect();
        self.journal.record(format!("route:preferred:{}", names.join(",")));
    }

    fn start(&self, listener: RouteChangeSender) {
        *self.listener.lock() = Some(listener);
        self.journal.record("route:start");
    }

    fn activate(&self) {
        self.journal.record("route:activate");
    }

    fn stop(&self) {
        self.listener.lock().take();
        self.journal.record("route:stop");
    }

    fn set_speakerphone_on(&self, on: bool) {
        self.journal.record(if on { "route:speakerphone:on" } else { "route:speakerphone:off" });
    }

    fn selected_device(&self) -> Option<AudioRoute> {
        self.selected.lock().clone()
    }
}

/// Permission gate with switchable answers
#[derive(Debug)]
pub struct MockPermissionGate {
    journal: Journal,
    granted: Mutex<HashSet<Permission>>,
}

impl MockPermissionGate {
    pub fn granted(journal: Journal) -> Self {
        let gate = Self { journal, granted: Mutex::new(HashSet::new()) };
        gate.grant_all();
        gate
    }

    pub fn grant_all(&self) {
        let mut granted = self.granted.lock();
        granted.insert(Permission::Camera);
        granted.insert(Permission::Microphone);
    }

    pub fn revoke_all(&self) {
        self.granted.lock().clear();
    }
}

impl PermissionGate for MockPermissionGate {
    fn is_granted(&self, permission: Permission) -> bool {
        self.granted.lock().contains(&permission)
    }

    fn request(&self, permissions: &[Permission]) {
        let names: Vec<String> = permissions.iter().map(|p| p.to_string()).collect();
        self.journal.record(format!("permissions:request:{}", names.join(",")));
    }
}

/// A full set of fakes sharing one journal
#[derive(Debug)]
pub struct MockEnvironment {
    pub journal: Journal,
    pub cameras: Arc<MockCameraSystem>,
    pub capture: Arc<MockCaptureBackend>,
    pub transport: Arc<MockTransport>,
    pub routes: Arc<MockAudioRouteEngine>,
    pub permissions: Arc<MockPermissionGate>,
    pub primary: Arc<MockSurface>,
    pub thumbnail: Arc<MockSurface>,
    pub config: HuddleConfig,
}

impl MockEnvironment {
    pub fn new() -> Self {
        Self::with_config(HuddleConfig::new("mock-token", "DailyStandup"))
    }

    pub fn with_config(config: HuddleConfig) -> Self {
        let journal = Journal::new();
        Self {
            cameras: Arc::new(MockCameraSystem::phone()),
            capture: Arc::new(MockCaptureBackend::new(journal.clone())),
            transport: Arc::new(MockTransport::new(journal.clone())),
            routes: Arc::new(MockAudioRouteEngine::new(journal.clone())),
            permissions: Arc::new(MockPermissionGate::granted(journal.clone())),
            primary: MockSurface::shared("primary", journal.clone()),
            thumbnail: MockSurface::shared("thumbnail", journal.clone()),
            journal,
            config,
        }
    }

    pub fn with_remote(self, identity: &str) -> Self {
        self.transport.add_remote(RemoteParticipantInfo::new(identity));
        self
    }

    pub fn with_cameras(mut self, cameras: MockCameraSystem) -> Self {
        self.cameras = Arc::new(cameras);
        self
    }

    pub fn with_failing_audio(mut self) -> Self {
        self.capture = Arc::new(MockCaptureBackend::new(self.journal.clone()).fail_audio());
        self
    }

    pub fn with_connect_error(self, error: EngineError) -> Self {
        self.transport.set_connect_error(Some(error));
        self
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.config.reconnect = policy;
        self
    }

    pub fn deny_permissions(self) -> Self {
        self.permissions.revoke_all();
        self
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            cameras: self.cameras.clone(),
            capture: self.capture.clone(),
            transport: self.transport.clone(),
            audio_routes: self.routes.clone(),
            permissions: self.permissions.clone(),
            primary: self.primary.clone(),
            thumbnail: self.thumbnail.clone(),
        }
    }

    pub fn startup(&self) -> HuddleResult<Startup> {
        Startup::new(self.config.clone(), self.collaborators())
    }

    /// A started call owner, without an actor
    ///
    /// Room events emitted through the transport are dropped; feed them to
    /// the core directly.
    pub async fn core(&self) -> HuddleResult<CallCore> {
        let (core, _events) = self.startup()?.start_core().await?;
        Ok(core)
    }

    /// A started call running on its actor
    pub async fn spawn(&self) -> HuddleResult<CallClient> {
        let (core, events) = self.startup()?.start_core().await?;
        Ok(CallClient::spawn(core, events))
    }
}

impl Default for MockEnvironment {
    fn default() -> Self {
        Self::new()
    }
}
