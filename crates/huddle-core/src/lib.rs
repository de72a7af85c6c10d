//! huddle-core: session and track lifecycle for a one-to-one video call
//!
//! This crate keeps a single participant's view of a conferencing room
//! consistent while three things change underneath it independently: the
//! connection to the room, the local camera and microphone, and the remote
//! participant's tracks. The media engine itself (transport, capture, audio
//! routing) lives outside and is reached through the traits in [`engine`].
//!
//! ## Components
//! ```text
//! CapabilityProber ──► LocalTrackManager ──► SessionController ◄── EventRouter
//!                                                   │                  │
//!                      RouteSelector                └─► PreviewCompositor
//! ```
//!
//! - [`capability`]: camera pipeline tier and front camera lookup
//! - [`route`]: audio output negotiation
//! - [`media`]: local and remote tracks, render sinks
//! - [`session`]: connect/reconnect/disconnect state machine
//! - [`router`]: room event dispatch
//! - [`preview`]: which track renders on which surface
//! - [`call`]: startup and the actor that owns all of the above
//!
//! ## Example
//! ```rust,no_run
//! use huddle_core::mock::MockEnvironment;
//! use huddle_core::{StartupOutcome, HuddleResult};
//!
//! # async fn demo() -> HuddleResult<()> {
//! let env = MockEnvironment::new().with_remote("alice");
//! if let StartupOutcome::Started(call) = env.startup()?.run().await? {
//!     call.toggle_preview()?;
//!     call.end_call()?;
//!     call.wait().await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod call;
pub mod capability;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod media;
pub mod mock;
pub mod preview;
pub mod route;
pub mod router;
pub mod session;

pub use call::{CallClient, CallCommand, CallCore, CallFlow, CallSnapshot, Collaborators, Startup, StartupOutcome};
pub use capability::{CapabilityProber, CapabilityTier};
pub use config::{HuddleConfig, ReconnectPolicy, RetryConfig};
pub use engine::{CameraApi, CameraId, ParticipantIdentity, Permission, RemoteTrack, TrackPublication};
pub use error::{EngineError, HuddleError, HuddleResult};
pub use events::{CallEndReason, NoticeEmitter, RoomEvent, RemoteTrackEvent, LocalTrackEvent, UiNotice};
pub use media::{LocalTrackManager, SurfaceSlot, TrackKind, VideoSink};
pub use preview::{PreviewBindings, PreviewCompositor};
pub use route::{AudioDeviceClass, RouteSelector, DEFAULT_ROUTE_PREFERENCE};
pub use router::EventRouter;
pub use session::{SessionController, SessionState};

/// huddle-core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
