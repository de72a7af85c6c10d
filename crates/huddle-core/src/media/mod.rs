//! Local and remote media tracks
//!
//! Tracks are shared handles: the [`LocalTrackManager`] exclusively owns the
//! local audio and video tracks and lends them to the session for transport,
//! while remote tracks arrive from the transport through room events and are
//! only referenced by the preview compositor.
//!
//! Video tracks carry a list of attached render sinks. Frame delivery happens
//! on the media pipeline's thread, so the sink list sits behind a read-mostly
//! lock and a bound track is otherwise treated as an immutable handle.

pub mod local;
pub mod sink;
pub mod track;

pub use local::LocalTrackManager;
pub use sink::{SinkId, SurfaceSlot, VideoFrame, VideoSink};
pub use track::{
    AudioOptions, AudioTrack, CaptureFormat, DataTrack, LocalTrack, TrackId, TrackKind,
    TrackOrigin, VideoTrack,
};
