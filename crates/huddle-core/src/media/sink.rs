//! Render sinks and display surfaces
//!
//! A render sink is anything frames of a video track can be delivered to. The
//! UI owns two of them, the primary (full screen) surface and the thumbnail,
//! and the preview compositor decides which track is bound to which.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Identifier of a render sink
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SinkId(String);

impl SinkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The two display surfaces a call renders into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurfaceSlot {
    /// Large surface, shows the remote participant by default
    Primary,
    /// Small overlay, shows the local camera by default
    Thumbnail,
}

impl SurfaceSlot {
    /// The other slot
    pub fn opposite(self) -> Self {
        match self {
            SurfaceSlot::Primary => SurfaceSlot::Thumbnail,
            SurfaceSlot::Thumbnail => SurfaceSlot::Primary,
        }
    }
}

impl fmt::Display for SurfaceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceSlot::Primary => f.write_str("primary"),
            SurfaceSlot::Thumbnail => f.write_str("thumbnail"),
        }
    }
}

/// A decoded video frame handed to render sinks
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Capture timestamp in microseconds
    pub timestamp_us: u64,
    /// I420 pixel data
    pub data: Bytes,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, timestamp_us: u64, data: Bytes) -> Self {
        Self { width, height, timestamp_us, data }
    }
}

/// A display surface that receives video frames
///
/// Implemented by the UI layer. `render_frame` is called from the media
/// pipeline thread; every other method is only called from the call owner.
pub trait VideoSink: Send + Sync + fmt::Debug {
    /// Stable identifier of this surface
    fn id(&self) -> &SinkId;

    /// Draw a frame
    fn render_frame(&self, frame: &VideoFrame);

    /// Blank the surface
    fn clear_image(&self);

    /// Mirror frames horizontally
    fn set_mirror(&self, mirror: bool);

    /// Show or hide the surface
    fn set_visible(&self, visible: bool);
}
