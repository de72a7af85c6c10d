//! Device capability probing
//!
//! Decides which camera pipeline the device can drive and finds the front
//! camera on it. Probing runs once during startup; the resulting tier is fixed
//! for the rest of the process.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::engine::{CameraApi, CameraId, CameraSystem, HardwareLevel};
use crate::error::{HuddleError, HuddleResult};

/// Capture pipeline feature level of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CapabilityTier {
    #[default]
    Legacy,
    Limited,
    Full,
}

impl CapabilityTier {
    /// Camera pipeline used for enumeration and capture at this tier
    pub fn camera_api(self) -> CameraApi {
        match self {
            CapabilityTier::Legacy => CameraApi::Legacy,
            CapabilityTier::Limited | CapabilityTier::Full => CameraApi::Full,
        }
    }

    /// Tier implied by a single device's hardware level
    ///
    /// `None` for levels this crate does not recognise.
    pub fn from_level(level: HardwareLevel) -> Option<Self> {
        match level {
            HardwareLevel::Legacy => Some(CapabilityTier::Legacy),
            HardwareLevel::Limited => Some(CapabilityTier::Limited),
            HardwareLevel::Full => Some(CapabilityTier::Full),
            HardwareLevel::Other(_) => None,
        }
    }
}

impl fmt::Display for CapabilityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityTier::Legacy => f.write_str("legacy"),
            CapabilityTier::Limited => f.write_str("limited"),
            CapabilityTier::Full => f.write_str("full"),
        }
    }
}

/// Probes the camera system for its capability tier
pub struct CapabilityProber {
    cameras: Arc<dyn CameraSystem>,
}

impl CapabilityProber {
    pub fn new(cameras: Arc<dyn CameraSystem>) -> Self {
        Self { cameras }
    }

    /// Determine the capability tier
    ///
    /// Every camera is examined in enumeration order and the last one decides
    /// the tier. Cameras with an unknown level or that cannot be accessed
    /// count as `Legacy`. Never fails.
    pub fn probe(&self) -> CapabilityTier {
        let ids = match self.cameras.camera_ids() {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "Camera enumeration failed, assuming legacy camera support");
                return CapabilityTier::Legacy;
            }
        };

        if ids.is_empty() {
            warn!("No cameras found, assuming legacy camera support");
            return CapabilityTier::Legacy;
        }

        let tier = ids.iter().fold(CapabilityTier::Legacy, |_, id| self.device_tier(id));
        info!(tier = %tier, cameras = ids.len(), "Camera capability probed");
        tier
    }

    fn device_tier(&self, id: &CameraId) -> CapabilityTier {
        match self.cameras.hardware_level(id) {
            Ok(level) => match CapabilityTier::from_level(level) {
                Some(tier) => {
                    debug!(camera = %id, tier = %tier, "Camera hardware level");
                    tier
                }
                None => {
                    warn!(camera = %id, level = ?level, "Unknown camera hardware level, treating as legacy");
                    CapabilityTier::Legacy
                }
            },
            Err(e) => {
                error!(camera = %id, error = %e, "Camera access failed, treating as legacy");
                CapabilityTier::Legacy
            }
        }
    }

    /// First front-facing camera on the tier's pipeline
    ///
    /// A device without one cannot run a call; the error is not recoverable.
    pub fn front_facing_camera_id(&self, tier: CapabilityTier) -> HuddleResult<CameraId> {
        let api = tier.camera_api();
        let camera = self
            .cameras
            .device_names(api)
            .into_iter()
            .find(|id| self.cameras.is_front_facing(api, id));

        match camera {
            Some(id) => {
                info!(camera = %id, api = %api, "Front-facing camera selected");
                Ok(id)
            }
            None => {
                error!(api = %api, "No front-facing camera found");
                Err(HuddleError::FrontCameraMissing { pipeline: api.to_string() })
            }
        }
    }
}
