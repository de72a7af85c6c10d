//! Audio route selection
//!
//! Wraps the external [`AudioRouteEngine`]. Starting the selector forces the
//! speakerphone as a baseline and then lets the engine pick the best device
//! from the preference order; the engine is responsible for honouring that
//! order when several devices are present. Route changes are only logged.
//!
//! [`RouteSelector::stop`] consumes the selector, so it runs exactly once and
//! nothing can be called on a stopped selector.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::AudioRouteEngine;

/// Class of audio output device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioDeviceClass {
    BluetoothHeadset,
    WiredHeadset,
    Speakerphone,
    Earpiece,
}

impl fmt::Display for AudioDeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioDeviceClass::BluetoothHeadset => f.write_str("bluetooth headset"),
            AudioDeviceClass::WiredHeadset => f.write_str("wired headset"),
            AudioDeviceClass::Speakerphone => f.write_str("speakerphone"),
            AudioDeviceClass::Earpiece => f.write_str("earpiece"),
        }
    }
}

/// Bluetooth headset > wired headset > speakerphone > earpiece
pub const DEFAULT_ROUTE_PREFERENCE: [AudioDeviceClass; 4] = [
    AudioDeviceClass::BluetoothHeadset,
    AudioDeviceClass::WiredHeadset,
    AudioDeviceClass::Speakerphone,
    AudioDeviceClass::Earpiece,
];

/// A concrete output device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioRoute {
    pub class: AudioDeviceClass,
    pub name: String,
}

impl AudioRoute {
    pub fn new(class: AudioDeviceClass, name: impl Into<String>) -> Self {
        Self { class, name: name.into() }
    }
}

/// Notification from the route engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteChange {
    pub available: Vec<AudioRoute>,
    pub selected: Option<AudioRoute>,
}

/// Channel the route engine reports changes on
pub type RouteChangeSender = mpsc::UnboundedSender<RouteChange>;

/// Running audio route negotiation
pub struct RouteSelector {
    engine: Arc<dyn AudioRouteEngine>,
    preference: Vec<AudioDeviceClass>,
    monitor: Option<JoinHandle<()>>,
}

impl RouteSelector {
    /// Start route negotiation
    ///
    /// Must be called from within a tokio runtime; change notifications are
    /// logged by a background task.
    pub fn start(engine: Arc<dyn AudioRouteEngine>, preference: Vec<AudioDeviceClass>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<RouteChange>();

        let monitor = tokio::spawn(async move {
            while let Some(change) = rx.recv().await {
                match &change.selected {
                    Some(route) => info!(
                        route = %route.name,
                        class = %route.class,
                        available = change.available.len(),
                        "Audio route changed"
                    ),
                    None => info!(available = change.available.len(), "Audio route changed: no device selected"),
                }
            }
            debug!("Audio route listener closed");
        });

        engine.set_preferred_devices(&preference);
        engine.start(tx);
        engine.set_speakerphone_on(true);
        engine.activate();
        info!(preference = ?preference, "Audio route selection started");

        Self { engine, preference, monitor: Some(monitor) }
    }

    /// Route currently selected by the engine
    pub fn active_route(&self) -> Option<AudioRoute> {
        self.engine.selected_device()
    }

    pub fn preference(&self) -> &[AudioDeviceClass] {
        &self.preference
    }

    /// Stop route negotiation
    pub fn stop(mut self) {
        self.engine.stop();
        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
        }
        info!("Audio route selection stopped");
    }
}

impl Drop for RouteSelector {
    fn drop(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            warn!("Route selector dropped without stop()");
            monitor.abort();
        }
    }
}

impl fmt::Debug for RouteSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteSelector")
            .field("preference", &self.preference)
            .field("running", &self.monitor.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Journal, MockAudioRouteEngine};
    use std::time::Duration;
    use tracing_test::traced_test;

    #[tokio::test]
    async fn test_start_forces_speakerphone_before_activation() {
        let journal = Journal::new();
        let engine = Arc::new(MockAudioRouteEngine::new(journal.clone()));

        let selector = RouteSelector::start(engine.clone(), DEFAULT_ROUTE_PREFERENCE.to_vec());

        assert_eq!(
            journal.entries(),
            vec![
                "route:preferred:bluetooth headset,wired headset,speakerphone,earpiece",
                "route:start",
                "route:speakerphone:on",
                "route:activate",
            ]
        );
        assert_eq!(selector.preference(), &DEFAULT_ROUTE_PREFERENCE);

        selector.stop();
        assert_eq!(journal.count("route:stop"), 1);
    }

    #[tokio::test]
    async fn test_active_route_comes_from_engine() {
        let engine = Arc::new(MockAudioRouteEngine::new(Journal::new()));
        let selector = RouteSelector::start(engine.clone(), DEFAULT_ROUTE_PREFERENCE.to_vec());
        assert_eq!(selector.active_route(), None);

        engine.select(AudioRoute::new(AudioDeviceClass::WiredHeadset, "USB-C headset"));
        assert_eq!(selector.active_route().map(|r| r.class), Some(AudioDeviceClass::WiredHeadset));
        selector.stop();
    }

    #[traced_test]
    #[tokio::test]
    async fn test_route_change_is_logged() {
        let engine = Arc::new(MockAudioRouteEngine::new(Journal::new()));
        let selector = RouteSelector::start(engine.clone(), DEFAULT_ROUTE_PREFERENCE.to_vec());

        engine.select(AudioRoute::new(AudioDeviceClass::BluetoothHeadset, "Buds"));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(logs_contain("Audio route changed"));
        selector.stop();
    }
}
