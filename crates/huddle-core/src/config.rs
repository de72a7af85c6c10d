//! Call configuration
//!
//! ```rust
//! use huddle_core::{HuddleConfig, ReconnectPolicy, RetryConfig};
//!
//! let config = HuddleConfig::new("eyJhbGciOi...", "DailyStandup")
//!     .with_reconnect(ReconnectPolicy::Backoff(RetryConfig::quick()));
//! assert!(config.validate().is_ok());
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HuddleError, HuddleResult};
use crate::media::{AudioOptions, CaptureFormat};
use crate::route::{AudioDeviceClass, DEFAULT_ROUTE_PREFERENCE};

/// Configuration for one call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HuddleConfig {
    /// Credential presented to the media transport
    pub access_token: String,
    /// Room to join
    pub room_name: String,
    pub capture_format: CaptureFormat,
    pub audio: AudioOptions,
    pub microphone_track_name: String,
    pub camera_track_name: String,
    /// Whether local tracks start enabled
    pub start_enabled: bool,
    /// Audio output preference, most preferred first
    pub route_preference: Vec<AudioDeviceClass>,
    pub reconnect: ReconnectPolicy,
    /// Capacity of the UI notice channel
    pub notice_capacity: usize,
}

impl Default for HuddleConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            room_name: String::new(),
            capture_format: CaptureFormat::default(),
            audio: AudioOptions::default(),
            microphone_track_name: "microphone".to_string(),
            camera_track_name: "camera".to_string(),
            start_enabled: true,
            route_preference: DEFAULT_ROUTE_PREFERENCE.to_vec(),
            reconnect: ReconnectPolicy::default(),
            notice_capacity: 256,
        }
    }
}

impl HuddleConfig {
    pub fn new(access_token: impl Into<String>, room_name: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            room_name: room_name.into(),
            ..Default::default()
        }
    }

    pub fn with_capture_format(mut self, format: CaptureFormat) -> Self {
        self.capture_format = format;
        self
    }

    pub fn with_audio_options(mut self, audio: AudioOptions) -> Self {
        self.audio = audio;
        self
    }

    pub fn with_route_preference(mut self, preference: Vec<AudioDeviceClass>) -> Self {
        self.route_preference = preference;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_start_enabled(mut self, enabled: bool) -> Self {
        self.start_enabled = enabled;
        self
    }

    pub fn with_notice_capacity(mut self, capacity: usize) -> Self {
        self.notice_capacity = capacity;
        self
    }

    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> HuddleResult<Self> {
        serde_yaml::from_str(yaml).map_err(|e| HuddleError::invalid_config("yaml", e.to_string()))
    }

    /// Load a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> HuddleResult<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| HuddleError::invalid_config(path.display().to_string(), e.to_string()))?;
        Self::from_yaml_str(&yaml)
    }

    /// Check the configuration before starting a call
    pub fn validate(&self) -> HuddleResult<()> {
        if self.access_token.trim().is_empty() {
            return Err(HuddleError::invalid_config("access_token", "must not be empty"));
        }
        if self.room_name.trim().is_empty() {
            return Err(HuddleError::invalid_config("room_name", "must not be empty"));
        }
        let format = self.capture_format;
        if format.width == 0 || format.height == 0 || format.fps == 0 {
            return Err(HuddleError::invalid_config("capture_format", format!("{format} is not a usable format")));
        }
        if self.route_preference.is_empty() {
            return Err(HuddleError::invalid_config("route_preference", "must name at least one device class"));
        }
        for (i, class) in self.route_preference.iter().enumerate() {
            if self.route_preference[..i].contains(class) {
                return Err(HuddleError::invalid_config("route_preference", format!("{class} listed twice")));
            }
        }
        if self.notice_capacity == 0 {
            return Err(HuddleError::invalid_config("notice_capacity", "must be greater than zero"));
        }
        if let ReconnectPolicy::Backoff(retry) = &self.reconnect {
            retry.validate()?;
        }
        Ok(())
    }
}

/// What to do when a connect attempt fails
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReconnectPolicy {
    /// Retry right away, with the same parameters, forever
    #[default]
    Immediate,
    /// Exponential backoff, giving up after `max_attempts` connects
    Backoff(RetryConfig),
}

/// Backoff parameters for reconnecting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of connect attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Whether to add ±10% jitter to delays
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Short delays, more attempts
    pub fn quick() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 1.5,
            use_jitter: true,
        }
    }

    /// Long delays, no jitter
    pub fn slow() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            use_jitter: false,
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(63) as i32;
        let millis = self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let delay = Duration::from_millis(millis.min(self.max_delay.as_millis() as f64) as u64);

        if self.use_jitter {
            let jitter = (rand::random::<f64>() - 0.5) * 0.2;
            let millis = delay.as_millis() as f64;
            Duration::from_millis((millis * (1.0 + jitter)) as u64)
        } else {
            delay
        }
    }

    fn validate(&self) -> HuddleResult<()> {
        if self.max_attempts == 0 {
            return Err(HuddleError::invalid_config("reconnect.max_attempts", "must be at least 1"));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(HuddleError::invalid_config("reconnect.backoff_multiplier", "must be at least 1.0"));
        }
        if self.initial_delay > self.max_delay {
            return Err(HuddleError::invalid_config("reconnect.initial_delay", "exceeds max_delay"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = HuddleConfig::new("token", "DailyStandup");
        assert_eq!(config.capture_format, CaptureFormat::new(1080, 1920, 60));
        assert_eq!(config.microphone_track_name, "microphone");
        assert_eq!(config.reconnect, ReconnectPolicy::Immediate);
        assert_eq!(config.route_preference, DEFAULT_ROUTE_PREFERENCE.to_vec());
        assert!(config.audio.echo_cancellation && config.audio.noise_suppression);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_failures() {
        assert!(HuddleConfig::default().validate().is_err());

        let err = HuddleConfig::new("token", "room")
            .with_route_preference(vec![AudioDeviceClass::Earpiece, AudioDeviceClass::Earpiece])
            .validate()
            .unwrap_err();
        assert!(matches!(err, HuddleError::InvalidConfiguration { ref field, .. } if field == "route_preference"));

        let err = HuddleConfig::new("token", "room")
            .with_reconnect(ReconnectPolicy::Backoff(RetryConfig { max_attempts: 0, ..Default::default() }))
            .validate()
            .unwrap_err();
        assert_eq!(err.category(), "configuration");
    }

    #[test]
    fn test_yaml_loading() {
        let yaml = r#"
access_token: abc
room_name: Retro
start_enabled: false
route_preference: [wired_headset, speakerphone]
reconnect:
  mode: backoff
  max_attempts: 4
  use_jitter: false
"#;
        let config = HuddleConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.room_name, "Retro");
        assert!(!config.start_enabled);
        assert_eq!(
            config.route_preference,
            vec![AudioDeviceClass::WiredHeadset, AudioDeviceClass::Speakerphone]
        );
        assert_eq!(
            config.reconnect,
            ReconnectPolicy::Backoff(RetryConfig { max_attempts: 4, use_jitter: false, ..Default::default() })
        );
        assert_eq!(config.capture_format, CaptureFormat::default());
    }

    #[test]
    fn test_bad_yaml_is_configuration_error() {
        let err = HuddleConfig::from_yaml_str("room_name: [unclosed").unwrap_err();
        assert_eq!(err.category(), "configuration");
    }

    #[test]
    fn test_backoff_delays() {
        let retry = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
            backoff_multiplier: 2.0,
            use_jitter: false,
        };
        assert_eq!(retry.delay_for_retry(1), Duration::from_millis(100));
        assert_eq!(retry.delay_for_retry(2), Duration::from_millis(200));
        assert_eq!(retry.delay_for_retry(3), Duration::from_millis(300));
        assert_eq!(retry.delay_for_retry(9), Duration::from_millis(300));
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let retry = RetryConfig { use_jitter: true, ..Default::default() };
        for _ in 0..50 {
            let delay = retry.delay_for_retry(1).as_millis();
            assert!((89..=110).contains(&delay), "delay {delay} out of range");
        }
    }
}
