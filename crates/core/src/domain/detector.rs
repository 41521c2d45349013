//! Audio source detection
//!
//! The resolver never talks to a detector directly: a poller calls
//! [`SourceDetector::detect`] on an interval chosen by [`PollingSchedule`]
//! and feeds the snapshot to the registry as a refresh.

use crate::domain::config::{ConfigError, Result as ConfigResult};
use crate::domain::notification::Notification;
use crate::domain::source::AudioSource;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DetectError {
    /// Platform audio session API could not be queried
    #[error("detector unavailable: {0}")]
    Unavailable(String),

    /// The user has not granted the permission needed to list sessions
    #[error("permission denied for audio session detection")]
    PermissionDenied,
}

impl DetectError {
    /// Notification shown when a detection round fails
    pub fn notification(&self) -> Notification {
        match self {
            DetectError::PermissionDenied => Notification::error("Missing permissions")
                .with_description("Grant access to audio sessions to detect sources"),
            DetectError::Unavailable(_) => {
                Notification::error("Error detecting audio sources").with_description(self.to_string())
            }
        }
    }
}

/// Capability producing the full list of currently active audio sources
#[async_trait::async_trait]
pub trait SourceDetector: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    async fn detect(&self) -> Result<Vec<AudioSource>, DetectError>;
}

/// Device power status reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerState {
    /// Battery charge, 0 to 100
    pub battery_percent: u8,
    pub charging: bool,
    pub power_saving: bool,
}

impl PowerState {
    pub fn on_battery(battery_percent: u8) -> Self {
        Self {
            battery_percent: battery_percent.min(100),
            charging: false,
            power_saving: false,
        }
    }

    pub fn charging(battery_percent: u8) -> Self {
        Self {
            charging: true,
            ..Self::on_battery(battery_percent)
        }
    }

    pub fn tier(&self) -> PowerTier {
        if self.power_saving {
            return PowerTier::PowerSaving;
        }
        // a low battery slows polling even while charging
        match self.battery_percent {
            0..=5 => PowerTier::Critical,
            6..=15 => PowerTier::Low,
            16..=30 => PowerTier::Moderate,
            _ if self.charging => PowerTier::Charging,
            _ => PowerTier::Battery,
        }
    }
}

impl Default for PowerState {
    fn default() -> Self {
        Self::on_battery(100)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerTier {
    PowerSaving,
    /// Above 30% and charging
    Charging,
    /// Above 30%
    Battery,
    /// 16 to 30%
    Moderate,
    /// 6 to 15%
    Low,
    /// 5% and below
    Critical,
}

/// Detection interval per power tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSchedule {
    #[serde(rename = "power_saving_ms", with = "millis")]
    pub power_saving: Duration,
    #[serde(rename = "charging_ms", with = "millis")]
    pub charging: Duration,
    #[serde(rename = "battery_ms", with = "millis")]
    pub battery: Duration,
    #[serde(rename = "moderate_ms", with = "millis")]
    pub moderate: Duration,
    #[serde(rename = "low_ms", with = "millis")]
    pub low: Duration,
    #[serde(rename = "critical_ms", with = "millis")]
    pub critical: Duration,
}

impl Default for PollingSchedule {
    fn default() -> Self {
        Self {
            power_saving: Duration::from_secs(60),
            charging: Duration::from_secs(10),
            battery: Duration::from_secs(15),
            moderate: Duration::from_secs(20),
            low: Duration::from_secs(30),
            critical: Duration::from_secs(45),
        }
    }
}

impl PollingSchedule {
    /// Same interval for every tier
    pub fn uniform(interval: Duration) -> Self {
        Self {
            power_saving: interval,
            charging: interval,
            battery: interval,
            moderate: interval,
            low: interval,
            critical: interval,
        }
    }

    pub fn interval_for(&self, power: &PowerState) -> Duration {
        match power.tier() {
            PowerTier::PowerSaving => self.power_saving,
            PowerTier::Charging => self.charging,
            PowerTier::Battery => self.battery,
            PowerTier::Moderate => self.moderate,
            PowerTier::Low => self.low,
            PowerTier::Critical => self.critical,
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let all = [
            self.power_saving,
            self.charging,
            self.battery,
            self.moderate,
            self.low,
            self.critical,
        ];
        if all.iter().any(Duration::is_zero) {
            return Err(ConfigError::Invalid(
                "detection intervals must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

enum Frame {
    Sources(Vec<AudioSource>),
    Failure(DetectError),
}

/// Detector replaying scripted snapshots, for tests and demos
///
/// Each call to `detect` consumes the next frame. Once the script runs out the
/// last successful snapshot is repeated.
#[derive(Default)]
pub struct ScriptedDetector {
    frames: Mutex<VecDeque<Frame>>,
    last: Mutex<Vec<AudioSource>>,
    calls: AtomicUsize,
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frames(frames: Vec<Vec<AudioSource>>) -> Self {
        let detector = Self::new();
        for frame in frames {
            detector.push(frame);
        }
        detector
    }

    pub fn push(&self, sources: Vec<AudioSource>) {
        self.lock_frames().push_back(Frame::Sources(sources));
    }

    pub fn push_failure(&self, error: DetectError) {
        self.lock_frames().push_back(Frame::Failure(error));
    }

    /// Number of times `detect` has been called
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn lock_frames(&self) -> std::sync::MutexGuard<'_, VecDeque<Frame>> {
        self.frames.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait::async_trait]
impl SourceDetector for ScriptedDetector {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn detect(&self) -> Result<Vec<AudioSource>, DetectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let frame = self.lock_frames().pop_front();
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        match frame {
            Some(Frame::Sources(sources)) => {
                *last = sources.clone();
                Ok(sources)
            }
            Some(Frame::Failure(error)) => Err(error),
            None => Ok(last.clone()),
        }
    }
}
