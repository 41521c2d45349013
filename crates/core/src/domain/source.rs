//! Audio source records and their value types
//!
//! An [`AudioSource`] is one application producing sound on the device. Sources
//! are created by a detector, owned by the
//! [`SourceRegistry`](crate::domain::registry::SourceRegistry) and mutated only
//! through the routing resolver.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Unique identifier for an audio source
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Physical or virtual playback destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioOutput {
    Speakers,
    Headphones,
    Bluetooth,
}

impl AudioOutput {
    pub const ALL: [AudioOutput; 3] = [
        AudioOutput::Speakers,
        AudioOutput::Headphones,
        AudioOutput::Bluetooth,
    ];

    /// Next output in the cycle speakers -> headphones -> bluetooth -> speakers
    pub fn next(self) -> Self {
        match self {
            AudioOutput::Speakers => AudioOutput::Headphones,
            AudioOutput::Headphones => AudioOutput::Bluetooth,
            AudioOutput::Bluetooth => AudioOutput::Speakers,
        }
    }

    /// Human readable name
    pub fn label(self) -> &'static str {
        match self {
            AudioOutput::Speakers => "Speakers",
            AudioOutput::Headphones => "Headphones",
            AudioOutput::Bluetooth => "Bluetooth",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AudioOutput::Speakers => "speakers",
            AudioOutput::Headphones => "headphones",
            AudioOutput::Bluetooth => "bluetooth",
        }
    }
}

impl fmt::Display for AudioOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown output name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown output '{0}' (expected speakers, headphones or bluetooth)")]
pub struct ParseOutputError(String);

impl FromStr for AudioOutput {
    type Err = ParseOutputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "speakers" | "speaker" => Ok(AudioOutput::Speakers),
            "headphones" | "headphone" => Ok(AudioOutput::Headphones),
            "bluetooth" => Ok(AudioOutput::Bluetooth),
            other => Err(ParseOutputError(other.to_string())),
        }
    }
}

/// Linear volume level, always within `[0.0, 1.0]`
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "f32", into = "f32")]
pub struct Volume(f32);

impl Volume {
    pub const MUTED: Volume = Volume(0.0);
    pub const FULL: Volume = Volume(1.0);

    pub fn new(level: f32) -> Self {
        if level.is_nan() {
            Self::MUTED
        } else {
            Self(level.clamp(0.0, 1.0))
        }
    }

    pub fn level(&self) -> f32 {
        self.0
    }

    pub fn is_muted(&self) -> bool {
        self.0 == 0.0
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self::FULL
    }
}

impl From<f32> for Volume {
    fn from(level: f32) -> Self {
        Self::new(level)
    }
}

impl From<Volume> for f32 {
    fn from(volume: Volume) -> Self {
        volume.0
    }
}

/// Routing priority; higher wins, 1 is the lowest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct Priority(u32);

impl Priority {
    pub const DEFAULT: Priority = Priority(1);
    pub const HIGH: Priority = Priority(2);

    /// Values below 1 are raised to 1
    pub fn new(value: u32) -> Self {
        Self(value.max(1))
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u32> for Priority {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<Priority> for u32 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An application producing sound on the device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSource {
    pub id: SourceId,
    pub name: String,
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default)]
    pub volume: Volume,
    pub output: AudioOutput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
}

impl AudioSource {
    /// Create a paused source at full volume with no priority
    pub fn new(id: impl Into<String>, name: impl Into<String>, output: AudioOutput) -> Self {
        Self {
            id: SourceId::new(id),
            name: name.into(),
            is_playing: false,
            volume: Volume::default(),
            output,
            priority: None,
            package_name: None,
        }
    }

    pub fn playing(mut self) -> Self {
        self.is_playing = true;
        self
    }

    pub fn with_volume(mut self, level: f32) -> Self {
        self.volume = Volume::new(level);
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = Some(Priority::new(priority));
        self
    }

    pub fn with_package_name(mut self, package_name: impl Into<String>) -> Self {
        self.package_name = Some(package_name.into());
        self
    }
}

/// Partial update applied by [`SourceRegistry::update`](crate::domain::registry::SourceRegistry::update)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceUpdate {
    pub name: Option<String>,
    pub is_playing: Option<bool>,
    pub volume: Option<f32>,
    pub output: Option<AudioOutput>,
    pub priority: Option<Priority>,
}

impl SourceUpdate {
    pub fn playing(is_playing: bool) -> Self {
        Self {
            is_playing: Some(is_playing),
            ..Self::default()
        }
    }

    pub fn volume(level: f32) -> Self {
        Self {
            volume: Some(level),
            ..Self::default()
        }
    }

    pub fn route(output: AudioOutput, priority: Priority) -> Self {
        Self {
            output: Some(output),
            priority: Some(priority),
            ..Self::default()
        }
    }

    pub fn apply(self, source: &mut AudioSource) {
        if let Some(name) = self.name {
            source.name = name;
        }
        if let Some(is_playing) = self.is_playing {
            source.is_playing = is_playing;
        }
        if let Some(level) = self.volume {
            source.volume = Volume::new(level);
        }
        if let Some(output) = self.output {
            source.output = output;
        }
        if let Some(priority) = self.priority {
            source.priority = Some(priority);
        }
    }
}
