//! Built-in detector
//!
//! Reports a fixed set of media sessions. It stands in for platform audio
//! session APIs, which this crate does not bind to.

use soundmaster_core::domain::{AudioOutput, AudioSource, DetectError, SourceDetector};
use tracing::trace;

pub struct DemoDetector {
    sessions: Vec<AudioSource>,
}

impl DemoDetector {
    pub fn new() -> Self {
        Self::with_sessions(vec![
            AudioSource::new("1", "Spotify", AudioOutput::Speakers)
                .playing()
                .with_volume(0.8)
                .with_package_name("com.spotify.music"),
            AudioSource::new("2", "YouTube", AudioOutput::Headphones)
                .with_volume(0.5)
                .with_package_name("com.google.android.youtube"),
            AudioSource::new("3", "Netflix", AudioOutput::Bluetooth)
                .playing()
                .with_volume(0.7)
                .with_package_name("com.netflix.mediaclient"),
        ])
    }

    pub fn with_sessions(sessions: Vec<AudioSource>) -> Self {
        Self { sessions }
    }
}

impl Default for DemoDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SourceDetector for DemoDetector {
    fn name(&self) -> &str {
        "demo"
    }

    async fn detect(&self) -> Result<Vec<AudioSource>, DetectError> {
        trace!(count = self.sessions.len(), "Reporting demo sessions");
        Ok(self.sessions.clone())
    }
}
