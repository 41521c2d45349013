//! Registry state file
//!
//! The registry is mirrored to a TOML file after every successful mutation and
//! reloaded at startup. The in-memory registry stays the source of truth: a
//! failed save is reported to the caller, who logs it and carries on.

use crate::domain::config::Result;
use crate::domain::source::AudioSource;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, info, instrument};

/// On-disk shape of the registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub sources: Vec<AudioSource>,
}

pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved sources
    ///
    /// A missing file yields an empty list. A corrupt file is copied aside with
    /// a `.corrupt` extension and also yields an empty list.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Vec<AudioSource> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No saved sources");
            return Vec::new();
        }

        match self.read().await {
            Ok(state) => {
                info!(
                    path = %self.path.display(),
                    count = state.sources.len(),
                    "Saved sources loaded"
                );
                state.sources
            }
            Err(e) => {
                error!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to load saved sources, starting empty"
                );

                let backup_path = self.path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(&self.path, &backup_path).await {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt state file"
                    );
                }

                Vec::new()
            }
        }
    }

    #[instrument(skip(self, sources), fields(count = sources.len()))]
    pub async fn save(&self, sources: &[AudioSource]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let state = SessionState {
            sources: sources.to_vec(),
        };
        let toml_str = toml::to_string_pretty(&state)?;
        fs::write(&self.path, toml_str).await?;

        debug!(path = %self.path.display(), "Sources saved");
        Ok(())
    }

    async fn read(&self) -> Result<SessionState> {
        let contents = fs::read_to_string(&self.path).await?;
        Ok(toml::from_str(&contents)?)
    }
}
