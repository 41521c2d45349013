//! Command bus vocabulary
//!
//! Every mutation of the source registry is expressed as a [`Command`] and
//! applied by [`RoutingResolver::execute`](crate::domain::routing::RoutingResolver::execute).
//! Front ends talk to whatever owns the resolver through [`CommandExecutor`].

use crate::domain::notification::Notification;
use crate::domain::routing::{
    ConfirmChoice, ConfirmationId, PlaybackDecision, RefreshReport, RouteDecision, VolumeDecision,
};
use crate::domain::source::{AudioOutput, AudioSource, Priority, SourceId};

/// Command types for runtime state management
#[derive(Debug, Clone)]
pub enum Command {
    RequestOutput {
        source_id: SourceId,
        output: AudioOutput,
        force: bool,
        priority: Option<Priority>,
    },
    /// Unforced request for the next output in the cycle
    CycleOutput {
        source_id: SourceId,
    },
    Confirm {
        confirmation: ConfirmationId,
        choice: ConfirmChoice,
    },
    Dismiss {
        confirmation: ConfirmationId,
    },
    TogglePlayback {
        source_id: SourceId,
    },
    SetVolume {
        source_id: SourceId,
        volume: f32,
    },
    /// Wholesale replacement from a detector
    Refresh {
        sources: Vec<AudioSource>,
    },
    Snapshot,
}

/// Result of command execution
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    Route(RouteDecision),
    Playback(PlaybackDecision),
    Volume(VolumeDecision),
    Dismissed(bool),
    Refreshed(RefreshReport),
    Snapshot(Vec<AudioSource>),
    Error(String),
}

impl CommandResult {
    /// Whether the registry changed and should be persisted
    pub fn is_mutation(&self) -> bool {
        match self {
            CommandResult::Route(decision) => decision.is_granted(),
            CommandResult::Playback(decision) => {
                matches!(decision, PlaybackDecision::Started | PlaybackDecision::Stopped)
            }
            CommandResult::Volume(decision) => matches!(decision, VolumeDecision::Changed { .. }),
            CommandResult::Refreshed(_) => true,
            CommandResult::Dismissed(_) | CommandResult::Snapshot(_) | CommandResult::Error(_) => false,
        }
    }
}

/// Trait for command execution
#[async_trait::async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Apply a command and return its result together with the notifications it produced
    async fn execute(&self, command: Command) -> (CommandResult, Vec<Notification>);
}
