//! Domain entities and business rules

pub mod command;
pub mod config;
pub mod detector;
pub mod notification;
pub mod persistence;
pub mod registry;
pub mod routing;
pub mod source;

// Re-export specific items to avoid ambiguous glob imports
pub use command::{Command, CommandExecutor, CommandResult};
pub use config::{ConfigError, ConfigManager, SoundmasterConfig};
pub use detector::{DetectError, PollingSchedule, PowerState, ScriptedDetector, SourceDetector};
pub use notification::{Notification, NotificationAction, NotificationKind};
pub use persistence::{SessionState, SessionStore};
pub use registry::{RefreshDiff, SourceRegistry};
pub use routing::{
    ConfirmChoice, Confirmation, ConfirmationId, PlaybackDecision, RefreshReport, RouteDecision,
    RoutingResolver, VolumeDecision,
};
pub use source::{AudioOutput, AudioSource, Priority, SourceId, SourceUpdate, Volume};
