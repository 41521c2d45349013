//! Output routing resolver
//!
//! Decides whether an audio source may claim an output, and funnels every
//! registry mutation (routing, playback, volume, refresh) through one owner.
//!
//! Rules:
//! - at most one source plays through a given output at any time
//! - an unforced request for an occupied output is parked as a pending
//!   confirmation and changes nothing
//! - a forced request displaces the current holder unless both sides carry an
//!   explicit priority and the requester's is not strictly greater
//!
//! Every terminal outcome queues a [`Notification`]; drain them with
//! [`RoutingResolver::take_notifications`].

use crate::domain::command::{Command, CommandResult};
use crate::domain::config::RoutingConfig;
use crate::domain::notification::{Notification, NotificationAction};
use crate::domain::registry::SourceRegistry;
use crate::domain::source::{AudioOutput, AudioSource, Priority, SourceId, SourceUpdate, Volume};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Handle for a parked output change awaiting a user choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfirmationId(u64);

impl ConfirmationId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConfirmationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Follow-up offered when an output is already taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmChoice {
    /// Retry forced, without a priority
    ForceChange,
    /// Retry forced, with the configured high priority
    HighPriority,
}

impl ConfirmChoice {
    pub const ALL: [ConfirmChoice; 2] = [ConfirmChoice::HighPriority, ConfirmChoice::ForceChange];

    pub fn label(self) -> &'static str {
        match self {
            ConfirmChoice::ForceChange => "Force Change",
            ConfirmChoice::HighPriority => "Set High Priority",
        }
    }
}

/// An output change parked until the user picks a [`ConfirmChoice`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub id: ConfirmationId,
    pub requester: SourceId,
    pub output: AudioOutput,
    pub holder: SourceId,
    pub holder_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Output was free; requester now holds it
    Granted { output: AudioOutput, priority: Priority },
    /// Previous holders were stopped; requester now holds the output
    Overridden {
        output: AudioOutput,
        priority: Priority,
        displaced: Vec<SourceId>,
    },
    /// Output is taken and the request was not forced
    NeedsConfirmation(Confirmation),
    /// Forced request lost the priority comparison
    DeniedPriority { holder: SourceId, holder_priority: Priority },
    /// The confirmation was already used, dismissed or invalidated
    Expired(ConfirmationId),
    UnknownSource,
}

impl RouteDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, RouteDecision::Granted { .. } | RouteDecision::Overridden { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackDecision {
    Started,
    Stopped,
    DeniedOutputInUse { holder: SourceId },
    UnknownSource,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VolumeDecision {
    Changed { previous: Volume, current: Volume },
    UnknownSource,
}

/// Outcome of replacing the registry with a fresh detector snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub added: Vec<SourceId>,
    pub removed: Vec<SourceId>,
    /// Pending confirmations that referenced a source no longer present
    pub invalidated: Vec<ConfirmationId>,
}

/// Single owner of the source registry and the routing rules
#[derive(Debug)]
pub struct RoutingResolver {
    registry: SourceRegistry,
    config: RoutingConfig,
    pending: BTreeMap<ConfirmationId, Confirmation>,
    next_confirmation: u64,
    outbox: Vec<Notification>,
}

impl RoutingResolver {
    pub fn new(registry: SourceRegistry, config: RoutingConfig) -> Self {
        Self {
            registry,
            config,
            pending: BTreeMap::new(),
            next_confirmation: 1,
            outbox: Vec::new(),
        }
    }

    pub fn with_sources(sources: Vec<AudioSource>) -> Self {
        Self::new(SourceRegistry::from_sources(sources), RoutingConfig::default())
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    pub fn source(&self, id: &SourceId) -> Option<&AudioSource> {
        self.registry.get(id)
    }

    pub fn pending_confirmations(&self) -> impl Iterator<Item = &Confirmation> {
        self.pending.values()
    }

    /// Drain notifications queued since the last call
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.outbox)
    }

    /// Ask for `source_id` to claim `output`
    pub fn request_output_change(
        &mut self,
        source_id: &SourceId,
        output: AudioOutput,
        force: bool,
        priority: Option<Priority>,
    ) -> RouteDecision {
        if !self.registry.contains(source_id) {
            debug!(id = %source_id, "Output change for unknown source ignored");
            return RouteDecision::UnknownSource;
        }

        let holders: Vec<(SourceId, String, Option<Priority>)> = self
            .registry
            .playing_on(output, source_id)
            .into_iter()
            .map(|s| (s.id.clone(), s.name.clone(), s.priority))
            .collect();

        let Some((holder_id, holder_name, _)) = holders.first().cloned() else {
            let applied = self.assign_output(source_id, output, priority);
            info!(id = %source_id, %output, priority = %applied, "Output granted");
            self.emit(Self::output_changed(output, priority));
            return RouteDecision::Granted {
                output,
                priority: applied,
            };
        };

        if !force {
            return self.park(source_id, output, holder_id, holder_name);
        }

        if let Some(requested) = priority {
            let blocking = holders
                .iter()
                .filter_map(|(id, name, held)| held.map(|p| (id, name, p)))
                .filter(|(_, _, held)| requested <= *held)
                .max_by_key(|(_, _, held)| *held);

            if let Some((id, name, held)) = blocking {
                info!(
                    id = %source_id,
                    holder = %id,
                    requested = %requested,
                    held = %held,
                    "Override denied by priority"
                );
                self.emit(
                    Notification::error("Cannot override higher priority source")
                        .with_description(format!("{} has higher priority", name)),
                );
                return RouteDecision::DeniedPriority {
                    holder: id.clone(),
                    holder_priority: held,
                };
            }
        }

        let displaced: Vec<SourceId> = holders.into_iter().map(|(id, _, _)| id).collect();
        for id in &displaced {
            self.force_stop(id);
        }

        let applied = self.assign_output(source_id, output, priority);
        info!(
            id = %source_id,
            %output,
            priority = %applied,
            displaced = displaced.len(),
            "Output taken over"
        );
        self.emit(Self::output_changed(output, priority));

        RouteDecision::Overridden {
            output,
            priority: applied,
            displaced,
        }
    }

    /// Resume a parked output change with the user's choice
    pub fn confirm(&mut self, id: ConfirmationId, choice: ConfirmChoice) -> RouteDecision {
        let Some(confirmation) = self.pending.remove(&id) else {
            debug!(confirmation = %id, "Confirmation no longer pending");
            return RouteDecision::Expired(id);
        };

        let priority = match choice {
            ConfirmChoice::ForceChange => None,
            ConfirmChoice::HighPriority => Some(Priority::new(self.config.high_priority)),
        };

        debug!(confirmation = %id, ?choice, "Confirmation accepted");
        self.request_output_change(&confirmation.requester, confirmation.output, true, priority)
    }

    /// Drop a parked output change. Returns false if it was not pending.
    pub fn dismiss(&mut self, id: ConfirmationId) -> bool {
        let removed = self.pending.remove(&id).is_some();
        debug!(confirmation = %id, removed, "Confirmation dismissed");
        removed
    }

    /// Flip playback, refusing to start on an output another source is using
    pub fn toggle_playback(&mut self, source_id: &SourceId) -> PlaybackDecision {
        let Some(source) = self.registry.get(source_id) else {
            debug!(id = %source_id, "Playback toggle for unknown source ignored");
            return PlaybackDecision::UnknownSource;
        };

        if source.is_playing {
            self.registry.update(source_id, SourceUpdate::playing(false));
            debug!(id = %source_id, "Playback paused");
            return PlaybackDecision::Stopped;
        }

        let output = source.output;
        if let Some(holder) = self.registry.find_by_output(output, source_id) {
            let holder_id = holder.id.clone();
            let description = format!("{} is already playing through {}", holder.name, output);
            debug!(id = %source_id, holder = %holder_id, %output, "Playback refused, output in use");
            self.emit(Notification::error("Output in use").with_description(description));
            return PlaybackDecision::DeniedOutputInUse { holder: holder_id };
        }

        self.registry.update(source_id, SourceUpdate::playing(true));
        debug!(id = %source_id, "Playback started");
        PlaybackDecision::Started
    }

    /// Stop a source without any conflict check. Returns true if it was playing.
    pub fn force_stop(&mut self, source_id: &SourceId) -> bool {
        match self.registry.get_mut(source_id) {
            Some(source) if source.is_playing => {
                source.is_playing = false;
                debug!(id = %source_id, "Source force-stopped");
                true
            }
            _ => false,
        }
    }

    pub fn set_volume(&mut self, source_id: &SourceId, level: f32) -> VolumeDecision {
        let Some(previous) = self.registry.get(source_id).map(|s| s.volume) else {
            debug!(id = %source_id, "Volume change for unknown source ignored");
            return VolumeDecision::UnknownSource;
        };

        let current = Volume::new(level);
        self.registry.update(source_id, SourceUpdate::volume(current.level()));

        let threshold = self.config.high_volume_threshold;
        if current.is_muted() {
            self.emit(Notification::info("Audio muted"));
        } else if previous.level() <= threshold && current.level() > threshold {
            self.emit(Notification::warning("Warning - High volume!"));
        }

        VolumeDecision::Changed { previous, current }
    }

    /// Replace the registry with a detector snapshot
    pub fn refresh(&mut self, sources: Vec<AudioSource>) -> RefreshReport {
        let announce = self.config.announce_new_sources && !self.registry.is_empty();
        let diff = self.registry.replace_all(sources);

        let registry = &self.registry;
        let invalidated: Vec<ConfirmationId> = self
            .pending
            .values()
            .filter(|c| !registry.contains(&c.requester) || !registry.contains(&c.holder))
            .map(|c| c.id)
            .collect();
        for id in &invalidated {
            self.pending.remove(id);
        }
        if !invalidated.is_empty() {
            warn!(count = invalidated.len(), "Pending confirmations invalidated by refresh");
        }

        if announce {
            let names: Vec<String> = diff
                .added
                .iter()
                .filter_map(|id| self.registry.get(id))
                .map(|s| s.name.clone())
                .collect();
            for name in names {
                self.emit(Notification::info("New audio source detected").with_description(name));
            }
        }

        RefreshReport {
            added: diff.added,
            removed: diff.removed,
            invalidated,
        }
    }

    /// Run one command, returning its result and the notifications it produced
    pub fn execute(&mut self, command: Command) -> (CommandResult, Vec<Notification>) {
        let result = match command {
            Command::RequestOutput {
                source_id,
                output,
                force,
                priority,
            } => CommandResult::Route(self.request_output_change(&source_id, output, force, priority)),
            Command::CycleOutput { source_id } => match self.registry.get(&source_id) {
                Some(source) => {
                    let next = source.output.next();
                    CommandResult::Route(self.request_output_change(&source_id, next, false, None))
                }
                None => CommandResult::Route(RouteDecision::UnknownSource),
            },
            Command::Confirm { confirmation, choice } => {
                CommandResult::Route(self.confirm(confirmation, choice))
            }
            Command::Dismiss { confirmation } => CommandResult::Dismissed(self.dismiss(confirmation)),
            Command::TogglePlayback { source_id } => {
                CommandResult::Playback(self.toggle_playback(&source_id))
            }
            Command::SetVolume { source_id, volume } => {
                CommandResult::Volume(self.set_volume(&source_id, volume))
            }
            Command::Refresh { sources } => CommandResult::Refreshed(self.refresh(sources)),
            Command::Snapshot => CommandResult::Snapshot(self.registry.snapshot()),
        };

        (result, self.take_notifications())
    }

    fn assign_output(
        &mut self,
        source_id: &SourceId,
        output: AudioOutput,
        priority: Option<Priority>,
    ) -> Priority {
        let applied = priority.unwrap_or_default();
        self.registry.update(source_id, SourceUpdate::route(output, applied));
        applied
    }

    fn park(
        &mut self,
        requester: &SourceId,
        output: AudioOutput,
        holder: SourceId,
        holder_name: String,
    ) -> RouteDecision {
        // one parked change per (requester, output)
        self.pending
            .retain(|_, c| !(&c.requester == requester && c.output == output));

        let id = ConfirmationId::new(self.next_confirmation);
        self.next_confirmation += 1;

        let confirmation = Confirmation {
            id,
            requester: requester.clone(),
            output,
            holder,
            holder_name,
        };
        self.pending.insert(id, confirmation.clone());

        info!(
            id = %requester,
            holder = %confirmation.holder,
            %output,
            confirmation = %id,
            "Output in use, confirmation required"
        );

        let mut notification = Notification::warning(format!(
            "{} is already playing through this output",
            confirmation.holder_name
        ));
        for choice in ConfirmChoice::ALL {
            notification = notification.with_action(NotificationAction {
                label: choice.label().to_string(),
                confirmation: id,
                choice,
            });
        }
        self.emit(notification);

        RouteDecision::NeedsConfirmation(confirmation)
    }

    fn output_changed(output: AudioOutput, priority: Option<Priority>) -> Notification {
        let message = match priority {
            Some(p) => format!("Output changed (Priority {})", p),
            None => "Output changed".to_string(),
        };
        Notification::success(message).with_description(format!("Routing audio to: {}", output.label()))
    }

    fn emit(&mut self, notification: Notification) {
        self.outbox.push(notification);
    }
}
