//! Source store actor
//!
//! [`SourceStore`] owns the [`RoutingResolver`] inside a tokio task. Callers
//! hold a cloneable [`SourceStoreHandle`] and send commands over an mpsc
//! channel with a oneshot reply. After every successful mutation the registry
//! is mirrored to the state file; notifications fan out on a broadcast channel.

use soundmaster_core::domain::{
    AudioOutput, AudioSource, Command, CommandExecutor, CommandResult, ConfirmChoice, ConfirmationId,
    Notification, Priority, RoutingResolver, SessionStore, SourceId,
};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

const COMMAND_QUEUE: usize = 32;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("source store is no longer running")]
    Closed,

    #[error("unexpected store reply: {0:?}")]
    UnexpectedReply(CommandResult),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Reply to a single command
pub type Reply = (CommandResult, Vec<Notification>);

struct Request {
    command: Command,
    reply: oneshot::Sender<Reply>,
}

/// Actor owning the routing resolver
pub struct SourceStore {
    resolver: RoutingResolver,
    persistence: Option<SessionStore>,
    commands: mpsc::Receiver<Request>,
    notifications: broadcast::Sender<Notification>,
}

impl SourceStore {
    /// Start the actor task
    ///
    /// The task ends once every handle has been dropped and yields the
    /// resolver back, which lets callers inspect the final state.
    pub fn spawn(
        resolver: RoutingResolver,
        persistence: Option<SessionStore>,
        notification_capacity: usize,
    ) -> (SourceStoreHandle, JoinHandle<RoutingResolver>) {
        let (tx, commands) = mpsc::channel(COMMAND_QUEUE);
        let (notifications, _) = broadcast::channel(notification_capacity.max(1));

        let store = Self {
            resolver,
            persistence,
            commands,
            notifications: notifications.clone(),
        };

        info!(
            sources = store.resolver.registry().len(),
            persisted = store.persistence.is_some(),
            "Source store started"
        );

        let task = tokio::spawn(store.run());
        (SourceStoreHandle { tx, notifications }, task)
    }

    async fn run(mut self) -> RoutingResolver {
        while let Some(request) = self.commands.recv().await {
            trace!(command = ?request.command, "Executing command");
            let (result, notifications) = self.resolver.execute(request.command);

            if result.is_mutation() {
                if let Some(store) = &self.persistence {
                    persist(store, self.resolver.registry().snapshot()).await;
                }
            }

            for notification in &notifications {
                // no subscribers is fine
                let _ = self.notifications.send(notification.clone());
            }

            if request.reply.send((result, notifications)).is_err() {
                debug!("Command caller went away before the reply");
            }
        }

        info!("Source store stopped");
        self.resolver
    }
}

/// Save failures are logged; the in-memory registry stays authoritative
async fn persist(store: &SessionStore, sources: Vec<AudioSource>) {
    if let Err(e) = store.save(&sources).await {
        error!(
            path = %store.path().display(),
            error = %e,
            "Failed to persist sources"
        );
    }
}

/// Cloneable handle to a running [`SourceStore`]
#[derive(Clone)]
pub struct SourceStoreHandle {
    tx: mpsc::Sender<Request>,
    notifications: broadcast::Sender<Notification>,
}

impl SourceStoreHandle {
    pub async fn send(&self, command: Command) -> Result<Reply> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request { command, reply })
            .await
            .map_err(|_| StoreError::Closed)?;
        rx.await.map_err(|_| StoreError::Closed)
    }

    /// Receive every notification emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    /// Publish a notification that did not come from a command
    pub fn notify(&self, notification: Notification) {
        if self.notifications.send(notification).is_err() {
            trace!("Notification dropped, no subscribers");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub async fn request_output(
        &self,
        source_id: SourceId,
        output: AudioOutput,
        force: bool,
        priority: Option<Priority>,
    ) -> Result<Reply> {
        self.send(Command::RequestOutput {
            source_id,
            output,
            force,
            priority,
        })
        .await
    }

    pub async fn cycle_output(&self, source_id: SourceId) -> Result<Reply> {
        self.send(Command::CycleOutput { source_id }).await
    }

    pub async fn confirm(&self, confirmation: ConfirmationId, choice: ConfirmChoice) -> Result<Reply> {
        self.send(Command::Confirm { confirmation, choice }).await
    }

    pub async fn dismiss(&self, confirmation: ConfirmationId) -> Result<Reply> {
        self.send(Command::Dismiss { confirmation }).await
    }

    pub async fn toggle_playback(&self, source_id: SourceId) -> Result<Reply> {
        self.send(Command::TogglePlayback { source_id }).await
    }

    pub async fn set_volume(&self, source_id: SourceId, volume: f32) -> Result<Reply> {
        self.send(Command::SetVolume { source_id, volume }).await
    }

    pub async fn refresh(&self, sources: Vec<AudioSource>) -> Result<Reply> {
        self.send(Command::Refresh { sources }).await
    }

    pub async fn snapshot(&self) -> Result<Vec<AudioSource>> {
        into_snapshot(self.send(Command::Snapshot).await?)
    }
}

fn into_snapshot((result, _): Reply) -> Result<Vec<AudioSource>> {
    match result {
        CommandResult::Snapshot(sources) => Ok(sources),
        other => Err(StoreError::UnexpectedReply(other)),
    }
}

#[async_trait::async_trait]
impl CommandExecutor for SourceStoreHandle {
    async fn execute(&self, command: Command) -> (CommandResult, Vec<Notification>) {
        match self.send(command).await {
            Ok(reply) => reply,
            Err(e) => (CommandResult::Error(e.to_string()), Vec::new()),
        }
    }
}
