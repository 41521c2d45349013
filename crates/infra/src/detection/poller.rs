//! Adaptive detection loop
//!
//! Calls the detector, hands the snapshot to the store as a refresh, then
//! sleeps for the interval of the current power tier. A power change restarts
//! the wait with the new interval.

use crate::store::{SourceStoreHandle, StoreError};
use soundmaster_core::domain::{
    CommandResult, DetectError, PollingSchedule, PowerState, RefreshReport, SourceDetector,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PollError {
    #[error("detection failed: {0}")]
    Detect(#[from] DetectError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("unexpected store reply: {0:?}")]
    UnexpectedReply(CommandResult),
}

pub struct DetectionPoller {
    detector: Arc<dyn SourceDetector>,
    store: SourceStoreHandle,
    schedule: PollingSchedule,
    power: watch::Receiver<PowerState>,
}

impl DetectionPoller {
    pub fn new(
        detector: Arc<dyn SourceDetector>,
        store: SourceStoreHandle,
        schedule: PollingSchedule,
        power: watch::Receiver<PowerState>,
    ) -> Self {
        Self {
            detector,
            store,
            schedule,
            power,
        }
    }

    /// Interval for the power state currently reported
    pub fn current_interval(&self) -> Duration {
        self.schedule.interval_for(&self.power.borrow())
    }

    /// Run one detection and refresh. A failed detection is also published
    /// to the store's subscribers.
    pub async fn poll_once(&self) -> Result<RefreshReport, PollError> {
        let sources = match self.detector.detect().await {
            Ok(sources) => sources,
            Err(e) => {
                self.store.notify(e.notification());
                return Err(e.into());
            }
        };
        debug!(detector = self.detector.name(), count = sources.len(), "Sources detected");

        match self.store.refresh(sources).await? {
            (CommandResult::Refreshed(report), _) => Ok(report),
            (other, _) => Err(PollError::UnexpectedReply(other)),
        }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<usize> {
        tokio::spawn(self.run(shutdown))
    }

    /// Poll until shutdown is signalled or the store goes away.
    /// Returns the number of successful refreshes.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> usize {
        info!(
            detector = self.detector.name(),
            interval_ms = self.current_interval().as_millis() as u64,
            "Detection poller started"
        );

        let mut refreshes = 0;
        let mut power_open = true;

        'poll: loop {
            match self.poll_once().await {
                Ok(report) => {
                    refreshes += 1;
                    debug!(
                        added = report.added.len(),
                        removed = report.removed.len(),
                        invalidated = report.invalidated.len(),
                        "Registry refreshed"
                    );
                }
                Err(PollError::Store(e @ StoreError::Closed)) => {
                    info!(error = %e, "Store closed, stopping poller");
                    break;
                }
                Err(e) => warn!(error = %e, "Detection round failed"),
            }

            loop {
                let interval = self.current_interval();
                let power = &mut self.power;

                tokio::select! {
                    _ = tokio::time::sleep(interval) => continue 'poll,
                    changed = power.changed(), if power_open => {
                        match changed {
                            Ok(()) => {
                                let state = *power.borrow();
                                info!(
                                    battery = state.battery_percent,
                                    charging = state.charging,
                                    power_saving = state.power_saving,
                                    interval_ms = self.schedule.interval_for(&state).as_millis() as u64,
                                    "Power state changed, adjusting detection interval"
                                );
                            }
                            Err(_) => power_open = false,
                        }
                    }
                    res = shutdown.changed() => {
                        if res.is_err() || *shutdown.borrow() {
                            break 'poll;
                        }
                    }
                }
            }
        }

        info!(refreshes, "Detection poller stopped");
        refreshes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SourceStore;
    use soundmaster_core::domain::{
        AudioOutput, AudioSource, NotificationKind, RoutingResolver, ScriptedDetector,
    };

    fn spotify() -> AudioSource {
        AudioSource::new("1", "Spotify", AudioOutput::Speakers).playing()
    }

    #[tokio::test]
    async fn test_poll_once_refreshes_store() {
        let (handle, _task) = SourceStore::spawn(RoutingResolver::with_sources(vec![]), None, 16);
        let detector = Arc::new(ScriptedDetector::with_frames(vec![vec![spotify()]]));
        let (_power_tx, power_rx) = watch::channel(PowerState::default());

        let poller = DetectionPoller::new(detector, handle.clone(), PollingSchedule::default(), power_rx);
        let report = poller.poll_once().await.unwrap();

        assert_eq!(report.added.len(), 1);
        assert_eq!(handle.snapshot().await.unwrap(), vec![spotify()]);
    }

    #[tokio::test]
    async fn test_detect_failure_is_reported() {
        let (handle, _task) = SourceStore::spawn(RoutingResolver::with_sources(vec![]), None, 16);
        let detector = Arc::new(ScriptedDetector::new());
        detector.push_failure(DetectError::PermissionDenied);
        let (_power_tx, power_rx) = watch::channel(PowerState::default());

        let poller = DetectionPoller::new(detector, handle, PollingSchedule::default(), power_rx);
        assert!(matches!(poller.poll_once().await, Err(PollError::Detect(_))));
    }

    #[tokio::test]
    async fn test_failed_rounds_notify_subscribers() {
        let (handle, _task) = SourceStore::spawn(RoutingResolver::with_sources(vec![]), None, 16);
        let mut rx = handle.subscribe();
        let detector = Arc::new(ScriptedDetector::new());
        detector.push_failure(DetectError::PermissionDenied);
        detector.push_failure(DetectError::Unavailable("audio service restarting".into()));
        detector.push(vec![spotify()]);
        let (_power_tx, power_rx) = watch::channel(PowerState::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = DetectionPoller::new(
            detector.clone(),
            handle,
            PollingSchedule::uniform(Duration::from_millis(5)),
            power_rx,
        )
        .spawn(shutdown_rx);

        let denied = rx.recv().await.unwrap();
        assert_eq!(denied.kind, NotificationKind::Error);
        assert_eq!(denied.message, "Missing permissions");

        let unavailable = rx.recv().await.unwrap();
        assert_eq!(unavailable.message, "Error detecting audio sources");
        assert_eq!(
            unavailable.description.as_deref(),
            Some("detector unavailable: audio service restarting")
        );

        // the poller keeps going after failures
        while detector.calls() < 4 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown_tx.send(true).unwrap();
        assert!(task.await.unwrap() >= 1);
    }

    #[tokio::test]
    async fn test_interval_follows_power_state() {
        let (handle, _task) = SourceStore::spawn(RoutingResolver::with_sources(vec![]), None, 16);
        let (power_tx, power_rx) = watch::channel(PowerState::charging(50));

        let poller = DetectionPoller::new(
            Arc::new(ScriptedDetector::new()),
            handle,
            PollingSchedule::default(),
            power_rx,
        );
        assert_eq!(poller.current_interval(), Duration::from_secs(10));

        power_tx.send(PowerState::on_battery(4)).unwrap();
        assert_eq!(poller.current_interval(), Duration::from_secs(45));
    }

    #[tokio::test]
    async fn test_run_polls_until_shutdown() {
        let (handle, _task) = SourceStore::spawn(RoutingResolver::with_sources(vec![]), None, 16);
        let detector = Arc::new(ScriptedDetector::with_frames(vec![vec![spotify()]]));
        let (_power_tx, power_rx) = watch::channel(PowerState::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let poller = DetectionPoller::new(
            detector.clone(),
            handle,
            PollingSchedule::uniform(Duration::from_millis(5)),
            power_rx,
        );
        let task = poller.spawn(shutdown_rx);

        while detector.calls() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        shutdown_tx.send(true).unwrap();

        let refreshes = task.await.unwrap();
        assert!(refreshes >= 3);
    }

    #[tokio::test]
    async fn test_run_stops_when_store_closes() {
        let (handle, task) = SourceStore::spawn(RoutingResolver::with_sources(vec![]), None, 16);
        task.abort();
        let _ = task.await;

        let (_power_tx, power_rx) = watch::channel(PowerState::default());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let poller = DetectionPoller::new(
            Arc::new(ScriptedDetector::new()),
            handle,
            PollingSchedule::uniform(Duration::from_millis(5)),
            power_rx,
        );

        assert_eq!(poller.run(shutdown_rx).await, 0);
    }
}
