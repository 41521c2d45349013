//! Integration tests for output routing
//!
//! These tests run the resolver behind the source store actor, the way the
//! CLI does, and check the full flow from command to notification to the
//! saved state file.

use soundmaster_core::domain::{
    AudioOutput, AudioSource, CommandResult, ConfigManager, ConfirmChoice, DetectError,
    NotificationKind, PlaybackDecision, PollingSchedule, PowerState, Priority, RouteDecision,
    RoutingResolver, ScriptedDetector, SessionStore, SourceId, SourceRegistry,
};
use soundmaster_infra::detection::DetectionPoller;
use soundmaster_infra::store::{SourceStore, SourceStoreHandle};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::watch;

fn id(value: &str) -> SourceId {
    SourceId::new(value)
}

fn start(sources: Vec<AudioSource>) -> (SourceStoreHandle, tokio::task::JoinHandle<RoutingResolver>) {
    SourceStore::spawn(RoutingResolver::with_sources(sources), None, 32)
}

fn playing_on(sources: &[AudioSource], output: AudioOutput) -> Vec<SourceId> {
    sources
        .iter()
        .filter(|s| s.is_playing && s.output == output)
        .map(|s| s.id.clone())
        .collect()
}

// ============================================================================
// ROUTING SCENARIOS
// ============================================================================

#[tokio::test]
async fn test_free_output_is_granted_with_default_priority() {
    let (store, _task) = start(vec![
        AudioSource::new("1", "YouTube Music", AudioOutput::Headphones).playing(),
        AudioSource::new("2", "Chrome Browser", AudioOutput::Bluetooth),
    ]);

    let (result, notifications) = store
        .request_output(id("1"), AudioOutput::Speakers, false, None)
        .await
        .unwrap();

    assert_eq!(
        result,
        CommandResult::Route(RouteDecision::Granted {
            output: AudioOutput::Speakers,
            priority: Priority::DEFAULT,
        })
    );
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].kind, NotificationKind::Success);
    assert_eq!(notifications[0].message, "Output changed");
    assert_eq!(
        notifications[0].description.as_deref(),
        Some("Routing audio to: Speakers")
    );

    let sources = store.snapshot().await.unwrap();
    let moved = sources.iter().find(|s| s.id == id("1")).unwrap();
    assert_eq!(moved.output, AudioOutput::Speakers);
    assert_eq!(moved.priority, Some(Priority::DEFAULT));
    assert!(moved.is_playing);
}

#[tokio::test]
async fn test_end_to_end_override() {
    let (store, _task) = start(vec![
        AudioSource::new("1", "YouTube Music", AudioOutput::Speakers).playing(),
        AudioSource::new("2", "Chrome Browser", AudioOutput::Headphones).playing(),
    ]);

    // unforced: blocked, nothing changes
    let before = store.snapshot().await.unwrap();
    let (result, notifications) = store
        .request_output(id("2"), AudioOutput::Speakers, false, None)
        .await
        .unwrap();
    let CommandResult::Route(RouteDecision::NeedsConfirmation(confirmation)) = result else {
        panic!("expected confirmation");
    };
    assert_eq!(confirmation.holder, id("1"));
    assert_eq!(
        notifications[0].message,
        "YouTube Music is already playing through this output"
    );
    assert_eq!(notifications[0].actions.len(), 2);
    assert_eq!(store.snapshot().await.unwrap(), before);

    // forced with a priority: holder stops, requester takes the output
    let (result, notifications) = store
        .request_output(id("2"), AudioOutput::Speakers, true, Some(Priority::new(2)))
        .await
        .unwrap();
    assert_eq!(
        result,
        CommandResult::Route(RouteDecision::Overridden {
            output: AudioOutput::Speakers,
            priority: Priority::new(2),
            displaced: vec![id("1")],
        })
    );
    assert_eq!(notifications[0].message, "Output changed (Priority 2)");

    let sources = store.snapshot().await.unwrap();
    assert_eq!(playing_on(&sources, AudioOutput::Speakers), vec![id("2")]);
    assert!(!sources[0].is_playing);
    assert_eq!(sources[0].output, AudioOutput::Speakers);
}

#[tokio::test]
async fn test_priority_tie_break() {
    let (store, _task) = start(vec![
        AudioSource::new("1", "Podcast", AudioOutput::Speakers)
            .playing()
            .with_priority(3),
        AudioSource::new("2", "Game", AudioOutput::Headphones).playing(),
    ]);

    // equal priority is denied
    let (result, notifications) = store
        .request_output(id("2"), AudioOutput::Speakers, true, Some(Priority::new(3)))
        .await
        .unwrap();
    assert_eq!(
        result,
        CommandResult::Route(RouteDecision::DeniedPriority {
            holder: id("1"),
            holder_priority: Priority::new(3),
        })
    );
    assert_eq!(notifications[0].kind, NotificationKind::Error);
    assert_eq!(
        notifications[0].description.as_deref(),
        Some("Podcast has higher priority")
    );

    // strictly greater wins
    let (result, _) = store
        .request_output(id("2"), AudioOutput::Speakers, true, Some(Priority::new(4)))
        .await
        .unwrap();
    assert!(matches!(
        result,
        CommandResult::Route(RouteDecision::Overridden { .. })
    ));

    let sources = store.snapshot().await.unwrap();
    assert_eq!(playing_on(&sources, AudioOutput::Speakers), vec![id("2")]);
}

#[tokio::test]
async fn test_confirmation_flow_through_store() {
    let (store, task) = start(vec![
        AudioSource::new("1", "Spotify", AudioOutput::Headphones).playing(),
        AudioSource::new("2", "Netflix", AudioOutput::Speakers).playing(),
    ]);

    // speakers -> headphones, which Spotify is using
    let (result, _) = store.cycle_output(id("2")).await.unwrap();
    let CommandResult::Route(RouteDecision::NeedsConfirmation(first)) = result else {
        panic!("expected confirmation");
    };
    assert_eq!(first.output, AudioOutput::Headphones);

    let (result, _) = store.dismiss(first.id).await.unwrap();
    assert_eq!(result, CommandResult::Dismissed(true));

    let (result, _) = store
        .confirm(first.id, ConfirmChoice::HighPriority)
        .await
        .unwrap();
    assert_eq!(result, CommandResult::Route(RouteDecision::Expired(first.id)));

    let (result, _) = store.cycle_output(id("2")).await.unwrap();
    let CommandResult::Route(RouteDecision::NeedsConfirmation(second)) = result else {
        panic!("expected confirmation");
    };
    let (result, notifications) = store
        .confirm(second.id, ConfirmChoice::HighPriority)
        .await
        .unwrap();
    assert_eq!(
        result,
        CommandResult::Route(RouteDecision::Overridden {
            output: AudioOutput::Headphones,
            priority: Priority::HIGH,
            displaced: vec![id("1")],
        })
    );
    assert_eq!(notifications[0].message, "Output changed (Priority 2)");

    drop(store);
    let resolver = task.await.unwrap();
    assert!(!resolver.source(&id("1")).unwrap().is_playing);
    assert_eq!(resolver.pending_confirmations().count(), 0);
}

#[tokio::test]
async fn test_playback_refused_on_busy_output() {
    let (store, _task) = start(vec![
        AudioSource::new("1", "Spotify", AudioOutput::Speakers).playing(),
        AudioSource::new("2", "YouTube", AudioOutput::Speakers),
    ]);

    let (result, notifications) = store.toggle_playback(id("2")).await.unwrap();
    assert_eq!(
        result,
        CommandResult::Playback(PlaybackDecision::DeniedOutputInUse { holder: id("1") })
    );
    assert_eq!(notifications[0].message, "Output in use");

    store.toggle_playback(id("1")).await.unwrap();
    let (result, _) = store.toggle_playback(id("2")).await.unwrap();
    assert_eq!(result, CommandResult::Playback(PlaybackDecision::Started));
}

// ============================================================================
// DETECTION
// ============================================================================

#[tokio::test]
async fn test_poller_refresh_invalidates_pending_confirmation() {
    let spotify = AudioSource::new("1", "Spotify", AudioOutput::Speakers).playing();
    let youtube = AudioSource::new("2", "YouTube", AudioOutput::Headphones).playing();

    let (store, _task) = start(vec![spotify.clone(), youtube.clone()]);
    let (result, _) = store
        .request_output(id("2"), AudioOutput::Speakers, false, None)
        .await
        .unwrap();
    let CommandResult::Route(RouteDecision::NeedsConfirmation(pending)) = result else {
        panic!("expected confirmation");
    };

    // the holder's session ended
    let detector = Arc::new(ScriptedDetector::with_frames(vec![vec![youtube]]));
    let (_power_tx, power_rx) = watch::channel(PowerState::default());
    let poller = DetectionPoller::new(detector, store.clone(), PollingSchedule::default(), power_rx);

    let report = poller.poll_once().await.unwrap();
    assert_eq!(report.removed, vec![id("1")]);
    assert_eq!(report.invalidated, vec![pending.id]);

    let (result, _) = store
        .confirm(pending.id, ConfirmChoice::ForceChange)
        .await
        .unwrap();
    assert_eq!(result, CommandResult::Route(RouteDecision::Expired(pending.id)));
}

#[tokio::test]
async fn test_detection_failures_reach_subscribers() {
    let (store, _task) = start(vec![AudioSource::new("1", "Spotify", AudioOutput::Speakers)]);
    let mut notifications = store.subscribe();

    let detector = Arc::new(ScriptedDetector::new());
    for _ in 0..3 {
        detector.push_failure(DetectError::PermissionDenied);
    }
    let (_power_tx, power_rx) = watch::channel(PowerState::default());
    let poller = DetectionPoller::new(detector, store.clone(), PollingSchedule::default(), power_rx);

    for _ in 0..3 {
        assert!(poller.poll_once().await.is_err());
        let notification = notifications.recv().await.unwrap();
        assert_eq!(notification.kind, NotificationKind::Error);
        assert_eq!(notification.message, "Missing permissions");
    }

    // a failed round leaves the registry untouched
    assert_eq!(store.snapshot().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_new_sources_are_announced_after_first_load() {
    let (store, _task) = start(vec![]);
    let mut notifications = store.subscribe();

    let detector = Arc::new(ScriptedDetector::with_frames(vec![
        vec![AudioSource::new("1", "Spotify", AudioOutput::Speakers)],
        vec![
            AudioSource::new("1", "Spotify", AudioOutput::Speakers),
            AudioSource::new("2", "Podcasts", AudioOutput::Headphones),
        ],
    ]));
    let (_power_tx, power_rx) = watch::channel(PowerState::default());
    let poller = DetectionPoller::new(detector, store.clone(), PollingSchedule::default(), power_rx);

    poller.poll_once().await.unwrap();
    poller.poll_once().await.unwrap();

    let announced = notifications.recv().await.unwrap();
    assert_eq!(announced.message, "New audio source detected");
    assert_eq!(announced.description.as_deref(), Some("Podcasts"));
    assert!(notifications.try_recv().is_err());
}

// ============================================================================
// PERSISTENCE
// ============================================================================

#[tokio::test]
async fn test_state_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let manager = ConfigManager::new(temp_dir.path().to_path_buf());
    let config = manager.load().await;
    let state_path = manager.state_path(&config);

    let (store, task) = SourceStore::spawn(
        RoutingResolver::new(
            SourceRegistry::from_sources(vec![
                AudioSource::new("1", "Spotify", AudioOutput::Speakers).playing(),
                AudioSource::new("2", "YouTube", AudioOutput::Headphones),
            ]),
            config.routing.clone(),
        ),
        Some(SessionStore::new(state_path.clone())),
        config.app.notification_capacity,
    );

    store.set_volume(id("2"), 0.4).await.unwrap();
    store
        .request_output(id("2"), AudioOutput::Bluetooth, false, None)
        .await
        .unwrap();
    drop(store);
    task.await.unwrap();

    let restored = SessionStore::new(state_path).load().await;
    let (store, _task) = start(restored);
    let sources = store.snapshot().await.unwrap();

    assert_eq!(sources.len(), 2);
    assert_eq!(sources[1].output, AudioOutput::Bluetooth);
    assert_eq!(sources[1].priority, Some(Priority::DEFAULT));
    assert_eq!(sources[1].volume.level(), 0.4);
}
