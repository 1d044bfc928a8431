use ride_pulse::codec::encode_event;
use ride_pulse::config::RuntimeConfig;
use ride_pulse::engine::Engine;
use ride_pulse::event::{EventType, RideEvent};
use ride_pulse::notify::{ChangeNotificationEmitter, ChannelSink, Notification};
use ride_pulse::projection::DashboardProjection;
use ride_pulse::runtime::{RunSummary, Runtime};
use ride_pulse::source::decode_log;
use ride_pulse::views::CityCount;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

fn line(event_type: EventType, ride_id: &str, city: &str, duration: Option<u32>) -> String {
    let mut event = RideEvent::new(event_type, ride_id, city);
    event.duration_minutes = duration;
    encode_event(&event).unwrap()
}

async fn run_log(log: &str, config: RuntimeConfig) -> (Runtime, RunSummary, Vec<Notification>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let emitter = ChangeNotificationEmitter::new(vec![Arc::new(ChannelSink::new(tx))]);
    let runtime = Runtime::new(Arc::new(Engine::default()), Arc::new(emitter), config);
    runtime.recover().unwrap();

    let mut dispatcher = runtime.start();
    for decoded in decode_log(log.as_bytes()) {
        dispatcher.dispatch_decoded(decoded).await.unwrap();
    }
    let summary = dispatcher.shutdown().await.unwrap();

    let mut notifications = Vec::new();
    while let Ok(n) = rx.try_recv() {
        notifications.push(n);
    }
    (runtime, summary, notifications)
}

fn mumbai_log() -> String {
    [
        line(EventType::Started, "r1", "Mumbai", None),
        line(EventType::Started, "r2", "Mumbai", None),
        line(EventType::Completed, "r1", "Mumbai", Some(30)),
        line(EventType::Completed, "r2", "Mumbai", Some(90)),
    ]
    .join("\n")
}

#[tokio::test]
async fn test_mumbai_log_end_to_end() {
    let (runtime, summary, notifications) = run_log(&mumbai_log(), RuntimeConfig::default()).await;
    assert_eq!(summary.dispatched, 4);
    assert_eq!(summary.malformed, 0);

    let state = runtime.engine().city_state("Mumbai").unwrap();
    assert_eq!(state.active_count, 0);
    assert_eq!(state.completed_count, 2);
    assert_eq!(state.total_duration_minutes, 120);
    assert_eq!(runtime.engine().average_duration("Mumbai"), 60.0);

    let anomalies: Vec<_> = notifications
        .iter()
        .filter_map(|n| match n {
            Notification::Anomaly { ride_id, duration, .. } => Some((ride_id.as_str(), *duration)),
            _ => None,
        })
        .collect();
    assert_eq!(anomalies, vec![("r2", 90)]);

    let last_metrics = notifications
        .iter()
        .rev()
        .find_map(|n| match n {
            Notification::Metrics {
                active_rides,
                rides_completed,
                avg_duration,
                ..
            } => Some((*active_rides, *rides_completed, *avg_duration)),
            _ => None,
        })
        .unwrap();
    assert_eq!(last_metrics, (0, 2, 60.0));

    // Mumbai dropped to zero, so the final ranking is empty.
    let last_top = notifications
        .iter()
        .rev()
        .find_map(|n| match n {
            Notification::TopActiveCities { cities, .. } => Some(cities.clone()),
            _ => None,
        })
        .unwrap();
    assert!(last_top.is_empty());
}

#[tokio::test]
async fn test_six_city_ranking() {
    let mut lines = vec![
        line(EventType::Started, "m1", "Mumbai", None),
        line(EventType::Started, "m2", "Mumbai", None),
        line(EventType::Started, "m3", "Mumbai", None),
    ];
    for city in ["Pune", "Delhi", "Chennai", "Bangalore", "Hyderabad"] {
        lines.push(line(EventType::Started, "x", city, None));
    }

    let (runtime, _, notifications) = run_log(&lines.join("\n"), RuntimeConfig::default()).await;

    let expected = vec![
        CityCount::new("Mumbai", 3),
        CityCount::new("Bangalore", 1),
        CityCount::new("Chennai", 1),
        CityCount::new("Delhi", 1),
        CityCount::new("Hyderabad", 1),
    ];
    assert_eq!(runtime.engine().top_cities(), expected);

    let last_top = notifications
        .iter()
        .rev()
        .find_map(|n| match n {
            Notification::TopActiveCities { cities, .. } => Some(cities.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(last_top, expected);
    assert!(
        notifications.iter().all(|n| match n {
            Notification::TopActiveCities { cities, .. } => cities.len() <= 5,
            _ => true,
        })
    );
}

#[tokio::test]
async fn test_malformed_lines_do_not_halt_processing() {
    let log = [
        line(EventType::Started, "r1", "Delhi", None),
        "{broken".to_string(),
        r#"{"eventType":"RIDE_STARTED","rideId":"r2"}"#.to_string(),
        r#"{"eventType":"TELEPORTED","rideId":"r3","city":"Delhi"}"#.to_string(),
        line(EventType::Started, "r4", "Delhi", None),
    ]
    .join("\n");

    let (runtime, summary, _) = run_log(&log, RuntimeConfig::default()).await;
    assert_eq!(summary.malformed, 3);
    assert_eq!(summary.dispatched, 2);
    assert_eq!(runtime.engine().city_state("Delhi").unwrap().active_count, 2);
}

#[tokio::test]
async fn test_restart_from_checkpoint_matches_single_run() {
    let dir = TempDir::new().unwrap();
    let config = RuntimeConfig {
        checkpoint_path: Some(dir.path().join("checkpoints/state.json")),
        ..RuntimeConfig::default()
    };

    let full: Vec<String> = (0..20)
        .map(|i| {
            let city = ["Mumbai", "Delhi", "Pune"][i % 3];
            if i % 4 == 3 {
                line(EventType::Completed, "r", city, Some(20 + i as u32 * 7))
            } else {
                line(EventType::Started, "r", city, None)
            }
        })
        .collect();

    // First run sees only a prefix of the log, then the process "crashes".
    run_log(&full[..9].join("\n"), config.clone()).await;

    // Second run replays the complete log against the recovered state.
    let (resumed, summary, notifications) = run_log(&full.join("\n"), config).await;
    assert_eq!(summary.already_applied, 9);

    let (fresh, _, _) = run_log(&full.join("\n"), RuntimeConfig::default()).await;
    assert_eq!(resumed.engine().snapshot(), fresh.engine().snapshot());

    // The replayed prefix is not folded again, but its long rides are
    // reported again because anomalies are not deduplicated.
    let replayed_anomalies = notifications
        .iter()
        .filter(|n| matches!(n, Notification::Anomaly { .. }))
        .count();
    let long_rides = (0..full.len())
        .filter(|i| i % 4 == 3 && 20 + *i as u32 * 7 > 60)
        .count();
    let long_rides_in_prefix = (0..9)
        .filter(|i| i % 4 == 3 && 20 + *i as u32 * 7 > 60)
        .count();
    assert_eq!(long_rides_in_prefix, 1);
    assert_eq!(replayed_anomalies, long_rides);
}

#[tokio::test]
async fn test_dashboard_projection_follows_notifications() {
    let (_, _, notifications) = run_log(&mumbai_log(), RuntimeConfig::default()).await;

    let projection = DashboardProjection::new();
    for n in &notifications {
        projection.ingest(&serde_json::to_string(n).unwrap());
    }

    let snapshot = projection.snapshot();
    assert_eq!(snapshot.active_rides, 0);
    assert_eq!(snapshot.average_duration, 60.0);
    assert!(snapshot.top_cities.is_empty());
}
