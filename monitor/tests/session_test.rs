//! Integration tests for the session state machine: end-to-end scenarios,
//! time accounting, alerts and persistence.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use focusflow_monitor::alerts::Alert;
use focusflow_monitor::classifier::RelevanceClassifier;
use focusflow_monitor::config::ClassifierConfig;
use focusflow_monitor::domain::DomainExtractor;
use focusflow_monitor::engine::replay;
use focusflow_monitor::session::SessionMachine;
use focusflow_monitor::sink::{JsonlSink, MemorySink};
use focusflow_monitor::types::{
    Classification, EngineEvent, TimedObservation, WindowObservation, DEFAULT_DESCRIPTION,
    DEFAULT_GOAL,
};
use tempfile::TempDir;
use tokio::sync::mpsc;

// =============================================================================
// Test Helpers
// =============================================================================

const GOAL: &str = "Deep Learning";
const DESCRIPTION: &str = "studying CNNs";

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn obs(title: &str) -> Option<WindowObservation> {
    Some(WindowObservation::new(title, "firefox"))
}

fn classifier() -> Arc<RelevanceClassifier> {
    Arc::new(RelevanceClassifier::rules_only(&ClassifierConfig::default()))
}

/// A rules-only machine persisting to memory and reporting events.
fn create_machine() -> (SessionMachine, MemorySink, mpsc::UnboundedReceiver<EngineEvent>) {
    let sink = MemorySink::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let machine = SessionMachine::new(classifier(), DomainExtractor::default(), Box::new(sink.clone()))
        .with_events(tx);
    (machine, sink, rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Sum of closed durations plus the open activity's elapsed time.
fn accounted_time(machine: &SessionMachine, now: DateTime<Utc>) -> TimeDelta {
    let closed = machine
        .activities()
        .iter()
        .filter_map(|a| a.duration())
        .fold(TimeDelta::zero(), |acc, d| acc + d);
    let open = machine
        .status_at(now)
        .and_then(|s| s.current_activity)
        .map_or(TimeDelta::zero(), |a| a.elapsed(now));
    closed + open
}

// =============================================================================
// Scenarios
// =============================================================================

/// A tutorial on a video platform is relevant to a matching goal.
#[tokio::test]
async fn test_tutorial_on_video_platform_is_relevant() {
    let (mut machine, _, _rx) = create_machine();
    machine.start_session_at(GOAL, DESCRIPTION, at(0));
    machine.process_observation_at(obs("ResNet Tutorial - YouTube"), at(0)).await;

    let activity = machine.status_at(at(1)).unwrap().current_activity.unwrap();
    assert_eq!(activity.domain, "youtube.com");
    assert!(activity.relevance_score > 0.7);
    assert!(matches!(
        activity.classification,
        Classification::Direct | Classification::Peripheral
    ));
    assert!(activity.tags.contains(&"youtube.com".to_string()));
}

/// Repeated observations open one activity; its duration appears only when
/// something different is observed.
#[tokio::test]
async fn test_identical_observations_open_one_activity() {
    let (mut machine, _, _rx) = create_machine();
    machine.start_session_at(GOAL, DESCRIPTION, at(0));

    assert!(machine.process_observation_at(obs("Slack | general"), at(0)).await);
    assert!(!machine.process_observation_at(obs("Slack | general"), at(2)).await);
    assert!(machine.activities().is_empty());
    let open = machine.status_at(at(3)).unwrap().current_activity.unwrap();
    assert!(open.duration().is_none());

    assert!(machine.process_observation_at(obs("ResNet Tutorial - YouTube"), at(4)).await);
    assert_eq!(machine.activities().len(), 1);
    assert_eq!(machine.activities()[0].duration(), Some(TimeDelta::seconds(4)));
}

/// The streak alert fires when, and only when, the window qualifies.
#[tokio::test]
async fn test_distraction_streak_fires_once() {
    let (mut machine, _, mut rx) = create_machine();
    machine.start_session_at(GOAL, DESCRIPTION, at(0));

    let titles = [
        "ResNet Tutorial - YouTube",
        "Home | facebook.com",
        "CNN Lecture - YouTube",
        "Reels | instagram.com",
        "ResNet Tutorial - YouTube",
        "For You | tiktok.com",
        "CNN Lecture - YouTube",
        "ResNet Tutorial - YouTube",
    ];

    let mut fired_at = Vec::new();
    for (i, title) in titles.iter().enumerate() {
        machine.process_observation_at(obs(title), at(i as i64 * 10)).await;
        let streaks = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, EngineEvent::Alert(Alert::DistractionStreak { .. })))
            .count();
        if streaks > 0 {
            fired_at.push((i, streaks));
        }
    }

    assert_eq!(fired_at, vec![(6, 1)]);
}

/// Drift needs a full window of low relevance.
#[tokio::test]
async fn test_drift_alert_after_low_relevance_run() {
    let (mut machine, _, mut rx) = create_machine();
    machine.start_session_at(GOAL, DESCRIPTION, at(0));

    for i in 0..8 {
        let title = format!("Post {i} | reddit.com");
        machine.process_observation_at(obs(&title), at(i * 10)).await;
    }

    let drifts: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            EngineEvent::Alert(alert @ Alert::Drift { .. }) => Some(alert),
            _ => None,
        })
        .collect();
    assert_eq!(drifts.len(), 1);
    match &drifts[0] {
        Alert::Drift { goal, .. } => assert_eq!(goal, GOAL),
        other => panic!("unexpected alert {other:?}"),
    }
}

/// Ending twice persists once; the second end has nothing to do.
#[tokio::test]
async fn test_double_end_is_a_no_op() {
    let (mut machine, sink, _rx) = create_machine();
    machine.start_session_at(GOAL, DESCRIPTION, at(0));
    machine.process_observation_at(obs("ResNet Tutorial - YouTube"), at(0)).await;

    let summary = machine.end_session_at(at(60)).unwrap();
    assert_eq!(summary.duration, TimeDelta::seconds(60));
    assert!(machine.end_session_at(at(70)).is_none());

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].activities.len(), 1);
    assert_eq!(records[0].activities[0].duration_secs, 60.0);
}

#[tokio::test]
async fn test_blank_goal_uses_placeholders() {
    let (mut machine, _, _rx) = create_machine();
    machine.start_session_at("  ", "", at(0));
    let status = machine.status_at(at(0)).unwrap();
    assert_eq!(status.goal, DEFAULT_GOAL);
    assert_eq!(status.description, DEFAULT_DESCRIPTION);
}

// =============================================================================
// Time accounting
// =============================================================================

#[tokio::test]
async fn test_every_moment_is_accounted_for() {
    let (mut machine, sink, _rx) = create_machine();
    machine.start_session_at(GOAL, DESCRIPTION, at(0));

    let polls = [
        (3, "ResNet Tutorial - YouTube"),
        (10, "Home | facebook.com"),
        (10, "Home | facebook.com"),
        (25, "Slack | general"),
        (31, "CNN Lecture - YouTube"),
    ];
    for (secs, title) in polls {
        machine.process_observation_at(obs(title), at(secs)).await;
        for probe in [secs, secs + 1, secs + 5] {
            assert_eq!(accounted_time(&machine, at(probe)), TimeDelta::seconds(probe));
        }
    }

    let stats = machine.stats_at(at(40)).unwrap().stats;
    let closed: TimeDelta = machine
        .activities()
        .iter()
        .filter_map(|a| a.duration())
        .fold(TimeDelta::zero(), |acc, d| acc + d);
    assert_eq!(stats.total(), closed);

    let summary = machine.end_session_at(at(40)).unwrap();
    let record = &sink.records()[0];
    let persisted: f64 = record.activities.iter().map(|a| a.duration_secs).sum();
    assert_eq!(persisted, 40.0);
    assert_eq!(record.total_duration_secs, 40.0);
    assert!((0.0..=10.0).contains(&summary.focus_score));
}

/// A clock stepping backwards never counts the same stretch twice.
#[tokio::test]
async fn test_backward_clock_step_keeps_time_conserved() {
    let (mut machine, sink, _rx) = create_machine();
    machine.start_session_at(GOAL, DESCRIPTION, at(0));

    machine.process_observation_at(obs("ResNet Tutorial - YouTube"), at(0)).await;
    machine.process_observation_at(obs("Slack | general"), at(50)).await;
    machine.process_observation_at(obs("CNN Lecture - YouTube"), at(40)).await;

    let current = machine.status_at(at(60)).unwrap().current_activity.unwrap();
    assert_eq!(current.timestamp, at(50));
    assert_eq!(accounted_time(&machine, at(60)), TimeDelta::seconds(60));

    let summary = machine.end_session_at(at(60)).unwrap();
    let record = &sink.records()[0];
    let persisted: f64 = record.activities.iter().map(|a| a.duration_secs).sum();
    assert_eq!(persisted, 60.0);
    assert_eq!(summary.duration, TimeDelta::seconds(60));
    assert_eq!(record.activities[1].duration_secs, 0.0);
}

/// Ending before the open activity started ends at that activity's start.
#[tokio::test]
async fn test_end_before_open_activity_keeps_time_conserved() {
    let (mut machine, sink, _rx) = create_machine();
    machine.start_session_at(GOAL, DESCRIPTION, at(0));
    machine.process_observation_at(obs("ResNet Tutorial - YouTube"), at(0)).await;
    machine.process_observation_at(obs("Slack | general"), at(30)).await;

    let summary = machine.end_session_at(at(20)).unwrap();
    let record = &sink.records()[0];
    let persisted: f64 = record.activities.iter().map(|a| a.duration_secs).sum();
    assert_eq!(summary.duration, TimeDelta::seconds(30));
    assert_eq!(persisted, record.total_duration_secs);
}

#[tokio::test]
async fn test_focus_score_is_zero_without_relevant_time() {
    let (mut machine, _, _rx) = create_machine();
    machine.start_session_at(GOAL, DESCRIPTION, at(0));
    machine.process_observation_at(obs("Home | facebook.com"), at(0)).await;
    machine.process_observation_at(obs("Reels | instagram.com"), at(30)).await;

    let summary = machine.end_session_at(at(60)).unwrap();
    assert_eq!(summary.focus_score, 0.0);
}

#[tokio::test]
async fn test_switch_counter_resets_on_new_session() {
    let (mut machine, _, _rx) = create_machine();
    machine.start_session_at(GOAL, DESCRIPTION, at(0));
    machine.process_observation_at(obs("ResNet Tutorial - YouTube"), at(0)).await;
    machine.process_observation_at(obs("Home | facebook.com"), at(10)).await;
    assert_eq!(machine.status_at(at(10)).unwrap().context_switches, 1);

    machine.start_session_at("Another goal", "", at(20));
    assert_eq!(machine.status_at(at(20)).unwrap().context_switches, 0);

    // The last observation was forgotten, so the same window opens again.
    assert!(machine.process_observation_at(obs("Home | facebook.com"), at(21)).await);
}

// =============================================================================
// Persistence and replay
// =============================================================================

#[tokio::test]
async fn test_sessions_are_appended_to_jsonl() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sessions.jsonl");

    let mut machine = SessionMachine::new(
        classifier(),
        DomainExtractor::default(),
        Box::new(JsonlSink::new(&path)),
    );

    for round in 0..2 {
        let base = round * 100;
        machine.start_session_at(GOAL, DESCRIPTION, at(base));
        machine.process_observation_at(obs("ResNet Tutorial - YouTube"), at(base)).await;
        machine.end_session_at(at(base + 30));
    }

    let records = JsonlSink::new(&path).read_all().unwrap();
    assert_eq!(records.len(), 2);
    assert_ne!(records[0].id, records[1].id);
    assert_eq!(records[1].activities[0].classification, Classification::Direct);
    assert_eq!(records[1].activities[0].domain, "youtube.com");
}

#[tokio::test]
async fn test_replay_uses_recorded_timestamps() {
    let (mut machine, sink, _rx) = create_machine();
    let lines = [
        r#"{"at": "2024-03-01T10:00:00Z", "title": "ResNet Tutorial - YouTube", "process": "firefox"}"#,
        r#"{"at": "2024-03-01T10:20:00Z"}"#,
        r#"{"at": "2024-03-01T10:30:00Z", "title": "Home | facebook.com", "process": "firefox"}"#,
        r#"{"at": "2024-03-01T10:40:00Z", "title": "Home | facebook.com", "process": "firefox"}"#,
    ];
    let polls: Vec<TimedObservation> = lines.iter().map(|l| serde_json::from_str(l).unwrap()).collect();

    let summary = replay(&mut machine, GOAL, DESCRIPTION, &polls).await.unwrap();
    assert_eq!(summary.duration, TimeDelta::minutes(40));
    assert_eq!(summary.activity_count, 2);
    assert_eq!(summary.context_switches, 1);
    assert!((summary.focus_score - 7.5).abs() < 1e-9);
    assert!(!machine.is_active());
    assert_eq!(sink.records().len(), 1);

    assert!(replay(&mut machine, GOAL, DESCRIPTION, &[]).await.is_none());
}
