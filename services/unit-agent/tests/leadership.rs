//! Integration tests for the leadership tracker.
//!
//! These run on a paused clock, so lease expiry and renewal are exact.

mod common;

use std::sync::Arc;
use std::time::Duration;

use fleet_unit_agent::remote::{LeadershipManager, Op, RemoteError};
use fleet_unit_agent::{Tracker, WorkerError};
use tokio::time::Instant;

const DURATION: Duration = Duration::from_secs(30);

/// Ask the tracker until it answers `true`.
async fn wait_for_leadership(tracker: &Tracker) {
    while !tracker.claim_leader().await.wait().await {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_claim_leader() {
    let (model, service, unit) = common::mysql_model();
    let tracker = Tracker::new(unit.clone(), Arc::new(model.clone()), DURATION);

    assert!(tracker.claim_leader().await.wait().await);
    assert!(tracker.claim_leader().await.wait().await);
    assert_eq!(model.leader(&service), Some(unit));
    // Both tickets were answered from the existing claim.
    assert_eq!(model.claim_count(), 1);

    tracker.kill();
    tracker.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_renews_after_duration() {
    let (model, _, unit) = common::mysql_model();
    let tracker = Tracker::new(unit, Arc::new(model.clone()), DURATION);
    assert!(tracker.claim_leader().await.wait().await);
    assert_eq!(model.claim_count(), 1);

    tokio::time::advance(DURATION + Duration::from_secs(1)).await;
    assert!(tracker.claim_leader().await.wait().await);
    assert_eq!(model.claim_count(), 2);

    tokio::time::advance(DURATION).await;
    assert!(tracker.claim_leader().await.wait().await);
    assert_eq!(model.claim_count(), 3);

    tracker.kill();
}

#[tokio::test(start_paused = true)]
async fn test_lease_never_lapses_while_leader() {
    let (model, service, unit0) = common::mysql_model();
    let unit1 = model.add_unit(&service).unwrap();
    let tracker = Tracker::new(unit0.clone(), Arc::new(model.clone()), DURATION);
    assert!(tracker.claim_leader().await.wait().await);

    // Every few seconds for several lease windows, nobody else can claim.
    for _ in 0..60 {
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(model.leader(&service), Some(unit0.clone()));
        assert_eq!(
            model
                .claim_leadership(&service, &unit1, Duration::from_secs(1))
                .await,
            Err(RemoteError::ClaimDenied)
        );
    }
    tracker.kill();
}

#[tokio::test(start_paused = true)]
async fn test_minion_claims_on_release() {
    let (model, service, unit0) = common::mysql_model();
    let unit1 = model.add_unit(&service).unwrap();

    let leader = Tracker::new(unit0, Arc::new(model.clone()), DURATION);
    assert!(leader.claim_leader().await.wait().await);

    let minion = Tracker::new(unit1.clone(), Arc::new(model.clone()), DURATION);
    assert!(!minion.claim_leader().await.wait().await);
    assert!(!minion.claim_leader().await.wait().await);

    leader.kill();
    leader.wait().await.unwrap();

    let released_at = Instant::now();
    model.release_leadership(&service);
    wait_for_leadership(&minion).await;
    assert!(released_at.elapsed() < DURATION);
    assert_eq!(model.leader(&service), Some(unit1));

    minion.kill();
    minion.wait().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_minion_claims_on_expiry() {
    let (model, service, unit0) = common::mysql_model();
    let unit1 = model.add_unit(&service).unwrap();

    let started = Instant::now();
    model
        .claim_leadership(&service, &unit0, DURATION * 2)
        .await
        .unwrap();

    let minion = Tracker::new(unit1.clone(), Arc::new(model.clone()), DURATION);
    assert!(!minion.claim_leader().await.wait().await);

    wait_for_leadership(&minion).await;
    assert!(started.elapsed() >= DURATION * 2);
    assert_eq!(model.leader(&service), Some(unit1));
    minion.kill();
}

#[tokio::test(start_paused = true)]
async fn test_release_waiter_stops_with_tracker() {
    let (model, service, unit0) = common::mysql_model();
    let unit1 = model.add_unit(&service).unwrap();
    model
        .claim_leadership(&service, &unit0, DURATION * 2)
        .await
        .unwrap();

    let minion = Tracker::new(unit1, Arc::new(model.clone()), DURATION);
    assert!(!minion.claim_leader().await.wait().await);
    minion.kill();
    minion.wait().await.unwrap();

    let claims = model.claim_count();
    model.release_leadership(&service);
    tokio::time::sleep(DURATION * 4).await;
    assert_eq!(model.claim_count(), claims);
}

#[tokio::test(start_paused = true)]
async fn test_killed_tracker_answers_false() {
    let (model, _, unit) = common::mysql_model();
    let tracker = Tracker::new(unit, Arc::new(model), DURATION);
    assert!(tracker.claim_leader().await.wait().await);

    tracker.kill();
    tracker.wait().await.unwrap();
    assert!(!tracker.claim_leader().await.wait().await);
}

#[tokio::test(start_paused = true)]
async fn test_claim_error_is_fatal() {
    let (model, _, unit) = common::mysql_model();
    let tracker = Tracker::new(unit, Arc::new(model.clone()), DURATION);
    assert!(tracker.claim_leader().await.wait().await);

    model.fail(
        Op::ClaimLeadership,
        RemoteError::Failed("lease store unavailable".to_string()),
    );
    tokio::time::advance(DURATION).await;

    let err = tracker.wait().await.unwrap_err();
    assert!(matches!(
        err,
        WorkerError::Remote {
            source: RemoteError::Failed(_),
            ..
        }
    ));
    assert!(!tracker.claim_leader().await.wait().await);
}

#[tokio::test(start_paused = true)]
async fn test_accessors() {
    let (model, service, unit) = common::mysql_model();
    let tracker = Tracker::new(unit, Arc::new(model), DURATION);
    assert_eq!(tracker.service_name(), &service);
    assert_eq!(tracker.claim_duration(), DURATION);
    tracker.kill();
}
