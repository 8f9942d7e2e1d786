//! End-to-end cycling scenarios against a simulated group.
//!
//! Each test builds an `InMemoryFleet`, runs the controller, and checks
//! what the group saw: capacity updates, terminations, and membership.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use asgcycle_core::*;
use asgcycle_rollout::*;

fn fast_poll() -> PollPolicy {
    PollPolicy {
        interval: Duration::from_millis(1),
        max_interval: Duration::from_millis(5),
        timeout: Duration::from_millis(300),
    }
}

fn options(step: &str) -> CycleOptions {
    CycleOptions {
        step: step.parse().unwrap(),
        poll: fast_poll(),
        ..Default::default()
    }
}

/// 10 members: 6 on the stale `lc-v1`, 4 on the current `lc-v2`.
fn mixed_fleet() -> Arc<InMemoryFleet> {
    Arc::new(
        InMemoryFleet::new("web", "lc-v2")
            .with_members("lc-v1", 6)
            .with_members("lc-v2", 4),
    )
}

fn assert_one_for_one(summary: &RoundSummary) {
    let retired: BTreeSet<_> = summary.retired.iter().collect();
    let replacements: BTreeSet<_> = summary.replacements.iter().collect();
    assert_eq!(retired.len(), replacements.len());
    assert!(retired.is_disjoint(&replacements));
}

#[tokio::test]
async fn one_round_replaces_half_of_stale() {
    let fleet = mixed_fleet();
    let stale = fleet.members_on("lc-v1");
    let mut controller = CycleController::new(fleet.clone(), "web", options("50%"));

    let summary = match controller.run_round().await.unwrap() {
        RoundOutcome::Cycled(summary) => summary,
        other => panic!("expected a cycled round, got {other:?}"),
    };

    assert_eq!(summary.eligible, 6);
    assert_eq!(summary.step_size, 3);
    assert_eq!(summary.retired, stale[..3].to_vec());
    assert_eq!(summary.replacements.len(), 3);
    assert_one_for_one(&summary);

    assert_eq!(controller.replaced().len(), 3);
    // Desired went 10 → 13 (max lifted with it) and back down by three terminations.
    assert_eq!(fleet.capacity_updates(), vec![(13, 13)]);
    assert_eq!(fleet.desired_capacity(), 10);
    assert_eq!(fleet.max_size(), 13);
}

#[tokio::test]
async fn full_run_converges() {
    let fleet = mixed_fleet();
    let mut controller = CycleController::new(fleet.clone(), "web", options("50%"));

    let report = controller.run().await.unwrap();

    let steps: Vec<usize> = report.rounds.iter().map(|r| r.step_size).collect();
    assert_eq!(steps, vec![3, 2, 1]);
    for round in &report.rounds {
        assert_one_for_one(round);
    }
    assert!(report.is_clean());
    assert_eq!(report.replaced().len(), 6);
    assert_eq!(report.launch_config.as_deref(), Some("lc-v2"));

    assert!(fleet.members_on("lc-v1").is_empty());
    assert_eq!(fleet.members_on("lc-v2").len(), 10);
    assert_eq!(fleet.desired_capacity(), 10);
    assert_eq!(controller.phase(), CyclePhase::Done);
}

#[tokio::test]
async fn max_size_kept_when_headroom_exists() {
    let fleet = Arc::new(
        InMemoryFleet::new("web", "lc-v2")
            .with_members("lc-v1", 2)
            .with_max_size(8),
    );
    let mut controller = CycleController::new(fleet.clone(), "web", options("2"));

    controller.run().await.unwrap();
    assert_eq!(fleet.capacity_updates(), vec![(4, 8)]);
    assert_eq!(fleet.max_size(), 8);
}

#[tokio::test]
async fn absolute_step_larger_than_eligible_is_clamped() {
    let fleet = mixed_fleet();
    let mut controller = CycleController::new(fleet.clone(), "web", options("20"));

    let report = controller.run().await.unwrap();
    assert_eq!(report.rounds.len(), 1);
    assert_eq!(report.rounds[0].step_size, 6);
    assert_eq!(fleet.capacity_updates(), vec![(16, 16)]);
}

#[tokio::test]
async fn force_replaces_current_instances_once() {
    let fleet = Arc::new(InMemoryFleet::new("web", "lc-v2").with_members("lc-v2", 4));
    let original = fleet.members_on("lc-v2");
    let mut controller = CycleController::new(
        fleet.clone(),
        "web",
        CycleOptions {
            force: true,
            ..options("2")
        },
    );

    let report = controller.run().await.unwrap();

    assert_eq!(report.rounds.len(), 2);
    assert_eq!(report.retired(), original);
    let replaced: BTreeSet<_> = report.replaced().into_iter().collect();
    assert_eq!(&replaced, controller.replaced());
    assert!(original.iter().all(|id| !replaced.contains(id)));
    assert_eq!(fleet.desired_capacity(), 4);
}

#[tokio::test]
async fn drift_between_rounds_aborts_without_rollback() {
    let fleet = mixed_fleet();
    let mut controller = CycleController::new(fleet.clone(), "web", options("50%"));

    assert!(matches!(
        controller.run_round().await.unwrap(),
        RoundOutcome::Cycled(_)
    ));
    fleet.switch_launch_config("lc-v3");

    let err = controller.run_round().await.unwrap_err();
    match err {
        CycleError::Drift { expected, actual } => {
            assert_eq!(expected, "lc-v2");
            assert_eq!(actual, "lc-v3");
        }
        other => panic!("expected drift, got {other:?}"),
    }

    // No scale-up in round two; round one's work stands.
    assert_eq!(fleet.capacity_updates().len(), 1);
    assert_eq!(fleet.terminated().len(), 3);
    assert_eq!(controller.replaced().len(), 3);
}

#[tokio::test]
async fn dry_run_with_nothing_eligible_touches_nothing() {
    let fleet = Arc::new(InMemoryFleet::new("web", "lc-v2").with_members("lc-v2", 3));
    let mut controller = CycleController::new(
        fleet.clone(),
        "web",
        CycleOptions {
            dry_run: true,
            ..options("1")
        },
    );

    let report = controller.run().await.unwrap();
    assert!(report.dry_run);
    assert!(report.eligible.is_empty());
    assert!(report.rounds.is_empty());
    assert_eq!(fleet.mutation_count(), 0);
}

#[tokio::test]
async fn dry_run_reports_full_eligible_set() {
    let fleet = mixed_fleet();
    let stale = fleet.members_on("lc-v1");
    let mut controller = CycleController::new(
        fleet.clone(),
        "web",
        CycleOptions {
            dry_run: true,
            ..options("1")
        },
    );

    let report = controller.run().await.unwrap();
    assert_eq!(report.eligible, stale);
    assert_eq!(fleet.mutation_count(), 0);
}

#[tokio::test]
async fn nothing_eligible_is_done() {
    let fleet = Arc::new(InMemoryFleet::new("web", "lc-v2").with_members("lc-v2", 3));
    let mut controller = CycleController::new(fleet.clone(), "web", options("50%"));

    let report = controller.run().await.unwrap();
    assert!(report.rounds.is_empty());
    assert!(report.is_clean());
    assert_eq!(fleet.mutation_count(), 0);
}

#[tokio::test]
async fn rejected_scale_up_is_fatal() {
    let fleet = mixed_fleet();
    fleet.reject_capacity_updates();
    let mut controller = CycleController::new(fleet.clone(), "web", options("1"));

    let err = controller.run().await.unwrap_err();
    assert!(matches!(err, CycleError::Scale { .. }));
    assert!(fleet.terminated().is_empty());
}

#[tokio::test]
async fn retire_failure_is_recorded_and_not_retried() {
    let fleet = Arc::new(InMemoryFleet::new("web", "lc-v2").with_members("lc-v1", 2));
    let stale = fleet.members_on("lc-v1");
    fleet.fail_termination_of(&stale[0]);
    let mut controller = CycleController::new(fleet.clone(), "web", options("1"));

    let report = controller.run().await.unwrap();

    assert!(!report.is_clean());
    let failures = report.retire_failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].instance_id, stale[0]);
    assert_eq!(report.rounds.len(), 2);
    assert_eq!(fleet.terminated(), vec![stale[1].clone()]);
}

#[tokio::test]
async fn stuck_replacement_times_out() {
    let fleet = mixed_fleet();
    fleet.hold_launches();
    let mut controller = CycleController::new(fleet.clone(), "web", options("1"));

    let err = controller.run().await.unwrap_err();
    assert!(matches!(err, CycleError::Timeout { .. }));
    // Scaled up, nothing retired.
    assert_eq!(fleet.capacity_updates().len(), 1);
    assert!(fleet.terminated().is_empty());
    assert_eq!(controller.phase(), CyclePhase::WaitingInService);
}

#[tokio::test]
async fn missing_group_is_not_found() {
    let fleet = mixed_fleet();
    let mut controller = CycleController::new(fleet.clone(), "api", options("1"));

    let err = controller.run().await.unwrap_err();
    assert!(matches!(err, CycleError::NotFound(_)));
    assert_eq!(fleet.mutation_count(), 0);
}
