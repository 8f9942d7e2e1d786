//! Cycle controller — drives the replacement rounds.
//!
//! Each round re-reads the group, picks the stale instances, scales up by
//! one batch, waits for the replacements to be ready, and retires the
//! batch. Rounds repeat until nothing is eligible. The launch
//! configuration seen in the first round is pinned; if a later round
//! sees a different one the run aborts with [`CycleError::Drift`].

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use asgcycle_core::*;

use crate::capacity::{CapacityController, RetireFailure};
use crate::eligibility::eligible_instances;
use crate::readiness::{ReadinessTracker, RoundTracking};
use crate::sizer::{CycleStepPlan, StepSpec};
use crate::snapshot::GroupInspector;

/// Ids launched as replacements during this run.
pub type ReplacedSet = BTreeSet<InstanceId>;

/// Where the controller is within a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Inspecting,
    Sizing,
    ScalingUp,
    Discovering,
    WaitingInService,
    WaitingRunning,
    Retiring,
    Done,
}

/// What the operator asked for.
#[derive(Debug, Clone, Default)]
pub struct CycleOptions {
    pub step: StepSpec,
    /// Replace instances even if they already use the current launch configuration.
    pub force: bool,
    /// Report the eligible set and stop before any mutation.
    pub dry_run: bool,
    pub poll: PollPolicy,
}

/// Result of a single round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Nothing left to replace.
    Done,
    /// Dry run: the instances a real run would replace.
    DryRun(Vec<InstanceId>),
    /// One batch was replaced.
    Cycled(RoundSummary),
}

/// What one round did.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RoundSummary {
    pub round: u32,
    pub eligible: usize,
    pub step_size: usize,
    /// New instances confirmed running and reachable.
    pub replacements: Vec<InstanceId>,
    /// Old instances terminated.
    pub retired: Vec<InstanceId>,
    pub retire_failures: Vec<RetireFailure>,
}

/// Summary of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct CycleReport {
    pub group: String,
    pub launch_config: Option<String>,
    pub dry_run: bool,
    /// Dry run only: every instance a real run would replace.
    pub eligible: Vec<InstanceId>,
    pub rounds: Vec<RoundSummary>,
}

impl CycleReport {
    pub fn replaced(&self) -> Vec<InstanceId> {
        self.rounds
            .iter()
            .flat_map(|r| r.replacements.iter().cloned())
            .collect()
    }

    pub fn retired(&self) -> Vec<InstanceId> {
        self.rounds
            .iter()
            .flat_map(|r| r.retired.iter().cloned())
            .collect()
    }

    pub fn retire_failures(&self) -> Vec<RetireFailure> {
        self.rounds
            .iter()
            .flat_map(|r| r.retire_failures.iter().cloned())
            .collect()
    }

    /// Every requested termination succeeded.
    pub fn is_clean(&self) -> bool {
        self.rounds.iter().all(|r| r.retire_failures.is_empty())
    }
}

/// Replaces a group's stale instances batch by batch.
pub struct CycleController<P> {
    group: String,
    options: CycleOptions,
    inspector: GroupInspector<P>,
    capacity: CapacityController<P>,
    readiness: ReadinessTracker<P>,
    phase: CyclePhase,
    /// Launch configuration name pinned by the first round.
    launch_config: Option<String>,
    replaced: ReplacedSet,
    /// Old instances whose termination failed; never selected again.
    retire_failed: BTreeSet<InstanceId>,
    rounds: u32,
}

impl<P: FleetApi> CycleController<P> {
    pub fn new(api: Arc<P>, group: &str, options: CycleOptions) -> Self {
        Self {
            group: group.to_string(),
            inspector: GroupInspector::new(api.clone()),
            capacity: CapacityController::new(api.clone()),
            readiness: ReadinessTracker::new(api, options.poll),
            options,
            phase: CyclePhase::Inspecting,
            launch_config: None,
            replaced: ReplacedSet::new(),
            retire_failed: BTreeSet::new(),
            rounds: 0,
        }
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn replaced(&self) -> &ReplacedSet {
        &self.replaced
    }

    /// Run rounds until nothing is eligible, or once for a dry run.
    ///
    /// Fatal errors return immediately; work already done stays done.
    pub async fn run(&mut self) -> CycleResult<CycleReport> {
        let mut report = CycleReport {
            group: self.group.clone(),
            dry_run: self.options.dry_run,
            ..Default::default()
        };

        loop {
            match self.run_round().await? {
                RoundOutcome::Done => break,
                RoundOutcome::DryRun(eligible) => {
                    report.eligible = eligible;
                    break;
                }
                RoundOutcome::Cycled(summary) => report.rounds.push(summary),
            }
        }

        report.launch_config = self.launch_config.clone();
        info!(
            group = %self.group,
            rounds = report.rounds.len(),
            replaced = self.replaced.len(),
            "cycle finished"
        );
        Ok(report)
    }

    /// Run one round: inspect, size, scale up, wait, retire.
    pub async fn run_round(&mut self) -> CycleResult<RoundOutcome> {
        self.transition(CyclePhase::Inspecting);
        let snapshot = self.inspector.fetch(&self.group).await?;
        let current = snapshot.launch_config.name.clone();
        match &self.launch_config {
            Some(expected) if *expected != current => {
                warn!(
                    group = %self.group,
                    %expected,
                    actual = %current,
                    "launch configuration changed mid-run, aborting"
                );
                return Err(CycleError::Drift {
                    expected: expected.clone(),
                    actual: current,
                });
            }
            Some(_) => {}
            None => self.launch_config = Some(current.clone()),
        }

        let exclude: BTreeSet<InstanceId> =
            self.replaced.union(&self.retire_failed).cloned().collect();
        let eligible = eligible_instances(
            &snapshot.group.instances,
            &current,
            self.options.force,
            &exclude,
        );

        if self.options.dry_run {
            info!(group = %self.group, eligible = eligible.len(), "dry run, not cycling");
            self.transition(CyclePhase::Done);
            return Ok(RoundOutcome::DryRun(eligible));
        }

        self.transition(CyclePhase::Sizing);
        let Some(plan) = CycleStepPlan::new(&self.options.step, &eligible) else {
            info!(group = %self.group, "no eligible instances left");
            self.transition(CyclePhase::Done);
            return Ok(RoundOutcome::Done);
        };

        self.rounds += 1;
        info!(
            group = %self.group,
            round = self.rounds,
            eligible = eligible.len(),
            step = plan.step_size,
            "starting round"
        );

        self.transition(CyclePhase::ScalingUp);
        self.capacity
            .scale_up(
                &self.group,
                plan.step_size as u32,
                snapshot.group.desired_capacity,
                snapshot.group.max_size,
            )
            .await?;

        self.transition(CyclePhase::Discovering);
        let known: BTreeSet<InstanceId> = snapshot.group.instance_ids().map(str::to_string).collect();
        let mut tracking = RoundTracking::default();
        self.readiness
            .discover(&self.group, &known, plan.step_size, &mut tracking)
            .await?;
        self.transition(CyclePhase::WaitingInService);
        self.readiness.wait_in_service(&mut tracking).await?;
        self.transition(CyclePhase::WaitingRunning);
        self.readiness.wait_running(&mut tracking).await?;
        let replacements = tracking.ids();

        self.transition(CyclePhase::Retiring);
        let retired = self.capacity.retire_all(&plan.old_instance_ids).await;

        self.replaced.extend(replacements.iter().cloned());
        self.retire_failed
            .extend(retired.failures.iter().map(|f| f.instance_id.clone()));
        self.transition(CyclePhase::Inspecting);

        Ok(RoundOutcome::Cycled(RoundSummary {
            round: self.rounds,
            eligible: eligible.len(),
            step_size: plan.step_size,
            replacements,
            retired: retired.retired,
            retire_failures: retired.failures,
        }))
    }

    fn transition(&mut self, to: CyclePhase) {
        if self.phase != to {
            debug!(group = %self.group, from = ?self.phase, to = ?to, "phase");
            self.phase = to;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(round: u32, replacements: &[&str], retired: &[&str], failed: &[&str]) -> RoundSummary {
        let ids = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        RoundSummary {
            round,
            eligible: 4,
            step_size: replacements.len(),
            replacements: ids(replacements),
            retired: ids(retired),
            retire_failures: failed
                .iter()
                .map(|id| RetireFailure {
                    instance_id: id.to_string(),
                    reason: "boom".to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn report_flattens_rounds() {
        let report = CycleReport {
            group: "web".to_string(),
            rounds: vec![
                summary(1, &["i-n1", "i-n2"], &["i-o1", "i-o2"], &[]),
                summary(2, &["i-n3"], &[], &["i-o3"]),
            ],
            ..Default::default()
        };
        assert_eq!(report.replaced(), vec!["i-n1", "i-n2", "i-n3"]);
        assert_eq!(report.retired(), vec!["i-o1", "i-o2"]);
        assert_eq!(report.retire_failures().len(), 1);
        assert!(!report.is_clean());
    }

    #[test]
    fn empty_report_is_clean() {
        assert!(CycleReport::default().is_clean());
    }

    #[test]
    fn report_serializes() {
        let report = CycleReport {
            group: "web".to_string(),
            launch_config: Some("lc-v2".to_string()),
            rounds: vec![summary(1, &["i-n1"], &["i-o1"], &[])],
            ..Default::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["group"], "web");
        assert_eq!(json["rounds"][0]["retired"][0], "i-o1");
    }

    #[tokio::test]
    async fn starts_inspecting_and_ends_done() {
        let fleet = Arc::new(InMemoryFleet::new("web", "lc-v2").with_members("lc-v2", 2));
        let mut controller = CycleController::new(fleet, "web", CycleOptions::default());
        assert_eq!(controller.phase(), CyclePhase::Inspecting);

        let outcome = controller.run_round().await.unwrap();
        assert_eq!(outcome, RoundOutcome::Done);
        assert_eq!(controller.phase(), CyclePhase::Done);
    }
}
