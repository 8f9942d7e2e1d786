//! Readiness tracking — follow replacement instances from launch to reachable.
//!
//! After a scale-up the tracker runs three polling phases, each bounded
//! by a [`PollPolicy`]:
//!
//! ```text
//! Discovery   re-list the group until `want` new alive ids appear
//! InService   poll lifecycle until every id reports InService
//! Running     poll instance status until every id is running + reachable
//! ```
//!
//! Every tracked instance moves `Unknown → Launched → InService →
//! RunningAndReachable` and never backwards: once an instance leaves a
//! phase's wait set, later reports for it are ignored. A provider error
//! aborts the phase; running out of budget fails with
//! [`CycleError::Timeout`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use asgcycle_core::*;

/// Per-instance progress, strictly ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Readiness {
    Unknown,
    Launched,
    InService,
    RunningAndReachable,
}

/// Polling phase, for logs and timeout errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessPhase {
    Discovery,
    InService,
    Running,
}

impl ReadinessPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovery => "discovery of new instances",
            Self::InService => "instances to go in service",
            Self::Running => "instances to be running and reachable",
        }
    }
}

impl fmt::Display for ReadinessPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Readiness of the instances launched in one round.
#[derive(Debug, Default)]
pub struct RoundTracking {
    states: BTreeMap<InstanceId, Readiness>,
}

impl RoundTracking {
    /// Move `id` forward to `to`. Returns false if it was already there or beyond.
    pub fn promote(&mut self, id: &str, to: Readiness) -> bool {
        let current = self.states.entry(id.to_string()).or_insert(Readiness::Unknown);
        if *current >= to {
            return false;
        }
        *current = to;
        true
    }

    pub fn state(&self, id: &str) -> Readiness {
        self.states.get(id).copied().unwrap_or(Readiness::Unknown)
    }

    /// Tracked ids that have not reached `target`.
    pub fn pending(&self, target: Readiness) -> BTreeSet<InstanceId> {
        self.states
            .iter()
            .filter(|(_, r)| **r < target)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Every tracked id, ascending.
    pub fn ids(&self) -> Vec<InstanceId> {
        self.states.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Sleep schedule for one phase: `interval` after progress, doubling
/// up to `max_interval` while nothing changes, never past `timeout`.
struct PollClock {
    policy: PollPolicy,
    phase: ReadinessPhase,
    started: Instant,
    next: Duration,
}

impl PollClock {
    fn start(policy: PollPolicy, phase: ReadinessPhase) -> Self {
        Self {
            policy,
            phase,
            started: Instant::now(),
            next: policy.interval,
        }
    }

    async fn pause(&mut self, progressed: bool, pending: &BTreeSet<InstanceId>) -> CycleResult<()> {
        if progressed {
            self.next = self.policy.interval;
        }
        let delay = self.next;
        if !progressed {
            self.next = self.next.saturating_mul(2).min(self.policy.max_interval);
        }

        let waited = self.started.elapsed();
        let remaining = self.policy.timeout.saturating_sub(waited);
        if remaining.is_zero() {
            return Err(CycleError::Timeout {
                phase: self.phase.as_str(),
                waited,
                pending: pending.iter().cloned().collect(),
            });
        }
        debug!(
            phase = %self.phase,
            pending = pending.len(),
            delay_ms = delay.min(remaining).as_millis() as u64,
            "waiting"
        );
        tokio::time::sleep(delay.min(remaining)).await;
        Ok(())
    }
}

/// Drives the discovery, in-service and running phases for one round.
pub struct ReadinessTracker<P> {
    api: Arc<P>,
    policy: PollPolicy,
}

impl<P: FleetApi> ReadinessTracker<P> {
    pub fn new(api: Arc<P>, policy: PollPolicy) -> Self {
        Self { api, policy }
    }

    /// Run all three phases and return the confirmed replacement ids, ascending.
    pub async fn track(
        &self,
        group: &str,
        known: &BTreeSet<InstanceId>,
        want: usize,
    ) -> CycleResult<Vec<InstanceId>> {
        let mut tracking = RoundTracking::default();
        self.discover(group, known, want, &mut tracking).await?;
        self.wait_in_service(&mut tracking).await?;
        self.wait_running(&mut tracking).await?;
        Ok(tracking.ids())
    }

    /// Phase A: find `want` alive instances that are not in `known`.
    ///
    /// Ids are taken in ascending order; surplus ids in the same poll are
    /// left untracked so exactly `want` instances are in flight.
    pub async fn discover(
        &self,
        group: &str,
        known: &BTreeSet<InstanceId>,
        want: usize,
        tracking: &mut RoundTracking,
    ) -> CycleResult<()> {
        let mut clock = PollClock::start(self.policy, ReadinessPhase::Discovery);
        loop {
            let snapshot = self.api.describe_group(group).await?;
            let fresh: BTreeSet<InstanceId> = snapshot
                .instances
                .iter()
                .filter(|m| m.lifecycle_state.is_alive())
                .filter(|m| !known.contains(&m.instance_id))
                .filter(|m| tracking.state(&m.instance_id) == Readiness::Unknown)
                .map(|m| m.instance_id.clone())
                .collect();

            let mut progressed = false;
            for id in fresh.into_iter().take(want - tracking.len()) {
                debug!(%group, instance = %id, "discovered replacement");
                tracking.promote(&id, Readiness::Launched);
                progressed = true;
            }

            if tracking.len() >= want {
                info!(%group, instances = ?tracking.ids(), "replacements launched");
                return Ok(());
            }
            debug!(%group, found = tracking.len(), want, "waiting for launches");
            if let Err(e) = clock.pause(progressed, &BTreeSet::new()).await {
                warn!(
                    %group,
                    found = tracking.len(),
                    want,
                    launched = ?tracking.ids(),
                    "replacements did not all launch"
                );
                return Err(e);
            }
        }
    }

    /// Phase B: wait until every launched instance reports `InService`.
    pub async fn wait_in_service(&self, tracking: &mut RoundTracking) -> CycleResult<()> {
        let mut clock = PollClock::start(self.policy, ReadinessPhase::InService);
        loop {
            let waiting = tracking.pending(Readiness::InService);
            if waiting.is_empty() {
                info!(instances = tracking.len(), "replacements in service");
                return Ok(());
            }

            let ids: Vec<InstanceId> = waiting.iter().cloned().collect();
            let mut progressed = false;
            for member in self.api.describe_lifecycle(&ids).await? {
                if !waiting.contains(&member.instance_id) {
                    continue;
                }
                if member.lifecycle_state == LifecycleState::InService {
                    progressed |= tracking.promote(&member.instance_id, Readiness::InService);
                    debug!(instance = %member.instance_id, "in service");
                } else {
                    debug!(
                        instance = %member.instance_id,
                        state = %member.lifecycle_state,
                        "not in service yet"
                    );
                }
            }

            if tracking.pending(Readiness::InService).is_empty() {
                continue;
            }
            clock
                .pause(progressed, &tracking.pending(Readiness::InService))
                .await?;
        }
    }

    /// Phase C: wait until every in-service instance is running and reachable.
    pub async fn wait_running(&self, tracking: &mut RoundTracking) -> CycleResult<()> {
        let mut clock = PollClock::start(self.policy, ReadinessPhase::Running);
        loop {
            let waiting = tracking.pending(Readiness::RunningAndReachable);
            if waiting.is_empty() {
                info!(instances = tracking.len(), "replacements running and reachable");
                return Ok(());
            }

            let ids: Vec<InstanceId> = waiting.iter().cloned().collect();
            let mut progressed = false;
            for status in self.api.describe_status(&ids).await? {
                if waiting.contains(&status.instance_id) && status.is_ready() {
                    progressed |=
                        tracking.promote(&status.instance_id, Readiness::RunningAndReachable);
                    debug!(instance = %status.instance_id, "running and reachable");
                }
            }

            if tracking.pending(Readiness::RunningAndReachable).is_empty() {
                continue;
            }
            clock
                .pause(progressed, &tracking.pending(Readiness::RunningAndReachable))
                .await?;
        }
    }
}
