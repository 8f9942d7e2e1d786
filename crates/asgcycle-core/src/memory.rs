//! In-memory simulated autoscaling group.
//!
//! `InMemoryFleet` behaves like a small provider: raising desired capacity
//! launches instances on the group's current launch configuration, and
//! each observation (describe call) moves launching instances one tick
//! closer to in-service and then running-and-reachable. Terminated
//! instances linger as `Terminating` for one observation and then vanish.
//!
//! It backs the CLI's `--simulate` mode and the cycler's tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::FleetApi;
use crate::types::*;

/// A simulated group behind the [`FleetApi`] trait.
pub struct InMemoryFleet {
    inner: Mutex<FleetState>,
}

struct FleetState {
    name: String,
    desired: u32,
    max_size: u32,
    launch_config_name: String,
    launch_configs: HashMap<String, LaunchConfigDescriptor>,
    instances: BTreeMap<InstanceId, SimInstance>,
    next_id: u64,
    /// Observations a new instance needs before reporting in-service.
    settle_ticks: u32,
    /// Further observations an in-service instance needs to pass reachability.
    reachability_ticks: u32,
    hold_launches: bool,
    hold_reachability: bool,
    reject_capacity: bool,
    fail_terminate: HashSet<InstanceId>,
    capacity_updates: Vec<(u32, u32)>,
    terminated: Vec<InstanceId>,
    status_polls: usize,
}

struct SimInstance {
    lifecycle: LifecycleState,
    launch_config: Option<String>,
    ticks: u32,
}

impl InMemoryFleet {
    /// An empty group named `name` launching from `launch_config`.
    pub fn new(name: &str, launch_config: &str) -> Self {
        let mut launch_configs = HashMap::new();
        launch_configs.insert(launch_config.to_string(), descriptor(launch_config));
        Self {
            inner: Mutex::new(FleetState {
                name: name.to_string(),
                desired: 0,
                max_size: 0,
                launch_config_name: launch_config.to_string(),
                launch_configs,
                instances: BTreeMap::new(),
                next_id: 1,
                settle_ticks: 1,
                reachability_ticks: 1,
                hold_launches: false,
                hold_reachability: false,
                reject_capacity: false,
                fail_terminate: HashSet::new(),
                capacity_updates: Vec::new(),
                terminated: Vec::new(),
                status_polls: 0,
            }),
        }
    }

    /// Add `count` in-service members launched from `launch_config`.
    ///
    /// Desired capacity and max size grow with them.
    pub fn with_members(self, launch_config: &str, count: u32) -> Self {
        {
            let mut state = self.lock();
            state
                .launch_configs
                .entry(launch_config.to_string())
                .or_insert_with(|| descriptor(launch_config));
            for _ in 0..count {
                let id = state.allocate_id();
                state.instances.insert(
                    id,
                    SimInstance {
                        lifecycle: LifecycleState::InService,
                        launch_config: Some(launch_config.to_string()),
                        ticks: u32::MAX,
                    },
                );
            }
            state.desired += count;
            state.max_size = state.max_size.max(state.desired);
        }
        self
    }

    /// Override the group's max size.
    pub fn with_max_size(self, max_size: u32) -> Self {
        self.lock().max_size = max_size;
        self
    }

    /// Number of observations a launched instance needs to go in service.
    pub fn with_settle_ticks(self, ticks: u32) -> Self {
        self.lock().settle_ticks = ticks;
        self
    }

    /// Number of observations after going in service before reachability passes.
    pub fn with_reachability_ticks(self, ticks: u32) -> Self {
        self.lock().reachability_ticks = ticks;
        self
    }

    /// Point the group at a different launch configuration.
    pub fn switch_launch_config(&self, launch_config: &str) {
        let mut state = self.lock();
        state
            .launch_configs
            .entry(launch_config.to_string())
            .or_insert_with(|| descriptor(launch_config));
        state.launch_config_name = launch_config.to_string();
    }

    /// Forget a launch configuration, as if it had been deleted.
    pub fn delete_launch_config(&self, launch_config: &str) {
        self.lock().launch_configs.remove(launch_config);
    }

    /// Newly launched instances stay `Pending` forever.
    pub fn hold_launches(&self) {
        self.lock().hold_launches = true;
    }

    /// Instances go in service but never pass reachability checks.
    pub fn hold_reachability(&self) {
        self.lock().hold_reachability = true;
    }

    /// Reject every subsequent capacity update.
    pub fn reject_capacity_updates(&self) {
        self.lock().reject_capacity = true;
    }

    /// Fail termination requests for `id`.
    pub fn fail_termination_of(&self, id: &str) {
        self.lock().fail_terminate.insert(id.to_string());
    }

    pub fn desired_capacity(&self) -> u32 {
        self.lock().desired
    }

    pub fn max_size(&self) -> u32 {
        self.lock().max_size
    }

    /// Every accepted `(desired, max)` update, in order.
    pub fn capacity_updates(&self) -> Vec<(u32, u32)> {
        self.lock().capacity_updates.clone()
    }

    /// Every successfully terminated instance, in order.
    pub fn terminated(&self) -> Vec<InstanceId> {
        self.lock().terminated.clone()
    }

    /// Number of instance status calls served.
    pub fn status_polls(&self) -> usize {
        self.lock().status_polls
    }

    /// Total number of mutating calls that reached the group.
    pub fn mutation_count(&self) -> usize {
        let state = self.lock();
        state.capacity_updates.len() + state.terminated.len()
    }

    /// Ids of alive members launched from `launch_config`.
    pub fn members_on(&self, launch_config: &str) -> Vec<InstanceId> {
        self.lock()
            .instances
            .iter()
            .filter(|(_, i)| {
                i.lifecycle.is_alive() && i.launch_config.as_deref() == Some(launch_config)
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, FleetState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl FleetState {
    fn allocate_id(&mut self) -> InstanceId {
        let id = format!("i-{:012x}", self.next_id);
        self.next_id += 1;
        id
    }

    /// One observation: drop finished terminations, launch up to desired
    /// capacity, and age launching instances.
    fn tick(&mut self) {
        self.instances
            .retain(|_, i| i.lifecycle != LifecycleState::Terminating);

        let alive = self.instances.values().filter(|i| i.lifecycle.is_alive()).count() as u32;
        for _ in alive..self.desired {
            let id = self.allocate_id();
            debug!(group = %self.name, instance = %id, "simulated launch");
            self.instances.insert(
                id,
                SimInstance {
                    lifecycle: LifecycleState::Pending,
                    launch_config: Some(self.launch_config_name.clone()),
                    ticks: 0,
                },
            );
        }

        if self.hold_launches {
            return;
        }
        let settle = self.settle_ticks;
        for instance in self.instances.values_mut() {
            if instance.lifecycle == LifecycleState::Pending {
                instance.ticks += 1;
                if instance.ticks >= settle {
                    instance.lifecycle = LifecycleState::InService;
                }
            } else if instance.lifecycle == LifecycleState::InService {
                instance.ticks = instance.ticks.saturating_add(1);
            }
        }
    }

    fn membership(&self, id: &str, instance: &SimInstance) -> InstanceMembership {
        InstanceMembership {
            instance_id: id.to_string(),
            lifecycle_state: instance.lifecycle.clone(),
            launch_config_name: instance.launch_config.clone(),
        }
    }

    fn status(&self, id: &str, instance: &SimInstance) -> InstanceStatus {
        let in_service = instance.lifecycle == LifecycleState::InService;
        let reachable = !self.hold_reachability
            && instance.ticks >= self.settle_ticks.saturating_add(self.reachability_ticks);
        InstanceStatus {
            instance_id: id.to_string(),
            state_name: if in_service || instance.lifecycle == LifecycleState::Terminating {
                "running".to_string()
            } else {
                "pending".to_string()
            },
            reachability_passed: in_service && reachable,
        }
    }
}

impl FleetApi for InMemoryFleet {
    async fn describe_group(&self, name: &str) -> ProviderResult<GroupDescriptor> {
        let mut state = self.lock();
        if state.name != name {
            return Err(ProviderError::NotFound(format!("autoscaling group {name}")));
        }
        state.tick();
        Ok(GroupDescriptor {
            name: state.name.clone(),
            desired_capacity: state.desired,
            max_size: state.max_size,
            launch_config_name: state.launch_config_name.clone(),
            instances: state
                .instances
                .iter()
                .map(|(id, i)| state.membership(id, i))
                .collect(),
        })
    }

    async fn describe_launch_config(&self, name: &str) -> ProviderResult<LaunchConfigDescriptor> {
        self.lock()
            .launch_configs
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("launch configuration {name}")))
    }

    async fn update_capacity(&self, name: &str, desired: u32, max: u32) -> ProviderResult<()> {
        let mut state = self.lock();
        if state.name != name {
            return Err(ProviderError::NotFound(format!("autoscaling group {name}")));
        }
        if state.reject_capacity {
            return Err(ProviderError::Rejected(
                "capacity update rejected by simulated quota".to_string(),
            ));
        }
        if desired > max {
            return Err(ProviderError::Rejected(format!(
                "desired capacity {desired} exceeds max size {max}"
            )));
        }
        state.desired = desired;
        state.max_size = max;
        state.capacity_updates.push((desired, max));
        Ok(())
    }

    async fn describe_lifecycle(&self, ids: &[InstanceId]) -> ProviderResult<Vec<InstanceMembership>> {
        let mut state = self.lock();
        state.tick();
        Ok(ids
            .iter()
            .filter_map(|id| state.instances.get(id).map(|i| state.membership(id, i)))
            .collect())
    }

    async fn describe_status(&self, ids: &[InstanceId]) -> ProviderResult<Vec<InstanceStatus>> {
        let mut state = self.lock();
        state.tick();
        state.status_polls += 1;
        Ok(ids
            .iter()
            .filter_map(|id| state.instances.get(id).map(|i| state.status(id, i)))
            .collect())
    }

    async fn terminate_instance(&self, id: &str) -> ProviderResult<()> {
        let mut state = self.lock();
        if state.fail_terminate.contains(id) {
            return Err(ProviderError::Api(format!("simulated failure terminating {id}")));
        }
        let Some(instance) = state.instances.get_mut(id) else {
            return Err(ProviderError::NotFound(format!("instance {id}")));
        };
        if !instance.lifecycle.is_alive() {
            return Err(ProviderError::Rejected(format!("instance {id} is already leaving")));
        }
        instance.lifecycle = LifecycleState::Terminating;
        state.desired = state.desired.saturating_sub(1);
        state.terminated.push(id.to_string());
        Ok(())
    }
}

fn descriptor(name: &str) -> LaunchConfigDescriptor {
    LaunchConfigDescriptor {
        name: name.to_string(),
        image_id: format!("ami-{name}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fleet() -> InMemoryFleet {
        InMemoryFleet::new("web", "lc-v2")
            .with_members("lc-v1", 2)
            .with_members("lc-v2", 1)
    }

    #[tokio::test]
    async fn describe_reports_seeded_members() {
        let fleet = fleet();
        let group = fleet.describe_group("web").await.unwrap();
        assert_eq!(group.desired_capacity, 3);
        assert_eq!(group.max_size, 3);
        assert_eq!(group.launch_config_name, "lc-v2");
        assert_eq!(group.instances.len(), 3);
        assert_eq!(fleet.members_on("lc-v1").len(), 2);
    }

    #[tokio::test]
    async fn unknown_group_is_not_found() {
        let fleet = fleet();
        let err = fleet.describe_group("api").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }

    #[tokio::test]
    async fn raising_capacity_launches_on_current_config() {
        let fleet = fleet();
        fleet.update_capacity("web", 5, 5).await.unwrap();

        let group = fleet.describe_group("web").await.unwrap();
        assert_eq!(group.instances.len(), 5);
        assert_eq!(fleet.members_on("lc-v2").len(), 3);
    }

    #[tokio::test]
    async fn launched_instance_becomes_ready_over_observations() {
        let fleet = InMemoryFleet::new("web", "lc-v2").with_settle_ticks(2);
        fleet.update_capacity("web", 1, 1).await.unwrap();

        let group = fleet.describe_group("web").await.unwrap();
        let id = group.instances[0].instance_id.clone();
        assert_eq!(group.instances[0].lifecycle_state, LifecycleState::Pending);

        let lifecycle = fleet.describe_lifecycle(&[id.clone()]).await.unwrap();
        assert_eq!(lifecycle[0].lifecycle_state, LifecycleState::InService);

        let status = fleet.describe_status(&[id.clone()]).await.unwrap();
        assert!(status[0].is_ready());
    }

    #[tokio::test]
    async fn reachability_lags_in_service() {
        let fleet = InMemoryFleet::new("web", "lc-v2").with_reachability_ticks(3);
        fleet.update_capacity("web", 1, 1).await.unwrap();

        let group = fleet.describe_group("web").await.unwrap();
        let id = group.instances[0].instance_id.clone();

        let mut polls = Vec::new();
        for _ in 0..4 {
            let status = fleet.describe_status(&[id.clone()]).await.unwrap();
            polls.push((status[0].state_name.clone(), status[0].reachability_passed));
        }
        let running = |reachable| ("running".to_string(), reachable);
        assert_eq!(polls, vec![running(false), running(false), running(true), running(true)]);
        assert_eq!(fleet.status_polls(), 4);
    }

    #[tokio::test]
    async fn held_reachability_never_passes() {
        let fleet = InMemoryFleet::new("web", "lc-v2");
        fleet.hold_reachability();
        fleet.update_capacity("web", 1, 1).await.unwrap();

        let group = fleet.describe_group("web").await.unwrap();
        let id = group.instances[0].instance_id.clone();
        for _ in 0..5 {
            let status = fleet.describe_status(&[id.clone()]).await.unwrap();
            assert_eq!(status[0].state_name, "running");
            assert!(!status[0].is_ready());
        }
    }

    #[tokio::test]
    async fn held_launches_never_go_in_service() {
        let fleet = InMemoryFleet::new("web", "lc-v2");
        fleet.hold_launches();
        fleet.update_capacity("web", 1, 1).await.unwrap();

        let group = fleet.describe_group("web").await.unwrap();
        let id = group.instances[0].instance_id.clone();
        for _ in 0..5 {
            let lifecycle = fleet.describe_lifecycle(&[id.clone()]).await.unwrap();
            assert_eq!(lifecycle[0].lifecycle_state, LifecycleState::Pending);
        }
    }

    #[tokio::test]
    async fn terminate_decrements_desired() {
        let fleet = fleet();
        let victim = fleet.members_on("lc-v1")[0].clone();
        fleet.terminate_instance(&victim).await.unwrap();

        assert_eq!(fleet.desired_capacity(), 2);
        assert_eq!(fleet.terminated(), vec![victim.clone()]);

        let group = fleet.describe_group("web").await.unwrap();
        assert!(group.instance_ids().all(|id| id != victim));
        assert_eq!(group.instances.len(), 2);
    }

    #[tokio::test]
    async fn rejected_capacity_update_leaves_group_alone() {
        let fleet = fleet();
        fleet.reject_capacity_updates();
        let err = fleet.update_capacity("web", 9, 9).await.unwrap_err();
        assert!(matches!(err, ProviderError::Rejected(_)));
        assert_eq!(fleet.desired_capacity(), 3);
        assert_eq!(fleet.mutation_count(), 0);
    }

    #[tokio::test]
    async fn deleted_launch_config_is_not_found() {
        let fleet = fleet();
        fleet.delete_launch_config("lc-v2");
        let err = fleet.describe_launch_config("lc-v2").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }
}
