//! Group snapshot — one consistent read of a group and its launch configuration.

use std::sync::Arc;

use tracing::debug;

use asgcycle_core::*;

/// A group descriptor together with the launch configuration it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSnapshot {
    pub group: GroupDescriptor,
    pub launch_config: LaunchConfigDescriptor,
}

/// Reads [`GroupSnapshot`]s. No side effects, no retries.
pub struct GroupInspector<P> {
    api: Arc<P>,
}

impl<P: FleetApi> GroupInspector<P> {
    pub fn new(api: Arc<P>) -> Self {
        Self { api }
    }

    /// Look up the group, then the launch configuration it currently uses.
    ///
    /// Fails with [`CycleError::NotFound`] if either is gone.
    pub async fn fetch(&self, group_name: &str) -> CycleResult<GroupSnapshot> {
        let group = self.api.describe_group(group_name).await?;
        let launch_config = self
            .api
            .describe_launch_config(&group.launch_config_name)
            .await?;
        debug!(
            group = %group.name,
            launch_config = %launch_config.name,
            image = %launch_config.image_id,
            desired = group.desired_capacity,
            max = group.max_size,
            members = group.instances.len(),
            "fetched group snapshot"
        );
        Ok(GroupSnapshot {
            group,
            launch_config,
        })
    }
}
