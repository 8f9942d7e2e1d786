//! The fleet-management capability the cycler is built against.
//!
//! Every component that talks to the provider receives an implementation
//! of [`FleetApi`] at construction; there is no process-global client.

use std::future::Future;

use crate::error::ProviderResult;
use crate::types::*;

/// Autoscaling-group and instance operations used by the cycler.
pub trait FleetApi: Send + Sync {
    /// Describe a group and its current memberships.
    fn describe_group(
        &self,
        name: &str,
    ) -> impl Future<Output = ProviderResult<GroupDescriptor>> + Send;

    /// Describe a launch configuration by name.
    fn describe_launch_config(
        &self,
        name: &str,
    ) -> impl Future<Output = ProviderResult<LaunchConfigDescriptor>> + Send;

    /// Set the group's desired capacity and maximum size.
    fn update_capacity(
        &self,
        name: &str,
        desired: u32,
        max: u32,
    ) -> impl Future<Output = ProviderResult<()>> + Send;

    /// Membership records for the given instances. Unknown ids are omitted.
    fn describe_lifecycle(
        &self,
        ids: &[InstanceId],
    ) -> impl Future<Output = ProviderResult<Vec<InstanceMembership>>> + Send;

    /// Infrastructure status for the given instances. Unknown ids are omitted.
    fn describe_status(
        &self,
        ids: &[InstanceId],
    ) -> impl Future<Output = ProviderResult<Vec<InstanceStatus>>> + Send;

    /// Terminate one instance and decrement its group's desired capacity.
    fn terminate_instance(&self, id: &str) -> impl Future<Output = ProviderResult<()>> + Send;
}
