//! asgcycle-aws — [`FleetApi`] over the AWS Auto Scaling and EC2 APIs.
//!
//! Group, launch configuration, lifecycle and termination calls go to
//! Auto Scaling; running state and reachability come from EC2
//! `DescribeInstanceStatus`.

use aws_config::{BehaviorVersion, Region};
use aws_sdk_autoscaling::error::DisplayErrorContext;
use aws_sdk_ec2::types::{InstanceStatusDetails, StatusName, StatusType};
use tracing::debug;

use asgcycle_core::config::AwsConfig;
use asgcycle_core::*;

/// `DescribeAutoScalingInstances` accepts at most 50 ids per call.
const LIFECYCLE_BATCH: usize = 50;
/// `DescribeInstanceStatus` accepts at most 100 ids per call.
const STATUS_BATCH: usize = 100;

/// AWS-backed provider.
#[derive(Clone)]
pub struct AwsFleet {
    autoscaling: aws_sdk_autoscaling::Client,
    ec2: aws_sdk_ec2::Client,
}

impl AwsFleet {
    /// Load credentials and region from the environment, with `config` overrides.
    pub async fn connect(config: &AwsConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(profile) = &config.profile {
            loader = loader.profile_name(profile);
        }
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let shared = loader.load().await;
        debug!(region = ?shared.region(), "loaded aws config");

        Self {
            autoscaling: aws_sdk_autoscaling::Client::new(&shared),
            ec2: aws_sdk_ec2::Client::new(&shared),
        }
    }
}

fn api_error(op: &str, err: impl std::error::Error) -> ProviderError {
    ProviderError::Api(format!("{op}: {}", DisplayErrorContext(err)))
}

fn to_u32(value: Option<i32>) -> u32 {
    value.unwrap_or(0).max(0) as u32
}

impl FleetApi for AwsFleet {
    async fn describe_group(&self, name: &str) -> ProviderResult<GroupDescriptor> {
        let out = self
            .autoscaling
            .describe_auto_scaling_groups()
            .auto_scaling_group_names(name)
            .send()
            .await
            .map_err(|e| api_error("DescribeAutoScalingGroups", e))?;

        let Some(group) = out.auto_scaling_groups().first() else {
            return Err(ProviderError::NotFound(format!("autoscaling group {name}")));
        };
        let Some(launch_config_name) = group.launch_configuration_name() else {
            return Err(ProviderError::NotFound(format!(
                "launch configuration for group {name} (group uses a launch template)"
            )));
        };

        let instances = group
            .instances()
            .iter()
            .filter_map(|i| {
                Some(InstanceMembership {
                    instance_id: i.instance_id()?.to_string(),
                    lifecycle_state: LifecycleState::from_provider(i.lifecycle_state()?.as_str()),
                    launch_config_name: i.launch_configuration_name().map(str::to_string),
                })
            })
            .collect();

        Ok(GroupDescriptor {
            name: name.to_string(),
            desired_capacity: to_u32(group.desired_capacity()),
            max_size: to_u32(group.max_size()),
            launch_config_name: launch_config_name.to_string(),
            instances,
        })
    }

    async fn describe_launch_config(&self, name: &str) -> ProviderResult<LaunchConfigDescriptor> {
        let out = self
            .autoscaling
            .describe_launch_configurations()
            .launch_configuration_names(name)
            .send()
            .await
            .map_err(|e| api_error("DescribeLaunchConfigurations", e))?;

        let lc = out
            .launch_configurations()
            .first()
            .ok_or_else(|| ProviderError::NotFound(format!("launch configuration {name}")))?;
        Ok(LaunchConfigDescriptor {
            name: lc.launch_configuration_name().unwrap_or(name).to_string(),
            image_id: lc.image_id().unwrap_or_default().to_string(),
        })
    }

    async fn update_capacity(&self, name: &str, desired: u32, max: u32) -> ProviderResult<()> {
        self.autoscaling
            .update_auto_scaling_group()
            .auto_scaling_group_name(name)
            .desired_capacity(desired as i32)
            .max_size(max as i32)
            .send()
            .await
            .map_err(|e| {
                ProviderError::Rejected(format!(
                    "UpdateAutoScalingGroup: {}",
                    DisplayErrorContext(e)
                ))
            })?;
        Ok(())
    }

    async fn describe_lifecycle(&self, ids: &[InstanceId]) -> ProviderResult<Vec<InstanceMembership>> {
        let mut members = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(LIFECYCLE_BATCH) {
            let out = self
                .autoscaling
                .describe_auto_scaling_instances()
                .set_instance_ids(Some(chunk.to_vec()))
                .send()
                .await
                .map_err(|e| api_error("DescribeAutoScalingInstances", e))?;

            members.extend(out.auto_scaling_instances().iter().filter_map(|d| {
                Some(InstanceMembership {
                    instance_id: d.instance_id()?.to_string(),
                    lifecycle_state: LifecycleState::from_provider(d.lifecycle_state()?),
                    launch_config_name: d.launch_configuration_name().map(str::to_string),
                })
            }));
        }
        Ok(members)
    }

    async fn describe_status(&self, ids: &[InstanceId]) -> ProviderResult<Vec<InstanceStatus>> {
        let mut statuses = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(STATUS_BATCH) {
            let out = self
                .ec2
                .describe_instance_status()
                .set_instance_ids(Some(chunk.to_vec()))
                .include_all_instances(true)
                .send()
                .await
                .map_err(|e| api_error("DescribeInstanceStatus", e))?;

            statuses.extend(out.instance_statuses().iter().filter_map(|s| {
                let state_name = s
                    .instance_state()
                    .and_then(|st| st.name())
                    .map(|n| n.as_str().to_string())
                    .unwrap_or_default();
                let details = s.instance_status().map(|st| st.details()).unwrap_or_default();
                Some(InstanceStatus {
                    instance_id: s.instance_id()?.to_string(),
                    state_name,
                    reachability_passed: reachability_passed(details),
                })
            }));
        }
        Ok(statuses)
    }

    async fn terminate_instance(&self, id: &str) -> ProviderResult<()> {
        self.autoscaling
            .terminate_instance_in_auto_scaling_group()
            .instance_id(id)
            .should_decrement_desired_capacity(true)
            .send()
            .await
            .map_err(|e| api_error("TerminateInstanceInAutoScalingGroup", e))?;
        Ok(())
    }
}

/// The instance status check reports reachability as passed.
fn reachability_passed(details: &[InstanceStatusDetails]) -> bool {
    details.iter().any(|d| {
        d.name() == Some(&StatusName::Reachability) && d.status() == Some(&StatusType::Passed)
    })
}
