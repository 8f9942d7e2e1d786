//! Domain types for autoscaling groups and their instances.
//!
//! These mirror the shape of the provider's describe responses. The
//! cycler only ever reads them; every round starts from a fresh
//! [`GroupDescriptor`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider-assigned identifier of a compute instance.
pub type InstanceId = String;

// ── Group ──────────────────────────────────────────────────────────

/// An autoscaling group as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDescriptor {
    pub name: String,
    pub desired_capacity: u32,
    pub max_size: u32,
    /// Launch configuration new instances are started from.
    pub launch_config_name: String,
    pub instances: Vec<InstanceMembership>,
}

impl GroupDescriptor {
    /// Identifiers of every member, whatever its lifecycle state.
    pub fn instance_ids(&self) -> impl Iterator<Item = &str> {
        self.instances.iter().map(|i| i.instance_id.as_str())
    }
}

/// One instance's membership record inside a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceMembership {
    pub instance_id: InstanceId,
    pub lifecycle_state: LifecycleState,
    /// `None` when the instance was launched from a launch template.
    pub launch_config_name: Option<String>,
}

/// Lifecycle stage of an instance's membership in its group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    Pending,
    PendingWait,
    PendingProceed,
    Quarantined,
    InService,
    Terminating,
    TerminatingWait,
    TerminatingProceed,
    Terminated,
    Detaching,
    Detached,
    EnteringStandby,
    Standby,
    /// A state this build does not know about.
    Other(String),
}

impl LifecycleState {
    /// Parse the provider's wire name, e.g. `"Pending:Wait"`.
    pub fn from_provider(s: &str) -> Self {
        match s {
            "Pending" => Self::Pending,
            "Pending:Wait" => Self::PendingWait,
            "Pending:Proceed" => Self::PendingProceed,
            "Quarantined" => Self::Quarantined,
            "InService" => Self::InService,
            "Terminating" => Self::Terminating,
            "Terminating:Wait" => Self::TerminatingWait,
            "Terminating:Proceed" => Self::TerminatingProceed,
            "Terminated" => Self::Terminated,
            "Detaching" => Self::Detaching,
            "Detached" => Self::Detached,
            "EnteringStandby" => Self::EnteringStandby,
            "Standby" => Self::Standby,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether the instance is launching or serving, i.e. not on its way out.
    ///
    /// Only alive instances are ever replaced or counted as replacements.
    pub fn is_alive(&self) -> bool {
        matches!(
            self,
            Self::Pending
                | Self::PendingWait
                | Self::PendingProceed
                | Self::Quarantined
                | Self::InService
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::PendingWait => "Pending:Wait",
            Self::PendingProceed => "Pending:Proceed",
            Self::Quarantined => "Quarantined",
            Self::InService => "InService",
            Self::Terminating => "Terminating",
            Self::TerminatingWait => "Terminating:Wait",
            Self::TerminatingProceed => "Terminating:Proceed",
            Self::Terminated => "Terminated",
            Self::Detaching => "Detaching",
            Self::Detached => "Detached",
            Self::EnteringStandby => "EnteringStandby",
            Self::Standby => "Standby",
            Self::Other(s) => s,
        };
        f.write_str(s)
    }
}

// ── Launch configuration ───────────────────────────────────────────

/// A launch configuration. Identity is the name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchConfigDescriptor {
    pub name: String,
    pub image_id: String,
}

// ── Instance status ────────────────────────────────────────────────

/// Infrastructure status of one instance, independent of group membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceStatus {
    pub instance_id: InstanceId,
    /// Provider state name: `pending`, `running`, `stopping`, ...
    pub state_name: String,
    /// Reachability check reported as passed.
    pub reachability_passed: bool,
}

impl InstanceStatus {
    /// Running and reachable in the same observation.
    pub fn is_ready(&self) -> bool {
        self.state_name == "running" && self.reachability_passed
    }
}
