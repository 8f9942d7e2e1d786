//! Capacity controller — make room for replacements, then retire old instances.

use std::sync::Arc;

use tracing::{info, warn};

use asgcycle_core::*;

/// A termination that the provider refused.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RetireFailure {
    pub instance_id: InstanceId,
    pub reason: String,
}

/// Outcome of retiring one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RetireSummary {
    pub retired: Vec<InstanceId>,
    pub failures: Vec<RetireFailure>,
}

/// Issues capacity updates and terminations against the live group.
pub struct CapacityController<P> {
    api: Arc<P>,
}

impl<P: FleetApi> CapacityController<P> {
    pub fn new(api: Arc<P>) -> Self {
        Self { api }
    }

    /// Raise desired capacity by `additional`, lifting max size only if needed.
    ///
    /// Returns the new `(desired, max)`. A rejected update is fatal.
    pub async fn scale_up(
        &self,
        group: &str,
        additional: u32,
        current_desired: u32,
        current_max: u32,
    ) -> CycleResult<(u32, u32)> {
        let desired = current_desired.checked_add(additional).ok_or_else(|| {
            CycleError::Scale {
                group: group.to_string(),
                source: ProviderError::Rejected(format!(
                    "desired capacity {current_desired} + {additional} overflows"
                )),
            }
        })?;
        let max = current_max.max(desired);

        self.api
            .update_capacity(group, desired, max)
            .await
            .map_err(|source| CycleError::Scale {
                group: group.to_string(),
                source,
            })?;

        info!(
            %group,
            from = current_desired,
            to = desired,
            max,
            "scaled up"
        );
        Ok((desired, max))
    }

    /// Terminate one instance, decrementing desired capacity.
    pub async fn retire(&self, instance_id: &str) -> CycleResult<()> {
        self.api
            .terminate_instance(instance_id)
            .await
            .map_err(|source| CycleError::Retire {
                instance: instance_id.to_string(),
                source,
            })?;
        info!(instance = %instance_id, "retired instance");
        Ok(())
    }

    /// Retire each instance in order. Failures are recorded and skipped.
    pub async fn retire_all(&self, instance_ids: &[InstanceId]) -> RetireSummary {
        let mut summary = RetireSummary::default();
        for id in instance_ids {
            match self.retire(id).await {
                Ok(()) => summary.retired.push(id.clone()),
                Err(e) => {
                    warn!(instance = %id, error = %e, "failed to retire instance, continuing");
                    summary.failures.push(RetireFailure {
                        instance_id: id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        summary
    }
}
