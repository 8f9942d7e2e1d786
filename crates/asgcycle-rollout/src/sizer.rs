//! Batch sizing — how many instances one round replaces.

use std::fmt;
use std::str::FromStr;

use asgcycle_core::{CycleError, CycleResult, InstanceId};

/// User-supplied "number to cycle": an absolute count or a percentage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepSpec {
    /// Replace this many instances per round.
    Count(i64),
    /// Replace this percentage (0 < p ≤ 100) of the eligible instances.
    Percent(f64),
}

impl Default for StepSpec {
    fn default() -> Self {
        Self::Count(1)
    }
}

impl FromStr for StepSpec {
    type Err = CycleError;

    fn from_str(s: &str) -> CycleResult<Self> {
        let raw = s.trim();
        let invalid = |reason: &str| CycleError::InvalidSpec {
            spec: s.to_string(),
            reason: reason.to_string(),
        };

        if let Some(number) = raw.strip_suffix('%') {
            let pct: f64 = number
                .trim()
                .parse()
                .map_err(|_| invalid("percentage is not a number"))?;
            // NaN fails both comparisons.
            if !(pct > 0.0 && pct <= 100.0) {
                return Err(invalid("percentage must be greater than 0 and at most 100"));
            }
            Ok(Self::Percent(pct))
        } else {
            raw.parse::<i64>()
                .map(Self::Count)
                .map_err(|_| invalid("expected an integer or a percentage like 25%"))
        }
    }
}

impl fmt::Display for StepSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(n) => write!(f, "{n}"),
            Self::Percent(p) => write!(f, "{p}%"),
        }
    }
}

impl StepSpec {
    /// Concrete step size for `eligible` candidates, clamped to `[1, eligible]`.
    ///
    /// Percentages round half up: 25% of 10 is 3. `eligible` must be
    /// non-zero; callers stop before sizing an empty round.
    pub fn step_size(&self, eligible: usize) -> usize {
        debug_assert!(eligible > 0, "sizing a round with no eligible instances");
        let raw = match *self {
            // Non-negative operand, so `round` (half away from zero) is half up.
            Self::Percent(pct) => (eligible as f64 * pct / 100.0).round() as i64,
            Self::Count(n) => n,
        };
        raw.clamp(1, eligible.max(1) as i64) as usize
    }
}

/// Parse `spec` and size a round of `eligible` candidates.
pub fn compute_step(spec: &str, eligible: usize) -> CycleResult<usize> {
    Ok(spec.parse::<StepSpec>()?.step_size(eligible))
}

/// One round's work: how many to replace and which old instances go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleStepPlan {
    pub step_size: usize,
    /// The first `step_size` eligible ids, in eligibility order.
    pub old_instance_ids: Vec<InstanceId>,
}

impl CycleStepPlan {
    /// Plan a round over sorted `eligible` ids. `None` when there is nothing to do.
    pub fn new(spec: &StepSpec, eligible: &[InstanceId]) -> Option<Self> {
        if eligible.is_empty() {
            return None;
        }
        let step_size = spec.step_size(eligible.len());
        Some(Self {
            step_size,
            old_instance_ids: eligible[..step_size].to_vec(),
        })
    }
}
