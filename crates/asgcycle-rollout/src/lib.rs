//! asgcycle rolling replacement — batch sizing, readiness gates, retirement.
//!
//! This crate holds the cycling control loop. A run replaces a group's
//! stale instances in rounds: scale up by one batch, wait for the new
//! instances to be launched, in service, and running-and-reachable,
//! then terminate the same number of old instances.
//!
//! # Components
//!
//! - **`snapshot`** — Group and launch configuration lookup
//! - **`eligibility`** — Which instances are due for replacement
//! - **`sizer`** — Step size from a count or percentage
//! - **`capacity`** — Scale up, retire with decrement
//! - **`readiness`** — Discovery, in-service and running polling phases
//! - **`controller`** — Round state machine and the outer loop

pub mod capacity;
pub mod controller;
pub mod eligibility;
pub mod readiness;
pub mod sizer;
pub mod snapshot;

pub use capacity::{CapacityController, RetireFailure, RetireSummary};
pub use controller::{
    CycleController, CycleOptions, CyclePhase, CycleReport, ReplacedSet, RoundOutcome,
    RoundSummary,
};
pub use eligibility::eligible_instances;
pub use readiness::{Readiness, ReadinessPhase, ReadinessTracker, RoundTracking};
pub use sizer::{CycleStepPlan, StepSpec, compute_step};
pub use snapshot::{GroupInspector, GroupSnapshot};
