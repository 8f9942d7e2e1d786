//! asgcycle-core — shared vocabulary for the instance cycler.
//!
//! Holds the group/instance domain types, the [`FleetApi`] provider
//! trait every cycling component is constructed with, the error
//! taxonomy, `asgcycle.toml` parsing, and an in-memory simulated group.

pub mod config;
pub mod error;
pub mod memory;
pub mod provider;
pub mod types;

pub use config::{CycleConfig, PollPolicy};
pub use error::{CycleError, CycleResult, ProviderError, ProviderResult};
pub use memory::InMemoryFleet;
pub use provider::FleetApi;
pub use types::*;
