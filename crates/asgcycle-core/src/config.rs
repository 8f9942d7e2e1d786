//! asgcycle.toml configuration parser.

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleConfig {
    pub polling: Option<PollingConfig>,
    pub aws: Option<AwsConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollingConfig {
    pub interval: Option<String>,
    pub max_interval: Option<String>,
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: Option<String>,
    pub profile: Option<String>,
    pub endpoint_url: Option<String>,
}

/// Timing of one readiness polling phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay after a poll that made progress.
    pub interval: Duration,
    /// Ceiling for the doubling delay while nothing changes.
    pub max_interval: Duration,
    /// Budget for a whole phase.
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(15 * 60),
        }
    }
}

impl CycleConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: CycleConfig = toml::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Resolve the `[polling]` table over the defaults.
    pub fn poll_policy(&self) -> anyhow::Result<PollPolicy> {
        let mut policy = PollPolicy::default();
        if let Some(polling) = &self.polling {
            if let Some(s) = &polling.interval {
                policy.interval = duration_field("polling.interval", s)?;
            }
            if let Some(s) = &polling.max_interval {
                policy.max_interval = duration_field("polling.max_interval", s)?;
            }
            if let Some(s) = &polling.timeout {
                policy.timeout = duration_field("polling.timeout", s)?;
            }
        }
        if policy.max_interval < policy.interval {
            policy.max_interval = policy.interval;
        }
        Ok(policy)
    }
}

fn duration_field(field: &str, value: &str) -> anyhow::Result<Duration> {
    match parse_duration(value) {
        Some(d) if !d.is_zero() => Ok(d),
        Some(_) => bail!("{field} must be greater than zero"),
        None => bail!("{field}: cannot parse duration {value:?}"),
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
