use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{error, info};

use asgcycle_aws::AwsFleet;
use asgcycle_core::config::{AwsConfig, PollingConfig};
use asgcycle_core::{CycleConfig, CycleError, CycleResult, FleetApi, InMemoryFleet};
use asgcycle_rollout::{CycleController, CycleOptions, CycleReport, StepSpec};

mod report;

#[derive(Parser)]
#[command(
    name = "asg-cycle",
    about = "Rolling replacement of autoscaling group instances on a stale launch configuration",
    version
)]
struct Cli {
    /// Autoscaling group to cycle.
    group: String,

    /// Instances to replace per round: a count (`2`) or a percentage (`25%`).
    #[arg(short, long, default_value = "1", value_parser = parse_step)]
    number: StepSpec,

    /// Also replace instances already on the current launch configuration.
    #[arg(short, long)]
    force: bool,

    /// Only report which instances would be replaced.
    #[arg(long)]
    dry_run: bool,

    /// Path to an asgcycle.toml.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// AWS region, overriding the config file and environment.
    #[arg(long)]
    region: Option<String>,

    /// Delay between readiness polls, e.g. `1s` or `500ms`.
    #[arg(long)]
    poll_interval: Option<String>,

    /// Budget for each readiness phase, e.g. `15m`.
    #[arg(long)]
    timeout: Option<String>,

    /// Summary output format.
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = Format::Text)]
    log_format: Format,

    /// Cycle a simulated group of N stale instances instead of calling AWS.
    #[arg(long, value_name = "N")]
    simulate: Option<u32>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

/// Log filter when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "info,asgcycle=info";

fn parse_step(s: &str) -> CycleResult<StepSpec> {
    s.parse()
}

fn init_tracing(format: Format) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        Format::Json => builder.json().init(),
        Format::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            exit_code_for(&e)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = resolve_config(&cli)?;
    let options = CycleOptions {
        step: cli.number,
        force: cli.force,
        dry_run: cli.dry_run,
        poll: config.poll_policy()?,
    };

    info!(
        group = %cli.group,
        step = %options.step,
        force = options.force,
        dry_run = options.dry_run,
        "cycling group"
    );

    let report = match cli.simulate {
        Some(stale) => {
            let fleet = InMemoryFleet::new(&cli.group, "simulated-current")
                .with_members("simulated-stale", stale);
            cycle(Arc::new(fleet), &cli.group, options).await?
        }
        None => {
            let fleet = AwsFleet::connect(&config.aws.unwrap_or_default()).await;
            cycle(Arc::new(fleet), &cli.group, options).await?
        }
    };

    match cli.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        Format::Text => print!("{}", report::format_report(&report)),
    }

    if report.is_clean() {
        Ok(ExitCode::SUCCESS)
    } else {
        error!(
            failures = report.retire_failures().len(),
            "some old instances could not be terminated"
        );
        Ok(ExitCode::FAILURE)
    }
}

async fn cycle<P: FleetApi>(
    fleet: Arc<P>,
    group: &str,
    options: CycleOptions,
) -> anyhow::Result<CycleReport> {
    CycleController::new(fleet, group, options)
        .run()
        .await
        .with_context(|| format!("cycling group {group}"))
}

/// Config file values, overridden by command-line flags.
fn resolve_config(cli: &Cli) -> anyhow::Result<CycleConfig> {
    let mut config = match &cli.config {
        Some(path) => CycleConfig::from_file(path)?,
        None => CycleConfig::default(),
    };

    if cli.poll_interval.is_some() || cli.timeout.is_some() {
        let polling = config.polling.get_or_insert_with(PollingConfig::default);
        if let Some(interval) = &cli.poll_interval {
            polling.interval = Some(interval.clone());
        }
        if let Some(timeout) = &cli.timeout {
            polling.timeout = Some(timeout.clone());
        }
    }
    if let Some(region) = &cli.region {
        config.aws.get_or_insert_with(AwsConfig::default).region = Some(region.clone());
    }
    Ok(config)
}

/// 3 for launch configuration drift, 4 for a readiness timeout, 1 otherwise.
fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<CycleError>() {
        Some(CycleError::Drift { .. }) => ExitCode::from(3),
        Some(CycleError::Timeout { .. }) => ExitCode::from(4),
        _ => ExitCode::FAILURE,
    }
}
