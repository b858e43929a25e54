pub mod migrate;
pub mod plan;
pub mod status;

use std::time::Duration;

use anyhow::{Context, bail};
use clap::Args;

use gaeship_admin::{AdminClient, AdminConfig, DEFAULT_API_BASE};
use gaeship_core::{MigrationConfig, Percent, Shift, TrafficAllocator};

use crate::config::{GaeshipConfig, parse_duration};

const DEFAULT_SERVICE: &str = "default";
const DEFAULT_TARGET: Percent = 100;
const DEFAULT_STEP: Percent = 10;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Flags shared by every command. Each overrides the matching config value.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Config file (default: ./gaeship.toml if present)
    #[arg(long, global = true)]
    pub config: Option<std::path::PathBuf>,
    /// Cloud project id
    #[arg(long, global = true)]
    pub project: Option<String>,
    /// App Engine service id (default: "default")
    #[arg(long, global = true)]
    pub service: Option<String>,
    /// OAuth access token, e.g. from `gcloud auth print-access-token`
    #[arg(long, global = true, env = "GAESHIP_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,
    /// Admin API base URL
    #[arg(long, global = true)]
    pub api_base: Option<String>,
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Which versions get traffic and how fast.
#[derive(Args, Debug, Clone, Default)]
pub struct ShiftArgs {
    /// Versions to move traffic onto; remainder goes to the last one
    #[arg(required = true, value_name = "VERSION")]
    pub versions: Vec<String>,
    /// Total percentage the versions should end up with
    #[arg(long)]
    pub target: Option<Percent>,
    /// Maximum percentage moved per step
    #[arg(long)]
    pub step: Option<Percent>,
}

/// Build an Admin API client from flags and config.
pub fn admin_client(global: &GlobalArgs, config: &GaeshipConfig) -> anyhow::Result<AdminClient> {
    let project = global
        .project
        .clone()
        .or_else(|| config.app.project.clone())
        .context("no project: pass --project or set [app].project in gaeship.toml")?;
    let service = global
        .service
        .clone()
        .or_else(|| config.app.service.clone())
        .unwrap_or_else(|| DEFAULT_SERVICE.to_string());
    let Some(access_token) = global.access_token.clone() else {
        bail!("no access token: pass --access-token or set GAESHIP_ACCESS_TOKEN");
    };
    let api_base = global
        .api_base
        .clone()
        .or_else(|| config.app.api_base.clone())
        .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
    let timeout = duration_setting("timeout", None, config.app.timeout.as_deref())?
        .unwrap_or(DEFAULT_TIMEOUT);

    let client = AdminClient::new(AdminConfig {
        api_base,
        project,
        service,
        access_token,
        timeout,
    })?;
    Ok(client)
}

/// Build the allocator from positional versions, flags, and config.
pub fn allocator(args: &ShiftArgs, config: &GaeshipConfig) -> anyhow::Result<TrafficAllocator> {
    let target = args.target.or(config.migrate.target).unwrap_or(DEFAULT_TARGET);
    let step = args.step.or(config.migrate.step).unwrap_or(DEFAULT_STEP);
    let allocator = TrafficAllocator::new(args.versions.iter().cloned(), target, step)?;
    Ok(allocator)
}

/// Build migration timing from flags and config.
pub fn migration_config(
    poll_interval: Option<&str>,
    step_wait: Option<&str>,
    config: &GaeshipConfig,
) -> anyhow::Result<MigrationConfig> {
    let defaults = MigrationConfig::default();
    let poll_interval =
        duration_setting("poll interval", poll_interval, config.migrate.poll_interval.as_deref())?
            .unwrap_or(defaults.poll_interval);
    let step_wait = duration_setting("step wait", step_wait, config.migrate.step_wait.as_deref())?
        .unwrap_or(defaults.step_wait);

    Ok(MigrationConfig {
        poll_interval,
        step_wait,
        fallback_shard_by: config.migrate.shard_by.unwrap_or(defaults.fallback_shard_by),
    })
}

fn duration_setting(
    name: &str,
    flag: Option<&str>,
    file: Option<&str>,
) -> anyhow::Result<Option<Duration>> {
    match flag.or(file) {
        Some(raw) => match parse_duration(raw) {
            Some(d) => Ok(Some(d)),
            None => bail!("invalid {name} {raw:?}: expected e.g. 500ms, 5s, 2m"),
        },
        None => Ok(None),
    }
}

/// One line per step: `step N: v1 80% → 50%, v3 0% → 30%`.
pub fn format_steps(steps: &[Shift]) -> String {
    steps
        .iter()
        .enumerate()
        .map(|(i, step)| {
            let changes: Vec<String> = step
                .changes()
                .iter()
                .map(|c| format!("{} {}% → {}%", c.version, c.from, c.to))
                .collect();
            format!("step {}: {}", i + 1, changes.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}
