//! `gaeship migrate` — shift traffic onto the given versions step by step.
//!
//! Exits 0 when the target is reached or was already met, non-zero on any
//! fatal error (newer deployment, failed operation, API error).

use gaeship_core::{MigrationOutcome, Migrator};

use super::{GlobalArgs, ShiftArgs, admin_client, allocator, format_steps, migration_config};
use crate::config::GaeshipConfig;

pub struct MigrateArgs<'a> {
    pub shift: &'a ShiftArgs,
    pub poll_interval: Option<&'a str>,
    pub step_wait: Option<&'a str>,
    pub dry_run: bool,
}

pub async fn migrate(
    global: &GlobalArgs,
    config: &GaeshipConfig,
    args: MigrateArgs<'_>,
) -> anyhow::Result<()> {
    if args.dry_run {
        return super::plan::plan(global, config, args.shift, "text").await;
    }

    let allocator = allocator(args.shift, config)?;
    let timing = migration_config(args.poll_interval, args.step_wait, config)?;
    let client = admin_client(global, config)?;
    let target = allocator.target();

    let mut migrator = Migrator::new(client, allocator, timing);
    match migrator.run().await? {
        MigrationOutcome::Completed { steps } => {
            println!("{}", format_steps(&steps));
            println!(
                "✓ Migrated {} to {}% in {} step(s)",
                args.shift.versions.join(", "),
                target,
                steps.len()
            );
        }
        MigrationOutcome::Redundant { current } => {
            println!(
                "Nothing to do: {} already hold {}% (target {}%)",
                args.shift.versions.join(", "),
                current,
                target
            );
        }
    }

    Ok(())
}
