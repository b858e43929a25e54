use gaeship_core::ControlPlane;
use tracing::info;

use super::{GlobalArgs, ShiftArgs, admin_client, allocator, format_steps};
use crate::config::GaeshipConfig;

/// Print every step a migration would take from the current split.
/// Reads the split only; nothing is written.
pub async fn plan(
    global: &GlobalArgs,
    config: &GaeshipConfig,
    args: &ShiftArgs,
    format: &str,
) -> anyhow::Result<()> {
    let allocator = allocator(args, config)?;
    let client = admin_client(global, config)?;
    let split = client.get_split().await?;
    let steps = allocator.plan(&split.allocations)?;

    info!(steps = steps.len(), current = %split.allocations, "planned migration");

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&steps)?);
        }
        _ if steps.is_empty() => {
            println!(
                "Nothing to do: {} already hold {}% (target {}%)",
                allocator.deploying().join(", "),
                allocator.deployed_total(&split.allocations),
                allocator.target()
            );
        }
        _ => {
            println!("{}", format_steps(&steps));
        }
    }

    Ok(())
}
