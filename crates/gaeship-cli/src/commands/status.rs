use gaeship_core::{ControlPlane, TrafficSplit};

use super::{GlobalArgs, admin_client};
use crate::config::GaeshipConfig;

pub async fn status(global: &GlobalArgs, config: &GaeshipConfig, format: &str) -> anyhow::Result<()> {
    let client = admin_client(global, config)?;
    let split = client.get_split().await?;

    match format {
        "json" => {
            let json = serde_json::json!({
                "project": client.project(),
                "service": client.service(),
                "shard_by": split.shard_by,
                "allocations": split.allocations,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        _ => {
            println!("{}", format_split(client.project(), client.service(), &split));
        }
    }

    Ok(())
}

fn format_split(project: &str, service: &str, split: &TrafficSplit) -> String {
    let mut out = format!(
        "service {service} (project {project}), shard by {}\n",
        split.shard_by
    );
    for version in split.allocations.versions_oldest_first() {
        out.push_str(&format!("  {:<24} {:>3}%\n", version, split.allocations.get(version)));
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gaeship_core::{AllocationMap, ShardBy};

    #[test]
    fn split_table_lists_versions_oldest_first() {
        let split = TrafficSplit {
            shard_by: ShardBy::Ip,
            allocations: AllocationMap::from_percents([("20240102", 20), ("20240101", 80)]).unwrap(),
        };
        let table = format_split("demo", "default", &split);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines[0], "service default (project demo), shard by IP");
        assert!(lines[1].trim_start().starts_with("20240101"));
        assert!(lines[1].ends_with(" 80%"));
        assert!(lines[2].trim_start().starts_with("20240102"));
    }
}
