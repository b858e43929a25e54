use clap::{Parser, Subcommand};

mod commands;
mod config;

use commands::{GlobalArgs, ShiftArgs};
use config::GaeshipConfig;

#[derive(Parser)]
#[command(
    name = "gaeship",
    about = "gaeship — incremental App Engine traffic migration",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Move traffic onto new versions in bounded steps.
    ///
    /// Traffic is taken from the oldest other versions first and spread
    /// evenly over the given versions. Each step waits for App Engine to
    /// apply the split before the next one starts.
    Migrate {
        #[command(flatten)]
        shift: ShiftArgs,
        /// Delay between operation status checks (e.g. 2s)
        #[arg(long)]
        poll_interval: Option<String>,
        /// Delay between steps (e.g. 30s)
        #[arg(long)]
        step_wait: Option<String>,
        /// Print the planned steps without changing traffic
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the current traffic split
    Status {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Print every step a migration would take from the current split
    Plan {
        #[command(flatten)]
        shift: ShiftArgs,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.global.verbose {
        "gaeship=debug"
    } else {
        "gaeship=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .init();

    let cwd = std::env::current_dir()?;
    let config = GaeshipConfig::load(cli.global.config.as_deref(), &cwd)?;

    match cli.command {
        Commands::Migrate {
            shift,
            poll_interval,
            step_wait,
            dry_run,
        } => {
            commands::migrate::migrate(
                &cli.global,
                &config,
                commands::migrate::MigrateArgs {
                    shift: &shift,
                    poll_interval: poll_interval.as_deref(),
                    step_wait: step_wait.as_deref(),
                    dry_run,
                },
            )
            .await
        }
        Commands::Status { format } => commands::status::status(&cli.global, &config, &format).await,
        Commands::Plan { shift, format } => {
            commands::plan::plan(&cli.global, &config, &shift, &format).await
        }
    }
}
