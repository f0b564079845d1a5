use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use neoride_cli::terminal::Style;
use neoride_cli::{db_check, verify};

#[derive(Parser, Debug)]
#[command(author, version, about = "NeoRide connectivity tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to MongoDB directly and exercise ping, listing and a write round trip.
    DbCheck {
        /// Connection string. Defaults to the MONGODB_URI environment variable.
        #[arg(long)]
        uri: Option<String>,
        /// Connection attempts before giving up.
        #[arg(long, default_value_t = 1)]
        attempts: u32,
    },
    /// Check that a running deployment answers on its read-only endpoints.
    Verify {
        /// Base URL of the deployment.
        #[arg(long, default_value = verify::DEFAULT_BASE_URL)]
        base_url: String,
        /// Per-request timeout in seconds.
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();
    let style = Style::detect();

    match cli.command {
        Command::DbCheck { uri, attempts } => {
            let config = db_check::resolve_config(uri, attempts)?;
            let report = db_check::run(config).await;
            report.render(&style);
            if !report.passed() {
                bail!("database check failed");
            }
        }
        Command::Verify { base_url, timeout } => {
            let report = verify::run(&base_url, Duration::from_secs(timeout)).await?;
            report.render(&style);
            if !report.passed() {
                bail!(
                    "{} of {} endpoints failed",
                    report.failed(),
                    report.results.len()
                );
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
