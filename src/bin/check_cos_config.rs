//! Checks the Tencent COS configuration file and, when it is complete,
//! probes the configured bucket.

use anyhow::Result;
use clap::Parser;
use cos_writer::check::{self, DEFAULT_CONFIG_PATH};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "check_cos_config")]
#[command(about = "Validate the COS configuration and test the bucket connection")]
struct CliArgs {
    /// Configuration file to check.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Only validate the file; do not contact COS.
    #[arg(long)]
    skip_probe: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cos_writer=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();

    println!("Tencent COS configuration check");
    println!("{}", "=".repeat(50));

    let report = check::validate(&args.config);
    report.print();

    let Some(section) = report.section() else {
        std::process::exit(1);
    };
    println!("\nConfiguration check passed");

    if args.skip_probe {
        return Ok(());
    }

    probe(section).await
}

#[cfg(feature = "cos")]
async fn probe(section: &cos_writer::config::CosSection) -> Result<()> {
    println!("\nTesting COS connection...");
    let outcome = check::probe_cos(section).await;
    println!("{}", outcome.render());

    if !outcome.is_connected() {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(not(feature = "cos"))]
async fn probe(_section: &cos_writer::config::CosSection) -> Result<()> {
    println!("\nBuilt without the `cos` feature; skipping the connection test");
    Ok(())
}
