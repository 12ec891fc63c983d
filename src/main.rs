use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use entity_retirement::{RetirementConfig, SoakConfig, UniversalKeyPolicy, run_soak};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "retirement-soak")]
#[command(about = "Concurrent soak run against the entity retirement manager")]
struct Cli {
    #[arg(long, default_value_t = 5)]
    duration_secs: u64,
    #[arg(long, default_value_t = 4)]
    keys: usize,
    /// Percentage of root messages that defer to a fan-out child
    #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u8).range(0..=100))]
    defer_ratio: u8,
    /// Percentage of messages held across completion
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u8).range(0..=100))]
    hold_ratio: u8,
    #[arg(long, default_value_t = 0x9e3779b97f4a7c15)]
    seed: u64,
    /// JSON retirement config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides the config file's universal key policy
    #[arg(long)]
    universal_key_policy: Option<UniversalKeyPolicy>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut retirement = match &cli.config {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            RetirementConfig::from_json_str(&json)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => RetirementConfig::default(),
    };
    if let Some(policy) = cli.universal_key_policy {
        retirement = retirement.universal_key_policy(policy);
    }

    let report = run_soak(SoakConfig {
        duration_secs: cli.duration_secs,
        keys: cli.keys,
        defer_ratio: cli.defer_ratio,
        hold_ratio: cli.hold_ratio,
        seed: cli.seed,
        retirement,
    })
    .await
    .map_err(|err| anyhow!(err))?;

    report.print();
    if !report.is_clean() {
        bail!(
            "soak finished unclean: {} registered, {} retired, {} duplicates, {} order violations",
            report.registered,
            report.retired,
            report.duplicate_retirements,
            report.order_violations
        );
    }
    Ok(())
}
