use anyhow::Context;
use clap::{Parser, Subcommand};
use deploycheck::cloud_functions::azure::AzureCli;
use deploycheck::provisioner::terraform::Terraform;
use deploycheck::utils::global_config::load_config;
use deploycheck::verify::ExpectedResources;
use deploycheck::{logger, paths, Lifecycle};
use std::path::PathBuf;

/// Provisions a deployment with terraform, checks it on Azure, and destroys it.
#[derive(Debug, Parser)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Lifecycle config file
    #[arg(long, short, default_value = paths::DEFAULT_CONFIG)]
    config: PathBuf,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply, verify, then destroy (destroy always runs)
    Run,
    /// Verify a deployment that was already applied
    Verify,
    /// Destroy the deployment
    #[command(alias = "delete", alias = "clean", alias = "rm")]
    Destroy,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init(&args.log_level);

    let mut config = load_config(&args.config)?;
    if config.terraform.copy_to_temp && !matches!(args.command, Command::Run) {
        // a fresh copy has no state to verify or destroy
        tracing::warn!("ignoring copy_to_temp outside of `run`");
        config.terraform.copy_to_temp = false;
    }

    let terraform = Terraform::new(&config.terraform).context("preparing terraform")?;
    let azure = AzureCli::from_config(&config)?;
    let lifecycle = Lifecycle::new(
        &terraform,
        &azure,
        ExpectedResources::from_config(&config),
        config.teardown.into(),
    );

    match args.command {
        Command::Run => {
            lifecycle.run()?;
            tracing::info!("all checks passed, resources destroyed");
        }
        Command::Verify => {
            lifecycle.verify_existing()?;
            tracing::info!("all checks passed");
        }
        Command::Destroy => lifecycle.teardown()?,
    }
    Ok(())
}
