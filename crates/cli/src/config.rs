//! Command line arguments and process setup.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use distributor::DistributorConfig;
use tracing_subscriber::EnvFilter;

use crate::commands::Command;

#[derive(Debug, Parser)]
#[command(name = "gres", version, about = "Global resource service distributor")]
pub struct CliConfig {
    /// JSON distributor configuration. Defaults are used when omitted.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

impl CliConfig {
    pub fn run(self) -> anyhow::Result<()> {
        init_tracing(&self.log_level);
        let distributor_config = self.distributor_config()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("building tokio runtime")?;
        let result = runtime.block_on(self.command.execute(distributor_config))?;
        println!("{result}");
        Ok(())
    }

    fn distributor_config(&self) -> anyhow::Result<DistributorConfig> {
        match &self.config {
            Some(path) => DistributorConfig::from_file(path)
                .with_context(|| format!("loading config from {}", path.display())),
            None => Ok(DistributorConfig::default()),
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // A second init (e.g. in tests) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
