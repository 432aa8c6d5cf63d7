//! Subcommands of the `gluecat` binary

pub mod list;
pub mod synth;
pub mod verify;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use gluecat_config::StackConfig;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Command {
    /// Write the stack's CloudFormation template
    Synth(synth::SynthArgs),
    /// Check a template on disk for the stack's invariants
    Verify(verify::VerifyArgs),
    /// Print construct id, logical id and type of every resource
    List(list::ListArgs),
}

impl Command {
    pub fn run(self, log_level: Option<&str>) -> Result<()> {
        match self {
            Command::Synth(args) => synth::run(args, log_level),
            Command::Verify(args) => verify::run(args, log_level),
            Command::List(args) => list::run(args, log_level),
        }
    }
}

/// `--config` flag shared by every subcommand
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl ConfigArgs {
    /// Load configuration, apply the log level override and start tracing.
    pub fn load(&self, log_level: Option<&str>) -> Result<StackConfig> {
        let mut config = match &self.config {
            Some(path) => StackConfig::load_from_path(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => StackConfig::load().context("Failed to load configuration")?,
        };
        if let Some(level) = log_level {
            config.logging.level = level.to_string();
        }
        crate::init_tracing(&config.logging);
        // Loading validated before a subscriber existed; repeat so warnings surface
        config.validate()?;
        Ok(config)
    }
}
