use anyhow::Result;
use clap::Parser;
use gluecat::commands::Command;

/// Synthesize the Glue catalog demo stack as a CloudFormation template
#[derive(Parser)]
#[command(name = "gluecat")]
#[command(version)]
#[command(about = "Synthesize the Glue catalog demo stack as a CloudFormation template", long_about = None)]
struct Cli {
    /// Log level: trace, debug, info, warn, error (overrides config file)
    #[arg(short = 'v', long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.command.run(cli.log_level.as_deref())
}
