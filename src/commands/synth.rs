//! `gluecat synth` - write the CloudFormation template

use anyhow::{Context, Result};
use clap::Args;
use dialoguer::Confirm;
use gluecat_config::{SecurityProfile, StackConfig};
use gluecat_core::{GlueCatalogStack, Template, TemplateFormat};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use super::ConfigArgs;

#[derive(Args)]
pub struct SynthArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Security profile: locked-down or open-to-world (overrides config file)
    #[arg(long, value_name = "PROFILE")]
    pub profile: Option<SecurityProfile>,

    /// Template encoding: json or yaml (defaults to the output extension, then json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<TemplateFormat>,

    /// Write the template to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Overwrite existing file without asking
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: SynthArgs, log_level: Option<&str>) -> Result<()> {
    let mut config = args.config.load(log_level)?;
    if let Some(profile) = args.profile {
        config.security.profile = profile;
        config
            .validate()
            .context("Configuration is invalid for the requested profile")?;
    }

    let template = GlueCatalogStack::synthesize(&config).context("Failed to synthesize stack")?;

    let format = args
        .format
        .or_else(|| args.output.as_deref().map(TemplateFormat::from_path))
        .unwrap_or(TemplateFormat::Json);
    let content = template.encode(format)?;

    let Some(output_path) = args.output else {
        println!("{}", content);
        return Ok(());
    };

    if output_path.exists() && !args.force {
        let overwrite = Confirm::new()
            .with_prompt(format!(
                "{} already exists. Overwrite?",
                output_path.display()
            ))
            .default(false)
            .interact()?;
        if !overwrite {
            println!("Aborted.");
            return Ok(());
        }
    }

    fs::write(&output_path, &content)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;
    info!(
        path = %output_path.display(),
        resources = template.resources.len(),
        "Wrote template"
    );

    println!();
    println!("Created {}", output_path.display());
    print_next_steps(&config, &template, &output_path);
    Ok(())
}

fn print_next_steps(config: &StackConfig, template: &Template, output_path: &Path) {
    let mut capabilities = vec!["CAPABILITY_IAM"];
    if !template.transforms.is_empty() {
        capabilities.push("CAPABILITY_AUTO_EXPAND");
    }

    println!();
    println!("Next steps:");
    if template.parameters.is_empty() {
        println!("  1. Deploy:");
    } else {
        println!("  1. Upload the function package to S3");
        println!("  2. Deploy:");
    }
    println!("     aws cloudformation deploy \\");
    println!("       --template-file {} \\", output_path.display());
    println!("       --stack-name {} \\", config.stack.id);
    if template.parameters.is_empty() {
        println!("       --capabilities {}", capabilities.join(" "));
    } else {
        println!("       --capabilities {} \\", capabilities.join(" "));
        let overrides: Vec<String> = template
            .parameters
            .keys()
            .map(|name| format!("{}=<{}>", name, name))
            .collect();
        println!("       --parameter-overrides {}", overrides.join(" "));
    }
    println!();
}
