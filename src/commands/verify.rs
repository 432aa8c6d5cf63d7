//! `gluecat verify` - check a template on disk

use anyhow::{bail, Context, Result};
use clap::Args;
use gluecat_core::{verify, Expectations, Template, TemplateFormat};
use std::fs;
use std::path::PathBuf;

use super::ConfigArgs;

#[derive(Args)]
pub struct VerifyArgs {
    /// Template to verify (.json, .yaml or .yml)
    #[arg(short, long, value_name = "FILE")]
    pub template: PathBuf,

    #[command(flatten)]
    pub config: ConfigArgs,
}

pub fn run(args: VerifyArgs, log_level: Option<&str>) -> Result<()> {
    let config = args.config.load(log_level)?;

    let content = fs::read_to_string(&args.template)
        .with_context(|| format!("Failed to read template: {}", args.template.display()))?;
    let template = Template::decode(&content, TemplateFormat::from_path(&args.template))
        .with_context(|| format!("Failed to parse template: {}", args.template.display()))?;

    let report = verify(&template, &Expectations::from(&config));
    for finding in &report.findings {
        println!("{}", finding);
    }

    let errors = report.errors().count();
    let warnings = report.warnings().count();
    if errors > 0 {
        bail!(
            "{} failed verification: {} error(s), {} warning(s)",
            args.template.display(),
            errors,
            warnings
        );
    }
    println!(
        "{}: {} resources verified, {} warning(s)",
        args.template.display(),
        template.resources.len(),
        warnings
    );
    Ok(())
}
