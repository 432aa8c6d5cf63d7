//! `gluecat list` - resource inventory

use anyhow::{Context, Result};
use clap::Args;
use gluecat_core::GlueCatalogStack;

use super::ConfigArgs;

#[derive(Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

pub fn run(args: ListArgs, log_level: Option<&str>) -> Result<()> {
    let config = args.config.load(log_level)?;
    let template = GlueCatalogStack::synthesize(&config).context("Failed to synthesize stack")?;

    let prefix = format!("{}/", config.stack.id);
    let rows: Vec<(&str, &str, &str)> = template
        .resources
        .iter()
        .map(|(id, resource)| {
            let construct = resource
                .path()
                .map(|path| path.strip_prefix(prefix.as_str()).unwrap_or(path))
                .unwrap_or(id.as_str());
            (construct, id.as_str(), resource.resource_type.as_str())
        })
        .collect();

    let construct_width = rows.iter().map(|r| r.0.len()).max().unwrap_or(0).max(12);
    let logical_width = rows.iter().map(|r| r.1.len()).max().unwrap_or(0).max(10);

    println!(
        "{:<cw$}  {:<lw$}  TYPE",
        "CONSTRUCT ID",
        "LOGICAL ID",
        cw = construct_width,
        lw = logical_width
    );
    for (construct, logical, resource_type) in rows {
        println!(
            "{:<cw$}  {:<lw$}  {}",
            construct,
            logical,
            resource_type,
            cw = construct_width,
            lw = logical_width
        );
    }
    Ok(())
}
