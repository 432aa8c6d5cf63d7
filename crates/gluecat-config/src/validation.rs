// Configuration validation
//
// Validates that required fields are present and values are sensible

use crate::*;
use anyhow::{bail, Result};
use ipnetwork::Ipv4Network;
use tracing::warn;

/// Scaling ceiling for the demo cluster
pub const MAX_CAPACITY_CEILING: u32 = 8;

/// Prefix lengths EC2 accepts for a VPC block
pub const VPC_PREFIX_RANGE: std::ops::RangeInclusive<u8> = 16..=28;

pub fn validate_config(config: &StackConfig) -> Result<()> {
    validate_stack_section(&config.stack)?;
    validate_network_config(&config.network)?;
    validate_database_config(&config.database)?;
    validate_function_config(&config.function)?;
    validate_catalog_config(&config.catalog)?;
    validate_security_config(&config.security);
    Ok(())
}

fn validate_stack_section(config: &StackSection) -> Result<()> {
    if config.id.is_empty() {
        bail!("stack.id must not be empty");
    }
    if !config
        .id
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        || !config
            .id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        bail!("stack.id must start with a letter and contain only letters, digits and hyphens");
    }
    if config.name.is_empty() {
        bail!("stack.name must not be empty");
    }
    if !config.name.chars().all(|c| c.is_ascii_alphanumeric()) {
        bail!("stack.name must contain only letters and digits");
    }
    Ok(())
}

fn validate_network_config(config: &NetworkConfig) -> Result<()> {
    let cidr: Ipv4Network = match config.cidr.parse() {
        Ok(cidr) if config.cidr.contains('/') => cidr,
        _ => bail!("network.cidr must be in CIDR notation (e.g. 10.0.0.0/16)"),
    };
    if !VPC_PREFIX_RANGE.contains(&cidr.prefix()) {
        bail!(
            "network.cidr prefix /{} is outside the VPC range /{}-/{}",
            cidr.prefix(),
            VPC_PREFIX_RANGE.start(),
            VPC_PREFIX_RANGE.end()
        );
    }
    if config.max_azs == 0 {
        bail!("network.max_azs must be greater than 0");
    }
    if config.nat_gateways > config.max_azs {
        bail!(
            "network.nat_gateways ({}) cannot exceed network.max_azs ({})",
            config.nat_gateways,
            config.max_azs
        );
    }
    if config.nat_gateways == 0 {
        warn!("network.nat_gateways is 0; private subnets will have no outbound route");
    }
    Ok(())
}

fn validate_database_config(config: &DatabaseConfig) -> Result<()> {
    if config.database_name.is_empty() {
        bail!("database.database_name must not be empty");
    }
    if !config
        .database_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        bail!("database.database_name must contain only letters, digits and underscores");
    }

    for (field, value) in [
        ("min_capacity", config.min_capacity),
        ("max_capacity", config.max_capacity),
    ] {
        if !AURORA_MYSQL_CAPACITY_UNITS.contains(&value) {
            bail!(
                "database.{} must be one of {:?}, got {}",
                field,
                AURORA_MYSQL_CAPACITY_UNITS,
                value
            );
        }
    }
    if config.min_capacity > config.max_capacity {
        bail!(
            "database.min_capacity ({}) must not exceed database.max_capacity ({})",
            config.min_capacity,
            config.max_capacity
        );
    }
    if config.max_capacity > MAX_CAPACITY_CEILING {
        bail!(
            "database.max_capacity must be at most {} ACU",
            MAX_CAPACITY_CEILING
        );
    }

    // Aurora Serverless v1 accepts 5 minutes to 1 day
    if !(5..=1440).contains(&config.auto_pause_minutes) {
        bail!("database.auto_pause_minutes must be between 5 and 1440");
    }
    if !(1..=1000).contains(&config.rotation_days) {
        bail!("database.rotation_days must be between 1 and 1000");
    }
    if config.port == 0 {
        bail!("database.port must be greater than 0");
    }
    if config.master_username.is_empty() {
        bail!("database.master_username must not be empty");
    }
    Ok(())
}

fn validate_function_config(config: &FunctionConfig) -> Result<()> {
    if config.handler.is_empty() {
        bail!("function.handler must not be empty");
    }
    if config.runtime.is_empty() {
        bail!("function.runtime must not be empty");
    }
    if !(1..=900).contains(&config.timeout_secs) {
        bail!("function.timeout_secs must be between 1 and 900");
    }
    if !(128..=10240).contains(&config.memory_mb) {
        bail!("function.memory_mb must be between 128 and 10240");
    }
    if let Some(uri) = &config.code_s3_uri {
        if let Err(e) = parse_s3_uri(uri) {
            bail!("function.code_s3_uri is invalid: {}", e);
        }
    }
    Ok(())
}

fn validate_catalog_config(config: &CatalogConfig) -> Result<()> {
    if config.database_name.is_empty() {
        bail!("catalog.database_name must not be empty");
    }
    // Glue lowercases database names
    if config.database_name.chars().any(|c| c.is_ascii_uppercase()) {
        warn!(
            database_name = %config.database_name,
            "catalog.database_name contains uppercase characters; Glue stores it lowercased"
        );
    }
    if config.table_prefix.contains('/') {
        bail!("catalog.table_prefix must not contain '/'");
    }
    if config.crawler_name.is_empty() {
        bail!("catalog.crawler_name must not be empty");
    }
    if let Some(schedule) = &config.crawler_schedule {
        if !(schedule.starts_with("cron(") && schedule.ends_with(')')) {
            bail!("catalog.crawler_schedule must be a cron(...) expression");
        }
    }
    Ok(())
}

fn validate_security_config(config: &SecurityConfig) {
    let policy = config.policy();
    if policy.open_cluster_port || policy.open_connection_traffic {
        warn!(
            profile = %policy.profile,
            "security profile opens database traffic to 0.0.0.0/0"
        );
    }
    if !policy.enforce_ssl {
        warn!("JDBC_ENFORCE_SSL is disabled for the catalog connection");
    }
    if policy.iam_scope == GrantScope::Broad {
        warn!("IAM data-API and secret grants use wildcard resources");
    }
}

/// Split an `s3://bucket/key` URI into bucket and key.
pub fn parse_s3_uri(input: &str) -> std::result::Result<(&str, &str), String> {
    let Some(path) = input.strip_prefix("s3://") else {
        return Err("S3 URI must start with 's3://'".to_string());
    };
    match path.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok((bucket, key)),
        _ => Err(
            "S3 URI must include both bucket and key (e.g., s3://bucket/key.zip)".to_string(),
        ),
    }
}
