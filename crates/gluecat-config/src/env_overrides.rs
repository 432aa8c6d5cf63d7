use crate::{LogFormat, StackConfig};
use anyhow::{anyhow, Context, Result};

pub const ENV_PREFIX: &str = "GLUECAT_";

/// Abstraction over environment-variable lookups so tests can supply their
/// own source of overrides.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// Keys without the `GLUECAT_` prefix, as handed to [`EnvSource::get`]
impl EnvSource for std::collections::HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        std::collections::HashMap::get(self, key).cloned()
    }
}

/// Apply environment-variable overrides (highest priority below CLI flags).
pub fn apply_env_overrides<E: EnvSource>(config: &mut StackConfig, env: &E) -> Result<()> {
    // Stack identity
    if let Some(id) = get_env_string(env, "STACK_ID") {
        config.stack.id = id;
    }
    if let Some(name) = get_env_string(env, "STACK_NAME") {
        config.stack.name = name;
    }

    // Network
    if let Some(cidr) = get_env_string(env, "VPC_CIDR") {
        config.network.cidr = cidr;
    }
    if let Some(val) = get_env_parsed::<u8, E>(env, "MAX_AZS")? {
        config.network.max_azs = val;
    }
    if let Some(val) = get_env_parsed::<u8, E>(env, "NAT_GATEWAYS")? {
        config.network.nat_gateways = val;
    }

    // Database
    if let Some(name) = get_env_string(env, "DB_NAME") {
        config.database.database_name = name;
    }
    if let Some(val) = get_env_parsed::<u32, E>(env, "DB_MIN_CAPACITY")? {
        config.database.min_capacity = val;
    }
    if let Some(val) = get_env_parsed::<u32, E>(env, "DB_MAX_CAPACITY")? {
        config.database.max_capacity = val;
    }
    if let Some(val) = get_env_parsed::<u32, E>(env, "DB_AUTO_PAUSE_MINUTES")? {
        config.database.auto_pause_minutes = val;
    }
    if let Some(val) = get_env_parsed::<u32, E>(env, "DB_ROTATION_DAYS")? {
        config.database.rotation_days = val;
    }

    // Function
    if let Some(uri) = get_env_string(env, "FUNCTION_CODE_S3_URI") {
        config.function.code_s3_uri = Some(uri);
    }
    if let Some(val) = get_env_parsed::<u32, E>(env, "FUNCTION_TIMEOUT_SECS")? {
        config.function.timeout_secs = val;
    }

    // Catalog
    if let Some(name) = get_env_string(env, "GLUE_DATABASE_NAME") {
        config.catalog.database_name = name;
    }
    if let Some(schedule) = get_env_string(env, "CRAWLER_SCHEDULE") {
        config.catalog.crawler_schedule = Some(schedule);
    }

    // Security
    if let Some(profile) = get_env_string(env, "SECURITY_PROFILE") {
        config.security.profile = profile
            .parse()
            .context("Invalid GLUECAT_SECURITY_PROFILE value")?;
    }
    if let Some(val) = get_env_bool(env, "ENFORCE_SSL")? {
        config.security.enforce_ssl = Some(val);
    }
    if let Some(scope) = get_env_string(env, "IAM_SCOPE") {
        config.security.iam_scope = Some(scope.parse().context("Invalid GLUECAT_IAM_SCOPE value")?);
    }

    // Logging
    if let Some(level) = get_env_string(env, "LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(format) = get_env_string(env, "LOG_FORMAT") {
        config.logging.format = match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };
    }

    Ok(())
}

fn get_env_string<E: EnvSource>(env: &E, key: &str) -> Option<String> {
    env.get(key).filter(|val| !val.is_empty())
}

fn get_env_parsed<T, E>(env: &E, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    E: EnvSource,
{
    match get_env_string(env, key) {
        Some(val) => {
            let parsed = val
                .parse::<T>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_bool<E: EnvSource>(env: &E, key: &str) -> Result<Option<bool>> {
    match get_env_string(env, key) {
        Some(val) => {
            let parsed = val.parse::<bool>().map_err(|e| {
                anyhow!(
                    "Failed to parse {}{} (expected bool): {}",
                    ENV_PREFIX,
                    key,
                    e
                )
            })?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GrantScope, SecurityProfile};
    use std::collections::HashMap;

    struct MapEnv(HashMap<&'static str, &'static str>);

    impl EnvSource for MapEnv {
        fn get(&self, key: &str) -> Option<String> {
            self.0.get(key).map(|v| v.to_string())
        }
    }

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let env = MapEnv(HashMap::from([
            ("STACK_NAME", "Billing"),
            ("DB_MAX_CAPACITY", "4"),
            ("SECURITY_PROFILE", "open-to-world"),
            ("ENFORCE_SSL", "true"),
            ("IAM_SCOPE", "scoped"),
            ("LOG_FORMAT", "JSON"),
        ]));
        let mut config = StackConfig::default();
        apply_env_overrides(&mut config, &env).unwrap();

        assert_eq!(config.stack.name, "Billing");
        assert_eq!(config.database.max_capacity, 4);
        assert_eq!(config.security.profile, SecurityProfile::OpenToWorld);
        assert_eq!(config.security.enforce_ssl, Some(true));
        assert_eq!(config.security.iam_scope, Some(GrantScope::Scoped));
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn unparsable_numbers_are_rejected() {
        let env = MapEnv(HashMap::from([("DB_MIN_CAPACITY", "one")]));
        let mut config = StackConfig::default();
        let err = apply_env_overrides(&mut config, &env).unwrap_err();
        assert!(err.to_string().contains("GLUECAT_DB_MIN_CAPACITY"));
    }

    #[test]
    fn empty_values_are_ignored() {
        let env = MapEnv(HashMap::from([("STACK_NAME", "")]));
        let mut config = StackConfig::default();
        apply_env_overrides(&mut config, &env).unwrap();
        assert_eq!(config.stack.name, "GlueCatalogDemo");
    }
}
