// Configuration source loading.
//
// Priority order:
// 1. Environment variables (GLUECAT_* prefix)
// 2. Config file path from GLUECAT_CONFIG
// 3. Inline config content from GLUECAT_CONFIG_CONTENT
// 4. Default config files (./gluecat.toml, ./.gluecat.toml)
// 5. Built-in defaults (locked-down profile)

use crate::env_overrides::{self, EnvSource, ENV_PREFIX};
use crate::StackConfig;
use anyhow::{Context, Result};
use std::env;
use std::path::Path;

const DEFAULT_CONFIG_PATHS: &[&str] = &["./gluecat.toml", "./.gluecat.toml"];

/// Load configuration using native environment/file access.
pub fn load_config() -> Result<StackConfig> {
    let mut config = load_from_file()?.unwrap_or_default();

    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;
    config.validate()?;
    Ok(config)
}

fn load_from_file() -> Result<Option<StackConfig>> {
    if let Ok(path) = env::var("GLUECAT_CONFIG") {
        return read_config_file(Path::new(&path)).map(Some);
    }

    if let Ok(content) = env::var("GLUECAT_CONFIG_CONTENT") {
        let config: StackConfig = toml::from_str(&content)
            .context("Failed to parse inline config from GLUECAT_CONFIG_CONTENT")?;
        return Ok(Some(config));
    }

    for path in DEFAULT_CONFIG_PATHS {
        let path = Path::new(path);
        if path.exists() {
            return read_config_file(path).map(Some);
        }
    }

    Ok(None)
}

/// Load configuration from a specific file path (for CLI --config flag).
/// Returns error if file doesn't exist or can't be parsed.
pub fn load_from_file_path(path: impl AsRef<Path>) -> Result<StackConfig> {
    let mut config = read_config_file(path.as_ref())?;

    env_overrides::apply_env_overrides(&mut config, &StdEnvSource)?;
    config.validate()?;
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<StackConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn explicit_path_must_exist() {
        let err = load_from_file_path("/nonexistent/gluecat.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn explicit_path_is_parsed() {
        let path = env::temp_dir().join(format!("gluecat-sources-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[catalog]\ntable_prefix = \"orders\"").unwrap();

        let config = read_config_file(&path).unwrap();
        assert_eq!(config.catalog.table_prefix, "orders");
        assert_eq!(config.catalog.database_name, "gule_catalog_demo_db");

        std::fs::remove_file(&path).unwrap();
    }
}
