// gluecat-config - Configuration for the Glue catalog demo stack
//
// Supports configuration from multiple sources:
// 1. Environment variables (highest priority)
// 2. Config file path from GLUECAT_CONFIG env var
// 3. Config file contents from GLUECAT_CONFIG_CONTENT env var
// 4. Default config file locations (./gluecat.toml, ./.gluecat.toml)
// 5. Security profile defaults (lowest priority)
//
// CLI flags are layered on top by the binary.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

mod env_overrides;
mod profile;
mod sources;
mod validation;

pub use env_overrides::{EnvSource, ENV_PREFIX};
pub use profile::{GrantScope, ProfileDefaults, SecurityPolicy, SecurityProfile};
pub use validation::{parse_s3_uri, MAX_CAPACITY_CEILING, VPC_PREFIX_RANGE};

/// Klayers PyMySQL layer for python3.8 in ap-northeast-1.
pub const PYMYSQL_LAYER_ARN: &str =
    "arn:aws:lambda:ap-northeast-1:770693421928:layer:Klayers-p38-PyMySQL:1";

/// Capacity units accepted by Aurora Serverless v1 for MySQL.
pub const AURORA_MYSQL_CAPACITY_UNITS: &[u32] = &[1, 2, 4, 8, 16, 32, 64, 128, 256];

/// Complete stack configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackConfig {
    #[serde(default)]
    pub stack: StackSection,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub function: FunctionConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Stack identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StackSection {
    /// Stack id handed to `aws cloudformation deploy --stack-name`
    pub id: String,
    /// Logical name threaded through every builder (`SC_<name>`, `<name>Connection`, ...)
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Default for StackSection {
    fn default() -> Self {
        Self {
            id: "GlueCatalogDemoStack".to_string(),
            name: "GlueCatalogDemo".to_string(),
            description: None,
        }
    }
}

/// VPC layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub cidr: String,
    pub max_azs: u8,
    pub nat_gateways: u8,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            cidr: "10.0.0.0/16".to_string(),
            max_azs: 2,
            nat_gateways: 2,
        }
    }
}

/// Aurora Serverless cluster settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Default database created inside the cluster
    pub database_name: String,
    pub engine_version: String,
    pub min_capacity: u32,
    pub max_capacity: u32,
    pub auto_pause_minutes: u32,
    pub rotation_days: u32,
    pub port: u16,
    pub master_username: String,
    pub data_api: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_name: "GlueCatalogDemo".to_string(),
            engine_version: "5.7.mysql_aurora.2.12.2".to_string(),
            min_capacity: 1,
            max_capacity: 8,
            auto_pause_minutes: 5,
            rotation_days: 30,
            port: 3306,
            master_username: "admin".to_string(),
            data_api: true,
        }
    }
}

impl DatabaseConfig {
    pub fn auto_pause_secs(&self) -> u32 {
        self.auto_pause_minutes * 60
    }
}

/// Table-creation function settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionConfig {
    pub construct_id: String,
    pub runtime: String,
    pub handler: String,
    /// S3 location of the packaged handler. When unset the template takes
    /// the bucket and key as stack parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_s3_uri: Option<String>,
    pub timeout_secs: u32,
    pub memory_mb: u32,
    pub layers: Vec<String>,
}

impl Default for FunctionConfig {
    fn default() -> Self {
        Self {
            construct_id: "CreateUserTableLambda".to_string(),
            runtime: "python3.8".to_string(),
            handler: "create_user_table.handler".to_string(),
            code_s3_uri: None,
            timeout_secs: 30,
            memory_mb: 128,
            layers: vec![PYMYSQL_LAYER_ARN.to_string()],
        }
    }
}

/// Glue catalog settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub database_name: String,
    /// Table prefix the crawler is scoped to (`<db>/<prefix>%`)
    pub table_prefix: String,
    pub crawler_name: String,
    /// Glue cron expression, e.g. `cron(0 3 * * ? *)`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crawler_schedule: Option<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            database_name: "gule_catalog_demo_db".to_string(),
            table_prefix: "user".to_string(),
            crawler_name: "DatabaseCrawler".to_string(),
            crawler_schedule: None,
        }
    }
}

/// Security posture: a named profile plus optional per-setting overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub profile: SecurityProfile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enforce_ssl: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_cluster_port: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iam_scope: Option<GrantScope>,
}

impl SecurityConfig {
    /// Resolve the profile defaults and explicit overrides into one policy
    pub fn policy(&self) -> SecurityPolicy {
        let defaults = self.profile.defaults();
        SecurityPolicy {
            profile: self.profile,
            open_cluster_port: self.open_cluster_port.unwrap_or(defaults.open_cluster_port),
            open_connection_traffic: defaults.open_connection_traffic,
            enforce_ssl: self.enforce_ssl.unwrap_or(defaults.enforce_ssl),
            iam_scope: self.iam_scope.unwrap_or(defaults.iam_scope),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl StackConfig {
    /// Load configuration from all sources with priority
    pub fn load() -> Result<Self> {
        sources::load_config()
    }

    /// Load configuration from a specific file path (for CLI usage).
    pub fn load_from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        sources::load_from_file_path(path)
    }

    /// Construct a config holding only the defaults of a security profile
    pub fn from_profile(profile: SecurityProfile) -> Self {
        let mut config = StackConfig::default();
        config.security.profile = profile;
        config
    }

    /// Parse inline TOML and layer overrides from a custom env source.
    pub fn load_with_env<E: EnvSource>(inline_config: Option<&str>, env: &E) -> Result<Self> {
        let mut config = match inline_config {
            Some(inline) => {
                toml::from_str(inline).context("Failed to parse inline config content")?
            }
            None => StackConfig::default(),
        };

        config.apply_env_overrides_from(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides from a custom source.
    pub fn apply_env_overrides_from<E: EnvSource>(&mut self, env: &E) -> Result<()> {
        env_overrides::apply_env_overrides(self, env)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_configs() {
        let config = StackConfig::default();
        assert_eq!(config.stack.name, "GlueCatalogDemo");
        assert_eq!(config.stack.id, "GlueCatalogDemoStack");
        assert_eq!(config.database.database_name, "GlueCatalogDemo");
        assert_eq!(config.database.min_capacity, 1);
        assert_eq!(config.database.max_capacity, 8);
        assert_eq!(config.database.auto_pause_secs(), 300);
        assert_eq!(config.database.rotation_days, 30);
        assert_eq!(config.function.timeout_secs, 30);
        assert_eq!(config.catalog.database_name, "gule_catalog_demo_db");
        assert_eq!(config.logging.format, LogFormat::Text);
        assert_eq!(config.security.profile, SecurityProfile::LockedDown);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: StackConfig = toml::from_str(
            r#"
            [stack]
            name = "Orders"

            [database]
            max_capacity = 4

            [security]
            profile = "open-to-world"
            "#,
        )
        .unwrap();

        assert_eq!(config.stack.name, "Orders");
        assert_eq!(config.stack.id, "GlueCatalogDemoStack");
        assert_eq!(config.database.max_capacity, 4);
        assert_eq!(config.database.min_capacity, 1);
        assert_eq!(config.security.profile, SecurityProfile::OpenToWorld);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_policy_overrides_win_over_profile() {
        let security = SecurityConfig {
            profile: SecurityProfile::OpenToWorld,
            enforce_ssl: Some(true),
            open_cluster_port: None,
            iam_scope: Some(GrantScope::Scoped),
        };
        let policy = security.policy();
        assert!(policy.enforce_ssl);
        assert!(policy.open_cluster_port);
        assert_eq!(policy.iam_scope, GrantScope::Scoped);
    }
}
