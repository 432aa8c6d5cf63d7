// Named security profiles
//
// - locked-down: cluster port reachable only from the stack's own security
//   groups, TLS enforced on the JDBC connection, IAM grants scoped to the
//   cluster and secret ARNs (default)
// - open-to-world: database port and connection security group open to
//   0.0.0.0/0, TLS not enforced, broad `*` grants

use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecurityProfile {
    #[default]
    LockedDown,
    OpenToWorld,
}

/// Resource scope of the data-API and secret grants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantScope {
    /// Statements name the cluster and secret ARNs
    Scoped,
    /// Statements use `*`
    Broad,
}

impl SecurityProfile {
    /// Get profile-specific defaults
    pub fn defaults(&self) -> ProfileDefaults {
        match self {
            SecurityProfile::LockedDown => ProfileDefaults {
                open_cluster_port: false,
                open_connection_traffic: false,
                enforce_ssl: true,
                iam_scope: GrantScope::Scoped,
            },
            SecurityProfile::OpenToWorld => ProfileDefaults {
                open_cluster_port: true,
                open_connection_traffic: true,
                enforce_ssl: false,
                iam_scope: GrantScope::Broad,
            },
        }
    }
}

impl std::fmt::Display for SecurityProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecurityProfile::LockedDown => write!(f, "locked-down"),
            SecurityProfile::OpenToWorld => write!(f, "open-to-world"),
        }
    }
}

impl std::str::FromStr for SecurityProfile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "locked-down" | "lockeddown" | "hardened" => Ok(SecurityProfile::LockedDown),
            "open-to-world" | "open" | "demo" => Ok(SecurityProfile::OpenToWorld),
            _ => anyhow::bail!(
                "Unsupported security profile: {}. Supported: locked-down, open-to-world",
                s
            ),
        }
    }
}

impl std::str::FromStr for GrantScope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "scoped" => Ok(GrantScope::Scoped),
            "broad" | "wildcard" => Ok(GrantScope::Broad),
            _ => anyhow::bail!("Unsupported IAM scope: {}. Supported: scoped, broad", s),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProfileDefaults {
    pub open_cluster_port: bool,
    pub open_connection_traffic: bool,
    pub enforce_ssl: bool,
    pub iam_scope: GrantScope,
}

/// Fully resolved security settings consumed by the stack builders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityPolicy {
    pub profile: SecurityProfile,
    pub open_cluster_port: bool,
    pub open_connection_traffic: bool,
    pub enforce_ssl: bool,
    pub iam_scope: GrantScope,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        let profile = SecurityProfile::default();
        let defaults = profile.defaults();
        Self {
            profile,
            open_cluster_port: defaults.open_cluster_port,
            open_connection_traffic: defaults.open_connection_traffic,
            enforce_ssl: defaults.enforce_ssl,
            iam_scope: defaults.iam_scope,
        }
    }
}
