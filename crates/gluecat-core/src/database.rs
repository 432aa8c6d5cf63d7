//! Aurora Serverless (v1) MySQL cluster with a generated, rotated secret

use crate::error::{Result, StackError};
use crate::intrinsic::Value;
use crate::network::{
    allow_ingress, build_security_group, rule_from_anywhere, Network, PortRange, SecurityGroup,
};
use crate::props;
use crate::stack::{LogicalId, Stack};
use crate::template::{RemovalPolicy, Resource};
use gluecat_config::{DatabaseConfig, SecurityPolicy, AURORA_MYSQL_CAPACITY_UNITS};
use tracing::{info, warn};

pub const ENGINE: &str = "aurora-mysql";
pub const ENGINE_MODE: &str = "serverless";

/// Transform providing `HostedRotationLambda` on rotation schedules
pub const ROTATION_TRANSFORM: &str = "AWS::SecretsManager-2020-07-23";

const PASSWORD_LENGTH: u32 = 30;
const EXCLUDE_CHARACTERS: &str = " %+~`#$&*()|[]{}:;<>?!'/@\"\\";

pub fn cluster_construct_id(name: &str) -> String {
    format!("SC_{}", name)
}

/// Endpoint attributes, resolved by CloudFormation after the cluster exists
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterEndpoint {
    pub hostname: Value,
    pub port: Value,
}

#[derive(Debug, Clone)]
pub struct ClusterSecret {
    pub id: LogicalId,
    pub attachment: LogicalId,
    pub rotation: LogicalId,
    pub name: String,
    pub rotation_days: u32,
}

impl ClusterSecret {
    /// ARN via the target attachment, so consumers see the secret only once
    /// the cluster's connection details have been written into it.
    pub fn arn(&self) -> Value {
        self.attachment.reference()
    }

    pub fn secret_name(&self) -> Value {
        Value::str(&self.name)
    }
}

/// Immutable descriptor of the synthesized cluster
#[derive(Debug, Clone)]
pub struct ServerlessCluster {
    pub name: String,
    pub construct_id: String,
    pub id: LogicalId,
    pub database_name: String,
    pub port: u16,
    pub secret: ClusterSecret,
    pub security_group: SecurityGroup,
    pub rotation_security_group: SecurityGroup,
    pub subnet_group: LogicalId,
}

impl ServerlessCluster {
    pub fn arn(&self) -> Value {
        Value::sub(format!(
            "arn:${{AWS::Partition}}:rds:${{AWS::Region}}:${{AWS::AccountId}}:cluster:${{{}}}",
            self.id
        ))
    }

    pub fn endpoint(&self) -> ClusterEndpoint {
        ClusterEndpoint {
            hostname: self.id.get_att("Endpoint.Address"),
            port: self.id.get_att("Endpoint.Port"),
        }
    }

    /// Admit `source` on the database port.
    pub fn allow_from(
        &self,
        stack: &mut Stack,
        source: &SecurityGroup,
        label: &str,
    ) -> Result<LogicalId> {
        allow_ingress(
            stack,
            &format!("{}/SecurityGroup/From{}", self.construct_id, label),
            &self.security_group,
            source,
            PortRange::tcp(self.port),
            &format!("Database access from {}", label),
        )
    }
}

fn parameter_group_for(engine_version: &str) -> Option<&'static str> {
    if engine_version.starts_with("5.7") {
        Some("default.aurora-mysql5.7")
    } else if engine_version.starts_with("8.0") {
        Some("default.aurora-mysql8.0")
    } else {
        None
    }
}

fn check_scaling(config: &DatabaseConfig) -> Result<()> {
    for value in [config.min_capacity, config.max_capacity] {
        if !AURORA_MYSQL_CAPACITY_UNITS.contains(&value) {
            return Err(StackError::invalid_config(format!(
                "{} is not a valid Aurora capacity unit",
                value
            )));
        }
    }
    if config.min_capacity > config.max_capacity {
        return Err(StackError::invalid_config(format!(
            "min capacity {} exceeds max capacity {}",
            config.min_capacity, config.max_capacity
        )));
    }
    Ok(())
}

/// Dynamic reference to a field of the cluster secret
fn resolve_secret_field(secret: &LogicalId, field: &str) -> Value {
    Value::join(
        "",
        vec![
            Value::str("{{resolve:secretsmanager:"),
            secret.reference(),
            Value::str(format!(":SecretString:{}::}}}}", field)),
        ],
    )
}

pub fn build_serverless_cluster(
    stack: &mut Stack,
    network: &Network,
    name: &str,
    config: &DatabaseConfig,
    policy: &SecurityPolicy,
) -> Result<ServerlessCluster> {
    check_scaling(config)?;

    let construct_id = cluster_construct_id(name);
    info!(
        cluster = %construct_id,
        engine_version = %config.engine_version,
        min_capacity = config.min_capacity,
        max_capacity = config.max_capacity,
        "Building serverless cluster"
    );

    let subnet_group = stack.add(
        &format!("{}/Subnets", construct_id),
        Resource::new("AWS::RDS::DBSubnetGroup").properties(props! {
            "DBSubnetGroupDescription" => format!("Subnets for {} database", construct_id),
            "SubnetIds" => network.private_subnet_ids(),
        }),
    )?;

    let mut ingress = Vec::new();
    if policy.open_cluster_port {
        warn!(
            cluster = %construct_id,
            port = config.port,
            "Opening database port to 0.0.0.0/0"
        );
        ingress.push(rule_from_anywhere(
            PortRange::tcp(config.port),
            "Database access from anywhere",
        ));
    }
    let security_group = build_security_group(
        stack,
        network,
        &format!("{}/SecurityGroup", construct_id),
        &format!("{} cluster security group", construct_id),
        ingress,
    )?;

    let secret_name = format!("{}/{}", stack.id(), construct_id);
    let secret = stack.add(
        &format!("{}/Secret", construct_id),
        Resource::new("AWS::SecretsManager::Secret")
            .properties(props! {
                "Name" => secret_name.clone(),
                "Description" => format!("Generated credentials for {}", construct_id),
                "GenerateSecretString" => props! {
                    "SecretStringTemplate" => format!("{{\"username\":\"{}\"}}", config.master_username),
                    "GenerateStringKey" => "password",
                    "PasswordLength" => PASSWORD_LENGTH,
                    "ExcludeCharacters" => EXCLUDE_CHARACTERS,
                },
            })
            .removal_policy(RemovalPolicy::Destroy),
    )?;

    let mut cluster = Resource::new("AWS::RDS::DBCluster").properties(props! {
        "Engine" => ENGINE,
        "EngineMode" => ENGINE_MODE,
        "EngineVersion" => config.engine_version.clone(),
        "DatabaseName" => config.database_name.clone(),
        "Port" => config.port,
        "DBSubnetGroupName" => subnet_group.reference(),
        "VpcSecurityGroupIds" => vec![security_group.group_id()],
        "MasterUsername" => resolve_secret_field(&secret, "username"),
        "MasterUserPassword" => resolve_secret_field(&secret, "password"),
        "ScalingConfiguration" => props! {
            "AutoPause" => true,
            "MinCapacity" => config.min_capacity,
            "MaxCapacity" => config.max_capacity,
            "SecondsUntilAutoPause" => config.auto_pause_secs(),
        },
        "EnableHttpEndpoint" => config.data_api,
        "CopyTagsToSnapshot" => true,
    });
    if let Some(group) = parameter_group_for(&config.engine_version) {
        cluster = cluster.property("DBClusterParameterGroupName", group);
    }
    let id = stack.add(&construct_id, cluster.removal_policy(RemovalPolicy::Destroy))?;

    let attachment = stack.add(
        &format!("{}/Secret/Attachment", construct_id),
        Resource::new("AWS::SecretsManager::SecretTargetAttachment").properties(props! {
            "SecretId" => secret.reference(),
            "TargetId" => id.reference(),
            "TargetType" => "AWS::RDS::DBCluster",
        }),
    )?;

    let rotation_security_group = build_security_group(
        stack,
        network,
        &format!("{}/RotationSingleUser/SecurityGroup", construct_id),
        &format!("{} secret rotation function", construct_id),
        Vec::new(),
    )?;

    stack.add_transform(ROTATION_TRANSFORM);
    let rotation = stack.add(
        &format!("{}/Secret/RotationSchedule", construct_id),
        Resource::new("AWS::SecretsManager::RotationSchedule").properties(props! {
            "SecretId" => attachment.reference(),
            "HostedRotationLambda" => props! {
                "RotationType" => "MySQLSingleUser",
                "VpcSubnetIds" => Value::join(",", network.private_subnet_ids()),
                "VpcSecurityGroupIds" => rotation_security_group.group_id(),
            },
            "RotationRules" => props! {
                "AutomaticallyAfterDays" => config.rotation_days,
            },
        }),
    )?;

    let cluster = ServerlessCluster {
        name: name.to_string(),
        construct_id,
        id,
        database_name: config.database_name.clone(),
        port: config.port,
        secret: ClusterSecret {
            id: secret,
            attachment,
            rotation,
            name: secret_name,
            rotation_days: config.rotation_days,
        },
        security_group,
        rotation_security_group,
        subnet_group,
    };

    if !policy.open_cluster_port {
        cluster.allow_from(stack, &cluster.rotation_security_group, "RotationSingleUser")?;
    }

    Ok(cluster)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::build_vpc;
    use gluecat_config::{NetworkConfig, SecurityProfile, StackConfig};

    fn build(profile: SecurityProfile) -> (Stack, ServerlessCluster) {
        let config = StackConfig::from_profile(profile);
        let mut stack = Stack::new("GlueCatalogDemoStack");
        let network = build_vpc(&mut stack, &NetworkConfig::default()).unwrap();
        let cluster = build_serverless_cluster(
            &mut stack,
            &network,
            "GlueCatalogDemo",
            &config.database,
            &config.security.policy(),
        )
        .unwrap();
        (stack, cluster)
    }

    #[test]
    fn cluster_ids_follow_naming_contract() {
        let (stack, cluster) = build(SecurityProfile::LockedDown);
        assert_eq!(cluster.construct_id, "SC_GlueCatalogDemo");
        assert_eq!(cluster.id.as_str(), "SCGlueCatalogDemo");
        assert_eq!(cluster.database_name, "GlueCatalogDemo");
        assert_eq!(
            stack.logical_id("SC_GlueCatalogDemo"),
            Some(cluster.id.clone())
        );
        assert_eq!(cluster.secret.name, "GlueCatalogDemoStack/SC_GlueCatalogDemo");
    }

    #[test]
    fn scaling_and_removal_policy() {
        let (stack, cluster) = build(SecurityProfile::LockedDown);
        let resource = stack.resource(&cluster.id).unwrap();
        let scaling = resource.prop("ScalingConfiguration").unwrap();

        assert_eq!(scaling.get("MinCapacity").and_then(Value::as_i64), Some(1));
        assert_eq!(scaling.get("MaxCapacity").and_then(Value::as_i64), Some(8));
        assert_eq!(
            scaling.get("SecondsUntilAutoPause").and_then(Value::as_i64),
            Some(300)
        );
        assert_eq!(resource.deletion_policy, Some(RemovalPolicy::Destroy));
        assert_eq!(
            resource.prop("DBClusterParameterGroupName"),
            Some(&Value::str("default.aurora-mysql5.7"))
        );
    }

    #[test]
    fn secret_rotates_every_thirty_days() {
        let (stack, cluster) = build(SecurityProfile::LockedDown);
        let rotation = stack.resource(&cluster.secret.rotation).unwrap();
        let days = rotation
            .prop("RotationRules")
            .and_then(|rules| rules.get("AutomaticallyAfterDays"))
            .and_then(Value::as_i64);
        assert_eq!(days, Some(30));
        assert_eq!(cluster.secret.arn(), Value::reference("SCGlueCatalogDemoSecretAttachment"));
    }

    #[test]
    fn locked_down_cluster_admits_only_rotation_group() {
        let (stack, cluster) = build(SecurityProfile::LockedDown);
        let group = stack.resource(&cluster.security_group.id).unwrap();
        assert!(group.prop("SecurityGroupIngress").is_none());
        assert!(stack
            .logical_id("SC_GlueCatalogDemo/SecurityGroup/FromRotationSingleUser")
            .is_some());
    }

    #[test]
    fn open_cluster_exposes_port_to_world() {
        let (stack, cluster) = build(SecurityProfile::OpenToWorld);
        let group = stack.resource(&cluster.security_group.id).unwrap();
        let ingress = group.prop("SecurityGroupIngress").and_then(Value::as_list).unwrap();
        assert_eq!(ingress[0].get("CidrIp"), Some(&Value::str("0.0.0.0/0")));
        assert_eq!(ingress[0].get("FromPort").and_then(Value::as_i64), Some(3306));
        assert!(stack
            .logical_id("SC_GlueCatalogDemo/SecurityGroup/FromRotationSingleUser")
            .is_none());
    }

    #[test]
    fn rejects_inverted_capacity() {
        let mut stack = Stack::new("Test");
        let network = build_vpc(&mut stack, &NetworkConfig::default()).unwrap();
        let config = DatabaseConfig {
            min_capacity: 8,
            max_capacity: 1,
            ..DatabaseConfig::default()
        };
        let err = build_serverless_cluster(
            &mut stack,
            &network,
            "Demo",
            &config,
            &SecurityPolicy::default(),
        )
        .unwrap_err();
        assert_eq!(err.code().as_str(), "E004");
    }

    #[test]
    fn cluster_arn_interpolates_logical_id() {
        let (_, cluster) = build(SecurityProfile::LockedDown);
        assert_eq!(
            cluster.arn(),
            Value::sub(
                "arn:${AWS::Partition}:rds:${AWS::Region}:${AWS::AccountId}:cluster:${SCGlueCatalogDemo}"
            )
        );
    }
}
