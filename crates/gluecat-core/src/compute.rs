//! The table-creation function attached to the cluster's VPC
//!
//! The handler itself ships as an external package; this module only wires
//! its code location, environment, layer, role and network placement.

use crate::database::ServerlessCluster;
use crate::error::{Result, StackError};
use crate::iam::{function_role, Role};
use crate::intrinsic::Value;
use crate::network::{build_security_group, Network, SecurityGroup};
use crate::props;
use crate::stack::{logical_id_for, LogicalId, Stack};
use crate::template::{Parameter, Resource};
use gluecat_config::{parse_s3_uri, FunctionConfig, SecurityPolicy};
use indexmap::IndexMap;
use tracing::info;

pub const CLUSTER_ARN_ENV_KEY: &str = "DB_CLUSTER_ARN";

/// Environment key carrying the secret ARN, suffixed with the stack name
pub fn secret_arn_env_key(name: &str) -> String {
    format!("DB_SECRET_ARN_{}", name)
}

/// Where the function package lives
#[derive(Debug, Clone, PartialEq)]
pub struct CodeLocation {
    pub bucket: Value,
    pub key: Value,
}

impl CodeLocation {
    /// Fixed location from configuration, or stack parameters when unset.
    fn resolve(stack: &mut Stack, construct_id: &str, uri: Option<&str>) -> Result<Self> {
        match uri {
            Some(uri) => {
                let (bucket, key) = parse_s3_uri(uri).map_err(|e| {
                    StackError::invalid_config(format!("Invalid code location {}: {}", uri, e))
                })?;
                Ok(Self {
                    bucket: Value::str(bucket),
                    key: Value::str(key),
                })
            }
            None => {
                let prefix = logical_id_for(construct_id)?;
                let bucket = stack.add_parameter(
                    &format!("{}CodeS3Bucket", prefix),
                    Parameter::string(format!("S3 bucket holding the {} package", construct_id)),
                )?;
                let key = stack.add_parameter(
                    &format!("{}CodeS3Key", prefix),
                    Parameter::string(format!("S3 key of the {} package", construct_id)),
                )?;
                Ok(Self { bucket, key })
            }
        }
    }
}

/// Immutable descriptor of the synthesized function
#[derive(Debug, Clone)]
pub struct Function {
    pub id: LogicalId,
    pub construct_id: String,
    pub role: Role,
    pub security_group: SecurityGroup,
    pub code: CodeLocation,
    pub environment: IndexMap<String, Value>,
    pub layers: Vec<String>,
}

impl Function {
    pub fn function_name(&self) -> Value {
        self.id.reference()
    }

    pub fn arn(&self) -> Value {
        self.id.get_att("Arn")
    }
}

pub fn build_function(
    stack: &mut Stack,
    network: &Network,
    cluster: &ServerlessCluster,
    name: &str,
    config: &FunctionConfig,
    policy: &SecurityPolicy,
) -> Result<Function> {
    let construct_id = config.construct_id.as_str();
    info!(
        function = %construct_id,
        runtime = %config.runtime,
        timeout_secs = config.timeout_secs,
        "Building function"
    );

    let secret_arn = cluster.secret.arn();
    let role = function_role(
        stack,
        &format!("{}Role", construct_id),
        &secret_arn,
        &cluster.arn(),
        policy.iam_scope,
    )?;

    let security_group = build_security_group(
        stack,
        network,
        &format!("{}/SecurityGroup", construct_id),
        &format!("Automatic security group for Lambda Function {}", construct_id),
        Vec::new(),
    )?;
    if !policy.open_cluster_port {
        cluster.allow_from(stack, &security_group, construct_id)?;
    }

    let code = CodeLocation::resolve(stack, construct_id, config.code_s3_uri.as_deref())?;

    let mut environment = IndexMap::new();
    environment.insert(secret_arn_env_key(name), secret_arn);
    environment.insert(CLUSTER_ARN_ENV_KEY.to_string(), cluster.arn());

    let mut resource = Resource::new("AWS::Lambda::Function").properties(props! {
        "Code" => props! {
            "S3Bucket" => code.bucket.clone(),
            "S3Key" => code.key.clone(),
        },
        "Role" => role.arn(),
        "Runtime" => config.runtime.clone(),
        "Handler" => config.handler.clone(),
        "Timeout" => config.timeout_secs,
        "MemorySize" => config.memory_mb,
        "Environment" => props! {
            "Variables" => Value::Map(environment.clone()),
        },
        "Layers" => config.layers.clone(),
        "VpcConfig" => props! {
            "SubnetIds" => network.private_subnet_ids(),
            "SecurityGroupIds" => vec![security_group.group_id()],
        },
    });
    // The role must carry its ENI grants before Lambda attaches to the VPC
    if let Some(policy_id) = &role.policy {
        resource = resource.depends_on(policy_id);
    }
    resource = resource.depends_on(&role.id);

    let id = stack.add(construct_id, resource)?;

    Ok(Function {
        id,
        construct_id: construct_id.to_string(),
        role,
        security_group,
        code,
        environment,
        layers: config.layers.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::build_serverless_cluster;
    use crate::iam::{DATA_API_ACTIONS, NETWORK_INTERFACE_ACTIONS, SECRET_READ_ACTIONS};
    use crate::network::build_vpc;
    use gluecat_config::{SecurityProfile, StackConfig, PYMYSQL_LAYER_ARN};

    fn build(config: &StackConfig) -> (Stack, ServerlessCluster, Function) {
        let policy = config.security.policy();
        let mut stack = Stack::new("GlueCatalogDemoStack");
        let network = build_vpc(&mut stack, &config.network).unwrap();
        let cluster = build_serverless_cluster(
            &mut stack,
            &network,
            &config.stack.name,
            &config.database,
            &policy,
        )
        .unwrap();
        let function = build_function(
            &mut stack,
            &network,
            &cluster,
            &config.stack.name,
            &config.function,
            &policy,
        )
        .unwrap();
        (stack, cluster, function)
    }

    #[test]
    fn environment_carries_secret_and_cluster_arns() {
        let (_, cluster, function) = build(&StackConfig::default());
        assert_eq!(
            function.environment.get("DB_SECRET_ARN_GlueCatalogDemo"),
            Some(&cluster.secret.arn())
        );
        assert_eq!(function.environment.get("DB_CLUSTER_ARN"), Some(&cluster.arn()));
        assert_eq!(function.layers, vec![PYMYSQL_LAYER_ARN.to_string()]);
    }

    #[test]
    fn function_grants_stay_within_allowed_actions() {
        let (_, _, function) = build(&StackConfig::default());
        let allowed: Vec<&str> = SECRET_READ_ACTIONS
            .iter()
            .chain(DATA_API_ACTIONS)
            .chain(NETWORK_INTERFACE_ACTIONS)
            .copied()
            .collect();
        for statement in &function.role.statements {
            for action in &statement.actions {
                assert!(allowed.contains(&action.as_str()), "unexpected grant {}", action);
            }
        }
    }

    #[test]
    fn timeout_and_dependencies() {
        let (stack, _, function) = build(&StackConfig::default());
        let resource = stack.resource(&function.id).unwrap();
        assert_eq!(resource.prop("Timeout").and_then(Value::as_i64), Some(30));
        assert_eq!(
            resource.depends_on,
            vec![
                "CreateUserTableLambdaRoleDefaultPolicy".to_string(),
                "CreateUserTableLambdaRole".to_string()
            ]
        );
    }

    #[test]
    fn missing_code_uri_becomes_stack_parameters() {
        let (stack, _, function) = build(&StackConfig::default());
        assert_eq!(
            function.code.bucket,
            Value::reference("CreateUserTableLambdaCodeS3Bucket")
        );
        let template = stack.synth().unwrap();
        assert!(template.parameters.contains_key("CreateUserTableLambdaCodeS3Key"));
    }

    #[test]
    fn configured_code_uri_is_split() {
        let mut config = StackConfig::default();
        config.function.code_s3_uri = Some("s3://assets/lambda/create_user_table.zip".to_string());
        let (stack, _, function) = build(&config);
        assert_eq!(function.code.bucket, Value::str("assets"));
        assert_eq!(function.code.key, Value::str("lambda/create_user_table.zip"));
        assert!(stack.synth().unwrap().parameters.is_empty());
    }

    #[test]
    fn locked_down_function_gets_database_ingress() {
        let (stack, _, _) = build(&StackConfig::default());
        assert!(stack
            .logical_id("SC_GlueCatalogDemo/SecurityGroup/FromCreateUserTableLambda")
            .is_some());

        let (stack, _, _) = build(&StackConfig::from_profile(SecurityProfile::OpenToWorld));
        assert!(stack
            .logical_id("SC_GlueCatalogDemo/SecurityGroup/FromCreateUserTableLambda")
            .is_none());
    }

    #[test]
    fn malformed_code_uri_is_a_config_error() {
        let mut stack = Stack::new("Test");
        let err = CodeLocation::resolve(&mut stack, "Fn", Some("s3://bucket")).unwrap_err();
        assert_eq!(err.code().as_str(), "E004");
        assert!(stack.synth().unwrap().parameters.is_empty());
    }
}
