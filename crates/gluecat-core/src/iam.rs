//! IAM roles and policy statements
//!
//! A role is registered as an `AWS::IAM::Role` plus, when it carries inline
//! statements, an `AWS::IAM::Policy` named `<role>/DefaultPolicy`.

use crate::error::Result;
use crate::intrinsic::{pseudo, Value};
use crate::props;
use crate::stack::{LogicalId, Stack};
use crate::template::Resource;
use gluecat_config::GrantScope;
use tracing::debug;

pub const POLICY_VERSION: &str = "2012-10-17";

/// Secret read grant shared by every role touching the cluster credentials
pub const SECRET_READ_ACTIONS: &[&str] = &["secretsmanager:GetSecretValue"];

/// RDS Data API plus the secret lookups it performs on the caller's behalf
pub const DATA_API_ACTIONS: &[&str] = &[
    "rds-data:ExecuteStatement",
    "rds-data:BatchExecuteStatement",
    "rds-data:BeginTransaction",
    "rds-data:CommitTransaction",
    "rds-data:RollbackTransaction",
    "secretsmanager:GetResourcePolicy",
    "secretsmanager:GetSecretValue",
    "secretsmanager:DescribeSecret",
];

/// ENI lifecycle needed by a VPC-attached function. EC2 does not support
/// resource-level scoping for these, so they always target `*`.
pub const NETWORK_INTERFACE_ACTIONS: &[&str] = &[
    "ec2:CreateNetworkInterface",
    "ec2:DescribeNetworkInterfaces",
    "ec2:DeleteNetworkInterface",
];

pub const LAMBDA_PRINCIPAL: &str = "lambda.amazonaws.com";
pub const GLUE_PRINCIPAL: &str = "glue.amazonaws.com";
pub const GLUE_SERVICE_POLICY: &str = "service-role/AWSGlueServiceRole";

/// An `Allow` statement
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyStatement {
    pub actions: Vec<String>,
    pub resources: Vec<Value>,
}

impl PolicyStatement {
    pub fn allow(actions: &[&str], resources: Vec<Value>) -> Self {
        Self {
            actions: actions.iter().map(|a| a.to_string()).collect(),
            resources,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.resources.iter().any(|r| r.as_str() == Some("*"))
    }

    pub fn to_value(&self) -> Value {
        let action = match self.actions.as_slice() {
            [single] => Value::str(single),
            _ => Value::from(self.actions.clone()),
        };
        let resource = match self.resources.as_slice() {
            [single] => single.clone(),
            _ => Value::List(self.resources.clone()),
        };
        Value::from(props! {
            "Action" => action,
            "Effect" => "Allow",
            "Resource" => resource,
        })
    }
}

/// Read access to one secret
pub fn secret_read_statement(secret_arn: Value) -> PolicyStatement {
    PolicyStatement::allow(SECRET_READ_ACTIONS, vec![secret_arn])
}

/// Statements for a function that talks to the cluster through the Data API
/// from inside the VPC.
pub fn function_statements(
    secret_arn: &Value,
    cluster_arn: &Value,
    scope: GrantScope,
) -> Vec<PolicyStatement> {
    let data_api_resources = match scope {
        GrantScope::Scoped => vec![cluster_arn.clone(), secret_arn.clone()],
        GrantScope::Broad => vec![Value::str("*")],
    };
    vec![
        secret_read_statement(secret_arn.clone()),
        PolicyStatement::allow(DATA_API_ACTIONS, data_api_resources),
        PolicyStatement::allow(NETWORK_INTERFACE_ACTIONS, vec![Value::str("*")]),
    ]
}

/// AWS managed policy ARN, partition-aware
pub fn managed_policy_arn(name: &str) -> Value {
    Value::sub(format!(
        "arn:${{{}}}:iam::aws:policy/{}",
        pseudo::PARTITION,
        name
    ))
}

/// Immutable descriptor of a registered role
#[derive(Debug, Clone)]
pub struct Role {
    pub id: LogicalId,
    pub policy: Option<LogicalId>,
    pub principal: String,
    pub statements: Vec<PolicyStatement>,
}

impl Role {
    pub fn arn(&self) -> Value {
        self.id.get_att("Arn")
    }
}

pub fn build_role(
    stack: &mut Stack,
    construct_id: &str,
    principal: &str,
    managed_policy_arns: Vec<Value>,
    statements: Vec<PolicyStatement>,
) -> Result<Role> {
    let assume = props! {
        "Version" => POLICY_VERSION,
        "Statement" => vec![Value::from(props! {
            "Action" => "sts:AssumeRole",
            "Effect" => "Allow",
            "Principal" => props! { "Service" => principal },
        })],
    };

    let mut role = Resource::new("AWS::IAM::Role").property("AssumeRolePolicyDocument", assume);
    if !managed_policy_arns.is_empty() {
        role = role.property("ManagedPolicyArns", managed_policy_arns);
    }
    let id = stack.add(construct_id, role)?;

    let policy = if statements.is_empty() {
        None
    } else {
        let policy_construct = format!("{}/DefaultPolicy", construct_id);
        let policy_name = crate::stack::logical_id_for(&policy_construct)?;
        let document = props! {
            "Version" => POLICY_VERSION,
            "Statement" => statements.iter().map(PolicyStatement::to_value).collect::<Vec<_>>(),
        };
        Some(stack.add(
            &policy_construct,
            Resource::new("AWS::IAM::Policy").properties(props! {
                "PolicyDocument" => document,
                "PolicyName" => policy_name,
                "Roles" => vec![id.reference()],
            }),
        )?)
    };

    debug!(
        role = %id,
        principal,
        statements = statements.len(),
        "Built role"
    );

    Ok(Role {
        id,
        policy,
        principal: principal.to_string(),
        statements,
    })
}

/// Role for a VPC-attached function using the cluster through the Data API
pub fn function_role(
    stack: &mut Stack,
    construct_id: &str,
    secret_arn: &Value,
    cluster_arn: &Value,
    scope: GrantScope,
) -> Result<Role> {
    build_role(
        stack,
        construct_id,
        LAMBDA_PRINCIPAL,
        Vec::new(),
        function_statements(secret_arn, cluster_arn, scope),
    )
}

/// Glue service role that can also read the cluster secret
pub fn crawler_role(stack: &mut Stack, construct_id: &str, secret_arn: Value) -> Result<Role> {
    build_role(
        stack,
        construct_id,
        GLUE_PRINCIPAL,
        vec![managed_policy_arn(GLUE_SERVICE_POLICY)],
        vec![secret_read_statement(secret_arn)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scoped_function_statements_name_cluster_and_secret() {
        let secret = Value::reference("Secret");
        let cluster = Value::sub("arn:${AWS::Partition}:rds:${AWS::Region}:${AWS::AccountId}:cluster:${Cluster}");
        let statements = function_statements(&secret, &cluster, GrantScope::Scoped);

        assert_eq!(statements.len(), 3);
        assert!(!statements[0].is_wildcard());
        assert_eq!(statements[1].resources, vec![cluster, secret]);
        // ENI actions cannot be scoped
        assert!(statements[2].is_wildcard());
    }

    #[test]
    fn broad_function_statements_use_wildcards() {
        let statements = function_statements(
            &Value::reference("Secret"),
            &Value::reference("Cluster"),
            GrantScope::Broad,
        );
        assert!(statements[1].is_wildcard());
        assert_eq!(statements[0].resources, vec![Value::reference("Secret")]);
    }

    #[test]
    fn statement_collapses_single_action_and_resource() {
        let statement = secret_read_statement(Value::reference("Secret"));
        assert_eq!(
            serde_json::to_value(statement.to_value()).unwrap(),
            json!({
                "Action": "secretsmanager:GetSecretValue",
                "Effect": "Allow",
                "Resource": {"Ref": "Secret"},
            })
        );
    }

    #[test]
    fn role_without_statements_has_no_policy() {
        let mut stack = Stack::new("Test");
        let role = build_role(
            &mut stack,
            "GlueServiceRole",
            GLUE_PRINCIPAL,
            vec![managed_policy_arn(GLUE_SERVICE_POLICY)],
            Vec::new(),
        )
        .unwrap();
        assert!(role.policy.is_none());
        assert_eq!(role.arn(), Value::get_att("GlueServiceRole", "Arn"));
    }

    #[test]
    fn crawler_role_reads_only_the_secret() {
        let mut stack = Stack::new("Test");
        let role = crawler_role(&mut stack, "GlueServiceRole", Value::reference("Secret")).unwrap();
        assert_eq!(role.principal, GLUE_PRINCIPAL);
        assert_eq!(role.statements, vec![secret_read_statement(Value::reference("Secret"))]);
        let resource = stack.resource(&role.id).unwrap();
        assert_eq!(
            resource.prop("ManagedPolicyArns"),
            Some(&Value::List(vec![managed_policy_arn(GLUE_SERVICE_POLICY)]))
        );
    }

    #[test]
    fn role_policy_is_attached_by_reference() {
        let mut stack = Stack::new("Test");
        let role = build_role(
            &mut stack,
            "FunctionRole",
            LAMBDA_PRINCIPAL,
            Vec::new(),
            vec![secret_read_statement(Value::str("arn:aws:secretsmanager:::secret:x"))],
        )
        .unwrap();
        let policy_id = role.policy.clone().unwrap();
        assert_eq!(policy_id.as_str(), "FunctionRoleDefaultPolicy");

        let policy = stack.resource(&policy_id).unwrap();
        assert_eq!(
            policy.prop("Roles"),
            Some(&Value::List(vec![Value::reference("FunctionRole")]))
        );
        assert!(stack.synth().is_ok());
    }

    #[test]
    fn managed_policy_arn_is_partition_aware() {
        assert_eq!(
            managed_policy_arn("service-role/AWSGlueServiceRole"),
            Value::sub("arn:${AWS::Partition}:iam::aws:policy/service-role/AWSGlueServiceRole")
        );
    }
}
