//! Template verification
//!
//! Checks a synthesized (or decoded) template for the properties the demo
//! stack must hold: least-privilege function grants, cluster scaling and
//! removal policy, secret rotation, the JDBC URL shape, and crawler
//! references that resolve inside the same template. Open ingress, disabled
//! SSL and wildcard resources are reported as warnings.

use crate::database::ROTATION_TRANSFORM;
use crate::iam::{DATA_API_ACTIONS, NETWORK_INTERFACE_ACTIONS, SECRET_READ_ACTIONS};
use crate::intrinsic::Value;
use crate::network::ANYWHERE;
use crate::template::{RemovalPolicy, Resource, Template};
use gluecat_config::{StackConfig, MAX_CAPACITY_CEILING};
use std::fmt;
use tracing::debug;

const JDBC_MYSQL_PREFIX: &str = "jdbc:mysql://";

/// Resource types whose `Roles` list attaches a policy document
const POLICY_TYPES: [&str; 2] = ["AWS::IAM::Policy", "AWS::IAM::ManagedPolicy"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub severity: Severity,
    pub check: &'static str,
    pub resource: String,
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.severity, self.check, self.resource, self.message
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct Report {
    pub findings: Vec<Finding>,
}

impl Report {
    fn error(&mut self, check: &'static str, resource: &str, message: impl Into<String>) {
        self.push(Severity::Error, check, resource, message.into());
    }

    fn warning(&mut self, check: &'static str, resource: &str, message: impl Into<String>) {
        self.push(Severity::Warning, check, resource, message.into());
    }

    fn push(&mut self, severity: Severity, check: &'static str, resource: &str, message: String) {
        debug!(%severity, check, resource, %message, "Verification finding");
        self.findings.push(Finding {
            severity,
            check,
            resource: resource.to_string(),
            message,
        });
    }

    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    /// Findings produced by one check
    pub fn for_check<'a>(&'a self, check: &'a str) -> impl Iterator<Item = &'a Finding> + 'a {
        self.findings.iter().filter(move |f| f.check == check)
    }
}

/// Values the template is expected to carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expectations {
    pub min_capacity_floor: u32,
    pub max_capacity_ceiling: u32,
    pub auto_pause_secs: u32,
    pub rotation_days: u32,
}

impl Default for Expectations {
    fn default() -> Self {
        Self {
            min_capacity_floor: 1,
            max_capacity_ceiling: MAX_CAPACITY_CEILING,
            auto_pause_secs: 300,
            rotation_days: 30,
        }
    }
}

impl From<&StackConfig> for Expectations {
    fn from(config: &StackConfig) -> Self {
        Self {
            auto_pause_secs: config.database.auto_pause_secs(),
            rotation_days: config.database.rotation_days,
            ..Self::default()
        }
    }
}

pub mod checks {
    pub const FUNCTION_GRANTS: &str = "function-grants";
    pub const CLUSTER_SCALING: &str = "cluster-scaling";
    pub const CLUSTER_REMOVAL: &str = "cluster-removal";
    pub const SECRET_ROTATION: &str = "secret-rotation";
    pub const JDBC_URL: &str = "jdbc-url";
    pub const CRAWLER_REFERENCES: &str = "crawler-references";
    pub const OPEN_INGRESS: &str = "open-ingress";
    pub const SSL: &str = "ssl";
    pub const WILDCARD_RESOURCE: &str = "wildcard-resource";
}

pub fn verify(template: &Template, expectations: &Expectations) -> Report {
    let mut report = Report::default();
    check_function_grants(template, &mut report);
    check_clusters(template, expectations, &mut report);
    check_rotation(template, expectations, &mut report);
    check_connections(template, &mut report);
    check_crawlers(template, &mut report);
    check_ingress(template, &mut report);
    check_wildcards(template, &mut report);
    debug!(
        findings = report.findings.len(),
        errors = report.errors().count(),
        "Verified template"
    );
    report
}

/// Strings from a value that is either one string or a list of them
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::List(items)) => items.iter().filter_map(Value::literal).collect(),
        Some(other) => other.literal().into_iter().collect(),
        None => Vec::new(),
    }
}

fn document_statements(document: Option<&Value>) -> Vec<&Value> {
    document
        .and_then(|doc| doc.get("Statement"))
        .map(|statement| match statement {
            Value::List(items) => items.iter().collect(),
            single => vec![single],
        })
        .unwrap_or_default()
}

fn statements(policy: &Resource) -> Vec<&Value> {
    document_statements(policy.prop("PolicyDocument"))
}

/// Statements embedded in a role's own `Policies`, labelled by role and policy name
fn embedded_statements<'a>(role_id: &str, role: &'a Resource) -> Vec<(String, &'a Value)> {
    let policies = role
        .prop("Policies")
        .and_then(Value::as_list)
        .unwrap_or_default();
    policies
        .iter()
        .flat_map(|policy| {
            let label = match policy.get("PolicyName").and_then(Value::literal) {
                Some(name) => format!("{} policy {}", role_id, name),
                None => format!("{} inline policy", role_id),
            };
            document_statements(policy.get("PolicyDocument"))
                .into_iter()
                .map(move |statement| (label.clone(), statement))
        })
        .collect()
}

/// Every statement reaching `role_id`: its embedded policies plus standalone
/// policies that list it under `Roles` by `Ref` or by its `RoleName`.
fn role_statements<'a>(
    template: &'a Template,
    role_id: &str,
    role: &'a Resource,
) -> Vec<(String, &'a Value)> {
    let mut found = embedded_statements(role_id, role);
    let role_name = role.prop("RoleName").and_then(Value::literal);
    for resource_type in POLICY_TYPES {
        for (policy_id, policy) in template.resources_of_type(resource_type) {
            let attached = policy
                .prop("Roles")
                .and_then(Value::as_list)
                .unwrap_or_default()
                .iter()
                .any(|entry| {
                    entry.ref_target() == Some(role_id)
                        || (role_name.is_some() && entry.literal() == role_name)
                });
            if attached {
                found.extend(
                    statements(policy)
                        .into_iter()
                        .map(|statement| (policy_id.to_string(), statement)),
                );
            }
        }
    }
    found
}

fn is_deny(statement: &Value) -> bool {
    statement.get("Effect").and_then(Value::as_str) == Some("Deny")
}

fn check_function_grants(template: &Template, report: &mut Report) {
    let allowed: Vec<&str> = SECRET_READ_ACTIONS
        .iter()
        .chain(DATA_API_ACTIONS)
        .chain(NETWORK_INTERFACE_ACTIONS)
        .copied()
        .collect();

    for (id, function) in template.resources_of_type("AWS::Lambda::Function") {
        let role = match function.prop("Role") {
            Some(Value::GetAtt(role, _)) if template.is_resource_of_type(role, "AWS::IAM::Role") => {
                role.as_str()
            }
            _ => {
                report.error(checks::FUNCTION_GRANTS, id, "role is not a role in this template");
                continue;
            }
        };
        let Some(role_resource) = template.resource(role) else {
            continue;
        };
        if let Some(arns) = role_resource.prop("ManagedPolicyArns").and_then(Value::as_list) {
            if !arns.is_empty() {
                report.error(
                    checks::FUNCTION_GRANTS,
                    id,
                    format!("role {} carries managed policies", role),
                );
            }
        }
        for (source, statement) in role_statements(template, role, role_resource) {
            if is_deny(statement) {
                continue;
            }
            for action in string_list(statement.get("Action")) {
                if !allowed.contains(&action.as_str()) {
                    report.error(
                        checks::FUNCTION_GRANTS,
                        id,
                        format!("{} grants unexpected action {}", source, action),
                    );
                }
            }
        }
    }
}

fn check_clusters(template: &Template, expectations: &Expectations, report: &mut Report) {
    for (id, cluster) in template.resources_of_type("AWS::RDS::DBCluster") {
        if cluster.deletion_policy != Some(RemovalPolicy::Destroy) {
            report.error(
                checks::CLUSTER_REMOVAL,
                id,
                "cluster must be deleted with the stack (DeletionPolicy: Delete)",
            );
        }

        let Some(scaling) = cluster.prop("ScalingConfiguration") else {
            report.error(checks::CLUSTER_SCALING, id, "missing ScalingConfiguration");
            continue;
        };
        let min = scaling.get("MinCapacity").and_then(Value::as_i64);
        let max = scaling.get("MaxCapacity").and_then(Value::as_i64);
        match (min, max) {
            (Some(min), Some(max))
                if i64::from(expectations.min_capacity_floor) <= min
                    && min <= max
                    && max <= i64::from(expectations.max_capacity_ceiling) => {}
            (min, max) => report.error(
                checks::CLUSTER_SCALING,
                id,
                format!(
                    "capacity must satisfy {} <= min <= max <= {} (min {:?}, max {:?})",
                    expectations.min_capacity_floor, expectations.max_capacity_ceiling, min, max
                ),
            ),
        }

        let auto_pause = scaling.get("SecondsUntilAutoPause").and_then(Value::as_i64);
        if auto_pause != Some(i64::from(expectations.auto_pause_secs)) {
            report.error(
                checks::CLUSTER_SCALING,
                id,
                format!(
                    "auto-pause must be {}s, found {:?}",
                    expectations.auto_pause_secs, auto_pause
                ),
            );
        }
    }
}

fn check_rotation(template: &Template, expectations: &Expectations, report: &mut Report) {
    let mut schedules = 0;
    for (id, schedule) in template.resources_of_type("AWS::SecretsManager::RotationSchedule") {
        schedules += 1;
        let days = schedule
            .prop("RotationRules")
            .and_then(|rules| rules.get("AutomaticallyAfterDays"))
            .and_then(Value::as_i64);
        if days != Some(i64::from(expectations.rotation_days)) {
            report.error(
                checks::SECRET_ROTATION,
                id,
                format!(
                    "rotation must run every {} days, found {:?}",
                    expectations.rotation_days, days
                ),
            );
        }
        if schedule.prop("HostedRotationLambda").is_some()
            && !template.transforms.iter().any(|t| t == ROTATION_TRANSFORM)
        {
            report.error(
                checks::SECRET_ROTATION,
                id,
                format!("hosted rotation requires the {} transform", ROTATION_TRANSFORM),
            );
        }
    }
    if schedules == 0 {
        for (id, _) in template.resources_of_type("AWS::RDS::DBCluster") {
            report.error(checks::SECRET_ROTATION, id, "cluster secret is never rotated");
        }
    }
}

fn is_host(host: &str) -> bool {
    !host.is_empty() && !host.contains(['/', ':', '?'])
}

fn is_port(port: &str) -> bool {
    !port.is_empty() && port.chars().all(|c| c.is_ascii_digit())
}

fn is_host_part(part: &Value) -> bool {
    match part {
        Value::GetAtt(_, attribute) => attribute == "Endpoint.Address",
        other => other.as_str().is_some_and(is_host),
    }
}

fn is_port_part(part: &Value) -> bool {
    match part {
        Value::GetAtt(_, attribute) => attribute == "Endpoint.Port",
        Value::Number(n) => n.is_u64(),
        other => other.as_str().is_some_and(is_port),
    }
}

/// Accepts `jdbc:mysql://<host>:<port>` as a literal or as the equivalent
/// four-part join over endpoint attributes.
fn check_jdbc_url(url: &Value) -> Result<(), String> {
    if let Some(literal) = url.literal() {
        let rest = literal
            .strip_prefix(JDBC_MYSQL_PREFIX)
            .ok_or_else(|| format!("{} does not start with {}", literal, JDBC_MYSQL_PREFIX))?;
        return match rest.rsplit_once(':') {
            Some((host, port)) if is_host(host) && is_port(port) => Ok(()),
            _ => Err(format!("{} is not of the form {}host:port", literal, JDBC_MYSQL_PREFIX)),
        };
    }
    match url {
        Value::Join(separator, parts)
            if separator.is_empty()
                && parts.len() == 4
                && parts[0].as_str() == Some(JDBC_MYSQL_PREFIX)
                && is_host_part(&parts[1])
                && parts[2].as_str() == Some(":")
                && is_port_part(&parts[3]) =>
        {
            Ok(())
        }
        _ => Err(format!(
            "URL must be {}host:port with nothing after the port",
            JDBC_MYSQL_PREFIX
        )),
    }
}

fn check_connections(template: &Template, report: &mut Report) {
    for (id, connection) in template.resources_of_type("AWS::Glue::Connection") {
        let properties = connection
            .prop("ConnectionInput")
            .and_then(|input| input.get("ConnectionProperties"));
        let Some(properties) = properties else {
            report.error(checks::JDBC_URL, id, "missing ConnectionProperties");
            continue;
        };

        match properties.get("JDBC_CONNECTION_URL") {
            Some(url) => {
                if let Err(message) = check_jdbc_url(url) {
                    report.error(checks::JDBC_URL, id, message);
                }
            }
            None => report.error(checks::JDBC_URL, id, "missing JDBC_CONNECTION_URL"),
        }

        let enforced = properties
            .get("JDBC_ENFORCE_SSL")
            .and_then(|v| v.as_bool().or_else(|| v.as_str().map(|s| s == "true")))
            .unwrap_or(false);
        if !enforced {
            report.warning(checks::SSL, id, "JDBC connection does not enforce SSL");
        }
    }
}

/// Does `value` name a resource of `resource_type`, by `Ref` or by its
/// literal name under `input_key.Name`?
fn refers_to(template: &Template, value: &Value, resource_type: &str, input_key: &str) -> bool {
    if let Some(target) = value.ref_target() {
        return template.is_resource_of_type(target, resource_type);
    }
    let Some(name) = value.literal() else {
        return false;
    };
    template.resources_of_type(resource_type).any(|(_, resource)| {
        resource
            .prop(input_key)
            .and_then(|input| input.get("Name"))
            .and_then(Value::literal)
            .as_deref()
            == Some(name.as_str())
    })
}

fn check_crawlers(template: &Template, report: &mut Report) {
    for (id, crawler) in template.resources_of_type("AWS::Glue::Crawler") {
        match crawler.prop("DatabaseName") {
            Some(db) if refers_to(template, db, "AWS::Glue::Database", "DatabaseInput") => {}
            _ => report.error(
                checks::CRAWLER_REFERENCES,
                id,
                "DatabaseName does not refer to a catalog database in this template",
            ),
        }

        let targets = crawler
            .prop("Targets")
            .and_then(|t| t.get("JdbcTargets"))
            .and_then(Value::as_list)
            .unwrap_or_default();
        if targets.is_empty() {
            report.error(checks::CRAWLER_REFERENCES, id, "crawler has no JDBC targets");
        }
        for target in targets {
            match target.get("ConnectionName") {
                Some(name)
                    if refers_to(template, name, "AWS::Glue::Connection", "ConnectionInput") => {}
                _ => report.error(
                    checks::CRAWLER_REFERENCES,
                    id,
                    "ConnectionName does not refer to a connection in this template",
                ),
            }
        }
    }
}

fn is_open_rule(rule: &Value) -> bool {
    rule.get("CidrIp").and_then(Value::as_str) == Some(ANYWHERE)
}

fn check_ingress(template: &Template, report: &mut Report) {
    for (id, group) in template.resources_of_type("AWS::EC2::SecurityGroup") {
        let rules = group
            .prop("SecurityGroupIngress")
            .and_then(Value::as_list)
            .unwrap_or_default();
        for rule in rules.iter().filter(|r| is_open_rule(r)) {
            let ports = match (
                rule.get("FromPort").and_then(Value::as_i64),
                rule.get("ToPort").and_then(Value::as_i64),
            ) {
                (Some(from), Some(to)) if from == to => format!("port {}", from),
                (Some(from), Some(to)) => format!("ports {}-{}", from, to),
                _ => "all traffic".to_string(),
            };
            report.warning(
                checks::OPEN_INGRESS,
                id,
                format!("{} open to {}", ports, ANYWHERE),
            );
        }
    }
    for (id, rule) in template.resources_of_type("AWS::EC2::SecurityGroupIngress") {
        if rule.prop("CidrIp").and_then(Value::as_str) == Some(ANYWHERE) {
            report.warning(checks::OPEN_INGRESS, id, format!("ingress open to {}", ANYWHERE));
        }
    }
}

fn check_wildcards(template: &Template, report: &mut Report) {
    let mut granted: Vec<(String, &Value)> = Vec::new();
    for resource_type in POLICY_TYPES {
        for (id, policy) in template.resources_of_type(resource_type) {
            granted.extend(statements(policy).into_iter().map(|s| (id.to_string(), s)));
        }
    }
    for (id, role) in template.resources_of_type("AWS::IAM::Role") {
        granted.extend(embedded_statements(id, role));
    }

    for (source, statement) in granted {
        if is_deny(statement) {
            continue;
        }
        if string_list(statement.get("Resource")).iter().any(|r| r == "*") {
            let actions = string_list(statement.get("Action")).join(", ");
            report.warning(
                checks::WILDCARD_RESOURCE,
                &source,
                format!("{} granted on all resources", actions),
            );
        }
    }
}
