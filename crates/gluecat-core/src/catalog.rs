//! Glue Data Catalog: database, JDBC connection and crawler

use crate::database::{ClusterEndpoint, ServerlessCluster};
use crate::error::Result;
use crate::iam::{crawler_role, Role};
use crate::intrinsic::Value;
use crate::network::{
    allow_ingress, build_security_group, rule_from_anywhere, Network, PortRange, SecurityGroup,
};
use crate::props;
use crate::stack::{LogicalId, Stack};
use crate::template::Resource;
use gluecat_config::{CatalogConfig, SecurityPolicy};
use tracing::{info, warn};

pub const CONNECTION_TYPE_JDBC: &str = "JDBC";
pub const CRAWLER_ROLE_CONSTRUCT: &str = "GlueServiceRole";

/// Glue connection property keys
pub mod connection_property {
    pub const JDBC_CONNECTION_URL: &str = "JDBC_CONNECTION_URL";
    pub const JDBC_ENFORCE_SSL: &str = "JDBC_ENFORCE_SSL";
    pub const SECRET_ID: &str = "SECRET_ID";
}

pub fn connection_name(name: &str) -> String {
    format!("{}Connection", name)
}

/// `jdbc:mysql://<host>:<port>`, without a database suffix
pub fn jdbc_url(endpoint: &ClusterEndpoint) -> Value {
    Value::join(
        "",
        vec![
            Value::str("jdbc:mysql://"),
            endpoint.hostname.clone(),
            Value::str(":"),
            endpoint.port.clone(),
        ],
    )
}

/// Crawler include path for every table sharing `prefix`
pub fn jdbc_target_path(database_name: &str, prefix: &str) -> String {
    format!("{}/{}%", database_name, prefix)
}

#[derive(Debug, Clone)]
pub struct CatalogDatabase {
    pub id: LogicalId,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct CatalogConnection {
    pub id: LogicalId,
    pub name: String,
    pub security_group: SecurityGroup,
    pub enforce_ssl: bool,
}

#[derive(Debug, Clone)]
pub struct Crawler {
    pub id: LogicalId,
    pub name: String,
    pub role: Role,
    pub path: String,
}

pub fn build_catalog_database(
    stack: &mut Stack,
    name: &str,
    config: &CatalogConfig,
) -> Result<CatalogDatabase> {
    let id = stack.add(
        &format!("{}CfnDatabase", name),
        Resource::new("AWS::Glue::Database").properties(props! {
            "CatalogId" => Value::account_id(),
            "DatabaseInput" => props! {
                "Name" => config.database_name.clone(),
            },
        }),
    )?;
    info!(database = %config.database_name, "Built catalog database");
    Ok(CatalogDatabase {
        id,
        name: config.database_name.clone(),
    })
}

pub fn build_connection(
    stack: &mut Stack,
    network: &Network,
    cluster: &ServerlessCluster,
    name: &str,
    policy: &SecurityPolicy,
) -> Result<CatalogConnection> {
    let construct_id = format!("{}CfnConnection", name);
    let connection_name = connection_name(name);

    let security_group = if policy.open_connection_traffic {
        warn!(connection = %connection_name, "Opening connection traffic to 0.0.0.0/0");
        build_security_group(
            stack,
            network,
            &format!("{}/SecurityGroup", construct_id),
            &format!("Security group for {}", connection_name),
            vec![rule_from_anywhere(
                PortRange::all_traffic(),
                "All traffic from anywhere",
            )],
        )?
    } else {
        let group = build_security_group(
            stack,
            network,
            &format!("{}/SecurityGroup", construct_id),
            &format!("Security group for {}", connection_name),
            Vec::new(),
        )?;
        // Glue workers talk to each other through the connection's group
        allow_ingress(
            stack,
            &format!("{}/SecurityGroup/FromSelf", construct_id),
            &group,
            &group,
            PortRange::all_tcp(),
            "Glue workers within the connection",
        )?;
        group
    };
    if !policy.open_cluster_port {
        cluster.allow_from(stack, &security_group, "GlueConnection")?;
    }

    if !policy.enforce_ssl {
        warn!(connection = %connection_name, "JDBC connection does not enforce SSL");
    }

    let subnet = network.first_private_subnet();
    let id = stack.add(
        &construct_id,
        Resource::new("AWS::Glue::Connection").properties(props! {
            "CatalogId" => Value::account_id(),
            "ConnectionInput" => props! {
                "Name" => connection_name.clone(),
                "Description" => format!("JDBC connection to {}", cluster.construct_id),
                "ConnectionType" => CONNECTION_TYPE_JDBC,
                "ConnectionProperties" => props! {
                    connection_property::JDBC_CONNECTION_URL => jdbc_url(&cluster.endpoint()),
                    connection_property::JDBC_ENFORCE_SSL => if policy.enforce_ssl { "true" } else { "false" },
                    connection_property::SECRET_ID => cluster.secret.secret_name(),
                },
                "PhysicalConnectionRequirements" => props! {
                    "AvailabilityZone" => subnet.availability_zone.clone(),
                    "SubnetId" => subnet.subnet_id(),
                    "SecurityGroupIdList" => vec![security_group.group_id()],
                },
            },
        }),
    )?;
    info!(connection = %connection_name, enforce_ssl = policy.enforce_ssl, "Built catalog connection");

    Ok(CatalogConnection {
        id,
        name: connection_name,
        security_group,
        enforce_ssl: policy.enforce_ssl,
    })
}

pub fn build_crawler(
    stack: &mut Stack,
    database: &CatalogDatabase,
    connection: &CatalogConnection,
    cluster: &ServerlessCluster,
    config: &CatalogConfig,
) -> Result<Crawler> {
    let role = crawler_role(stack, CRAWLER_ROLE_CONSTRUCT, cluster.secret.arn())?;

    let path = jdbc_target_path(&cluster.database_name, &config.table_prefix);
    let mut properties = props! {
        "Name" => config.crawler_name.clone(),
        "Role" => role.arn(),
        "DatabaseName" => database.id.reference(),
        "Targets" => props! {
            "JdbcTargets" => vec![Value::from(props! {
                "ConnectionName" => connection.id.reference(),
                "Path" => path.clone(),
                "Exclusions" => Vec::<Value>::new(),
            })],
        },
        "SchemaChangePolicy" => props! {
            "UpdateBehavior" => "UPDATE_IN_DATABASE",
            "DeleteBehavior" => "DEPRECATE_IN_DATABASE",
        },
    };
    if let Some(schedule) = &config.crawler_schedule {
        properties.insert(
            "Schedule".to_string(),
            Value::from(props! { "ScheduleExpression" => schedule.clone() }),
        );
    }

    let mut resource = Resource::new("AWS::Glue::Crawler").properties(properties);
    if let Some(policy_id) = &role.policy {
        resource = resource.depends_on(policy_id);
    }
    let id = stack.add(&config.crawler_name, resource)?;
    info!(crawler = %config.crawler_name, path = %path, "Built crawler");

    Ok(Crawler {
        id,
        name: config.crawler_name.clone(),
        role,
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::build_serverless_cluster;
    use crate::network::build_vpc;
    use gluecat_config::{SecurityProfile, StackConfig};

    struct Built {
        stack: Stack,
        database: CatalogDatabase,
        connection: CatalogConnection,
        crawler: Crawler,
    }

    fn build(config: &StackConfig) -> Built {
        let policy = config.security.policy();
        let name = config.stack.name.as_str();
        let mut stack = Stack::new("GlueCatalogDemoStack");
        let network = build_vpc(&mut stack, &config.network).unwrap();
        let cluster =
            build_serverless_cluster(&mut stack, &network, name, &config.database, &policy)
                .unwrap();
        let database = build_catalog_database(&mut stack, name, &config.catalog).unwrap();
        let connection = build_connection(&mut stack, &network, &cluster, name, &policy).unwrap();
        let crawler =
            build_crawler(&mut stack, &database, &connection, &cluster, &config.catalog).unwrap();
        Built {
            stack,
            database,
            connection,
            crawler,
        }
    }

    fn connection_properties(built: &Built) -> Value {
        built
            .stack
            .resource(&built.connection.id)
            .and_then(|r| r.prop("ConnectionInput"))
            .and_then(|input| input.get("ConnectionProperties"))
            .cloned()
            .unwrap()
    }

    #[test]
    fn jdbc_url_has_no_database_suffix() {
        let endpoint = ClusterEndpoint {
            hostname: Value::str("demo.cluster.local"),
            port: Value::from(3306u16),
        };
        assert_eq!(
            jdbc_url(&endpoint).literal().as_deref(),
            Some("jdbc:mysql://demo.cluster.local:3306")
        );
    }

    #[test]
    fn names_follow_stack_name() {
        let built = build(&StackConfig::default());
        assert_eq!(built.connection.name, "GlueCatalogDemoConnection");
        assert_eq!(built.database.name, "gule_catalog_demo_db");
        assert_eq!(built.crawler.path, "GlueCatalogDemo/user%");
    }

    #[test]
    fn crawler_references_database_and_connection() {
        let built = build(&StackConfig::default());
        let crawler = built.stack.resource(&built.crawler.id).unwrap();
        assert_eq!(
            crawler.prop("DatabaseName"),
            Some(&built.database.id.reference())
        );
        let target = crawler
            .prop("Targets")
            .and_then(|t| t.get("JdbcTargets"))
            .and_then(Value::as_list)
            .and_then(|targets| targets.first())
            .unwrap();
        assert_eq!(
            target.get("ConnectionName"),
            Some(&built.connection.id.reference())
        );
        assert!(crawler.prop("Schedule").is_none());
    }

    #[test]
    fn locked_down_connection_enforces_ssl() {
        let built = build(&StackConfig::default());
        let properties = connection_properties(&built);
        assert_eq!(
            properties.get("JDBC_ENFORCE_SSL"),
            Some(&Value::str("true"))
        );
        assert_eq!(
            properties.get("SECRET_ID"),
            Some(&Value::str("GlueCatalogDemoStack/SC_GlueCatalogDemo"))
        );
        let group = built
            .stack
            .resource(&built.connection.security_group.id)
            .unwrap();
        assert!(group.prop("SecurityGroupIngress").is_none());
        assert!(built
            .stack
            .logical_id("GlueCatalogDemoCfnConnection/SecurityGroup/FromSelf")
            .is_some());
    }

    #[test]
    fn open_connection_admits_all_traffic() {
        let built = build(&StackConfig::from_profile(SecurityProfile::OpenToWorld));
        let properties = connection_properties(&built);
        assert_eq!(
            properties.get("JDBC_ENFORCE_SSL"),
            Some(&Value::str("false"))
        );
        let group = built
            .stack
            .resource(&built.connection.security_group.id)
            .unwrap();
        let ingress = group
            .prop("SecurityGroupIngress")
            .and_then(Value::as_list)
            .unwrap();
        assert_eq!(ingress[0].get("IpProtocol"), Some(&Value::str("-1")));
        assert_eq!(ingress[0].get("CidrIp"), Some(&Value::str("0.0.0.0/0")));
    }

    #[test]
    fn crawler_schedule_is_optional() {
        let mut config = StackConfig::default();
        config.catalog.crawler_schedule = Some("cron(0 3 * * ? *)".to_string());
        let built = build(&config);
        let crawler = built.stack.resource(&built.crawler.id).unwrap();
        assert_eq!(
            crawler
                .prop("Schedule")
                .and_then(|s| s.get("ScheduleExpression")),
            Some(&Value::str("cron(0 3 * * ? *)"))
        );
        assert!(built.stack.synth().is_ok());
    }
}
