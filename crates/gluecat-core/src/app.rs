//! The Glue catalog demo stack, composed from the individual builders

use crate::catalog::{
    build_catalog_database, build_connection, build_crawler, jdbc_url, CatalogConnection,
    CatalogDatabase, Crawler,
};
use crate::compute::{build_function, Function};
use crate::database::{build_serverless_cluster, ServerlessCluster};
use crate::error::Result;
use crate::network::{build_vpc, Network};
use crate::stack::Stack;
use crate::template::{Output, Template};
use gluecat_config::StackConfig;
use tracing::info;

const DEFAULT_DESCRIPTION: &str =
    "Aurora Serverless MySQL cluster crawled into the Glue Data Catalog through a JDBC connection";

/// Descriptors of everything registered for one stack
#[derive(Debug, Clone)]
pub struct GlueCatalogStack {
    pub network: Network,
    pub cluster: ServerlessCluster,
    pub function: Function,
    pub catalog_database: CatalogDatabase,
    pub connection: CatalogConnection,
    pub crawler: Crawler,
}

impl GlueCatalogStack {
    /// Register every resource on `stack`, in dependency order.
    pub fn build(stack: &mut Stack, config: &StackConfig) -> Result<Self> {
        let policy = config.security.policy();
        let name = config.stack.name.as_str();
        info!(
            stack = %stack.id(),
            name,
            profile = %policy.profile,
            "Composing Glue catalog stack"
        );

        let network = build_vpc(stack, &config.network)?;
        let cluster = build_serverless_cluster(stack, &network, name, &config.database, &policy)?;
        let function =
            build_function(stack, &network, &cluster, name, &config.function, &policy)?;
        let catalog_database = build_catalog_database(stack, name, &config.catalog)?;
        let connection = build_connection(stack, &network, &cluster, name, &policy)?;
        let crawler = build_crawler(
            stack,
            &catalog_database,
            &connection,
            &cluster,
            &config.catalog,
        )?;

        let built = Self {
            network,
            cluster,
            function,
            catalog_database,
            connection,
            crawler,
        };
        built.add_outputs(stack)?;
        Ok(built)
    }

    /// Build a fresh stack from `config` and synthesize its template.
    pub fn synthesize(config: &StackConfig) -> Result<Template> {
        let mut stack = Stack::new(&config.stack.id);
        stack.set_description(
            config
                .stack
                .description
                .clone()
                .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
        );
        Self::build(&mut stack, config)?;
        stack.synth()
    }

    fn add_outputs(&self, stack: &mut Stack) -> Result<()> {
        let endpoint = self.cluster.endpoint();
        stack.add_output(
            "ClusterEndpoint",
            Output::new(endpoint.hostname.clone(), "Cluster endpoint hostname"),
        )?;
        stack.add_output(
            "ClusterPort",
            Output::new(endpoint.port.clone(), "Cluster endpoint port"),
        )?;
        stack.add_output(
            "JdbcConnectionUrl",
            Output::new(jdbc_url(&endpoint), "JDBC URL used by the Glue connection"),
        )?;
        stack.add_output(
            "ClusterArn",
            Output::new(self.cluster.arn(), "Serverless cluster ARN"),
        )?;
        stack.add_output(
            "SecretArn",
            Output::new(self.cluster.secret.arn(), "Cluster credentials secret"),
        )?;
        stack.add_output(
            "FunctionName",
            Output::new(self.function.function_name(), "Table creation function"),
        )?;
        stack.add_output(
            "GlueDatabaseName",
            Output::new(self.catalog_database.id.reference(), "Glue catalog database"),
        )?;
        stack.add_output(
            "GlueConnectionName",
            Output::new(self.connection.id.reference(), "Glue JDBC connection"),
        )?;
        stack.add_output(
            "CrawlerName",
            Output::new(self.crawler.id.reference(), "Glue crawler"),
        )
    }
}
