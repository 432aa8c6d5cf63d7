// Integration tests for gluecat-core
//
// Synthesizes the full demo stack and checks the encoded template the way
// CloudFormation will see it.

use anyhow::Result;
use gluecat_config::{SecurityProfile, StackConfig};
use gluecat_core::verify::checks;
use gluecat_core::{verify, Expectations, GlueCatalogStack, Template, TemplateFormat, Value};
use serde_json::json;

fn synth(profile: SecurityProfile) -> Result<Template> {
    Ok(GlueCatalogStack::synthesize(&StackConfig::from_profile(
        profile,
    ))?)
}

fn encoded_json(template: &Template) -> Result<serde_json::Value> {
    let encoded = template.encode(TemplateFormat::Json)?;
    Ok(serde_json::from_str(&encoded)?)
}

#[test]
fn test_scenario_names() -> Result<()> {
    let template = synth(SecurityProfile::LockedDown)?;

    let cluster = template
        .resource("SCGlueCatalogDemo")
        .expect("cluster registered");
    assert_eq!(cluster.resource_type, "AWS::RDS::DBCluster");
    assert_eq!(cluster.path(), Some("GlueCatalogDemoStack/SC_GlueCatalogDemo"));
    assert_eq!(
        cluster.prop("DatabaseName"),
        Some(&Value::str("GlueCatalogDemo"))
    );

    let connection = template
        .resource("GlueCatalogDemoCfnConnection")
        .expect("connection registered");
    assert_eq!(
        connection
            .prop("ConnectionInput")
            .and_then(|input| input.get("Name")),
        Some(&Value::str("GlueCatalogDemoConnection"))
    );

    let database = template
        .resource("GlueCatalogDemoCfnDatabase")
        .expect("catalog database registered");
    assert_eq!(
        database
            .prop("DatabaseInput")
            .and_then(|input| input.get("Name")),
        Some(&Value::str("gule_catalog_demo_db"))
    );
    Ok(())
}

#[test]
fn test_function_environment_and_layer() -> Result<()> {
    let json = encoded_json(&synth(SecurityProfile::LockedDown)?)?;
    let function = &json["Resources"]["CreateUserTableLambda"];

    assert_eq!(function["Type"], "AWS::Lambda::Function");
    assert_eq!(function["Properties"]["Timeout"], 30);
    assert_eq!(function["Properties"]["Runtime"], "python3.8");
    assert_eq!(
        function["Properties"]["Environment"]["Variables"]["DB_SECRET_ARN_GlueCatalogDemo"],
        json!({"Ref": "SCGlueCatalogDemoSecretAttachment"})
    );
    assert_eq!(
        function["Properties"]["Environment"]["Variables"]["DB_CLUSTER_ARN"],
        json!({"Fn::Sub": "arn:${AWS::Partition}:rds:${AWS::Region}:${AWS::AccountId}:cluster:${SCGlueCatalogDemo}"})
    );
    assert_eq!(
        function["Properties"]["Layers"],
        json!(["arn:aws:lambda:ap-northeast-1:770693421928:layer:Klayers-p38-PyMySQL:1"])
    );
    assert_eq!(
        function["Properties"]["Code"]["S3Bucket"],
        json!({"Ref": "CreateUserTableLambdaCodeS3Bucket"})
    );
    Ok(())
}

#[test]
fn test_jdbc_url_is_joined_endpoint() -> Result<()> {
    let json = encoded_json(&synth(SecurityProfile::LockedDown)?)?;
    let url = &json["Resources"]["GlueCatalogDemoCfnConnection"]["Properties"]["ConnectionInput"]
        ["ConnectionProperties"]["JDBC_CONNECTION_URL"];
    assert_eq!(
        url,
        &json!({"Fn::Join": ["", [
            "jdbc:mysql://",
            {"Fn::GetAtt": ["SCGlueCatalogDemo", "Endpoint.Address"]},
            ":",
            {"Fn::GetAtt": ["SCGlueCatalogDemo", "Endpoint.Port"]}
        ]]})
    );
    Ok(())
}

#[test]
fn test_cluster_deleted_in_every_profile() -> Result<()> {
    for profile in [SecurityProfile::LockedDown, SecurityProfile::OpenToWorld] {
        let json = encoded_json(&synth(profile)?)?;
        let cluster = &json["Resources"]["SCGlueCatalogDemo"];
        assert_eq!(cluster["DeletionPolicy"], "Delete", "{}", profile);
        assert_eq!(cluster["UpdateReplacePolicy"], "Delete", "{}", profile);
    }
    Ok(())
}

#[test]
fn test_regeneration_is_deterministic() -> Result<()> {
    let first = synth(SecurityProfile::LockedDown)?.encode(TemplateFormat::Json)?;
    let second = synth(SecurityProfile::LockedDown)?.encode(TemplateFormat::Json)?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn test_decoded_templates_verify_clean() -> Result<()> {
    for format in [TemplateFormat::Json, TemplateFormat::Yaml] {
        let template = synth(SecurityProfile::LockedDown)?;
        let decoded = Template::decode(&template.encode(format)?, format)?;
        assert_eq!(decoded, template);

        let report = verify(&decoded, &Expectations::default());
        assert!(!report.has_errors(), "{:?}", report.findings);
    }
    Ok(())
}

#[test]
fn test_open_profile_reports_warnings() -> Result<()> {
    let template = synth(SecurityProfile::OpenToWorld)?;
    let report = verify(&template, &Expectations::default());

    assert!(!report.has_errors());
    assert!(report.for_check(checks::OPEN_INGRESS).count() > 0);
    assert!(report.for_check(checks::SSL).count() > 0);
    Ok(())
}

#[test]
fn test_configured_code_location_removes_parameters() -> Result<()> {
    let config = StackConfig::load_with_env(
        Some(
            r#"
[function]
code_s3_uri = "s3://gluecat-assets/create_user_table.zip"
"#,
        ),
        &std::collections::HashMap::<String, String>::new(),
    )?;
    let json = encoded_json(&GlueCatalogStack::synthesize(&config)?)?;
    assert!(json.get("Parameters").is_none());
    assert_eq!(
        json["Resources"]["CreateUserTableLambda"]["Properties"]["Code"],
        json!({"S3Bucket": "gluecat-assets", "S3Key": "create_user_table.zip"})
    );
    Ok(())
}

#[test]
fn test_every_resource_records_its_path() -> Result<()> {
    let template = synth(SecurityProfile::LockedDown)?;
    for (id, resource) in &template.resources {
        let path = resource.path().expect("path metadata");
        assert!(path.starts_with("GlueCatalogDemoStack/"), "{} -> {}", id, path);
        let sanitized: String = path["GlueCatalogDemoStack/".len()..]
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect();
        assert_eq!(&sanitized, id);
    }
    Ok(())
}
