//! CloudFormation template model
//!
//! The manifest handed to the provisioning engine. Serializes as JSON or
//! YAML in long-form intrinsic syntax, and decodes templates written by
//! either encoding so they can be verified from disk.

use crate::error::{Result, StackError};
use crate::intrinsic::{Properties, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

pub const FORMAT_VERSION: &str = "2010-09-09";

/// Metadata key carrying a resource's construct path
pub const PATH_METADATA_KEY: &str = "gluecat:path";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,

    #[serde(
        rename = "Description",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,

    #[serde(
        rename = "Transform",
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "one_or_many"
    )]
    pub transforms: Vec<String>,

    #[serde(
        rename = "Parameters",
        default,
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub parameters: IndexMap<String, Parameter>,

    #[serde(rename = "Resources")]
    pub resources: IndexMap<String, Resource>,

    #[serde(rename = "Outputs", default, skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, Output>,
}

/// What happens to a resource when it leaves the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovalPolicy {
    #[serde(rename = "Delete")]
    Destroy,
    Retain,
    Snapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "Type")]
    pub resource_type: String,

    #[serde(
        rename = "Properties",
        default,
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub properties: Properties,

    #[serde(
        rename = "DependsOn",
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "one_or_many"
    )]
    pub depends_on: Vec<String>,

    #[serde(
        rename = "DeletionPolicy",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub deletion_policy: Option<RemovalPolicy>,

    #[serde(
        rename = "UpdateReplacePolicy",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub update_replace_policy: Option<RemovalPolicy>,

    #[serde(rename = "Metadata", default, skip_serializing_if = "IndexMap::is_empty")]
    pub metadata: Properties,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties: Properties::new(),
            depends_on: Vec::new(),
            deletion_policy: None,
            update_replace_policy: None,
            metadata: Properties::new(),
        }
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn properties(mut self, properties: Properties) -> Self {
        self.properties.extend(properties);
        self
    }

    pub fn depends_on(mut self, logical_id: impl AsRef<str>) -> Self {
        let logical_id = logical_id.as_ref().to_string();
        if !self.depends_on.contains(&logical_id) {
            self.depends_on.push(logical_id);
        }
        self
    }

    /// Applies to both deletion and replacement
    pub fn removal_policy(mut self, policy: RemovalPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self.update_replace_policy = Some(policy);
        self
    }

    pub fn prop(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Construct path recorded at registration, if any
    pub fn path(&self) -> Option<&str> {
        self.metadata.get(PATH_METADATA_KEY).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(rename = "Type")]
    pub parameter_type: String,

    #[serde(
        rename = "Description",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
}

impl Parameter {
    pub fn string(description: impl Into<String>) -> Self {
        Self {
            parameter_type: "String".to_string(),
            description: Some(description.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    #[serde(
        rename = "Description",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,

    #[serde(rename = "Value")]
    pub value: Value,

    #[serde(rename = "Export", default, skip_serializing_if = "Option::is_none")]
    pub export: Option<Export>,
}

impl Output {
    pub fn new(value: Value, description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            value,
            export: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Export {
    #[serde(rename = "Name")]
    pub name: Value,
}

/// On-disk encoding of a template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateFormat {
    Json,
    Yaml,
}

impl TemplateFormat {
    /// Guess from a file extension, defaulting to JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => TemplateFormat::Yaml,
            _ => TemplateFormat::Json,
        }
    }
}

impl std::str::FromStr for TemplateFormat {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(TemplateFormat::Json),
            "yaml" | "yml" => Ok(TemplateFormat::Yaml),
            _ => Err(StackError::invalid_config(format!(
                "Unsupported template format: {}. Supported: json, yaml",
                s
            ))),
        }
    }
}

impl Template {
    pub fn encode(&self, format: TemplateFormat) -> Result<String> {
        match format {
            TemplateFormat::Json => serde_json::to_string_pretty(self)
                .map_err(|e| StackError::encoding(e.to_string())),
            TemplateFormat::Yaml => {
                serde_yaml::to_string(self).map_err(|e| StackError::encoding(e.to_string()))
            }
        }
    }

    pub fn decode(content: &str, format: TemplateFormat) -> Result<Self> {
        match format {
            TemplateFormat::Json => {
                serde_json::from_str(content).map_err(|e| StackError::encoding(e.to_string()))
            }
            TemplateFormat::Yaml => {
                serde_yaml::from_str(content).map_err(|e| StackError::encoding(e.to_string()))
            }
        }
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.get(logical_id)
    }

    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a Resource)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, resource)| resource.resource_type == resource_type)
            .map(|(id, resource)| (id.as_str(), resource))
    }

    /// True when `logical_id` names a resource of `resource_type`
    pub fn is_resource_of_type(&self, logical_id: &str, resource_type: &str) -> bool {
        self.resource(logical_id)
            .is_some_and(|resource| resource.resource_type == resource_type)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<String>, D::Error> {
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(item) => vec![item],
        OneOrMany::Many(items) => items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props;

    fn sample() -> Template {
        let mut resources = IndexMap::new();
        resources.insert(
            "Cluster".to_string(),
            Resource::new("AWS::RDS::DBCluster")
                .properties(props! { "Engine" => "aurora-mysql" })
                .removal_policy(RemovalPolicy::Destroy),
        );
        Template {
            format_version: FORMAT_VERSION.to_string(),
            description: None,
            transforms: vec!["AWS::SecretsManager-2020-07-23".to_string()],
            parameters: IndexMap::new(),
            resources,
            outputs: IndexMap::new(),
        }
    }

    #[test]
    fn removal_policy_serializes_as_delete() {
        let json = sample().encode(TemplateFormat::Json).unwrap();
        assert!(json.contains("\"DeletionPolicy\": \"Delete\""));
        assert!(json.contains("\"UpdateReplacePolicy\": \"Delete\""));
        assert!(!json.contains("DependsOn"));
    }

    #[test]
    fn yaml_output_decodes_to_the_same_template() {
        let template = sample();
        let yaml = template.encode(TemplateFormat::Yaml).unwrap();
        let decoded = Template::decode(&yaml, TemplateFormat::Yaml).unwrap();
        assert_eq!(decoded, template);
    }

    #[test]
    fn single_string_transform_and_depends_on_are_accepted() {
        let template = Template::decode(
            r#"{
                "AWSTemplateFormatVersion": "2010-09-09",
                "Transform": "AWS::Serverless-2016-10-31",
                "Resources": {
                    "Fn": {"Type": "AWS::Lambda::Function", "DependsOn": "Role"}
                }
            }"#,
            TemplateFormat::Json,
        )
        .unwrap();
        assert_eq!(template.transforms, vec!["AWS::Serverless-2016-10-31"]);
        assert_eq!(template.resources["Fn"].depends_on, vec!["Role"]);
    }

    #[test]
    fn format_from_path() {
        assert_eq!(
            TemplateFormat::from_path(Path::new("template.yml")),
            TemplateFormat::Yaml
        );
        assert_eq!(
            TemplateFormat::from_path(Path::new("template.json")),
            TemplateFormat::Json
        );
        assert_eq!(
            TemplateFormat::from_path(Path::new("template")),
            TemplateFormat::Json
        );
    }
}
