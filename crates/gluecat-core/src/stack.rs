//! Explicit stack builder
//!
//! Every construction step receives the `Stack` by `&mut` and gets back a
//! [`LogicalId`] for each resource it registers. Construct ids are paths
//! (`SC_GlueCatalogDemo/Secret`); logical ids are the path with
//! non-alphanumerics removed, which is what CloudFormation accepts.

use crate::error::{Result, StackError};
use crate::intrinsic::Value;
use crate::template::{Output, Parameter, Resource, Template, FORMAT_VERSION, PATH_METADATA_KEY};
use indexmap::IndexMap;
use tracing::{debug, info};

const MAX_LOGICAL_ID_LEN: usize = 255;

/// Identifier of a resource inside the synthesized template
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogicalId(String);

impl LogicalId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `{"Ref": id}`
    pub fn reference(&self) -> Value {
        Value::reference(&self.0)
    }

    /// `{"Fn::GetAtt": [id, attribute]}`
    pub fn get_att(&self, attribute: &str) -> Value {
        Value::get_att(&self.0, attribute)
    }
}

impl AsRef<str> for LogicalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LogicalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the CloudFormation logical id for a construct path.
pub fn logical_id_for(construct_id: &str) -> Result<String> {
    if construct_id.is_empty() {
        return Err(StackError::invalid_construct_id(construct_id, "must not be empty"));
    }
    if construct_id.split('/').any(str::is_empty) {
        return Err(StackError::invalid_construct_id(
            construct_id,
            "path segments must not be empty",
        ));
    }
    if let Some(bad) = construct_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '/')))
    {
        return Err(StackError::invalid_construct_id(
            construct_id,
            format!("unsupported character '{}'", bad),
        ));
    }

    let logical: String = construct_id
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect();
    if logical.is_empty() {
        return Err(StackError::invalid_construct_id(
            construct_id,
            "must contain at least one letter or digit",
        ));
    }
    if logical.len() > MAX_LOGICAL_ID_LEN {
        return Err(StackError::invalid_construct_id(
            construct_id,
            format!("logical id exceeds {} characters", MAX_LOGICAL_ID_LEN),
        ));
    }
    Ok(logical)
}

#[derive(Debug)]
pub struct Stack {
    id: String,
    description: Option<String>,
    transforms: Vec<String>,
    parameters: IndexMap<String, Parameter>,
    resources: IndexMap<String, Resource>,
    outputs: IndexMap<String, Output>,
    /// logical id -> construct path
    construct_paths: IndexMap<String, String>,
}

impl Stack {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
            transforms: Vec::new(),
            parameters: IndexMap::new(),
            resources: IndexMap::new(),
            outputs: IndexMap::new(),
            construct_paths: IndexMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = Some(description.into());
    }

    /// Add a template-level transform (deduplicated)
    pub fn add_transform(&mut self, transform: &str) {
        if !self.transforms.iter().any(|t| t == transform) {
            self.transforms.push(transform.to_string());
        }
    }

    /// Declare a stack parameter; returns a `Ref` to it.
    pub fn add_parameter(&mut self, name: &str, parameter: Parameter) -> Result<Value> {
        let logical = logical_id_for(name)?;
        if logical != name {
            return Err(StackError::invalid_construct_id(
                name,
                "parameter names must be alphanumeric",
            ));
        }
        if self.parameters.contains_key(name) || self.resources.contains_key(name) {
            return Err(StackError::duplicate_construct(name));
        }
        self.parameters.insert(name.to_string(), parameter);
        Ok(Value::reference(name))
    }

    /// Register a resource under a construct path.
    pub fn add(&mut self, construct_id: &str, mut resource: Resource) -> Result<LogicalId> {
        let logical = logical_id_for(construct_id)?;

        if let Some(existing) = self.construct_paths.get(&logical) {
            if existing == construct_id {
                return Err(StackError::duplicate_construct(construct_id));
            }
            return Err(StackError::logical_id_collision(
                construct_id,
                logical,
                existing.clone(),
            ));
        }
        if self.parameters.contains_key(&logical) {
            return Err(StackError::logical_id_collision(
                construct_id,
                logical.clone(),
                logical,
            ));
        }

        resource.metadata.insert(
            PATH_METADATA_KEY.to_string(),
            Value::str(format!("{}/{}", self.id, construct_id)),
        );

        debug!(
            construct_id,
            logical_id = %logical,
            resource_type = %resource.resource_type,
            "Registered resource"
        );

        self.construct_paths
            .insert(logical.clone(), construct_id.to_string());
        self.resources.insert(logical.clone(), resource);
        Ok(LogicalId(logical))
    }

    pub fn add_output(&mut self, name: &str, output: Output) -> Result<()> {
        let logical = logical_id_for(name)?;
        if self.outputs.contains_key(&logical) {
            return Err(StackError::duplicate_construct(name));
        }
        self.outputs.insert(logical, output);
        Ok(())
    }

    /// `[{"Key": "Name", "Value": "<stack>/<construct>"}]`
    pub fn name_tags(&self, construct_id: &str) -> Value {
        Value::List(vec![Value::from(crate::props! {
            "Key" => "Name",
            "Value" => format!("{}/{}", self.id, construct_id),
        })])
    }

    pub fn resource(&self, logical_id: &LogicalId) -> Option<&Resource> {
        self.resources.get(logical_id.as_str())
    }

    /// Logical id previously assigned to a construct path
    pub fn logical_id(&self, construct_id: &str) -> Option<LogicalId> {
        let logical = logical_id_for(construct_id).ok()?;
        match self.construct_paths.get(&logical) {
            Some(path) if path == construct_id => Some(LogicalId(logical)),
            _ => None,
        }
    }

    /// Check every reference and produce the template.
    pub fn synth(self) -> Result<Template> {
        for (logical, resource) in &self.resources {
            let mut targets = resource.depends_on.clone();
            for value in resource.properties.values() {
                value.collect_references(&mut targets);
            }
            for target in targets {
                if !self.resources.contains_key(&target) && !self.parameters.contains_key(&target) {
                    return Err(StackError::dangling_reference(logical, target));
                }
            }
        }

        for (name, output) in &self.outputs {
            let mut targets = Vec::new();
            output.value.collect_references(&mut targets);
            if let Some(export) = &output.export {
                export.name.collect_references(&mut targets);
            }
            if let Some(target) = targets
                .into_iter()
                .find(|t| !self.resources.contains_key(t) && !self.parameters.contains_key(t))
            {
                return Err(StackError::dangling_reference(name, target));
            }
        }

        info!(
            stack = %self.id,
            resources = self.resources.len(),
            parameters = self.parameters.len(),
            outputs = self.outputs.len(),
            "Synthesized stack"
        );

        Ok(Template {
            format_version: FORMAT_VERSION.to_string(),
            description: self.description,
            transforms: self.transforms,
            parameters: self.parameters,
            resources: self.resources,
            outputs: self.outputs,
        })
    }
}
