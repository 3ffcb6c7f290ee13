//! The synthetic CloudFormation-style envelope the patcher works on.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::model::ContainerDefinition;
use super::options::PatchOptions;
use crate::error::ProviderError;

/// Logical ID of the single task definition resource in the stack.
pub const KILT_RESOURCE: &str = "kilt";

/// Resource type of the wrapped task definition.
pub const TASK_DEFINITION_TYPE: &str = "AWS::ECS::TaskDefinition";

/// Launch type the task definition requires.
pub const FARGATE: &str = "FARGATE";

/// Tag listing containers the patcher must skip.
pub const IGNORE_CONTAINERS_TAG: &str = "kilt-ignore-containers";

/// A `{Key, Value}` resource tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

/// Properties of the wrapped task definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskDefinitionProperties {
    /// Launch types; always `["FARGATE"]` on the way in.
    #[serde(default)]
    pub requires_compatibilities: Vec<String>,
    /// The container definitions being patched.
    #[serde(default)]
    pub container_definitions: Vec<ContainerDefinition>,
    /// Resource tags.
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// A single stack resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackResource {
    /// CloudFormation resource type.
    #[serde(rename = "Type")]
    pub resource_type: String,
    /// Resource properties.
    #[serde(rename = "Properties")]
    pub properties: TaskDefinitionProperties,
}

/// The stack document handed to the patcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrappedStackDocument {
    /// Resources keyed by logical ID.
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<String, StackResource>,
}

impl WrappedStackDocument {
    /// Wrap container definitions, tagging the ignore list if there is one.
    pub fn assemble(containers: Vec<ContainerDefinition>, options: &PatchOptions) -> Self {
        let mut tags = Vec::new();
        if !options.ignore_containers.is_empty() {
            tags.push(Tag {
                key: IGNORE_CONTAINERS_TAG.to_string(),
                value: options.ignore_containers.join(":"),
            });
        }

        let mut resources = BTreeMap::new();
        resources.insert(
            KILT_RESOURCE.to_string(),
            StackResource {
                resource_type: TASK_DEFINITION_TYPE.to_string(),
                properties: TaskDefinitionProperties {
                    requires_compatibilities: vec![FARGATE.to_string()],
                    container_definitions: containers,
                    tags,
                },
            },
        );
        Self { resources }
    }

    /// Decode raw container definitions JSON and wrap it.
    pub fn from_container_definitions(
        container_definitions: &str,
        options: &PatchOptions,
    ) -> Result<Self, ProviderError> {
        let containers: Vec<ContainerDefinition> = serde_json::from_str(container_definitions)?;
        Ok(Self::assemble(containers, options))
    }

    /// Take the container definitions back out of the wrapped task definition.
    pub fn into_container_definitions(mut self) -> Result<Vec<ContainerDefinition>, ProviderError> {
        self.resources
            .remove(KILT_RESOURCE)
            .map(|resource| resource.properties.container_definitions)
            .ok_or_else(|| {
                ProviderError::PatchFailed(format!(
                    "patched stack has no '{}' resource",
                    KILT_RESOURCE
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    const DEFINITIONS: &str = r#"[
        {"name": "app", "image": "nginx", "portMappings": [{"containerPort": 80}]},
        {"name": "worker", "environment": [{"name": "A", "value": "1"}]}
    ]"#;

    #[test]
    fn test_assembled_document_shape() {
        let doc =
            WrappedStackDocument::from_container_definitions(DEFINITIONS, &PatchOptions::default())
                .unwrap();
        let json = serde_json::to_value(&doc).unwrap();
        let props = &json["Resources"]["kilt"]["Properties"];

        assert_eq!(json["Resources"]["kilt"]["Type"], "AWS::ECS::TaskDefinition");
        assert_eq!(props["RequiresCompatibilities"], json!(["FARGATE"]));
        assert_eq!(props["Tags"], json!([]));
    }

    #[test]
    fn test_container_definitions_round_trip() {
        let doc =
            WrappedStackDocument::from_container_definitions(DEFINITIONS, &PatchOptions::default())
                .unwrap();
        let encoded = serde_json::to_string(&doc).unwrap();
        let decoded: Value = serde_json::from_str(&encoded).unwrap();
        let original: Value = serde_json::from_str(DEFINITIONS).unwrap();

        assert_eq!(
            decoded["Resources"]["kilt"]["Properties"]["ContainerDefinitions"],
            original
        );
    }

    #[test]
    fn test_ignore_tag_present_when_list_non_empty() {
        let options = PatchOptions {
            ignore_containers: vec!["worker".to_string(), "db".to_string()],
            ..Default::default()
        };
        let doc = WrappedStackDocument::from_container_definitions(DEFINITIONS, &options).unwrap();
        let tags = &doc.resources[KILT_RESOURCE].properties.tags;

        assert_eq!(
            tags,
            &vec![Tag {
                key: "kilt-ignore-containers".to_string(),
                value: "worker:db".to_string(),
            }]
        );
    }

    #[test]
    fn test_no_ignore_tag_when_list_empty() {
        let doc =
            WrappedStackDocument::from_container_definitions(DEFINITIONS, &PatchOptions::default())
                .unwrap();
        assert!(doc.resources[KILT_RESOURCE].properties.tags.is_empty());
    }

    #[test]
    fn test_malformed_definitions_fail_to_decode() {
        let err = WrappedStackDocument::from_container_definitions(
            r#"[{"name": "app""#,
            &PatchOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ProviderError::Decode(_)));

        let err = WrappedStackDocument::from_container_definitions(
            r#"{"name": "app"}"#,
            &PatchOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ProviderError::Decode(_)));
    }

    #[test]
    fn test_unwrap_missing_resource() {
        let doc = WrappedStackDocument {
            resources: BTreeMap::new(),
        };
        let err = doc.into_container_definitions().unwrap_err();
        assert!(matches!(err, ProviderError::PatchFailed(_)));
    }
}
