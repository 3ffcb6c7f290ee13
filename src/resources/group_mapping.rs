//! `sysdig_group_mapping`: maps an identity provider group to a Sysdig role.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

use super::{attribute_error, decode_attributes, parse_id, state_id};
use crate::client::{GroupMapping, GroupMappingApi, TeamMap};
use crate::diagnostics::Diagnostic;
use crate::error::ProviderError;

/// Resource type name.
pub const GROUP_MAPPING_RESOURCE: &str = "sysdig_group_mapping";

pub const DEFAULT_SYSTEM_ROLE: &str = "ROLE_USER";
pub const MAX_WEIGHT: i64 = 32767;

fn default_system_role() -> String {
    DEFAULT_SYSTEM_ROLE.to_string()
}

fn default_weight() -> i64 {
    MAX_WEIGHT
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TeamMapState {
    #[serde(default)]
    pub all_teams: bool,
    #[serde(default)]
    pub team_ids: Vec<i64>,
}

/// Attributes of the group mapping resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupMappingState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub group_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_team_role_id: Option<i64>,
    #[serde(default = "default_system_role")]
    pub system_role: String,
    pub team_map: TeamMapState,
    #[serde(default = "default_weight")]
    pub weight: i64,
}

impl GroupMappingState {
    fn decode(value: Value) -> Result<Self, ProviderError> {
        decode_attributes(GROUP_MAPPING_RESOURCE, value)
    }

    fn problems(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        if self.group_name.trim().is_empty() {
            diagnostics.push(attribute_error("group_name", "group_name must not be empty"));
        }
        match (&self.role, self.custom_team_role_id) {
            (Some(_), Some(_)) => diagnostics.push(attribute_error(
                "role",
                "only one of role and custom_team_role_id can be set",
            )),
            (None, None) => diagnostics.push(attribute_error(
                "role",
                "one of role and custom_team_role_id must be set",
            )),
            _ => {},
        }
        if !(1..=MAX_WEIGHT).contains(&self.weight) {
            diagnostics.push(attribute_error(
                "weight",
                format!("weight must be between 1 and {}, got {}", MAX_WEIGHT, self.weight),
            ));
        }
        if self.team_map.all_teams && !self.team_map.team_ids.is_empty() {
            diagnostics.push(attribute_error(
                "team_map",
                "team_ids must be empty when all_teams is true",
            ));
        }
        diagnostics
    }

    fn to_mapping(&self) -> GroupMapping {
        GroupMapping {
            id: None,
            group_name: self.group_name.clone(),
            standard_team_role: self.role.clone(),
            custom_team_role_id: self.custom_team_role_id,
            system_role: self.system_role.clone(),
            team_map: TeamMap {
                all_teams: self.team_map.all_teams,
                team_ids: self.team_map.team_ids.clone(),
            },
            weight: self.weight,
        }
    }

    fn from_mapping(mapping: &GroupMapping) -> Self {
        Self {
            id: mapping.id.map(|id| id.to_string()),
            group_name: mapping.group_name.clone(),
            role: mapping.standard_team_role.clone().filter(|r| !r.is_empty()),
            custom_team_role_id: mapping.custom_team_role_id,
            system_role: mapping.system_role.clone(),
            team_map: TeamMapState {
                all_teams: mapping.team_map.all_teams,
                team_ids: mapping.team_map.team_ids.clone(),
            },
            weight: mapping.weight,
        }
    }

    fn encode(&self) -> Result<Value, ProviderError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Lifecycle of group mappings.
#[derive(Clone)]
pub struct GroupMappingResource {
    api: Arc<dyn GroupMappingApi>,
}

impl GroupMappingResource {
    pub fn new(api: Arc<dyn GroupMappingApi>) -> Self {
        Self { api }
    }

    pub fn validate(config: Value) -> Vec<Diagnostic> {
        match GroupMappingState::decode(config) {
            Ok(state) => state.problems(),
            Err(e) => vec![Diagnostic::from(e)],
        }
    }

    #[instrument(skip_all, fields(resource = GROUP_MAPPING_RESOURCE))]
    pub async fn create(&self, planned: Value) -> Result<Value, ProviderError> {
        let planned = GroupMappingState::decode(planned)?;
        let created = self.api.create_group_mapping(&planned.to_mapping()).await?;
        info!(id = ?created.id, group = %created.group_name, "Created group mapping");
        GroupMappingState::from_mapping(&created).encode()
    }

    #[instrument(skip_all, fields(resource = GROUP_MAPPING_RESOURCE))]
    pub async fn read(&self, current: Value) -> Result<Option<Value>, ProviderError> {
        let id = state_id(&current)?;
        self.read_by_id(id).await
    }

    async fn read_by_id(&self, id: i64) -> Result<Option<Value>, ProviderError> {
        match self.api.get_group_mapping(id).await {
            Ok(mapping) => Ok(Some(GroupMappingState::from_mapping(&mapping).encode()?)),
            Err(e) if e.is_not_found() => {
                debug!(id, "Group mapping is gone");
                Ok(None)
            },
            Err(e) => Err(e),
        }
    }

    #[instrument(skip_all, fields(resource = GROUP_MAPPING_RESOURCE))]
    pub async fn update(&self, prior: Value, planned: Value) -> Result<Value, ProviderError> {
        let id = state_id(&prior)?;
        let planned = GroupMappingState::decode(planned)?;
        let mut mapping = planned.to_mapping();
        mapping.id = Some(id);

        let updated = self.api.update_group_mapping(&mapping, id).await?;
        info!(id, "Updated group mapping");
        GroupMappingState::from_mapping(&updated).encode()
    }

    #[instrument(skip_all, fields(resource = GROUP_MAPPING_RESOURCE))]
    pub async fn delete(&self, current: Value) -> Result<(), ProviderError> {
        let id = state_id(&current)?;
        self.api.delete_group_mapping(id).await?;
        info!(id, "Deleted group mapping");
        Ok(())
    }

    pub async fn import(&self, id: &str) -> Result<Value, ProviderError> {
        let id = parse_id(id)?;
        self.read_by_id(id)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("group mapping {}", id)))
    }
}
