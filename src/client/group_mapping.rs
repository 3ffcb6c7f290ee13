//! Group mapping API.
//!
//! Group mappings bind an identity provider group to a system role and a set
//! of teams.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};

use super::SysdigClient;
use crate::error::ProviderError;

const GROUP_MAPPINGS_PATH: &str = "/api/groupmappings";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMapping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub group_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_team_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_team_role_id: Option<i64>,
    pub system_role: String,
    pub team_map: TeamMap,
    pub weight: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMap {
    #[serde(default)]
    pub all_teams: bool,
    #[serde(default)]
    pub team_ids: Vec<i64>,
}

/// Group mapping operations.
#[async_trait]
pub trait GroupMappingApi: Send + Sync {
    async fn create_group_mapping(&self, mapping: &GroupMapping) -> Result<GroupMapping, ProviderError>;

    async fn update_group_mapping(
        &self,
        mapping: &GroupMapping,
        id: i64,
    ) -> Result<GroupMapping, ProviderError>;

    /// Deleting a mapping that does not exist succeeds.
    async fn delete_group_mapping(&self, id: i64) -> Result<(), ProviderError>;

    /// Fails with [`ProviderError::NotFound`] if the mapping does not exist.
    async fn get_group_mapping(&self, id: i64) -> Result<GroupMapping, ProviderError>;
}

fn mapping_path(id: i64) -> String {
    format!("{}/{}", GROUP_MAPPINGS_PATH, id)
}

#[async_trait]
impl GroupMappingApi for SysdigClient {
    async fn create_group_mapping(&self, mapping: &GroupMapping) -> Result<GroupMapping, ProviderError> {
        let response = self
            .request(Method::POST, GROUP_MAPPINGS_PATH, Some(mapping))
            .await?;
        if response.status != StatusCode::OK {
            return Err(response.into_error());
        }
        response.json()
    }

    async fn update_group_mapping(
        &self,
        mapping: &GroupMapping,
        id: i64,
    ) -> Result<GroupMapping, ProviderError> {
        let response = self
            .request(Method::PUT, &mapping_path(id), Some(mapping))
            .await?;
        if response.status != StatusCode::OK {
            return Err(response.into_error());
        }
        response.json()
    }

    async fn delete_group_mapping(&self, id: i64) -> Result<(), ProviderError> {
        self.request::<()>(Method::DELETE, &mapping_path(id), None)
            .await?
            .into_deleted()
    }

    async fn get_group_mapping(&self, id: i64) -> Result<GroupMapping, ProviderError> {
        self.request::<()>(Method::GET, &mapping_path(id), None)
            .await?
            .into_entity(|| format!("group mapping {}", id))
    }
}
