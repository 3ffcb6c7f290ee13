//! `sysdig_secure_notification_channel_slack`: a Sysdig Secure notification
//! channel posting to a Slack webhook.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

use super::{attribute_error, decode_attributes, parse_id, state_id};
use crate::client::{
    NotificationChannel, NotificationChannelApi, NotificationChannelOptions,
    TemplateConfiguration, TemplateConfigurationSection,
};
use crate::diagnostics::Diagnostic;
use crate::error::ProviderError;

/// Resource type name.
pub const SLACK_CHANNEL_RESOURCE: &str = "sysdig_secure_notification_channel_slack";

pub const NOTIFICATION_CHANNEL_TYPE_SLACK: &str = "SLACK";
pub const SLACK_TEMPLATE_KEY_V1: &str = "SLACK_SECURE_EVENT_NOTIFICATION_TEMPLATE_METADATA_v1";
pub const SLACK_TEMPLATE_KEY_V2: &str = "SLACK_SECURE_EVENT_NOTIFICATION_TEMPLATE_METADATA_v2";
pub const SECURE_EVENT_NOTIFICATION_CONTENT_SECTION: &str = "SECURE_EVENT_NOTIFICATION_CONTENT";

fn default_true() -> bool {
    true
}

/// Attributes of the Slack notification channel resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlackChannelState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub url: String,
    pub channel: String,
    #[serde(default)]
    pub private_channel: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_version: Option<String>,
    #[serde(default)]
    pub notify_when_ok: bool,
    #[serde(default)]
    pub notify_when_resolved: bool,
    #[serde(default)]
    pub send_test_notification: bool,
    #[serde(default)]
    pub share_with_current_team: bool,
}

impl SlackChannelState {
    fn decode(value: Value) -> Result<Self, ProviderError> {
        decode_attributes(SLACK_CHANNEL_RESOURCE, value)
    }

    fn encode(&self) -> Result<Value, ProviderError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Attribute-level problems serde cannot express.
    fn problems(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        if self.name.trim().is_empty() {
            diagnostics.push(attribute_error("name", "name must not be empty"));
        }
        if self.url.trim().is_empty() {
            diagnostics.push(attribute_error("url", "url must not be empty"));
        }
        if let Some(version) = &self.template_version {
            if version != "v1" && version != "v2" {
                diagnostics.push(attribute_error(
                    "template_version",
                    format!("template_version must be 'v1' or 'v2', got '{}'", version),
                ));
            }
        }
        diagnostics
    }

    /// The API model for this state. `team_id` is only attached when the
    /// channel is shared with the current team.
    fn to_channel(&self, team_id: Option<i64>) -> NotificationChannel {
        let template_key = match self.template_version.as_deref() {
            Some("v1") => Some(SLACK_TEMPLATE_KEY_V1),
            Some("v2") => Some(SLACK_TEMPLATE_KEY_V2),
            _ => None,
        };

        NotificationChannel {
            id: None,
            version: None,
            team_id: if self.share_with_current_team { team_id } else { None },
            channel_type: NOTIFICATION_CHANNEL_TYPE_SLACK.to_string(),
            name: self.name.clone(),
            enabled: self.enabled,
            options: NotificationChannelOptions {
                url: self.url.clone(),
                channel: self.channel.clone(),
                private_channel: self.private_channel,
                notify_on_ok: self.notify_when_ok,
                notify_on_resolve: self.notify_when_resolved,
                send_test_notification: self.send_test_notification,
                template_configuration: template_key
                    .map(|key| {
                        vec![TemplateConfiguration {
                            template_key: key.to_string(),
                            template_configuration_sections: vec![TemplateConfigurationSection {
                                section_name: SECURE_EVENT_NOTIFICATION_CONTENT_SECTION.to_string(),
                                should_show: true,
                            }],
                        }]
                    })
                    .unwrap_or_default(),
            },
        }
    }

    /// Build state from the API model.
    ///
    /// `prior` supplies values the API does not echo back: the template
    /// version when no template is configured, and the channel name when the
    /// token cannot see a private channel.
    fn from_channel(
        channel: &NotificationChannel,
        prior: Option<&SlackChannelState>,
    ) -> Result<Self, ProviderError> {
        let templates = &channel.options.template_configuration;
        let template_version = match templates.as_slice() {
            [] => prior.and_then(|p| p.template_version.clone()),
            [only] if only.template_key == SLACK_TEMPLATE_KEY_V2 => Some("v2".to_string()),
            [_] => Some("v1".to_string()),
            _ => {
                return Err(ProviderError::Validation(format!(
                    "expected slack notification templates to have only one configuration, found {}",
                    templates.len()
                )))
            },
        };

        let channel_name = if channel.options.channel.is_empty() {
            prior.map(|p| p.channel.clone()).unwrap_or_default()
        } else {
            channel.options.channel.clone()
        };

        Ok(Self {
            id: channel.id.map(|id| id.to_string()),
            version: channel.version,
            name: channel.name.clone(),
            enabled: channel.enabled,
            url: channel.options.url.clone(),
            channel: channel_name,
            private_channel: channel.options.private_channel,
            template_version,
            notify_when_ok: channel.options.notify_on_ok,
            notify_when_resolved: channel.options.notify_on_resolve,
            send_test_notification: channel.options.send_test_notification,
            share_with_current_team: channel.team_id.is_some(),
        })
    }
}

/// Lifecycle of Slack notification channels.
#[derive(Clone)]
pub struct SlackNotificationChannelResource {
    api: Arc<dyn NotificationChannelApi>,
}

impl SlackNotificationChannelResource {
    pub fn new(api: Arc<dyn NotificationChannelApi>) -> Self {
        Self { api }
    }

    /// Validate a configuration without contacting the API.
    pub fn validate(config: Value) -> Vec<Diagnostic> {
        match SlackChannelState::decode(config) {
            Ok(state) => state.problems(),
            Err(e) => vec![Diagnostic::from(e)],
        }
    }

    async fn team_for(&self, state: &SlackChannelState) -> Result<Option<i64>, ProviderError> {
        if state.share_with_current_team {
            Ok(Some(self.api.current_team_id().await?))
        } else {
            Ok(None)
        }
    }

    #[instrument(skip_all, fields(resource = SLACK_CHANNEL_RESOURCE))]
    pub async fn create(&self, planned: Value) -> Result<Value, ProviderError> {
        let planned = SlackChannelState::decode(planned)?;
        let team_id = self.team_for(&planned).await?;

        let created = self
            .api
            .create_notification_channel(&planned.to_channel(team_id))
            .await?;
        let id = created.id.ok_or_else(|| {
            ProviderError::Api {
                status: 200,
                message: "created notification channel has no id".to_string(),
            }
        })?;
        info!(id, "Created notification channel");

        self.read_by_id(id, Some(&planned))
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("notification channel {}", id)))
    }

    #[instrument(skip_all, fields(resource = SLACK_CHANNEL_RESOURCE))]
    pub async fn read(&self, current: Value) -> Result<Option<Value>, ProviderError> {
        let id = state_id(&current)?;
        let prior = SlackChannelState::decode(current).ok();
        self.read_by_id(id, prior.as_ref()).await
    }

    async fn read_by_id(
        &self,
        id: i64,
        prior: Option<&SlackChannelState>,
    ) -> Result<Option<Value>, ProviderError> {
        match self.api.get_notification_channel(id).await {
            Ok(channel) => Ok(Some(SlackChannelState::from_channel(&channel, prior)?.encode()?)),
            Err(e) if e.is_not_found() => {
                debug!(id, "Notification channel is gone");
                Ok(None)
            },
            Err(e) => Err(e),
        }
    }

    #[instrument(skip_all, fields(resource = SLACK_CHANNEL_RESOURCE))]
    pub async fn update(&self, prior: Value, planned: Value) -> Result<Value, ProviderError> {
        let id = state_id(&prior)?;
        let prior = SlackChannelState::decode(prior)?;
        let planned = SlackChannelState::decode(planned)?;
        let team_id = self.team_for(&planned).await?;

        let mut channel = planned.to_channel(team_id);
        channel.id = Some(id);
        channel.version = planned.version.or(prior.version);

        // An empty channel on the remote side means the token cannot see this
        // private channel; the update must not touch it.
        let current = self.api.get_notification_channel(id).await?;
        if current.options.channel.is_empty() {
            channel.options.channel.clear();
        }

        self.api.update_notification_channel(&channel).await?;
        info!(id, "Updated notification channel");

        self.read_by_id(id, Some(&planned))
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("notification channel {}", id)))
    }

    #[instrument(skip_all, fields(resource = SLACK_CHANNEL_RESOURCE))]
    pub async fn delete(&self, current: Value) -> Result<(), ProviderError> {
        let id = state_id(&current)?;
        self.api.delete_notification_channel(id).await?;
        info!(id, "Deleted notification channel");
        Ok(())
    }

    /// Import an existing channel by its numeric ID.
    pub async fn import(&self, id: &str) -> Result<Value, ProviderError> {
        let id = parse_id(id)?;
        self.read_by_id(id, None)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("notification channel {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fakes::InMemoryNotificationChannels;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn config() -> Value {
        json!({
            "name": "secure-alerts",
            "url": "https://hooks.slack.com/services/T/B/X",
            "channel": "#security",
            "template_version": "v2",
            "share_with_current_team": true
        })
    }

    fn resource(api: &Arc<InMemoryNotificationChannels>) -> SlackNotificationChannelResource {
        SlackNotificationChannelResource::new(api.clone())
    }

    #[test]
    fn test_validate() {
        assert!(SlackNotificationChannelResource::validate(config()).is_empty());

        let mut bad = config();
        bad["template_version"] = json!("v3");
        let diags = SlackNotificationChannelResource::validate(bad);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].attribute.as_deref(), Some("template_version"));

        let diags = SlackNotificationChannelResource::validate(json!({"name": "x"}));
        assert!(diags[0].is_error());
    }

    #[tokio::test]
    async fn test_create_sends_slack_channel() {
        let api = Arc::new(InMemoryNotificationChannels::with_team(42));
        let state = resource(&api).create(config()).await.unwrap();

        assert_eq!(state["id"], "1");
        assert_eq!(state["enabled"], true);
        assert_eq!(state["template_version"], "v2");
        assert_eq!(state["share_with_current_team"], true);

        let stored = api.get(1).unwrap();
        assert_eq!(stored.channel_type, "SLACK");
        assert_eq!(stored.team_id, Some(42));
        assert_eq!(
            stored.options.template_configuration[0].template_key,
            SLACK_TEMPLATE_KEY_V2
        );
        assert_eq!(
            stored.options.template_configuration[0].template_configuration_sections[0].section_name,
            SECURE_EVENT_NOTIFICATION_CONTENT_SECTION
        );
    }

    #[tokio::test]
    async fn test_not_shared_has_no_team() {
        let api = Arc::new(InMemoryNotificationChannels::with_team(42));
        let mut cfg = config();
        cfg["share_with_current_team"] = json!(false);
        resource(&api).create(cfg).await.unwrap();
        assert_eq!(api.get(1).unwrap().team_id, None);
    }

    #[tokio::test]
    async fn test_read_gone_returns_none() {
        let api = Arc::new(InMemoryNotificationChannels::default());
        let res = resource(&api);
        let state = res.create(config()).await.unwrap();
        api.remove(1);
        assert_eq!(res.read(state).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_maps_unknown_template_key_to_v1() {
        let api = Arc::new(InMemoryNotificationChannels::default());
        let res = resource(&api);
        let state = res.create(config()).await.unwrap();
        api.edit(1, |c| c.options.template_configuration[0].template_key = "OTHER".to_string());

        let state = res.read(state).await.unwrap().unwrap();
        assert_eq!(state["template_version"], "v1");
    }

    #[tokio::test]
    async fn test_read_rejects_multiple_templates() {
        let api = Arc::new(InMemoryNotificationChannels::default());
        let res = resource(&api);
        let state = res.create(config()).await.unwrap();
        api.edit(1, |c| {
            let extra = c.options.template_configuration[0].clone();
            c.options.template_configuration.push(extra);
        });

        let err = res.read(state).await.unwrap_err();
        assert!(err.message().contains("found 2"));
    }

    #[tokio::test]
    async fn test_update_keeps_hidden_private_channel_empty() {
        let api = Arc::new(InMemoryNotificationChannels::default());
        let res = resource(&api);
        let prior = res.create(config()).await.unwrap();
        api.edit(1, |c| c.options.channel.clear());

        let mut planned = prior.clone();
        planned["name"] = json!("renamed");
        let state = res.update(prior, planned).await.unwrap();

        assert_eq!(state["name"], "renamed");
        assert_eq!(state["channel"], "#security");
        assert_eq!(api.get(1).unwrap().options.channel, "");
        assert_eq!(api.get(1).unwrap().version, Some(2));
    }

    #[tokio::test]
    async fn test_delete_and_import() {
        let api = Arc::new(InMemoryNotificationChannels::default());
        let res = resource(&api);
        let state = res.create(config()).await.unwrap();

        let imported = res.import("1").await.unwrap();
        assert_eq!(imported["name"], "secure-alerts");

        res.delete(state.clone()).await.unwrap();
        // Already gone.
        res.delete(state).await.unwrap();
        assert!(res.import("1").await.unwrap_err().is_not_found());
        assert!(matches!(
            res.import("abc").await,
            Err(ProviderError::InvalidRequest(_))
        ));
    }
}
