//! Notification channel API.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::SysdigClient;
use crate::error::ProviderError;

/// A notification channel as the Sysdig API models it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationChannel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<i64>,
    #[serde(rename = "type", default)]
    pub channel_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub options: NotificationChannelOptions,
}

/// Channel-type specific options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationChannelOptions {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub private_channel: bool,
    #[serde(default)]
    pub notify_on_ok: bool,
    #[serde(default)]
    pub notify_on_resolve: bool,
    #[serde(default)]
    pub send_test_notification: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub template_configuration: Vec<TemplateConfiguration>,
}

/// A message template selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateConfiguration {
    pub template_key: String,
    #[serde(default)]
    pub template_configuration_sections: Vec<TemplateConfigurationSection>,
}

/// One section of a message template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateConfigurationSection {
    pub section_name: String,
    pub should_show: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationChannelWrapper {
    notification_channel: NotificationChannel,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentUser {
    user: CurrentUserInfo,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentUserInfo {
    current_team: i64,
}

/// Notification channel operations.
#[async_trait]
pub trait NotificationChannelApi: Send + Sync {
    /// ID of the team the token's user is currently working in.
    async fn current_team_id(&self) -> Result<i64, ProviderError>;

    async fn create_notification_channel(
        &self,
        channel: &NotificationChannel,
    ) -> Result<NotificationChannel, ProviderError>;

    /// Fails with [`ProviderError::NotFound`] if the channel does not exist.
    async fn get_notification_channel(&self, id: i64) -> Result<NotificationChannel, ProviderError>;

    async fn update_notification_channel(
        &self,
        channel: &NotificationChannel,
    ) -> Result<NotificationChannel, ProviderError>;

    /// Deleting a channel that does not exist succeeds.
    async fn delete_notification_channel(&self, id: i64) -> Result<(), ProviderError>;
}

fn channel_path(id: i64) -> String {
    format!("/api/notificationChannels/{}", id)
}

#[async_trait]
impl NotificationChannelApi for SysdigClient {
    async fn current_team_id(&self) -> Result<i64, ProviderError> {
        let response = self.request::<()>(Method::GET, "/api/users/me", None).await?;
        if response.status != StatusCode::OK {
            return Err(response.into_error());
        }
        let me: CurrentUser = response.json()?;
        Ok(me.user.current_team)
    }

    async fn create_notification_channel(
        &self,
        channel: &NotificationChannel,
    ) -> Result<NotificationChannel, ProviderError> {
        let body = json!({ "notificationChannel": channel });
        let response = self
            .request(Method::POST, "/api/notificationChannels", Some(&body))
            .await?;
        if !matches!(response.status, StatusCode::OK | StatusCode::CREATED) {
            return Err(response.into_error());
        }
        Ok(response.json::<NotificationChannelWrapper>()?.notification_channel)
    }

    async fn get_notification_channel(&self, id: i64) -> Result<NotificationChannel, ProviderError> {
        let response = self.request::<()>(Method::GET, &channel_path(id), None).await?;
        let wrapper: NotificationChannelWrapper =
            response.into_entity(|| format!("notification channel {}", id))?;
        Ok(wrapper.notification_channel)
    }

    async fn update_notification_channel(
        &self,
        channel: &NotificationChannel,
    ) -> Result<NotificationChannel, ProviderError> {
        let id = channel.id.ok_or_else(|| {
            ProviderError::InvalidRequest("notification channel update requires an id".to_string())
        })?;
        let body = json!({ "notificationChannel": channel });
        let response = self.request(Method::PUT, &channel_path(id), Some(&body)).await?;
        if response.status != StatusCode::OK {
            return Err(response.into_error());
        }
        Ok(response.json::<NotificationChannelWrapper>()?.notification_channel)
    }

    async fn delete_notification_channel(&self, id: i64) -> Result<(), ProviderError> {
        self.request::<()>(Method::DELETE, &channel_path(id), None)
            .await?
            .into_deleted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::stub;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_wire_format() {
        let channel = NotificationChannel {
            team_id: Some(7),
            channel_type: "SLACK".to_string(),
            name: "alerts".to_string(),
            enabled: true,
            options: NotificationChannelOptions {
                url: "https://hooks.slack.com/x".to_string(),
                channel: "#alerts".to_string(),
                template_configuration: vec![TemplateConfiguration {
                    template_key: "KEY".to_string(),
                    template_configuration_sections: vec![TemplateConfigurationSection {
                        section_name: "SECTION".to_string(),
                        should_show: true,
                    }],
                }],
                ..Default::default()
            },
            ..Default::default()
        };

        assert_eq!(
            serde_json::to_value(&channel).unwrap(),
            json!({
                "teamId": 7,
                "type": "SLACK",
                "name": "alerts",
                "enabled": true,
                "options": {
                    "url": "https://hooks.slack.com/x",
                    "channel": "#alerts",
                    "privateChannel": false,
                    "notifyOnOk": false,
                    "notifyOnResolve": false,
                    "sendTestNotification": false,
                    "templateConfiguration": [{
                        "templateKey": "KEY",
                        "templateConfigurationSections": [{"sectionName": "SECTION", "shouldShow": true}]
                    }]
                }
            })
        );
    }

    #[test]
    fn test_decode_tolerates_missing_options() {
        let wrapper: NotificationChannelWrapper = serde_json::from_str(
            r#"{"notificationChannel":{"id":3,"version":2,"type":"SLACK","name":"n","enabled":false}}"#,
        )
        .unwrap();
        assert_eq!(wrapper.notification_channel.id, Some(3));
        assert_eq!(wrapper.notification_channel.options.channel, "");
    }

    #[tokio::test]
    async fn test_http_get_missing_channel_is_not_found() {
        let client = stub::client("404 Not Found", "").await;
        let err = client.get_notification_channel(12).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.message(), "notification channel 12");
    }

    #[tokio::test]
    async fn test_http_get_channel() {
        let client = stub::client(
            "200 OK",
            r##"{"notificationChannel":{"id":12,"version":3,"type":"SLACK","name":"n","enabled":true,"options":{"channel":"#ops"}}}"##,
        )
        .await;
        let channel = client.get_notification_channel(12).await.unwrap();
        assert_eq!(channel.version, Some(3));
        assert_eq!(channel.options.channel, "#ops");
    }

    #[tokio::test]
    async fn test_http_delete_missing_channel_succeeds() {
        let client = stub::client("404 Not Found", "").await;
        client.delete_notification_channel(12).await.unwrap();
    }

    #[tokio::test]
    async fn test_http_rejected_update_carries_reasons() {
        let client = stub::client(
            "422 Unprocessable Entity",
            r#"{"message":"Invalid channel","errors":[{"reason":"notBlank","message":"url must not be blank"}]}"#,
        )
        .await;
        let channel = NotificationChannel {
            id: Some(12),
            version: Some(1),
            ..Default::default()
        };
        let err = client.update_notification_channel(&channel).await.unwrap_err();
        match err {
            ProviderError::Api { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(message, "Invalid channel, notBlank, url must not be blank");
            },
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
