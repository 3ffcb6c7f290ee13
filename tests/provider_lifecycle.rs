//! Resource lifecycles driven through the provider against in-memory APIs.

use std::sync::Arc;

use hemmer_provider_sysdig::testing::fakes::{InMemoryGroupMappings, InMemoryNotificationChannels};
use hemmer_provider_sysdig::testing::{
    assert_attribute_error, assert_error_contains, assert_no_errors, ProviderTester, TestError,
};
use hemmer_provider_sysdig::{ApiClients, ProviderServer, SysdigProvider};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

const SLACK: &str = "sysdig_secure_notification_channel_slack";
const GROUP_MAPPING: &str = "sysdig_group_mapping";

struct Fixture {
    channels: Arc<InMemoryNotificationChannels>,
    mappings: Arc<InMemoryGroupMappings>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            channels: Arc::new(InMemoryNotificationChannels::with_team(7)),
            mappings: Arc::new(InMemoryGroupMappings::default()),
        }
    }

    fn provider(&self) -> SysdigProvider {
        SysdigProvider::new().with_clients(ApiClients {
            notification_channels: Some(self.channels.clone()),
            group_mappings: Some(self.mappings.clone()),
        })
    }
}

fn slack_config() -> Value {
    json!({
        "name": "runtime-alerts",
        "url": "https://hooks.slack.com/services/T0/B0/XYZ",
        "channel": "#runtime",
        "notify_when_ok": true,
        "template_version": "v1"
    })
}

#[tokio::test]
async fn slack_channel_crud() {
    let fixture = Fixture::new();
    let tester = ProviderTester::new(fixture.provider());
    tester.configure(json!({})).await.unwrap();

    let updated = tester
        .lifecycle_crud(SLACK, slack_config(), json!({"enabled": false, "template_version": "v2"}))
        .await
        .unwrap();

    assert_eq!(updated["enabled"], false);
    assert_eq!(updated["template_version"], "v2");
    assert_eq!(updated["notify_when_ok"], true);
    assert_eq!(updated["version"], 2);
    assert!(fixture.channels.is_empty());
}

#[tokio::test]
async fn slack_channel_removed_out_of_band_reads_as_gone() {
    let fixture = Fixture::new();
    let server = ProviderServer::new(fixture.provider());
    assert_no_errors(&server.configure(json!({})).await);

    let created = server.create(SLACK, slack_config()).await;
    assert_no_errors(&created.diagnostics);
    let state = created.value.unwrap();

    fixture.channels.remove(1);
    let read = server.read(SLACK, state.clone()).await;
    assert!(read.value.is_none());
    assert_no_errors(&read.diagnostics);

    // Deleting what is already gone succeeds.
    assert_no_errors(&server.delete(SLACK, state).await);
}

#[tokio::test]
async fn slack_channel_import() {
    let fixture = Fixture::new();
    let tester = ProviderTester::new(fixture.provider());
    tester.configure(json!({})).await.unwrap();
    tester.create(SLACK, slack_config()).await.unwrap();

    let imported = tester.import_resource(SLACK, "1").await.unwrap();
    assert_eq!(imported.len(), 1);
    assert_eq!(imported[0].resource_type, SLACK);
    assert_eq!(imported[0].state["channel"], "#runtime");
    assert_eq!(imported[0].state["share_with_current_team"], false);

    assert!(tester.import_resource(SLACK, "99").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn slack_channel_validation() {
    let fixture = Fixture::new();
    let server = ProviderServer::new(fixture.provider());

    let mut cfg = slack_config();
    cfg["template_version"] = json!("v9");
    cfg["url"] = json!("");
    let diagnostics = server.validate_resource_config(SLACK, cfg).await;
    assert_attribute_error(&diagnostics, "template_version");
    assert_attribute_error(&diagnostics, "url");

    let diagnostics = server
        .validate_resource_config(SLACK, json!({"name": "n", "url": "u"}))
        .await;
    assert_error_contains(&diagnostics, "channel");
}

#[tokio::test]
async fn group_mapping_crud() {
    let fixture = Fixture::new();
    let tester = ProviderTester::new(fixture.provider());
    tester.configure(json!({})).await.unwrap();

    let config = json!({
        "group_name": "secops",
        "custom_team_role_id": 12,
        "system_role": "ROLE_CUSTOMER",
        "team_map": {"all_teams": true},
        "weight": 5
    });
    let created = tester.lifecycle_create(GROUP_MAPPING, config).await.unwrap();
    assert_eq!(created["id"], "1");
    assert_eq!(created["custom_team_role_id"], 12);
    assert!(created.get("role").is_none());

    let mut proposed = created.clone();
    proposed["team_map"] = json!({"team_ids": [1, 2, 3]});
    let updated = tester
        .lifecycle_update(GROUP_MAPPING, created, proposed)
        .await
        .unwrap();
    assert_eq!(updated["team_map"], json!({"all_teams": false, "team_ids": [1, 2, 3]}));
    assert_eq!(fixture.mappings.get(1).unwrap().team_map.team_ids, vec![1, 2, 3]);

    tester.lifecycle_delete(GROUP_MAPPING, updated).await.unwrap();
    assert!(fixture.mappings.is_empty());
}

#[tokio::test]
async fn group_mapping_rejects_conflicting_roles() {
    let fixture = Fixture::new();
    let tester = ProviderTester::new(fixture.provider());
    tester.configure(json!({})).await.unwrap();

    let err = tester
        .lifecycle_create(
            GROUP_MAPPING,
            json!({
                "group_name": "secops",
                "role": "ROLE_TEAM_READ",
                "custom_team_role_id": 12,
                "team_map": {"all_teams": true}
            }),
        )
        .await
        .unwrap_err();
    match err {
        TestError::Diagnostics(diagnostics) => assert_attribute_error(&diagnostics, "role"),
        other => panic!("unexpected error: {}", other),
    }
    assert!(fixture.mappings.is_empty());
}

#[tokio::test]
async fn resources_without_token_report_missing_variable() {
    let server = ProviderServer::new(SysdigProvider::new().with_clients(ApiClients::default()));
    let diagnostics = server.configure(json!({})).await;
    assert_no_errors(&diagnostics);
    assert_eq!(diagnostics.len(), 1);

    let response = server.create(GROUP_MAPPING, json!({})).await;
    assert_error_contains(&response.diagnostics, "SYSDIG_SECURE_API_TOKEN");
}

#[tokio::test]
async fn unknown_resource_type() {
    let server = ProviderServer::new(Fixture::new().provider());
    server.configure(json!({})).await;
    let response = server.read("sysdig_unknown", json!({"id": "1"})).await;
    assert_error_contains(&response.diagnostics, "Unknown resource type");
}
