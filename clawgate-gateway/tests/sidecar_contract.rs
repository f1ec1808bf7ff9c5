//! Contract tests for the out-of-process sidecar plugin transport, run
//! against a mocked HTTP sidecar rather than a real one.

use clawgate_core::models::ActionPhase;
use clawgate_core::plugin::{ActionContext, Plugin};
use clawgate_core::sidecar::{SidecarPlugin, SidecarPluginConfig};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn manifest_body() -> serde_json::Value {
    json!({
        "id": "weather",
        "name": "Weather Sidecar",
        "version": "0.1.0",
        "resources": [
            { "name": "forecasts", "capability_id": "weather.forecasts.read", "allowed_views": [] }
        ],
        "actions": [
            {
                "name": "refresh",
                "capability_id": "weather.forecasts.refresh",
                "risk_tier": "routine",
                "resource": "forecasts",
                "mutating": true,
                "requires_idempotency": false,
                "supports_propose": false,
                "emits_attributes": ["forecast_status"]
            }
        ],
        "required_secrets": [],
        "required_scopes": [],
        "default_policy": null
    })
}

async fn connected_plugin(server: &MockServer, shared_secret: Option<&str>) -> SidecarPlugin {
    Mock::given(method("GET"))
        .and(path("/plugin/manifest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(manifest_body()))
        .mount(server)
        .await;

    let config = SidecarPluginConfig {
        id: "weather".to_string(),
        base_url: server.uri(),
        shared_secret: shared_secret.map(str::to_string),
        timeout_seconds: 5.0,
    };
    SidecarPlugin::connect(config).await.unwrap()
}

#[tokio::test]
async fn connect_fetches_and_validates_the_manifest() {
    let server = MockServer::start().await;
    let plugin = connected_plugin(&server, None).await;
    assert_eq!(plugin.manifest().id, "weather");
    assert_eq!(plugin.manifest().actions[0].name, "refresh");
}

#[tokio::test]
async fn connect_rejects_a_manifest_with_a_mismatched_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/plugin/manifest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "not-weather",
            "name": "Weather Sidecar",
            "actions": [{
                "name": "refresh",
                "capability_id": "weather.forecasts.refresh",
                "risk_tier": "routine",
                "mutating": true
            }]
        })))
        .mount(&server)
        .await;

    let config = SidecarPluginConfig {
        id: "weather".to_string(),
        base_url: server.uri(),
        shared_secret: None,
        timeout_seconds: 5.0,
    };
    assert!(SidecarPlugin::connect(config).await.is_err());
}

#[tokio::test]
async fn list_resource_sends_the_shared_secret_header_and_unwraps_the_envelope() {
    let server = MockServer::start().await;
    let plugin = connected_plugin(&server, Some("topsecret")).await;

    Mock::given(method("POST"))
        .and(path("/plugin/resources/forecasts/list"))
        .and(header("X-Clawgate-Sidecar-Secret", "topsecret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "items": [{"city": "sf"}], "next_cursor": null }
        })))
        .mount(&server)
        .await;

    let query = clawgate_core::models::ReadQuery {
        limit: 20,
        cursor: None,
        sort: None,
        q: None,
        filters: Default::default(),
        max_chars: None,
    };
    let collection = plugin.list_resource("forecasts", &query).await.unwrap();
    assert_eq!(collection.items.len(), 1);
    assert_eq!(collection.items[0]["city"], "sf");
}

#[tokio::test]
async fn run_action_posts_to_the_phase_scoped_route() {
    let server = MockServer::start().await;
    let plugin = connected_plugin(&server, None).await;

    Mock::given(method("POST"))
        .and(path("/plugin/actions/refresh/execute"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "result": {"refreshed": true},
            "summary": "refreshed forecasts",
            "proposed_effect": null,
            "policy_items": []
        })))
        .mount(&server)
        .await;

    let ctx = ActionContext {
        plugin_id: "weather".to_string(),
        phase: ActionPhase::Execute,
        action: "refresh".to_string(),
        resource: Some("forecasts".to_string()),
        resource_id: None,
    };
    let result = plugin.run_action(&ctx, &json!({})).await.unwrap();
    assert_eq!(result.result["refreshed"], true);
}

#[tokio::test]
async fn a_404_from_the_sidecar_becomes_a_not_found_error() {
    let server = MockServer::start().await;
    let plugin = connected_plugin(&server, None).await;

    Mock::given(method("POST"))
        .and(path("/plugin/resources/forecasts/missing-city/get"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let query = clawgate_core::models::ReadQuery {
        limit: 20,
        cursor: None,
        sort: None,
        q: None,
        filters: Default::default(),
        max_chars: None,
    };
    let err = plugin.get_resource("forecasts", "missing-city", None, &query).await.unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}
