//! # Clawgate Gateway
//!
//! The HTTP control plane for the Clawgate agent gateway: authenticates
//! agents, mediates their side-effectful actions and read-only resource
//! requests against registered plugins, and enforces the policy, approval,
//! and idempotency pipeline around every mutating call.
//!
//! ## Architecture
//!
//! - [`config`]: environment-variable driven settings
//! - [`server`]: the `AppState`, plugin-registry bootstrap, and route table
//! - [`handlers`]: plugin discovery, approval lifecycle, action mediator,
//!   read mediator
//! - [`middleware`]: request logging
//! - [`gateway_error`]: maps [`clawgate_core::CoreError`] to HTTP responses
//!
//! The request-mediation logic itself — capability resolution, policy
//! evaluation, approval and idempotency bookkeeping, the plugin transport
//! contract — lives in [`clawgate_core`]; this crate is strictly the HTTP
//! surface over it.

pub mod config;
pub mod gateway_error;
pub mod handlers;
pub mod middleware;
pub mod server;

pub use server::create_server;

#[cfg(test)]
mod tests {
    use axum_test::TestServer;
    use serde_json::json;

    use crate::config::Settings;
    use crate::create_server;

    async fn test_server(require_auth: bool) -> TestServer {
        let settings = Settings { require_auth, ..Settings::default() };
        let app = create_server(settings).await.unwrap();
        TestServer::new(app).unwrap()
    }

    #[tokio::test]
    async fn plugin_discovery_lists_first_party_plugins() {
        let server = test_server(false).await;
        let response = server.get("/v1/plugins").await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        let ids: Vec<&str> = body["plugins"].as_array().unwrap().iter().map(|p| p["id"].as_str().unwrap()).collect();
        assert!(ids.contains(&"gmail"));
    }

    #[tokio::test]
    async fn missing_auth_is_rejected_when_required() {
        let server = test_server(true).await;
        let response = server.get("/v1/plugins").await;
        response.assert_status(axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn reading_a_message_returns_its_headers() {
        let server = test_server(false).await;
        let response = server.get("/v1/gmail/messages/msg_allowed").await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["id"], "msg_allowed");
    }

    #[tokio::test]
    async fn body_view_is_sanitized_and_truncated() {
        let server = test_server(false).await;
        let response = server.get("/v1/gmail/messages/msg_allowed/body?max_chars=20").await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        let text = body["body"].as_str().unwrap();
        assert!(!text.contains("http"));
        assert!(text.chars().count() <= 20);
    }

    #[tokio::test]
    async fn reply_execute_without_idempotency_key_is_rejected() {
        let server = test_server(false).await;
        let response = server
            .post("/v1/gmail/messages/msg_allowed:reply/execute")
            .json(&json!({"args": {"body": "thanks"}}))
            .await;
        response.assert_status(axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reply_execute_requires_approval_then_runs_after_approve() {
        let server = test_server(false).await;

        let pending = server
            .post("/v1/gmail/messages/msg_allowed:reply/execute")
            .json(&json!({"idempotency_key": "k1", "args": {"body": "thanks"}}))
            .await;
        pending.assert_status(axum::http::StatusCode::ACCEPTED);
        let ticket_id = pending.json::<serde_json::Value>()["approval_ticket_id"].as_str().unwrap().to_string();

        let approved = server.post(&format!("/v1/approvals/{ticket_id}:approve")).await;
        approved.assert_status_ok();

        let executed = server
            .post("/v1/gmail/messages/msg_allowed:reply/execute")
            .json(&json!({"idempotency_key": "k1", "args": {"body": "thanks"}}))
            .await;
        executed.assert_status_ok();
        let body: serde_json::Value = executed.json();
        assert_eq!(body["result"]["sent_message_id"], "sent_reply_001");
    }

    #[tokio::test]
    async fn replaying_the_same_idempotency_key_returns_the_prior_response() {
        let server = test_server(false).await;

        let pending = server
            .post("/v1/gmail/messages/msg_allowed:archive/execute")
            .json(&json!({"idempotency_key": "archive-1", "args": {}}))
            .await;
        pending.assert_status(axum::http::StatusCode::ACCEPTED);
        let ticket_id = pending.json::<serde_json::Value>()["approval_ticket_id"].as_str().unwrap().to_string();
        server.post(&format!("/v1/approvals/{ticket_id}:approve")).await.assert_status_ok();

        let first = server
            .post("/v1/gmail/messages/msg_allowed:archive/execute")
            .json(&json!({"idempotency_key": "archive-1", "args": {}}))
            .await;
        first.assert_status_ok();

        let second = server
            .post("/v1/gmail/messages/msg_allowed:archive/execute")
            .json(&json!({"idempotency_key": "archive-1", "args": {}}))
            .await;
        second.assert_status_ok();
        assert_eq!(first.json::<serde_json::Value>(), second.json::<serde_json::Value>());
    }

    #[tokio::test]
    async fn send_to_a_blocked_domain_is_rejected_before_approval() {
        let server = test_server(false).await;
        let response = server
            .post("/v1/gmail:send/execute")
            .json(&json!({"idempotency_key": "k2", "args": {"to": "mallory@blocked.example", "body": "ok"}}))
            .await;
        response.assert_status(axum::http::StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn raw_view_is_disabled_by_default() {
        let server = test_server(false).await;
        let response = server.get("/v1/gmail/messages/msg_allowed/raw").await;
        response.assert_status(axum::http::StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn a_token_scoped_to_one_capability_is_denied_another() {
        let tokens = json!([
            {
                "token": "reader-only",
                "agent_id": "reader",
                "tailscale_identity": "*",
                "capabilities": ["gmail.messages.read"]
            }
        ])
        .to_string();
        let settings =
            Settings { require_auth: true, agent_tokens_json: Some(tokens), ..Settings::default() };
        let server = TestServer::new(create_server(settings).await.unwrap()).unwrap();

        let allowed = server
            .get("/v1/gmail/messages/msg_allowed")
            .add_header(axum::http::header::AUTHORIZATION, "Bearer reader-only")
            .add_header("x-tailscale-identity", "any-host")
            .await;
        allowed.assert_status_ok();

        let denied = server
            .post("/v1/gmail/messages/msg_allowed:reply/execute")
            .add_header(axum::http::header::AUTHORIZATION, "Bearer reader-only")
            .add_header("x-tailscale-identity", "any-host")
            .json(&json!({"idempotency_key": "k3", "args": {"body": "thanks"}}))
            .await;
        denied.assert_status(axum::http::StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn api_alias_mirrors_the_main_prefix_when_enabled() {
        let settings = Settings { require_auth: false, enable_api_alias: true, ..Settings::default() };
        let app = create_server(settings).await.unwrap();
        let server = TestServer::new(app).unwrap();

        let direct = server.get("/v1/plugins").await;
        let aliased = server.get("/api/v1/plugins").await;
        direct.assert_status_ok();
        aliased.assert_status_ok();
    }
}
