//! # Sidecar Plugin Transport
//!
//! Implements the [`Plugin`] contract over HTTP-JSON against an
//! out-of-process plugin. Four routes on the sidecar base URL:
//!
//! - `GET  /plugin/manifest`
//! - `POST /plugin/resources/{resource}/list`
//! - `POST /plugin/resources/{resource}/{resource_id}/get`
//! - `POST /plugin/actions/{action_name}/{phase}`
//!
//! A shared secret, if configured, is sent as `X-Clawgate-Sidecar-Secret` on
//! every request. No retries: the specification does not call for them and
//! neither does the reference HTTP client this was ported from.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::CoreError;
use crate::manifest::PluginManifest;
use crate::models::{ActionPhase, CollectionResponse, InternalActionResult, InternalReadResult, ReadQuery};
use crate::plugin::{ActionContext, Plugin};

#[derive(Clone, Debug, Deserialize)]
pub struct SidecarPluginConfig {
    pub id: String,
    pub base_url: String,
    #[serde(default)]
    pub shared_secret: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
}

fn default_timeout_seconds() -> f64 {
    5.0
}

impl Default for SidecarPluginConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            base_url: String::new(),
            shared_secret: None,
            timeout_seconds: 5.0,
        }
    }
}

pub struct SidecarPlugin {
    config: SidecarPluginConfig,
    client: Client,
    manifest: PluginManifest,
}

impl SidecarPlugin {
    pub async fn connect(config: SidecarPluginConfig) -> Result<Self, CoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs_f64(config.timeout_seconds))
            .build()
            .map_err(|e| CoreError::Config(format!("failed to build sidecar http client: {e}")))?;

        let manifest: PluginManifest = request_json(
            &client,
            reqwest::Method::GET,
            &format!("{}/plugin/manifest", config.base_url),
            config.shared_secret.as_deref(),
            None,
        )
        .await?;

        if manifest.id != config.id {
            return Err(CoreError::Config(format!(
                "sidecar at '{}' reports id '{}', expected '{}'",
                config.base_url, manifest.id, config.id
            )));
        }
        manifest.validate()?;

        Ok(Self { config, client, manifest })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }
}

#[async_trait]
impl Plugin for SidecarPlugin {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    async fn list_resource(&self, resource: &str, query: &ReadQuery) -> Result<CollectionResponse, CoreError> {
        request_json(
            &self.client,
            reqwest::Method::POST,
            &self.url(&format!("/plugin/resources/{resource}/list")),
            self.config.shared_secret.as_deref(),
            Some(json!({ "query": query })),
        )
        .await
    }

    async fn get_resource(
        &self,
        resource: &str,
        resource_id: &str,
        view: Option<&str>,
        query: &ReadQuery,
    ) -> Result<InternalReadResult, CoreError> {
        request_json(
            &self.client,
            reqwest::Method::POST,
            &self.url(&format!("/plugin/resources/{resource}/{resource_id}/get")),
            self.config.shared_secret.as_deref(),
            Some(json!({ "view": view, "query": query })),
        )
        .await
    }

    async fn run_action(&self, ctx: &ActionContext, args: &Value) -> Result<InternalActionResult, CoreError> {
        let phase = match ctx.phase {
            ActionPhase::Propose => "propose",
            ActionPhase::Execute => "execute",
        };
        request_json(
            &self.client,
            reqwest::Method::POST,
            &self.url(&format!("/plugin/actions/{}/{phase}", ctx.action)),
            self.config.shared_secret.as_deref(),
            Some(json!({
                "resource": ctx.resource,
                "resource_id": ctx.resource_id,
                "args": args,
            })),
        )
        .await
    }
}

async fn request_json<T: serde::de::DeserializeOwned>(
    client: &Client,
    method: reqwest::Method,
    url: &str,
    shared_secret: Option<&str>,
    body: Option<Value>,
) -> Result<T, CoreError> {
    let mut request = client.request(method, url);
    if let Some(secret) = shared_secret {
        request = request.header("X-Clawgate-Sidecar-Secret", secret);
    }
    if let Some(body) = &body {
        request = request.json(body);
    }

    let response = request.send().await.map_err(|e| {
        if e.is_timeout() || e.is_connect() {
            CoreError::SidecarUnreachable(e.to_string())
        } else {
            CoreError::SidecarHttpError(e.to_string())
        }
    })?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(CoreError::NotFound(format!("sidecar resource not found at {url}")));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CoreError::SidecarHttpError(format!("{status}: {body}")));
    }

    let envelope: Value = response
        .json()
        .await
        .map_err(|e| CoreError::SidecarBadResponse(e.to_string()))?;

    let payload = match envelope {
        Value::Object(ref map) if map.contains_key("data") => map["data"].clone(),
        other => other,
    };

    serde_json::from_value(payload).map_err(|e| CoreError::SidecarBadResponse(e.to_string()))
}
