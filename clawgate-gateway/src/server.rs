//! # HTTP Server Module
//!
//! Builds the `AppState` shared across every handler and the Axum `Router`
//! serving the agent-gateway HTTP surface. First-party demo plugins and any
//! configured sidecar plugins are registered into one `PluginRegistry` at
//! startup; that registry is immutable for the life of the process.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use clawgate_core::approvals::ApprovalStore;
use clawgate_core::auth::AuthService;
use clawgate_core::idempotency::IdempotencyStore;
use clawgate_core::models::RuntimeMode;
use clawgate_core::plugin::Plugin;
use clawgate_core::plugins::{AppleMusicPlugin, FindMyPlugin, GmailPlugin, IMessagePlugin};
use clawgate_core::policy::PolicyEngine;
use clawgate_core::registry::PluginRegistry;
use clawgate_core::sidecar::{SidecarPlugin, SidecarPluginConfig};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::Settings;
use crate::handlers;
use crate::middleware::logging_middleware;

/// Shared state for every HTTP handler: the plugin registry plus the four
/// core services every request passes through.
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<PluginRegistry>,
    pub auth: Arc<AuthService>,
    pub policy: Arc<PolicyEngine>,
    pub approvals: Arc<ApprovalStore>,
    pub idempotency: Arc<IdempotencyStore>,
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            settings: self.settings.clone(),
            registry: self.registry.clone(),
            auth: self.auth.clone(),
            policy: self.policy.clone(),
            approvals: self.approvals.clone(),
            idempotency: self.idempotency.clone(),
        }
    }
}

async fn build_registry(settings: &Settings) -> anyhow::Result<PluginRegistry> {
    let mut plugins: Vec<(Arc<dyn Plugin>, RuntimeMode)> = vec![
        (Arc::new(GmailPlugin::new()), RuntimeMode::InProcess),
        (Arc::new(IMessagePlugin::new()), RuntimeMode::InProcess),
        (Arc::new(AppleMusicPlugin::new()), RuntimeMode::InProcess),
        (Arc::new(FindMyPlugin::new()), RuntimeMode::InProcess),
    ];

    if let Some(raw) = &settings.sidecar_plugins_json {
        let configs: Vec<SidecarPluginConfig> =
            serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("invalid SIDECAR_PLUGINS_JSON: {e}"))?;
        for config in configs {
            let id = config.id.clone();
            let plugin = SidecarPlugin::connect(config)
                .await
                .map_err(|e| anyhow::anyhow!("failed to connect sidecar plugin '{id}': {e}"))?;
            plugins.push((Arc::new(plugin), RuntimeMode::Sidecar));
        }
    }

    PluginRegistry::new(plugins).map_err(|e| anyhow::anyhow!(e.to_string()))
}

fn mount_routes(prefix: &str, router: Router<AppState>) -> Router<AppState> {
    Router::new().nest(prefix, router)
}

// Axum's router requires a whole path segment per capture (no mixing literal
// text and a parameter in one segment), so the `plugin_id:action` and
// `resource_id:action` selectors in the external route table are each
// captured as a single segment and split on ':' inside the handler. Routes
// that share a segment count are registered on the same path with distinct
// methods, which Axum merges into one route entry.
fn api_router() -> Router<AppState> {
    Router::new()
        .route("/plugins", get(handlers::list_plugins))
        .route("/plugins/{plugin_id}", get(handlers::get_plugin_manifest))
        .route("/plugins/{plugin_id}/capabilities", get(handlers::list_capabilities))
        .route(
            "/approvals/{selector}",
            get(handlers::get_approval).post(handlers::approval_action),
        )
        .route(
            "/{plugin_id}/{resource}",
            get(handlers::list_collection).post(handlers::run_global_action),
        )
        .route("/{plugin_id}/{resource}/{resource_id}", get(handlers::get_item))
        .route(
            "/{plugin_id}/{resource}/{resource_id}/{selector}",
            get(handlers::get_view).post(handlers::run_resource_action),
        )
}

/// Creates and configures the HTTP server: builds the plugin registry,
/// auth/policy services and the two mutable stores, then assembles the
/// Axum router with its middleware stack.
pub async fn create_server(settings: Settings) -> anyhow::Result<Router> {
    let registry = build_registry(&settings).await?;

    let auth = AuthService::new(settings.require_auth, settings.agent_tokens_json.as_deref())
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let risk_tier_defaults = settings.risk_tier_defaults()?;
    let (global_overrides, plugin_overrides) = settings.approval_overrides()?;
    let policy = PolicyEngine::new(
        settings.default_limit,
        settings.max_limit,
        settings.default_body_max_chars,
        settings.raw_read_enabled,
        risk_tier_defaults,
        global_overrides,
        plugin_overrides,
    );

    let enable_api_alias = settings.enable_api_alias;
    let api_prefix = settings.api_prefix.clone();

    let state = AppState {
        settings: Arc::new(settings),
        registry: Arc::new(registry),
        auth: Arc::new(auth),
        policy: Arc::new(policy),
        approvals: Arc::new(ApprovalStore::new()),
        idempotency: Arc::new(IdempotencyStore::new()),
    };

    let mut app = mount_routes(&api_prefix, api_router());
    if enable_api_alias {
        app = app.merge(mount_routes(&format!("/api{api_prefix}"), api_router()));
    }

    let app = app
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(axum::middleware::from_fn(logging_middleware)))
        .with_state(state);

    Ok(app)
}
