//! # HTTP Request Handlers
//!
//! Every route in [`crate::server::create_server`]'s router terminates in
//! one of these handlers. Three groups:
//!
//! - plugin discovery and approval lifecycle (thin wrappers over
//!   [`clawgate_core::registry::PluginRegistry`] /
//!   [`clawgate_core::approvals::ApprovalStore`])
//! - the action mediator (`run_global_action`, `run_resource_action`):
//!   authenticate, authorize, resolve, validate, gate on idempotency and
//!   approval, dispatch, enforce policy
//! - the read mediator (`list_collection`, `get_item`, `get_view`):
//!   authenticate, authorize, normalize, dispatch, filter
//!
//! Selectors combining two logical identifiers into one path segment
//! (`plugin_id:action`, `resource_id:action`, `ticket_id:verb`) arrive as a
//! single captured string and are split here, since Axum's router cannot
//! capture part of a segment.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use clawgate_core::canonical::hash_json;
use clawgate_core::idempotency::IdempotencyRecord;
use clawgate_core::models::{ActionPhase, ActionRequest, AgentPrincipal, ApprovalStatus, ReadQuery};
use clawgate_core::plugin::ActionContext;
use clawgate_core::CoreError;
use serde_json::{json, Value};

use crate::gateway_error::GatewayError;
use crate::server::AppState;

const RESERVED_QUERY_KEYS: &[&str] = &["limit", "cursor", "sort", "q", "max_chars", "view"];

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AgentPrincipal, GatewayError> {
    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let identity = headers.get("x-tailscale-identity").and_then(|v| v.to_str().ok());
    state
        .auth
        .authenticate(clawgate_core::auth::AuthService::extract_bearer(bearer), identity)
        .map_err(GatewayError::from)
}

fn split_selector(selector: &str) -> Result<(String, String), GatewayError> {
    selector
        .split_once(':')
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .ok_or_else(|| GatewayError::InvalidRequest(format!("malformed selector '{selector}', expected 'a:b'")))
}

fn query_to_read_query(state: &AppState, params: &HashMap<String, String>) -> Result<ReadQuery, GatewayError> {
    let limit = params.get("limit").and_then(|v| v.parse().ok());
    let max_chars = params.get("max_chars").and_then(|v| v.parse().ok());
    let filters = params
        .iter()
        .filter(|(k, _)| !RESERVED_QUERY_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Ok(ReadQuery {
        limit: state.policy.normalize_limit(limit).map_err(GatewayError::from)?,
        cursor: params.get("cursor").cloned(),
        sort: params.get("sort").cloned(),
        q: params.get("q").cloned(),
        filters,
        max_chars,
    })
}

// ---------------------------------------------------------------------
// Plugin discovery
// ---------------------------------------------------------------------

pub async fn list_plugins(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Value>, GatewayError> {
    authenticate(&state, &headers)?;
    Ok(Json(json!({ "plugins": state.registry.summaries() })))
}

pub async fn get_plugin_manifest(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(plugin_id): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    authenticate(&state, &headers)?;
    let plugin = state.registry.get(&plugin_id).map_err(GatewayError::from)?;
    Ok(Json(serde_json::to_value(plugin.manifest()).expect("manifest is always serializable")))
}

pub async fn list_capabilities(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(plugin_id): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    authenticate(&state, &headers)?;
    let plugin = state.registry.get(&plugin_id).map_err(GatewayError::from)?;
    let manifest = plugin.manifest();

    let mut capabilities: Vec<String> = manifest.actions.iter().map(|a| a.capability_id.clone()).collect();
    capabilities.extend(manifest.resources.iter().filter_map(|r| r.capability_id.clone()));
    capabilities.sort();
    capabilities.dedup();

    Ok(Json(json!({ "capabilities": capabilities })))
}

// ---------------------------------------------------------------------
// Approval lifecycle
// ---------------------------------------------------------------------

pub async fn get_approval(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(ticket_id): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    authenticate(&state, &headers)?;
    let ticket = state.approvals.get(&ticket_id).map_err(GatewayError::from)?;
    Ok(Json(serde_json::to_value(ticket).expect("ticket is always serializable")))
}

pub async fn approval_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(selector): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    authenticate(&state, &headers)?;
    let (ticket_id, verb) = split_selector(&selector)?;
    let status = match verb.as_str() {
        "approve" => ApprovalStatus::Approved,
        "deny" => ApprovalStatus::Denied,
        other => return Err(GatewayError::InvalidRequest(format!("unknown approval verb '{other}'"))),
    };
    let ticket = state.approvals.set_status(&ticket_id, status).map_err(GatewayError::from)?;
    Ok(Json(serde_json::to_value(ticket).expect("ticket is always serializable")))
}

// ---------------------------------------------------------------------
// Action mediator
// ---------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
async fn mediate_action(
    state: &AppState,
    headers: &HeaderMap,
    plugin_id: &str,
    resource: Option<&str>,
    resource_id: Option<&str>,
    action_name: &str,
    phase_raw: &str,
    body: ActionRequest,
) -> Result<(axum::http::StatusCode, Json<Value>), GatewayError> {
    let principal = authenticate(state, headers)?;

    let phase: ActionPhase = phase_raw
        .parse()
        .map_err(|_| GatewayError::InvalidRequest(format!("unknown phase '{phase_raw}'")))?;

    let resolved = state
        .registry
        .resolve_action(plugin_id, action_name, resource)
        .map_err(GatewayError::from)?;

    state.auth.require_capability(&principal, &resolved.action.capability_id).map_err(GatewayError::from)?;

    if phase == ActionPhase::Propose && !resolved.action.supports_propose {
        return Err(CoreError::ActionNotProposable(format!(
            "action '{action_name}' does not support propose"
        ))
        .into());
    }

    let args_object = body.args_object();
    state
        .policy
        .validate_action_request(&resolved.action, body.idempotency_key.as_deref(), phase, &args_object)
        .map_err(GatewayError::from)?;

    let request_hash = hash_json(&json!({
        "plugin_id": plugin_id,
        "resource": resource,
        "resource_id": resource_id,
        "action": action_name,
        "phase": phase.as_str(),
        "args": body.args,
    }));
    let idempotency_scope = format!("{}:{}:{}", plugin_id, resource.unwrap_or("_"), action_name);

    if phase == ActionPhase::Execute && resolved.action.mutating {
        if let Some(key) = &body.idempotency_key {
            if let Some(record) = state
                .idempotency
                .fetch_or_validate(&idempotency_scope, key, &request_hash)
                .map_err(GatewayError::from)?
            {
                let status = axum::http::StatusCode::from_u16(record.status_code)
                    .unwrap_or(axum::http::StatusCode::OK);
                return Ok((status, Json(record.payload)));
            }
        }
    }

    if state.policy.requires_approval(plugin_id, &resolved.action, phase) {
        let fingerprint = hash_json(&json!({
            "capability_id": resolved.action.capability_id,
            "resource_id": resource_id,
            "args": body.args,
        }));

        if state.approvals.find_approved(&resolved.action.capability_id, &fingerprint).is_none() {
            let preview_phase = if resolved.action.supports_propose { ActionPhase::Propose } else { phase };
            let preview_ctx = ActionContext {
                plugin_id: plugin_id.to_string(),
                phase: preview_phase,
                action: action_name.to_string(),
                resource: resource.map(str::to_string),
                resource_id: resource_id.map(str::to_string),
            };
            let preview = resolved.plugin.run_action(&preview_ctx, &body.args).await.map_err(GatewayError::from)?;

            let ticket = state.approvals.get_or_create_pending(
                &resolved.action.capability_id,
                &fingerprint,
                preview.summary.unwrap_or_default(),
                preview.proposed_effect,
            );

            return Ok((
                axum::http::StatusCode::ACCEPTED,
                Json(json!({
                    "approval_ticket_id": ticket.id,
                    "status": ticket.status.as_str(),
                    "summary": ticket.summary,
                    "proposed_effect": ticket.proposed_effect,
                })),
            ));
        }
    }

    let ctx = ActionContext {
        plugin_id: plugin_id.to_string(),
        phase,
        action: action_name.to_string(),
        resource: resource.map(str::to_string),
        resource_id: resource_id.map(str::to_string),
    };
    let result = resolved.plugin.run_action(&ctx, &body.args).await.map_err(GatewayError::from)?;
    state.policy.enforce_action_policy(&result.policy_items).map_err(GatewayError::from)?;

    let response = json!({ "result": result.result, "summary": result.summary });

    if phase == ActionPhase::Execute && resolved.action.mutating {
        if let Some(key) = &body.idempotency_key {
            state.idempotency.save(
                &idempotency_scope,
                key,
                IdempotencyRecord { request_hash, status_code: 200, payload: response.clone() },
            );
        }
    }

    Ok((axum::http::StatusCode::OK, Json(response)))
}

pub async fn run_global_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((selector, phase)): Path<(String, String)>,
    Json(body): Json<ActionRequest>,
) -> Result<(axum::http::StatusCode, Json<Value>), GatewayError> {
    let (plugin_id, action_name) = split_selector(&selector)?;
    mediate_action(&state, &headers, &plugin_id, None, None, &action_name, &phase, body).await
}

pub async fn run_resource_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((plugin_id, resource, selector, phase)): Path<(String, String, String, String)>,
    Json(body): Json<ActionRequest>,
) -> Result<(axum::http::StatusCode, Json<Value>), GatewayError> {
    let (resource_id, action_name) = split_selector(&selector)?;
    mediate_action(&state, &headers, &plugin_id, Some(&resource), Some(&resource_id), &action_name, &phase, body)
        .await
}

// ---------------------------------------------------------------------
// Read mediator
// ---------------------------------------------------------------------

fn require_resource_capability(
    state: &AppState,
    principal: &AgentPrincipal,
    plugin_id: &str,
    resource_name: &str,
) -> Result<clawgate_core::manifest::PluginResourceManifest, GatewayError> {
    let plugin = state.registry.get(plugin_id).map_err(GatewayError::from)?;
    let resource = plugin
        .manifest()
        .resource(resource_name)
        .cloned()
        .ok_or_else(|| CoreError::NotFound(format!("plugin '{plugin_id}' has no resource '{resource_name}'")))?;

    if let Some(capability_id) = &resource.capability_id {
        state.auth.require_capability(principal, capability_id).map_err(GatewayError::from)?;
    }
    Ok(resource)
}

pub async fn list_collection(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((plugin_id, resource_name)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, GatewayError> {
    let principal = authenticate(&state, &headers)?;
    require_resource_capability(&state, &principal, &plugin_id, &resource_name)?;

    let plugin = state.registry.get(&plugin_id).map_err(GatewayError::from)?;
    let query = query_to_read_query(&state, &params)?;
    let collection = plugin.list_resource(&resource_name, &query).await.map_err(GatewayError::from)?;
    let items = state.policy.apply_collection_policy(collection.items, &collection.policy_items);

    Ok(Json(json!({ "items": items, "next_cursor": collection.next_cursor })))
}

async fn read_item(
    state: &AppState,
    headers: &HeaderMap,
    plugin_id: &str,
    resource_name: &str,
    resource_id: &str,
    view: Option<&str>,
    params: &HashMap<String, String>,
) -> Result<Json<Value>, GatewayError> {
    let principal = authenticate(state, headers)?;
    let resource = require_resource_capability(state, &principal, plugin_id, resource_name)?;

    if let Some(v) = view {
        state.policy.enforce_view_policy(resource.allows_view(v), v).map_err(GatewayError::from)?;
    }

    let plugin = state.registry.get(plugin_id).map_err(GatewayError::from)?;
    let query = query_to_read_query(state, params)?;
    let result = plugin.get_resource(resource_name, resource_id, view, &query).await.map_err(GatewayError::from)?;

    for item in &result.policy_items {
        state.policy.apply_single_item_policy(item).map_err(GatewayError::from)?;
    }

    let data = if view == Some("body") {
        let max_chars = state.policy.normalize_max_chars(query.max_chars).map_err(GatewayError::from)?;
        sanitize_body_fields(&state.policy, result.data, max_chars)
    } else {
        result.data
    };

    Ok(Json(data))
}

fn sanitize_body_fields(policy: &clawgate_core::policy::PolicyEngine, mut data: Value, max_chars: u32) -> Value {
    if let Value::Object(map) = &mut data {
        for (key, value) in map.iter_mut() {
            if key == "body" || key == "snippet" {
                if let Value::String(text) = value {
                    *text = policy.sanitize_body_payload(text, max_chars);
                }
            }
        }
    }
    data
}

pub async fn get_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((plugin_id, resource_name, resource_id)): Path<(String, String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, GatewayError> {
    read_item(&state, &headers, &plugin_id, &resource_name, &resource_id, None, &params).await
}

pub async fn get_view(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((plugin_id, resource_name, resource_id, view)): Path<(String, String, String, String)>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, GatewayError> {
    read_item(&state, &headers, &plugin_id, &resource_name, &resource_id, Some(&view), &params).await
}
