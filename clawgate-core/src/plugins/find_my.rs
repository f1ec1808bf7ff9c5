//! # Find My Demo Plugin
//!
//! Preserves the reference plugin's manifest as an in-memory, deterministic
//! demo. The reference implementation reads a local Apple-account session
//! and device files through an external package; neither is available in a
//! portable gateway process, so this plugin answers from fixture locations.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::CoreError;
use crate::manifest::{PluginActionManifest, PluginManifest, PluginResourceManifest};
use crate::models::{
    ActionPhase, ActionStatus, CollectionResponse, InternalActionResult, InternalReadResult, PolicyItem, ReadQuery,
    RiskTier,
};
use crate::plugin::{ActionContext, Plugin};

struct Friend {
    id: &'static str,
    name: &'static str,
    latitude: f64,
    longitude: f64,
}

fn friends() -> Vec<Friend> {
    vec![Friend { id: "friend_1", name: "Jordan", latitude: 37.7749, longitude: -122.4194 }]
}

pub struct FindMyPlugin {
    manifest: PluginManifest,
    friends: Vec<Friend>,
}

impl Default for FindMyPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl FindMyPlugin {
    pub fn new() -> Self {
        let manifest = PluginManifest {
            id: "find_my".to_string(),
            name: "Find My".to_string(),
            version: "0.1.0".to_string(),
            resources: vec![PluginResourceManifest {
                name: "friends".to_string(),
                capability_id: Some("find_my.friends.read".to_string()),
                allowed_views: vec!["headers".to_string(), "body".to_string()],
            }],
            actions: vec![PluginActionManifest {
                name: "refresh".to_string(),
                capability_id: "find_my.friends.refresh".to_string(),
                risk_tier: RiskTier::ReadOnly,
                resource: None,
                mutating: false,
                requires_idempotency: false,
                supports_propose: true,
                emits_attributes: vec!["resource_type".to_string()],
            }],
            required_secrets: vec![],
            required_scopes: vec![],
            default_policy: Value::Null,
        };

        Self { manifest, friends: friends() }
    }

    fn find(&self, id: &str) -> Option<&Friend> {
        self.friends.iter().find(|f| f.id == id)
    }
}

#[async_trait]
impl Plugin for FindMyPlugin {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    async fn list_resource(&self, resource: &str, query: &ReadQuery) -> Result<CollectionResponse, CoreError> {
        if resource != "friends" {
            return Err(CoreError::NotFound(format!("no such resource '{resource}'")));
        }
        let limit = query.limit as usize;
        let items = self
            .friends
            .iter()
            .take(limit)
            .map(|f| json!({"id": f.id, "name": f.name}))
            .collect();
        Ok(CollectionResponse { items, next_cursor: None, policy_items: Vec::new() })
    }

    async fn get_resource(
        &self,
        resource: &str,
        resource_id: &str,
        view: Option<&str>,
        _query: &ReadQuery,
    ) -> Result<InternalReadResult, CoreError> {
        if resource != "friends" {
            return Err(CoreError::NotFound(format!("no such resource '{resource}'")));
        }
        let friend = self
            .find(resource_id)
            .ok_or_else(|| CoreError::NotFound(format!("no such friend '{resource_id}'")))?;
        let data = match view.unwrap_or("headers") {
            "headers" => json!({"id": friend.id, "name": friend.name}),
            "body" => json!({
                "id": friend.id,
                "name": friend.name,
                "latitude": friend.latitude,
                "longitude": friend.longitude,
            }),
            other => return Err(CoreError::NotFound(format!("unknown view '{other}'"))),
        };
        let policy_item = PolicyItem::new(format!("find_my:friends:{}", friend.id)).with_attr("origin", "fixture");
        Ok(InternalReadResult { data, policy_items: vec![policy_item] })
    }

    async fn run_action(&self, ctx: &ActionContext, _args: &Value) -> Result<InternalActionResult, CoreError> {
        if ctx.action != "refresh" {
            return Err(CoreError::NotFound(format!("no such action '{}'", ctx.action)));
        }
        let refreshed_count = self.friends.len();
        let result = if ctx.phase == ActionPhase::Execute {
            json!({"refreshed_count": refreshed_count})
        } else {
            json!({"would_refresh_count": refreshed_count})
        };
        Ok(InternalActionResult {
            status: ActionStatus::Success,
            result,
            summary: Some(format!("Refresh {refreshed_count} friend locations")),
            proposed_effect: json!({"action": "refresh"}),
            policy_items: vec![PolicyItem::new("find_my:friends").with_attr("resource_type", "friend")],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> ReadQuery {
        ReadQuery { limit: 20, cursor: None, sort: None, q: None, filters: Default::default(), max_chars: None }
    }

    #[tokio::test]
    async fn refresh_is_read_only_and_never_requires_a_resource_id() {
        let plugin = FindMyPlugin::new();
        let ctx = ActionContext {
            plugin_id: "find_my".to_string(),
            phase: ActionPhase::Execute,
            action: "refresh".to_string(),
            resource: None,
            resource_id: None,
        };
        let result = plugin.run_action(&ctx, &json!({})).await.unwrap();
        assert_eq!(result.result["refreshed_count"], json!(1));
    }

    #[tokio::test]
    async fn get_friend_body_view_includes_coordinates() {
        let plugin = FindMyPlugin::new();
        let result = plugin.get_resource("friends", "friend_1", Some("body"), &query()).await.unwrap();
        assert!(result.data.get("latitude").is_some());
    }
}
