//! # iMessage Demo Plugin
//!
//! Preserves the reference plugin's manifest (resource names, capability
//! ids, risk tiers) as an in-memory, deterministic demo. The reference
//! implementation talks to a local BlueBubbles server over HTTP; that is a
//! concrete external backend integration this gateway does not provide, so
//! this plugin answers from fixture data instead of a real device.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::CoreError;
use crate::manifest::{PluginActionManifest, PluginManifest, PluginResourceManifest};
use crate::models::{
    ActionPhase, ActionStatus, CollectionResponse, InternalActionResult, InternalReadResult, PolicyItem, ReadQuery,
    RiskTier,
};
use crate::plugin::{ActionContext, Plugin};

struct Message {
    id: &'static str,
    thread_id: &'static str,
    handle: &'static str,
    text: &'static str,
}

fn fixtures() -> Vec<Message> {
    vec![Message { id: "im_1", thread_id: "thr_1", handle: "+15550001111", text: "On my way" }]
}

pub struct IMessagePlugin {
    manifest: PluginManifest,
    messages: Vec<Message>,
}

impl Default for IMessagePlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl IMessagePlugin {
    pub fn new() -> Self {
        let action = |name: &str, capability_id: &str, resource: Option<&str>| PluginActionManifest {
            name: name.to_string(),
            capability_id: capability_id.to_string(),
            risk_tier: RiskTier::Transactional,
            resource: resource.map(str::to_string),
            mutating: true,
            requires_idempotency: true,
            supports_propose: true,
            emits_attributes: vec!["principal".to_string()],
        };

        let manifest = PluginManifest {
            id: "imessage".to_string(),
            name: "iMessage".to_string(),
            version: "0.1.0".to_string(),
            resources: vec![
                PluginResourceManifest {
                    name: "threads".to_string(),
                    capability_id: Some("imessage.threads.read".to_string()),
                    allowed_views: vec!["headers".to_string(), "body".to_string()],
                },
                PluginResourceManifest {
                    name: "messages".to_string(),
                    capability_id: Some("imessage.messages.read".to_string()),
                    allowed_views: vec!["headers".to_string(), "body".to_string()],
                },
            ],
            actions: vec![
                action("send", "imessage.message.send", None),
                action("send", "imessage.thread.send", Some("threads")),
                action("reply", "imessage.message.reply", Some("messages")),
            ],
            required_secrets: vec![],
            required_scopes: vec![],
            default_policy: Value::Null,
        };

        Self { manifest, messages: fixtures() }
    }

    fn find(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    fn policy_item_for(&self, message: &Message) -> PolicyItem {
        PolicyItem::new(format!("imessage:messages:{}", message.id))
            .with_attr("principal", message.handle)
            .with_attr("thread_id", message.thread_id)
    }
}

#[async_trait]
impl Plugin for IMessagePlugin {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    async fn list_resource(&self, resource: &str, query: &ReadQuery) -> Result<CollectionResponse, CoreError> {
        let items: Vec<Value> = match resource {
            "messages" => self
                .messages
                .iter()
                .map(|m| json!({"id": m.id, "thread_id": m.thread_id, "handle": m.handle}))
                .collect(),
            "threads" => {
                let mut seen = Vec::new();
                for m in &self.messages {
                    if !seen.contains(&m.thread_id) {
                        seen.push(m.thread_id);
                    }
                }
                seen.into_iter().map(|id| json!({"id": id})).collect()
            }
            other => return Err(CoreError::NotFound(format!("no such resource '{other}'"))),
        };
        let limit = query.limit as usize;
        Ok(CollectionResponse { items: items.into_iter().take(limit).collect(), next_cursor: None, policy_items: Vec::new() })
    }

    async fn get_resource(
        &self,
        resource: &str,
        resource_id: &str,
        view: Option<&str>,
        _query: &ReadQuery,
    ) -> Result<InternalReadResult, CoreError> {
        match resource {
            "messages" => {
                let message = self
                    .find(resource_id)
                    .ok_or_else(|| CoreError::NotFound(format!("no such message '{resource_id}'")))?;
                let data = match view.unwrap_or("headers") {
                    "headers" => json!({"id": message.id, "thread_id": message.thread_id, "handle": message.handle}),
                    "body" => json!({"id": message.id, "text": message.text}),
                    other => return Err(CoreError::NotFound(format!("unknown view '{other}'"))),
                };
                Ok(InternalReadResult { data, policy_items: vec![self.policy_item_for(message)] })
            }
            "threads" => {
                let members: Vec<&Message> = self.messages.iter().filter(|m| m.thread_id == resource_id).collect();
                if members.is_empty() {
                    return Err(CoreError::NotFound(format!("no such thread '{resource_id}'")));
                }
                let data = json!({"id": resource_id, "message_ids": members.iter().map(|m| m.id).collect::<Vec<_>>()});
                Ok(InternalReadResult { data, policy_items: members.iter().map(|m| self.policy_item_for(m)).collect() })
            }
            other => Err(CoreError::NotFound(format!("no such resource '{other}'"))),
        }
    }

    async fn run_action(&self, ctx: &ActionContext, args: &Value) -> Result<InternalActionResult, CoreError> {
        match ctx.action.as_str() {
            "send" => {
                let handle = args
                    .get("handle")
                    .and_then(Value::as_str)
                    .ok_or_else(|| CoreError::Validation("send requires a 'handle' argument".to_string()))?;
                let text = args
                    .get("text")
                    .and_then(Value::as_str)
                    .ok_or_else(|| CoreError::Validation("send requires a 'text' argument".to_string()))?;

                let mut result = json!({ "handle": handle });
                if ctx.phase == ActionPhase::Execute {
                    result["sent_message_id"] = json!("im_sent_001");
                }

                Ok(InternalActionResult {
                    status: ActionStatus::Success,
                    result,
                    summary: Some(format!("Send iMessage to {handle}")),
                    proposed_effect: json!({"action": "send", "handle": handle, "text": text}),
                    policy_items: vec![PolicyItem::new("imessage:outgoing").with_attr("principal", handle)],
                })
            }
            "reply" => {
                let resource_id = ctx
                    .resource_id
                    .as_deref()
                    .ok_or_else(|| CoreError::Validation("reply requires a message resource_id".to_string()))?;
                let message = self
                    .find(resource_id)
                    .ok_or_else(|| CoreError::NotFound(format!("no such message '{resource_id}'")))?;
                let text = args
                    .get("text")
                    .and_then(Value::as_str)
                    .ok_or_else(|| CoreError::Validation("reply requires a 'text' argument".to_string()))?;

                let mut result = json!({ "thread_id": message.thread_id });
                if ctx.phase == ActionPhase::Execute {
                    result["sent_message_id"] = json!("im_reply_001");
                }

                Ok(InternalActionResult {
                    status: ActionStatus::Success,
                    result,
                    summary: Some(format!("Reply in thread {}", message.thread_id)),
                    proposed_effect: json!({"action": "reply", "thread_id": message.thread_id, "text": text}),
                    policy_items: vec![self.policy_item_for(message)],
                })
            }
            other => Err(CoreError::NotFound(format!("no such action '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> ReadQuery {
        ReadQuery { limit: 20, cursor: None, sort: None, q: None, filters: Default::default(), max_chars: None }
    }

    #[tokio::test]
    async fn list_threads_dedupes() {
        let plugin = IMessagePlugin::new();
        let page = plugin.list_resource("threads", &query()).await.unwrap();
        assert_eq!(page.items.len(), 1);
    }

    #[tokio::test]
    async fn send_only_sets_sent_id_on_execute() {
        let plugin = IMessagePlugin::new();
        let ctx = ActionContext {
            plugin_id: "imessage".to_string(),
            phase: ActionPhase::Propose,
            action: "send".to_string(),
            resource: None,
            resource_id: None,
        };
        let proposed = plugin.run_action(&ctx, &json!({"handle": "+1", "text": "hi"})).await.unwrap();
        assert!(proposed.result.get("sent_message_id").is_none());
    }
}
