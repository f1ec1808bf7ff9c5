//! # Gmail Demo Plugin
//!
//! An in-memory demo of an email plugin, carried over with full fidelity
//! from the reference implementation's fixtures: two messages, one from an
//! allowed sender and one from a blocked domain, used throughout the
//! gateway's test scenarios (reply/approve/execute, policy blocking on a
//! blocked domain, and body sanitization).

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::CoreError;
use crate::manifest::{PluginActionManifest, PluginManifest, PluginResourceManifest};
use crate::models::{
    ActionPhase, ActionStatus, CollectionResponse, InternalActionResult, InternalReadResult, PolicyItem, ReadQuery,
    RiskTier,
};
use crate::plugin::{ActionContext, Plugin};

#[derive(Clone)]
struct GmailMessage {
    id: &'static str,
    thread_id: &'static str,
    from: &'static str,
    to: &'static str,
    subject: &'static str,
    body: &'static str,
    snippet: &'static str,
}

fn fixtures() -> Vec<GmailMessage> {
    vec![
        GmailMessage {
            id: "msg_allowed",
            thread_id: "thr_a",
            from: "alice@corp.com",
            to: "agent@corp.com",
            subject: "Project update",
            body: "Hi, see <b>the doc</b> at http://intranet.corp.com/doc for details. Thanks!",
            snippet: "Hi, see the doc for details.",
        },
        GmailMessage {
            id: "msg_blocked",
            thread_id: "thr_b",
            from: "mallory@blocked.example",
            to: "agent@corp.com",
            subject: "Urgent wire request",
            body: "Please click http://blocked.example/phish and confirm the transfer immediately.",
            snippet: "Please click and confirm the transfer.",
        },
    ]
}

fn domain_of(address: &str) -> String {
    address.split('@').nth(1).unwrap_or_default().to_lowercase()
}

pub struct GmailPlugin {
    manifest: PluginManifest,
    messages: Vec<GmailMessage>,
}

impl Default for GmailPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl GmailPlugin {
    pub fn new() -> Self {
        let action = |name: &str, capability_id: &str, resource: Option<&str>| PluginActionManifest {
            name: name.to_string(),
            capability_id: capability_id.to_string(),
            risk_tier: RiskTier::Transactional,
            resource: resource.map(str::to_string),
            mutating: true,
            requires_idempotency: true,
            supports_propose: true,
            emits_attributes: vec![
                "principal".to_string(),
                "counterparty_domain".to_string(),
                "resource_type".to_string(),
            ],
        };

        let manifest = PluginManifest {
            id: "gmail".to_string(),
            name: "Gmail".to_string(),
            version: "0.1.0".to_string(),
            resources: vec![
                PluginResourceManifest {
                    name: "threads".to_string(),
                    capability_id: Some("gmail.threads.read".to_string()),
                    allowed_views: vec!["headers".to_string(), "body".to_string()],
                },
                PluginResourceManifest {
                    name: "messages".to_string(),
                    capability_id: Some("gmail.messages.read".to_string()),
                    allowed_views: vec!["headers".to_string(), "body".to_string(), "raw".to_string()],
                },
            ],
            actions: vec![
                action("reply", "gmail.message.reply", Some("messages")),
                action("archive", "gmail.message.archive", Some("messages")),
                action("send", "gmail.message.send", None),
            ],
            required_secrets: vec![],
            required_scopes: vec![],
            default_policy: Value::Null,
        };

        Self { manifest, messages: fixtures() }
    }

    fn find(&self, id: &str) -> Option<&GmailMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    fn policy_item_for(&self, message: &GmailMessage) -> PolicyItem {
        PolicyItem::new(format!("gmail:messages:{}", message.id))
            .with_attr("principal", message.to)
            .with_attr("counterparty_domain", domain_of(message.from))
            .with_attr("resource_type", "message")
    }

    fn list_messages(&self, query: &ReadQuery) -> CollectionResponse {
        let offset: usize = query.cursor.as_deref().and_then(|c| c.parse().ok()).unwrap_or(0);
        let limit = query.limit as usize;
        let page: Vec<&GmailMessage> = self.messages.iter().skip(offset).take(limit).collect();

        let items: Vec<Value> = page
            .iter()
            .map(|m| {
                json!({
                    "id": m.id,
                    "thread_id": m.thread_id,
                    "from": m.from,
                    "to": m.to,
                    "subject": m.subject,
                    "snippet": m.snippet,
                })
            })
            .collect();
        let policy_items = page.iter().map(|m| self.policy_item_for(m)).collect();

        let next_cursor = if offset + limit < self.messages.len() {
            Some((offset + limit).to_string())
        } else {
            None
        };

        CollectionResponse { items, next_cursor, policy_items }
    }

    fn list_threads(&self, query: &ReadQuery) -> CollectionResponse {
        let mut thread_ids: Vec<&str> = Vec::new();
        for message in &self.messages {
            if !thread_ids.contains(&message.thread_id) {
                thread_ids.push(message.thread_id);
            }
        }

        let offset: usize = query.cursor.as_deref().and_then(|c| c.parse().ok()).unwrap_or(0);
        let limit = query.limit as usize;
        let page: Vec<Value> = thread_ids
            .iter()
            .skip(offset)
            .take(limit)
            .map(|thread_id| json!({ "id": thread_id }))
            .collect();

        let next_cursor = if offset + limit < thread_ids.len() {
            Some((offset + limit).to_string())
        } else {
            None
        };

        CollectionResponse { items: page, next_cursor, policy_items: Vec::new() }
    }

    fn get_message(&self, resource_id: &str, view: Option<&str>) -> Result<InternalReadResult, CoreError> {
        let message = self
            .find(resource_id)
            .ok_or_else(|| CoreError::NotFound(format!("no such message '{resource_id}'")))?;

        let data = match view.unwrap_or("headers") {
            "headers" => json!({
                "id": message.id,
                "thread_id": message.thread_id,
                "from": message.from,
                "to": message.to,
                "subject": message.subject,
            }),
            "body" => json!({
                "id": message.id,
                "thread_id": message.thread_id,
                "body": message.body,
                "snippet": message.snippet,
            }),
            "raw" => json!({
                "id": message.id,
                "thread_id": message.thread_id,
                "raw": message.body,
            }),
            other => return Err(CoreError::NotFound(format!("unknown view '{other}'"))),
        };

        Ok(InternalReadResult { data, policy_items: vec![self.policy_item_for(message)] })
    }

    fn get_thread(&self, resource_id: &str, view: Option<&str>) -> Result<InternalReadResult, CoreError> {
        let members: Vec<&GmailMessage> = self.messages.iter().filter(|m| m.thread_id == resource_id).collect();
        if members.is_empty() {
            return Err(CoreError::NotFound(format!("no such thread '{resource_id}'")));
        }

        let data = match view.unwrap_or("headers") {
            "headers" => json!({
                "id": resource_id,
                "message_ids": members.iter().map(|m| m.id).collect::<Vec<_>>(),
            }),
            "body" => json!({
                "id": resource_id,
                "messages": members.iter().map(|m| json!({"id": m.id, "snippet": m.snippet})).collect::<Vec<_>>(),
            }),
            other => return Err(CoreError::NotFound(format!("unknown view '{other}'"))),
        };

        let policy_items = members.iter().map(|m| self.policy_item_for(m)).collect();
        Ok(InternalReadResult { data, policy_items })
    }

    fn reply(&self, ctx: &ActionContext, args: &Value) -> Result<InternalActionResult, CoreError> {
        let resource_id = ctx
            .resource_id
            .as_deref()
            .ok_or_else(|| CoreError::Validation("reply requires a message resource_id".to_string()))?;
        let message = self
            .find(resource_id)
            .ok_or_else(|| CoreError::NotFound(format!("no such message '{resource_id}'")))?;
        let body = args
            .get("body")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::Validation("reply requires a 'body' argument".to_string()))?;

        let proposed_effect = json!({
            "action": "reply",
            "to": message.from,
            "thread_id": message.thread_id,
            "body": body,
        });

        let mut result = json!({ "thread_id": message.thread_id });
        if ctx.phase == ActionPhase::Execute {
            result["sent_message_id"] = json!("sent_reply_001");
        }

        Ok(InternalActionResult {
            status: ActionStatus::Success,
            result,
            summary: Some(format!("Reply to {} in thread {}", message.from, message.thread_id)),
            proposed_effect,
            policy_items: vec![self.policy_item_for(message)],
        })
    }

    fn archive(&self, ctx: &ActionContext) -> Result<InternalActionResult, CoreError> {
        let resource_id = ctx
            .resource_id
            .as_deref()
            .ok_or_else(|| CoreError::Validation("archive requires a message resource_id".to_string()))?;
        let message = self
            .find(resource_id)
            .ok_or_else(|| CoreError::NotFound(format!("no such message '{resource_id}'")))?;

        Ok(InternalActionResult {
            status: ActionStatus::Success,
            result: json!({ "id": message.id, "archived": ctx.phase == ActionPhase::Execute }),
            summary: Some(format!("Archive message {}", message.id)),
            proposed_effect: json!({ "action": "archive", "id": message.id }),
            policy_items: vec![self.policy_item_for(message)],
        })
    }

    fn send(&self, ctx: &ActionContext, args: &Value) -> Result<InternalActionResult, CoreError> {
        let to = args
            .get("to")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::Validation("send requires a 'to' argument".to_string()))?;
        let body = args
            .get("body")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::Validation("send requires a 'body' argument".to_string()))?;

        let proposed_effect = json!({ "action": "send", "to": to, "body": body });

        let mut result = json!({ "to": to });
        if ctx.phase == ActionPhase::Execute {
            result["sent_message_id"] = json!("sent_new_001");
        }

        let policy_item = PolicyItem::new("gmail:messages:outgoing")
            .with_attr("principal", to)
            .with_attr("counterparty_domain", domain_of(to))
            .with_attr("resource_type", "message");

        Ok(InternalActionResult {
            status: ActionStatus::Success,
            result,
            summary: Some(format!("Send message to {to}")),
            proposed_effect,
            policy_items: vec![policy_item],
        })
    }
}

#[async_trait]
impl Plugin for GmailPlugin {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    async fn list_resource(&self, resource: &str, query: &ReadQuery) -> Result<CollectionResponse, CoreError> {
        match resource {
            "messages" => Ok(self.list_messages(query)),
            "threads" => Ok(self.list_threads(query)),
            other => Err(CoreError::NotFound(format!("no such resource '{other}'"))),
        }
    }

    async fn get_resource(
        &self,
        resource: &str,
        resource_id: &str,
        view: Option<&str>,
        _query: &ReadQuery,
    ) -> Result<InternalReadResult, CoreError> {
        match resource {
            "messages" => self.get_message(resource_id, view),
            "threads" => self.get_thread(resource_id, view),
            other => Err(CoreError::NotFound(format!("no such resource '{other}'"))),
        }
    }

    async fn run_action(&self, ctx: &ActionContext, args: &Value) -> Result<InternalActionResult, CoreError> {
        match ctx.action.as_str() {
            "reply" => self.reply(ctx, args),
            "archive" => self.archive(ctx),
            "send" => self.send(ctx, args),
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
    async fn list_messages_returns_both_fixtures() {
        let plugin = GmailPlugin::new();
        let page = plugin.list_resource("messages", &query()).await.unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn get_message_body_view_contains_unsanitized_markup() {
        let plugin = GmailPlugin::new();
        let result = plugin.get_resource("messages", "msg_allowed", Some("body"), &query()).await.unwrap();
        let body = result.data["body"].as_str().unwrap();
        assert!(body.contains("<b>"));
        assert!(body.contains("http"));
    }

    #[tokio::test]
    async fn reply_only_sets_sent_id_on_execute() {
        let plugin = GmailPlugin::new();
        let ctx = ActionContext {
            plugin_id: "gmail".to_string(),
            phase: ActionPhase::Propose,
            action: "reply".to_string(),
            resource: Some("messages".to_string()),
            resource_id: Some("msg_allowed".to_string()),
        };
        let proposed = plugin.run_action(&ctx, &json!({"body": "thanks"})).await.unwrap();
        assert!(proposed.result.get("sent_message_id").is_none());

        let ctx = ActionContext { phase: ActionPhase::Execute, ..ctx };
        let executed = plugin.run_action(&ctx, &json!({"body": "thanks"})).await.unwrap();
        assert_eq!(executed.result["sent_message_id"], json!("sent_reply_001"));
    }

    #[tokio::test]
    async fn reply_policy_item_flags_blocked_domain() {
        let plugin = GmailPlugin::new();
        let ctx = ActionContext {
            plugin_id: "gmail".to_string(),
            phase: ActionPhase::Execute,
            action: "reply".to_string(),
            resource: Some("messages".to_string()),
            resource_id: Some("msg_blocked".to_string()),
        };
        let result = plugin.run_action(&ctx, &json!({"body": "ok"})).await.unwrap();
        assert_eq!(result.policy_items[0].counterparty_domain(), Some("blocked.example"));
    }
}
