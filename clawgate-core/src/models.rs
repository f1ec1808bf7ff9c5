//! # Data Model
//!
//! The value types exchanged between the mediator, the policy engine, and
//! plugins. `PolicyItem::attrs` carries arbitrary plugin-attested data as
//! `serde_json::Value` — a JSON value already is the tagged union of
//! string/number/bool/null/list/map the wire format calls for.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    ReadOnly,
    Routine,
    Transactional,
    Dangerous,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeMode {
    InProcess,
    Sidecar,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionPhase {
    Propose,
    Execute,
}

impl ActionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Propose => "propose",
            Self::Execute => "execute",
        }
    }
}

impl std::str::FromStr for ActionPhase {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "propose" => Ok(Self::Propose),
            "execute" => Ok(Self::Execute),
            other => Err(format!("unknown phase '{other}'")),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Success,
    Blocked,
}

/// Normalized read query passed to a plugin's `list_resource`/`get_resource`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReadQuery {
    pub limit: u32,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub filters: HashMap<String, String>,
    #[serde(default)]
    pub max_chars: Option<u32>,
}

/// `policy_items[i]`, when present, is the attestation for `items[i]`. A
/// plugin whose items never carry policy-sensitive data (no counterparty)
/// may leave this empty; the policy engine then lets every item through.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct CollectionResponse {
    pub items: Vec<Value>,
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub policy_items: Vec<PolicyItem>,
}

/// An attestation a plugin emits about a piece of returned or acted-upon
/// data, used by the policy engine to filter or block.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct PolicyItem {
    pub data_ref: String,
    #[serde(default)]
    pub attrs: HashMap<String, Value>,
}

impl PolicyItem {
    pub fn new(data_ref: impl Into<String>) -> Self {
        Self {
            data_ref: data_ref.into(),
            attrs: HashMap::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn counterparty_domain(&self) -> Option<&str> {
        self.attrs.get("counterparty_domain").and_then(Value::as_str)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct InternalReadResult {
    pub data: Value,
    #[serde(default)]
    pub policy_items: Vec<PolicyItem>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InternalActionResult {
    #[serde(default = "default_action_status")]
    pub status: ActionStatus,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub proposed_effect: Value,
    #[serde(default)]
    pub policy_items: Vec<PolicyItem>,
}

fn default_action_status() -> ActionStatus {
    ActionStatus::Success
}

impl Default for InternalActionResult {
    fn default() -> Self {
        Self {
            status: ActionStatus::Success,
            result: Value::Object(Default::default()),
            summary: None,
            proposed_effect: Value::Object(Default::default()),
            policy_items: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PluginSummary {
    pub id: String,
    pub name: String,
    pub version: String,
    pub runtime_mode: RuntimeMode,
}

/// A server-side record pausing an execute for human approval. Terminal
/// once `status != pending`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApprovalTicket {
    pub id: String,
    pub status: ApprovalStatus,
    pub summary: String,
    #[serde(default)]
    pub proposed_effect: Value,
    pub fingerprint: String,
    pub capability_id: String,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
        }
    }
}

/// An authenticated agent and the capabilities it was granted.
#[derive(Clone, Debug)]
pub struct AgentPrincipal {
    pub agent_id: String,
    pub network_identity: String,
    pub capabilities: Vec<String>,
}

impl AgentPrincipal {
    pub fn can(&self, capability_id: &str) -> bool {
        self.capabilities.iter().any(|granted| {
            granted == "*"
                || granted == capability_id
                || granted
                    .strip_suffix(".*")
                    .is_some_and(|prefix| capability_id.starts_with(&format!("{prefix}.")))
        })
    }
}

/// A server-side bearer token record, as configured via `AGENT_TOKENS_JSON`.
#[derive(Clone, Debug, Deserialize)]
pub struct TokenRecord {
    pub token: String,
    pub agent_id: String,
    #[serde(default = "default_wildcard")]
    pub tailscale_identity: String,
    pub capabilities: Vec<String>,
}

fn default_wildcard() -> String {
    "*".to_string()
}

/// The request body for action routes: `{idempotency_key?, reason?, args}`.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct ActionRequest {
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub args: Value,
}

impl ActionRequest {
    pub fn args_object(&self) -> serde_json::Map<String, Value> {
        self.args.as_object().cloned().unwrap_or_default()
    }
}
