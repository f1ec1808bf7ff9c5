//! # Policy Engine
//!
//! Approval-gating decisions, domain blocking, view gating, and body
//! sanitization. Regex patterns are compiled once at construction time
//! (module-level compiled patterns in the original implementation; here,
//! `LazyLock` statics so every `PolicyEngine` instance shares one compiled
//! set).
//!
//! `requires_approval` implements the layered override design from the
//! specification: a risk-tier default, overridable per-plugin by an allow
//! list (forces no-approval) or a require list (forces approval), with a
//! global override layer underneath the plugin-scoped one. The
//! distillation this was drawn from only checked `risk_tier != read_only`;
//! this richer version is what actually ships.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::CoreError;
use crate::manifest::PluginActionManifest;
use crate::models::{ActionPhase, PolicyItem, RiskTier};

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").expect("valid regex"));
static HTML_TAG_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static WHITESPACE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@([^@\s]+)$").expect("valid regex"));

const DOMAIN_BEARING_ARGS: &[&str] = &["to", "cc", "bcc", "principal", "counterparty"];

/// Per-capability-pattern approval overrides, layered plugin-scoped over
/// global, read from `ACTION_APPROVAL_OVERRIDES_JSON`.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct ApprovalOverrides {
    /// Capability patterns that never require approval, regardless of tier.
    #[serde(default)]
    pub allow: Vec<String>,
    /// Capability patterns that always require approval, regardless of tier.
    #[serde(default)]
    pub require: Vec<String>,
}

impl ApprovalOverrides {
    /// A pattern either equals the capability id exactly, or ends in `*`
    /// and its prefix is a string-prefix of the capability id.
    fn matches(pattern: &str, capability_id: &str) -> bool {
        match pattern.strip_suffix('*') {
            Some(prefix) => capability_id.starts_with(prefix),
            None => pattern == capability_id,
        }
    }

    fn allows(&self, capability_id: &str) -> bool {
        self.allow.iter().any(|p| Self::matches(p, capability_id))
    }

    fn requires(&self, capability_id: &str) -> bool {
        self.require.iter().any(|p| Self::matches(p, capability_id))
    }

    /// Rejects patterns with a non-trailing `*` or more than one `*`, per
    /// the configuration-load-time validation the specification requires.
    pub fn validate_patterns(&self) -> Result<(), CoreError> {
        for pattern in self.allow.iter().chain(self.require.iter()) {
            validate_pattern(pattern)?;
        }
        Ok(())
    }

    /// Normalizes patterns for a plugin-scoped override set: a bare `"*"`
    /// becomes `"{plugin_id}.*"`, and any other pattern with no `.`-joined
    /// plugin prefix is given the `"{plugin_id}."` prefix, so a plugin's
    /// overrides can only ever match capabilities under that plugin.
    pub fn normalized_for_plugin(&self, plugin_id: &str) -> Self {
        Self {
            allow: self.allow.iter().map(|p| normalize_plugin_pattern(p, plugin_id)).collect(),
            require: self.require.iter().map(|p| normalize_plugin_pattern(p, plugin_id)).collect(),
        }
    }
}

fn validate_pattern(pattern: &str) -> Result<(), CoreError> {
    let stars = pattern.matches('*').count();
    if stars > 1 {
        return Err(CoreError::Validation(format!(
            "capability pattern '{pattern}' has more than one '*'"
        )));
    }
    if stars == 1 && !pattern.ends_with('*') {
        return Err(CoreError::Validation(format!(
            "capability pattern '{pattern}' has a non-trailing '*'"
        )));
    }
    Ok(())
}

fn normalize_plugin_pattern(pattern: &str, plugin_id: &str) -> String {
    if pattern == "*" {
        format!("{plugin_id}.*")
    } else if pattern.starts_with(&format!("{plugin_id}.")) {
        pattern.to_string()
    } else {
        format!("{plugin_id}.{pattern}")
    }
}

/// Whether `phase=execute` requires approval by default for each risk
/// tier, before any allow/require override is consulted. Read from
/// `ACTION_APPROVAL_DEFAULTS_JSON`; any tier missing from that JSON keeps
/// its baseline value.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RiskTierDefaults {
    pub read_only: bool,
    pub routine: bool,
    pub transactional: bool,
    pub dangerous: bool,
}

impl Default for RiskTierDefaults {
    fn default() -> Self {
        Self { read_only: false, routine: false, transactional: true, dangerous: true }
    }
}

impl RiskTierDefaults {
    fn for_tier(&self, tier: RiskTier) -> bool {
        match tier {
            RiskTier::ReadOnly => self.read_only,
            RiskTier::Routine => self.routine,
            RiskTier::Transactional => self.transactional,
            RiskTier::Dangerous => self.dangerous,
        }
    }
}

pub struct PolicyEngine {
    blocked_domains: HashSet<String>,
    default_limit: u32,
    max_limit: u32,
    default_body_max_chars: u32,
    raw_read_enabled: bool,
    risk_tier_defaults: RiskTierDefaults,
    global_overrides: ApprovalOverrides,
    plugin_overrides: HashMap<String, ApprovalOverrides>,
}

impl PolicyEngine {
    pub fn new(
        default_limit: u32,
        max_limit: u32,
        default_body_max_chars: u32,
        raw_read_enabled: bool,
        risk_tier_defaults: RiskTierDefaults,
        global_overrides: ApprovalOverrides,
        plugin_overrides: HashMap<String, ApprovalOverrides>,
    ) -> Self {
        let mut blocked_domains = HashSet::new();
        blocked_domains.insert("blocked.example".to_string());
        Self {
            blocked_domains,
            default_limit,
            max_limit,
            default_body_max_chars,
            raw_read_enabled,
            risk_tier_defaults,
            global_overrides,
            plugin_overrides,
        }
    }

    /// `None` defaults to `default_limit`; otherwise requires `L >= 1`,
    /// then caps at `max_limit`.
    pub fn normalize_limit(&self, requested: Option<u32>) -> Result<u32, CoreError> {
        match requested {
            None => Ok(self.default_limit),
            Some(0) => Err(CoreError::Validation("limit must be >= 1".to_string())),
            Some(limit) => Ok(limit.min(self.max_limit)),
        }
    }

    /// `None` defaults to `default_body_max_chars`; otherwise requires
    /// `>= 1`, then caps at `default_body_max_chars`.
    pub fn normalize_max_chars(&self, requested: Option<u32>) -> Result<u32, CoreError> {
        match requested {
            None => Ok(self.default_body_max_chars),
            Some(0) => Err(CoreError::Validation("max_chars must be >= 1".to_string())),
            Some(max_chars) => Ok(max_chars.min(self.default_body_max_chars)),
        }
    }

    /// Whether `phase=execute` of this action requires a human approval
    /// ticket before it may run, given plugin-scoped then global overrides
    /// layered over the risk-tier default.
    pub fn requires_approval(&self, plugin_id: &str, action: &PluginActionManifest, phase: ActionPhase) -> bool {
        if phase != ActionPhase::Execute {
            return false;
        }

        if let Some(overrides) = self.plugin_overrides.get(plugin_id) {
            if overrides.allows(&action.capability_id) {
                return false;
            }
            if overrides.requires(&action.capability_id) {
                return true;
            }
        }

        if self.global_overrides.allows(&action.capability_id) {
            return false;
        }
        if self.global_overrides.requires(&action.capability_id) {
            return true;
        }

        self.risk_tier_defaults.for_tier(action.risk_tier)
    }

    pub fn validate_action_request(
        &self,
        action: &PluginActionManifest,
        idempotency_key: Option<&str>,
        phase: ActionPhase,
        args: &serde_json::Map<String, Value>,
    ) -> Result<(), CoreError> {
        if phase == ActionPhase::Execute && action.requires_idempotency && idempotency_key.is_none() {
            return Err(CoreError::IdempotencyKeyRequired(format!(
                "action '{}' requires an idempotency key on execute",
                action.name
            )));
        }

        for domain in self.extract_domains_from_args(args) {
            if self.blocked_domains.contains(&domain) {
                return Err(CoreError::policy_blocked());
            }
        }

        Ok(())
    }

    pub fn enforce_view_policy(&self, resource_allows_view: bool, view: &str) -> Result<(), CoreError> {
        if view == "raw" && !self.raw_read_enabled {
            return Err(CoreError::PolicyBlocked("raw view is disabled".to_string()));
        }
        if !resource_allows_view {
            return Err(CoreError::PolicyBlocked(format!("view '{view}' is not allowed on this resource")));
        }
        Ok(())
    }

    /// Filters a collection, dropping `items[i]` whenever `policy_items[i]`
    /// is present and its `counterparty_domain` attribute is blocked. An
    /// item with no corresponding policy attestation (plugin emitted fewer
    /// attestations than items, or none at all) is always kept.
    pub fn apply_collection_policy(&self, items: Vec<Value>, policy_items: &[PolicyItem]) -> Vec<Value> {
        items
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !policy_items.get(*i).is_some_and(|p| self.is_blocked(p)))
            .map(|(_, item)| item)
            .collect()
    }

    pub fn apply_single_item_policy(&self, policy_item: &PolicyItem) -> Result<(), CoreError> {
        if self.is_blocked(policy_item) {
            return Err(CoreError::policy_blocked());
        }
        Ok(())
    }

    pub fn enforce_action_policy(&self, policy_items: &[PolicyItem]) -> Result<(), CoreError> {
        for item in policy_items {
            self.apply_single_item_policy(item)?;
        }
        Ok(())
    }

    fn is_blocked(&self, policy_item: &PolicyItem) -> bool {
        policy_item
            .counterparty_domain()
            .map(|domain| self.blocked_domains.contains(&domain.to_lowercase()))
            .unwrap_or(false)
    }

    fn extract_domains_from_args(&self, args: &serde_json::Map<String, Value>) -> Vec<String> {
        DOMAIN_BEARING_ARGS
            .iter()
            .filter_map(|key| args.get(*key))
            .flat_map(|value| match value {
                Value::String(s) => vec![s.clone()],
                Value::Array(items) => items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
                _ => Vec::new(),
            })
            .filter_map(|raw| Self::domain_for(&raw))
            .collect()
    }

    fn domain_for(value: &str) -> Option<String> {
        EMAIL_PATTERN.captures(value).map(|c| c[1].to_lowercase())
    }

    /// Strips URLs, then HTML tags (replaced with a space), collapses
    /// whitespace, trims, and truncates — in that exact order, matching the
    /// original implementation's `sanitize_body_payload`.
    pub fn sanitize_body_payload(&self, text: &str, max_chars: u32) -> String {
        let no_urls = URL_PATTERN.replace_all(text, "");
        let no_tags = HTML_TAG_PATTERN.replace_all(&no_urls, " ");
        let collapsed = WHITESPACE_PATTERN.replace_all(&no_tags, " ");
        let trimmed = collapsed.trim();
        let max = max_chars as usize;
        if trimmed.chars().count() > max {
            trimmed.chars().take(max).collect()
        } else {
            trimmed.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> PolicyEngine {
        PolicyEngine::new(20, 100, 1200, false, RiskTierDefaults::default(), ApprovalOverrides::default(), HashMap::new())
    }

    fn action(risk_tier: RiskTier, requires_idempotency: bool) -> PluginActionManifest {
        PluginActionManifest {
            name: "reply".to_string(),
            capability_id: "gmail.message.reply".to_string(),
            risk_tier,
            resource: Some("messages".to_string()),
            mutating: true,
            requires_idempotency,
            supports_propose: true,
            emits_attributes: vec!["principal".to_string()],
        }
    }

    #[test]
    fn propose_never_requires_approval() {
        let engine = engine();
        let action = action(RiskTier::Dangerous, true);
        assert!(!engine.requires_approval("gmail", &action, ActionPhase::Propose));
    }

    #[test]
    fn read_only_execute_does_not_require_approval() {
        let engine = engine();
        let action = action(RiskTier::ReadOnly, false);
        assert!(!engine.requires_approval("gmail", &action, ActionPhase::Execute));
    }

    #[test]
    fn transactional_execute_requires_approval_by_default() {
        let engine = engine();
        let action = action(RiskTier::Transactional, true);
        assert!(engine.requires_approval("gmail", &action, ActionPhase::Execute));
    }

    #[test]
    fn plugin_scoped_allow_overrides_default() {
        let mut plugin_overrides = HashMap::new();
        plugin_overrides.insert(
            "gmail".to_string(),
            ApprovalOverrides {
                allow: vec!["gmail.message.*".to_string()],
                require: vec![],
            },
        );
        let engine = PolicyEngine::new(20, 100, 1200, false, RiskTierDefaults::default(), ApprovalOverrides::default(), plugin_overrides);
        let action = action(RiskTier::Transactional, true);
        assert!(!engine.requires_approval("gmail", &action, ActionPhase::Execute));
    }

    #[test]
    fn global_require_overrides_read_only_default() {
        let global = ApprovalOverrides {
            allow: vec![],
            require: vec!["gmail.message.reply".to_string()],
        };
        let engine = PolicyEngine::new(20, 100, 1200, false, RiskTierDefaults::default(), global, HashMap::new());
        let action = action(RiskTier::ReadOnly, false);
        assert!(engine.requires_approval("gmail", &action, ActionPhase::Execute));
    }

    #[test]
    fn idempotency_key_required_on_execute_only() {
        let engine = engine();
        let action = action(RiskTier::Transactional, true);
        let args = serde_json::Map::new();
        assert!(engine
            .validate_action_request(&action, None, ActionPhase::Execute, &args)
            .is_err());
        assert!(engine
            .validate_action_request(&action, None, ActionPhase::Propose, &args)
            .is_ok());
    }

    #[test]
    fn blocked_domain_in_args_is_rejected() {
        let engine = engine();
        let action = action(RiskTier::Transactional, true);
        let mut args = serde_json::Map::new();
        args.insert("to".to_string(), Value::String("mallory@blocked.example".to_string()));
        let result = engine.validate_action_request(&action, Some("key-1"), ActionPhase::Execute, &args);
        assert!(matches!(result, Err(CoreError::PolicyBlocked(_))));
    }

    #[test]
    fn sanitize_body_strips_urls_tags_and_collapses_whitespace() {
        let engine = engine();
        let sanitized = engine.sanitize_body_payload("Hi <b>there</b>  visit http://evil.example now", 1200);
        assert!(!sanitized.contains("http"));
        assert!(!sanitized.contains('<'));
        assert_eq!(sanitized, "Hi there visit now");
    }

    #[test]
    fn sanitize_body_truncates_to_max_chars() {
        let engine = engine();
        let sanitized = engine.sanitize_body_payload("a b c d e f g h i j", 5);
        assert_eq!(sanitized.chars().count(), 5);
    }

    #[test]
    fn raw_view_blocked_when_disabled() {
        let engine = engine();
        assert!(engine.enforce_view_policy(true, "raw").is_err());
    }

    #[test]
    fn normalize_limit_rejects_zero_and_caps_at_max() {
        let engine = engine();
        assert!(matches!(engine.normalize_limit(Some(0)), Err(CoreError::Validation(_))));
        assert_eq!(engine.normalize_limit(None).unwrap(), 20);
        assert_eq!(engine.normalize_limit(Some(5)).unwrap(), 5);
        assert_eq!(engine.normalize_limit(Some(1000)).unwrap(), 100);
    }

    #[test]
    fn normalize_max_chars_rejects_zero_and_caps_at_default() {
        let engine = engine();
        assert!(matches!(engine.normalize_max_chars(Some(0)), Err(CoreError::Validation(_))));
        assert_eq!(engine.normalize_max_chars(None).unwrap(), 1200);
        assert_eq!(engine.normalize_max_chars(Some(50)).unwrap(), 50);
        assert_eq!(engine.normalize_max_chars(Some(50_000)).unwrap(), 1200);
    }

    #[test]
    fn collection_policy_drops_only_the_blocked_indexed_item() {
        let engine = engine();
        let items = vec![json!({"id": "ok"}), json!({"id": "blocked"}), json!({"id": "no_attestation"})];
        let policy_items = vec![
            PolicyItem::new("a").with_attr("counterparty_domain", "corp.com"),
            PolicyItem::new("b").with_attr("counterparty_domain", "blocked.example"),
        ];
        let filtered = engine.apply_collection_policy(items, &policy_items);
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0]["id"], "ok");
        assert_eq!(filtered[1]["id"], "no_attestation");
    }

    #[test]
    fn trailing_wildcard_pattern_matches_by_prefix() {
        assert!(ApprovalOverrides::matches("gmail.mess*", "gmail.messages.reply"));
        assert!(!ApprovalOverrides::matches("gmail.mess*", "gmail.other.reply"));
        assert!(ApprovalOverrides::matches("*", "anything"));
    }

    #[test]
    fn non_trailing_or_multiple_wildcards_are_rejected() {
        let bad_infix = ApprovalOverrides { allow: vec!["gmail.*.reply".to_string()], require: vec![] };
        assert!(bad_infix.validate_patterns().is_err());

        let bad_multi = ApprovalOverrides { allow: vec!["gmail.*.*".to_string()], require: vec![] };
        assert!(bad_multi.validate_patterns().is_err());

        let good = ApprovalOverrides { allow: vec!["gmail.mess*".to_string()], require: vec![] };
        assert!(good.validate_patterns().is_ok());
    }

    #[test]
    fn plugin_scoped_patterns_are_normalized_with_the_plugin_prefix() {
        let overrides = ApprovalOverrides { allow: vec!["*".to_string(), "message.reply".to_string()], require: vec![] };
        let normalized = overrides.normalized_for_plugin("gmail");
        assert_eq!(normalized.allow, vec!["gmail.*".to_string(), "gmail.message.reply".to_string()]);
    }

    #[test]
    fn plugin_scoped_pattern_already_prefixed_is_left_unchanged() {
        let overrides = ApprovalOverrides { allow: vec!["gmail.message.*".to_string()], require: vec![] };
        let normalized = overrides.normalized_for_plugin("gmail");
        assert_eq!(normalized.allow, vec!["gmail.message.*".to_string()]);
    }
}
