//! # Plugin Manifests
//!
//! The declarative shape of a plugin: the resources it exposes for reading
//! and the actions it exposes for execution. Validated once, at registry
//! construction time, so a malformed manifest fails fast at startup rather
//! than on first request.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::models::RiskTier;

static SNAKE_CASE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("valid regex"));

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PluginResourceManifest {
    pub name: String,
    #[serde(default)]
    pub capability_id: Option<String>,
    #[serde(default)]
    pub allowed_views: Vec<String>,
}

impl PluginResourceManifest {
    pub fn allows_view(&self, view: &str) -> bool {
        self.allowed_views.iter().any(|v| v == view)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PluginActionManifest {
    pub name: String,
    pub capability_id: String,
    pub risk_tier: RiskTier,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub mutating: bool,
    #[serde(default)]
    pub requires_idempotency: bool,
    #[serde(default)]
    pub supports_propose: bool,
    /// Attribute keys this action's policy items may carry, e.g.
    /// `["counterparty_domain"]` for an action whose attestations can
    /// trigger the domain blocklist. Declared up front so policy coverage
    /// can be audited from the manifest alone.
    #[serde(default)]
    pub emits_attributes: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PluginManifest {
    pub id: String,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub resources: Vec<PluginResourceManifest>,
    pub actions: Vec<PluginActionManifest>,
    #[serde(default)]
    pub required_secrets: Vec<String>,
    #[serde(default)]
    pub required_scopes: Vec<String>,
    #[serde(default)]
    pub default_policy: Value,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

impl PluginManifest {
    /// Structural and cross-field validation, mirroring the original
    /// implementation's pydantic validators: snake_case names, unique
    /// resource names, unique (action name, resource) pairs, non-empty
    /// action list.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !SNAKE_CASE.is_match(&self.id) {
            return Err(CoreError::Config(format!(
                "plugin id '{}' is not snake_case",
                self.id
            )));
        }
        if self.actions.is_empty() {
            return Err(CoreError::Config(format!(
                "plugin '{}' declares no actions",
                self.id
            )));
        }

        let mut resource_names = HashSet::new();
        for resource in &self.resources {
            if !SNAKE_CASE.is_match(&resource.name) {
                return Err(CoreError::Config(format!(
                    "plugin '{}' resource name '{}' is not snake_case",
                    self.id, resource.name
                )));
            }
            if !resource_names.insert(resource.name.clone()) {
                return Err(CoreError::Config(format!(
                    "plugin '{}' declares resource '{}' twice",
                    self.id, resource.name
                )));
            }
        }

        let mut action_keys = HashSet::new();
        for action in &self.actions {
            if !SNAKE_CASE.is_match(&action.name) {
                return Err(CoreError::Config(format!(
                    "plugin '{}' action name '{}' is not snake_case",
                    self.id, action.name
                )));
            }
            if let Some(resource) = &action.resource {
                if !resource_names.contains(resource) {
                    return Err(CoreError::Config(format!(
                        "plugin '{}' action '{}' references unknown resource '{}'",
                        self.id, action.name, resource
                    )));
                }
            }
            if action.emits_attributes.is_empty() {
                return Err(CoreError::Config(format!(
                    "plugin '{}' action '{}' declares no emits_attributes",
                    self.id, action.name
                )));
            }
            let key = (action.name.clone(), action.resource.clone());
            if !action_keys.insert(key) {
                return Err(CoreError::Config(format!(
                    "plugin '{}' declares action '{}' on resource {:?} twice",
                    self.id, action.name, action.resource
                )));
            }
        }

        Ok(())
    }

    pub fn resource(&self, name: &str) -> Option<&PluginResourceManifest> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub fn action(&self, name: &str, resource: Option<&str>) -> Option<&PluginActionManifest> {
        self.actions
            .iter()
            .find(|a| a.name == name && a.resource.as_deref() == resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(name: &str, resource: Option<&str>) -> PluginActionManifest {
        PluginActionManifest {
            name: name.to_string(),
            capability_id: format!("gmail.{name}"),
            risk_tier: RiskTier::Transactional,
            resource: resource.map(str::to_string),
            mutating: true,
            requires_idempotency: true,
            supports_propose: true,
            emits_attributes: vec!["principal".to_string()],
        }
    }

    #[test]
    fn rejects_non_snake_case_id() {
        let manifest = PluginManifest {
            id: "Gmail".to_string(),
            name: "Gmail".to_string(),
            version: default_version(),
            resources: vec![],
            actions: vec![action("send", None)],
            required_secrets: vec![],
            required_scopes: vec![],
            default_policy: Value::Null,
        };
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_action_resource_pair() {
        let manifest = PluginManifest {
            id: "gmail".to_string(),
            name: "Gmail".to_string(),
            version: default_version(),
            resources: vec![],
            actions: vec![action("send", None), action("send", None)],
            required_secrets: vec![],
            required_scopes: vec![],
            default_policy: Value::Null,
        };
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn accepts_well_formed_manifest() {
        let manifest = PluginManifest {
            id: "gmail".to_string(),
            name: "Gmail".to_string(),
            version: default_version(),
            resources: vec![PluginResourceManifest {
                name: "messages".to_string(),
                capability_id: Some("gmail.messages.read".to_string()),
                allowed_views: vec!["headers".to_string(), "body".to_string()],
            }],
            actions: vec![action("reply", Some("messages")), action("send", None)],
            required_secrets: vec![],
            required_scopes: vec![],
            default_policy: Value::Null,
        };
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn rejects_action_with_no_emits_attributes() {
        let mut send = action("send", None);
        send.emits_attributes = vec![];
        let manifest = PluginManifest {
            id: "gmail".to_string(),
            name: "Gmail".to_string(),
            version: default_version(),
            resources: vec![],
            actions: vec![send],
            required_secrets: vec![],
            required_scopes: vec![],
            default_policy: Value::Null,
        };
        assert!(manifest.validate().is_err());
    }
}
