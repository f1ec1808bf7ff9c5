//! # Configuration Management Module
//!
//! Environment-variable driven configuration, loaded from the process
//! environment plus an optional `.env` file via `dotenvy`. There is no
//! configuration file format: every setting is named by an environment
//! variable, matching the reference implementation's `core/config.py`.
//!
//! ## Environment Variables
//!
//! - `CLAWGATE_API_HOST` / `CLAWGATE_API_PORT`: server bind address
//! - `ENABLE_API_ALIAS`: also mount every route under `/api`
//! - `ENABLE_RAW_READ`: allow the `raw` resource view
//! - `REQUIRE_AUTH`: whether bearer-token authentication is enforced
//! - `AGENT_TOKENS_JSON`: JSON array of token records
//! - `ACTION_APPROVAL_DEFAULTS_JSON`: risk-tier → bool map, overriding the
//!   baseline `{read_only: false, routine: false, transactional: true,
//!   dangerous: true}` approval defaults
//! - `ACTION_APPROVAL_OVERRIDES_JSON`: `{global?: {allow?[], require?[]},
//!   plugins?: {<plugin_id>: {allow?[], require?[]}}}` capability-pattern
//!   overrides
//! - `SIDECAR_PLUGINS_JSON`: JSON array of sidecar plugin configs
//! - `CLAWGATE_DEFAULT_LIMIT` / `CLAWGATE_MAX_LIMIT`: list pagination bounds
//! - `CLAWGATE_DEFAULT_BODY_MAX_CHARS`: default sanitized body truncation

use std::collections::HashMap;
use std::env;

use clawgate_core::policy::{ApprovalOverrides, RiskTierDefaults};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
struct ApprovalOverridesConfig {
    #[serde(default)]
    global: ApprovalOverrides,
    #[serde(default)]
    plugins: HashMap<String, ApprovalOverrides>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_prefix: String,
    pub api_host: String,
    pub api_port: u16,
    pub enable_api_alias: bool,
    pub default_limit: u32,
    pub max_limit: u32,
    pub default_body_max_chars: u32,
    pub raw_read_enabled: bool,
    pub require_auth: bool,
    pub agent_tokens_json: Option<String>,
    pub action_approval_defaults_json: Option<String>,
    pub action_approval_overrides_json: Option<String>,
    pub sidecar_plugins_json: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_prefix: "/v1".to_string(),
            api_host: "0.0.0.0".to_string(),
            api_port: 8117,
            enable_api_alias: false,
            default_limit: 20,
            max_limit: 100,
            default_body_max_chars: 1200,
            raw_read_enabled: false,
            require_auth: true,
            agent_tokens_json: None,
            action_approval_defaults_json: None,
            action_approval_overrides_json: None,
            sidecar_plugins_json: None,
        }
    }
}

impl Settings {
    /// Loads a `.env` file if present, then builds settings from the
    /// process environment. Missing variables fall back to defaults;
    /// malformed values are reported as `anyhow::Error`.
    pub fn load() -> anyhow::Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!("no .env file loaded: {e}");
        }

        let mut settings = Settings::default();

        if let Ok(host) = env::var("CLAWGATE_API_HOST") {
            if !host.is_empty() {
                settings.api_host = host;
            }
        }

        if let Ok(port) = env::var("CLAWGATE_API_PORT") {
            settings.api_port = port
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid CLAWGATE_API_PORT: {port}"))?;
        }

        settings.enable_api_alias = env_bool("ENABLE_API_ALIAS", settings.enable_api_alias)?;
        settings.raw_read_enabled = env_bool("ENABLE_RAW_READ", settings.raw_read_enabled)?;
        settings.require_auth = env_bool("REQUIRE_AUTH", settings.require_auth)?;

        if let Ok(limit) = env::var("CLAWGATE_DEFAULT_LIMIT") {
            settings.default_limit = limit
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid CLAWGATE_DEFAULT_LIMIT: {limit}"))?;
        }
        if let Ok(limit) = env::var("CLAWGATE_MAX_LIMIT") {
            settings.max_limit = limit
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid CLAWGATE_MAX_LIMIT: {limit}"))?;
        }
        if let Ok(chars) = env::var("CLAWGATE_DEFAULT_BODY_MAX_CHARS") {
            settings.default_body_max_chars = chars
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid CLAWGATE_DEFAULT_BODY_MAX_CHARS: {chars}"))?;
        }

        settings.agent_tokens_json = env::var("AGENT_TOKENS_JSON").ok();
        settings.action_approval_defaults_json = env::var("ACTION_APPROVAL_DEFAULTS_JSON").ok();
        settings.action_approval_overrides_json = env::var("ACTION_APPROVAL_OVERRIDES_JSON").ok();
        settings.sidecar_plugins_json = env::var("SIDECAR_PLUGINS_JSON").ok();

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_host.is_empty() {
            return Err(anyhow::anyhow!("api_host cannot be empty"));
        }
        if self.api_port == 0 {
            return Err(anyhow::anyhow!("api_port must be between 1 and 65535"));
        }
        if self.default_limit == 0 || self.default_limit > self.max_limit {
            return Err(anyhow::anyhow!(
                "default_limit ({}) must be nonzero and <= max_limit ({})",
                self.default_limit,
                self.max_limit
            ));
        }
        Ok(())
    }

    /// Parses `ACTION_APPROVAL_DEFAULTS_JSON` (risk-tier → bool map).
    pub fn risk_tier_defaults(&self) -> anyhow::Result<RiskTierDefaults> {
        match &self.action_approval_defaults_json {
            None => Ok(RiskTierDefaults::default()),
            Some(raw) => serde_json::from_str(raw)
                .map_err(|e| anyhow::anyhow!("invalid ACTION_APPROVAL_DEFAULTS_JSON: {e}")),
        }
    }

    /// Parses `ACTION_APPROVAL_OVERRIDES_JSON` into a global override set
    /// plus a per-plugin override map. Every pattern is validated (no
    /// non-trailing or multiple `*`) and plugin-scoped patterns are
    /// normalized to carry their plugin's `.`-prefix before the policy
    /// engine ever sees them.
    pub fn approval_overrides(&self) -> anyhow::Result<(ApprovalOverrides, HashMap<String, ApprovalOverrides>)> {
        match &self.action_approval_overrides_json {
            None => Ok((ApprovalOverrides::default(), HashMap::new())),
            Some(raw) => {
                let parsed: ApprovalOverridesConfig = serde_json::from_str(raw)
                    .map_err(|e| anyhow::anyhow!("invalid ACTION_APPROVAL_OVERRIDES_JSON: {e}"))?;

                parsed.global.validate_patterns()?;

                let mut plugins = HashMap::with_capacity(parsed.plugins.len());
                for (plugin_id, overrides) in parsed.plugins {
                    overrides.validate_patterns()?;
                    plugins.insert(plugin_id.clone(), overrides.normalized_for_plugin(&plugin_id));
                }

                Ok((parsed.global, plugins))
            }
        }
    }
}

fn env_bool(name: &str, default: bool) -> anyhow::Result<bool> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid {name}: expected 'true' or 'false', got '{raw}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn default_limit_above_max_limit_is_rejected() {
        let settings = Settings { default_limit: 200, max_limit: 100, ..Settings::default() };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn missing_approval_overrides_yield_empty_defaults() {
        let settings = Settings::default();
        let (global, plugins) = settings.approval_overrides().unwrap();
        assert!(global.allow.is_empty());
        assert!(plugins.is_empty());
    }

    #[test]
    fn missing_risk_tier_defaults_yield_baseline() {
        let settings = Settings::default();
        let defaults = settings.risk_tier_defaults().unwrap();
        assert!(!defaults.routine);
        assert!(defaults.transactional);
    }
}
