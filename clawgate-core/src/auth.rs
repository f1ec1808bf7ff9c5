//! # Authentication Service
//!
//! Bearer-token authentication against a fixed, environment-configured
//! token table, plus the capability-matching `require_capability` gate that
//! every action and resource route calls before touching a plugin.
//!
//! When `AGENT_TOKENS_JSON` is unset the service seeds a single
//! `dev-local-token` record bound to `*`/`*`, the same default the original
//! implementation falls back to — logged at `warn` since it is unsafe for
//! anything but local development.

use std::collections::HashMap;

use crate::error::CoreError;
use crate::models::{AgentPrincipal, TokenRecord};

pub struct AuthService {
    require_auth: bool,
    tokens: HashMap<String, TokenRecord>,
}

const DEV_LOCAL_TOKEN: &str = "dev-local-token";

impl AuthService {
    pub fn new(require_auth: bool, tokens_json: Option<&str>) -> Result<Self, CoreError> {
        let tokens = match tokens_json {
            Some(raw) => Self::parse_tokens(raw)?,
            None => {
                tracing::warn!(
                    "AGENT_TOKENS_JSON is unset; seeding insecure default token '{DEV_LOCAL_TOKEN}' with full access"
                );
                let mut map = HashMap::new();
                map.insert(
                    DEV_LOCAL_TOKEN.to_string(),
                    TokenRecord {
                        token: DEV_LOCAL_TOKEN.to_string(),
                        agent_id: "dev".to_string(),
                        tailscale_identity: "*".to_string(),
                        capabilities: vec!["*".to_string()],
                    },
                );
                map
            }
        };
        Ok(Self { require_auth, tokens })
    }

    fn parse_tokens(raw: &str) -> Result<HashMap<String, TokenRecord>, CoreError> {
        let records: Vec<TokenRecord> = serde_json::from_str(raw)
            .map_err(|e| CoreError::Config(format!("invalid AGENT_TOKENS_JSON: {e}")))?;
        let mut map = HashMap::new();
        for record in records {
            if record.token.is_empty() {
                return Err(CoreError::Config("AGENT_TOKENS_JSON entry has an empty token".to_string()));
            }
            if record.capabilities.is_empty() {
                return Err(CoreError::Config(format!(
                    "AGENT_TOKENS_JSON entry for agent '{}' has no capabilities",
                    record.agent_id
                )));
            }
            map.insert(record.token.clone(), record);
        }
        Ok(map)
    }

    /// Authenticates a request given its `Authorization: Bearer <token>`
    /// header value (already stripped of the `Bearer ` prefix) and the
    /// network-identity header, if any.
    pub fn authenticate(
        &self,
        bearer_token: Option<&str>,
        network_identity: Option<&str>,
    ) -> Result<AgentPrincipal, CoreError> {
        if !self.require_auth {
            return Ok(AgentPrincipal {
                agent_id: "*".to_string(),
                network_identity: "*".to_string(),
                capabilities: vec!["*".to_string()],
            });
        }

        let token = bearer_token.ok_or_else(|| CoreError::Unauthorized("missing bearer token".to_string()))?;
        let identity = network_identity
            .ok_or_else(|| CoreError::Unauthorized("missing X-Tailscale-Identity header".to_string()))?;
        let record = self
            .tokens
            .get(token)
            .ok_or_else(|| CoreError::Unauthorized("unknown bearer token".to_string()))?;

        if record.tailscale_identity != "*" && record.tailscale_identity != identity {
            return Err(CoreError::Unauthorized("network identity does not match token".to_string()));
        }

        Ok(AgentPrincipal {
            agent_id: record.agent_id.clone(),
            network_identity: identity.to_string(),
            capabilities: record.capabilities.clone(),
        })
    }

    pub fn require_capability(&self, principal: &AgentPrincipal, capability_id: &str) -> Result<(), CoreError> {
        if principal.can(capability_id) {
            Ok(())
        } else {
            Err(CoreError::CapabilityDenied(format!(
                "agent '{}' lacks capability '{capability_id}'",
                principal.agent_id
            )))
        }
    }

    pub fn extract_bearer(header_value: Option<&str>) -> Option<&str> {
        header_value.and_then(|v| v.strip_prefix("Bearer "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_auth_grants_wildcard_principal() {
        let service = AuthService::new(false, None).unwrap();
        let principal = service.authenticate(None, None).unwrap();
        assert!(principal.can("anything.at.all"));
    }

    #[test]
    fn missing_token_json_seeds_dev_default() {
        let service = AuthService::new(true, None).unwrap();
        let principal = service.authenticate(Some(DEV_LOCAL_TOKEN), Some("any-host")).unwrap();
        assert_eq!(principal.agent_id, "dev");
    }

    #[test]
    fn unknown_token_is_rejected() {
        let service = AuthService::new(true, None).unwrap();
        assert!(service.authenticate(Some("nope"), Some("any-host")).is_err());
    }

    #[test]
    fn missing_network_identity_header_is_rejected() {
        let service = AuthService::new(true, None).unwrap();
        assert!(service.authenticate(Some(DEV_LOCAL_TOKEN), None).is_err());
    }

    #[test]
    fn network_identity_mismatch_is_rejected() {
        let json = r#"[{"token":"t1","agent_id":"a1","tailscale_identity":"host-a","capabilities":["*"]}]"#;
        let service = AuthService::new(true, Some(json)).unwrap();
        assert!(service.authenticate(Some("t1"), Some("host-b")).is_err());
        assert!(service.authenticate(Some("t1"), Some("host-a")).is_ok());
    }

    #[test]
    fn capability_matching_supports_wildcard_and_prefix() {
        let principal = AgentPrincipal {
            agent_id: "a".to_string(),
            network_identity: "*".to_string(),
            capabilities: vec!["gmail.messages.*".to_string()],
        };
        assert!(principal.can("gmail.messages.read"));
        assert!(!principal.can("gmail.threads.read"));
    }

    #[test]
    fn extract_bearer_strips_prefix() {
        assert_eq!(AuthService::extract_bearer(Some("Bearer abc")), Some("abc"));
        assert_eq!(AuthService::extract_bearer(Some("abc")), None);
    }
}
