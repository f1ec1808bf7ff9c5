//! # Plugin Contract
//!
//! The uniform interface every plugin implements, whether it runs in-process
//! (a first-party demo plugin compiled into this crate) or out-of-process
//! behind the sidecar HTTP-JSON transport. The gateway dispatches to either
//! through this one trait object and never needs to know which.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CoreError;
use crate::manifest::PluginManifest;
use crate::models::{ActionPhase, CollectionResponse, InternalActionResult, InternalReadResult, ReadQuery};

/// The context passed to a plugin for a single action invocation.
#[derive(Clone, Debug)]
pub struct ActionContext {
    pub plugin_id: String,
    pub phase: ActionPhase,
    pub action: String,
    pub resource: Option<String>,
    pub resource_id: Option<String>,
}

#[async_trait]
pub trait Plugin: Send + Sync {
    fn manifest(&self) -> &PluginManifest;

    async fn list_resource(&self, resource: &str, query: &ReadQuery) -> Result<CollectionResponse, CoreError>;

    async fn get_resource(
        &self,
        resource: &str,
        resource_id: &str,
        view: Option<&str>,
        query: &ReadQuery,
    ) -> Result<InternalReadResult, CoreError>;

    async fn run_action(&self, ctx: &ActionContext, args: &Value) -> Result<InternalActionResult, CoreError>;
}
