//! # Plugin Registry
//!
//! Maps a plugin id to its plugin instance and resolves the capability a
//! route refers to. Built once at startup and never mutated afterward —
//! the same immutability the teacher relies on for its provider map.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::CoreError;
use crate::manifest::PluginActionManifest;
use crate::models::RuntimeMode;
use crate::plugin::Plugin;

struct Entry {
    plugin: Arc<dyn Plugin>,
    runtime_mode: RuntimeMode,
}

pub struct PluginRegistry {
    plugins: HashMap<String, Entry>,
}

/// A resolved action: the plugin that owns it plus its manifest entry.
pub struct ResolvedAction {
    pub plugin: Arc<dyn Plugin>,
    pub action: PluginActionManifest,
}

impl PluginRegistry {
    pub fn new(plugins: Vec<(Arc<dyn Plugin>, RuntimeMode)>) -> Result<Self, CoreError> {
        let mut map = HashMap::new();
        for (plugin, runtime_mode) in plugins {
            plugin.manifest().validate()?;
            let id = plugin.manifest().id.clone();
            if map.insert(id.clone(), Entry { plugin, runtime_mode }).is_some() {
                return Err(CoreError::Config(format!("duplicate plugin id '{id}'")));
            }
        }
        Ok(Self { plugins: map })
    }

    pub fn get(&self, plugin_id: &str) -> Result<Arc<dyn Plugin>, CoreError> {
        self.plugins
            .get(plugin_id)
            .map(|entry| entry.plugin.clone())
            .ok_or_else(|| CoreError::NotFound(format!("unknown plugin '{plugin_id}'")))
    }

    pub fn runtime_mode(&self, plugin_id: &str) -> Result<RuntimeMode, CoreError> {
        self.plugins
            .get(plugin_id)
            .map(|entry| entry.runtime_mode)
            .ok_or_else(|| CoreError::NotFound(format!("unknown plugin '{plugin_id}'")))
    }

    pub fn list_plugins(&self) -> Vec<Arc<dyn Plugin>> {
        let mut plugins: Vec<_> = self.plugins.values().map(|entry| entry.plugin.clone()).collect();
        plugins.sort_by(|a, b| a.manifest().id.cmp(&b.manifest().id));
        plugins
    }

    pub fn summaries(&self) -> Vec<crate::models::PluginSummary> {
        let mut entries: Vec<_> = self.plugins.values().collect();
        entries.sort_by(|a, b| a.plugin.manifest().id.cmp(&b.plugin.manifest().id));
        entries
            .into_iter()
            .map(|entry| crate::models::PluginSummary {
                id: entry.plugin.manifest().id.clone(),
                name: entry.plugin.manifest().name.clone(),
                version: entry.plugin.manifest().version.clone(),
                runtime_mode: entry.runtime_mode,
            })
            .collect()
    }

    /// Resolves `(plugin_id, action_name, resource)` to the plugin and its
    /// action manifest entry, the way `api/actions.py::resolve_action` does.
    pub fn resolve_action(
        &self,
        plugin_id: &str,
        action_name: &str,
        resource: Option<&str>,
    ) -> Result<ResolvedAction, CoreError> {
        let plugin = self.get(plugin_id)?;
        let action = plugin
            .manifest()
            .action(action_name, resource)
            .cloned()
            .ok_or_else(|| {
                CoreError::NotFound(format!(
                    "plugin '{plugin_id}' has no action '{action_name}' on resource {resource:?}"
                ))
            })?;
        Ok(ResolvedAction { plugin, action })
    }
}
