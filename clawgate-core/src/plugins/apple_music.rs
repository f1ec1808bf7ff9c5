//! # Apple Music Demo Plugin
//!
//! Preserves the reference plugin's manifest as an in-memory, deterministic
//! demo. The reference implementation drives local playback via `osascript`
//! subprocess calls; that OS-level integration is out of scope for the
//! gateway itself, so this plugin simulates playback state instead.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::CoreError;
use crate::manifest::{PluginActionManifest, PluginManifest, PluginResourceManifest};
use crate::models::{
    ActionPhase, ActionStatus, CollectionResponse, InternalActionResult, InternalReadResult, PolicyItem, ReadQuery,
    RiskTier,
};
use crate::plugin::{ActionContext, Plugin};

struct Playlist {
    id: &'static str,
    name: &'static str,
    tracks: &'static [&'static str],
}

fn playlists() -> Vec<Playlist> {
    vec![
        Playlist { id: "pl_focus", name: "Focus", tracks: &["trk_1", "trk_2"] },
        Playlist { id: "pl_chill", name: "Chill", tracks: &["trk_3"] },
    ]
}

pub struct AppleMusicPlugin {
    manifest: PluginManifest,
    playlists: Vec<Playlist>,
    now_playing: Mutex<Option<String>>,
}

impl Default for AppleMusicPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl AppleMusicPlugin {
    pub fn new() -> Self {
        let action = |name: &str, capability_id: &str, resource: Option<&str>| PluginActionManifest {
            name: name.to_string(),
            capability_id: capability_id.to_string(),
            risk_tier: RiskTier::Routine,
            resource: resource.map(str::to_string),
            mutating: true,
            requires_idempotency: false,
            supports_propose: true,
            emits_attributes: vec!["resource_type".to_string()],
        };

        let manifest = PluginManifest {
            id: "apple_music".to_string(),
            name: "Apple Music".to_string(),
            version: "0.1.0".to_string(),
            resources: vec![
                PluginResourceManifest {
                    name: "playlists".to_string(),
                    capability_id: Some("apple_music.playlists.read".to_string()),
                    allowed_views: vec!["headers".to_string(), "body".to_string()],
                },
                PluginResourceManifest {
                    name: "playback".to_string(),
                    capability_id: Some("apple_music.playback.read".to_string()),
                    allowed_views: vec!["headers".to_string(), "body".to_string()],
                },
            ],
            actions: vec![
                action("play", "apple_music.playback.play", None),
                action("pause", "apple_music.playback.pause", None),
                action("next_track", "apple_music.playback.next_track", None),
                action("play", "apple_music.playlist.play", Some("playlists")),
                action("play_song", "apple_music.track.play", None),
            ],
            required_secrets: vec![],
            required_scopes: vec![],
            default_policy: Value::Null,
        };

        Self { manifest, playlists: playlists(), now_playing: Mutex::new(None) }
    }

    fn find_playlist(&self, id: &str) -> Option<&Playlist> {
        self.playlists.iter().find(|p| p.id == id)
    }
}

#[async_trait]
impl Plugin for AppleMusicPlugin {
    fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    async fn list_resource(&self, resource: &str, query: &ReadQuery) -> Result<CollectionResponse, CoreError> {
        let items: Vec<Value> = match resource {
            "playlists" => self.playlists.iter().map(|p| json!({"id": p.id, "name": p.name})).collect(),
            "playback" => vec![json!({"now_playing": *self.now_playing.lock().expect("poisoned")})],
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
            "playlists" => {
                let playlist = self
                    .find_playlist(resource_id)
                    .ok_or_else(|| CoreError::NotFound(format!("no such playlist '{resource_id}'")))?;
                let data = match view.unwrap_or("headers") {
                    "headers" => json!({"id": playlist.id, "name": playlist.name}),
                    "body" => json!({"id": playlist.id, "name": playlist.name, "tracks": playlist.tracks}),
                    other => return Err(CoreError::NotFound(format!("unknown view '{other}'"))),
                };
                Ok(InternalReadResult { data, policy_items: vec![PolicyItem::new(format!("apple_music:playlists:{resource_id}"))] })
            }
            other => Err(CoreError::NotFound(format!("no such resource '{other}'"))),
        }
    }

    async fn run_action(&self, ctx: &ActionContext, args: &Value) -> Result<InternalActionResult, CoreError> {
        match ctx.action.as_str() {
            "play" if ctx.resource.as_deref() == Some("playlists") => {
                let resource_id = ctx
                    .resource_id
                    .as_deref()
                    .ok_or_else(|| CoreError::Validation("play requires a playlist resource_id".to_string()))?;
                let playlist = self
                    .find_playlist(resource_id)
                    .ok_or_else(|| CoreError::NotFound(format!("no such playlist '{resource_id}'")))?;
                if ctx.phase == ActionPhase::Execute {
                    *self.now_playing.lock().expect("poisoned") = Some(playlist.id.to_string());
                }
                Ok(InternalActionResult {
                    status: ActionStatus::Success,
                    result: json!({"playing": playlist.id}),
                    summary: Some(format!("Play playlist {}", playlist.name)),
                    proposed_effect: json!({"action": "play", "playlist_id": playlist.id}),
                    policy_items: vec![PolicyItem::new(format!("apple_music:playlists:{}", playlist.id)).with_attr("resource_type", "playlist")],
                })
            }
            "play" => {
                if ctx.phase == ActionPhase::Execute {
                    *self.now_playing.lock().expect("poisoned") = Some("resumed".to_string());
                }
                Ok(InternalActionResult {
                    status: ActionStatus::Success,
                    result: json!({"playing": true}),
                    summary: Some("Resume playback".to_string()),
                    proposed_effect: json!({"action": "play"}),
                    policy_items: vec![PolicyItem::new("apple_music:playback").with_attr("resource_type", "playback")],
                })
            }
            "pause" => {
                if ctx.phase == ActionPhase::Execute {
                    *self.now_playing.lock().expect("poisoned") = None;
                }
                Ok(InternalActionResult {
                    status: ActionStatus::Success,
                    result: json!({"playing": false}),
                    summary: Some("Pause playback".to_string()),
                    proposed_effect: json!({"action": "pause"}),
                    policy_items: vec![PolicyItem::new("apple_music:playback").with_attr("resource_type", "playback")],
                })
            }
            "next_track" => Ok(InternalActionResult {
                status: ActionStatus::Success,
                result: json!({"advanced": true}),
                summary: Some("Skip to next track".to_string()),
                proposed_effect: json!({"action": "next_track"}),
                policy_items: vec![PolicyItem::new("apple_music:playback").with_attr("resource_type", "playback")],
            }),
            "play_song" => {
                let track_id = args
                    .get("track_id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| CoreError::Validation("play_song requires a 'track_id' argument".to_string()))?;
                if ctx.phase == ActionPhase::Execute {
                    *self.now_playing.lock().expect("poisoned") = Some(track_id.to_string());
                }
                Ok(InternalActionResult {
                    status: ActionStatus::Success,
                    result: json!({"playing": track_id}),
                    summary: Some(format!("Play track {track_id}")),
                    proposed_effect: json!({"action": "play_song", "track_id": track_id}),
                    policy_items: vec![PolicyItem::new(format!("apple_music:track:{track_id}")).with_attr("resource_type", "track")],
                })
            }
            other => Err(CoreError::NotFound(format!("no such action '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn play_playlist_sets_now_playing_only_on_execute() {
        let plugin = AppleMusicPlugin::new();
        let ctx = ActionContext {
            plugin_id: "apple_music".to_string(),
            phase: ActionPhase::Propose,
            action: "play".to_string(),
            resource: Some("playlists".to_string()),
            resource_id: Some("pl_focus".to_string()),
        };
        plugin.run_action(&ctx, &json!({})).await.unwrap();
        assert!(plugin.now_playing.lock().unwrap().is_none());

        let ctx = ActionContext { phase: ActionPhase::Execute, ..ctx };
        plugin.run_action(&ctx, &json!({})).await.unwrap();
        assert_eq!(plugin.now_playing.lock().unwrap().as_deref(), Some("pl_focus"));
    }
}
