//! # First-Party In-Process Plugins
//!
//! Deterministic, in-memory demo plugins wired directly into the gateway
//! process rather than run as sidecars. `gmail` preserves the original demo
//! fixtures and behavior in full; `imessage`, `apple_music`, and `find_my`
//! preserve their manifests (resource names, capability ids, risk tiers)
//! but none of their real-world backend integrations (BlueBubbles over
//! HTTP, `osascript` subprocess calls, the local `findmy` session store) —
//! those are concrete external integrations the gateway itself is not
//! responsible for providing.

pub mod apple_music;
pub mod find_my;
pub mod gmail;
pub mod imessage;

pub use apple_music::AppleMusicPlugin;
pub use find_my::FindMyPlugin;
pub use gmail::GmailPlugin;
pub use imessage::IMessagePlugin;
