//! # Error Model
//!
//! Stable error kinds shared by every component in this crate. Every
//! boundary (auth, policy, registry, stores, sidecar transport) converts
//! its internal failures into one of these variants. The gateway crate maps
//! each to an HTTP status code and a machine-readable code in its own
//! `IntoResponse` implementation; this crate stays transport-agnostic but
//! still knows its own status/code pairing, since the pairing is part of
//! the contract, not an HTTP concern.

use thiserror::Error;

/// The cross-component failure currency for the mediation pipeline.
///
/// Policy violations and capability denials are never retried by callers;
/// they are meant to be surfaced directly as the mapped status code.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    IdempotencyKeyRequired(String),

    #[error("{0}")]
    IdempotencyKeyReused(String),

    #[error("{0}")]
    ApprovalAlreadyFinalized(String),

    #[error("{0}")]
    ActionNotProposable(String),

    #[error("{0}")]
    PolicyBlocked(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    CapabilityDenied(String),

    #[error("{0}")]
    RateLimited(String),

    #[error("sidecar request failed: {0}")]
    SidecarHttpError(String),

    #[error("sidecar unreachable: {0}")]
    SidecarUnreachable(String),

    #[error("sidecar returned a malformed response: {0}")]
    SidecarBadResponse(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl CoreError {
    pub fn policy_blocked() -> Self {
        Self::PolicyBlocked("blocked by policy".to_string())
    }

    /// The stable machine-readable code from spec §4.10.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::IdempotencyKeyRequired(_) => "IDEMPOTENCY_KEY_REQUIRED",
            Self::IdempotencyKeyReused(_) => "IDEMPOTENCY_KEY_REUSED",
            Self::ApprovalAlreadyFinalized(_) => "APPROVAL_ALREADY_FINALIZED",
            Self::ActionNotProposable(_) => "ACTION_NOT_PROPOSABLE",
            Self::PolicyBlocked(_) => "POLICY_BLOCKED",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::CapabilityDenied(_) => "CAPABILITY_DENIED",
            Self::RateLimited(_) => "RATE_LIMITED",
            Self::SidecarHttpError(_) => "SIDECAR_HTTP_ERROR",
            Self::SidecarUnreachable(_) => "SIDECAR_UNREACHABLE",
            Self::SidecarBadResponse(_) => "SIDECAR_BAD_RESPONSE",
            Self::Config(_) => "VALIDATION_ERROR",
        }
    }

    /// The HTTP status this error kind maps to.
    pub fn status(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Validation(_)
            | Self::IdempotencyKeyRequired(_)
            | Self::IdempotencyKeyReused(_)
            | Self::ApprovalAlreadyFinalized(_)
            | Self::ActionNotProposable(_) => 400,
            Self::PolicyBlocked(_) | Self::CapabilityDenied(_) => 403,
            Self::Unauthorized(_) => 401,
            Self::RateLimited(_) => 429,
            Self::SidecarHttpError(_) | Self::SidecarUnreachable(_) | Self::SidecarBadResponse(_) => 500,
            Self::Config(_) => 500,
        }
    }
}
