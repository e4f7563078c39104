//! Integration-plane error types.
//!
//! [`IntegrationError`] covers every failure mode the core can detect or
//! surface — from structural config rejection at load time, through routing
//! and registry lookups, to the envelope's retry/transient classification.
//! `#[non_exhaustive]` lets future releases add variants without breaking
//! existing `match` arms, following the kernel gateway error convention.

use thiserror::Error;

/// Crate-wide error type for the O2 integration plane.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IntegrationError {
    // ── Config ──────────────────────────────────────────────────────────────
    #[error("config invalid: {0}")]
    ConfigInvalid(String),

    // ── Registry / routing lookups ──────────────────────────────────────────
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("no backend available to service the request")]
    NoBackend,

    #[error("backend '{0}' is unhealthy or missing a required capability")]
    Unhealthy(String),

    #[error("operation not supported by backend '{backend}': {capability}")]
    NotSupported { backend: String, capability: String },

    // ── Envelope / upstream ──────────────────────────────────────────────────
    #[error("transient upstream error after {attempts} attempt(s): {cause}")]
    Transient { attempts: u32, cause: String },

    #[error("permanent upstream error (status {status}): {body}")]
    Permanent { status: u16, body: String },

    #[error("authentication expired, refresh required")]
    AuthExpired,

    #[error("retries exhausted after {attempts} attempt(s): {cause}")]
    RetriesExhausted { attempts: u32, cause: String },

    // ── Callback validator ──────────────────────────────────────────────────
    #[error("callback URL rejected: {0}")]
    ValidationReject(String),

    // ── Cancellation / shutdown ──────────────────────────────────────────────
    #[error("operation cancelled or deadline exceeded")]
    Cancelled,

    #[error("shutdown exceeded its grace deadline")]
    ShutdownTimeout,

    // ── Escape hatch for wrapped lower-level errors ─────────────────────────
    #[error("{context}: {source}")]
    Wrapped {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl IntegrationError {
    /// Wrap a lower-level error with identity context (backend name, rule
    /// name, operation) the way every component re-surfaces failures.
    pub fn wrap(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Wrapped {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// `true` for error kinds the envelope's retry loop should retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::AuthExpired)
    }
}
