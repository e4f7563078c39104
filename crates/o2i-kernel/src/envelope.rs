//! Backend client envelope — kernel contract.
//!
//! [`BackendClientEnvelope`] is the uniform shape every outbound HTTP backend
//! client implements (A&AI-class, event-bus-class, orchestrator-class,
//! SDN-controller-class, OSM-NBI-class, …). The concrete `reqwest`-based
//! implementation lives in `o2i-runtime::envelope::HttpBackendClient`.

use crate::error::IntegrationError;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ─────────────────────────────────────────────────────────────────────────────
// Shared configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Mutual-TLS material for transports that require client certificates.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub enabled: bool,
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
    pub ca_file: Option<String>,
    /// Skipping verification must be an explicit, logged opt-in.
    pub insecure_skip_verify: bool,
}

/// Configuration shared by every envelope instance.
#[derive(Debug, Clone)]
pub struct EnvelopeConfig {
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub bearer_token: Option<String>,
    pub tls: TlsConfig,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub initial_retry_delay: Duration,
    pub max_retry_delay: Duration,
    pub retry_multiplier: f64,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            username: None,
            password: None,
            bearer_token: None,
            tls: TlsConfig::default(),
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            initial_retry_delay: Duration::from_millis(200),
            max_retry_delay: Duration::from_secs(5),
            retry_multiplier: 2.0,
        }
    }
}

impl EnvelopeConfig {
    /// `min(initial_delay * attempt * multiplier, max_delay)`, as specified.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let scaled = self.initial_retry_delay.as_secs_f64()
            * f64::from(attempt.max(1))
            * self.retry_multiplier;
        Duration::from_secs_f64(scaled).min(self.max_retry_delay)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Token cache state machine
// ─────────────────────────────────────────────────────────────────────────────

/// `NoToken → Authenticating → Valid(until) → Expired → Authenticating → …`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    NoToken,
    Authenticating,
    Valid {
        token: String,
        until: chrono::DateTime<chrono::Utc>,
    },
    Expired,
}

// ─────────────────────────────────────────────────────────────────────────────
// Envelope trait
// ─────────────────────────────────────────────────────────────────────────────

/// Kernel contract every outbound HTTP backend client implements.
#[async_trait]
pub trait BackendClientEnvelope: Send + Sync {
    /// Idempotent: a no-op if the cached token's expiry is still in the
    /// future. At most one refresh is in flight across concurrent callers.
    /// `cancel` aborts the token-endpoint request in flight.
    async fn authenticate(&self, cancel: &CancellationToken) -> Result<(), IntegrationError>;

    /// Lightweight probe (GET/HEAD on a known-cheap path). `Ok(())` on 2xx.
    async fn health(&self, cancel: &CancellationToken) -> Result<(), IntegrationError>;

    async fn do_get<R: DeserializeOwned>(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<R, IntegrationError>;

    async fn do_post<B: Serialize + Sync, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> Result<R, IntegrationError>;

    async fn do_put<B: Serialize + Sync, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> Result<R, IntegrationError>;

    async fn do_patch<B: Serialize + Sync, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> Result<R, IntegrationError>;

    async fn do_delete(&self, path: &str, cancel: &CancellationToken) -> Result<(), IntegrationError>;
}
