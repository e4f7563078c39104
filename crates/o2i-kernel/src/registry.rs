//! Backend registry — kernel contract.
//!
//! [`BackendRegistry`] is the single kernel-level abstraction for discovering
//! and managing the backend targets the integration plane forwards requests
//! to. The concrete, health-supervising implementation lives in
//! `o2i-runtime::registry::InMemoryBackendRegistry`.

use crate::capability::Capability;
use crate::error::IntegrationError;
use crate::plugin::{InfrastructureAdapter, SMOPlugin};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

// ─────────────────────────────────────────────────────────────────────────────
// Backend kind
// ─────────────────────────────────────────────────────────────────────────────

/// Classifies what *type* of backend a registered record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[non_exhaustive]
pub enum BackendKind {
    /// Infrastructure/deployment adapter (container cluster, VIM, …).
    Adapter,
    /// Upstream Service Management & Orchestration plugin.
    Smo,
}

// ─────────────────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable identity established at registration time; never mutates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendIdentity {
    /// Unique, non-empty name.
    pub name: String,
    pub kind: BackendKind,
    /// Declared semantic version, e.g. `"1.4.0"`.
    pub version: String,
    pub vendor: String,
    pub description: String,
    /// Immutable capability set declared at registration.
    pub capabilities: HashSet<Capability>,
}

impl BackendIdentity {
    pub fn new(
        name: impl Into<String>,
        kind: BackendKind,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            version: version.into(),
            vendor: String::new(),
            description: String::new(),
            capabilities: HashSet::new(),
        }
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_capabilities(mut self, caps: impl IntoIterator<Item = Capability>) -> Self {
        self.capabilities = caps.into_iter().collect();
        self
    }

    pub fn has_capability(&self, cap: Capability) -> bool {
        self.capabilities.contains(&cap)
    }

    pub fn has_all_capabilities(&self, required: &HashSet<Capability>) -> bool {
        required.is_subset(&self.capabilities)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Opaque handle
// ─────────────────────────────────────────────────────────────────────────────

/// Opaque reference to a live backend implementation.
///
/// A handle is any type that can report its own health; the registry never
/// introspects it further. Concrete adapters implement this alongside their
/// domain-specific `InfrastructureAdapter`/`SMOPlugin` trait.
#[async_trait]
pub trait BackendHandle: Send + Sync {
    /// Lightweight liveness probe. `Ok(())` means healthy. `cancel` aborts
    /// the probe in flight, surfacing [`IntegrationError::Cancelled`].
    async fn health(&self, cancel: &CancellationToken) -> Result<(), IntegrationError>;

    /// Release any resources held by this handle. Called exactly once by
    /// `Unregister`/`Close`; errors are logged by the caller, never
    /// propagated.
    async fn release(&self, cancel: &CancellationToken) -> Result<(), IntegrationError> {
        let _ = cancel;
        Ok(())
    }

    /// Widen to the SMO plugin interface, if this handle's concrete backend
    /// implements it. The reconciler uses this instead of downcasting by
    /// concrete type, since it never knows the backend's concrete type.
    fn as_smo_plugin(&self) -> Option<&dyn SMOPlugin> {
        None
    }

    /// Widen to the infrastructure adapter interface, if supported.
    fn as_infrastructure_adapter(&self) -> Option<&dyn InfrastructureAdapter> {
        None
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend record
// ─────────────────────────────────────────────────────────────────────────────

/// A registry-owned record: identity + live handle + lifecycle bits.
///
/// `List()`/`GetMetadata()` return clones of this (the handle is a cheap
/// `Arc` clone; no external caller ever sees the internal slot it lives in).
#[derive(Clone)]
pub struct BackendRecord {
    pub identity: BackendIdentity,
    pub handle: Arc<dyn BackendHandle>,
    pub enabled: bool,
    pub healthy: bool,
    pub registered_at: DateTime<Utc>,
    pub last_health_check: Option<DateTime<Utc>>,
    pub is_default: bool,
}

impl std::fmt::Debug for BackendRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRecord")
            .field("identity", &self.identity)
            .field("enabled", &self.enabled)
            .field("healthy", &self.healthy)
            .field("registered_at", &self.registered_at)
            .field("last_health_check", &self.last_health_check)
            .field("is_default", &self.is_default)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry trait
// ─────────────────────────────────────────────────────────────────────────────

/// Kernel contract for the backend registry.
///
/// Implementations own backend records exclusively and drive their
/// lifecycle: registration, default promotion, and (in `o2i-runtime`) the
/// periodic health supervisor.
#[async_trait]
pub trait BackendRegistry: Send + Sync {
    /// Register a new backend. Fails if `identity.name` is empty or already
    /// registered. Performs one synchronous health probe to seed `healthy`.
    /// Cancelling `cancel` aborts the probe and the call overall.
    async fn register(
        &self,
        identity: BackendIdentity,
        handle: Arc<dyn BackendHandle>,
        is_default: bool,
        cancel: &CancellationToken,
    ) -> Result<(), IntegrationError>;

    /// Remove a backend and release its handle exactly once.
    async fn unregister(&self, name: &str, cancel: &CancellationToken) -> Result<(), IntegrationError>;

    /// Return the live handle for `name`, if registered.
    fn get(&self, name: &str) -> Option<Arc<dyn BackendHandle>>;

    /// Return a copy of the record's metadata (never the internal record).
    fn get_metadata(&self, name: &str) -> Option<BackendRecord>;

    /// Return the default handle for `kind`, or `None`.
    fn get_default(&self, kind: BackendKind) -> Option<Arc<dyn BackendHandle>>;

    /// Flip the default flag to `name`. Fails if `name` is not registered.
    fn set_default(&self, name: &str) -> Result<(), IntegrationError>;

    /// Deep copies of every record (capabilities included).
    fn list(&self) -> Vec<BackendRecord>;

    /// All *healthy* handles declaring `cap`.
    fn find_by_capability(&self, cap: Capability) -> Vec<Arc<dyn BackendHandle>>;

    /// Idempotent start of the periodic health supervisor. `cancel` is the
    /// token the supervisor loop honors in addition to `stop_health_checks`;
    /// cancelling it stops the loop the same way an explicit stop does.
    async fn start_health_checks(&self, cancel: &CancellationToken);

    /// Idempotent stop; blocks until the supervisor task exits, `cancel` is
    /// cancelled, or the grace deadline elapses.
    async fn stop_health_checks(&self, cancel: &CancellationToken) -> Result<(), IntegrationError>;

    /// Stop the supervisor and release every handle. Idempotent.
    async fn close(&self, cancel: &CancellationToken) -> Result<(), IntegrationError>;
}
