//! Northbound reconciler — kernel contract and snapshot types.
//!
//! The reconciler projects local inventory/events into an adapter-specific
//! shape and pushes them with per-item error isolation. The core never
//! mutates the snapshot; it is an opaque, read-only, point-in-time view
//! supplied by the (external) store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot types
// ─────────────────────────────────────────────────────────────────────────────

/// A deployment manager record from local inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentManager {
    pub id: String,
    pub name: String,
    pub service_uri: String,
    /// Opaque extension map; the reconciler interprets well-known keys
    /// (`cloudType` / `vimType`) but never the rest.
    pub extensions: HashMap<String, serde_json::Value>,
}

/// A resource pool record, logically owned by a deployment manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcePool {
    pub id: String,
    pub name: String,
    pub deployment_manager_id: String,
    pub extensions: HashMap<String, serde_json::Value>,
}

/// A physical or virtual resource record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub resource_pool_id: String,
    pub extensions: HashMap<String, serde_json::Value>,
}

/// A resource type record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceType {
    pub id: String,
    pub name: String,
}

/// A point-in-time, read-only view of local inventory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventorySnapshot {
    pub deployment_managers: Vec<DeploymentManager>,
    pub resource_pools: Vec<ResourcePool>,
    pub resources: Vec<Resource>,
    pub resource_types: Vec<ResourceType>,
}

/// Local status vocabulary for a deployment, translated by the reconciler
/// into the upstream orchestration status vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DeploymentStatus {
    Pending,
    Deploying,
    Deployed,
    Running,
    Failed,
    Deleting,
    Deleted,
}

/// A deployment record from local state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,
    pub name: String,
    pub status: DeploymentStatus,
    pub extensions: HashMap<String, serde_json::Value>,
}

/// A point-in-time view of local deployment state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentSnapshot {
    pub deployments: Vec<Deployment>,
}

/// An in-process domain event the reconciler publishes northbound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: String,
    pub event_type: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub source: String,
    pub resource_id: String,
    pub fields: HashMap<String, serde_json::Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Reconciler trait
// ─────────────────────────────────────────────────────────────────────────────

/// Kernel contract for the northbound reconciler.
#[async_trait]
pub trait NorthboundReconciler: Send + Sync {
    /// Push a freshly-taken inventory snapshot to every enabled,
    /// `inventory-sync`-capable backend. `cancel` propagates to every
    /// per-backend push it fans out to.
    async fn sync_inventory(
        &self,
        snapshot: &InventorySnapshot,
        cancel: &CancellationToken,
    ) -> Result<(), crate::error::IntegrationError>;

    /// Push a freshly-taken deployment snapshot to every enabled,
    /// `inventory-sync`-capable backend.
    async fn sync_deployments(
        &self,
        snapshot: &DeploymentSnapshot,
        cancel: &CancellationToken,
    ) -> Result<(), crate::error::IntegrationError>;

    /// Publish one event to every enabled, `event-publishing`-capable
    /// backend.
    async fn publish_event(
        &self,
        event: &DomainEvent,
        cancel: &CancellationToken,
    ) -> Result<(), crate::error::IntegrationError>;

    /// Idempotent start of the optional periodic sync loop. `cancel` stops
    /// the loop the same way `stop_periodic_sync` does.
    async fn start_periodic_sync(&self, cancel: &CancellationToken);

    /// Idempotent stop; waits for the in-flight iteration (up to a grace
    /// deadline) before returning.
    async fn stop_periodic_sync(&self) -> Result<(), crate::error::IntegrationError>;
}
