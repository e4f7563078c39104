//! Plugin interface surface: the two variant backend contracts.
//!
//! Every registered backend implements [`BackendHandle`](crate::registry::BackendHandle)
//! plus exactly one of [`InfrastructureAdapter`] (container clusters, VIMs)
//! or [`SMOPlugin`] (upstream orchestration systems). Backends that cannot
//! support an operation return [`IntegrationError::NotSupported`] and must
//! omit the corresponding capability from their declared set.

use crate::capability::Capability;
use crate::error::IntegrationError;
use crate::reconciler::{Deployment, DeploymentManager, DomainEvent, Resource, ResourcePool, ResourceType};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Health reported by an [`SMOPlugin`]; richer than the registry's binary
/// healthy/unhealthy bit so operators can see *why*.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

/// Opaque subscription descriptor; the core only validates the `callback`
/// field (see [`crate::validator::CallbackValidator`]).
#[derive(Debug, Clone)]
pub struct SubscriptionDescriptor {
    pub id: String,
    pub callback: String,
    pub filter: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowState {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct WorkflowHandle {
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct ServiceModel {
    pub id: String,
    pub name: String,
    pub definition: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct PolicyApplyResult {
    pub policy_id: String,
    pub accepted: bool,
}

/// Operations exposed by infrastructure/deployment-CRUD backends (container
/// clusters, virtual infrastructure managers).
#[async_trait]
pub trait InfrastructureAdapter: Send + Sync {
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    fn capabilities(&self) -> &[Capability];
    async fn health(&self, cancel: &CancellationToken) -> Result<(), IntegrationError>;
    async fn close(&self, cancel: &CancellationToken) -> Result<(), IntegrationError>;

    async fn list_deployment_managers(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<DeploymentManager>, IntegrationError>;
    async fn get_deployment_manager(
        &self,
        id: &str,
        cancel: &CancellationToken,
    ) -> Result<DeploymentManager, IntegrationError>;
    async fn create_deployment_manager(
        &self,
        dm: DeploymentManager,
        cancel: &CancellationToken,
    ) -> Result<DeploymentManager, IntegrationError>;
    async fn delete_deployment_manager(&self, id: &str, cancel: &CancellationToken) -> Result<(), IntegrationError>;

    async fn list_resource_pools(&self, cancel: &CancellationToken) -> Result<Vec<ResourcePool>, IntegrationError>;
    async fn list_resources(
        &self,
        pool_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Resource>, IntegrationError>;
    async fn list_resource_types(&self, cancel: &CancellationToken) -> Result<Vec<ResourceType>, IntegrationError>;

    async fn create_subscription(
        &self,
        sub: SubscriptionDescriptor,
        cancel: &CancellationToken,
    ) -> Result<SubscriptionDescriptor, IntegrationError>;
    async fn delete_subscription(&self, id: &str, cancel: &CancellationToken) -> Result<(), IntegrationError>;
}

/// Operations exposed by upstream Service Management & Orchestration
/// plugins (ONAP-class, OSM-class, mock).
#[async_trait]
pub trait SMOPlugin: Send + Sync {
    fn metadata(&self) -> HashMap<String, String>;
    fn capabilities(&self) -> &[Capability];
    async fn initialize(
        &self,
        config: HashMap<String, serde_json::Value>,
        cancel: &CancellationToken,
    ) -> Result<(), IntegrationError>;
    async fn health(&self, cancel: &CancellationToken) -> Result<HealthStatus, IntegrationError>;
    async fn close(&self, cancel: &CancellationToken) -> Result<(), IntegrationError>;

    async fn sync_infrastructure(
        &self,
        managers: &[DeploymentManager],
        pools: &[ResourcePool],
        resources: &[Resource],
        cancel: &CancellationToken,
    ) -> Result<(), IntegrationError>;
    async fn sync_deployment(
        &self,
        deployments: &[Deployment],
        cancel: &CancellationToken,
    ) -> Result<(), IntegrationError>;
    async fn publish_infrastructure_event(
        &self,
        event: &DomainEvent,
        cancel: &CancellationToken,
    ) -> Result<(), IntegrationError>;
    async fn publish_deployment_event(
        &self,
        event: &DomainEvent,
        cancel: &CancellationToken,
    ) -> Result<(), IntegrationError>;

    async fn execute_workflow(
        &self,
        name: &str,
        params: HashMap<String, serde_json::Value>,
        cancel: &CancellationToken,
    ) -> Result<WorkflowHandle, IntegrationError>;
    async fn workflow_status(
        &self,
        handle: &WorkflowHandle,
        cancel: &CancellationToken,
    ) -> Result<WorkflowState, IntegrationError>;
    async fn cancel_workflow(&self, handle: &WorkflowHandle, cancel: &CancellationToken) -> Result<(), IntegrationError>;

    async fn register_service_model(
        &self,
        model: ServiceModel,
        cancel: &CancellationToken,
    ) -> Result<(), IntegrationError>;
    async fn get_service_model(&self, id: &str, cancel: &CancellationToken) -> Result<ServiceModel, IntegrationError>;
    async fn list_service_models(&self, cancel: &CancellationToken) -> Result<Vec<ServiceModel>, IntegrationError>;

    async fn apply_policy(
        &self,
        policy: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<PolicyApplyResult, IntegrationError>;
    async fn policy_status(
        &self,
        policy_id: &str,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, IntegrationError>;
}
