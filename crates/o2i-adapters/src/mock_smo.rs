//! `MockSmoPlugin` — an in-memory [`SMOPlugin`] standing in for an upstream
//! orchestration system (ONAP-class, OSM-class). Demonstrates the push
//! ordering, idempotent-upsert, and status/topic mapping conventions a real
//! plugin is expected to follow.

use async_trait::async_trait;
use o2i_kernel::capability::Capability;
use o2i_kernel::error::IntegrationError;
use o2i_kernel::plugin::{HealthStatus, PolicyApplyResult, ServiceModel, SMOPlugin, WorkflowHandle, WorkflowState};
use o2i_kernel::reconciler::{Deployment, DeploymentManager, DeploymentStatus, DomainEvent, Resource, ResourcePool};
use o2i_kernel::registry::BackendHandle;
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Local → upstream deployment status vocabulary, per the closed mapping
/// table. `Created` is the default for anything this plugin doesn't
/// recognize as a distinct upstream state.
fn map_deployment_status(status: DeploymentStatus) -> &'static str {
    match status {
        DeploymentStatus::Pending => "Assigned",
        DeploymentStatus::Deploying => "Assigned",
        DeploymentStatus::Deployed => "Active",
        DeploymentStatus::Running => "Active",
        DeploymentStatus::Failed => "Failed",
        DeploymentStatus::Deleting => "PendingDelete",
        DeploymentStatus::Deleted => "Deleted",
        _ => "Created",
    }
}

/// Closed event-type → topic mapping; unknown types fall back to the
/// generic infrastructure topic.
fn map_event_topic(event_type: &str) -> &'static str {
    match event_type {
        "deployment-manager.created" | "deployment-manager.deleted" => "unauthenticated.VES_PNFREG_OUTPUT",
        "resource.created" | "resource.deleted" => "unauthenticated.VES_MEASUREMENT_OUTPUT",
        "deployment.status-changed" => "unauthenticated.VES_FAULT_OUTPUT",
        _ => "unauthenticated.VES_GENERIC_OUTPUT",
    }
}

#[derive(Default)]
struct PushedState {
    cloud_regions: Vec<String>,
    tenants: Vec<String>,
    vnfs: Vec<String>,
    pnfs: Vec<String>,
    service_instances: HashMap<String, String>,
    service_models: HashMap<String, ServiceModel>,
    workflows: HashMap<String, WorkflowState>,
}

pub struct MockSmoPlugin {
    capabilities: Vec<Capability>,
    default_cloud_type: String,
    /// When set, the push of this cloud-region id fails once, to exercise
    /// the "first per-kind failure aborts that kind" path in tests.
    fail_cloud_region: Option<String>,
    state: RwLock<PushedState>,
}

impl MockSmoPlugin {
    pub fn new(default_cloud_type: impl Into<String>) -> Self {
        Self {
            capabilities: vec![
                Capability::InventorySync,
                Capability::EventPublishing,
                Capability::WorkflowOrchestration,
                Capability::ServiceModeling,
                Capability::PolicyManagement,
            ],
            default_cloud_type: default_cloud_type.into(),
            fail_cloud_region: None,
            state: RwLock::new(PushedState::default()),
        }
    }

    pub fn with_failing_cloud_region(mut self, id: impl Into<String>) -> Self {
        self.fail_cloud_region = Some(id.into());
        self
    }

    pub fn pushed_cloud_regions(&self) -> Vec<String> {
        self.state.read().cloud_regions.clone()
    }

    pub fn pushed_pnfs(&self) -> Vec<String> {
        self.state.read().pnfs.clone()
    }

    pub fn pushed_vnfs(&self) -> Vec<String> {
        self.state.read().vnfs.clone()
    }

    fn cloud_type_for(&self, dm: &DeploymentManager) -> String {
        dm.extensions
            .get("cloudType")
            .or_else(|| dm.extensions.get("vimType"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.default_cloud_type.clone())
    }

    fn is_physical(resource: &Resource) -> bool {
        resource
            .extensions
            .get("resourceKind")
            .and_then(|v| v.as_str())
            .map(|kind| kind == "physical")
            .unwrap_or(true)
    }
}

#[async_trait]
impl BackendHandle for MockSmoPlugin {
    async fn health(&self, _cancel: &CancellationToken) -> Result<(), IntegrationError> {
        Ok(())
    }

    fn as_smo_plugin(&self) -> Option<&dyn SMOPlugin> {
        Some(self)
    }
}

#[async_trait]
impl SMOPlugin for MockSmoPlugin {
    fn metadata(&self) -> HashMap<String, String> {
        let mut meta = HashMap::new();
        meta.insert("vendor".to_string(), "mock-smo".to_string());
        meta
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    async fn initialize(
        &self,
        _config: HashMap<String, serde_json::Value>,
        _cancel: &CancellationToken,
    ) -> Result<(), IntegrationError> {
        Ok(())
    }

    async fn health(&self, _cancel: &CancellationToken) -> Result<HealthStatus, IntegrationError> {
        Ok(HealthStatus::Healthy)
    }

    async fn close(&self, _cancel: &CancellationToken) -> Result<(), IntegrationError> {
        Ok(())
    }

    async fn sync_infrastructure(
        &self,
        managers: &[DeploymentManager],
        pools: &[ResourcePool],
        resources: &[Resource],
        _cancel: &CancellationToken,
    ) -> Result<(), IntegrationError> {
        let mut state = self.state.write();

        // cloud-region, one per deployment manager.
        for dm in managers {
            if self.fail_cloud_region.as_deref() == Some(dm.id.as_str()) {
                return Err(IntegrationError::wrap(
                    format!("pushing cloud-region '{}'", dm.id),
                    std::io::Error::other("upstream rejected cloud-region"),
                ));
            }
            let cloud_type = self.cloud_type_for(dm);
            if !state.cloud_regions.contains(&dm.id) {
                state.cloud_regions.push(dm.id.clone());
                tracing::debug!(cloud_region = %dm.id, %cloud_type, "pushed cloud-region");
            }
        }

        // tenant, one per resource pool, inheriting the parent cloud id.
        for pool in pools {
            if !state.tenants.contains(&pool.id) {
                state.tenants.push(pool.id.clone());
                tracing::debug!(tenant = %pool.id, cloud_region = %pool.deployment_manager_id, "pushed tenant");
            }
        }

        // PNF vs VNF, by resourceKind.
        for resource in resources {
            if Self::is_physical(resource) {
                if !state.pnfs.contains(&resource.id) {
                    state.pnfs.push(resource.id.clone());
                }
            } else if !state.vnfs.contains(&resource.id) {
                state.vnfs.push(resource.id.clone());
            }
        }

        Ok(())
    }

    async fn sync_deployment(&self, deployments: &[Deployment], _cancel: &CancellationToken) -> Result<(), IntegrationError> {
        let mut state = self.state.write();
        for deployment in deployments {
            let upstream_status = map_deployment_status(deployment.status);
            state
                .service_instances
                .insert(deployment.id.clone(), upstream_status.to_string());
        }
        Ok(())
    }

    async fn publish_infrastructure_event(&self, event: &DomainEvent, _cancel: &CancellationToken) -> Result<(), IntegrationError> {
        let topic = map_event_topic(&event.event_type);
        tracing::info!(event_id = %event.id, %topic, "published infrastructure event");
        Ok(())
    }

    async fn publish_deployment_event(&self, event: &DomainEvent, _cancel: &CancellationToken) -> Result<(), IntegrationError> {
        let topic = map_event_topic(&event.event_type);
        tracing::info!(event_id = %event.id, %topic, "published deployment event");
        Ok(())
    }

    async fn execute_workflow(
        &self,
        name: &str,
        _params: HashMap<String, serde_json::Value>,
        _cancel: &CancellationToken,
    ) -> Result<WorkflowHandle, IntegrationError> {
        let id = Uuid::new_v4().to_string();
        self.state.write().workflows.insert(id.clone(), WorkflowState::Running);
        tracing::info!(workflow = %name, handle = %id, "workflow started");
        Ok(WorkflowHandle { id })
    }

    async fn workflow_status(&self, handle: &WorkflowHandle, _cancel: &CancellationToken) -> Result<WorkflowState, IntegrationError> {
        self.state
            .read()
            .workflows
            .get(&handle.id)
            .copied()
            .ok_or_else(|| IntegrationError::NotFound(handle.id.clone()))
    }

    async fn cancel_workflow(&self, handle: &WorkflowHandle, _cancel: &CancellationToken) -> Result<(), IntegrationError> {
        let mut state = self.state.write();
        match state.workflows.get_mut(&handle.id) {
            Some(current) => {
                *current = WorkflowState::Cancelled;
                Ok(())
            }
            None => Err(IntegrationError::NotFound(handle.id.clone())),
        }
    }

    async fn register_service_model(&self, model: ServiceModel, _cancel: &CancellationToken) -> Result<(), IntegrationError> {
        let mut state = self.state.write();
        if state.service_models.contains_key(&model.id) {
            return Err(IntegrationError::AlreadyExists(model.id));
        }
        state.service_models.insert(model.id.clone(), model);
        Ok(())
    }

    async fn get_service_model(&self, id: &str, _cancel: &CancellationToken) -> Result<ServiceModel, IntegrationError> {
        self.state
            .read()
            .service_models
            .get(id)
            .cloned()
            .ok_or_else(|| IntegrationError::NotFound(id.to_string()))
    }

    async fn list_service_models(&self, _cancel: &CancellationToken) -> Result<Vec<ServiceModel>, IntegrationError> {
        Ok(self.state.read().service_models.values().cloned().collect())
    }

    async fn apply_policy(&self, policy: serde_json::Value, _cancel: &CancellationToken) -> Result<PolicyApplyResult, IntegrationError> {
        let policy_id = policy
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Ok(PolicyApplyResult { policy_id, accepted: true })
    }

    async fn policy_status(&self, policy_id: &str, _cancel: &CancellationToken) -> Result<serde_json::Value, IntegrationError> {
        Ok(serde_json::json!({ "policyId": policy_id, "status": "active" }))
    }
}
