//! `MockAdapter` — an in-memory [`InfrastructureAdapter`] used by integration
//! tests and as a worked example for real adapters (container-cluster-class,
//! VIM-class) that would live in their own downstream crate.

use async_trait::async_trait;
use o2i_kernel::capability::Capability;
use o2i_kernel::error::IntegrationError;
use o2i_kernel::plugin::{InfrastructureAdapter, SubscriptionDescriptor};
use o2i_kernel::reconciler::{DeploymentManager, Resource, ResourcePool, ResourceType};
use o2i_kernel::registry::BackendHandle;
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct State {
    deployment_managers: HashMap<String, DeploymentManager>,
    resource_pools: Vec<ResourcePool>,
    resources: Vec<Resource>,
    resource_types: Vec<ResourceType>,
    subscriptions: HashMap<String, SubscriptionDescriptor>,
}

pub struct MockAdapter {
    name: String,
    version: String,
    capabilities: Vec<Capability>,
    state: RwLock<State>,
    healthy: std::sync::atomic::AtomicBool,
}

impl MockAdapter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: "1.0.0".to_string(),
            capabilities: vec![Capability::ResourcePools, Capability::Resources, Capability::DeploymentManagers],
            state: RwLock::new(State::default()),
            healthy: std::sync::atomic::AtomicBool::new(true),
        }
    }

    pub fn seed_resource_pool(&self, pool: ResourcePool) {
        self.state.write().resource_pools.push(pool);
    }

    pub fn seed_resource(&self, resource: Resource) {
        self.state.write().resources.push(resource);
    }

    /// Test hook: force the next `health()` call to fail.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl BackendHandle for MockAdapter {
    async fn health(&self, _cancel: &CancellationToken) -> Result<(), IntegrationError> {
        if self.healthy.load(std::sync::atomic::Ordering::SeqCst) {
            Ok(())
        } else {
            Err(IntegrationError::Unhealthy(self.name.clone()))
        }
    }

    fn as_infrastructure_adapter(&self) -> Option<&dyn InfrastructureAdapter> {
        Some(self)
    }
}

#[async_trait]
impl InfrastructureAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    async fn health(&self, cancel: &CancellationToken) -> Result<(), IntegrationError> {
        BackendHandle::health(self, cancel).await
    }

    async fn close(&self, _cancel: &CancellationToken) -> Result<(), IntegrationError> {
        Ok(())
    }

    async fn list_deployment_managers(&self, _cancel: &CancellationToken) -> Result<Vec<DeploymentManager>, IntegrationError> {
        Ok(self.state.read().deployment_managers.values().cloned().collect())
    }

    async fn get_deployment_manager(&self, id: &str, _cancel: &CancellationToken) -> Result<DeploymentManager, IntegrationError> {
        self.state
            .read()
            .deployment_managers
            .get(id)
            .cloned()
            .ok_or_else(|| IntegrationError::NotFound(id.to_string()))
    }

    async fn create_deployment_manager(
        &self,
        dm: DeploymentManager,
        _cancel: &CancellationToken,
    ) -> Result<DeploymentManager, IntegrationError> {
        let mut state = self.state.write();
        if state.deployment_managers.contains_key(&dm.id) {
            return Err(IntegrationError::AlreadyExists(dm.id));
        }
        state.deployment_managers.insert(dm.id.clone(), dm.clone());
        Ok(dm)
    }

    async fn delete_deployment_manager(&self, id: &str, _cancel: &CancellationToken) -> Result<(), IntegrationError> {
        let mut state = self.state.write();
        state
            .deployment_managers
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| IntegrationError::NotFound(id.to_string()))
    }

    async fn list_resource_pools(&self, _cancel: &CancellationToken) -> Result<Vec<ResourcePool>, IntegrationError> {
        Ok(self.state.read().resource_pools.clone())
    }

    async fn list_resources(&self, pool_id: &str, _cancel: &CancellationToken) -> Result<Vec<Resource>, IntegrationError> {
        Ok(self
            .state
            .read()
            .resources
            .iter()
            .filter(|r| r.resource_pool_id == pool_id)
            .cloned()
            .collect())
    }

    async fn list_resource_types(&self, _cancel: &CancellationToken) -> Result<Vec<ResourceType>, IntegrationError> {
        Ok(self.state.read().resource_types.clone())
    }

    async fn create_subscription(
        &self,
        sub: SubscriptionDescriptor,
        _cancel: &CancellationToken,
    ) -> Result<SubscriptionDescriptor, IntegrationError> {
        let mut state = self.state.write();
        if state.subscriptions.contains_key(&sub.id) {
            return Err(IntegrationError::AlreadyExists(sub.id));
        }
        state.subscriptions.insert(sub.id.clone(), sub.clone());
        Ok(sub)
    }

    async fn delete_subscription(&self, id: &str, _cancel: &CancellationToken) -> Result<(), IntegrationError> {
        let mut state = self.state.write();
        state
            .subscriptions
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| IntegrationError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dm(id: &str) -> DeploymentManager {
        DeploymentManager {
            id: id.to_string(),
            name: id.to_string(),
            service_uri: format!("https://{id}.example.invalid"),
            extensions: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let adapter = MockAdapter::new("adapter-1");
        adapter
            .create_deployment_manager(dm("dm-1"), &CancellationToken::new())
            .await
            .unwrap();
        let fetched = adapter
            .get_deployment_manager("dm-1", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(fetched.id, "dm-1");
    }

    #[tokio::test]
    async fn duplicate_create_fails() {
        let adapter = MockAdapter::new("adapter-1");
        adapter
            .create_deployment_manager(dm("dm-1"), &CancellationToken::new())
            .await
            .unwrap();
        let err = adapter
            .create_deployment_manager(dm("dm-1"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn delete_missing_fails() {
        let adapter = MockAdapter::new("adapter-1");
        assert!(adapter
            .delete_deployment_manager("nope", &CancellationToken::new())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn health_reflects_test_hook() {
        let adapter = MockAdapter::new("adapter-1");
        adapter.set_healthy(false);
        assert!(BackendHandle::health(&adapter, &CancellationToken::new()).await.is_err());
    }
}
