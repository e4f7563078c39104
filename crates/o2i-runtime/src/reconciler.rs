//! Default [`NorthboundReconciler`]: per-backend inventory/deployment push
//! and event publication, with per-backend failure isolation.
//!
//! Grounded on the registry's own health-supervisor task shape
//! (`o2i_runtime::registry`) for the periodic loop, and on the reference
//! gateway's `main.rs` graceful-shutdown pattern for the stop/grace-deadline
//! handling.

use async_trait::async_trait;
use o2i_kernel::error::IntegrationError;
use o2i_kernel::reconciler::{DeploymentSnapshot, DomainEvent, InventorySnapshot, NorthboundReconciler};
use o2i_kernel::registry::BackendRegistry;
use o2i_kernel::capability::Capability;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Supplies the point-in-time snapshots the periodic loop pushes. The
/// triggering request path (out of scope here) supplies snapshots directly
/// to `sync_inventory`/`sync_deployments`; this trait exists only so the
/// background loop has something to pull from.
pub trait InventorySource: Send + Sync {
    fn inventory_snapshot(&self) -> InventorySnapshot;
    fn deployment_snapshot(&self) -> DeploymentSnapshot;
}

struct Supervisor {
    join: JoinHandle<()>,
    stop: Arc<Notify>,
}

pub struct DefaultNorthboundReconciler {
    registry: Arc<dyn BackendRegistry>,
    source: Arc<dyn InventorySource>,
    sync_interval: Duration,
    running: Arc<AtomicBool>,
    supervisor: parking_lot::Mutex<Option<Supervisor>>,
}

impl DefaultNorthboundReconciler {
    pub fn new(registry: Arc<dyn BackendRegistry>, source: Arc<dyn InventorySource>, sync_interval: Duration) -> Self {
        Self {
            registry,
            source,
            sync_interval,
            running: Arc::new(AtomicBool::new(false)),
            supervisor: parking_lot::Mutex::new(None),
        }
    }

    /// Run `op` against every enabled backend declaring `capability`,
    /// isolating per-backend failures: every candidate is attempted, each
    /// failure is logged at `warn` with the backend's identity, and the
    /// *first* failure (if any) is returned to the caller after the sweep
    /// completes.
    async fn for_each_capable<F, Fut>(
        &self,
        capability: Capability,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<(), IntegrationError>
    where
        F: Fn(Arc<dyn o2i_kernel::registry::BackendHandle>, &CancellationToken) -> Fut,
        Fut: std::future::Future<Output = Result<(), IntegrationError>>,
    {
        if cancel.is_cancelled() {
            return Err(IntegrationError::Cancelled);
        }
        let mut first_error = None;
        for handle in self.registry.find_by_capability(capability) {
            match op(handle, cancel).await {
                Ok(()) => {}
                Err(err) => {
                    warn!(error = %err, ?capability, "backend push failed");
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl NorthboundReconciler for DefaultNorthboundReconciler {
    async fn sync_inventory(&self, snapshot: &InventorySnapshot, cancel: &CancellationToken) -> Result<(), IntegrationError> {
        info!(
            deployment_managers = snapshot.deployment_managers.len(),
            resource_pools = snapshot.resource_pools.len(),
            resources = snapshot.resources.len(),
            "inventory sync starting"
        );
        let result = self
            .for_each_capable(Capability::InventorySync, cancel, |handle, cancel| {
                let snapshot = snapshot.clone();
                async move {
                    let plugin = handle.as_smo_plugin().ok_or_else(|| IntegrationError::NotSupported {
                        backend: "unknown".to_string(),
                        capability: Capability::InventorySync.as_str().to_string(),
                    })?;
                    plugin
                        .sync_infrastructure(
                            &snapshot.deployment_managers,
                            &snapshot.resource_pools,
                            &snapshot.resources,
                            cancel,
                        )
                        .await
                }
            })
            .await;
        info!("inventory sync finished");
        result
    }

    async fn sync_deployments(&self, snapshot: &DeploymentSnapshot, cancel: &CancellationToken) -> Result<(), IntegrationError> {
        info!(deployments = snapshot.deployments.len(), "deployment sync starting");
        let result = self
            .for_each_capable(Capability::InventorySync, cancel, |handle, cancel| {
                let snapshot = snapshot.clone();
                async move {
                    let plugin = handle.as_smo_plugin().ok_or_else(|| IntegrationError::NotSupported {
                        backend: "unknown".to_string(),
                        capability: Capability::InventorySync.as_str().to_string(),
                    })?;
                    plugin.sync_deployment(&snapshot.deployments, cancel).await
                }
            })
            .await;
        info!("deployment sync finished");
        result
    }

    async fn publish_event(&self, event: &DomainEvent, cancel: &CancellationToken) -> Result<(), IntegrationError> {
        // Convention: event types under the `deployment.` namespace route to
        // the deployment-event hook; everything else is an infrastructure
        // event. Backends never see this distinction, only the resulting
        // method call.
        let is_deployment_event = event.event_type.starts_with("deployment.");
        self.for_each_capable(Capability::EventPublishing, cancel, move |handle, cancel| {
            let event = event.clone();
            async move {
                let plugin = handle.as_smo_plugin().ok_or_else(|| IntegrationError::NotSupported {
                    backend: "unknown".to_string(),
                    capability: Capability::EventPublishing.as_str().to_string(),
                })?;
                if is_deployment_event {
                    plugin.publish_deployment_event(&event, cancel).await
                } else {
                    plugin.publish_infrastructure_event(&event, cancel).await
                }
            }
        })
        .await
    }

    async fn start_periodic_sync(&self, cancel: &CancellationToken) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let registry = self.registry.clone();
        let source = self.source.clone();
        let interval = self.sync_interval;
        let running = self.running.clone();
        let stop = Arc::new(Notify::new());
        let stop_for_task = stop.clone();
        let cancel_for_task = cancel.clone();

        let join = tokio::spawn(async move {
            let reconciler = DefaultNorthboundReconciler {
                registry,
                source: source.clone(),
                sync_interval: interval,
                running: Arc::new(AtomicBool::new(true)),
                supervisor: parking_lot::Mutex::new(None),
            };
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = stop_for_task.notified() => {
                        debug!("periodic sync stop signal received");
                        break;
                    }
                    _ = cancel_for_task.cancelled() => {
                        debug!("periodic sync cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        let inventory = source.inventory_snapshot();
                        let deployments = source.deployment_snapshot();
                        let bounded = tokio::time::timeout(Duration::from_secs(5 * 60), async {
                            if let Err(err) = reconciler.sync_inventory(&inventory, &cancel_for_task).await {
                                warn!(error = %err, "periodic inventory sync iteration failed");
                            }
                            if let Err(err) = reconciler.sync_deployments(&deployments, &cancel_for_task).await {
                                warn!(error = %err, "periodic deployment sync iteration failed");
                            }
                        })
                        .await;
                        if bounded.is_err() {
                            warn!("periodic sync iteration exceeded its bounded context");
                        }
                    }
                }
            }
            running.store(false, Ordering::SeqCst);
        });

        *self.supervisor.lock() = Some(Supervisor { join, stop });
    }

    async fn stop_periodic_sync(&self) -> Result<(), IntegrationError> {
        let supervisor = self.supervisor.lock().take();
        let Some(supervisor) = supervisor else {
            return Ok(());
        };
        supervisor.stop.notify_one();
        match tokio::time::timeout(Duration::from_secs(30), supervisor.join).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(join_err)) => Err(IntegrationError::wrap("periodic sync task panicked", join_err)),
            Err(_) => Err(IntegrationError::ShutdownTimeout),
        }
    }
}
