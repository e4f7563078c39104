//! Wiring example — registers a mock SMO plugin and adapter, routes a couple
//! of requests, and runs one manual inventory sync.
//!
//! Not a production entry point: the public request layer that builds
//! routing contexts from inbound traffic is out of scope here. This exists
//! to show how the pieces fit together end to end.
//!
//! # Environment variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `O2I_LOG` | `info` | `tracing_subscriber::EnvFilter` directive. |

use o2i_kernel::capability::Capability;
use o2i_kernel::reconciler::{DeploymentManager, InventorySnapshot, NorthboundReconciler, Resource, ResourcePool};
use o2i_kernel::registry::{BackendHandle, BackendIdentity, BackendKind, BackendRegistry};
use o2i_kernel::routing::{RoutingContext, RoutingEngine, RoutingRule};
use o2i_adapters::{MockAdapter, MockSmoPlugin};
use o2i_runtime::{DefaultNorthboundReconciler, HealthCheckTuning, InMemoryBackendRegistry, RuleRoutingEngine};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

struct StaticSource(InventorySnapshot);

impl o2i_runtime::InventorySource for StaticSource {
    fn inventory_snapshot(&self) -> InventorySnapshot {
        self.0.clone()
    }

    fn deployment_snapshot(&self) -> o2i_kernel::reconciler::DeploymentSnapshot {
        o2i_kernel::reconciler::DeploymentSnapshot::default()
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("O2I_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let registry: Arc<dyn BackendRegistry> =
        Arc::new(InMemoryBackendRegistry::new(HealthCheckTuning::default()));

    let adapter: Arc<dyn BackendHandle> = Arc::new(MockAdapter::new("edge-cluster-1"));
    registry
        .register(
            BackendIdentity::new("edge-cluster-1", BackendKind::Adapter, "1.0.0")
                .with_vendor("example-vim")
                .with_capabilities([Capability::ResourcePools, Capability::Resources]),
            adapter,
            true,
            &CancellationToken::new(),
        )
        .await
        .expect("register adapter");

    let smo: Arc<dyn BackendHandle> = Arc::new(MockSmoPlugin::new("openstack"));
    registry
        .register(
            BackendIdentity::new("onap-style-smo", BackendKind::Smo, "2.1.0")
                .with_vendor("example-smo")
                .with_capabilities([Capability::InventorySync, Capability::EventPublishing]),
            smo,
            true,
            &CancellationToken::new(),
        )
        .await
        .expect("register smo plugin");

    registry.start_health_checks(&CancellationToken::new()).await;

    let routing = RuleRoutingEngine::new(registry.clone());
    routing
        .add_rule(
            RoutingRule::new("edge-default", 50, "edge-cluster-1").with_resource_type("compute-node"),
        )
        .expect("add routing rule");

    let ctx = RoutingContext::new("compute-node").with_location("dc-east-1");
    match routing.route(&ctx, &CancellationToken::new()) {
        Ok(_) => tracing::info!("routed compute-node request to edge-cluster-1"),
        Err(err) => tracing::warn!(%err, "routing failed"),
    }

    let snapshot = InventorySnapshot {
        deployment_managers: vec![DeploymentManager {
            id: "dm-1".to_string(),
            name: "edge-cluster-1".to_string(),
            service_uri: "https://edge-cluster-1.example.invalid".to_string(),
            extensions: HashMap::new(),
        }],
        resource_pools: vec![ResourcePool {
            id: "pool-1".to_string(),
            name: "default-pool".to_string(),
            deployment_manager_id: "dm-1".to_string(),
            extensions: HashMap::new(),
        }],
        resources: vec![Resource {
            id: "res-1".to_string(),
            resource_pool_id: "pool-1".to_string(),
            extensions: HashMap::new(),
        }],
        resource_types: Vec::new(),
    };

    let reconciler = DefaultNorthboundReconciler::new(
        registry.clone(),
        Arc::new(StaticSource(snapshot.clone())),
        Duration::from_secs(5 * 60),
    );

    if let Err(err) = reconciler.sync_inventory(&snapshot, &CancellationToken::new()).await {
        tracing::warn!(%err, "inventory sync failed");
    } else {
        tracing::info!("inventory sync completed");
    }

    registry.close(&CancellationToken::new()).await.expect("close registry");
}
