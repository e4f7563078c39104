//! End-to-end scenario coverage across the registry, routing engine,
//! envelope, reconciler, and callback validator working together.

use o2i_adapters::{MockAdapter, MockSmoPlugin};
use o2i_kernel::capability::Capability;
use o2i_kernel::reconciler::{DeploymentManager, Resource, ResourcePool};
use o2i_kernel::registry::{BackendHandle, BackendIdentity, BackendKind, BackendRegistry};
use o2i_kernel::routing::{Conditions, RoutingContext, RoutingEngine, RoutingRule};
use o2i_kernel::validator::{CallbackValidator, SecurityConfig};
use o2i_runtime::{HealthCheckTuning, InMemoryBackendRegistry, RuleRoutingEngine, SsrfCallbackValidator};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

async fn two_backend_registry() -> (Arc<dyn BackendRegistry>, Arc<MockAdapter>, Arc<MockAdapter>) {
    let registry: Arc<dyn BackendRegistry> = Arc::new(InMemoryBackendRegistry::default());
    let low = Arc::new(MockAdapter::new("low-priority-site"));
    let high = Arc::new(MockAdapter::new("high-priority-site"));

    registry
        .register(
            BackendIdentity::new("low-priority-site", BackendKind::Adapter, "1.0.0")
                .with_capabilities([Capability::Resources]),
            low.clone(),
            false,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    registry
        .register(
            BackendIdentity::new("high-priority-site", BackendKind::Adapter, "1.0.0")
                .with_capabilities([Capability::Resources, Capability::ResourcePools]),
            high.clone(),
            true,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    (registry, low, high)
}

/// S1 — rule priority with a label condition picks the higher-priority rule,
/// and `route_multiple` aggregates every distinct matching target.
#[tokio::test]
async fn s1_priority_and_aggregation() {
    let (registry, _low, _high) = two_backend_registry().await;
    let engine = RuleRoutingEngine::new(registry);

    let mut east_conditions = Conditions::default();
    east_conditions.labels.insert("region".to_string(), "east".to_string());

    engine
        .add_rule(
            RoutingRule::new("fallback", 10, "low-priority-site").with_resource_type("pnf"),
        )
        .unwrap();
    engine
        .add_rule(
            RoutingRule::new("region-east", 80, "high-priority-site")
                .with_resource_type("pnf")
                .with_conditions(east_conditions),
        )
        .unwrap();

    // Requiring ResourcePools excludes "low-priority-site" from matching,
    // so a successful single-route call must have resolved the region rule.
    let ctx = RoutingContext::new("pnf")
        .with_label("region", "east")
        .with_required_capability(Capability::ResourcePools);
    assert!(engine.route(&ctx, &CancellationToken::new()).is_ok());

    let ctx_any = RoutingContext::new("pnf").with_label("region", "east");
    engine.enable_aggregation();
    engine.enable_fallback();
    let all = engine.route_multiple(&ctx_any, &CancellationToken::new()).unwrap();
    assert_eq!(all.len(), 2, "both rules match 'pnf' with no region requirement on the fallback rule");
}

/// S2 — location prefix match with graceful fallthrough to the default
/// backend when no rule's location predicate matches.
#[tokio::test]
async fn s2_location_prefix_fallthrough() {
    let (registry, _low, _high) = two_backend_registry().await;
    let engine = RuleRoutingEngine::new(registry);

    let mut conditions = Conditions::default();
    conditions.location.prefix = Some("dc-".to_string());
    engine
        .add_rule(RoutingRule::new("dc-rule", 50, "low-priority-site").with_conditions(conditions))
        .unwrap();

    let matching = RoutingContext::new("vnf").with_location("dc-dallas-1");
    let non_matching = RoutingContext::new("vnf").with_location("aws-east-1");

    assert!(engine.route(&matching, &CancellationToken::new()).is_ok());
    // Falls through to the registered default ("high-priority-site").
    engine.enable_fallback();
    assert!(engine.route(&non_matching, &CancellationToken::new()).is_ok());
}

/// S3 — an unhealthy target backend is skipped in favor of the default.
#[tokio::test]
async fn s3_unhealthy_backend_falls_back_to_default() {
    let (registry, low, _high) = two_backend_registry().await;
    low.set_healthy(false);
    // Re-register to force a fresh health probe reflecting the flag... the
    // registry already probed at registration time, so flip before the next
    // supervisor tick by driving one manually via unregister/re-register.
    registry.unregister("low-priority-site", &CancellationToken::new()).await.unwrap();
    registry
        .register(
            BackendIdentity::new("low-priority-site", BackendKind::Adapter, "1.0.0")
                .with_capabilities([Capability::Resources]),
            low,
            false,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let engine = RuleRoutingEngine::new(registry);
    engine.enable_fallback();
    engine
        .add_rule(RoutingRule::new("r1", 90, "low-priority-site"))
        .unwrap();

    let ctx = RoutingContext::new("vnf");
    let handle = engine.route(&ctx, &CancellationToken::new()).unwrap();
    assert!(
        handle.health(&CancellationToken::new()).await.is_ok(),
        "should have fallen back to the healthy default"
    );
}

/// S4 — SSRF rejection table.
#[tokio::test]
async fn s4_ssrf_rejection_table() {
    let validator = SsrfCallbackValidator::new(SecurityConfig::default());
    assert!(validator.validate("http://127.0.0.1/x", &CancellationToken::new()).await.is_err());
    assert!(validator.validate("http://10.0.0.1/x", &CancellationToken::new()).await.is_err());
    assert!(validator.validate("http://[fe80::1]/x", &CancellationToken::new()).await.is_err());
    assert!(validator.validate("https://8.8.8.8/x", &CancellationToken::new()).await.is_ok());
    assert!(validator.validate("ftp://example.com/x", &CancellationToken::new()).await.is_err());
}

/// S6 — inventory projection: one deployment manager with an explicit
/// `vimType` override becomes one cloud-region, one physical resource
/// becomes one PNF, and no VNF is pushed.
#[tokio::test]
async fn s6_inventory_projection() {
    let smo = MockSmoPlugin::new("openstack");

    let mut extensions = HashMap::new();
    extensions.insert("vimType".to_string(), serde_json::json!("openstack"));
    let managers = vec![DeploymentManager {
        id: "dm1".to_string(),
        name: "dm1".to_string(),
        service_uri: String::new(),
        extensions,
    }];
    let pools = vec![ResourcePool {
        id: "pool1".to_string(),
        name: "pool1".to_string(),
        deployment_manager_id: "dm1".to_string(),
        extensions: HashMap::new(),
    }];
    let resources = vec![Resource {
        id: "res1".to_string(),
        resource_pool_id: "pool1".to_string(),
        extensions: HashMap::new(),
    }];

    use o2i_kernel::plugin::SMOPlugin;
    smo.sync_infrastructure(&managers, &pools, &resources, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(smo.pushed_cloud_regions(), vec!["dm1".to_string()]);
    assert_eq!(smo.pushed_pnfs(), vec!["res1".to_string()]);
    assert!(smo.pushed_vnfs().is_empty());
}

/// Health-check tuning wiring smoke test: starting and stopping the
/// supervisor around a registry with a registered backend does not hang.
#[tokio::test]
async fn health_supervisor_start_stop_smoke() {
    let registry = InMemoryBackendRegistry::new(HealthCheckTuning {
        interval: std::time::Duration::from_millis(10),
        timeout: std::time::Duration::from_millis(50),
    });
    let adapter: Arc<dyn BackendHandle> = Arc::new(MockAdapter::new("site"));
    registry
        .register(
            BackendIdentity::new("site", BackendKind::Adapter, "1.0.0"),
            adapter,
            true,
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    registry.start_health_checks(&CancellationToken::new()).await;
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    registry.stop_health_checks(&CancellationToken::new()).await.unwrap();
}

/// S2b — with fallback disabled (the default), a context that matches no
/// rule yields `NoBackend` instead of silently resolving to the registry's
/// default backend.
#[tokio::test]
async fn s2b_fallback_disabled_yields_no_backend() {
    let (registry, _low, _high) = two_backend_registry().await;
    let engine = RuleRoutingEngine::new(registry);

    let mut conditions = Conditions::default();
    conditions.location.prefix = Some("dc-".to_string());
    engine
        .add_rule(RoutingRule::new("dc-rule", 50, "low-priority-site").with_conditions(conditions))
        .unwrap();

    let non_matching = RoutingContext::new("vnf").with_location("aws-east-1");
    let err = engine.route(&non_matching, &CancellationToken::new()).unwrap_err();
    assert!(matches!(err, o2i_kernel::error::IntegrationError::NoBackend));
}
