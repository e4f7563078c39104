//! Priority-ordered rule routing engine.
//!
//! Grounded on the reference gateway's `TrieRouter`: rules are kept sorted by
//! priority at insertion time via `partition_point`, rather than re-sorted on
//! every lookup. Matching here is conditions/capabilities based rather than
//! path-trie based, since targets are whole backends, not URL segments.

use o2i_kernel::error::IntegrationError;
use o2i_kernel::registry::{BackendHandle, BackendRegistry};
use o2i_kernel::routing::{rule_matches_resource_type, RoutingContext, RoutingEngine, RoutingRule};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// `RoutingEngine` over a borrowed registry. Holding `Arc<dyn BackendRegistry>`
/// rather than owning one keeps the dependency one-directional: the engine
/// consults the registry, the registry never knows routing rules exist.
pub struct RuleRoutingEngine {
    registry: Arc<dyn BackendRegistry>,
    rules: RwLock<Vec<RoutingRule>>,
    aggregation_enabled: AtomicBool,
    fallback_enabled: AtomicBool,
}

impl RuleRoutingEngine {
    pub fn new(registry: Arc<dyn BackendRegistry>) -> Self {
        Self {
            registry,
            rules: RwLock::new(Vec::new()),
            aggregation_enabled: AtomicBool::new(false),
            fallback_enabled: AtomicBool::new(false),
        }
    }

    /// Builder variant seeding the fallback-to-default behavior from
    /// `IntegrationConfig::fallback_enabled` at construction time.
    pub fn with_fallback_enabled(registry: Arc<dyn BackendRegistry>, fallback_enabled: bool) -> Self {
        let engine = Self::new(registry);
        engine.fallback_enabled.store(fallback_enabled, Ordering::SeqCst);
        engine
    }

    pub fn enable_fallback(&self) {
        self.fallback_enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable_fallback(&self) {
        self.fallback_enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_fallback_enabled(&self) -> bool {
        self.fallback_enabled.load(Ordering::SeqCst)
    }

    /// Insertion position preserving priority-desc order with stable
    /// insertion-order ties, mirroring the trie router's sorted-insert.
    fn insertion_index(rules: &[RoutingRule], priority: i32) -> usize {
        rules.partition_point(|r| r.priority >= priority)
    }

    fn matching_rules<'a>(&self, rules: &'a [RoutingRule], ctx: &RoutingContext) -> Vec<&'a RoutingRule> {
        rules
            .iter()
            .filter(|r| r.enabled)
            .filter(|r| rule_matches_resource_type(r, ctx))
            .filter(|r| {
                let backend_caps = self
                    .registry
                    .get_metadata(&r.target_backend)
                    .map(|m| m.identity.capabilities)
                    .unwrap_or_default();
                r.conditions.matches(ctx, &backend_caps)
                    && ctx
                        .required_capabilities
                        .iter()
                        .all(|cap| backend_caps.contains(cap))
            })
            .collect()
    }

    fn resolve_handle(&self, name: &str) -> Option<Arc<dyn BackendHandle>> {
        let metadata = self.registry.get_metadata(name)?;
        if !metadata.enabled || !metadata.healthy {
            return None;
        }
        self.registry.get(name)
    }
}

impl RoutingEngine for RuleRoutingEngine {
    fn route(&self, ctx: &RoutingContext, cancel: &CancellationToken) -> Result<Arc<dyn BackendHandle>, IntegrationError> {
        if cancel.is_cancelled() {
            return Err(IntegrationError::Cancelled);
        }
        let rules = self.rules.read();
        for rule in self.matching_rules(&rules, ctx) {
            if let Some(handle) = self.resolve_handle(&rule.target_backend) {
                return Ok(handle);
            }
        }
        drop(rules);

        // No rule matched a healthy backend. Fall back to the default
        // adapter backend only when fallback is enabled; otherwise the
        // caller must see that nothing could route this request.
        if !self.fallback_enabled.load(Ordering::SeqCst) {
            return Err(IntegrationError::NoBackend);
        }
        self.registry
            .get_default(o2i_kernel::registry::BackendKind::Adapter)
            .ok_or(IntegrationError::NoBackend)
    }

    fn route_multiple(
        &self,
        ctx: &RoutingContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<Arc<dyn BackendHandle>>, IntegrationError> {
        if cancel.is_cancelled() {
            return Err(IntegrationError::Cancelled);
        }
        let rules = self.rules.read();
        let mut seen = std::collections::HashSet::new();
        let mut handles = Vec::new();
        for rule in self.matching_rules(&rules, ctx) {
            if !seen.insert(rule.target_backend.clone()) {
                continue;
            }
            if let Some(handle) = self.resolve_handle(&rule.target_backend) {
                handles.push(handle);
            }
        }
        drop(rules);

        if handles.is_empty() && self.fallback_enabled.load(Ordering::SeqCst) {
            if let Some(default) = self.registry.get_default(o2i_kernel::registry::BackendKind::Adapter) {
                handles.push(default);
            }
        }
        if handles.is_empty() {
            return Err(IntegrationError::NoBackend);
        }
        Ok(handles)
    }

    fn add_rule(&self, rule: RoutingRule) -> Result<(), IntegrationError> {
        let mut rules = self.rules.write();
        if rules.iter().any(|r| r.name == rule.name) {
            return Err(IntegrationError::AlreadyExists(rule.name));
        }
        let idx = Self::insertion_index(&rules, rule.priority);
        rules.insert(idx, rule);
        Ok(())
    }

    fn remove_rule(&self, name: &str) -> Result<(), IntegrationError> {
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|r| r.name != name);
        if rules.len() == before {
            return Err(IntegrationError::NotFound(name.to_string()));
        }
        Ok(())
    }

    fn update_rule(&self, rule: RoutingRule) -> Result<(), IntegrationError> {
        let mut rules = self.rules.write();
        let existing = rules
            .iter()
            .position(|r| r.name == rule.name)
            .ok_or_else(|| IntegrationError::NotFound(rule.name.clone()))?;
        rules.remove(existing);
        let idx = Self::insertion_index(&rules, rule.priority);
        rules.insert(idx, rule);
        Ok(())
    }

    fn get_rule(&self, name: &str) -> Option<RoutingRule> {
        self.rules.read().iter().find(|r| r.name == name).cloned()
    }

    fn list_rules(&self) -> Vec<RoutingRule> {
        self.rules.read().clone()
    }

    fn enable_aggregation(&self) {
        self.aggregation_enabled.store(true, Ordering::SeqCst);
    }

    fn disable_aggregation(&self) {
        self.aggregation_enabled.store(false, Ordering::SeqCst);
    }

    fn is_aggregation_enabled(&self) -> bool {
        self.aggregation_enabled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use o2i_kernel::capability::Capability;
    use o2i_kernel::registry::{BackendIdentity, BackendKind};

    struct FakeHandle;

    #[async_trait]
    impl BackendHandle for FakeHandle {
        async fn health(&self, _cancel: &CancellationToken) -> Result<(), IntegrationError> {
            Ok(())
        }
    }

    async fn seeded_registry() -> Arc<dyn BackendRegistry> {
        let registry = Arc::new(crate::registry::InMemoryBackendRegistry::default());
        registry
            .register(
                BackendIdentity::new("low", BackendKind::Adapter, "1.0.0"),
                Arc::new(FakeHandle),
                false,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        registry
            .register(
                BackendIdentity::new("high", BackendKind::Adapter, "1.0.0")
                    .with_capabilities([Capability::ResourcePools]),
                Arc::new(FakeHandle),
                false,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn higher_priority_rule_wins() {
        let registry = seeded_registry().await;
        let engine = RuleRoutingEngine::new(registry);
        engine
            .add_rule(RoutingRule::new("low-rule", 10, "low"))
            .unwrap();
        engine
            .add_rule(RoutingRule::new("high-rule", 90, "high"))
            .unwrap();

        let ctx = RoutingContext::new("pnf");
        // Both rules match (no conditions); priority desc means "high" comes
        // first in the iteration order.
        let rules = engine.list_rules();
        assert_eq!(rules[0].name, "high-rule");
        assert!(engine.route(&ctx, &CancellationToken::new()).is_ok());
    }

    #[tokio::test]
    async fn route_multiple_deduplicates_targets() {
        let registry = seeded_registry().await;
        let engine = RuleRoutingEngine::new(registry);
        engine.add_rule(RoutingRule::new("r1", 50, "high")).unwrap();
        engine.add_rule(RoutingRule::new("r2", 40, "high")).unwrap();
        engine.add_rule(RoutingRule::new("r3", 30, "low")).unwrap();

        let ctx = RoutingContext::new("pnf");
        let handles = engine.route_multiple(&ctx, &CancellationToken::new()).unwrap();
        assert_eq!(handles.len(), 2);
    }

    #[tokio::test]
    async fn capability_conditions_filter_candidates() {
        let registry = seeded_registry().await;
        let engine = RuleRoutingEngine::new(registry);
        engine.enable_fallback();
        engine.add_rule(RoutingRule::new("r1", 50, "low")).unwrap();

        let ctx = RoutingContext::new("pnf").with_required_capability(Capability::ResourcePools);
        // "low" lacks ResourcePools, falls through to the default (first
        // registered backend promoted as default) since fallback is enabled.
        let handle = engine.route(&ctx, &CancellationToken::new());
        assert!(handle.is_ok());
    }

    #[tokio::test]
    async fn fallback_disabled_yields_no_backend() {
        let registry = seeded_registry().await;
        let engine = RuleRoutingEngine::new(registry);
        engine.add_rule(RoutingRule::new("r1", 50, "low")).unwrap();

        let ctx = RoutingContext::new("pnf").with_required_capability(Capability::ResourcePools);
        // "low" lacks ResourcePools and fallback is disabled (the default):
        // nothing can route this request.
        let err = engine.route(&ctx, &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, IntegrationError::NoBackend));

        let err = engine.route_multiple(&ctx, &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, IntegrationError::NoBackend));
    }

    #[tokio::test]
    async fn duplicate_rule_name_rejected() {
        let registry = seeded_registry().await;
        let engine = RuleRoutingEngine::new(registry);
        engine.add_rule(RoutingRule::new("r1", 50, "low")).unwrap();
        let err = engine.add_rule(RoutingRule::new("r1", 10, "high")).unwrap_err();
        assert!(matches!(err, IntegrationError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn missing_rule_removal_fails() {
        let registry = seeded_registry().await;
        let engine = RuleRoutingEngine::new(registry);
        assert!(engine.remove_rule("nope").is_err());
    }
}
