//! Routing engine — kernel contract.
//!
//! [`RoutingEngine`] picks the backend(s) that should service a given
//! [`RoutingContext`] using a priority-ordered [`RoutingRule`] set. The
//! concrete implementation (`o2i-runtime::routing::RuleRoutingEngine`) holds
//! a borrowed reference to the registry — never the reverse — to avoid
//! cyclic references.

use crate::capability::Capability;
use crate::error::IntegrationError;
use crate::registry::BackendHandle;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

// ─────────────────────────────────────────────────────────────────────────────
// Location predicate
// ─────────────────────────────────────────────────────────────────────────────

/// At most one field is expected to be set. Evaluation order when more than
/// one is populated: exact → prefix → suffix → contains, first non-empty
/// wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationPredicate {
    pub exact: Option<String>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub contains: Option<String>,
}

impl LocationPredicate {
    fn is_set(&self) -> bool {
        self.exact.is_some() || self.prefix.is_some() || self.suffix.is_some() || self.contains.is_some()
    }

    /// Match `location` per the documented evaluation order. An unset
    /// predicate always matches; an empty `location` never matches a set
    /// predicate.
    pub fn matches(&self, location: &str) -> bool {
        if !self.is_set() {
            return true;
        }
        if location.is_empty() {
            return false;
        }
        if let Some(exact) = &self.exact {
            if !exact.is_empty() {
                return location == exact;
            }
        }
        if let Some(prefix) = &self.prefix {
            if !prefix.is_empty() {
                return location.starts_with(prefix.as_str());
            }
        }
        if let Some(suffix) = &self.suffix {
            if !suffix.is_empty() {
                return location.ends_with(suffix.as_str());
            }
        }
        if let Some(contains) = &self.contains {
            if !contains.is_empty() {
                return location.contains(contains.as_str());
            }
        }
        // Every field present but empty: treat as unset.
        true
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Conditions
// ─────────────────────────────────────────────────────────────────────────────

/// The conjunction of label, location, and capability requirements attached
/// to a [`RoutingRule`].
#[derive(Debug, Clone, Default)]
pub struct Conditions {
    pub labels: HashMap<String, String>,
    pub location: LocationPredicate,
    pub capabilities: HashSet<Capability>,
    /// Opaque to the core; adapters may interpret it.
    pub extensions: HashMap<String, serde_json::Value>,
}

impl Conditions {
    /// `true` iff every required label equals the context's value, the
    /// location predicate matches, and `backend_caps` is a superset of the
    /// required capability set.
    pub fn matches(&self, ctx: &RoutingContext, backend_caps: &HashSet<Capability>) -> bool {
        for (key, value) in &self.labels {
            match ctx.labels.get(key) {
                Some(v) if v == value => {}
                _ => return false,
            }
        }
        if !self.location.matches(&ctx.location) {
            return false;
        }
        if !self.capabilities.is_subset(backend_caps) {
            return false;
        }
        true
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Routing rule
// ─────────────────────────────────────────────────────────────────────────────

/// A single routing rule: priority + target + optional filter/conditions.
#[derive(Debug, Clone)]
pub struct RoutingRule {
    /// Unique within a rule set.
    pub name: String,
    /// Non-negative; higher wins. Ties broken by insertion order.
    pub priority: i32,
    pub target_backend: String,
    /// `None`/`""`/`"*"` means "any".
    pub resource_type: Option<String>,
    pub enabled: bool,
    pub conditions: Conditions,
}

impl RoutingRule {
    pub fn new(name: impl Into<String>, priority: i32, target_backend: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority,
            target_backend: target_backend.into(),
            resource_type: None,
            enabled: true,
            conditions: Conditions::default(),
        }
    }

    pub fn with_resource_type(mut self, rt: impl Into<String>) -> Self {
        self.resource_type = Some(rt.into());
        self
    }

    pub fn with_conditions(mut self, conditions: Conditions) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    fn resource_type_matches(&self, requested: &str) -> bool {
        match &self.resource_type {
            None => true,
            Some(rt) if rt.is_empty() || rt == "*" => true,
            Some(rt) => rt == requested,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Routing context
// ─────────────────────────────────────────────────────────────────────────────

/// Request-scoped bundle of attributes used to select a backend. Created by
/// callers for exactly one routing decision; never retained.
#[derive(Debug, Clone, Default)]
pub struct RoutingContext {
    pub resource_type: String,
    pub labels: HashMap<String, String>,
    pub location: String,
    pub required_capabilities: HashSet<Capability>,
    /// Opaque filter payload, interpreted by adapters only.
    pub filter_payload: Option<serde_json::Value>,
}

impl RoutingContext {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_required_capability(mut self, cap: Capability) -> Self {
        self.required_capabilities.insert(cap);
        self
    }
}

/// Exposed so `RoutingRule::resource_type_matches` can be reused by engine
/// implementations without duplicating the `""`/`"*"` special-casing.
pub fn rule_matches_resource_type(rule: &RoutingRule, ctx: &RoutingContext) -> bool {
    rule.resource_type_matches(&ctx.resource_type)
}

// ─────────────────────────────────────────────────────────────────────────────
// Routing engine trait
// ─────────────────────────────────────────────────────────────────────────────

/// Kernel contract for request routing.
pub trait RoutingEngine: Send + Sync {
    /// Single-backend selection. `Err(NoBackend)` when nothing matches and
    /// fallback is unavailable. `cancel` is checked before the decision is
    /// made; an already-cancelled token yields `Err(Cancelled)` immediately.
    fn route(&self, ctx: &RoutingContext, cancel: &CancellationToken) -> Result<Arc<dyn BackendHandle>, IntegrationError>;

    /// Every distinct matching backend, in rule-priority order, for
    /// aggregation fan-out.
    fn route_multiple(
        &self,
        ctx: &RoutingContext,
        cancel: &CancellationToken,
    ) -> Result<Vec<Arc<dyn BackendHandle>>, IntegrationError>;

    fn add_rule(&self, rule: RoutingRule) -> Result<(), IntegrationError>;
    fn remove_rule(&self, name: &str) -> Result<(), IntegrationError>;
    fn update_rule(&self, rule: RoutingRule) -> Result<(), IntegrationError>;
    fn get_rule(&self, name: &str) -> Option<RoutingRule>;
    /// Snapshot of the rule set, sorted priority-desc, insertion-stable.
    fn list_rules(&self) -> Vec<RoutingRule>;

    fn enable_aggregation(&self);
    fn disable_aggregation(&self);
    fn is_aggregation_enabled(&self) -> bool;
}
