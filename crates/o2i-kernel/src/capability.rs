//! The closed capability enumeration every backend declares against.
//!
//! The routing engine and reconciler consult this set before invoking an
//! optional operation — interface via capability set, not inheritance.

use serde::{Deserialize, Serialize};

/// A tag from the closed set declaring what a backend can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Capability {
    /// Can push local inventory northbound.
    InventorySync,
    /// Can publish infrastructure/deployment events northbound.
    EventPublishing,
    /// Exposes workflow execute/status/cancel operations.
    WorkflowOrchestration,
    /// Exposes service-model register/get/list operations.
    ServiceModeling,
    /// Exposes policy apply/status operations.
    PolicyManagement,
    /// CRUD on resource pools (tenants / logical pools).
    ResourcePools,
    /// CRUD on physical/virtual resources.
    Resources,
    /// CRUD on deployment managers (cloud-region / VIM-account records).
    DeploymentManagers,
}

impl Capability {
    /// Stable lowercase-kebab name, as used in config records and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::InventorySync => "inventory-sync",
            Capability::EventPublishing => "event-publishing",
            Capability::WorkflowOrchestration => "workflow-orchestration",
            Capability::ServiceModeling => "service-modeling",
            Capability::PolicyManagement => "policy-management",
            Capability::ResourcePools => "resource-pools",
            Capability::Resources => "resources",
            Capability::DeploymentManagers => "deployment-managers",
        }
    }

    /// Parse from the kebab-case config representation.
    pub fn from_str_ci(s: &str) -> Option<Self> {
        match s {
            "inventory-sync" => Some(Capability::InventorySync),
            "event-publishing" => Some(Capability::EventPublishing),
            "workflow-orchestration" => Some(Capability::WorkflowOrchestration),
            "service-modeling" => Some(Capability::ServiceModeling),
            "policy-management" => Some(Capability::PolicyManagement),
            "resource-pools" => Some(Capability::ResourcePools),
            "resources" => Some(Capability::Resources),
            "deployment-managers" => Some(Capability::DeploymentManagers),
            _ => None,
        }
    }
}
