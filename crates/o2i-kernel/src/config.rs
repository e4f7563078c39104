//! Pre-parsed configuration records and their `validate()`.
//!
//! Parsing the underlying file/env source is out of scope here; this module
//! owns only the in-memory, typed record and a single
//! `validate()` entry point that returns the *first* structural violation,
//! mirroring the `GatewayConfig::validate()` fail-fast pattern.

use crate::capability::Capability;
use crate::error::IntegrationError;
use crate::routing::{Conditions, LocationPredicate};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// `conditions.location.{exact,prefix,suffix,contains}` as loaded from
/// config — at most one is expected to carry meaning at match time.
#[derive(Debug, Clone, Default)]
pub struct LocationConditionConfig {
    pub exact: Option<String>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub contains: Option<String>,
}

impl From<LocationConditionConfig> for LocationPredicate {
    fn from(c: LocationConditionConfig) -> Self {
        LocationPredicate {
            exact: c.exact,
            prefix: c.prefix,
            suffix: c.suffix,
            contains: c.contains,
        }
    }
}

/// `conditions` block of a rule record.
#[derive(Debug, Clone, Default)]
pub struct ConditionsConfig {
    pub labels: HashMap<String, String>,
    pub location: LocationConditionConfig,
    pub capabilities: Vec<String>,
}

impl ConditionsConfig {
    /// Resolve into the kernel [`Conditions`] type, rejecting any capability
    /// string that doesn't map to the closed enumeration.
    pub fn resolve(&self) -> Result<Conditions, IntegrationError> {
        let mut capabilities = HashSet::new();
        for raw in &self.capabilities {
            let cap = Capability::from_str_ci(raw).ok_or_else(|| {
                IntegrationError::ConfigInvalid(format!("unknown capability '{raw}' in rule conditions"))
            })?;
            capabilities.insert(cap);
        }
        Ok(Conditions {
            labels: self.labels.clone(),
            location: self.location.clone().into(),
            capabilities,
            extensions: HashMap::new(),
        })
    }
}

/// `rules[]` entry.
#[derive(Debug, Clone)]
pub struct RuleConfig {
    pub name: String,
    /// Non-negative; defaults to 50 when unset by the caller.
    pub priority: i32,
    pub plugin: String,
    pub resource_type: Option<String>,
    pub enabled: bool,
    pub conditions: ConditionsConfig,
}

impl RuleConfig {
    pub fn new(name: impl Into<String>, plugin: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: 50,
            plugin: plugin.into(),
            resource_type: None,
            enabled: true,
            conditions: ConditionsConfig::default(),
        }
    }

    fn validate(&self) -> Result<(), IntegrationError> {
        if self.name.trim().is_empty() {
            return Err(IntegrationError::ConfigInvalid(
                "rule name cannot be empty".to_string(),
            ));
        }
        if self.plugin.trim().is_empty() {
            return Err(IntegrationError::ConfigInvalid(format!(
                "rule '{}' must reference a plugin",
                self.name
            )));
        }
        if self.priority < 0 {
            return Err(IntegrationError::ConfigInvalid(format!(
                "rule '{}' has negative priority {}",
                self.name, self.priority
            )));
        }
        self.conditions.resolve()?;
        Ok(())
    }
}

/// Envelope tuning block, shared by every registered backend client.
#[derive(Debug, Clone)]
pub struct EnvelopeTuningConfig {
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub retry_max_delay: Duration,
    pub retry_multiplier: f64,
}

impl Default for EnvelopeTuningConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_millis(200),
            retry_max_delay: Duration::from_secs(5),
            retry_multiplier: 2.0,
        }
    }
}

/// Registry health-supervisor tuning block.
#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Transport TLS block.
#[derive(Debug, Clone, Default)]
pub struct TlsConfigRecord {
    pub enabled: bool,
    pub cert_file: Option<String>,
    pub key_file: Option<String>,
    pub ca_file: Option<String>,
    pub insecure_skip_verify: bool,
}

/// `security.disableSSRFProtection`.
#[derive(Debug, Clone, Default)]
pub struct SecurityConfigRecord {
    pub disable_ssrf_protection: bool,
}

/// Top-level pre-parsed configuration for the integration plane.
#[derive(Debug, Clone)]
pub struct IntegrationConfig {
    pub default_backend: Option<String>,
    pub fallback_enabled: bool,
    pub aggregate_mode: bool,
    pub rules: Vec<RuleConfig>,
    pub envelope: EnvelopeTuningConfig,
    pub inventory_sync_interval: Duration,
    pub health_check: HealthCheckConfig,
    pub tls: TlsConfigRecord,
    pub security: SecurityConfigRecord,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            default_backend: None,
            fallback_enabled: false,
            aggregate_mode: false,
            rules: Vec::new(),
            envelope: EnvelopeTuningConfig::default(),
            inventory_sync_interval: Duration::from_secs(5 * 60),
            health_check: HealthCheckConfig::default(),
            tls: TlsConfigRecord::default(),
            security: SecurityConfigRecord::default(),
        }
    }
}

impl IntegrationConfig {
    /// Validate all structural invariants. Returns the *first* detected
    /// [`IntegrationError::ConfigInvalid`], mirroring the reference
    /// gateway's `GatewayConfig::validate()` ordering.
    pub fn validate(&self) -> Result<(), IntegrationError> {
        if self.fallback_enabled && self.default_backend.is_none() {
            return Err(IntegrationError::ConfigInvalid(
                "fallbackEnabled is set but no default backend is configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for rule in &self.rules {
            rule.validate()?;
            if !seen.insert(rule.name.as_str()) {
                return Err(IntegrationError::ConfigInvalid(format!(
                    "duplicate rule name '{}'",
                    rule.name
                )));
            }
        }

        if self.envelope.request_timeout.is_zero() {
            return Err(IntegrationError::ConfigInvalid(
                "requestTimeout must be greater than 0".to_string(),
            ));
        }

        if self.health_check.interval.is_zero() || self.health_check.timeout.is_zero() {
            return Err(IntegrationError::ConfigInvalid(
                "healthCheckInterval/healthCheckTimeout must be greater than 0".to_string(),
            ));
        }

        if self.tls.enabled && self.tls.insecure_skip_verify {
            tracing::warn!("TLS verification disabled via tlsInsecureSkipVerify");
        }

        Ok(())
    }
}
