//! In-memory [`BackendRegistry`] implementation with a concurrent health
//! supervisor.
//!
//! Grounded on the reference gateway's `InMemoryCapabilityRegistry` (a plain
//! `HashMap`-backed store) plus a periodic health-check task, which that
//! reference implementation doesn't need because it has no runtime health
//! polling of its own.

use async_trait::async_trait;
use chrono::Utc;
use o2i_kernel::capability::Capability;
use o2i_kernel::error::IntegrationError;
use o2i_kernel::registry::{BackendHandle, BackendIdentity, BackendKind, BackendRecord, BackendRegistry};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct Inner {
    records: HashMap<String, BackendRecord>,
    defaults: HashMap<BackendKind, String>,
}

/// Health-supervisor tuning, mirroring `healthCheckInterval`/
/// `healthCheckTimeout` from the pre-parsed config record.
#[derive(Debug, Clone, Copy)]
pub struct HealthCheckTuning {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for HealthCheckTuning {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
        }
    }
}

struct Supervisor {
    join: JoinHandle<()>,
    stop: Arc<Notify>,
}

/// `BackendRegistry` backed by a `parking_lot::RwLock<HashMap<..>>` plus one
/// background `tokio` task that periodically refreshes each record's
/// `healthy` bit.
///
/// Suitable for single-node deployments; a service-mesh-aware registry
/// would live in its own adapter crate, same separation the reference
/// gateway draws between `InMemoryCapabilityRegistry` and Consul/mesh
/// alternatives.
pub struct InMemoryBackendRegistry {
    inner: Arc<RwLock<Inner>>,
    tuning: HealthCheckTuning,
    running: Arc<AtomicBool>,
    supervisor: parking_lot::Mutex<Option<Supervisor>>,
    closed: AtomicBool,
}

impl InMemoryBackendRegistry {
    pub fn new(tuning: HealthCheckTuning) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                records: HashMap::new(),
                defaults: HashMap::new(),
            })),
            tuning,
            running: Arc::new(AtomicBool::new(false)),
            supervisor: parking_lot::Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Probe `handle` under `timeout`; any error (including timeout itself,
    /// or cancellation) is treated as unhealthy — a health probe never fails
    /// the caller.
    async fn probe(handle: &Arc<dyn BackendHandle>, timeout: Duration, cancel: &CancellationToken) -> bool {
        match tokio::time::timeout(timeout, handle.health(cancel)).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                debug!(error = %err, "health probe returned an error");
                false
            }
            Err(_) => {
                debug!("health probe timed out");
                false
            }
        }
    }

    fn promote_next_default(inner: &mut Inner, kind: BackendKind) {
        let survivor = inner
            .records
            .values()
            .find(|r| r.identity.kind == kind)
            .map(|r| r.identity.name.clone());
        match survivor {
            Some(name) => {
                if let Some(record) = inner.records.get_mut(&name) {
                    record.is_default = true;
                }
                inner.defaults.insert(kind, name);
            }
            None => {
                inner.defaults.remove(&kind);
            }
        }
    }
}

impl Default for InMemoryBackendRegistry {
    fn default() -> Self {
        Self::new(HealthCheckTuning::default())
    }
}

#[async_trait]
impl BackendRegistry for InMemoryBackendRegistry {
    async fn register(
        &self,
        identity: BackendIdentity,
        handle: Arc<dyn BackendHandle>,
        is_default: bool,
        cancel: &CancellationToken,
    ) -> Result<(), IntegrationError> {
        if cancel.is_cancelled() {
            return Err(IntegrationError::Cancelled);
        }
        if identity.name.trim().is_empty() {
            return Err(IntegrationError::ConfigInvalid(
                "backend name cannot be empty".to_string(),
            ));
        }
        {
            let inner = self.inner.read();
            if inner.records.contains_key(&identity.name) {
                return Err(IntegrationError::AlreadyExists(identity.name));
            }
        }

        // One synchronous probe, bounded by the health timeout, to seed the
        // `healthy` bit before the record becomes visible.
        let healthy = Self::probe(&handle, self.tuning.timeout, cancel).await;
        let kind = identity.kind;
        let name = identity.name.clone();

        let mut inner = self.inner.write();
        let becomes_default = is_default || !inner.defaults.contains_key(&kind);
        if becomes_default {
            if let Some(previous) = inner.defaults.get(&kind).cloned() {
                if let Some(prev_record) = inner.records.get_mut(&previous) {
                    prev_record.is_default = false;
                }
            }
            inner.defaults.insert(kind, name.clone());
        }

        inner.records.insert(
            name.clone(),
            BackendRecord {
                identity,
                handle,
                enabled: true,
                healthy,
                registered_at: Utc::now(),
                last_health_check: Some(Utc::now()),
                is_default: becomes_default,
            },
        );
        info!(backend = %name, healthy, "backend registered");
        Ok(())
    }

    async fn unregister(&self, name: &str, cancel: &CancellationToken) -> Result<(), IntegrationError> {
        if cancel.is_cancelled() {
            return Err(IntegrationError::Cancelled);
        }
        let (removed, was_default, kind) = {
            let mut inner = self.inner.write();
            match inner.records.remove(name) {
                Some(record) => {
                    let was_default = record.is_default;
                    let kind = record.identity.kind;
                    if was_default {
                        inner.defaults.remove(&kind);
                        Self::promote_next_default(&mut inner, kind);
                    }
                    (Some(record), was_default, kind)
                }
                None => return Err(IntegrationError::NotFound(name.to_string())),
            }
        };

        if let Some(record) = removed {
            if let Err(err) = record.handle.release(cancel).await {
                warn!(backend = %name, error = %err, "release hook returned an error");
            }
        }
        if was_default {
            debug!(backend = %name, ?kind, "default backend unregistered; promotion re-evaluated");
        }
        Ok(())
    }

    fn get(&self, name: &str) -> Option<Arc<dyn BackendHandle>> {
        self.inner.read().records.get(name).map(|r| r.handle.clone())
    }

    fn get_metadata(&self, name: &str) -> Option<BackendRecord> {
        self.inner.read().records.get(name).cloned()
    }

    fn get_default(&self, kind: BackendKind) -> Option<Arc<dyn BackendHandle>> {
        let inner = self.inner.read();
        let name = inner.defaults.get(&kind)?;
        inner.records.get(name).map(|r| r.handle.clone())
    }

    fn set_default(&self, name: &str) -> Result<(), IntegrationError> {
        let mut inner = self.inner.write();
        let kind = inner
            .records
            .get(name)
            .map(|r| r.identity.kind)
            .ok_or_else(|| IntegrationError::NotFound(name.to_string()))?;

        if let Some(previous) = inner.defaults.get(&kind).cloned() {
            if let Some(prev_record) = inner.records.get_mut(&previous) {
                prev_record.is_default = false;
            }
        }
        inner.defaults.insert(kind, name.to_string());
        if let Some(record) = inner.records.get_mut(name) {
            record.is_default = true;
        }
        Ok(())
    }

    fn list(&self) -> Vec<BackendRecord> {
        self.inner.read().records.values().cloned().collect()
    }

    fn find_by_capability(&self, cap: Capability) -> Vec<Arc<dyn BackendHandle>> {
        self.inner
            .read()
            .records
            .values()
            .filter(|r| r.healthy && r.enabled && r.identity.has_capability(cap))
            .map(|r| r.handle.clone())
            .collect()
    }

    async fn start_health_checks(&self, cancel: &CancellationToken) {
        if self.running.swap(true, Ordering::SeqCst) {
            // Already running: idempotent no-op.
            return;
        }
        let inner = self.inner.clone();
        let tuning = self.tuning;
        let running = self.running.clone();
        let stop = Arc::new(Notify::new());
        let stop_for_task = stop.clone();
        let cancel_for_task = cancel.clone();

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tuning.interval);
            loop {
                tokio::select! {
                    _ = stop_for_task.notified() => {
                        debug!("health supervisor stop signal received");
                        break;
                    }
                    _ = cancel_for_task.cancelled() => {
                        debug!("health supervisor cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        let snapshot: Vec<(String, Arc<dyn BackendHandle>)> = {
                            let guard = inner.read();
                            guard
                                .records
                                .values()
                                .map(|r| (r.identity.name.clone(), r.handle.clone()))
                                .collect()
                        };
                        for (name, handle) in snapshot {
                            let healthy =
                                InMemoryBackendRegistry::probe(&handle, tuning.timeout, &cancel_for_task).await;
                            let mut guard = inner.write();
                            if let Some(record) = guard.records.get_mut(&name) {
                                let was_healthy = record.healthy;
                                record.healthy = healthy;
                                record.last_health_check = Some(Utc::now());
                                if was_healthy != healthy {
                                    if healthy {
                                        info!(backend = %name, "backend transitioned to healthy");
                                    } else {
                                        warn!(backend = %name, "backend transitioned to unhealthy");
                                    }
                                }
                            }
                        }
                    }
                }
            }
            running.store(false, Ordering::SeqCst);
        });

        *self.supervisor.lock() = Some(Supervisor { join, stop });
    }

    async fn stop_health_checks(&self, cancel: &CancellationToken) -> Result<(), IntegrationError> {
        if cancel.is_cancelled() {
            return Err(IntegrationError::Cancelled);
        }
        let supervisor = self.supervisor.lock().take();
        let Some(supervisor) = supervisor else {
            return Ok(());
        };
        supervisor.stop.notify_one();
        tokio::select! {
            _ = cancel.cancelled() => Err(IntegrationError::Cancelled),
            result = tokio::time::timeout(Duration::from_secs(30), supervisor.join) => {
                match result {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(join_err)) => Err(IntegrationError::wrap("health supervisor task panicked", join_err)),
                    Err(_) => Err(IntegrationError::ShutdownTimeout),
                }
            }
        }
    }

    async fn close(&self, cancel: &CancellationToken) -> Result<(), IntegrationError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.stop_health_checks(cancel).await?;
        let handles: Vec<Arc<dyn BackendHandle>> = self
            .inner
            .read()
            .records
            .values()
            .map(|r| r.handle.clone())
            .collect();
        for handle in handles {
            if let Err(err) = handle.release(cancel).await {
                warn!(error = %err, "release hook returned an error during close");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct FakeHandle {
        healthy: Arc<AtomicBool>,
        release_calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BackendHandle for FakeHandle {
        async fn health(&self, _cancel: &CancellationToken) -> Result<(), IntegrationError> {
            if self.healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(IntegrationError::Unhealthy("fake".to_string()))
            }
        }

        async fn release(&self, _cancel: &CancellationToken) -> Result<(), IntegrationError> {
            self.release_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn identity(name: &str, kind: BackendKind) -> BackendIdentity {
        BackendIdentity::new(name, kind, "1.0.0")
    }

    #[tokio::test]
    async fn register_then_get_round_trips() {
        let registry = InMemoryBackendRegistry::default();
        let handle: Arc<dyn BackendHandle> = Arc::new(FakeHandle {
            healthy: Arc::new(AtomicBool::new(true)),
            release_calls: Arc::new(AtomicUsize::new(0)),
        });
        registry
            .register(identity("p1", BackendKind::Adapter), handle, false, &CancellationToken::new())
            .await
            .unwrap();
        assert!(registry.get("p1").is_some());

        registry.unregister("p1", &CancellationToken::new()).await.unwrap();
        assert!(registry.get("p1").is_none());
    }

    #[tokio::test]
    async fn duplicate_registration_fails() {
        let registry = InMemoryBackendRegistry::default();
        let handle: Arc<dyn BackendHandle> = Arc::new(FakeHandle {
            healthy: Arc::new(AtomicBool::new(true)),
            release_calls: Arc::new(AtomicUsize::new(0)),
        });
        registry
            .register(
                identity("p1", BackendKind::Adapter),
                handle.clone(),
                false,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let err = registry
            .register(identity("p1", BackendKind::Adapter), handle, false, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn first_registration_becomes_default_for_its_kind() {
        let registry = InMemoryBackendRegistry::default();
        let handle: Arc<dyn BackendHandle> = Arc::new(FakeHandle {
            healthy: Arc::new(AtomicBool::new(true)),
            release_calls: Arc::new(AtomicUsize::new(0)),
        });
        registry
            .register(identity("p1", BackendKind::Adapter), handle, false, &CancellationToken::new())
            .await
            .unwrap();
        assert!(registry.get_default(BackendKind::Adapter).is_some());
    }

    #[tokio::test]
    async fn unregistering_default_promotes_a_survivor() {
        let registry = InMemoryBackendRegistry::default();
        let h1: Arc<dyn BackendHandle> = Arc::new(FakeHandle {
            healthy: Arc::new(AtomicBool::new(true)),
            release_calls: Arc::new(AtomicUsize::new(0)),
        });
        let h2: Arc<dyn BackendHandle> = Arc::new(FakeHandle {
            healthy: Arc::new(AtomicBool::new(true)),
            release_calls: Arc::new(AtomicUsize::new(0)),
        });
        registry
            .register(identity("p1", BackendKind::Adapter), h1, true, &CancellationToken::new())
            .await
            .unwrap();
        registry
            .register(identity("p2", BackendKind::Adapter), h2, false, &CancellationToken::new())
            .await
            .unwrap();

        registry.unregister("p1", &CancellationToken::new()).await.unwrap();
        assert!(registry.get_default(BackendKind::Adapter).is_some());

        registry.unregister("p2", &CancellationToken::new()).await.unwrap();
        assert!(registry.get_default(BackendKind::Adapter).is_none());
    }

    #[tokio::test]
    async fn find_by_capability_requires_healthy_and_enabled() {
        let registry = InMemoryBackendRegistry::default();
        let healthy_flag = Arc::new(AtomicBool::new(false));
        let handle: Arc<dyn BackendHandle> = Arc::new(FakeHandle {
            healthy: healthy_flag.clone(),
            release_calls: Arc::new(AtomicUsize::new(0)),
        });
        registry
            .register(
                identity("p1", BackendKind::Adapter).with_capabilities([Capability::ResourcePools]),
                handle,
                false,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        // Seeded health probe observed the handle as unhealthy.
        assert!(registry.find_by_capability(Capability::ResourcePools).is_empty());
    }

    #[tokio::test]
    async fn start_health_checks_is_idempotent() {
        let registry = InMemoryBackendRegistry::new(HealthCheckTuning {
            interval: Duration::from_millis(20),
            timeout: Duration::from_millis(50),
        });
        registry.start_health_checks(&CancellationToken::new()).await;
        registry.start_health_checks(&CancellationToken::new()).await;
        assert!(registry.supervisor.lock().is_some());
        registry.stop_health_checks(&CancellationToken::new()).await.unwrap();
        assert!(registry.supervisor.lock().is_none());
    }
}
