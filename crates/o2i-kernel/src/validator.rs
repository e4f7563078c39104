//! Subscription callback validator — kernel contract.
//!
//! [`CallbackValidator`] accepts or rejects a user-supplied callback URL used
//! for subscription delivery, with SSRF protection. The concrete
//! implementation (DNS resolution + IP classification) lives in
//! `o2i-runtime::callback_validator`.

use crate::error::IntegrationError;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Runtime toggle for the SSRF range checks. When disabled, only
/// scheme/host validation applies.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecurityConfig {
    pub disable_ssrf_protection: bool,
}

/// Kernel contract for callback URL acceptance.
#[async_trait]
pub trait CallbackValidator: Send + Sync {
    /// Accept or reject `url`. Returns `Ok(())` when the URL may be used as
    /// a subscription callback target, `Err(ValidationReject)` otherwise.
    /// `cancel` aborts DNS resolution in flight, surfacing
    /// [`IntegrationError::Cancelled`].
    async fn validate(&self, url: &str, cancel: &CancellationToken) -> Result<(), IntegrationError>;
}
