//! SSRF-safe callback URL validator.
//!
//! Grounded on the reference gateway's auth filter chain (`filter/auth.rs`):
//! a small ordered sequence of checks, each able to short-circuit with a
//! rejection, logged at the point of rejection rather than deep in a generic
//! handler.

use async_trait::async_trait;
use o2i_kernel::error::IntegrationError;
use o2i_kernel::validator::{CallbackValidator, SecurityConfig};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use url::Url;

/// Default implementation: scheme allowlist, then (unless disabled) DNS
/// resolution and IP-range classification.
pub struct SsrfCallbackValidator {
    security: SecurityConfig,
}

impl SsrfCallbackValidator {
    pub fn new(security: SecurityConfig) -> Self {
        Self { security }
    }

    fn reject(reason: impl Into<String>) -> IntegrationError {
        let reason = reason.into();
        warn!(%reason, "callback URL rejected");
        IntegrationError::ValidationReject(reason)
    }

    fn is_blocked(ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(v4) => is_blocked_v4(v4),
            IpAddr::V6(v6) => is_blocked_v6(v6),
        }
    }
}

fn is_blocked_v4(ip: Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_link_local()
        || ip.is_private()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_multicast()
}

fn is_blocked_v6(ip: Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() || ip.is_multicast() {
        return true;
    }
    // IPv4-mapped addresses inherit the IPv4 classification.
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_blocked_v4(v4);
    }
    let segments = ip.segments();
    // fe80::/10 link-local.
    if (segments[0] & 0xffc0) == 0xfe80 {
        return true;
    }
    // fc00::/7 unique local.
    if (segments[0] & 0xfe00) == 0xfc00 {
        return true;
    }
    false
}

#[async_trait]
impl CallbackValidator for SsrfCallbackValidator {
    async fn validate(&self, url: &str, cancel: &CancellationToken) -> Result<(), IntegrationError> {
        if cancel.is_cancelled() {
            return Err(IntegrationError::Cancelled);
        }
        let parsed = Url::parse(url).map_err(|e| Self::reject(format!("unparseable callback URL: {e}")))?;

        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(Self::reject(format!("unsupported scheme '{other}'"))),
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| Self::reject("callback URL has no host"))?;

        // `localhost` is rejected by name, independent of range
        // classification or the disable flag below: it never resolves to a
        // meaningfully-external address regardless of what DNS does with it.
        if host.eq_ignore_ascii_case("localhost") {
            return Err(Self::reject("callback host 'localhost' is never allowed"));
        }

        if self.security.disable_ssrf_protection {
            return Ok(());
        }

        // A literal IP skips DNS resolution entirely.
        if let Ok(ip) = host.parse::<IpAddr>() {
            return if Self::is_blocked(ip) {
                Err(Self::reject(format!("callback host '{host}' resolves to a disallowed address")))
            } else {
                Ok(())
            };
        }

        let port = parsed.port_or_known_default().unwrap_or(443);
        let lookup_target = format!("{host}:{port}");
        let resolved = tokio::select! {
            _ = cancel.cancelled() => return Err(IntegrationError::Cancelled),
            result = tokio::net::lookup_host(&lookup_target) => match result {
                Ok(addrs) => addrs.collect::<Vec<SocketAddr>>(),
                Err(_) => {
                    // Unresolvable host: accept. DNS may simply not be
                    // reachable from this process even though the callback
                    // is legitimate.
                    return Ok(());
                }
            },
        };

        if resolved.is_empty() {
            return Ok(());
        }

        if resolved.iter().any(|addr| Self::is_blocked(addr.ip())) {
            return Err(Self::reject(format!(
                "callback host '{host}' resolves to a disallowed address"
            )));
        }

        Ok(())
    }
}
