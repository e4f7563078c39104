//! Framework-level contract for the O2 integration plane.
//!
//! This crate defines the *trait interfaces and shared types* that the
//! routing/registry/reconciliation machinery is built from. No concrete
//! implementations live here — those belong in `o2i-runtime` (the in-process
//! registry, routing engine, HTTP envelope, reconciler, callback validator)
//! and `o2i-adapters` (example backends).
//!
//! # Architecture mapping
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              o2i-kernel  (this crate)                       │
//! │  BackendRegistry trait     RoutingEngine trait               │
//! │  BackendClientEnvelope     NorthboundReconciler trait         │
//! │  CallbackValidator trait   InfrastructureAdapter / SMOPlugin  │
//! │  IntegrationError          IntegrationConfig + validate()     │
//! └──────────────────────────┬──────────────────────────────────┘
//!                            │  depends on
//! ┌──────────────────────────▼──────────────────────────────────┐
//! │              o2i-runtime  (runtime crate)                   │
//! │  InMemoryBackendRegistry: impl BackendRegistry               │
//! │  RuleRoutingEngine: impl RoutingEngine                       │
//! │  HttpBackendClient: impl BackendClientEnvelope               │
//! │  NorthboundReconciler (concrete), CallbackValidator (concrete)│
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod capability;
pub mod config;
pub mod envelope;
pub mod error;
pub mod plugin;
pub mod reconciler;
pub mod registry;
pub mod routing;
pub mod validator;

pub use capability::Capability;
pub use error::IntegrationError;
pub use registry::{BackendHandle, BackendIdentity, BackendKind, BackendRecord, BackendRegistry};
pub use routing::{Conditions, LocationPredicate, RoutingContext, RoutingEngine, RoutingRule};
