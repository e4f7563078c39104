//! Example backend implementations: a worked reference for real adapters
//! (A&AI-class, ONAP-class, OSM-class) that would live in their own
//! downstream crates, and the fixtures integration tests drive against.

pub mod mock_adapter;
pub mod mock_smo;

pub use mock_adapter::MockAdapter;
pub use mock_smo::MockSmoPlugin;
