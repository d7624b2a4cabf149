//! Cut Kernel REST Service
//!
//! Exposes planning and the registry loupe as a REST API. The service plans
//! against the persisted registry; it never submits batches itself.
//!
//! ## Endpoints
//!
//! - `POST /api/plan` - Plan a batch from upgrade requests
//! - `GET /api/facets` - Loupe view: facets with their selectors
//! - `POST /api/facets` - Register a facet interface
//! - `GET /api/facets/:address` - Selectors owned by one facet
//! - `GET /api/registry` - Full registry with fingerprint
//! - `GET /api/registry/:selector` - Owner lookup for one selector
//! - `GET /health` - Service health check

pub mod middleware;
pub mod routes;
pub mod state;

pub use middleware::{metrics_middleware, record_plan_metrics};
pub use routes::{create_router, AppState};
pub use state::{FacetCatalog, ServiceState};
