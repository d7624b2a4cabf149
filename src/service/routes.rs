//! Axum routes for the cut kernel service.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};

use crate::error::CutError;
use crate::planner::{CutPlanner, Plan};
use crate::registry::FacetSelectors;
use crate::types::{Facet, FacetAddress, InitCall, Selector, SelectorState, UpgradeRequest};
use crate::REGISTRY_SCHEMA_VERSION;

use super::middleware::record_plan_metrics;
use super::state::ServiceState;

/// Shared handle passed to every handler.
pub type AppState = Arc<ServiceState>;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to plan a batch against the current registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRequest {
    /// Upgrade requests, in order.
    pub requests: Vec<UpgradeRequest>,
    /// Facet interfaces for this plan only; override catalog entries.
    #[serde(default)]
    pub facets: Vec<Facet>,
    /// Optional initialization call.
    #[serde(default)]
    pub init: Option<InitCall>,
}

/// Planned batch plus the registry it was planned against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanResponse {
    /// The plan.
    pub plan: Plan,
    /// Deterministic batch identifier.
    pub batch_id: String,
    /// Whether the batch changes nothing.
    pub noop: bool,
}

/// Request to register a facet interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterFacetRequest {
    /// The facet.
    pub facet: Facet,
}

/// Response after registering a facet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterFacetResponse {
    /// Facet address.
    pub address: FacetAddress,
    /// Number of selectors the facet exposes.
    pub selector_count: usize,
    /// Whether an earlier interface for the address was replaced.
    pub replaced: bool,
}

/// Full registry contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryResponse {
    /// Proxy the registry belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diamond: Option<FacetAddress>,
    /// Registry fingerprint.
    pub fingerprint: String,
    /// Selector → owner entries, ascending by selector.
    pub routes: Vec<RouteEntry>,
}

/// One registry entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteEntry {
    /// Selector.
    pub selector: Selector,
    /// Owning facet.
    pub facet: FacetAddress,
}

/// Ownership of a single selector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorResponse {
    /// Selector asked about.
    pub selector: Selector,
    /// Its state.
    pub state: SelectorState,
}

/// Loupe view of the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacetsResponse {
    /// Facets with their selectors, in order of their lowest selector.
    pub facets: Vec<FacetSelectors>,
    /// Registry fingerprint.
    pub fingerprint: String,
}

/// Service health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `healthy` when the process answers.
    pub status: String,
    /// Crate version.
    pub version: String,
    /// Persisted registry schema version.
    pub schema_version: String,
    /// Number of routed selectors.
    pub selector_count: usize,
    /// Number of catalogued facet interfaces.
    pub facet_count: usize,
    /// Registry fingerprint.
    pub registry_fingerprint: String,
}

/// Structured error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Machine-readable error code.
    pub code: String,
    /// Additional error details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response with code and message.
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            details: None,
        }
    }

    /// Add details to the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn error_code(error: &CutError) -> &'static str {
    match error {
        CutError::InvalidSignatureFormat { .. } => "INVALID_SIGNATURE",
        CutError::UnknownSignature { .. } => "UNKNOWN_SIGNATURE",
        CutError::SelectorCollision { .. } => "SELECTOR_COLLISION",
        CutError::UnknownFacet(_) => "UNKNOWN_FACET",
        CutError::SelectorAlreadyOwned { .. } => "SELECTOR_ALREADY_OWNED",
        CutError::SelectorNotReplaceable { .. } => "SELECTOR_NOT_REPLACEABLE",
        CutError::SelectorNotOwned(_) => "SELECTOR_NOT_OWNED",
        CutError::InvalidRemoveTarget(_) => "INVALID_REMOVE_TARGET",
        CutError::NullFacetAddress(_) => "NULL_FACET_ADDRESS",
        CutError::ActionMismatch { .. } => "ACTION_MISMATCH",
        CutError::InvalidInitCall(_) => "INVALID_INIT_CALL",
        CutError::MultipleInitCalls => "MULTIPLE_INIT_CALLS",
        CutError::EmptyBatch => "EMPTY_BATCH",
        CutError::StalePlan { .. } => "STALE_PLAN",
        CutError::ResyncRequired => "RESYNC_REQUIRED",
        CutError::UpgradeRejected { .. } => "UPGRADE_REJECTED",
        CutError::RegistryDrift { .. } => "REGISTRY_DRIFT",
        CutError::OutcomeUnknown { .. } => "OUTCOME_UNKNOWN",
        CutError::RoutingTable(_) => "ROUTING_TABLE",
        CutError::InterfaceSource(_) => "INTERFACE_SOURCE",
        CutError::Persistence(_) => "PERSISTENCE",
        CutError::InvalidAddress(_) => "INVALID_ADDRESS",
        CutError::InvalidSelector(_) => "INVALID_SELECTOR",
        CutError::Abi(_) => "ABI",
    }
}

fn cut_error(error: CutError) -> HandlerError {
    let status = match &error {
        CutError::UnknownFacet(_) => StatusCode::NOT_FOUND,
        CutError::StalePlan { .. } | CutError::ResyncRequired => StatusCode::CONFLICT,
        e if e.is_planning_error() => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::BAD_REQUEST,
    };
    (
        status,
        Json(ErrorResponse::new(error_code(&error), error.to_string())),
    )
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Plan a batch against the current registry.
async fn plan_handler(
    State(state): State<AppState>,
    Json(request): Json<PlanRequest>,
) -> Result<Json<PlanResponse>, HandlerError> {
    let start = Instant::now();

    // Snapshot under short read locks; planning itself runs lock-free.
    let snapshot = state.current_registry().await;
    let mut planner = CutPlanner::new();
    for facet in state.catalog.read().iter() {
        planner.register_facet(facet.clone());
    }
    for facet in request.facets {
        planner.register_facet(facet);
    }
    if let Some(init) = request.init {
        planner = planner.with_init(init).map_err(cut_error)?;
    }

    let plan = planner.plan(&snapshot, &request.requests).map_err(cut_error)?;

    record_plan_metrics(
        plan.batch.cuts.len(),
        plan.batch.selector_count(),
        plan.diagnostics.len(),
        start.elapsed().as_millis() as u64,
    );

    Ok(Json(PlanResponse {
        batch_id: plan.batch.batch_id(),
        noop: plan.is_noop(),
        plan,
    }))
}

/// Register a facet interface for later plans.
async fn register_facet_handler(
    State(state): State<AppState>,
    Json(request): Json<RegisterFacetRequest>,
) -> Json<RegisterFacetResponse> {
    let address = request.facet.address;
    let selector_count = request.facet.len();
    let replaced = state.catalog.write().register(request.facet);
    Json(RegisterFacetResponse {
        address,
        selector_count,
        replaced,
    })
}

/// Loupe view: every facet with the selectors it owns.
async fn facets_handler(State(state): State<AppState>) -> Json<FacetsResponse> {
    let registry = state.current_registry().await;
    Json(FacetsResponse {
        facets: registry.facets(),
        fingerprint: registry.fingerprint(),
    })
}

/// Selectors owned by one facet.
async fn facet_selectors_handler(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<FacetSelectors>, HandlerError> {
    let facet_address = FacetAddress::from_hex(&address).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(error_code(&e), e.to_string()).with_details(address.clone())),
        )
    })?;
    let selectors = state
        .current_registry()
        .await
        .facet_function_selectors(&facet_address);
    Ok(Json(FacetSelectors {
        facet_address,
        selectors,
    }))
}

/// Full registry with fingerprint.
async fn registry_handler(State(state): State<AppState>) -> Json<RegistryResponse> {
    let registry = state.current_registry().await;
    Json(RegistryResponse {
        diamond: state.diamond,
        fingerprint: registry.fingerprint(),
        routes: registry
            .iter()
            .map(|(selector, facet)| RouteEntry {
                selector: *selector,
                facet: *facet,
            })
            .collect(),
    })
}

/// Owner lookup for one selector.
async fn selector_handler(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<SelectorResponse>, HandlerError> {
    let selector = Selector::from_hex(&raw).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(error_code(&e), e.to_string()).with_details(raw.clone())),
        )
    })?;
    let selector_state = state.current_registry().await.state(&selector);
    Ok(Json(SelectorResponse {
        selector,
        state: selector_state,
    }))
}

/// Health check endpoint.
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = state.current_registry().await;
    let (selector_count, registry_fingerprint) = (registry.len(), registry.fingerprint());

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        schema_version: REGISTRY_SCHEMA_VERSION.to_string(),
        selector_count,
        facet_count: state.catalog.read().len(),
        registry_fingerprint,
    })
}

// ============================================================================
// Router Construction
// ============================================================================

/// Create the Axum router for the cut kernel service.
pub fn create_router(state: ServiceState) -> Router {
    let state = Arc::new(state);

    Router::new()
        // Planning
        .route("/api/plan", post(plan_handler))
        // Facet catalog and loupe
        .route("/api/facets", get(facets_handler).post(register_facet_handler))
        .route("/api/facets/:address", get(facet_selectors_handler))
        // Registry
        .route("/api/registry", get(registry_handler))
        .route("/api/registry/:selector", get(selector_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::registry::SelectorRegistry;
    use crate::service::state::FacetCatalog;
    use crate::store::{JsonFileRegistryStore, RegistryStore};
    use crate::types::selector_of;

    fn state() -> ServiceState {
        let owner = FacetAddress::repeat_byte(0xaa);
        let registry =
            SelectorRegistry::from_entries([(selector_of("owner()").unwrap(), owner)]).unwrap();
        let mut catalog = FacetCatalog::new();
        catalog.register(Facet::new(owner, ["owner()", "transferOwnership(address)"]).unwrap());
        ServiceState::with_catalog(Some(FacetAddress::repeat_byte(0xd4)), registry, catalog)
    }

    async fn call(router: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_plan_drops_owned_and_adds_rest() {
        let body = serde_json::json!({
            "requests": [{
                "facet": FacetAddress::repeat_byte(0xaa).to_hex(),
                "action": "add",
            }]
        });
        let (status, json) = call(create_router(state()), post_json("/api/plan", body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["plan"]["batch"]["cuts"][0]["selectors"][0], "0xf2fde38b");
        assert_eq!(json["plan"]["diagnostics"][0]["selector"], "0x8da5cb5b");
        assert_eq!(json["noop"], false);
    }

    #[tokio::test]
    async fn test_plan_unknown_facet_is_not_found() {
        let body = serde_json::json!({
            "requests": [{
                "facet": FacetAddress::repeat_byte(0x77).to_hex(),
                "action": "add",
            }]
        });
        let (status, json) = call(create_router(state()), post_json("/api/plan", body)).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["code"], "UNKNOWN_FACET");
    }

    #[tokio::test]
    async fn test_plan_action_mismatch_is_unprocessable() {
        let body = serde_json::json!({
            "requests": [{
                "facet": FacetAddress::repeat_byte(0xaa).to_hex(),
                "action": "replace",
                "selection": { "mode": "only", "signatures": ["transferOwnership(address)"] },
            }]
        });
        let (status, json) = call(create_router(state()), post_json("/api/plan", body)).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["code"], "ACTION_MISMATCH");
    }

    #[tokio::test]
    async fn test_selector_lookup() {
        let router = create_router(state());
        let request = Request::get("/api/registry/0x8da5cb5b").body(Body::empty()).unwrap();
        let (status, json) = call(router.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["state"]["state"], "owned_by");

        let request = Request::get("/api/registry/0xf2fde38b").body(Body::empty()).unwrap();
        let (_, json) = call(router.clone(), request).await;
        assert_eq!(json["state"]["state"], "unowned");

        let request = Request::get("/api/registry/nope").body(Body::empty()).unwrap();
        let (status, json) = call(router, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["code"], "INVALID_SELECTOR");
    }

    #[tokio::test]
    async fn test_register_facet_then_loupe() {
        let state = state();
        let router = create_router(state.clone());
        let body = serde_json::json!({
            "facet": {
                "address": FacetAddress::repeat_byte(0xbb).to_hex(),
                "signatures": ["facets()"],
            }
        });
        let (status, json) = call(router.clone(), post_json("/api/facets", body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["selector_count"], 1);
        assert_eq!(json["replaced"], false);
        assert_eq!(state.catalog.read().len(), 2);

        let request = Request::get("/api/facets").body(Body::empty()).unwrap();
        let (_, json) = call(router, request).await;
        assert_eq!(json["facets"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_plans_follow_registry_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        let writer = JsonFileRegistryStore::new(&path);
        writer.save(&SelectorRegistry::new()).await.unwrap();

        let owner = FacetAddress::repeat_byte(0xaa);
        let state = ServiceState::from_store(None, JsonFileRegistryStore::new(&path))
            .await
            .unwrap();
        state
            .catalog
            .write()
            .register(Facet::new(owner, ["owner()", "transferOwnership(address)"]).unwrap());
        let router = create_router(state);

        // The applier commits owner() and saves while the service runs.
        let next =
            SelectorRegistry::from_entries([(selector_of("owner()").unwrap(), owner)]).unwrap();
        writer.save(&next).await.unwrap();

        let request = Request::get("/api/registry/0x8da5cb5b").body(Body::empty()).unwrap();
        let (_, json) = call(router.clone(), request).await;
        assert_eq!(json["state"]["state"], "owned_by");

        let body = serde_json::json!({
            "requests": [{ "facet": owner.to_hex(), "action": "add" }]
        });
        let (status, json) = call(router, post_json("/api/plan", body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["plan"]["batch"]["base_fingerprint"], next.fingerprint());
        assert_eq!(json["plan"]["batch"]["cuts"][0]["selectors"][0], "0xf2fde38b");
        assert_eq!(json["plan"]["diagnostics"][0]["selector"], "0x8da5cb5b");
    }
}
