//! Service middleware for metrics and request tracking.
//!
//! ## Metrics Exposed
//!
//! - `request`: count and latency by path pattern, method, status
//! - `plan`: cuts, selectors and dropped no-ops per planning call

use std::sync::OnceLock;
use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use regex_lite::Regex;
use tracing::info;

/// Metrics middleware that records request counts and latency.
///
/// Uses tracing for now; events can be aggregated from logs.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = normalize_path(request.uri().path());

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status().as_u16();

    info!(
        target: "diamond_cut::metrics",
        metric_type = "request",
        path = %path,
        method = %method,
        status = status,
        latency_ms = latency.as_millis() as u64,
        "request_metric"
    );

    response
}

/// Normalize path for metrics to avoid high cardinality.
///
/// Replaces selector and address segments with placeholders.
fn normalize_path(path: &str) -> String {
    static PATTERNS: OnceLock<Option<(Regex, Regex)>> = OnceLock::new();

    let patterns = PATTERNS.get_or_init(|| {
        let address = Regex::new(r"/0[xX][0-9a-fA-F]{40}(/|$)").ok()?;
        let selector = Regex::new(r"/0[xX][0-9a-fA-F]{8}(/|$)").ok()?;
        Some((address, selector))
    });

    match patterns {
        Some((address, selector)) => {
            let path = address.replace_all(path, "/:address$1");
            selector.replace_all(&path, "/:selector$1").into_owned()
        }
        None => path.to_string(),
    }
}

/// Record planning metrics.
pub fn record_plan_metrics(cuts: usize, selectors: usize, dropped: usize, latency_ms: u64) {
    info!(
        target: "diamond_cut::metrics",
        metric_type = "plan",
        cuts = cuts,
        selectors = selectors,
        dropped = dropped,
        latency_ms = latency_ms,
        "plan_metric"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_replaces_selector() {
        let normalized = normalize_path("/api/registry/0xa9059cbb");
        assert_eq!(normalized, "/api/registry/:selector");
    }

    #[test]
    fn test_normalize_path_replaces_address() {
        let normalized =
            normalize_path("/api/facets/0xD43040F9562c7Fd9be370986960CAa6b91EFD084/selectors");
        assert_eq!(normalized, "/api/facets/:address/selectors");
    }

    #[test]
    fn test_normalize_path_preserves_regular_path() {
        assert_eq!(normalize_path("/health"), "/health");
        assert_eq!(normalize_path("/api/registry"), "/api/registry");
    }
}
