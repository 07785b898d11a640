// src/routes/health.rs
//! Liveness endpoint for the dripbot receiver.
//!
//! `GET /health` answers without touching the state store or the mail relay,
//! so uptime checks keep working while a collaborator is down. Follows the
//! Explicit Module Boundary Pattern (EMBP): the handler stays private and the
//! gateway (`mod.rs`) only sees the subrouter.

use axum::{routing::get, Json, Router};
use serde::Serialize;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Subrouter with the `/health` route, generic over the gateway state.
pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/health", get(health))
}

#[cfg(test)]
mod tests {
    // ---
    use axum::http::StatusCode;

    use crate::routes::test_support::{body_string, default_app, get};

    #[tokio::test]
    async fn test_health_reports_version() {
        // ---
        let (app, _, _) = default_app();

        let response = get(app, "/health").await;
        assert_eq!(response.status(), StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }
}
