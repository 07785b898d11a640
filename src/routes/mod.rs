use std::sync::Arc;

use axum::Router;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{Config, Notifier, StateStore};

mod device_status;
mod entries;
mod health;
mod status_page;

// ---

/// Shared collaborators handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StateStore>,
    pub notifier: Arc<dyn Notifier>,
    pub config: Config,
}

pub fn router(state: AppState) -> Router {
    // ---
    Router::new()
        .merge(entries::router())
        .merge(device_status::router())
        .merge(status_page::router())
        .merge(health::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
