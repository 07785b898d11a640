//! `POST /{username}/devicestatus`: uploader battery and device status.

use axum::{
    body::Bytes,
    extract::{Path, State},
    routing::post,
    Router,
};
use chrono::Utc;
use tracing::info;

use super::AppState;
use crate::{error::AppError, store, DeviceStatusPayload};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/{username}/devicestatus", post(handler))
}

async fn handler(
    Path(user_name): Path<String>,
    State(app): State<AppState>,
    body: Bytes,
) -> Result<&'static str, AppError> {
    // ---
    let status = serde_json::from_slice::<DeviceStatusPayload>(&body)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    info!(user = %user_name, device = %status.device, "POST devicestatus");

    let now = Utc::now();
    let mut state = store::load_or_create(app.store.as_ref(), &user_name, now).await?;
    state.record_device_status(status);
    state.updated_at = now;
    app.store.put(&state).await?;

    Ok("success")
}
