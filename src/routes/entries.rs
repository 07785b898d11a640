//! `POST /{username}/entries`: glucose readings from the uploader.
//!
//! Each request runs lookup-or-create, evaluates every entry against the
//! user's thresholds, persists the resulting state and only then dispatches
//! alerts. A failed dispatch is logged and never undoes the stored state.

use axum::{
    body::Bytes,
    extract::{Path, State},
    routing::post,
    Router,
};
use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::AppState;
use crate::{alert, error::AppError, store, Alert, EntriesBody, Notifier};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/{username}/entries", post(handler))
}

async fn handler(
    Path(user_name): Path<String>,
    State(app): State<AppState>,
    body: Bytes,
) -> Result<&'static str, AppError> {
    // ---
    let parsed = serde_json::from_slice::<EntriesBody>(&body)
        .map_err(|e| AppError::BadRequest(e.to_string()))?
        .into_ordered();
    for reason in &parsed.skipped {
        warn!(user = %user_name, reason = %reason, "Skipping entry without a usable sgv");
    }

    let entries = parsed.usable;
    if entries.is_empty() {
        return Err(AppError::BadRequest("no usable entries in payload".to_string()));
    }

    info!(user = %user_name, count = entries.len(), "POST entries");

    let now = Utc::now();
    let mut state = store::load_or_create(app.store.as_ref(), &user_name, now).await?;
    let mut alerts = Vec::new();

    for entry in &entries {
        let reading = entry.to_reading();
        debug!(
            user = %user_name,
            device = entry.device.as_deref().unwrap_or("unknown"),
            sgv = reading.value,
            direction = %reading.direction,
            "Evaluating reading"
        );

        let evaluation = alert::evaluate(&reading, state, &app.config.alert_policy, now);
        for deferral in &evaluation.deferred {
            info!(
                user = %user_name,
                kind = ?deferral.kind,
                last_sent_at = %deferral.last_sent_at,
                "Deferring alert, still inside wait window"
            );
        }
        alerts.extend(evaluation.alerts);
        state = evaluation.state;
    }

    state.updated_at = now;
    app.store.put(&state).await?;

    dispatch(app.notifier.as_ref(), &user_name, &alerts).await;

    Ok("success")
}

/// Send every alert; failures are logged and otherwise ignored.
async fn dispatch(notifier: &dyn Notifier, user_name: &str, alerts: &[Alert]) {
    // ---
    for alert in alerts {
        match notifier
            .send_alert(&alert.subject, &alert.message, &alert.recipients)
            .await
        {
            Ok(()) => info!(user = user_name, kind = ?alert.kind, "Alert dispatched"),
            Err(e) => error!(user = user_name, kind = ?alert.kind, error = %e, "Failed to dispatch alert"),
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use std::sync::Arc;

    use axum::http::StatusCode;
    use chrono::Duration;

    use crate::notifier::recording::{FailingNotifier, RecordingNotifier};
    use crate::routes::test_support::{body_string, build_test_app, default_app, post};
    use crate::store::memory::MemoryStateStore;
    use crate::{StateStore, UserState};

    const ENTRY_230: &str = r#"{"device":"xDrip-LimiTTer","date":1526317585929,"dateString":"2018-05-14T12:06:25.929-0500","sgv":230,"direction":"Flat"}"#;

    async fn user_with_contact(store: &MemoryStateStore) {
        let mut user = UserState::new("alice", chrono::Utc::now() - Duration::days(1));
        user.email = Some("alice@example.com".to_string());
        store.insert(user).await;
    }

    #[tokio::test]
    async fn test_first_entry_creates_user() {
        // ---
        let (app, store, notifier) = default_app();

        let response = post(app, "/bob/entries", ENTRY_230).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "success");

        let state = store.get("bob").await.unwrap().expect("record created");
        assert_eq!(state.sgv, Some(230.0));
        assert_eq!(state.direction.as_deref(), Some("Flat"));
        assert_eq!(state.test_time.as_deref(), Some("2018-05-14T12:06:25.929-0500"));
        assert_eq!(state.high_threshold, Some(225.0));
        assert_eq!(state.low_wait_minutes, Some(30));

        // No contact address, so nothing is sent
        assert!(notifier.sent().is_empty());
        assert_eq!(state.last_high_notification_at, None);
    }

    #[tokio::test]
    async fn test_high_entry_sends_alert_and_persists_timestamp() {
        // ---
        let (app, store, notifier) = default_app();
        user_with_contact(&store).await;

        let response = post(app, "/alice/entries", ENTRY_230).await;
        assert_eq!(response.status(), StatusCode::OK);

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "high bs");
        assert_eq!(sent[0].recipients, vec!["alice@example.com"]);
        assert!(sent[0].body.starts_with("HIGH BS: 230 ⇒ Flat"));

        let state = store.get("alice").await.unwrap().unwrap();
        assert!(state.last_high_notification_at.is_some());
        assert_eq!(state.updated_at, state.last_high_notification_at.unwrap());
    }

    #[tokio::test]
    async fn test_repeat_entry_is_held_by_cooldown() {
        // ---
        let (app, store, notifier) = default_app();
        user_with_contact(&store).await;

        post(app.clone(), "/alice/entries", ENTRY_230).await;
        let second = ENTRY_230.replace("230", "240");
        let response = post(app, "/alice/entries", &second).await;
        assert_eq!(response.status(), StatusCode::OK);

        assert_eq!(notifier.sent().len(), 1);
        let state = store.get("alice").await.unwrap().unwrap();
        assert_eq!(state.sgv, Some(240.0));
    }

    #[tokio::test]
    async fn test_batch_fires_at_most_one_alert_per_kind() {
        // ---
        let (app, store, notifier) = default_app();
        user_with_contact(&store).await;

        let batch = r#"[
            {"date":1000,"dateString":"t1","sgv":250,"direction":"SingleUp"},
            {"date":3000,"dateString":"t3","sgv":50,"direction":"DoubleDown"},
            {"date":2000,"dateString":"t2","sgv":260,"direction":"Flat"},
            {"date":4000,"dateString":"t4","sgv":45,"direction":"DoubleDown"}
        ]"#;
        let response = post(app, "/alice/entries", batch).await;
        assert_eq!(response.status(), StatusCode::OK);

        let subjects: Vec<String> = notifier.sent().into_iter().map(|a| a.subject).collect();
        assert_eq!(subjects, vec!["high bs", "low bs"]);

        // Latest entry by device date wins
        let state = store.get("alice").await.unwrap().unwrap();
        assert_eq!(state.sgv, Some(45.0));
        assert_eq!(state.test_time.as_deref(), Some("t4"));
    }

    #[tokio::test]
    async fn test_notifier_failure_keeps_state() {
        // ---
        let store = Arc::new(MemoryStateStore::default());
        user_with_contact(&store).await;
        let app = build_test_app(store.clone(), Arc::new(FailingNotifier));

        let response = post(app, "/alice/entries", ENTRY_230).await;
        assert_eq!(response.status(), StatusCode::OK);

        let state = store.get("alice").await.unwrap().unwrap();
        assert_eq!(state.sgv, Some(230.0));
        assert!(state.last_high_notification_at.is_some());
    }

    #[tokio::test]
    async fn test_store_failure_returns_500_without_alerts() {
        // ---
        let store = Arc::new(MemoryStateStore::failing());
        let notifier = Arc::new(RecordingNotifier::default());
        let app = build_test_app(store, notifier.clone());

        let response = post(app, "/alice/entries", ENTRY_230).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_string(response).await.contains("STORE_ERROR"));
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body_is_rejected() {
        // ---
        let (app, store, _) = default_app();

        let response = post(app.clone(), "/alice/entries", "{not json").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = post(app.clone(), "/alice/entries", "[]").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = post(app, "/alice/entries", r#"[{"type":"mbg","date":2000,"mbg":180}]"#).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert!(store.get("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mixed_batch_stores_readings_and_alerts() {
        // ---
        let (app, store, notifier) = default_app();
        user_with_contact(&store).await;

        let batch = r#"[
            {"type":"sgv","date":1000,"dateString":"t1","sgv":250,"direction":"Flat"},
            {"type":"mbg","date":2000,"mbg":180}
        ]"#;
        let response = post(app, "/alice/entries", batch).await;
        assert_eq!(response.status(), StatusCode::OK);

        let state = store.get("alice").await.unwrap().unwrap();
        assert_eq!(state.sgv, Some(250.0));
        assert_eq!(state.test_time.as_deref(), Some("t1"));

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "high bs");
    }
}
