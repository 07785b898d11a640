//! `GET /{username}`: HTML page with the latest reading.
//!
//! The page reloads itself every two minutes and shows a warning when the
//! last reading is older than `MAX_DATA_AGE_MINUTES`.

use axum::{
    extract::{Path, State},
    response::Html,
    routing::get,
    Router,
};
use chrono::{DateTime, Duration, Utc};
use tracing::info;

use super::AppState;
use crate::{error::AppError, trend_arrow_html, UserState};

// ---

pub fn router() -> Router<AppState> {
    // ---
    Router::new().route("/{username}", get(handler))
}

async fn handler(
    Path(user_name): Path<String>,
    State(app): State<AppState>,
) -> Result<Html<String>, AppError> {
    // ---
    let state = app
        .store
        .get(&user_name)
        .await?
        .ok_or_else(|| AppError::UserNotFound(user_name.clone()))?;

    info!(user = %user_name, "Serving status page");

    Ok(Html(render(
        &state,
        Utc::now(),
        app.config.max_data_age_minutes,
    )))
}

fn render(state: &UserState, now: DateTime<Utc>, max_age_minutes: u32) -> String {
    // ---
    let sgv = state.sgv.map(|v| v.to_string()).unwrap_or_default();
    let direction = state.direction.as_deref().unwrap_or_default();
    let test_time = state.test_time.as_deref().unwrap_or_default();

    let mut out = format!(
        "<html><head><title>{} at {} {}</title><body>\n",
        escape_html(&state.user_name),
        sgv,
        trend_arrow_html(direction)
    );
    out.push_str("<script>setTimeout(function() { location.reload(true) }, 120000);</script>");
    out.push_str(
        "<style> .row:after {content: \"\"; display: table; clear: both;} \
         .leftcol {float: left; width: 130px} .rightcol { float: left; width: 220px}</style>",
    );

    for (label, value) in [
        ("BloodSugarLevel", sgv.as_str()),
        ("Direction", direction),
        ("LastTested", test_time),
    ] {
        out.push_str(&format!(
            "<div class=\"row\"><div class=\"leftcol\">{}</div><div class=\"rightcol\">{}</div></div>\n",
            label,
            escape_html(value)
        ));
    }

    if is_stale(test_time, now, max_age_minutes) {
        out.push_str(&format!(
            "<div style=\"color: red; border: 1px solid black\">Sample data is more than {} minutes old</div>",
            max_age_minutes
        ));
    }
    out.push_str("</body>");
    out
}

/// True when `test_time` parses and is older than the freshness window.
fn is_stale(test_time: &str, now: DateTime<Utc>, max_age_minutes: u32) -> bool {
    parse_test_time(test_time)
        .is_some_and(|t| now - t > Duration::minutes(i64::from(max_age_minutes)))
}

/// Uploaders send RFC 3339 or ISO 8601 with a colonless offset (`-0500`).
fn parse_test_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn escape_html(s: &str) -> String {
    // ---
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use axum::http::StatusCode;
    use chrono::TimeZone;

    use crate::routes::test_support::{body_string, default_app, get};
    use crate::StateStore;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2018, 5, 14, 17, 30, 0).unwrap()
    }

    fn state_with_reading(test_time: &str) -> UserState {
        let mut state = UserState::new("alice", now());
        state.sgv = Some(136.0);
        state.direction = Some("Flat".to_string());
        state.test_time = Some(test_time.to_string());
        state
    }

    #[test]
    fn test_parse_test_time_formats() {
        // ---
        let expected = Utc.with_ymd_and_hms(2018, 5, 14, 17, 6, 25).unwrap()
            + Duration::milliseconds(929);
        assert_eq!(parse_test_time("2018-05-14T12:06:25.929-0500"), Some(expected));
        assert_eq!(parse_test_time("2018-05-14T17:06:25.929Z"), Some(expected));
        assert_eq!(parse_test_time("yesterday"), None);
    }

    #[test]
    fn test_staleness_window() {
        // ---
        // 12:06:25 -05:00 is 17:06:25 UTC, 23.5 minutes before now()
        assert!(is_stale("2018-05-14T12:06:25.929-0500", now(), 20));
        assert!(!is_stale("2018-05-14T12:06:25.929-0500", now(), 30));
        assert!(!is_stale("2018-05-14T17:25:00Z", now(), 20));
        assert!(!is_stale("garbage", now(), 20));
        assert!(!is_stale("", now(), 20));
    }

    #[test]
    fn test_render_fresh_reading() {
        // ---
        let html = render(&state_with_reading("2018-05-14T17:25:00Z"), now(), 20);

        assert!(html.contains("<title>alice at 136 &rarr;</title>"));
        assert!(html.contains("<div class=\"leftcol\">BloodSugarLevel</div><div class=\"rightcol\">136</div>"));
        assert!(html.contains("<div class=\"rightcol\">Flat</div>"));
        assert!(html.contains("<div class=\"rightcol\">2018-05-14T17:25:00Z</div>"));
        assert!(html.contains("location.reload(true) }, 120000"));
        assert!(!html.contains("minutes old"));
    }

    #[test]
    fn test_render_stale_reading() {
        // ---
        let html = render(&state_with_reading("2018-05-14T12:06:25.929-0500"), now(), 20);
        assert!(html.contains("Sample data is more than 20 minutes old"));
    }

    #[test]
    fn test_render_escapes_user_data() {
        // ---
        let mut state = state_with_reading("2018-05-14T17:25:00Z");
        state.user_name = "<b>eve</b>".to_string();
        state.direction = Some("<script>".to_string());
        let html = render(&state, now(), 20);

        assert!(html.contains("&lt;b&gt;eve&lt;/b&gt; at 136 </title>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>alert"));
    }

    #[test]
    fn test_render_user_without_reading() {
        // ---
        let html = render(&UserState::new("alice", now()), now(), 20);
        assert!(html.contains("<title>alice at  </title>"));
        assert!(!html.contains("minutes old"));
    }

    #[tokio::test]
    async fn test_status_page_route() {
        // ---
        let (app, store, _) = default_app();
        store.insert(state_with_reading("2018-05-14T17:25:00Z")).await;

        let response = get(app, "/alice").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "text/html; charset=utf-8"
        );
        let html = body_string(response).await;
        assert!(html.contains("alice at 136"));
    }

    #[tokio::test]
    async fn test_status_page_unknown_user() {
        // ---
        let (app, store, _) = default_app();

        let response = get(app, "/nobody").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(store.get("nobody").await.unwrap().is_none());
    }
}
