//! Database schema management for `dripbot`.
//!
//! Ensures the `user_state` table exists before serving requests.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create the database schema (idempotent).
///
/// One row per user name; `devices` holds the latest uploader status keyed
/// by device identifier. Safe to call on every startup.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_state (
            user_name                 TEXT PRIMARY KEY,
            email                     TEXT,
            sgv                       DOUBLE PRECISION,
            direction                 TEXT,
            test_time                 TEXT,
            high_threshold            DOUBLE PRECISION,
            high_wait_minutes         INTEGER,
            low_threshold             DOUBLE PRECISION,
            low_wait_minutes          INTEGER,
            last_high_notification_at TIMESTAMPTZ,
            last_low_notification_at  TIMESTAMPTZ,
            devices                   JSONB       NOT NULL DEFAULT '{}'::jsonb,
            created_at                TIMESTAMPTZ NOT NULL,
            updated_at                TIMESTAMPTZ NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
