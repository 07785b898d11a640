//! Persistence of [`UserState`] records, one per user name.
//!
//! The [`StateStore`] contract is deliberately minimal: `get` returns an
//! optional record and `put` overwrites. Creating a record for an unknown
//! user is the caller's job, see [`load_or_create`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgPool};
use tracing::info;

use crate::UserState;

// ---

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Key-value access to user records (last write wins).
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, user_name: &str) -> Result<Option<UserState>, StoreError>;

    async fn put(&self, state: &UserState) -> Result<(), StoreError>;
}

/// Fetch the record for `user_name`, persisting a fresh one if none exists.
pub async fn load_or_create(
    store: &dyn StateStore,
    user_name: &str,
    now: DateTime<Utc>,
) -> Result<UserState, StoreError> {
    // ---
    if let Some(state) = store.get(user_name).await? {
        return Ok(state);
    }

    let state = UserState::new(user_name, now);
    store.put(&state).await?;
    info!(user = user_name, "Created record for new user");

    Ok(state)
}

// ---

/// PostgreSQL-backed store using the `user_state` table.
#[derive(Clone)]
pub struct PgStateStore {
    pool: PgPool,
}

impl PgStateStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StateStore for PgStateStore {
    // ---
    async fn get(&self, user_name: &str) -> Result<Option<UserState>, StoreError> {
        // ---
        let state = sqlx::query_as::<_, UserState>(
            r#"
            SELECT user_name, email, sgv, direction, test_time,
                   high_threshold, high_wait_minutes, low_threshold, low_wait_minutes,
                   last_high_notification_at, last_low_notification_at,
                   devices, created_at, updated_at
            FROM user_state
            WHERE user_name = $1
            "#,
        )
        .bind(user_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(state)
    }

    async fn put(&self, state: &UserState) -> Result<(), StoreError> {
        // ---
        sqlx::query(
            r#"
            INSERT INTO user_state (
                user_name, email, sgv, direction, test_time,
                high_threshold, high_wait_minutes, low_threshold, low_wait_minutes,
                last_high_notification_at, last_low_notification_at,
                devices, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (user_name) DO UPDATE SET
                email                     = EXCLUDED.email,
                sgv                       = EXCLUDED.sgv,
                direction                 = EXCLUDED.direction,
                test_time                 = EXCLUDED.test_time,
                high_threshold            = EXCLUDED.high_threshold,
                high_wait_minutes         = EXCLUDED.high_wait_minutes,
                low_threshold             = EXCLUDED.low_threshold,
                low_wait_minutes          = EXCLUDED.low_wait_minutes,
                last_high_notification_at = EXCLUDED.last_high_notification_at,
                last_low_notification_at  = EXCLUDED.last_low_notification_at,
                devices                   = EXCLUDED.devices,
                updated_at                = EXCLUDED.updated_at
            "#,
        )
        .bind(&state.user_name)
        .bind(&state.email)
        .bind(state.sgv)
        .bind(&state.direction)
        .bind(&state.test_time)
        .bind(state.high_threshold)
        .bind(state.high_wait_minutes)
        .bind(state.low_threshold)
        .bind(state.low_wait_minutes)
        .bind(state.last_high_notification_at)
        .bind(state.last_low_notification_at)
        .bind(Json(&state.devices))
        .bind(state.created_at)
        .bind(state.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ---

#[cfg(test)]
pub mod memory {
    //! In-process store for router tests.

    use std::collections::HashMap;

    use tokio::sync::RwLock;

    use super::*;

    #[derive(Default)]
    pub struct MemoryStateStore {
        records: RwLock<HashMap<String, UserState>>,
        pub fail_puts: bool,
    }

    impl MemoryStateStore {
        pub fn failing() -> Self {
            Self {
                fail_puts: true,
                ..Self::default()
            }
        }

        pub async fn insert(&self, state: UserState) {
            self.records
                .write()
                .await
                .insert(state.user_name.clone(), state);
        }
    }

    #[async_trait]
    impl StateStore for MemoryStateStore {
        async fn get(&self, user_name: &str) -> Result<Option<UserState>, StoreError> {
            Ok(self.records.read().await.get(user_name).cloned())
        }

        async fn put(&self, state: &UserState) -> Result<(), StoreError> {
            if self.fail_puts {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            self.insert(state.clone()).await;
            Ok(())
        }
    }
}
