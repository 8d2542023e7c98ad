//! Row-level authorization, injected into handlers through [`crate::AppState`].

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};

#[async_trait]
pub trait Policy: Send + Sync {
    /// Whether `profile_id` may read and post in `conversation_id`.
    async fn is_participant(&self, conversation_id: Uuid, profile_id: Uuid) -> ServiceResult<bool>;

    async fn is_admin(&self, profile_id: Uuid) -> ServiceResult<bool>;
}

pub type SharedPolicy = Arc<dyn Policy>;

pub async fn require_participant(
    policy: &dyn Policy,
    conversation_id: Uuid,
    profile_id: Uuid,
) -> ServiceResult<()> {
    if policy.is_participant(conversation_id, profile_id).await? {
        Ok(())
    } else {
        tracing::warn!(%conversation_id, %profile_id, "non-participant access refused");
        Err(ServiceError::Forbidden)
    }
}

pub async fn require_admin(policy: &dyn Policy, profile_id: Uuid) -> ServiceResult<()> {
    if policy.is_admin(profile_id).await? {
        Ok(())
    } else {
        tracing::warn!(%profile_id, "admin access refused");
        Err(ServiceError::Forbidden)
    }
}

/// Answers from the participant and profile tables.
pub struct DbPolicy {
    db_pool: SqlitePool,
}

impl DbPolicy {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    pub fn shared(db_pool: SqlitePool) -> SharedPolicy {
        Arc::new(Self::new(db_pool))
    }
}

#[async_trait]
impl Policy for DbPolicy {
    async fn is_participant(&self, conversation_id: Uuid, profile_id: Uuid) -> ServiceResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM conversation_participants WHERE conversation_id=? AND profile_id=?",
        )
        .bind(conversation_id)
        .bind(profile_id)
        .fetch_optional(&self.db_pool)
        .await?;
        Ok(row.is_some())
    }

    async fn is_admin(&self, profile_id: Uuid) -> ServiceResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM profiles WHERE id=? AND role='admin'")
            .bind(profile_id)
            .fetch_optional(&self.db_pool)
            .await?;
        Ok(row.is_some())
    }
}
