use axum::{debug_handler, extract::{Path, State}, response::{IntoResponse, Redirect, Response}, Form};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{db::now_millis, error::{ServiceError, ServiceResult}, profiles, session, AppResult};

/// Sets whether `blocker` blocks `blocked`. Both directions of the toggle are idempotent.
pub async fn set_block(db_pool: &SqlitePool, blocker: Uuid, blocked: Uuid, desired: bool) -> ServiceResult<()> {
    if blocker == blocked {
        return Err(ServiceError::SelfBlock);
    }

    if desired {
        if !profiles::exists(db_pool, blocked).await? {
            return Err(ServiceError::NotFound("Profile"));
        }
        let result = sqlx::query("INSERT OR IGNORE INTO blocks (blocker_id,blocked_id,created_at) VALUES (?,?,?)")
            .bind(blocker)
            .bind(blocked)
            .bind(now_millis())
            .execute(db_pool)
            .await?;
        if result.rows_affected() > 0 {
            tracing::info!(%blocker, %blocked, "blocked");
        }
    } else {
        let result = sqlx::query("DELETE FROM blocks WHERE blocker_id=? AND blocked_id=?")
            .bind(blocker)
            .bind(blocked)
            .execute(db_pool)
            .await?;
        if result.rows_affected() > 0 {
            tracing::info!(%blocker, %blocked, "unblocked");
        }
    }

    Ok(())
}

pub async fn is_blocked(db_pool: &SqlitePool, blocker: Uuid, blocked: Uuid) -> ServiceResult<bool> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM blocks WHERE blocker_id=? AND blocked_id=?")
        .bind(blocker)
        .bind(blocked)
        .fetch_optional(db_pool)
        .await?;
    Ok(row.is_some())
}

#[derive(Deserialize)]
pub(crate) struct BlockForm {
    block: bool,
}

#[debug_handler]
pub(crate) async fn toggle_block(
    Path(target): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    session: Session,
    Form(BlockForm { block }): Form<BlockForm>,
) -> AppResult<Response> {
    let viewer = session::require_profile(&session).await?;
    set_block(&db_pool, viewer, target, block).await?;

    let back = match profiles::get(&db_pool, target).await?.and_then(|p| p.slug) {
        Some(slug) => format!("/pro/{slug}"),
        None => "/messages".to_owned(),
    };
    Ok(Redirect::to(&back).into_response())
}
