use axum::{debug_handler, extract::{Path, State}, response::{Html, IntoResponse, Redirect, Response}};
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    include_res,
    policy::SharedPolicy,
    profiles,
    res::{self, escape},
    session, AppResult,
};

use super::{msg, resolve};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn thread(
    Path(conversation_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    State(policy): State<SharedPolicy>,
    session: Session,
) -> AppResult<Response> {
    let Some(viewer) = session::current_profile(&session).await? else {
        return Ok(Redirect::to(&format!("/login?return_url=/messages/{conversation_id}")).into_response());
    };
    if !policy.is_participant(conversation_id, viewer).await? {
        return res::sorry("conversation");
    }

    let other_id = resolve::participants(&db_pool, conversation_id)
        .await?
        .into_iter()
        .find(|id| *id != viewer);
    let other = match other_id {
        Some(id) => profiles::get(&db_pool, id).await?,
        None => None,
    };
    let other_name = other.as_ref().map(|p| p.display_name()).unwrap_or("Unknown");

    let history = msg::history(&db_pool, conversation_id, None).await?;
    let last_seq = history.iter().map(|m| m.seq).max().unwrap_or(0);
    let messages: String = history
        .iter()
        .map(|m| msg::msg_to_html(m, viewer, other_name))
        .collect();

    let body = include_res!(str, "/pages/conversations/thread.html")
        .replace("{conversation_id}", &conversation_id.to_string())
        .replace("{viewer_id}", &viewer.to_string())
        .replace("{other_id}", &other_id.map(|id| id.to_string()).unwrap_or_default())
        .replace("{other_name}", &escape(other_name))
        .replace("{last_seq}", &last_seq.to_string())
        .replace(
            "{empty}",
            if history.is_empty() { r#"<p class="empty">No messages yet. Say hello!</p>"# } else { "" },
        )
        .replace("{messages}", &messages);

    Ok(Html(res::page(&format!("Chat with {other_name}"), &body)).into_response())
}
