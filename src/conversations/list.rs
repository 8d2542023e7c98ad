use axum::{debug_handler, extract::State, response::{Html, IntoResponse, Redirect, Response}};
use sqlx::{FromRow, SqlitePool};
use tower_sessions::Session;
use uuid::Uuid;

use crate::{error::ServiceResult, include_res, res::{self, escape}, session, AppResult};

#[derive(Debug, Clone, FromRow)]
pub struct ConversationSummary {
    pub conversation_id: Uuid,
    pub updated_at: i64,
    pub other_id: Uuid,
    pub other_name: Option<String>,
    pub other_slug: Option<String>,
    pub last_message: Option<String>,
}

/// The viewer's conversations, most recently active first.
pub async fn summaries(db_pool: &SqlitePool, profile_id: Uuid) -> ServiceResult<Vec<ConversationSummary>> {
    Ok(sqlx::query_as(
        r#"
        SELECT c.id AS conversation_id, c.updated_at,
               p.id AS other_id, p.full_name AS other_name, p.slug AS other_slug,
               (SELECT m.content FROM messages m
                 WHERE m.conversation_id = c.id
                 ORDER BY m.created_at DESC, m.seq DESC LIMIT 1) AS last_message
        FROM conversation_participants me
        JOIN conversations c ON c.id = me.conversation_id
        JOIN conversation_participants other
          ON other.conversation_id = c.id AND other.profile_id <> me.profile_id
        JOIN profiles p ON p.id = other.profile_id
        WHERE me.profile_id = ?
        ORDER BY c.updated_at DESC
        "#,
    )
    .bind(profile_id)
    .fetch_all(db_pool)
    .await?)
}

fn preview(text: &str) -> String {
    const MAX: usize = 80;
    if text.chars().count() <= MAX {
        text.to_owned()
    } else {
        let cut: String = text.chars().take(MAX).collect();
        format!("{cut}…")
    }
}

#[debug_handler]
pub(crate) async fn conversations(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Response> {
    let Some(profile_id) = session::current_profile(&session).await? else {
        return Ok(Redirect::to("/login?return_url=/messages").into_response());
    };

    let mut items = String::new();
    for summary in summaries(&db_pool, profile_id).await? {
        items += &include_res!(str, "/pages/conversations/list_item.html")
            .replace("{id}", &summary.conversation_id.to_string())
            .replace("{name}", &escape(summary.other_name.as_deref().unwrap_or("Unnamed")))
            .replace("{preview}", &escape(&preview(summary.last_message.as_deref().unwrap_or("No messages yet."))));
    }
    if items.is_empty() {
        items = "<li>No conversations yet. Find a professional in the <a href=\"/directory\">directory</a>.</li>".to_owned();
    }

    let body = include_res!(str, "/pages/conversations/list.html").replace("{items}", &items);
    Ok(Html(res::page("Messages", &body)).into_response())
}
