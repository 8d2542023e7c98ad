mod list;
pub mod msg;
mod resolve;
mod thread;
mod ws;

use axum::{routing::{get, post}, Router};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use crate::AppState;

pub use list::{summaries, ConversationSummary};
pub use msg::{history, send};
pub use resolve::{pair_key, participants, resolve};

/// A stored message. `seq` is the store's insertion counter and breaks
/// ties between messages created in the same millisecond.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ChatMessage {
    pub seq: i64,
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: i64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profiles/{id}/message", post(msg::contact))
        .route("/messages", get(list::conversations))
        .route("/messages/{id}", get(thread::thread).post(msg::post_message))
        .route("/messages/{id}/ws", get(ws::conversation_ws))
}
