use axum::{debug_handler, extract::{Path, State}, response::{IntoResponse, Redirect, Response}, Form};
use serde::Deserialize;
use sqlx::SqlitePool;
use time::{format_description::well_known::Rfc3339, macros::format_description};
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    db::{millis_to_datetime, now_millis},
    error::{ServiceError, ServiceResult},
    feed::Feed,
    include_res,
    moderation::block,
    policy::{self, Policy, SharedPolicy},
    res::escape,
    session, AppResult,
};

use super::{resolve, ChatMessage};

#[derive(Deserialize)]
pub(crate) struct SendMessageForm {
    pub(crate) content: String,
}

/// Appends a message to a conversation and pushes it to live subscribers.
pub async fn send(
    db_pool: &SqlitePool,
    policy: &dyn Policy,
    feed: &Feed,
    conversation_id: Uuid,
    sender_id: Uuid,
    content: &str,
) -> ServiceResult<ChatMessage> {
    if content.trim().is_empty() {
        return Err(ServiceError::EmptyContent);
    }
    policy::require_participant(policy, conversation_id, sender_id).await?;

    for other in resolve::participants(db_pool, conversation_id).await? {
        if other != sender_id && block::is_blocked(db_pool, other, sender_id).await? {
            tracing::info!(%conversation_id, %sender_id, "message refused by block");
            return Err(ServiceError::Blocked);
        }
    }

    let id = Uuid::now_v7();
    let created_at = now_millis();
    let mut tx = db_pool.begin().await?;

    let seq = sqlx::query("INSERT INTO messages (id,conversation_id,sender_id,content,created_at) VALUES (?,?,?,?,?)")
        .bind(id)
        .bind(conversation_id)
        .bind(sender_id)
        .bind(content)
        .bind(created_at)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

    sqlx::query("UPDATE conversations SET updated_at=? WHERE id=?")
        .bind(created_at)
        .bind(conversation_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    let msg = ChatMessage {
        seq,
        id,
        conversation_id,
        sender_id,
        content: content.to_owned(),
        created_at,
    };
    tracing::debug!(%conversation_id, seq, "message stored");
    feed.publish(msg.clone());
    Ok(msg)
}

/// Messages of a conversation in creation order, optionally only those after `after_seq`.
pub async fn history(
    db_pool: &SqlitePool,
    conversation_id: Uuid,
    after_seq: Option<i64>,
) -> ServiceResult<Vec<ChatMessage>> {
    Ok(sqlx::query_as(
        "SELECT seq,id,conversation_id,sender_id,content,created_at FROM messages WHERE conversation_id=? AND seq>? ORDER BY created_at ASC, seq ASC",
    )
    .bind(conversation_id)
    .bind(after_seq.unwrap_or(0))
    .fetch_all(db_pool)
    .await?)
}

pub(crate) fn msg_to_html(msg: &ChatMessage, viewer: Uuid, other_name: &str) -> String {
    let created = millis_to_datetime(msg.created_at);
    let (class, author) = if msg.sender_id == viewer {
        ("mine", "You")
    } else {
        ("theirs", other_name)
    };

    include_res!(str, "/pages/conversations/message.html")
        .replace("{class}", class)
        .replace("{seq}", &msg.seq.to_string())
        .replace("{author}", &escape(author))
        .replace("{timestamp}", &created.format(&Rfc3339).unwrap_or_default())
        .replace(
            "{time}",
            &created
                .format(format_description!("[year]-[month]-[day] [hour]:[minute]"))
                .unwrap_or_default(),
        )
        .replace("{content}", &escape(&msg.content))
}

/// First contact from a profile page: find or create the thread, then send.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn contact(
    Path(target): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    State(policy): State<SharedPolicy>,
    State(feed): State<Feed>,
    session: Session,
    Form(SendMessageForm { content }): Form<SendMessageForm>,
) -> AppResult<Response> {
    let requester = session::require_profile(&session).await?;
    if content.trim().is_empty() {
        return Err(ServiceError::EmptyContent.into());
    }

    let conversation_id = resolve::resolve(&db_pool, requester, target).await?;
    send(&db_pool, policy.as_ref(), &feed, conversation_id, requester, &content).await?;

    Ok(Redirect::to(&format!("/messages/{conversation_id}")).into_response())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn post_message(
    Path(conversation_id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    State(policy): State<SharedPolicy>,
    State(feed): State<Feed>,
    session: Session,
    Form(SendMessageForm { content }): Form<SendMessageForm>,
) -> AppResult<Response> {
    let sender = session::require_profile(&session).await?;
    send(&db_pool, policy.as_ref(), &feed, conversation_id, sender, &content).await?;
    Ok(Redirect::to(&format!("/messages/{conversation_id}")).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::testing,
        feed::FeedEvent,
        policy::DbPolicy,
        profiles::Role,
    };

    struct Fixture {
        db_pool: SqlitePool,
        policy: DbPolicy,
        feed: Feed,
        a: Uuid,
        b: Uuid,
    }

    async fn fixture() -> Fixture {
        let db_pool = testing::pool().await;
        let a = testing::profile(&db_pool, "Asha Customer", Role::Customer).await;
        let b = testing::profile(&db_pool, "Bikash Realtor", Role::Realtor).await;
        Fixture {
            policy: DbPolicy::new(db_pool.clone()),
            feed: Feed::new(16),
            db_pool,
            a,
            b,
        }
    }

    #[tokio::test]
    async fn first_contact_then_follow_up() {
        let f = fixture().await;

        let conversation = resolve::resolve(&f.db_pool, f.a, f.b).await.unwrap();
        send(&f.db_pool, &f.policy, &f.feed, conversation, f.a, "Hello").await.unwrap();

        assert_eq!(testing::count(&f.db_pool, "conversations").await, 1);
        assert_eq!(testing::count(&f.db_pool, "conversation_participants").await, 2);
        let msgs = history(&f.db_pool, conversation, None).await.unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].content, "Hello");
        assert_eq!(msgs[0].sender_id, f.a);

        let again = resolve::resolve(&f.db_pool, f.a, f.b).await.unwrap();
        assert_eq!(again, conversation);
        send(&f.db_pool, &f.policy, &f.feed, again, f.a, "Still there?").await.unwrap();

        let msgs = history(&f.db_pool, conversation, None).await.unwrap();
        let contents: Vec<_> = msgs.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["Hello", "Still there?"]);
        assert!(msgs[0].seq < msgs[1].seq);
        assert!(msgs[0].created_at <= msgs[1].created_at);
    }

    #[tokio::test]
    async fn blank_content_is_rejected() {
        let f = fixture().await;
        let conversation = resolve::resolve(&f.db_pool, f.a, f.b).await.unwrap();

        for blank in ["", "   ", "\n\t "] {
            let err = send(&f.db_pool, &f.policy, &f.feed, conversation, f.a, blank).await.unwrap_err();
            assert!(matches!(err, ServiceError::EmptyContent));
        }
        assert_eq!(testing::count(&f.db_pool, "messages").await, 0);
    }

    #[tokio::test]
    async fn outsiders_cannot_post() {
        let f = fixture().await;
        let outsider = testing::profile(&f.db_pool, "Nosy", Role::Customer).await;
        let conversation = resolve::resolve(&f.db_pool, f.a, f.b).await.unwrap();

        let err = send(&f.db_pool, &f.policy, &f.feed, conversation, outsider, "hi").await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden));
        assert_eq!(testing::count(&f.db_pool, "messages").await, 0);
    }

    #[tokio::test]
    async fn blocked_sender_cannot_post_in_existing_thread() {
        let f = fixture().await;
        let conversation = resolve::resolve(&f.db_pool, f.a, f.b).await.unwrap();
        send(&f.db_pool, &f.policy, &f.feed, conversation, f.a, "Hello").await.unwrap();

        block::set_block(&f.db_pool, f.b, f.a, true).await.unwrap();

        let err = send(&f.db_pool, &f.policy, &f.feed, conversation, f.a, "Hello?").await.unwrap_err();
        assert!(matches!(err, ServiceError::Blocked));
        // earlier messages stay, and the blocker can still write
        assert_eq!(history(&f.db_pool, conversation, None).await.unwrap().len(), 1);
        send(&f.db_pool, &f.policy, &f.feed, conversation, f.b, "Please stop").await.unwrap();
    }

    #[tokio::test]
    async fn sent_messages_reach_subscribers_and_catch_up() {
        let f = fixture().await;
        let conversation = resolve::resolve(&f.db_pool, f.a, f.b).await.unwrap();
        let first = send(&f.db_pool, &f.policy, &f.feed, conversation, f.a, "one").await.unwrap();

        let mut sub = f.feed.subscribe(conversation);
        send(&f.db_pool, &f.policy, &f.feed, conversation, f.b, "two").await.unwrap();

        match sub.next().await {
            FeedEvent::Message(msg) => assert_eq!(msg.content, "two"),
            _ => panic!("expected live message"),
        }

        // a client that last saw `first` re-reads only what came after
        let missed = history(&f.db_pool, conversation, Some(first.seq)).await.unwrap();
        assert_eq!(missed.len(), 1);
        assert_eq!(missed[0].content, "two");
    }

    #[test]
    fn html_escapes_content() {
        let viewer = Uuid::now_v7();
        let msg = ChatMessage {
            seq: 1,
            id: Uuid::now_v7(),
            conversation_id: Uuid::now_v7(),
            sender_id: Uuid::now_v7(),
            content: "<img src=x onerror=alert(1)>".into(),
            created_at: 0,
        };
        let html = msg_to_html(&msg, viewer, "Ram");
        assert!(html.contains("&lt;img"));
        assert!(html.contains("Ram"));
        assert!(html.contains("theirs"));
    }
}
