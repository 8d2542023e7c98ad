//! Live conversation socket.
//!
//! Frames to the client are JSON `{"type":"message", ...}` or
//! `{"type":"error","message":...}`. Frames from the client are
//! `{"content": "..."}` and are sent as the socket's profile.
//!
//! A client passes `?after=<seq>` with the last message it holds. The server
//! subscribes before reading history, replays everything after that point,
//! then forwards live messages, dropping anything it already delivered.

use axum::{
    debug_handler,
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    error::ServiceResult,
    feed::{Feed, FeedEvent, Subscription},
    policy::{self, SharedPolicy},
    session, AppResult,
};

use super::{msg, ChatMessage};

#[derive(Deserialize)]
pub(crate) struct WsQuery {
    after: Option<i64>,
}

#[derive(Deserialize)]
struct Inbound {
    content: String,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Outbound<'a> {
    Message(&'a ChatMessage),
    Error { message: String },
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn conversation_ws(
    Path(conversation_id): Path<Uuid>,
    Query(WsQuery { after }): Query<WsQuery>,
    State(db_pool): State<SqlitePool>,
    State(policy): State<SharedPolicy>,
    State(feed): State<Feed>,
    session: Session,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let profile_id = session::require_profile(&session).await?;
    policy::require_participant(policy.as_ref(), conversation_id, profile_id).await?;

    let subscription = feed.subscribe(conversation_id);
    Ok(ws
        .on_upgrade(move |socket| {
            run(socket, subscription, db_pool, policy, feed, profile_id, after.unwrap_or(0))
        })
        .into_response())
}

async fn run(
    socket: WebSocket,
    subscription: Subscription,
    db_pool: SqlitePool,
    policy: SharedPolicy,
    feed: Feed,
    profile_id: Uuid,
    after: i64,
) {
    let conversation_id = subscription.conversation_id();
    let (sender, mut receiver) = socket.split();
    let (notice_tx, notice_rx) = mpsc::channel::<String>(8);

    tracing::debug!(%conversation_id, %profile_id, after, "socket opened");

    let mut forward_task = tokio::spawn(forward(sender, subscription, notice_rx, db_pool.clone(), after));

    let mut receive_task = tokio::spawn(async move {
        while let Some(Ok(frame)) = receiver.next().await {
            let text = match frame {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            let Ok(Inbound { content }) = serde_json::from_str(text.as_str()) else {
                continue;
            };

            if let Err(e) = msg::send(&db_pool, policy.as_ref(), &feed, conversation_id, profile_id, &content).await {
                if notice_tx.send(e.to_string()).await.is_err() {
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut forward_task => receive_task.abort(),
        _ = &mut receive_task => forward_task.abort(),
    };

    tracing::debug!(%conversation_id, %profile_id, "socket closed");
}

type Sink = SplitSink<WebSocket, Message>;

async fn push(sender: &mut Sink, frame: &Outbound<'_>) -> Result<(), axum::Error> {
    let json = serde_json::to_string(frame).map_err(axum::Error::new)?;
    sender.send(Message::Text(json.into())).await
}

/// What one socket has delivered so far.
///
/// Feed events are hints only: stored history after `last_seq` is what gets
/// sent. Writers commit in `seq` order, so when a message above `last_seq`
/// is announced every lower `seq` is already readable, even if its own
/// announcement arrives later.
pub(crate) struct Cursor {
    conversation_id: Uuid,
    last_seq: i64,
}

impl Cursor {
    pub(crate) fn new(conversation_id: Uuid, after: i64) -> Self {
        Self { conversation_id, last_seq: after }
    }

    pub(crate) fn last_seq(&self) -> i64 {
        self.last_seq
    }

    /// Stored messages not yet delivered, oldest first.
    pub(crate) async fn catch_up(&mut self, db_pool: &SqlitePool) -> ServiceResult<Vec<ChatMessage>> {
        let missed = msg::history(db_pool, self.conversation_id, Some(self.last_seq)).await?;
        if let Some(max) = missed.iter().map(|m| m.seq).max() {
            self.last_seq = max;
        }
        Ok(missed)
    }

    /// Messages to send for one feed event, or `None` once the feed is closed.
    pub(crate) async fn on_event(
        &mut self,
        db_pool: &SqlitePool,
        event: FeedEvent,
    ) -> ServiceResult<Option<Vec<ChatMessage>>> {
        match event {
            FeedEvent::Message(m) if m.seq <= self.last_seq => Ok(Some(Vec::new())),
            FeedEvent::Message(_) | FeedEvent::Lagged => self.catch_up(db_pool).await.map(Some),
            FeedEvent::Closed => Ok(None),
        }
    }
}

async fn forward(
    mut sender: Sink,
    mut subscription: Subscription,
    mut notices: mpsc::Receiver<String>,
    db_pool: SqlitePool,
    after: i64,
) -> Result<(), axum::Error> {
    let mut cursor = Cursor::new(subscription.conversation_id(), after);
    for m in cursor.catch_up(&db_pool).await.map_err(axum::Error::new)? {
        push(&mut sender, &Outbound::Message(&m)).await?;
    }

    loop {
        tokio::select! {
            event = subscription.next() => {
                let Some(batch) = cursor.on_event(&db_pool, event).await.map_err(axum::Error::new)? else {
                    return Ok(());
                };
                for m in &batch {
                    push(&mut sender, &Outbound::Message(m)).await?;
                }
            }
            Some(message) = notices.recv() => {
                push(&mut sender, &Outbound::Error { message }).await?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        conversations::resolve,
        db::testing,
        policy::DbPolicy,
        profiles::Role,
    };

    struct Fixture {
        db_pool: SqlitePool,
        policy: DbPolicy,
        feed: Feed,
        conversation_id: Uuid,
        a: Uuid,
        b: Uuid,
    }

    async fn fixture() -> Fixture {
        let db_pool = testing::pool().await;
        let a = testing::profile(&db_pool, "Anita Buyer", Role::Customer).await;
        let b = testing::profile(&db_pool, "Binod Lender", Role::LoanOfficer).await;
        let conversation_id = resolve::resolve(&db_pool, a, b).await.unwrap();
        Fixture {
            policy: DbPolicy::new(db_pool.clone()),
            feed: Feed::new(16),
            db_pool,
            conversation_id,
            a,
            b,
        }
    }

    impl Fixture {
        async fn send(&self, sender: Uuid, content: &str) -> ChatMessage {
            msg::send(&self.db_pool, &self.policy, &self.feed, self.conversation_id, sender, content)
                .await
                .unwrap()
        }
    }

    fn contents(batch: &[ChatMessage]) -> Vec<&str> {
        batch.iter().map(|m| m.content.as_str()).collect()
    }

    #[tokio::test]
    async fn reconnect_replays_only_what_came_after() {
        let f = fixture().await;
        let first = f.send(f.a, "one").await;
        f.send(f.b, "two").await;
        f.send(f.a, "three").await;

        let mut cursor = Cursor::new(f.conversation_id, first.seq);
        assert_eq!(contents(&cursor.catch_up(&f.db_pool).await.unwrap()), ["two", "three"]);
        assert!(cursor.catch_up(&f.db_pool).await.unwrap().is_empty());

        let mut fresh = Cursor::new(f.conversation_id, 0);
        assert_eq!(fresh.catch_up(&f.db_pool).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn live_message_after_replay_is_not_repeated() {
        let f = fixture().await;
        let mut sub = f.feed.subscribe(f.conversation_id);
        f.send(f.a, "hello").await;

        // the replay already picked up "hello" before its announcement is read
        let mut cursor = Cursor::new(f.conversation_id, 0);
        assert_eq!(contents(&cursor.catch_up(&f.db_pool).await.unwrap()), ["hello"]);

        let event = sub.next().await;
        assert!(cursor.on_event(&f.db_pool, event).await.unwrap().unwrap().is_empty());

        f.send(f.b, "hi back").await;
        let event = sub.next().await;
        let batch = cursor.on_event(&f.db_pool, event).await.unwrap().unwrap();
        assert_eq!(contents(&batch), ["hi back"]);
    }

    #[tokio::test]
    async fn announcements_out_of_order_lose_nothing() {
        let f = fixture().await;
        let mut cursor = Cursor::new(f.conversation_id, 0);
        let earlier = f.send(f.a, "earlier").await;
        let later = f.send(f.b, "later").await;

        // concurrent writers may announce in the opposite order they committed
        let feed = Feed::new(8);
        let mut sub = feed.subscribe(f.conversation_id);
        feed.publish(later.clone());
        feed.publish(earlier.clone());

        let mut delivered = Vec::new();
        for _ in 0..2 {
            let event = sub.next().await;
            delivered.extend(cursor.on_event(&f.db_pool, event).await.unwrap().unwrap());
        }
        let seqs: Vec<i64> = delivered.iter().map(|m| m.seq).collect();
        assert_eq!(seqs, [earlier.seq, later.seq]);
        assert_eq!(cursor.last_seq(), later.seq);
    }

    #[tokio::test]
    async fn lag_rereads_history() {
        let f = fixture().await;
        let mut cursor = Cursor::new(f.conversation_id, 0);
        f.send(f.a, "missed one").await;
        f.send(f.b, "missed two").await;

        let batch = cursor.on_event(&f.db_pool, FeedEvent::Lagged).await.unwrap().unwrap();
        assert_eq!(contents(&batch), ["missed one", "missed two"]);
        assert!(cursor.on_event(&f.db_pool, FeedEvent::Lagged).await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn closed_feed_ends_delivery() {
        let f = fixture().await;
        let mut cursor = Cursor::new(f.conversation_id, 0);
        assert!(cursor.on_event(&f.db_pool, FeedEvent::Closed).await.unwrap().is_none());

        let stale = Arc::new(f.send(f.a, "x").await);
        cursor.catch_up(&f.db_pool).await.unwrap();
        assert!(cursor.on_event(&f.db_pool, FeedEvent::Message(stale)).await.unwrap().unwrap().is_empty());
    }

    #[test]
    fn outbound_frames_are_tagged() {
        let msg = ChatMessage {
            seq: 3,
            id: Uuid::nil(),
            conversation_id: Uuid::nil(),
            sender_id: Uuid::nil(),
            content: "Namaste".into(),
            created_at: 42,
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&Outbound::Message(&msg)).unwrap()).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["seq"], 3);
        assert_eq!(json["content"], "Namaste");

        let json: serde_json::Value = serde_json::from_str(
            &serde_json::to_string(&Outbound::Error { message: "nope".into() }).unwrap(),
        )
        .unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "nope");
    }
}
