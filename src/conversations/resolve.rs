use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    db::now_millis,
    error::{ServiceError, ServiceResult},
    moderation::block,
    profiles,
};

/// Identity of the two-party conversation between `a` and `b`, independent of order.
pub fn pair_key(a: Uuid, b: Uuid) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}:{hi}")
}

/// Finds or creates the conversation between `requester` and `target`.
///
/// Creation of the conversation and both participant rows happens in one
/// transaction, keyed on the unique pair key, so concurrent first contacts
/// converge on a single conversation.
pub async fn resolve(db_pool: &SqlitePool, requester: Uuid, target: Uuid) -> ServiceResult<Uuid> {
    if requester == target {
        return Err(ServiceError::SelfTarget);
    }
    if !profiles::exists(db_pool, target).await? {
        return Err(ServiceError::NotFound("Profile"));
    }
    if block::is_blocked(db_pool, target, requester).await? {
        tracing::info!(%requester, %target, "contact refused by block");
        return Err(ServiceError::Blocked);
    }

    let key = pair_key(requester, target);
    let now = now_millis();
    let mut tx = db_pool.begin().await?;

    let created = sqlx::query(
        "INSERT INTO conversations (id,pair_key,created_at,updated_at) VALUES (?,?,?,?) ON CONFLICT(pair_key) DO NOTHING",
    )
    .bind(Uuid::now_v7())
    .bind(&key)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .rows_affected()
        == 1;

    let (conversation_id,): (Uuid,) = sqlx::query_as("SELECT id FROM conversations WHERE pair_key=?")
        .bind(&key)
        .fetch_one(&mut *tx)
        .await?;

    if created {
        sqlx::query("INSERT INTO conversation_participants (conversation_id,profile_id) VALUES (?,?),(?,?)")
            .bind(conversation_id)
            .bind(requester)
            .bind(conversation_id)
            .bind(target)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    if created {
        tracing::info!(%conversation_id, %requester, %target, "conversation created");
    }
    Ok(conversation_id)
}

/// Both participants of a conversation, in no particular order.
pub async fn participants(db_pool: &SqlitePool, conversation_id: Uuid) -> ServiceResult<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as("SELECT profile_id FROM conversation_participants WHERE conversation_id=?")
        .bind(conversation_id)
        .fetch_all(db_pool)
        .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::testing, profiles::Role};

    #[test]
    fn pair_key_ignores_order() {
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        assert_eq!(pair_key(a, b), pair_key(b, a));
        assert_ne!(pair_key(a, b), pair_key(a, Uuid::now_v7()));
    }

    #[tokio::test]
    async fn discovery_is_symmetric() {
        let db_pool = testing::pool().await;
        let a = testing::profile(&db_pool, "Customer A", Role::Customer).await;
        let b = testing::profile(&db_pool, "Realtor B", Role::Realtor).await;

        let first = resolve(&db_pool, a, b).await.unwrap();
        let second = resolve(&db_pool, b, a).await.unwrap();
        assert_eq!(first, second);

        assert_eq!(testing::count(&db_pool, "conversations").await, 1);
        let mut members = participants(&db_pool, first).await.unwrap();
        members.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(members, expected);
    }

    #[tokio::test]
    async fn concurrent_first_contact_yields_one_conversation() {
        let db_pool = testing::pool().await;
        let a = testing::profile(&db_pool, "A", Role::Customer).await;
        let b = testing::profile(&db_pool, "B", Role::Inspector).await;

        let (x, y) = tokio::join!(resolve(&db_pool, a, b), resolve(&db_pool, b, a));
        assert_eq!(x.unwrap(), y.unwrap());
        assert_eq!(testing::count(&db_pool, "conversations").await, 1);
        assert_eq!(testing::count(&db_pool, "conversation_participants").await, 2);
    }

    #[tokio::test]
    async fn self_target_writes_nothing() {
        let db_pool = testing::pool().await;
        let a = testing::profile(&db_pool, "A", Role::Realtor).await;

        assert!(matches!(resolve(&db_pool, a, a).await, Err(ServiceError::SelfTarget)));
        assert_eq!(testing::count(&db_pool, "conversations").await, 0);
    }

    #[tokio::test]
    async fn block_is_directional() {
        let db_pool = testing::pool().await;
        let a = testing::profile(&db_pool, "A", Role::Customer).await;
        let b = testing::profile(&db_pool, "B", Role::Realtor).await;
        block::set_block(&db_pool, b, a, true).await.unwrap();

        assert!(matches!(resolve(&db_pool, a, b).await, Err(ServiceError::Blocked)));
        assert_eq!(testing::count(&db_pool, "conversations").await, 0);

        // the blocker can still reach out
        assert!(resolve(&db_pool, b, a).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_target_is_not_found() {
        let db_pool = testing::pool().await;
        let a = testing::profile(&db_pool, "A", Role::Customer).await;

        assert!(matches!(
            resolve(&db_pool, a, Uuid::now_v7()).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
