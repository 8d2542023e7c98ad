use sqlx::{SqlitePool, migrate::MigrateError, sqlite::SqlitePoolOptions};
use time::OffsetDateTime;

use crate::config::Config;

pub async fn connect(config: &Config) -> anyhow::Result<SqlitePool> {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;

    migrate(&db_pool).await?;
    Ok(db_pool)
}

/// Applies the embedded `migrations/` directory. Already applied versions are skipped.
pub async fn migrate(db_pool: &SqlitePool) -> Result<(), MigrateError> {
    sqlx::migrate!().run(db_pool).await?;
    tracing::debug!("schema up to date");
    Ok(())
}

pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn millis_to_datetime(millis: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

#[cfg(test)]
pub(crate) mod testing {
    use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
    use uuid::Uuid;

    use crate::profiles::Role;

    pub(crate) async fn pool() -> SqlitePool {
        // one connection, otherwise every connection gets its own in-memory database
        let db_pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        super::migrate(&db_pool).await.expect("migrations");
        db_pool
    }

    pub(crate) async fn profile(db_pool: &SqlitePool, name: &str, role: Role) -> Uuid {
        let id = Uuid::now_v7();
        let slug = crate::profiles::slugify(name);
        sqlx::query(
            "INSERT INTO profiles (id,auth_id,email,slug,full_name,role,is_verified,created_at,updated_at) VALUES (?,?,?,?,?,?,0,0,0)",
        )
        .bind(id)
        .bind(format!("auth-{slug}"))
        .bind(format!("{slug}@example.com"))
        .bind(&slug)
        .bind(name)
        .bind(role.as_str())
        .execute(db_pool)
        .await
        .expect("insert profile");
        id
    }

    pub(crate) async fn count(db_pool: &SqlitePool, table: &str) -> i64 {
        let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(db_pool)
            .await
            .expect("count");
        n
    }
}
