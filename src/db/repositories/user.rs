//! User repository
//!
//! Reads user rows and registers new ones. The derived counters on `users`
//! (`avg_score`, `follower_count`, `following_count`) are written by the
//! follow and interaction repositories, never here.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{CreateUserInput, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

use super::{placeholders, IN_CHUNK};

const USER_COLUMNS: &str = "id, email, full_name, title, institution, profile_image_url, \
     is_verified, avg_score, follower_count, following_count, created_at, updated_at";

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, input: &CreateUserInput) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Users for the given ids, in no particular order; unknown ids are skipped
    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<User>>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, input: &CreateUserInput) -> Result<User> {
        let id = match self.pool.backend() {
            Backend::Sqlite(pool) => create_user_sqlite(pool, input).await?,
            Backend::Mysql(pool) => create_user_mysql(pool, input).await?,
        };
        self.get_by_id(id)
            .await?
            .context("Created user could not be read back")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => get_user_by_id_sqlite(pool, id).await,
            Backend::Mysql(pool) => get_user_by_id_mysql(pool, id).await,
        }
    }

    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<User>> {
        let mut users = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(IN_CHUNK) {
            let batch = match self.pool.backend() {
                Backend::Sqlite(pool) => get_users_by_ids_sqlite(pool, chunk).await?,
                Backend::Mysql(pool) => get_users_by_ids_mysql(pool, chunk).await?,
            };
            users.extend(batch);
        }
        Ok(users)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, input: &CreateUserInput) -> Result<i64> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO users (email, full_name, title, institution, profile_image_url,
                           is_verified, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&input.email)
    .bind(&input.full_name)
    .bind(&input.title)
    .bind(&input.institution)
    .bind(&input.profile_image_url)
    .bind(input.is_verified)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(result.last_insert_rowid())
}

async fn get_user_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    Ok(row.as_ref().map(row_to_user_sqlite))
}

async fn get_users_by_ids_sqlite(pool: &SqlitePool, ids: &[i64]) -> Result<Vec<User>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {} FROM users WHERE id IN ({})",
        USER_COLUMNS,
        placeholders(ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(*id);
    }
    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to get users by IDs")?;

    Ok(rows.iter().map(row_to_user_sqlite).collect())
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        full_name: row.get("full_name"),
        title: row.get("title"),
        institution: row.get("institution"),
        profile_image_url: row.get("profile_image_url"),
        is_verified: row.get("is_verified"),
        avg_score: row.get("avg_score"),
        follower_count: row.get("follower_count"),
        following_count: row.get("following_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, input: &CreateUserInput) -> Result<i64> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO users (email, full_name, title, institution, profile_image_url,
                           is_verified, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&input.email)
    .bind(&input.full_name)
    .bind(&input.title)
    .bind(&input.institution)
    .bind(&input.profile_image_url)
    .bind(input.is_verified)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(result.last_insert_id() as i64)
}

async fn get_user_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    Ok(row.as_ref().map(row_to_user_mysql))
}

async fn get_users_by_ids_mysql(pool: &MySqlPool, ids: &[i64]) -> Result<Vec<User>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT {} FROM users WHERE id IN ({})",
        USER_COLUMNS,
        placeholders(ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(*id);
    }
    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to get users by IDs")?;

    Ok(rows.iter().map(row_to_user_mysql).collect())
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        full_name: row.get("full_name"),
        title: row.get("title"),
        institution: row.get("institution"),
        profile_image_url: row.get("profile_image_url"),
        is_verified: row.get("is_verified"),
        avg_score: row.get("avg_score"),
        follower_count: row.get("follower_count"),
        following_count: row.get("following_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::migrated_pool;

    #[tokio::test]
    async fn test_create_and_get_user() {
        let pool = migrated_pool().await;
        let repo = SqlxUserRepository::new(pool);

        let created = repo
            .create(&CreateUserInput::new("grace@example.org", "Grace Hopper").with_profile_image("/g.png"))
            .await
            .expect("Failed to create user");

        assert!(created.id > 0);
        assert_eq!(created.full_name, "Grace Hopper");
        assert_eq!(created.follower_count, 0);
        assert_eq!(created.avg_score, 0.0);

        let fetched = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.profile_image_url.as_deref(), Some("/g.png"));
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let pool = migrated_pool().await;
        let repo = SqlxUserRepository::new(pool);

        repo.create(&CreateUserInput::new("dup@example.org", "One"))
            .await
            .unwrap();
        assert!(repo
            .create(&CreateUserInput::new("dup@example.org", "Two"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_get_by_ids_skips_unknown() {
        let pool = migrated_pool().await;
        let repo = SqlxUserRepository::new(pool);

        let a = repo.create(&CreateUserInput::new("a@example.org", "A")).await.unwrap();
        let b = repo.create(&CreateUserInput::new("b@example.org", "B")).await.unwrap();

        let mut ids: Vec<i64> = repo
            .get_by_ids(&[a.id, b.id, 999])
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec![a.id, b.id]);
        assert!(repo.get_by_ids(&[]).await.unwrap().is_empty());
    }
}
