//! Follow repository
//!
//! Directed follow edges plus the `follower_count` / `following_count`
//! columns on both endpoints.

use crate::db::{begin_write_sqlite, is_unique_violation, Backend, DynDatabasePool};
use crate::models::FollowState;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlConnection, MySqlPool, SqliteConnection, SqlitePool};
use std::sync::Arc;

use super::WriteOutcome;

/// Follow repository trait
#[async_trait]
pub trait FollowRepository: Send + Sync {
    /// `NotFound` when either user is missing, `Conflict` when the edge exists
    async fn follow(&self, follower_id: i64, followee_id: i64) -> Result<WriteOutcome<FollowState>>;

    /// `NotFound` when there is no such edge
    async fn unfollow(&self, follower_id: i64, followee_id: i64) -> Result<WriteOutcome<FollowState>>;

    async fn is_following(&self, follower_id: i64, followee_id: i64) -> Result<bool>;

    /// Users `user_id` follows, most recent edge first
    async fn following_ids(&self, user_id: i64) -> Result<Vec<i64>>;

    /// Users following `user_id`, most recent edge first
    async fn follower_ids(&self, user_id: i64) -> Result<Vec<i64>>;
}

/// SQLx-based follow repository implementation
pub struct SqlxFollowRepository {
    pool: DynDatabasePool,
}

impl SqlxFollowRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn FollowRepository> {
        Arc::new(Self::new(pool))
    }

    async fn edge_ids(&self, sql: &str, user_id: i64) -> Result<Vec<i64>> {
        let ids = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query_scalar(sql).bind(user_id).fetch_all(pool).await,
            Backend::Mysql(pool) => sqlx::query_scalar(sql).bind(user_id).fetch_all(pool).await,
        };
        ids.context("Failed to list follow edges")
    }
}

#[async_trait]
impl FollowRepository for SqlxFollowRepository {
    async fn follow(&self, follower_id: i64, followee_id: i64) -> Result<WriteOutcome<FollowState>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => follow_sqlite(pool, follower_id, followee_id).await,
            Backend::Mysql(pool) => follow_mysql(pool, follower_id, followee_id).await,
        }
    }

    async fn unfollow(&self, follower_id: i64, followee_id: i64) -> Result<WriteOutcome<FollowState>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => unfollow_sqlite(pool, follower_id, followee_id).await,
            Backend::Mysql(pool) => unfollow_mysql(pool, follower_id, followee_id).await,
        }
    }

    async fn is_following(&self, follower_id: i64, followee_id: i64) -> Result<bool> {
        let sql = "SELECT COUNT(*) FROM follows WHERE follower_id = ? AND followee_id = ?";
        let count: i64 = match self.pool.backend() {
            Backend::Sqlite(pool) => {
                sqlx::query_scalar(sql)
                    .bind(follower_id)
                    .bind(followee_id)
                    .fetch_one(pool)
                    .await
            }
            Backend::Mysql(pool) => {
                sqlx::query_scalar(sql)
                    .bind(follower_id)
                    .bind(followee_id)
                    .fetch_one(pool)
                    .await
            }
        }
        .context("Failed to check follow edge")?;
        Ok(count > 0)
    }

    async fn following_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        self.edge_ids(
            "SELECT followee_id FROM follows WHERE follower_id = ? \
             ORDER BY created_at DESC, followee_id DESC",
            user_id,
        )
        .await
    }

    async fn follower_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        self.edge_ids(
            "SELECT follower_id FROM follows WHERE followee_id = ? \
             ORDER BY created_at DESC, follower_id DESC",
            user_id,
        )
        .await
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn users_exist_sqlite(conn: &mut SqliteConnection, a: i64, b: i64) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id IN (?, ?)")
        .bind(a)
        .bind(b)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to check users")?;
    Ok(count == 2)
}

async fn follow_state_sqlite(
    conn: &mut SqliteConnection,
    follower_id: i64,
    followee_id: i64,
    following: bool,
) -> Result<FollowState> {
    let follower_count: i64 = sqlx::query_scalar("SELECT follower_count FROM users WHERE id = ?")
        .bind(followee_id)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to read follower count")?;
    let following_count: i64 = sqlx::query_scalar("SELECT following_count FROM users WHERE id = ?")
        .bind(follower_id)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to read following count")?;

    Ok(FollowState {
        following,
        follower_count,
        following_count,
    })
}

async fn follow_sqlite(
    pool: &SqlitePool,
    follower_id: i64,
    followee_id: i64,
) -> Result<WriteOutcome<FollowState>> {
    let mut tx = begin_write_sqlite(pool).await?;

    if !users_exist_sqlite(&mut tx, follower_id, followee_id).await? {
        return Ok(WriteOutcome::NotFound);
    }

    let inserted = sqlx::query("INSERT INTO follows (follower_id, followee_id, created_at) VALUES (?, ?, ?)")
        .bind(follower_id)
        .bind(followee_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await;
    match inserted {
        Ok(_) => {}
        Err(err) if is_unique_violation(&err) => return Ok(WriteOutcome::Conflict),
        Err(err) => return Err(err).context("Failed to create follow"),
    }

    sqlx::query("UPDATE users SET follower_count = follower_count + 1 WHERE id = ?")
        .bind(followee_id)
        .execute(&mut *tx)
        .await
        .context("Failed to increment follower count")?;
    sqlx::query("UPDATE users SET following_count = following_count + 1 WHERE id = ?")
        .bind(follower_id)
        .execute(&mut *tx)
        .await
        .context("Failed to increment following count")?;

    let state = follow_state_sqlite(&mut tx, follower_id, followee_id, true).await?;
    tx.commit().await.context("Failed to commit follow")?;
    Ok(WriteOutcome::Applied(state))
}

async fn unfollow_sqlite(
    pool: &SqlitePool,
    follower_id: i64,
    followee_id: i64,
) -> Result<WriteOutcome<FollowState>> {
    let mut tx = begin_write_sqlite(pool).await?;

    let removed = sqlx::query("DELETE FROM follows WHERE follower_id = ? AND followee_id = ?")
        .bind(follower_id)
        .bind(followee_id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete follow")?
        .rows_affected();
    if removed == 0 {
        return Ok(WriteOutcome::NotFound);
    }

    sqlx::query("UPDATE users SET follower_count = MAX(0, follower_count - 1) WHERE id = ?")
        .bind(followee_id)
        .execute(&mut *tx)
        .await
        .context("Failed to decrement follower count")?;
    sqlx::query("UPDATE users SET following_count = MAX(0, following_count - 1) WHERE id = ?")
        .bind(follower_id)
        .execute(&mut *tx)
        .await
        .context("Failed to decrement following count")?;

    let state = follow_state_sqlite(&mut tx, follower_id, followee_id, false).await?;
    tx.commit().await.context("Failed to commit unfollow")?;
    Ok(WriteOutcome::Applied(state))
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn users_exist_mysql(conn: &mut MySqlConnection, a: i64, b: i64) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id IN (?, ?)")
        .bind(a)
        .bind(b)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to check users")?;
    Ok(count == 2)
}

async fn follow_state_mysql(
    conn: &mut MySqlConnection,
    follower_id: i64,
    followee_id: i64,
    following: bool,
) -> Result<FollowState> {
    let follower_count: i64 = sqlx::query_scalar("SELECT follower_count FROM users WHERE id = ?")
        .bind(followee_id)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to read follower count")?;
    let following_count: i64 = sqlx::query_scalar("SELECT following_count FROM users WHERE id = ?")
        .bind(follower_id)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to read following count")?;

    Ok(FollowState {
        following,
        follower_count,
        following_count,
    })
}

async fn follow_mysql(
    pool: &MySqlPool,
    follower_id: i64,
    followee_id: i64,
) -> Result<WriteOutcome<FollowState>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    if !users_exist_mysql(&mut tx, follower_id, followee_id).await? {
        return Ok(WriteOutcome::NotFound);
    }

    let inserted = sqlx::query("INSERT INTO follows (follower_id, followee_id, created_at) VALUES (?, ?, ?)")
        .bind(follower_id)
        .bind(followee_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await;
    match inserted {
        Ok(_) => {}
        Err(err) if is_unique_violation(&err) => return Ok(WriteOutcome::Conflict),
        Err(err) => return Err(err).context("Failed to create follow"),
    }

    sqlx::query("UPDATE users SET follower_count = follower_count + 1 WHERE id = ?")
        .bind(followee_id)
        .execute(&mut *tx)
        .await
        .context("Failed to increment follower count")?;
    sqlx::query("UPDATE users SET following_count = following_count + 1 WHERE id = ?")
        .bind(follower_id)
        .execute(&mut *tx)
        .await
        .context("Failed to increment following count")?;

    let state = follow_state_mysql(&mut tx, follower_id, followee_id, true).await?;
    tx.commit().await.context("Failed to commit follow")?;
    Ok(WriteOutcome::Applied(state))
}

async fn unfollow_mysql(
    pool: &MySqlPool,
    follower_id: i64,
    followee_id: i64,
) -> Result<WriteOutcome<FollowState>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let removed = sqlx::query("DELETE FROM follows WHERE follower_id = ? AND followee_id = ?")
        .bind(follower_id)
        .bind(followee_id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete follow")?
        .rows_affected();
    if removed == 0 {
        return Ok(WriteOutcome::NotFound);
    }

    sqlx::query("UPDATE users SET follower_count = GREATEST(0, follower_count - 1) WHERE id = ?")
        .bind(followee_id)
        .execute(&mut *tx)
        .await
        .context("Failed to decrement follower count")?;
    sqlx::query("UPDATE users SET following_count = GREATEST(0, following_count - 1) WHERE id = ?")
        .bind(follower_id)
        .execute(&mut *tx)
        .await
        .context("Failed to decrement following count")?;

    let state = follow_state_mysql(&mut tx, follower_id, followee_id, false).await?;
    tx.commit().await.context("Failed to commit unfollow")?;
    Ok(WriteOutcome::Applied(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{file_pool, insert_user, migrated_pool};

    #[tokio::test]
    async fn test_follow_moves_both_counters() {
        let pool = migrated_pool().await;
        let ada = insert_user(&pool, "Ada").await;
        let bob = insert_user(&pool, "Bob").await;
        let repo = SqlxFollowRepository::new(pool);

        let state = repo.follow(ada, bob).await.unwrap();
        assert_eq!(
            state,
            WriteOutcome::Applied(FollowState {
                following: true,
                follower_count: 1,
                following_count: 1,
            })
        );
        assert!(repo.is_following(ada, bob).await.unwrap());
        assert!(!repo.is_following(bob, ada).await.unwrap());

        assert_eq!(repo.follow(ada, bob).await.unwrap(), WriteOutcome::Conflict);

        let state = repo.unfollow(ada, bob).await.unwrap();
        assert_eq!(
            state,
            WriteOutcome::Applied(FollowState {
                following: false,
                follower_count: 0,
                following_count: 0,
            })
        );
        assert_eq!(repo.unfollow(ada, bob).await.unwrap(), WriteOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_follow_unknown_user() {
        let pool = migrated_pool().await;
        let ada = insert_user(&pool, "Ada").await;
        let repo = SqlxFollowRepository::new(pool);

        assert_eq!(repo.follow(ada, 999).await.unwrap(), WriteOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_edge_listings() {
        let pool = migrated_pool().await;
        let ada = insert_user(&pool, "Ada").await;
        let bob = insert_user(&pool, "Bob").await;
        let cyd = insert_user(&pool, "Cyd").await;
        let repo = SqlxFollowRepository::new(pool);

        repo.follow(ada, bob).await.unwrap();
        repo.follow(ada, cyd).await.unwrap();
        repo.follow(cyd, bob).await.unwrap();

        let mut following = repo.following_ids(ada).await.unwrap();
        following.sort();
        assert_eq!(following, vec![bob, cyd]);

        let mut followers = repo.follower_ids(bob).await.unwrap();
        followers.sort();
        assert_eq!(followers, vec![ada, cyd]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_follows_leave_one_edge() {
        let dir = tempfile::tempdir().unwrap();
        let pool = file_pool(&dir).await;
        let ada = insert_user(&pool, "Ada").await;
        let repo = SqlxFollowRepository::boxed(pool.clone());

        for round in 0..10 {
            let fan = insert_user(&pool, &format!("Fan {}", round)).await;
            let (a, b) = (repo.clone(), repo.clone());
            let (first, second) = tokio::join!(
                tokio::spawn(async move { a.follow(fan, ada).await }),
                tokio::spawn(async move { b.follow(fan, ada).await }),
            );
            let mut outcomes = vec![first.unwrap().unwrap(), second.unwrap().unwrap()];
            outcomes.retain(|o| *o != WriteOutcome::Conflict);
            assert_eq!(
                outcomes,
                vec![WriteOutcome::Applied(FollowState {
                    following: true,
                    follower_count: round + 1,
                    following_count: 1,
                })]
            );
        }
    }
}
