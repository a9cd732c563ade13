//! Interaction repository
//!
//! Ratings, saves and shares. Each mutation writes the fact row and the
//! publication's derived columns (`average_rating`, `save_count`,
//! `share_count`, and the author's `avg_score` for ratings) in a single
//! transaction.

use crate::db::{begin_write_sqlite, is_unique_violation, Backend, DynDatabasePool};
use crate::models::{Publication, SaveState, Share, ShareState, ViewerFlags};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlConnection, MySqlPool, Row, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

use super::aggregate::{
    recompute_rating_mysql, recompute_rating_sqlite, refresh_author_score_mysql,
    refresh_author_score_sqlite,
};
use super::publication::{row_to_publication_mysql, row_to_publication_sqlite, PUBLICATION_COLUMNS};
use super::{placeholders, WriteOutcome, IN_CHUNK};

const SHARE_COLUMNS: &str = "id, user_id, publication_id, note, shared_at";

/// Interaction repository trait
#[async_trait]
pub trait InteractionRepository: Send + Sync {
    /// Insert or replace the user's rating. Returns the publication with its
    /// refreshed average, or `None` when the publication does not exist.
    async fn upsert_rating(
        &self,
        publication_id: i64,
        user_id: i64,
        score: i32,
    ) -> Result<Option<Publication>>;

    /// Remove the user's rating if any. Removing an absent rating is a no-op.
    async fn delete_rating(&self, publication_id: i64, user_id: i64) -> Result<Option<Publication>>;

    /// Flip the saved state
    async fn toggle_save(&self, publication_id: i64, user_id: i64) -> Result<WriteOutcome<SaveState>>;

    async fn create_share(
        &self,
        publication_id: i64,
        user_id: i64,
        note: Option<&str>,
    ) -> Result<WriteOutcome<(Share, ShareState)>>;

    async fn update_share_note(
        &self,
        publication_id: i64,
        user_id: i64,
        note: Option<&str>,
    ) -> Result<WriteOutcome<Share>>;

    async fn delete_share(&self, publication_id: i64, user_id: i64) -> Result<WriteOutcome<ShareState>>;

    /// Every share, newest first
    async fn list_shares(&self) -> Result<Vec<Share>>;

    /// Shares made by one user, newest first
    async fn list_shares_by_user(&self, user_id: i64) -> Result<Vec<Share>>;

    /// Publications the user has saved, most recently saved first
    async fn saved_publication_ids(&self, user_id: i64) -> Result<Vec<i64>>;

    /// Saved/shared/rated state of `user_id` for each of `publication_ids`.
    /// Ids without any interaction are absent from the map.
    async fn viewer_flags(
        &self,
        user_id: i64,
        publication_ids: &[i64],
    ) -> Result<HashMap<i64, ViewerFlags>>;
}

/// SQLx-based interaction repository implementation
pub struct SqlxInteractionRepository {
    pool: DynDatabasePool,
}

impl SqlxInteractionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn InteractionRepository> {
        Arc::new(Self::new(pool))
    }

    /// Publication ids in `table` for one user, restricted to `ids`
    async fn linked_ids(&self, table: &str, user_id: i64, ids: &[i64]) -> Result<Vec<i64>> {
        let sql = format!(
            "SELECT publication_id FROM {} WHERE user_id = ? AND publication_id IN ({})",
            table,
            placeholders(ids.len())
        );
        let found = match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let mut query = sqlx::query_scalar(&sql).bind(user_id);
                for id in ids {
                    query = query.bind(*id);
                }
                query.fetch_all(pool).await
            }
            Backend::Mysql(pool) => {
                let mut query = sqlx::query_scalar(&sql).bind(user_id);
                for id in ids {
                    query = query.bind(*id);
                }
                query.fetch_all(pool).await
            }
        };
        found.with_context(|| format!("Failed to load viewer {}", table))
    }

    async fn user_ratings(&self, user_id: i64, ids: &[i64]) -> Result<Vec<(i64, i32)>> {
        let sql = format!(
            "SELECT publication_id, score FROM ratings WHERE user_id = ? AND publication_id IN ({})",
            placeholders(ids.len())
        );
        let found = match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let mut query = sqlx::query_as(&sql).bind(user_id);
                for id in ids {
                    query = query.bind(*id);
                }
                query.fetch_all(pool).await
            }
            Backend::Mysql(pool) => {
                let mut query = sqlx::query_as(&sql).bind(user_id);
                for id in ids {
                    query = query.bind(*id);
                }
                query.fetch_all(pool).await
            }
        };
        found.context("Failed to load viewer ratings")
    }
}

#[async_trait]
impl InteractionRepository for SqlxInteractionRepository {
    async fn upsert_rating(
        &self,
        publication_id: i64,
        user_id: i64,
        score: i32,
    ) -> Result<Option<Publication>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => upsert_rating_sqlite(pool, publication_id, user_id, score).await,
            Backend::Mysql(pool) => upsert_rating_mysql(pool, publication_id, user_id, score).await,
        }
    }

    async fn delete_rating(&self, publication_id: i64, user_id: i64) -> Result<Option<Publication>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => delete_rating_sqlite(pool, publication_id, user_id).await,
            Backend::Mysql(pool) => delete_rating_mysql(pool, publication_id, user_id).await,
        }
    }

    async fn toggle_save(&self, publication_id: i64, user_id: i64) -> Result<WriteOutcome<SaveState>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => toggle_save_sqlite(pool, publication_id, user_id).await,
            Backend::Mysql(pool) => toggle_save_mysql(pool, publication_id, user_id).await,
        }
    }

    async fn create_share(
        &self,
        publication_id: i64,
        user_id: i64,
        note: Option<&str>,
    ) -> Result<WriteOutcome<(Share, ShareState)>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => create_share_sqlite(pool, publication_id, user_id, note).await,
            Backend::Mysql(pool) => create_share_mysql(pool, publication_id, user_id, note).await,
        }
    }

    async fn update_share_note(
        &self,
        publication_id: i64,
        user_id: i64,
        note: Option<&str>,
    ) -> Result<WriteOutcome<Share>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => update_share_note_sqlite(pool, publication_id, user_id, note).await,
            Backend::Mysql(pool) => update_share_note_mysql(pool, publication_id, user_id, note).await,
        }
    }

    async fn delete_share(&self, publication_id: i64, user_id: i64) -> Result<WriteOutcome<ShareState>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => delete_share_sqlite(pool, publication_id, user_id).await,
            Backend::Mysql(pool) => delete_share_mysql(pool, publication_id, user_id).await,
        }
    }

    async fn list_shares(&self) -> Result<Vec<Share>> {
        let sql = format!("SELECT {} FROM shares ORDER BY shared_at DESC, id DESC", SHARE_COLUMNS);
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(&sql)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list shares")?;
                Ok(rows.iter().map(row_to_share_sqlite).collect())
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(&sql)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list shares")?;
                Ok(rows.iter().map(row_to_share_mysql).collect())
            }
        }
    }

    async fn list_shares_by_user(&self, user_id: i64) -> Result<Vec<Share>> {
        let sql = format!(
            "SELECT {} FROM shares WHERE user_id = ? ORDER BY shared_at DESC, id DESC",
            SHARE_COLUMNS
        );
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(&sql)
                    .bind(user_id)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list user shares")?;
                Ok(rows.iter().map(row_to_share_sqlite).collect())
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(&sql)
                    .bind(user_id)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list user shares")?;
                Ok(rows.iter().map(row_to_share_mysql).collect())
            }
        }
    }

    async fn saved_publication_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        let sql = "SELECT publication_id FROM saves WHERE user_id = ? \
                   ORDER BY created_at DESC, publication_id DESC";
        let ids = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query_scalar(sql).bind(user_id).fetch_all(pool).await,
            Backend::Mysql(pool) => sqlx::query_scalar(sql).bind(user_id).fetch_all(pool).await,
        };
        ids.context("Failed to list saved publications")
    }

    async fn viewer_flags(
        &self,
        user_id: i64,
        publication_ids: &[i64],
    ) -> Result<HashMap<i64, ViewerFlags>> {
        let mut flags: HashMap<i64, ViewerFlags> = HashMap::new();
        for chunk in publication_ids.chunks(IN_CHUNK) {
            for id in self.linked_ids("saves", user_id, chunk).await? {
                flags.entry(id).or_default().is_saved = true;
            }
            for id in self.linked_ids("shares", user_id, chunk).await? {
                flags.entry(id).or_default().is_shared = true;
            }
            for (id, score) in self.user_ratings(user_id, chunk).await? {
                flags.entry(id).or_default().user_rating = Some(score);
            }
        }
        Ok(flags)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn author_of_sqlite(conn: &mut SqliteConnection, publication_id: i64) -> Result<Option<i64>> {
    sqlx::query_scalar("SELECT author_id FROM publications WHERE id = ?")
        .bind(publication_id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to load publication")
}

async fn load_publication_sqlite(conn: &mut SqliteConnection, id: i64) -> Result<Publication> {
    let sql = format!("SELECT {} FROM publications WHERE id = ?", PUBLICATION_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to reload publication")?;
    Ok(row_to_publication_sqlite(&row))
}

async fn upsert_rating_sqlite(
    pool: &SqlitePool,
    publication_id: i64,
    user_id: i64,
    score: i32,
) -> Result<Option<Publication>> {
    let now = Utc::now();
    let mut tx = begin_write_sqlite(pool).await?;

    let Some(author_id) = author_of_sqlite(&mut tx, publication_id).await? else {
        return Ok(None);
    };

    sqlx::query(
        r#"
        INSERT INTO ratings (publication_id, user_id, score, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(publication_id, user_id)
        DO UPDATE SET score = excluded.score, updated_at = excluded.updated_at
        "#,
    )
    .bind(publication_id)
    .bind(user_id)
    .bind(score)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to upsert rating")?;

    recompute_rating_sqlite(&mut tx, publication_id).await?;
    refresh_author_score_sqlite(&mut tx, author_id).await?;
    let publication = load_publication_sqlite(&mut tx, publication_id).await?;

    tx.commit().await.context("Failed to commit rating")?;
    Ok(Some(publication))
}

async fn delete_rating_sqlite(
    pool: &SqlitePool,
    publication_id: i64,
    user_id: i64,
) -> Result<Option<Publication>> {
    let mut tx = begin_write_sqlite(pool).await?;

    let Some(author_id) = author_of_sqlite(&mut tx, publication_id).await? else {
        return Ok(None);
    };

    let removed = sqlx::query("DELETE FROM ratings WHERE publication_id = ? AND user_id = ?")
        .bind(publication_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete rating")?
        .rows_affected();

    if removed > 0 {
        recompute_rating_sqlite(&mut tx, publication_id).await?;
        refresh_author_score_sqlite(&mut tx, author_id).await?;
    }
    let publication = load_publication_sqlite(&mut tx, publication_id).await?;

    tx.commit().await.context("Failed to commit rating removal")?;
    Ok(Some(publication))
}

async fn toggle_save_sqlite(
    pool: &SqlitePool,
    publication_id: i64,
    user_id: i64,
) -> Result<WriteOutcome<SaveState>> {
    let mut tx = begin_write_sqlite(pool).await?;

    if author_of_sqlite(&mut tx, publication_id).await?.is_none() {
        return Ok(WriteOutcome::NotFound);
    }

    let removed = sqlx::query("DELETE FROM saves WHERE user_id = ? AND publication_id = ?")
        .bind(user_id)
        .bind(publication_id)
        .execute(&mut *tx)
        .await
        .context("Failed to remove save")?
        .rows_affected()
        > 0;

    let saved = if removed {
        sqlx::query("UPDATE publications SET save_count = MAX(0, save_count - 1) WHERE id = ?")
            .bind(publication_id)
            .execute(&mut *tx)
            .await
            .context("Failed to decrement save count")?;
        false
    } else {
        let inserted = sqlx::query(
            "INSERT INTO saves (user_id, publication_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(publication_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await;
        match inserted {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => return Ok(WriteOutcome::Conflict),
            Err(err) => return Err(err).context("Failed to save publication"),
        }
        sqlx::query("UPDATE publications SET save_count = save_count + 1 WHERE id = ?")
            .bind(publication_id)
            .execute(&mut *tx)
            .await
            .context("Failed to increment save count")?;
        true
    };

    let save_count: i64 = sqlx::query_scalar("SELECT save_count FROM publications WHERE id = ?")
        .bind(publication_id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to read save count")?;

    tx.commit().await.context("Failed to commit save")?;
    Ok(WriteOutcome::Applied(SaveState { saved, save_count }))
}

async fn create_share_sqlite(
    pool: &SqlitePool,
    publication_id: i64,
    user_id: i64,
    note: Option<&str>,
) -> Result<WriteOutcome<(Share, ShareState)>> {
    let mut tx = begin_write_sqlite(pool).await?;

    if author_of_sqlite(&mut tx, publication_id).await?.is_none() {
        return Ok(WriteOutcome::NotFound);
    }

    let inserted = sqlx::query(
        "INSERT INTO shares (user_id, publication_id, note, shared_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(publication_id)
    .bind(note)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await;
    let share_id = match inserted {
        Ok(result) => result.last_insert_rowid(),
        Err(err) if is_unique_violation(&err) => return Ok(WriteOutcome::Conflict),
        Err(err) => return Err(err).context("Failed to create share"),
    };

    sqlx::query("UPDATE publications SET share_count = share_count + 1 WHERE id = ?")
        .bind(publication_id)
        .execute(&mut *tx)
        .await
        .context("Failed to increment share count")?;

    let share = load_share_sqlite(&mut tx, share_id).await?;
    let share_count = share_count_sqlite(&mut tx, publication_id).await?;

    tx.commit().await.context("Failed to commit share")?;
    Ok(WriteOutcome::Applied((
        share,
        ShareState {
            shared: true,
            share_count,
        },
    )))
}

async fn update_share_note_sqlite(
    pool: &SqlitePool,
    publication_id: i64,
    user_id: i64,
    note: Option<&str>,
) -> Result<WriteOutcome<Share>> {
    let mut tx = begin_write_sqlite(pool).await?;

    let share_id: Option<i64> =
        sqlx::query_scalar("SELECT id FROM shares WHERE user_id = ? AND publication_id = ?")
            .bind(user_id)
            .bind(publication_id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to look up share")?;
    let Some(share_id) = share_id else {
        return Ok(WriteOutcome::NotFound);
    };

    sqlx::query("UPDATE shares SET note = ? WHERE id = ?")
        .bind(note)
        .bind(share_id)
        .execute(&mut *tx)
        .await
        .context("Failed to update share note")?;

    let share = load_share_sqlite(&mut tx, share_id).await?;
    tx.commit().await.context("Failed to commit share note")?;
    Ok(WriteOutcome::Applied(share))
}

async fn delete_share_sqlite(
    pool: &SqlitePool,
    publication_id: i64,
    user_id: i64,
) -> Result<WriteOutcome<ShareState>> {
    let mut tx = begin_write_sqlite(pool).await?;

    let removed = sqlx::query("DELETE FROM shares WHERE user_id = ? AND publication_id = ?")
        .bind(user_id)
        .bind(publication_id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete share")?
        .rows_affected();
    if removed == 0 {
        return Ok(WriteOutcome::NotFound);
    }

    sqlx::query("UPDATE publications SET share_count = MAX(0, share_count - 1) WHERE id = ?")
        .bind(publication_id)
        .execute(&mut *tx)
        .await
        .context("Failed to decrement share count")?;
    let share_count = share_count_sqlite(&mut tx, publication_id).await?;

    tx.commit().await.context("Failed to commit share removal")?;
    Ok(WriteOutcome::Applied(ShareState {
        shared: false,
        share_count,
    }))
}

async fn load_share_sqlite(conn: &mut SqliteConnection, id: i64) -> Result<Share> {
    let sql = format!("SELECT {} FROM shares WHERE id = ?", SHARE_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to load share")?;
    Ok(row_to_share_sqlite(&row))
}

async fn share_count_sqlite(conn: &mut SqliteConnection, publication_id: i64) -> Result<i64> {
    sqlx::query_scalar("SELECT share_count FROM publications WHERE id = ?")
        .bind(publication_id)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to read share count")
}

fn row_to_share_sqlite(row: &sqlx::sqlite::SqliteRow) -> Share {
    Share {
        id: row.get("id"),
        user_id: row.get("user_id"),
        publication_id: row.get("publication_id"),
        note: row.get("note"),
        shared_at: row.get("shared_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

/// Locks the publication row so concurrent writers serialize on it
async fn author_of_mysql(conn: &mut MySqlConnection, publication_id: i64) -> Result<Option<i64>> {
    sqlx::query_scalar("SELECT author_id FROM publications WHERE id = ? FOR UPDATE")
        .bind(publication_id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to load publication")
}

async fn load_publication_mysql(conn: &mut MySqlConnection, id: i64) -> Result<Publication> {
    let sql = format!("SELECT {} FROM publications WHERE id = ?", PUBLICATION_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to reload publication")?;
    Ok(row_to_publication_mysql(&row))
}

async fn upsert_rating_mysql(
    pool: &MySqlPool,
    publication_id: i64,
    user_id: i64,
    score: i32,
) -> Result<Option<Publication>> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let Some(author_id) = author_of_mysql(&mut tx, publication_id).await? else {
        return Ok(None);
    };

    sqlx::query(
        r#"
        INSERT INTO ratings (publication_id, user_id, score, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON DUPLICATE KEY UPDATE score = VALUES(score), updated_at = VALUES(updated_at)
        "#,
    )
    .bind(publication_id)
    .bind(user_id)
    .bind(score)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to upsert rating")?;

    recompute_rating_mysql(&mut tx, publication_id).await?;
    refresh_author_score_mysql(&mut tx, author_id).await?;
    let publication = load_publication_mysql(&mut tx, publication_id).await?;

    tx.commit().await.context("Failed to commit rating")?;
    Ok(Some(publication))
}

async fn delete_rating_mysql(
    pool: &MySqlPool,
    publication_id: i64,
    user_id: i64,
) -> Result<Option<Publication>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let Some(author_id) = author_of_mysql(&mut tx, publication_id).await? else {
        return Ok(None);
    };

    let removed = sqlx::query("DELETE FROM ratings WHERE publication_id = ? AND user_id = ?")
        .bind(publication_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete rating")?
        .rows_affected();

    if removed > 0 {
        recompute_rating_mysql(&mut tx, publication_id).await?;
        refresh_author_score_mysql(&mut tx, author_id).await?;
    }
    let publication = load_publication_mysql(&mut tx, publication_id).await?;

    tx.commit().await.context("Failed to commit rating removal")?;
    Ok(Some(publication))
}

async fn toggle_save_mysql(
    pool: &MySqlPool,
    publication_id: i64,
    user_id: i64,
) -> Result<WriteOutcome<SaveState>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    if author_of_mysql(&mut tx, publication_id).await?.is_none() {
        return Ok(WriteOutcome::NotFound);
    }

    let removed = sqlx::query("DELETE FROM saves WHERE user_id = ? AND publication_id = ?")
        .bind(user_id)
        .bind(publication_id)
        .execute(&mut *tx)
        .await
        .context("Failed to remove save")?
        .rows_affected()
        > 0;

    let saved = if removed {
        sqlx::query("UPDATE publications SET save_count = GREATEST(0, save_count - 1) WHERE id = ?")
            .bind(publication_id)
            .execute(&mut *tx)
            .await
            .context("Failed to decrement save count")?;
        false
    } else {
        let inserted = sqlx::query(
            "INSERT INTO saves (user_id, publication_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(publication_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await;
        match inserted {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => return Ok(WriteOutcome::Conflict),
            Err(err) => return Err(err).context("Failed to save publication"),
        }
        sqlx::query("UPDATE publications SET save_count = save_count + 1 WHERE id = ?")
            .bind(publication_id)
            .execute(&mut *tx)
            .await
            .context("Failed to increment save count")?;
        true
    };

    let save_count: i64 = sqlx::query_scalar("SELECT save_count FROM publications WHERE id = ?")
        .bind(publication_id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to read save count")?;

    tx.commit().await.context("Failed to commit save")?;
    Ok(WriteOutcome::Applied(SaveState { saved, save_count }))
}

async fn create_share_mysql(
    pool: &MySqlPool,
    publication_id: i64,
    user_id: i64,
    note: Option<&str>,
) -> Result<WriteOutcome<(Share, ShareState)>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    if author_of_mysql(&mut tx, publication_id).await?.is_none() {
        return Ok(WriteOutcome::NotFound);
    }

    let inserted = sqlx::query(
        "INSERT INTO shares (user_id, publication_id, note, shared_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(publication_id)
    .bind(note)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await;
    let share_id = match inserted {
        Ok(result) => result.last_insert_id() as i64,
        Err(err) if is_unique_violation(&err) => return Ok(WriteOutcome::Conflict),
        Err(err) => return Err(err).context("Failed to create share"),
    };

    sqlx::query("UPDATE publications SET share_count = share_count + 1 WHERE id = ?")
        .bind(publication_id)
        .execute(&mut *tx)
        .await
        .context("Failed to increment share count")?;

    let share = load_share_mysql(&mut tx, share_id).await?;
    let share_count = share_count_mysql(&mut tx, publication_id).await?;

    tx.commit().await.context("Failed to commit share")?;
    Ok(WriteOutcome::Applied((
        share,
        ShareState {
            shared: true,
            share_count,
        },
    )))
}

async fn update_share_note_mysql(
    pool: &MySqlPool,
    publication_id: i64,
    user_id: i64,
    note: Option<&str>,
) -> Result<WriteOutcome<Share>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let share_id: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM shares WHERE user_id = ? AND publication_id = ? FOR UPDATE",
    )
    .bind(user_id)
    .bind(publication_id)
    .fetch_optional(&mut *tx)
    .await
    .context("Failed to look up share")?;
    let Some(share_id) = share_id else {
        return Ok(WriteOutcome::NotFound);
    };

    sqlx::query("UPDATE shares SET note = ? WHERE id = ?")
        .bind(note)
        .bind(share_id)
        .execute(&mut *tx)
        .await
        .context("Failed to update share note")?;

    let share = load_share_mysql(&mut tx, share_id).await?;
    tx.commit().await.context("Failed to commit share note")?;
    Ok(WriteOutcome::Applied(share))
}

async fn delete_share_mysql(
    pool: &MySqlPool,
    publication_id: i64,
    user_id: i64,
) -> Result<WriteOutcome<ShareState>> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let removed = sqlx::query("DELETE FROM shares WHERE user_id = ? AND publication_id = ?")
        .bind(user_id)
        .bind(publication_id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete share")?
        .rows_affected();
    if removed == 0 {
        return Ok(WriteOutcome::NotFound);
    }

    sqlx::query("UPDATE publications SET share_count = GREATEST(0, share_count - 1) WHERE id = ?")
        .bind(publication_id)
        .execute(&mut *tx)
        .await
        .context("Failed to decrement share count")?;
    let share_count = share_count_mysql(&mut tx, publication_id).await?;

    tx.commit().await.context("Failed to commit share removal")?;
    Ok(WriteOutcome::Applied(ShareState {
        shared: false,
        share_count,
    }))
}

async fn load_share_mysql(conn: &mut MySqlConnection, id: i64) -> Result<Share> {
    let sql = format!("SELECT {} FROM shares WHERE id = ?", SHARE_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to load share")?;
    Ok(row_to_share_mysql(&row))
}

async fn share_count_mysql(conn: &mut MySqlConnection, publication_id: i64) -> Result<i64> {
    sqlx::query_scalar("SELECT share_count FROM publications WHERE id = ?")
        .bind(publication_id)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to read share count")
}

fn row_to_share_mysql(row: &sqlx::mysql::MySqlRow) -> Share {
    Share {
        id: row.get("id"),
        user_id: row.get("user_id"),
        publication_id: row.get("publication_id"),
        note: row.get("note"),
        shared_at: row.get("shared_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{
        file_pool, insert_publication, insert_user, migrated_pool, scalar_f64, scalar_i64,
    };

    fn applied<T>(outcome: WriteOutcome<T>) -> T {
        match outcome {
            WriteOutcome::Applied(value) => value,
            _ => panic!("expected an applied write"),
        }
    }

    #[tokio::test]
    async fn test_rating_average_tracks_upserts_and_removals() {
        let pool = migrated_pool().await;
        let author = insert_user(&pool, "Author").await;
        let (a, b, c, d) = (
            insert_user(&pool, "A").await,
            insert_user(&pool, "B").await,
            insert_user(&pool, "C").await,
            insert_user(&pool, "D").await,
        );
        let publication = insert_publication(&pool, author, "Paper").await;
        let repo = SqlxInteractionRepository::new(pool.clone());

        repo.upsert_rating(publication, a, 5).await.unwrap();
        repo.upsert_rating(publication, b, 3).await.unwrap();
        let rated = repo.upsert_rating(publication, c, 4).await.unwrap().unwrap();
        assert_eq!(rated.average_rating, 4.0);

        let rated = repo.upsert_rating(publication, d, 2).await.unwrap().unwrap();
        assert_eq!(rated.average_rating, 3.5);

        let rated = repo.delete_rating(publication, d).await.unwrap().unwrap();
        assert_eq!(rated.average_rating, 4.0);

        // Re-rating replaces rather than adds
        let rated = repo.upsert_rating(publication, a, 2).await.unwrap().unwrap();
        assert_eq!(rated.average_rating, 3.0);
        assert_eq!(
            scalar_i64(&pool, "SELECT COUNT(*) FROM ratings WHERE publication_id = ?", publication).await,
            3
        );
        assert_eq!(
            scalar_f64(&pool, "SELECT avg_score FROM users WHERE id = ?", author).await,
            3.0
        );
    }

    #[tokio::test]
    async fn test_rating_missing_publication() {
        let pool = migrated_pool().await;
        let user = insert_user(&pool, "User").await;
        let repo = SqlxInteractionRepository::new(pool);

        assert!(repo.upsert_rating(404, user, 3).await.unwrap().is_none());
        assert!(repo.delete_rating(404, user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_author_score_averages_rated_publications_only() {
        let pool = migrated_pool().await;
        let author = insert_user(&pool, "Author").await;
        let reader = insert_user(&pool, "Reader").await;
        let first = insert_publication(&pool, author, "First").await;
        let second = insert_publication(&pool, author, "Second").await;
        insert_publication(&pool, author, "Unrated").await;
        let repo = SqlxInteractionRepository::new(pool.clone());

        repo.upsert_rating(first, reader, 5).await.unwrap();
        repo.upsert_rating(second, reader, 2).await.unwrap();
        assert_eq!(scalar_f64(&pool, "SELECT avg_score FROM users WHERE id = ?", author).await, 3.5);

        repo.delete_rating(second, reader).await.unwrap();
        assert_eq!(scalar_f64(&pool, "SELECT avg_score FROM users WHERE id = ?", author).await, 5.0);
    }

    #[tokio::test]
    async fn test_toggle_save_is_an_involution() {
        let pool = migrated_pool().await;
        let author = insert_user(&pool, "Author").await;
        let reader = insert_user(&pool, "Reader").await;
        let publication = insert_publication(&pool, author, "Paper").await;
        let repo = SqlxInteractionRepository::new(pool);

        let on = applied(repo.toggle_save(publication, reader).await.unwrap());
        assert_eq!(on, SaveState { saved: true, save_count: 1 });

        let off = applied(repo.toggle_save(publication, reader).await.unwrap());
        assert_eq!(off, SaveState { saved: false, save_count: 0 });

        assert_eq!(repo.toggle_save(404, reader).await.unwrap(), WriteOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_share_lifecycle() {
        let pool = migrated_pool().await;
        let author = insert_user(&pool, "Author").await;
        let reader = insert_user(&pool, "Reader").await;
        let publication = insert_publication(&pool, author, "Paper").await;
        let repo = SqlxInteractionRepository::new(pool);

        let (share, state) = applied(repo.create_share(publication, reader, Some("great")).await.unwrap());
        assert_eq!(share.note.as_deref(), Some("great"));
        assert_eq!(state, ShareState { shared: true, share_count: 1 });

        assert_eq!(
            repo.create_share(publication, reader, None).await.unwrap(),
            WriteOutcome::Conflict
        );

        let edited = applied(repo.update_share_note(publication, reader, Some("better")).await.unwrap());
        assert_eq!(edited.id, share.id);
        assert_eq!(edited.note.as_deref(), Some("better"));

        let state = applied(repo.delete_share(publication, reader).await.unwrap());
        assert_eq!(state, ShareState { shared: false, share_count: 0 });
        assert_eq!(repo.delete_share(publication, reader).await.unwrap(), WriteOutcome::NotFound);
        assert_eq!(
            repo.update_share_note(publication, reader, None).await.unwrap(),
            WriteOutcome::NotFound
        );

        // Sharing again after unsharing is allowed
        applied(repo.create_share(publication, reader, None).await.unwrap());
        assert_eq!(repo.list_shares_by_user(reader).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_viewer_flags_cover_requested_ids_only() {
        let pool = migrated_pool().await;
        let author = insert_user(&pool, "Author").await;
        let viewer = insert_user(&pool, "Viewer").await;
        let first = insert_publication(&pool, author, "First").await;
        let second = insert_publication(&pool, author, "Second").await;
        let third = insert_publication(&pool, author, "Third").await;
        let repo = SqlxInteractionRepository::new(pool);

        applied(repo.toggle_save(first, viewer).await.unwrap());
        applied(repo.create_share(first, viewer, None).await.unwrap());
        repo.upsert_rating(second, viewer, 4).await.unwrap();
        applied(repo.toggle_save(third, viewer).await.unwrap());

        let flags = repo.viewer_flags(viewer, &[first, second]).await.unwrap();
        assert_eq!(
            flags[&first],
            ViewerFlags { is_saved: true, is_shared: true, user_rating: None }
        );
        assert_eq!(flags[&second].user_rating, Some(4));
        assert!(!flags.contains_key(&third));

        let saved = repo.saved_publication_ids(viewer).await.unwrap();
        assert_eq!(saved.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_shares_and_ratings_resolve_without_storage_errors() {
        let dir = tempfile::tempdir().unwrap();
        let pool = file_pool(&dir).await;
        let author = insert_user(&pool, "Author").await;
        let fan = insert_user(&pool, "Fan").await;
        let repo = SqlxInteractionRepository::boxed(pool.clone());

        for round in 0..10 {
            let paper = insert_publication(&pool, author, &format!("Paper {}", round)).await;

            let (first, second) = {
                let (a, b) = (repo.clone(), repo.clone());
                tokio::join!(
                    tokio::spawn(async move { a.create_share(paper, fan, None).await }),
                    tokio::spawn(async move { b.create_share(paper, fan, None).await }),
                )
            };
            let outcomes = [first.unwrap().unwrap(), second.unwrap().unwrap()];
            let applied = outcomes
                .iter()
                .filter(|o| matches!(o, WriteOutcome::Applied(_)))
                .count();
            let conflicts = outcomes
                .iter()
                .filter(|o| matches!(o, WriteOutcome::Conflict))
                .count();
            assert_eq!((applied, conflicts), (1, 1));
            assert_eq!(
                scalar_i64(&pool, "SELECT share_count FROM publications WHERE id = ?", paper).await,
                1
            );

            let (first, second) = {
                let (a, b) = (repo.clone(), repo.clone());
                tokio::join!(
                    tokio::spawn(async move { a.upsert_rating(paper, fan, 3).await }),
                    tokio::spawn(async move { b.upsert_rating(paper, fan, 4).await }),
                )
            };
            assert!(first.unwrap().unwrap().is_some());
            assert!(second.unwrap().unwrap().is_some());
            assert_eq!(
                scalar_i64(&pool, "SELECT COUNT(*) FROM ratings WHERE publication_id = ?", paper).await,
                1
            );
            let average =
                scalar_f64(&pool, "SELECT average_rating FROM publications WHERE id = ?", paper).await;
            assert!(average == 3.0 || average == 4.0, "average {}", average);
        }
    }
}
