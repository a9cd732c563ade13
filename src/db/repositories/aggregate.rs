//! Derived-field maintenance shared by the repositories.
//!
//! Every helper runs on a connection that is already inside a transaction.
//! Averages are recomputed from the fact rows; counters move by exactly one
//! per attach/detach and never drop below zero.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{MySqlConnection, SqliteConnection};

use crate::models::{mean_average, mean_score, normalize_tag_name};

/// Junction tables that reference tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TagLink {
    Publication,
    Interest,
}

impl TagLink {
    fn table(self) -> &'static str {
        match self {
            TagLink::Publication => "publication_tags",
            TagLink::Interest => "user_interests",
        }
    }

    fn owner_column(self) -> &'static str {
        match self {
            TagLink::Publication => "publication_id",
            TagLink::Interest => "user_id",
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

/// Recompute `average_rating` from the remaining rating rows
pub(crate) async fn recompute_rating_sqlite(
    conn: &mut SqliteConnection,
    publication_id: i64,
) -> Result<f64> {
    let scores: Vec<i32> = sqlx::query_scalar("SELECT score FROM ratings WHERE publication_id = ?")
        .bind(publication_id)
        .fetch_all(&mut *conn)
        .await
        .context("Failed to load rating scores")?;

    let average = mean_score(&scores);
    sqlx::query("UPDATE publications SET average_rating = ? WHERE id = ?")
        .bind(average)
        .bind(publication_id)
        .execute(&mut *conn)
        .await
        .context("Failed to update average rating")?;

    Ok(average)
}

/// Recompute an author's reputation over their rated publications
pub(crate) async fn refresh_author_score_sqlite(
    conn: &mut SqliteConnection,
    author_id: i64,
) -> Result<f64> {
    let averages: Vec<f64> = sqlx::query_scalar(
        r#"
        SELECT p.average_rating FROM publications p
        WHERE p.author_id = ?
          AND EXISTS (SELECT 1 FROM ratings r WHERE r.publication_id = p.id)
        "#,
    )
    .bind(author_id)
    .fetch_all(&mut *conn)
    .await
    .context("Failed to load author publication ratings")?;

    let score = mean_average(&averages);
    sqlx::query("UPDATE users SET avg_score = ? WHERE id = ?")
        .bind(score)
        .bind(author_id)
        .execute(&mut *conn)
        .await
        .context("Failed to update author score")?;

    Ok(score)
}

/// Find a tag by case-insensitive name, creating it with zero usage if absent
pub(crate) async fn find_or_create_tag_sqlite(conn: &mut SqliteConnection, name: &str) -> Result<i64> {
    let key = normalize_tag_name(name).context("Tag name must not be blank")?;

    sqlx::query(
        r#"
        INSERT INTO tags (name, normalized_name, usage_count, created_at)
        VALUES (?, ?, 0, ?)
        ON CONFLICT(normalized_name) DO NOTHING
        "#,
    )
    .bind(name.trim())
    .bind(&key)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await
    .context("Failed to create tag")?;

    sqlx::query_scalar("SELECT id FROM tags WHERE normalized_name = ?")
        .bind(&key)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to load tag id")
}

/// Link a tag to an owner; `usage_count + 1` only when the link is new
pub(crate) async fn attach_tag_sqlite(
    conn: &mut SqliteConnection,
    link: TagLink,
    owner_id: i64,
    tag_id: i64,
) -> Result<bool> {
    let sql = format!(
        "INSERT OR IGNORE INTO {} ({}, tag_id) VALUES (?, ?)",
        link.table(),
        link.owner_column()
    );
    let inserted = sqlx::query(&sql)
        .bind(owner_id)
        .bind(tag_id)
        .execute(&mut *conn)
        .await
        .context("Failed to attach tag")?
        .rows_affected()
        > 0;

    if inserted {
        sqlx::query("UPDATE tags SET usage_count = usage_count + 1 WHERE id = ?")
            .bind(tag_id)
            .execute(&mut *conn)
            .await
            .context("Failed to increment tag usage")?;
    }
    Ok(inserted)
}

/// Remove a tag link; `usage_count - 1` only when a link was removed
pub(crate) async fn detach_tag_sqlite(
    conn: &mut SqliteConnection,
    link: TagLink,
    owner_id: i64,
    tag_id: i64,
) -> Result<bool> {
    let sql = format!(
        "DELETE FROM {} WHERE {} = ? AND tag_id = ?",
        link.table(),
        link.owner_column()
    );
    let removed = sqlx::query(&sql)
        .bind(owner_id)
        .bind(tag_id)
        .execute(&mut *conn)
        .await
        .context("Failed to detach tag")?
        .rows_affected()
        > 0;

    if removed {
        sqlx::query("UPDATE tags SET usage_count = MAX(0, usage_count - 1) WHERE id = ?")
            .bind(tag_id)
            .execute(&mut *conn)
            .await
            .context("Failed to decrement tag usage")?;
    }
    Ok(removed)
}

// ============================================================================
// MySQL implementations
// ============================================================================

pub(crate) async fn recompute_rating_mysql(
    conn: &mut MySqlConnection,
    publication_id: i64,
) -> Result<f64> {
    let scores: Vec<i32> = sqlx::query_scalar("SELECT score FROM ratings WHERE publication_id = ?")
        .bind(publication_id)
        .fetch_all(&mut *conn)
        .await
        .context("Failed to load rating scores")?;

    let average = mean_score(&scores);
    sqlx::query("UPDATE publications SET average_rating = ? WHERE id = ?")
        .bind(average)
        .bind(publication_id)
        .execute(&mut *conn)
        .await
        .context("Failed to update average rating")?;

    Ok(average)
}

pub(crate) async fn refresh_author_score_mysql(
    conn: &mut MySqlConnection,
    author_id: i64,
) -> Result<f64> {
    let averages: Vec<f64> = sqlx::query_scalar(
        r#"
        SELECT p.average_rating FROM publications p
        WHERE p.author_id = ?
          AND EXISTS (SELECT 1 FROM ratings r WHERE r.publication_id = p.id)
        "#,
    )
    .bind(author_id)
    .fetch_all(&mut *conn)
    .await
    .context("Failed to load author publication ratings")?;

    let score = mean_average(&averages);
    sqlx::query("UPDATE users SET avg_score = ? WHERE id = ?")
        .bind(score)
        .bind(author_id)
        .execute(&mut *conn)
        .await
        .context("Failed to update author score")?;

    Ok(score)
}

pub(crate) async fn find_or_create_tag_mysql(conn: &mut MySqlConnection, name: &str) -> Result<i64> {
    let key = normalize_tag_name(name).context("Tag name must not be blank")?;

    sqlx::query(
        r#"
        INSERT IGNORE INTO tags (name, normalized_name, usage_count, created_at)
        VALUES (?, ?, 0, ?)
        "#,
    )
    .bind(name.trim())
    .bind(&key)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await
    .context("Failed to create tag")?;

    sqlx::query_scalar("SELECT id FROM tags WHERE normalized_name = ?")
        .bind(&key)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to load tag id")
}

pub(crate) async fn attach_tag_mysql(
    conn: &mut MySqlConnection,
    link: TagLink,
    owner_id: i64,
    tag_id: i64,
) -> Result<bool> {
    let sql = format!(
        "INSERT IGNORE INTO {} ({}, tag_id) VALUES (?, ?)",
        link.table(),
        link.owner_column()
    );
    let inserted = sqlx::query(&sql)
        .bind(owner_id)
        .bind(tag_id)
        .execute(&mut *conn)
        .await
        .context("Failed to attach tag")?
        .rows_affected()
        > 0;

    if inserted {
        sqlx::query("UPDATE tags SET usage_count = usage_count + 1 WHERE id = ?")
            .bind(tag_id)
            .execute(&mut *conn)
            .await
            .context("Failed to increment tag usage")?;
    }
    Ok(inserted)
}

pub(crate) async fn detach_tag_mysql(
    conn: &mut MySqlConnection,
    link: TagLink,
    owner_id: i64,
    tag_id: i64,
) -> Result<bool> {
    let sql = format!(
        "DELETE FROM {} WHERE {} = ? AND tag_id = ?",
        link.table(),
        link.owner_column()
    );
    let removed = sqlx::query(&sql)
        .bind(owner_id)
        .bind(tag_id)
        .execute(&mut *conn)
        .await
        .context("Failed to detach tag")?
        .rows_affected()
        > 0;

    if removed {
        sqlx::query("UPDATE tags SET usage_count = GREATEST(0, usage_count - 1) WHERE id = ?")
            .bind(tag_id)
            .execute(&mut *conn)
            .await
            .context("Failed to decrement tag usage")?;
    }
    Ok(removed)
}
