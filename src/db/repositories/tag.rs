//! Tag repository
//!
//! Tag listing and search, plus the user-interest links that share the tag
//! table with publications.

use crate::db::{begin_write_sqlite, Backend, DynDatabasePool};
use crate::models::{normalize_tag_name, Tag};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

use super::aggregate::{
    attach_tag_mysql, attach_tag_sqlite, detach_tag_mysql, detach_tag_sqlite,
    find_or_create_tag_mysql, find_or_create_tag_sqlite, TagLink,
};

const TAG_COLUMNS: &str = "t.id, t.name, t.usage_count, t.created_at";

/// Tag repository trait
#[async_trait]
pub trait TagRepository: Send + Sync {
    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>>;

    /// Most used tags first, then alphabetical
    async fn list(&self, limit: i64) -> Result<Vec<Tag>>;

    /// Case-insensitive substring match on the tag name
    async fn search(&self, query: &str, limit: i64) -> Result<Vec<Tag>>;

    async fn list_interests(&self, user_id: i64) -> Result<Vec<Tag>>;

    /// Lowercased interest names, for topic matching
    async fn interest_names(&self, user_id: i64) -> Result<Vec<String>>;

    /// Link a tag (found or created) to the user; idempotent
    async fn add_interest(&self, user_id: i64, name: &str) -> Result<Tag>;

    /// `false` when the user had no such interest
    async fn remove_interest(&self, user_id: i64, name: &str) -> Result<bool>;
}

/// SQLx-based tag repository implementation
pub struct SqlxTagRepository {
    pool: DynDatabasePool,
}

impl SqlxTagRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }

    async fn fetch_tags(&self, sql: &str, binds: TagBinds<'_>) -> Result<Vec<Tag>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => fetch_tags_sqlite(pool, sql, binds).await,
            Backend::Mysql(pool) => fetch_tags_mysql(pool, sql, binds).await,
        }
    }
}

/// Bind values for the tag listing queries, in placeholder order
enum TagBinds<'a> {
    Limit(i64),
    Name(&'a str),
    Pattern(&'a str, i64),
    User(i64),
}

/// Escape LIKE wildcards with `!` so user input matches literally
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.trim().to_lowercase().chars() {
        if matches!(c, '%' | '_' | '!') {
            escaped.push('!');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let Some(key) = normalize_tag_name(name) else {
            return Ok(None);
        };
        let sql = format!("SELECT {} FROM tags t WHERE t.normalized_name = ?", TAG_COLUMNS);
        let tags = self.fetch_tags(&sql, TagBinds::Name(&key)).await?;
        Ok(tags.into_iter().next())
    }

    async fn list(&self, limit: i64) -> Result<Vec<Tag>> {
        let sql = format!(
            "SELECT {} FROM tags t ORDER BY t.usage_count DESC, t.normalized_name ASC LIMIT ?",
            TAG_COLUMNS
        );
        self.fetch_tags(&sql, TagBinds::Limit(limit)).await
    }

    async fn search(&self, query: &str, limit: i64) -> Result<Vec<Tag>> {
        let pattern = like_pattern(query);
        let sql = format!(
            "SELECT {} FROM tags t WHERE t.normalized_name LIKE ? ESCAPE '!' \
             ORDER BY t.usage_count DESC, t.normalized_name ASC LIMIT ?",
            TAG_COLUMNS
        );
        self.fetch_tags(&sql, TagBinds::Pattern(&pattern, limit)).await
    }

    async fn list_interests(&self, user_id: i64) -> Result<Vec<Tag>> {
        let sql = format!(
            "SELECT {} FROM tags t JOIN user_interests ui ON ui.tag_id = t.id \
             WHERE ui.user_id = ? ORDER BY t.normalized_name ASC",
            TAG_COLUMNS
        );
        self.fetch_tags(&sql, TagBinds::User(user_id)).await
    }

    async fn interest_names(&self, user_id: i64) -> Result<Vec<String>> {
        let sql = "SELECT t.normalized_name FROM tags t JOIN user_interests ui ON ui.tag_id = t.id \
                   WHERE ui.user_id = ?";
        let names = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query_scalar(sql).bind(user_id).fetch_all(pool).await,
            Backend::Mysql(pool) => sqlx::query_scalar(sql).bind(user_id).fetch_all(pool).await,
        };
        names.context("Failed to load user interests")
    }

    async fn add_interest(&self, user_id: i64, name: &str) -> Result<Tag> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let mut tx = begin_write_sqlite(pool).await?;
                let tag_id = find_or_create_tag_sqlite(&mut tx, name).await?;
                attach_tag_sqlite(&mut tx, TagLink::Interest, user_id, tag_id).await?;
                tx.commit().await.context("Failed to commit interest")?;
            }
            Backend::Mysql(pool) => {
                let mut tx = pool.begin().await.context("Failed to begin transaction")?;
                let tag_id = find_or_create_tag_mysql(&mut tx, name).await?;
                attach_tag_mysql(&mut tx, TagLink::Interest, user_id, tag_id).await?;
                tx.commit().await.context("Failed to commit interest")?;
            }
        }
        self.get_by_name(name)
            .await?
            .context("Interest tag could not be read back")
    }

    async fn remove_interest(&self, user_id: i64, name: &str) -> Result<bool> {
        let Some(tag) = self.get_by_name(name).await? else {
            return Ok(false);
        };
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let mut tx = begin_write_sqlite(pool).await?;
                let removed = detach_tag_sqlite(&mut tx, TagLink::Interest, user_id, tag.id).await?;
                tx.commit().await.context("Failed to commit interest removal")?;
                Ok(removed)
            }
            Backend::Mysql(pool) => {
                let mut tx = pool.begin().await.context("Failed to begin transaction")?;
                let removed = detach_tag_mysql(&mut tx, TagLink::Interest, user_id, tag.id).await?;
                tx.commit().await.context("Failed to commit interest removal")?;
                Ok(removed)
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn fetch_tags_sqlite(pool: &SqlitePool, sql: &str, binds: TagBinds<'_>) -> Result<Vec<Tag>> {
    let query = sqlx::query(sql);
    let query = match binds {
        TagBinds::Limit(limit) => query.bind(limit),
        TagBinds::Name(name) => query.bind(name),
        TagBinds::Pattern(pattern, limit) => query.bind(pattern).bind(limit),
        TagBinds::User(user_id) => query.bind(user_id),
    };
    let rows = query.fetch_all(pool).await.context("Failed to load tags")?;
    Ok(rows.iter().map(row_to_tag_sqlite).collect())
}

fn row_to_tag_sqlite(row: &sqlx::sqlite::SqliteRow) -> Tag {
    Tag {
        id: row.get("id"),
        name: row.get("name"),
        usage_count: row.get("usage_count"),
        created_at: row.get("created_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn fetch_tags_mysql(pool: &MySqlPool, sql: &str, binds: TagBinds<'_>) -> Result<Vec<Tag>> {
    let query = sqlx::query(sql);
    let query = match binds {
        TagBinds::Limit(limit) => query.bind(limit),
        TagBinds::Name(name) => query.bind(name),
        TagBinds::Pattern(pattern, limit) => query.bind(pattern).bind(limit),
        TagBinds::User(user_id) => query.bind(user_id),
    };
    let rows = query.fetch_all(pool).await.context("Failed to load tags")?;
    Ok(rows.iter().map(row_to_tag_mysql).collect())
}

fn row_to_tag_mysql(row: &sqlx::mysql::MySqlRow) -> Tag {
    Tag {
        id: row.get("id"),
        name: row.get("name"),
        usage_count: row.get("usage_count"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_user, migrated_pool};

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("ML"), "%ml%");
        assert_eq!(like_pattern("100%_done!"), "%100!%!_done!!%");
    }

    #[tokio::test]
    async fn test_interests_are_idempotent_and_counted() {
        let pool = migrated_pool().await;
        let user = insert_user(&pool, "Ada").await;
        let repo = SqlxTagRepository::new(pool);

        let tag = repo.add_interest(user, "Quantum Computing").await.unwrap();
        assert_eq!(tag.name, "Quantum Computing");
        assert_eq!(tag.usage_count, 1);

        let again = repo.add_interest(user, "quantum computing").await.unwrap();
        assert_eq!(again.id, tag.id);
        assert_eq!(again.usage_count, 1);

        assert_eq!(repo.interest_names(user).await.unwrap(), vec!["quantum computing".to_string()]);
        assert_eq!(repo.list_interests(user).await.unwrap().len(), 1);

        assert!(repo.remove_interest(user, "QUANTUM computing").await.unwrap());
        assert!(!repo.remove_interest(user, "quantum computing").await.unwrap());
        assert!(!repo.remove_interest(user, "never seen").await.unwrap());

        let tag = repo.get_by_name("quantum computing").await.unwrap().unwrap();
        assert_eq!(tag.usage_count, 0);
    }

    #[tokio::test]
    async fn test_list_and_search_order_by_usage() {
        let pool = migrated_pool().await;
        let ada = insert_user(&pool, "Ada").await;
        let bob = insert_user(&pool, "Bob").await;
        let repo = SqlxTagRepository::new(pool);

        repo.add_interest(ada, "Graph Theory").await.unwrap();
        repo.add_interest(bob, "Graph Theory").await.unwrap();
        repo.add_interest(ada, "Graphics").await.unwrap();
        repo.add_interest(ada, "Biology").await.unwrap();

        let names: Vec<String> = repo.list(10).await.unwrap().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["Graph Theory", "Biology", "Graphics"]);

        let found: Vec<String> = repo
            .search("GRAPH", 20)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(found, vec!["Graph Theory", "Graphics"]);

        assert_eq!(repo.list(1).await.unwrap().len(), 1);
        assert!(repo.search("%", 20).await.unwrap().is_empty());
    }
}
