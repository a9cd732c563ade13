//! Publication repository
//!
//! Database operations for publications and their tag links. Creating,
//! retagging and deleting a publication keep tag usage counts and the
//! author's reputation consistent inside one transaction.

use crate::db::{begin_write_sqlite, Backend, DynDatabasePool};
use crate::models::{CreatePublicationInput, Publication, UpdatePublicationInput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlConnection, MySqlPool, Row, SqliteConnection, SqlitePool};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::aggregate::{
    attach_tag_mysql, attach_tag_sqlite, detach_tag_mysql, detach_tag_sqlite,
    find_or_create_tag_mysql, find_or_create_tag_sqlite, refresh_author_score_mysql,
    refresh_author_score_sqlite, TagLink,
};
use super::{placeholders, IN_CHUNK};

pub(crate) const PUBLICATION_COLUMNS: &str = "id, title, abstract_text, doi, file_url, published_date, \
     author_id, average_rating, citation_count, save_count, share_count, created_at, updated_at";

const INSERT_PUBLICATION: &str = r#"
    INSERT INTO publications (title, abstract_text, doi, file_url, published_date, author_id,
                              created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
"#;

const UPDATE_PUBLICATION: &str = r#"
    UPDATE publications SET
        title = COALESCE(?, title),
        abstract_text = COALESCE(?, abstract_text),
        doi = COALESCE(?, doi),
        file_url = COALESCE(?, file_url),
        published_date = COALESCE(?, published_date),
        updated_at = ?
    WHERE id = ?
"#;

const TAG_NAMES: &str = "SELECT pt.publication_id, t.name FROM publication_tags pt \
     JOIN tags t ON t.id = pt.tag_id";

/// Publication repository trait
#[async_trait]
pub trait PublicationRepository: Send + Sync {
    /// Insert a publication and attach its tags (found or created by name)
    async fn create(&self, author_id: i64, input: &CreatePublicationInput) -> Result<Publication>;

    /// Apply a partial update; `None` when the publication does not exist
    async fn update(&self, id: i64, input: &UpdatePublicationInput) -> Result<Option<Publication>>;

    /// Delete with all dependent facts; `false` when it did not exist
    async fn delete(&self, id: i64) -> Result<bool>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Publication>>;

    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<Publication>>;

    /// Every publication, newest first
    async fn list_all(&self) -> Result<Vec<Publication>>;

    /// An author's publications, newest first
    async fn list_by_author(&self, author_id: i64) -> Result<Vec<Publication>>;

    /// Tag display names per publication id
    async fn tag_names(&self, ids: &[i64]) -> Result<HashMap<i64, Vec<String>>>;

    /// Tag display names for the whole corpus
    async fn all_tag_names(&self) -> Result<HashMap<i64, Vec<String>>>;
}

/// SQLx-based publication repository implementation
pub struct SqlxPublicationRepository {
    pool: DynDatabasePool,
}

impl SqlxPublicationRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PublicationRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PublicationRepository for SqlxPublicationRepository {
    async fn create(&self, author_id: i64, input: &CreatePublicationInput) -> Result<Publication> {
        let id = match self.pool.backend() {
            Backend::Sqlite(pool) => create_publication_sqlite(pool, author_id, input).await?,
            Backend::Mysql(pool) => create_publication_mysql(pool, author_id, input).await?,
        };
        self.get_by_id(id)
            .await?
            .context("Created publication could not be read back")
    }

    async fn update(&self, id: i64, input: &UpdatePublicationInput) -> Result<Option<Publication>> {
        let found = match self.pool.backend() {
            Backend::Sqlite(pool) => update_publication_sqlite(pool, id, input).await?,
            Backend::Mysql(pool) => update_publication_mysql(pool, id, input).await?,
        };
        if !found {
            return Ok(None);
        }
        self.get_by_id(id).await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => delete_publication_sqlite(pool, id).await,
            Backend::Mysql(pool) => delete_publication_mysql(pool, id).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Publication>> {
        let sql = format!("SELECT {} FROM publications WHERE id = ?", PUBLICATION_COLUMNS);
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get publication by ID")?;
                Ok(row.as_ref().map(row_to_publication_sqlite))
            }
            Backend::Mysql(pool) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get publication by ID")?;
                Ok(row.as_ref().map(row_to_publication_mysql))
            }
        }
    }

    async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<Publication>> {
        let mut publications = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(IN_CHUNK) {
            let sql = format!(
                "SELECT {} FROM publications WHERE id IN ({})",
                PUBLICATION_COLUMNS,
                placeholders(chunk.len())
            );
            match self.pool.backend() {
                Backend::Sqlite(pool) => {
                    let mut query = sqlx::query(&sql);
                    for id in chunk {
                        query = query.bind(*id);
                    }
                    let rows = query
                        .fetch_all(pool)
                        .await
                        .context("Failed to get publications by IDs")?;
                    publications.extend(rows.iter().map(row_to_publication_sqlite));
                }
                Backend::Mysql(pool) => {
                    let mut query = sqlx::query(&sql);
                    for id in chunk {
                        query = query.bind(*id);
                    }
                    let rows = query
                        .fetch_all(pool)
                        .await
                        .context("Failed to get publications by IDs")?;
                    publications.extend(rows.iter().map(row_to_publication_mysql));
                }
            }
        }
        Ok(publications)
    }

    async fn list_all(&self) -> Result<Vec<Publication>> {
        let sql = format!(
            "SELECT {} FROM publications ORDER BY created_at DESC, id DESC",
            PUBLICATION_COLUMNS
        );
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(&sql)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list publications")?;
                Ok(rows.iter().map(row_to_publication_sqlite).collect())
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(&sql)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list publications")?;
                Ok(rows.iter().map(row_to_publication_mysql).collect())
            }
        }
    }

    async fn list_by_author(&self, author_id: i64) -> Result<Vec<Publication>> {
        let sql = format!(
            "SELECT {} FROM publications WHERE author_id = ? ORDER BY created_at DESC, id DESC",
            PUBLICATION_COLUMNS
        );
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(&sql)
                    .bind(author_id)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list publications by author")?;
                Ok(rows.iter().map(row_to_publication_sqlite).collect())
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(&sql)
                    .bind(author_id)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list publications by author")?;
                Ok(rows.iter().map(row_to_publication_mysql).collect())
            }
        }
    }

    async fn tag_names(&self, ids: &[i64]) -> Result<HashMap<i64, Vec<String>>> {
        let mut names: HashMap<i64, Vec<String>> = HashMap::new();
        for chunk in ids.chunks(IN_CHUNK) {
            let sql = format!(
                "{} WHERE pt.publication_id IN ({}) ORDER BY t.normalized_name",
                TAG_NAMES,
                placeholders(chunk.len())
            );
            let pairs: Vec<(i64, String)> = match self.pool.backend() {
                Backend::Sqlite(pool) => {
                    let mut query = sqlx::query_as(&sql);
                    for id in chunk {
                        query = query.bind(*id);
                    }
                    query.fetch_all(pool).await
                }
                Backend::Mysql(pool) => {
                    let mut query = sqlx::query_as(&sql);
                    for id in chunk {
                        query = query.bind(*id);
                    }
                    query.fetch_all(pool).await
                }
            }
            .context("Failed to load publication tags")?;

            for (publication_id, name) in pairs {
                names.entry(publication_id).or_default().push(name);
            }
        }
        Ok(names)
    }

    async fn all_tag_names(&self) -> Result<HashMap<i64, Vec<String>>> {
        let sql = format!("{} ORDER BY t.normalized_name", TAG_NAMES);
        let pairs: Vec<(i64, String)> = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query_as(&sql).fetch_all(pool).await,
            Backend::Mysql(pool) => sqlx::query_as(&sql).fetch_all(pool).await,
        }
        .context("Failed to load publication tags")?;

        let mut names: HashMap<i64, Vec<String>> = HashMap::new();
        for (publication_id, name) in pairs {
            names.entry(publication_id).or_default().push(name);
        }
        Ok(names)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_publication_sqlite(
    pool: &SqlitePool,
    author_id: i64,
    input: &CreatePublicationInput,
) -> Result<i64> {
    let now = Utc::now();
    let mut tx = begin_write_sqlite(pool).await?;

    let id = sqlx::query(INSERT_PUBLICATION)
        .bind(&input.title)
        .bind(&input.abstract_text)
        .bind(&input.doi)
        .bind(&input.file_url)
        .bind(input.published_date)
        .bind(author_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create publication")?
        .last_insert_rowid();

    for name in &input.tags {
        let tag_id = find_or_create_tag_sqlite(&mut tx, name).await?;
        attach_tag_sqlite(&mut tx, TagLink::Publication, id, tag_id).await?;
    }

    tx.commit().await.context("Failed to commit publication")?;
    Ok(id)
}

async fn update_publication_sqlite(
    pool: &SqlitePool,
    id: i64,
    input: &UpdatePublicationInput,
) -> Result<bool> {
    let mut tx = begin_write_sqlite(pool).await?;

    let updated = sqlx::query(UPDATE_PUBLICATION)
        .bind(&input.title)
        .bind(&input.abstract_text)
        .bind(&input.doi)
        .bind(&input.file_url)
        .bind(input.published_date)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to update publication")?
        .rows_affected();
    if updated == 0 {
        return Ok(false);
    }

    if let Some(names) = &input.tags {
        retag_sqlite(&mut tx, id, names).await?;
    }

    tx.commit().await.context("Failed to commit publication update")?;
    Ok(true)
}

/// Replace the tag set, moving usage counts only for links that change
async fn retag_sqlite(conn: &mut SqliteConnection, id: i64, names: &[String]) -> Result<()> {
    let current: HashSet<i64> =
        sqlx::query_scalar("SELECT tag_id FROM publication_tags WHERE publication_id = ?")
            .bind(id)
            .fetch_all(&mut *conn)
            .await
            .context("Failed to load current tags")?
            .into_iter()
            .collect();

    let mut wanted = HashSet::new();
    for name in names {
        wanted.insert(find_or_create_tag_sqlite(conn, name).await?);
    }

    for tag_id in current.difference(&wanted) {
        detach_tag_sqlite(conn, TagLink::Publication, id, *tag_id).await?;
    }
    for tag_id in wanted.difference(&current) {
        attach_tag_sqlite(conn, TagLink::Publication, id, *tag_id).await?;
    }
    Ok(())
}

async fn delete_publication_sqlite(pool: &SqlitePool, id: i64) -> Result<bool> {
    let mut tx = begin_write_sqlite(pool).await?;

    let author_id: Option<i64> = sqlx::query_scalar("SELECT author_id FROM publications WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to load publication author")?;
    let Some(author_id) = author_id else {
        return Ok(false);
    };

    let tag_ids: Vec<i64> =
        sqlx::query_scalar("SELECT tag_id FROM publication_tags WHERE publication_id = ?")
            .bind(id)
            .fetch_all(&mut *tx)
            .await
            .context("Failed to load publication tags")?;
    for tag_id in tag_ids {
        detach_tag_sqlite(&mut tx, TagLink::Publication, id, tag_id).await?;
    }

    // Ratings, saves and shares go with the row (ON DELETE CASCADE)
    sqlx::query("DELETE FROM publications WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete publication")?;

    refresh_author_score_sqlite(&mut tx, author_id).await?;

    tx.commit().await.context("Failed to commit publication delete")?;
    Ok(true)
}

pub(crate) fn row_to_publication_sqlite(row: &sqlx::sqlite::SqliteRow) -> Publication {
    Publication {
        id: row.get("id"),
        title: row.get("title"),
        abstract_text: row.get("abstract_text"),
        doi: row.get("doi"),
        file_url: row.get("file_url"),
        published_date: row.get("published_date"),
        author_id: row.get("author_id"),
        average_rating: row.get("average_rating"),
        citation_count: row.get("citation_count"),
        save_count: row.get("save_count"),
        share_count: row.get("share_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_publication_mysql(
    pool: &MySqlPool,
    author_id: i64,
    input: &CreatePublicationInput,
) -> Result<i64> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let id = sqlx::query(INSERT_PUBLICATION)
        .bind(&input.title)
        .bind(&input.abstract_text)
        .bind(&input.doi)
        .bind(&input.file_url)
        .bind(input.published_date)
        .bind(author_id)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create publication")?
        .last_insert_id() as i64;

    for name in &input.tags {
        let tag_id = find_or_create_tag_mysql(&mut tx, name).await?;
        attach_tag_mysql(&mut tx, TagLink::Publication, id, tag_id).await?;
    }

    tx.commit().await.context("Failed to commit publication")?;
    Ok(id)
}

async fn update_publication_mysql(
    pool: &MySqlPool,
    id: i64,
    input: &UpdatePublicationInput,
) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM publications WHERE id = ? FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to lock publication")?;
    if exists.is_none() {
        return Ok(false);
    }

    sqlx::query(UPDATE_PUBLICATION)
        .bind(&input.title)
        .bind(&input.abstract_text)
        .bind(&input.doi)
        .bind(&input.file_url)
        .bind(input.published_date)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to update publication")?;

    if let Some(names) = &input.tags {
        retag_mysql(&mut tx, id, names).await?;
    }

    tx.commit().await.context("Failed to commit publication update")?;
    Ok(true)
}

async fn retag_mysql(conn: &mut MySqlConnection, id: i64, names: &[String]) -> Result<()> {
    let current: HashSet<i64> =
        sqlx::query_scalar("SELECT tag_id FROM publication_tags WHERE publication_id = ?")
            .bind(id)
            .fetch_all(&mut *conn)
            .await
            .context("Failed to load current tags")?
            .into_iter()
            .collect();

    let mut wanted = HashSet::new();
    for name in names {
        wanted.insert(find_or_create_tag_mysql(conn, name).await?);
    }

    for tag_id in current.difference(&wanted) {
        detach_tag_mysql(conn, TagLink::Publication, id, *tag_id).await?;
    }
    for tag_id in wanted.difference(&current) {
        attach_tag_mysql(conn, TagLink::Publication, id, *tag_id).await?;
    }
    Ok(())
}

async fn delete_publication_mysql(pool: &MySqlPool, id: i64) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let author_id: Option<i64> =
        sqlx::query_scalar("SELECT author_id FROM publications WHERE id = ? FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to load publication author")?;
    let Some(author_id) = author_id else {
        return Ok(false);
    };

    let tag_ids: Vec<i64> =
        sqlx::query_scalar("SELECT tag_id FROM publication_tags WHERE publication_id = ?")
            .bind(id)
            .fetch_all(&mut *tx)
            .await
            .context("Failed to load publication tags")?;
    for tag_id in tag_ids {
        detach_tag_mysql(&mut tx, TagLink::Publication, id, tag_id).await?;
    }

    sqlx::query("DELETE FROM publications WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await
        .context("Failed to delete publication")?;

    refresh_author_score_mysql(&mut tx, author_id).await?;

    tx.commit().await.context("Failed to commit publication delete")?;
    Ok(true)
}

pub(crate) fn row_to_publication_mysql(row: &sqlx::mysql::MySqlRow) -> Publication {
    Publication {
        id: row.get("id"),
        title: row.get("title"),
        abstract_text: row.get("abstract_text"),
        doi: row.get("doi"),
        file_url: row.get("file_url"),
        published_date: row.get("published_date"),
        author_id: row.get("author_id"),
        average_rating: row.get("average_rating"),
        citation_count: row.get("citation_count"),
        save_count: row.get("save_count"),
        share_count: row.get("share_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_user, migrated_pool, scalar_i64};

    async fn usage(pool: &DynDatabasePool, name: &str) -> i64 {
        sqlx::query_scalar("SELECT usage_count FROM tags WHERE normalized_name = ?")
            .bind(name)
            .fetch_one(pool.as_sqlite().unwrap())
            .await
            .expect("tag should exist")
    }

    #[tokio::test]
    async fn test_create_attaches_tags_and_counts_usage() {
        let pool = migrated_pool().await;
        let author = insert_user(&pool, "Author").await;
        let repo = SqlxPublicationRepository::new(pool.clone());

        let first = repo
            .create(author, &CreatePublicationInput::new("First").with_tags(["Graphs", "ML"]))
            .await
            .unwrap();
        repo.create(author, &CreatePublicationInput::new("Second").with_tags(["graphs"]))
            .await
            .unwrap();

        assert_eq!(first.title, "First");
        assert_eq!(first.save_count, 0);
        assert_eq!(usage(&pool, "graphs").await, 2);
        assert_eq!(usage(&pool, "ml").await, 1);

        let names = repo.tag_names(&[first.id]).await.unwrap();
        assert_eq!(names[&first.id], vec!["Graphs".to_string(), "ML".to_string()]);
    }

    #[tokio::test]
    async fn test_update_retags_with_usage_diff() {
        let pool = migrated_pool().await;
        let author = insert_user(&pool, "Author").await;
        let repo = SqlxPublicationRepository::new(pool.clone());

        let publication = repo
            .create(author, &CreatePublicationInput::new("Paper").with_tags(["a", "b"]))
            .await
            .unwrap();

        let input = UpdatePublicationInput {
            title: Some("Paper v2".to_string()),
            tags: Some(vec!["b".to_string(), "c".to_string()]),
            ..Default::default()
        };
        let updated = repo.update(publication.id, &input).await.unwrap().unwrap();

        assert_eq!(updated.title, "Paper v2");
        assert_eq!(usage(&pool, "a").await, 0);
        assert_eq!(usage(&pool, "b").await, 1);
        assert_eq!(usage(&pool, "c").await, 1);

        assert!(repo.update(999, &input).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_cascades_and_releases_tags() {
        let pool = migrated_pool().await;
        let author = insert_user(&pool, "Author").await;
        let reader = insert_user(&pool, "Reader").await;
        let repo = SqlxPublicationRepository::new(pool.clone());

        let publication = repo
            .create(author, &CreatePublicationInput::new("Doomed").with_tags(["x"]))
            .await
            .unwrap();
        sqlx::query("INSERT INTO ratings (publication_id, user_id, score) VALUES (?, ?, 5)")
            .bind(publication.id)
            .bind(reader)
            .execute(pool.as_sqlite().unwrap())
            .await
            .unwrap();
        sqlx::query("UPDATE users SET avg_score = 5 WHERE id = ?")
            .bind(author)
            .execute(pool.as_sqlite().unwrap())
            .await
            .unwrap();

        assert!(repo.delete(publication.id).await.unwrap());
        assert!(!repo.delete(publication.id).await.unwrap());

        assert!(repo.get_by_id(publication.id).await.unwrap().is_none());
        assert_eq!(usage(&pool, "x").await, 0);
        assert_eq!(scalar_i64(&pool, "SELECT COUNT(*) FROM ratings WHERE publication_id = ?", publication.id).await, 0);
        let score: f64 = sqlx::query_scalar("SELECT avg_score FROM users WHERE id = ?")
            .bind(author)
            .fetch_one(pool.as_sqlite().unwrap())
            .await
            .unwrap();
        assert_eq!(score, 0.0);
    }

    #[tokio::test]
    async fn test_list_orders_newest_first() {
        let pool = migrated_pool().await;
        let author = insert_user(&pool, "Author").await;
        let other = insert_user(&pool, "Other").await;
        let repo = SqlxPublicationRepository::new(pool);

        let a = repo.create(author, &CreatePublicationInput::new("A")).await.unwrap();
        let b = repo.create(author, &CreatePublicationInput::new("B")).await.unwrap();
        repo.create(other, &CreatePublicationInput::new("C")).await.unwrap();

        let mine: Vec<i64> = repo.list_by_author(author).await.unwrap().iter().map(|p| p.id).collect();
        assert_eq!(mine, vec![b.id, a.id]);
        assert_eq!(repo.list_all().await.unwrap().len(), 3);
        assert_eq!(repo.get_by_ids(&[a.id, b.id]).await.unwrap().len(), 2);
    }
}
