//! Notification repository
//!
//! Inbox storage. Ownership checks live in the service; every query here is
//! keyed by notification id or recipient id.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{NewNotification, Notification};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const NOTIFICATION_COLUMNS: &str = "id, recipient_id, title, message, notification_type, \
     target_url, is_read, actor_id, actor_name, actor_image_url, created_at";

const INSERT_NOTIFICATION: &str = r#"
    INSERT INTO notifications (recipient_id, title, message, notification_type, target_url,
                               is_read, actor_id, actor_name, actor_image_url, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

/// Notification repository trait
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create(&self, notification: &NewNotification) -> Result<Notification>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Notification>>;

    /// Newest first, ties broken by id descending
    async fn list_for_recipient(&self, recipient_id: i64, limit: i64) -> Result<Vec<Notification>>;

    async fn unread_count(&self, recipient_id: i64) -> Result<i64>;

    /// `false` when the notification does not exist
    async fn mark_read(&self, id: i64) -> Result<bool>;

    /// Number of notifications flipped from unread to read
    async fn mark_all_read(&self, recipient_id: i64) -> Result<u64>;

    async fn delete(&self, id: i64) -> Result<bool>;
}

/// SQLx-based notification repository implementation
pub struct SqlxNotificationRepository {
    pool: DynDatabasePool,
}

impl SqlxNotificationRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn NotificationRepository> {
        Arc::new(Self::new(pool))
    }

    async fn execute_by_id(&self, sql: &str, id: i64) -> Result<u64> {
        let affected = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
            Backend::Mysql(pool) => sqlx::query(sql)
                .bind(id)
                .execute(pool)
                .await
                .map(|r| r.rows_affected()),
        };
        affected.context("Failed to update notification")
    }
}

#[async_trait]
impl NotificationRepository for SqlxNotificationRepository {
    async fn create(&self, notification: &NewNotification) -> Result<Notification> {
        let id = match self.pool.backend() {
            Backend::Sqlite(pool) => create_notification_sqlite(pool, notification).await?,
            Backend::Mysql(pool) => create_notification_mysql(pool, notification).await?,
        };
        self.get_by_id(id)
            .await?
            .context("Created notification could not be read back")
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Notification>> {
        let sql = format!("SELECT {} FROM notifications WHERE id = ?", NOTIFICATION_COLUMNS);
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get notification by ID")?;
                row.as_ref().map(row_to_notification_sqlite).transpose()
            }
            Backend::Mysql(pool) => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(pool)
                    .await
                    .context("Failed to get notification by ID")?;
                row.as_ref().map(row_to_notification_mysql).transpose()
            }
        }
    }

    async fn list_for_recipient(&self, recipient_id: i64, limit: i64) -> Result<Vec<Notification>> {
        let sql = format!(
            "SELECT {} FROM notifications WHERE recipient_id = ? \
             ORDER BY created_at DESC, id DESC LIMIT ?",
            NOTIFICATION_COLUMNS
        );
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let rows = sqlx::query(&sql)
                    .bind(recipient_id)
                    .bind(limit)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list notifications")?;
                rows.iter().map(row_to_notification_sqlite).collect()
            }
            Backend::Mysql(pool) => {
                let rows = sqlx::query(&sql)
                    .bind(recipient_id)
                    .bind(limit)
                    .fetch_all(pool)
                    .await
                    .context("Failed to list notifications")?;
                rows.iter().map(row_to_notification_mysql).collect()
            }
        }
    }

    async fn unread_count(&self, recipient_id: i64) -> Result<i64> {
        let sql = "SELECT COUNT(*) FROM notifications WHERE recipient_id = ? AND is_read = FALSE";
        let count = match self.pool.backend() {
            Backend::Sqlite(pool) => sqlx::query_scalar(sql).bind(recipient_id).fetch_one(pool).await,
            Backend::Mysql(pool) => sqlx::query_scalar(sql).bind(recipient_id).fetch_one(pool).await,
        };
        count.context("Failed to count unread notifications")
    }

    async fn mark_read(&self, id: i64) -> Result<bool> {
        // A no-op update still matches the row on SQLite but not on MySQL,
        // so existence is decided by a lookup.
        if self.get_by_id(id).await?.is_none() {
            return Ok(false);
        }
        self.execute_by_id("UPDATE notifications SET is_read = TRUE WHERE id = ?", id)
            .await?;
        Ok(true)
    }

    async fn mark_all_read(&self, recipient_id: i64) -> Result<u64> {
        self.execute_by_id(
            "UPDATE notifications SET is_read = TRUE WHERE recipient_id = ? AND is_read = FALSE",
            recipient_id,
        )
        .await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let removed = self
            .execute_by_id("DELETE FROM notifications WHERE id = ?", id)
            .await?;
        Ok(removed > 0)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_notification_sqlite(pool: &SqlitePool, n: &NewNotification) -> Result<i64> {
    let result = sqlx::query(INSERT_NOTIFICATION)
        .bind(n.recipient_id)
        .bind(&n.title)
        .bind(&n.message)
        .bind(n.notification_type.as_str())
        .bind(&n.target_url)
        .bind(false)
        .bind(n.actor_id)
        .bind(&n.actor_name)
        .bind(&n.actor_image_url)
        .bind(Utc::now())
        .execute(pool)
        .await
        .context("Failed to create notification")?;

    Ok(result.last_insert_rowid())
}

fn row_to_notification_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Notification> {
    let kind: String = row.get("notification_type");
    Ok(Notification {
        id: row.get("id"),
        recipient_id: row.get("recipient_id"),
        title: row.get("title"),
        message: row.get("message"),
        notification_type: kind.parse()?,
        target_url: row.get("target_url"),
        is_read: row.get("is_read"),
        actor_id: row.get("actor_id"),
        actor_name: row.get("actor_name"),
        actor_image_url: row.get("actor_image_url"),
        created_at: row.get("created_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_notification_mysql(pool: &MySqlPool, n: &NewNotification) -> Result<i64> {
    let result = sqlx::query(INSERT_NOTIFICATION)
        .bind(n.recipient_id)
        .bind(&n.title)
        .bind(&n.message)
        .bind(n.notification_type.as_str())
        .bind(&n.target_url)
        .bind(false)
        .bind(n.actor_id)
        .bind(&n.actor_name)
        .bind(&n.actor_image_url)
        .bind(Utc::now())
        .execute(pool)
        .await
        .context("Failed to create notification")?;

    Ok(result.last_insert_id() as i64)
}

fn row_to_notification_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Notification> {
    let kind: String = row.get("notification_type");
    Ok(Notification {
        id: row.get("id"),
        recipient_id: row.get("recipient_id"),
        title: row.get("title"),
        message: row.get("message"),
        notification_type: kind.parse()?,
        target_url: row.get("target_url"),
        is_read: row.get("is_read"),
        actor_id: row.get("actor_id"),
        actor_name: row.get("actor_name"),
        actor_image_url: row.get("actor_image_url"),
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_user, migrated_pool};
    use crate::models::NotificationType;

    fn rated(recipient_id: i64, actor_id: i64) -> NewNotification {
        NewNotification {
            recipient_id,
            title: "Publication Rated".to_string(),
            message: "Someone rated your publication".to_string(),
            notification_type: NotificationType::PublicationRated,
            target_url: Some(format!("/profile/{}", actor_id)),
            actor_id: Some(actor_id),
            actor_name: Some("Bob".to_string()),
            actor_image_url: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_list_newest_first() {
        let pool = migrated_pool().await;
        let ada = insert_user(&pool, "Ada").await;
        let bob = insert_user(&pool, "Bob").await;
        let repo = SqlxNotificationRepository::new(pool);

        let first = repo.create(&rated(ada, bob)).await.unwrap();
        let second = repo.create(&rated(ada, bob)).await.unwrap();
        repo.create(&rated(bob, ada)).await.unwrap();

        assert_eq!(first.notification_type, NotificationType::PublicationRated);
        assert!(!first.is_read);
        assert_eq!(first.actor_name.as_deref(), Some("Bob"));

        let inbox: Vec<i64> = repo
            .list_for_recipient(ada, 50)
            .await
            .unwrap()
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(inbox, vec![second.id, first.id]);
        assert_eq!(repo.list_for_recipient(ada, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_read_state_and_delete() {
        let pool = migrated_pool().await;
        let ada = insert_user(&pool, "Ada").await;
        let bob = insert_user(&pool, "Bob").await;
        let repo = SqlxNotificationRepository::new(pool);

        let first = repo.create(&rated(ada, bob)).await.unwrap();
        repo.create(&rated(ada, bob)).await.unwrap();
        repo.create(&rated(ada, bob)).await.unwrap();
        assert_eq!(repo.unread_count(ada).await.unwrap(), 3);

        assert!(repo.mark_read(first.id).await.unwrap());
        assert!(repo.mark_read(first.id).await.unwrap());
        assert!(!repo.mark_read(999).await.unwrap());
        assert_eq!(repo.unread_count(ada).await.unwrap(), 2);

        assert_eq!(repo.mark_all_read(ada).await.unwrap(), 2);
        assert_eq!(repo.unread_count(ada).await.unwrap(), 0);

        assert!(repo.delete(first.id).await.unwrap());
        assert!(!repo.delete(first.id).await.unwrap());
        assert!(repo.get_by_id(first.id).await.unwrap().is_none());
    }
}
