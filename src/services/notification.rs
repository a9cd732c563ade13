//! Notification service
//!
//! Two halves:
//! - `NotificationDispatcher` turns committed social events (rating, share,
//!   follow) into inbox rows. It is best-effort: a failed write is logged and
//!   dropped, never surfaced to the mutation that triggered it.
//! - `NotificationService` is the recipient-scoped inbox.

use crate::db::repositories::NotificationRepository;
use crate::models::{NewNotification, Notification, NotificationType, Publication, User};
use std::sync::Arc;

/// Error types for notification service operations
#[derive(Debug, thiserror::Error)]
pub enum NotificationServiceError {
    #[error("Notification not found: {0}")]
    NotFound(String),

    /// The notification belongs to someone else
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Creates notifications for social events after their mutation committed
#[derive(Clone)]
pub struct NotificationDispatcher {
    repo: Arc<dyn NotificationRepository>,
}

impl NotificationDispatcher {
    pub fn new(repo: Arc<dyn NotificationRepository>) -> Self {
        Self { repo }
    }

    /// `rater` scored `publication`; the author is told unless they rated
    /// their own work.
    pub async fn on_rated(&self, publication: &Publication, rater: &User, score: i32) {
        if rater.id == publication.author_id {
            return;
        }
        let notification = NewNotification {
            recipient_id: publication.author_id,
            title: "Publication Rated".to_string(),
            message: format!(
                "{} rated your publication {}: \"{}\"",
                rater.full_name, score, publication.title
            ),
            notification_type: NotificationType::PublicationRated,
            target_url: Some(profile_url(rater.id)),
            actor_id: Some(rater.id),
            actor_name: Some(rater.full_name.clone()),
            actor_image_url: rater.profile_image_url.clone(),
        };
        self.deliver(notification).await;
    }

    pub async fn on_shared(&self, publication: &Publication, sharer: &User) {
        if sharer.id == publication.author_id {
            return;
        }
        let notification = NewNotification {
            recipient_id: publication.author_id,
            title: "Publication Shared".to_string(),
            message: format!(
                "{} shared your publication: \"{}\"",
                sharer.full_name, publication.title
            ),
            notification_type: NotificationType::PublicationShared,
            target_url: Some(profile_url(sharer.id)),
            actor_id: Some(sharer.id),
            actor_name: Some(sharer.full_name.clone()),
            actor_image_url: sharer.profile_image_url.clone(),
        };
        self.deliver(notification).await;
    }

    pub async fn on_followed(&self, followee_id: i64, follower: &User) {
        if follower.id == followee_id {
            return;
        }
        let notification = NewNotification {
            recipient_id: followee_id,
            title: "New Follower".to_string(),
            message: format!("{} started following you", follower.full_name),
            notification_type: NotificationType::NewFollower,
            target_url: Some(profile_url(follower.id)),
            actor_id: Some(follower.id),
            actor_name: Some(follower.full_name.clone()),
            actor_image_url: follower.profile_image_url.clone(),
        };
        self.deliver(notification).await;
    }

    async fn deliver(&self, notification: NewNotification) {
        let recipient_id = notification.recipient_id;
        let kind = notification.notification_type;
        match self.repo.create(&notification).await {
            Ok(created) => {
                tracing::debug!(id = created.id, recipient_id, %kind, "Notification created");
            }
            Err(e) => {
                tracing::warn!(recipient_id, %kind, "Failed to create notification: {:#}", e);
            }
        }
    }
}

fn profile_url(user_id: i64) -> String {
    format!("/profile/{}", user_id)
}

/// Inbox operations, always on behalf of the recipient
pub struct NotificationService {
    repo: Arc<dyn NotificationRepository>,
    list_limit: i64,
}

impl NotificationService {
    pub fn new(repo: Arc<dyn NotificationRepository>, list_limit: u32) -> Self {
        Self {
            repo,
            list_limit: i64::from(list_limit.max(1)),
        }
    }

    /// Newest first, capped at the configured limit
    pub async fn list(&self, recipient_id: i64) -> Result<Vec<Notification>, NotificationServiceError> {
        Ok(self
            .repo
            .list_for_recipient(recipient_id, self.list_limit)
            .await?)
    }

    pub async fn unread_count(&self, recipient_id: i64) -> Result<i64, NotificationServiceError> {
        Ok(self.repo.unread_count(recipient_id).await?)
    }

    /// Idempotent: marking an already-read notification succeeds
    pub async fn mark_read(&self, id: i64, recipient_id: i64) -> Result<(), NotificationServiceError> {
        self.owned(id, recipient_id).await?;
        self.repo.mark_read(id).await?;
        Ok(())
    }

    pub async fn mark_all_read(&self, recipient_id: i64) -> Result<u64, NotificationServiceError> {
        let updated = self.repo.mark_all_read(recipient_id).await?;
        tracing::debug!(recipient_id, updated, "Marked notifications read");
        Ok(updated)
    }

    pub async fn delete(&self, id: i64, recipient_id: i64) -> Result<(), NotificationServiceError> {
        self.owned(id, recipient_id).await?;
        if !self.repo.delete(id).await? {
            return Err(NotificationServiceError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn owned(&self, id: i64, recipient_id: i64) -> Result<Notification, NotificationServiceError> {
        let notification = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| NotificationServiceError::NotFound(id.to_string()))?;
        if notification.recipient_id != recipient_id {
            return Err(NotificationServiceError::Forbidden(
                "Notification belongs to another user".to_string(),
            ));
        }
        Ok(notification)
    }
}
