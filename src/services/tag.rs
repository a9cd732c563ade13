//! Tag service
//!
//! Tag listing/search and the user's interest set. Interests are tags
//! attached to a user; they feed the topic component of the feed score.

use crate::db::repositories::TagRepository;
use crate::models::{normalize_tag_name, Tag, MAX_TAG_NAME_LEN};
use std::sync::Arc;

/// Default size of the tag listing
pub const DEFAULT_LIST_LIMIT: i64 = 100;
/// Upper bound on the tag listing size
pub const MAX_LIST_LIMIT: i64 = 500;
/// Search returns at most this many tags
pub const SEARCH_LIMIT: i64 = 20;

/// Error types for tag service operations
#[derive(Debug, thiserror::Error)]
pub enum TagServiceError {
    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Tag service for listings and interests
pub struct TagService {
    repo: Arc<dyn TagRepository>,
}

impl TagService {
    pub fn new(repo: Arc<dyn TagRepository>) -> Self {
        Self { repo }
    }

    /// Most used first; `limit` is clamped to `1..=MAX_LIST_LIMIT`
    pub async fn list(&self, limit: Option<i64>) -> Result<Vec<Tag>, TagServiceError> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        Ok(self.repo.list(limit).await?)
    }

    /// Case-insensitive substring search; a blank query finds nothing
    pub async fn search(&self, query: &str) -> Result<Vec<Tag>, TagServiceError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.repo.search(query, SEARCH_LIMIT).await?)
    }

    pub async fn interests(&self, user_id: i64) -> Result<Vec<Tag>, TagServiceError> {
        Ok(self.repo.list_interests(user_id).await?)
    }

    /// Idempotent: adding an existing interest returns it unchanged
    pub async fn add_interest(&self, user_id: i64, name: &str) -> Result<Tag, TagServiceError> {
        let name = validate_name(name)?;
        let tag = self.repo.add_interest(user_id, &name).await?;
        tracing::debug!(user_id, tag_id = tag.id, "Interest added");
        Ok(tag)
    }

    /// `false` when the user did not have the interest
    pub async fn remove_interest(&self, user_id: i64, name: &str) -> Result<bool, TagServiceError> {
        if normalize_tag_name(name).is_none() {
            return Ok(false);
        }
        let removed = self.repo.remove_interest(user_id, name).await?;
        tracing::debug!(user_id, removed, "Interest removal");
        Ok(removed)
    }
}

fn validate_name(name: &str) -> Result<String, TagServiceError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(TagServiceError::ValidationError(
            "Tag name cannot be empty".to_string(),
        ));
    }
    if trimmed.chars().count() > MAX_TAG_NAME_LEN {
        return Err(TagServiceError::ValidationError(format!(
            "Tag name must be at most {} characters",
            MAX_TAG_NAME_LEN
        )));
    }
    Ok(trimmed.to_string())
}
