//! Interaction service
//!
//! Entry point for every mutation that moves a derived aggregate: rating,
//! saving, sharing and following. Inputs are validated before any write; the
//! repositories apply the fact and its aggregates in one transaction; the
//! notification dispatcher runs only after that transaction committed.

use crate::db::repositories::{
    FollowRepository, InteractionRepository, PublicationRepository, UserRepository, WriteOutcome,
};
use crate::models::{
    FollowState, RatingSummary, SaveState, Share, ShareState, User, MAX_SCORE, MIN_SCORE,
};
use crate::services::notification::NotificationDispatcher;
use std::sync::Arc;

/// Longest accepted share note, in characters
pub const MAX_NOTE_LEN: usize = 1000;

/// Error types for interaction service operations
#[derive(Debug, thiserror::Error)]
pub enum InteractionServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Uniqueness constraint hit (duplicate share/follow, lost save race)
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct InteractionService {
    interactions: Arc<dyn InteractionRepository>,
    follows: Arc<dyn FollowRepository>,
    publications: Arc<dyn PublicationRepository>,
    users: Arc<dyn UserRepository>,
    dispatcher: NotificationDispatcher,
}

impl InteractionService {
    pub fn new(
        interactions: Arc<dyn InteractionRepository>,
        follows: Arc<dyn FollowRepository>,
        publications: Arc<dyn PublicationRepository>,
        users: Arc<dyn UserRepository>,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            interactions,
            follows,
            publications,
            users,
            dispatcher,
        }
    }

    /// Create or replace `user`'s rating of a publication
    pub async fn rate(
        &self,
        publication_id: i64,
        user: &User,
        score: i32,
    ) -> Result<RatingSummary, InteractionServiceError> {
        if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
            return Err(InteractionServiceError::ValidationError(format!(
                "Score must be between {} and {}",
                MIN_SCORE, MAX_SCORE
            )));
        }

        let publication = self
            .interactions
            .upsert_rating(publication_id, user.id, score)
            .await?
            .ok_or_else(|| publication_not_found(publication_id))?;

        tracing::info!(
            publication_id,
            user_id = user.id,
            score,
            average = publication.average_rating,
            "Publication rated"
        );
        self.dispatcher.on_rated(&publication, user, score).await;

        Ok(RatingSummary {
            average_rating: publication.average_rating,
            user_rating: Some(score),
        })
    }

    /// Withdraw `user_id`'s rating; withdrawing a missing rating is a no-op
    pub async fn remove_rating(
        &self,
        publication_id: i64,
        user_id: i64,
    ) -> Result<RatingSummary, InteractionServiceError> {
        let publication = self
            .interactions
            .delete_rating(publication_id, user_id)
            .await?
            .ok_or_else(|| publication_not_found(publication_id))?;

        tracing::info!(publication_id, user_id, "Rating removed");
        Ok(RatingSummary {
            average_rating: publication.average_rating,
            user_rating: None,
        })
    }

    pub async fn toggle_save(
        &self,
        publication_id: i64,
        user_id: i64,
    ) -> Result<SaveState, InteractionServiceError> {
        match self.interactions.toggle_save(publication_id, user_id).await? {
            WriteOutcome::Applied(state) => {
                tracing::debug!(publication_id, user_id, saved = state.saved, "Save toggled");
                Ok(state)
            }
            WriteOutcome::NotFound => Err(publication_not_found(publication_id)),
            WriteOutcome::Conflict => Err(InteractionServiceError::Conflict(
                "Save state changed concurrently, retry".to_string(),
            )),
        }
    }

    pub async fn share(
        &self,
        publication_id: i64,
        user: &User,
        note: Option<&str>,
    ) -> Result<ShareState, InteractionServiceError> {
        let note = clean_note(note)?;
        let (share, state) = match self
            .interactions
            .create_share(publication_id, user.id, note.as_deref())
            .await?
        {
            WriteOutcome::Applied(applied) => applied,
            WriteOutcome::NotFound => return Err(publication_not_found(publication_id)),
            WriteOutcome::Conflict => {
                return Err(InteractionServiceError::Conflict(
                    "Publication already shared".to_string(),
                ))
            }
        };
        tracing::info!(publication_id, user_id = user.id, share_id = share.id, "Publication shared");

        // The share is committed; a failed lookup only costs the notification
        match self.publications.get_by_id(publication_id).await {
            Ok(Some(publication)) => self.dispatcher.on_shared(&publication, user).await,
            Ok(None) => {}
            Err(e) => tracing::warn!(publication_id, "Skipping share notification: {:#}", e),
        }

        Ok(state)
    }

    /// Replace the note of an existing share; identity and time are kept
    pub async fn update_share_note(
        &self,
        publication_id: i64,
        user_id: i64,
        note: Option<&str>,
    ) -> Result<Share, InteractionServiceError> {
        let note = clean_note(note)?;
        match self
            .interactions
            .update_share_note(publication_id, user_id, note.as_deref())
            .await?
        {
            WriteOutcome::Applied(share) => Ok(share),
            WriteOutcome::NotFound | WriteOutcome::Conflict => Err(share_not_found(publication_id)),
        }
    }

    pub async fn unshare(
        &self,
        publication_id: i64,
        user_id: i64,
    ) -> Result<ShareState, InteractionServiceError> {
        match self.interactions.delete_share(publication_id, user_id).await? {
            WriteOutcome::Applied(state) => {
                tracing::info!(publication_id, user_id, "Share removed");
                Ok(state)
            }
            WriteOutcome::NotFound | WriteOutcome::Conflict => Err(share_not_found(publication_id)),
        }
    }

    pub async fn follow(
        &self,
        follower: &User,
        followee_id: i64,
    ) -> Result<FollowState, InteractionServiceError> {
        if follower.id == followee_id {
            return Err(InteractionServiceError::ValidationError(
                "Users cannot follow themselves".to_string(),
            ));
        }
        match self.follows.follow(follower.id, followee_id).await? {
            WriteOutcome::Applied(state) => {
                tracing::info!(follower_id = follower.id, followee_id, "User followed");
                self.dispatcher.on_followed(followee_id, follower).await;
                Ok(state)
            }
            WriteOutcome::NotFound => Err(InteractionServiceError::NotFound(format!(
                "User {}",
                followee_id
            ))),
            WriteOutcome::Conflict => Err(InteractionServiceError::Conflict(
                "Already following this user".to_string(),
            )),
        }
    }

    pub async fn unfollow(
        &self,
        follower_id: i64,
        followee_id: i64,
    ) -> Result<FollowState, InteractionServiceError> {
        if follower_id == followee_id {
            return Err(InteractionServiceError::ValidationError(
                "Users cannot follow themselves".to_string(),
            ));
        }
        match self.follows.unfollow(follower_id, followee_id).await? {
            WriteOutcome::Applied(state) => {
                tracing::info!(follower_id, followee_id, "User unfollowed");
                Ok(state)
            }
            WriteOutcome::NotFound | WriteOutcome::Conflict => Err(
                InteractionServiceError::NotFound(format!("Not following user {}", followee_id)),
            ),
        }
    }

    /// Follow state between two users as seen from `follower_id`
    pub async fn follow_state(
        &self,
        follower_id: i64,
        followee_id: i64,
    ) -> Result<FollowState, InteractionServiceError> {
        let following = self.follows.is_following(follower_id, followee_id).await?;
        let followee = self
            .users
            .get_by_id(followee_id)
            .await?
            .ok_or_else(|| InteractionServiceError::NotFound(format!("User {}", followee_id)))?;
        let follower = self
            .users
            .get_by_id(follower_id)
            .await?
            .ok_or_else(|| InteractionServiceError::NotFound(format!("User {}", follower_id)))?;
        Ok(FollowState {
            following,
            follower_count: followee.follower_count,
            following_count: follower.following_count,
        })
    }
}

fn publication_not_found(id: i64) -> InteractionServiceError {
    InteractionServiceError::NotFound(format!("Publication {}", id))
}

fn share_not_found(publication_id: i64) -> InteractionServiceError {
    InteractionServiceError::NotFound(format!("No share of publication {}", publication_id))
}

/// Trim; blank becomes `None`
fn clean_note(note: Option<&str>) -> Result<Option<String>, InteractionServiceError> {
    let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    if note.chars().count() > MAX_NOTE_LEN {
        return Err(InteractionServiceError::ValidationError(format!(
            "Share note must be at most {} characters",
            MAX_NOTE_LEN
        )));
    }
    Ok(Some(note.to_string()))
}
