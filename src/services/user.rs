//! User service
//!
//! Session-token identity, user lookup and the follower/following listings.
//! Account registration proper belongs to the identity provider; `register`
//! only creates the local user row the rest of the system references.

use crate::db::is_unique_violation;
use crate::db::repositories::{FollowRepository, SessionRepository, UserRepository};
use crate::models::{paginate, CreateUserInput, ListParams, PagedResult, Session, User, UserSummary};
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    #[error("User not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Email already registered
    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct UserService {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    follows: Arc<dyn FollowRepository>,
    session_ttl: Duration,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        follows: Arc<dyn FollowRepository>,
        session_ttl_hours: i64,
    ) -> Self {
        Self {
            users,
            sessions,
            follows,
            session_ttl: Duration::hours(session_ttl_hours.max(1)),
        }
    }

    /// Create the local user row
    pub async fn register(&self, input: CreateUserInput) -> Result<User, UserServiceError> {
        let email = input.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(UserServiceError::ValidationError(
                "A valid email is required".to_string(),
            ));
        }
        if input.full_name.trim().is_empty() {
            return Err(UserServiceError::ValidationError(
                "Full name is required".to_string(),
            ));
        }

        let input = CreateUserInput {
            email: email.to_lowercase(),
            full_name: input.full_name.trim().to_string(),
            ..input
        };
        match self.users.create(&input).await {
            Ok(user) => {
                tracing::info!(user_id = user.id, "User registered");
                Ok(user)
            }
            Err(e) if e.downcast_ref::<sqlx::Error>().is_some_and(is_unique_violation) => {
                Err(UserServiceError::UserExists(input.email))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Issue a session token for an existing user
    pub async fn create_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        self.require(user_id).await?;
        let session = Session::issue(user_id, self.session_ttl);
        Ok(self.sessions.create(&session).await?)
    }

    /// Resolve a token to its user. Unknown or expired tokens yield `None`;
    /// expired ones are removed on the way.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let Some(session) = self.sessions.get_by_id(token).await? else {
            return Ok(None);
        };
        if session.is_expired_at(Utc::now()) {
            self.sessions.delete(token).await?;
            return Ok(None);
        }
        Ok(self.users.get_by_id(session.user_id).await?)
    }

    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        Ok(self.sessions.delete(token).await?)
    }

    /// Drop every expired session; returns how many were removed
    pub async fn purge_expired_sessions(&self) -> Result<u64, UserServiceError> {
        Ok(self.sessions.delete_expired(Utc::now()).await?)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<User, UserServiceError> {
        self.require(id).await
    }

    /// Users following `user_id`, most recent first
    pub async fn followers(
        &self,
        user_id: i64,
        params: ListParams,
    ) -> Result<PagedResult<UserSummary>, UserServiceError> {
        self.require(user_id).await?;
        let ids = self.follows.follower_ids(user_id).await?;
        self.summaries_page(ids, &params).await
    }

    /// Users `user_id` follows, most recent first
    pub async fn following(
        &self,
        user_id: i64,
        params: ListParams,
    ) -> Result<PagedResult<UserSummary>, UserServiceError> {
        self.require(user_id).await?;
        let ids = self.follows.following_ids(user_id).await?;
        self.summaries_page(ids, &params).await
    }

    async fn summaries_page(
        &self,
        ids: Vec<i64>,
        params: &ListParams,
    ) -> Result<PagedResult<UserSummary>, UserServiceError> {
        let page = paginate(ids, params);
        let mut found: HashMap<i64, User> = self
            .users
            .get_by_ids(&page.items)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();
        let items = page
            .items
            .iter()
            .filter_map(|id| found.remove(id))
            .map(|u| u.summary())
            .collect();
        Ok(PagedResult::new(items, page.total_count, params))
    }

    async fn require(&self, id: i64) -> Result<User, UserServiceError> {
        self.users
            .get_by_id(id)
            .await?
            .ok_or_else(|| UserServiceError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxFollowRepository, SqlxSessionRepository, SqlxUserRepository};
    use crate::db::repositories::test_support::migrated_pool;
    use crate::db::DynDatabasePool;

    async fn setup() -> (DynDatabasePool, UserService) {
        let pool = migrated_pool().await;
        let service = UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
            SqlxFollowRepository::boxed(pool.clone()),
            24,
        );
        (pool, service)
    }

    #[tokio::test]
    async fn test_register_validates_and_rejects_duplicates() {
        let (_pool, service) = setup().await;

        let user = service
            .register(CreateUserInput::new(" Ada@Example.org ", " Ada Lovelace "))
            .await
            .unwrap();
        assert_eq!(user.full_name, "Ada Lovelace");
        assert_eq!(user.email, "ada@example.org");

        assert!(matches!(
            service.register(CreateUserInput::new("ada@example.org", "Ada")).await,
            Err(UserServiceError::UserExists(_))
        ));
        assert!(matches!(
            service.register(CreateUserInput::new("not-an-email", "X")).await,
            Err(UserServiceError::ValidationError(_))
        ));
        assert!(matches!(
            service.register(CreateUserInput::new("x@example.org", "  ")).await,
            Err(UserServiceError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let (pool, service) = setup().await;
        let user = service
            .register(CreateUserInput::new("ada@example.org", "Ada"))
            .await
            .unwrap();

        let session = service.create_session(user.id).await.unwrap();
        let resolved = service.validate_session(&session.id).await.unwrap().unwrap();
        assert_eq!(resolved.id, user.id);

        service.logout(&session.id).await.unwrap();
        assert!(service.validate_session(&session.id).await.unwrap().is_none());
        assert!(service.validate_session("bogus").await.unwrap().is_none());

        let stale = Session::issue(user.id, Duration::seconds(-1));
        SqlxSessionRepository::new(pool).create(&stale).await.unwrap();
        assert!(service.validate_session(&stale.id).await.unwrap().is_none());
        assert_eq!(service.purge_expired_sessions().await.unwrap(), 0);

        assert!(matches!(
            service.create_session(999).await,
            Err(UserServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_follow_listings() {
        let (pool, service) = setup().await;
        let ada = service.register(CreateUserInput::new("ada@example.org", "Ada")).await.unwrap();
        let bob = service.register(CreateUserInput::new("bob@example.org", "Bob")).await.unwrap();
        let cyd = service.register(CreateUserInput::new("cyd@example.org", "Cyd")).await.unwrap();
        let follows = SqlxFollowRepository::new(pool);
        follows.follow(bob.id, ada.id).await.unwrap();
        follows.follow(cyd.id, ada.id).await.unwrap();

        let followers = service.followers(ada.id, ListParams::new(1, 10)).await.unwrap();
        assert_eq!(followers.total_count, 2);
        let mut names: Vec<String> = followers.items.into_iter().map(|u| u.full_name).collect();
        names.sort();
        assert_eq!(names, vec!["Bob", "Cyd"]);

        let following = service.following(bob.id, ListParams::new(1, 10)).await.unwrap();
        assert_eq!(following.items[0].id, ada.id);

        assert!(matches!(
            service.followers(999, ListParams::default()).await,
            Err(UserServiceError::NotFound(_))
        ));
    }
}
