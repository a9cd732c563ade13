//! API middleware
//!
//! Contains:
//! - Application state shared by every handler
//! - Session identity resolution (Bearer token or `session` cookie)
//! - `ApiError`, the JSON error body and its status mapping
//! - Extractors for the authenticated and the optional viewer

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Config;
use crate::db::repositories::{
    SqlxFollowRepository, SqlxInteractionRepository, SqlxNotificationRepository,
    SqlxPublicationRepository, SqlxSessionRepository, SqlxTagRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    ContentLoader, FeedService, InteractionService, InteractionServiceError,
    NotificationDispatcher, NotificationService, NotificationServiceError, PublicationService,
    PublicationServiceError, TagService, TagServiceError, UserService, UserServiceError,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub feed_service: Arc<FeedService>,
    pub publication_service: Arc<PublicationService>,
    pub interaction_service: Arc<InteractionService>,
    pub notification_service: Arc<NotificationService>,
    pub tag_service: Arc<TagService>,
    pub user_service: Arc<UserService>,
}

impl AppState {
    /// Wire repositories and services over one pool
    pub fn new(pool: DynDatabasePool, config: &Config) -> Self {
        let users = SqlxUserRepository::boxed(pool.clone());
        let sessions = SqlxSessionRepository::boxed(pool.clone());
        let publications = SqlxPublicationRepository::boxed(pool.clone());
        let interactions = SqlxInteractionRepository::boxed(pool.clone());
        let follows = SqlxFollowRepository::boxed(pool.clone());
        let tags = SqlxTagRepository::boxed(pool.clone());
        let notifications = SqlxNotificationRepository::boxed(pool);

        let loader = ContentLoader::new(publications.clone(), users.clone(), interactions.clone());
        let dispatcher = NotificationDispatcher::new(notifications.clone());

        Self {
            feed_service: Arc::new(FeedService::new(
                loader.clone(),
                interactions.clone(),
                follows.clone(),
                tags.clone(),
                &config.feed,
            )),
            publication_service: Arc::new(PublicationService::new(
                publications.clone(),
                interactions.clone(),
                loader,
            )),
            interaction_service: Arc::new(InteractionService::new(
                interactions,
                follows.clone(),
                publications,
                users.clone(),
                dispatcher,
            )),
            notification_service: Arc::new(NotificationService::new(
                notifications,
                config.notifications.list_limit,
            )),
            tag_service: Arc::new(TagService::new(tags)),
            user_service: Arc::new(UserService::new(
                users,
                sessions,
                follows,
                config.session.ttl_hours,
            )),
        }
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// Viewer identity on routes that also serve anonymous callers
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

impl MaybeUser {
    pub fn id(&self) -> Option<i64> {
        self.0.as_ref().map(|u| u.id)
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    /// Logs the cause; the client only sees a generic message
    pub fn internal_error(cause: impl std::fmt::Display) -> Self {
        tracing::error!("Request failed: {}", cause);
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(self)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal_error(format!("{:#}", err))
    }
}

impl From<InteractionServiceError> for ApiError {
    fn from(err: InteractionServiceError) -> Self {
        match err {
            InteractionServiceError::NotFound(msg) => Self::not_found(msg),
            InteractionServiceError::ValidationError(msg) => Self::validation_error(msg),
            InteractionServiceError::Conflict(msg) => Self::conflict(msg),
            InteractionServiceError::InternalError(e) => e.into(),
        }
    }
}

impl From<PublicationServiceError> for ApiError {
    fn from(err: PublicationServiceError) -> Self {
        match err {
            PublicationServiceError::NotFound(id) => {
                Self::not_found(format!("Publication not found: {}", id))
            }
            PublicationServiceError::ValidationError(msg) => Self::validation_error(msg),
            PublicationServiceError::Forbidden(msg) => Self::forbidden(msg),
            PublicationServiceError::InternalError(e) => e.into(),
        }
    }
}

impl From<NotificationServiceError> for ApiError {
    fn from(err: NotificationServiceError) -> Self {
        match err {
            NotificationServiceError::NotFound(id) => {
                Self::not_found(format!("Notification not found: {}", id))
            }
            NotificationServiceError::Forbidden(msg) => Self::forbidden(msg),
            NotificationServiceError::InternalError(e) => e.into(),
        }
    }
}

impl From<TagServiceError> for ApiError {
    fn from(err: TagServiceError) -> Self {
        match err {
            TagServiceError::ValidationError(msg) => Self::validation_error(msg),
            TagServiceError::InternalError(e) => e.into(),
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::NotFound(id) => Self::not_found(format!("User not found: {}", id)),
            UserServiceError::ValidationError(msg) => Self::validation_error(msg),
            UserServiceError::UserExists(email) => {
                Self::conflict(format!("User already exists: {}", email))
            }
            UserServiceError::InternalError(e) => e.into(),
        }
    }
}

/// Extract session token from request
fn extract_session_token(request: &Request) -> Option<String> {
    if let Some(auth_header) = request.headers().get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    if let Some(cookie_header) = request.headers().get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                let cookie = cookie.trim();
                if let Some(token) = cookie.strip_prefix("session=") {
                    return Some(token.to_string());
                }
            }
        }
    }

    None
}

/// Resolve the session token, if any, into an `AuthenticatedUser` extension.
///
/// Unknown or expired tokens leave the request anonymous. A storage failure
/// while resolving is an error rather than a silent downgrade.
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(token) = extract_session_token(&request) {
        let user = state
            .user_service
            .validate_session(&token)
            .await
            .map_err(|e| ApiError::internal_error(format!("Session validation failed: {}", e)))?;
        if let Some(user) = user {
            request.extensions_mut().insert(AuthenticatedUser(user));
        }
    }
    Ok(next.run(request).await)
}

/// Gate for route groups that need an identity; runs inside `optional_auth`
pub async fn require_auth(request: Request, next: Next) -> Result<Response, ApiError> {
    if request.extensions().get::<AuthenticatedUser>().is_none() {
        return Err(ApiError::unauthorized("Authentication required"));
    }
    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            parts.extensions.get::<AuthenticatedUser>().map(|u| u.0.clone()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};

    fn create_request_with_auth(token: &str) -> Request<Body> {
        Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap()
    }

    fn create_request_with_cookie(token: &str) -> Request<Body> {
        Request::builder()
            .uri("/test")
            .header(header::COOKIE, format!("theme=dark; session={}", token))
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_extract_session_token_from_bearer() {
        let request = create_request_with_auth("test-token-123");
        assert_eq!(extract_session_token(&request), Some("test-token-123".to_string()));
    }

    #[test]
    fn test_extract_session_token_from_cookie() {
        let request = create_request_with_cookie("test-token-456");
        assert_eq!(extract_session_token(&request), Some("test-token-456".to_string()));
    }

    #[test]
    fn test_extract_session_token_bearer_priority() {
        let request = Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, "Bearer bearer-token")
            .header(header::COOKIE, "session=cookie-token")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_session_token(&request), Some("bearer-token".to_string()));
    }

    #[test]
    fn test_extract_session_token_none() {
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();
        assert!(extract_session_token(&request).is_none());

        let request = Request::builder()
            .uri("/test")
            .header(header::AUTHORIZATION, "Basic invalid")
            .body(Body::empty())
            .unwrap();
        assert!(extract_session_token(&request).is_none());
    }

    #[test]
    fn test_service_errors_map_to_status() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (
                InteractionServiceError::Conflict("again".into()).into(),
                StatusCode::CONFLICT,
            ),
            (
                InteractionServiceError::ValidationError("bad".into()).into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                PublicationServiceError::Forbidden("not yours".into()).into(),
                StatusCode::FORBIDDEN,
            ),
            (
                NotificationServiceError::NotFound("7".into()).into(),
                StatusCode::NOT_FOUND,
            ),
            (
                UserServiceError::InternalError(anyhow::anyhow!("db down")).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ApiError::unauthorized("who"), StatusCode::UNAUTHORIZED),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_internal_error_hides_cause() {
        let error: ApiError = TagServiceError::InternalError(anyhow::anyhow!("secret dsn")).into();
        assert_eq!(error.error.code, "INTERNAL_ERROR");
        assert!(!error.error.message.contains("secret"));
    }
}
