//! Notification inbox endpoints
//!
//! All routes act on the caller's own inbox:
//! - GET    /api/v1/notifications
//! - GET    /api/v1/notifications/unread-count
//! - PUT    /api/v1/notifications/{id}/read
//! - PUT    /api/v1/notifications/read-all
//! - DELETE /api/v1/notifications/{id}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware as axum_middleware,
    routing::{delete, get, put},
    Json, Router,
};
use serde::Serialize;

use crate::api::middleware::{self, ApiError, AppState, AuthenticatedUser};
use crate::models::Notification;

#[derive(Debug, Serialize)]
pub struct NotificationListResponse {
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct ReadAllResponse {
    pub updated: u64,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Build the notifications router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/unread-count", get(unread_count))
        .route("/read-all", put(mark_all_read))
        .route("/{id}/read", put(mark_read))
        .route("/{id}", delete(delete_notification))
        .route_layer(axum_middleware::from_fn(middleware::require_auth))
}

/// GET /api/v1/notifications - newest first, capped by configuration
async fn list_notifications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<NotificationListResponse>, ApiError> {
    let notifications = state.notification_service.list(user.0.id).await?;
    Ok(Json(NotificationListResponse { notifications }))
}

/// GET /api/v1/notifications/unread-count
async fn unread_count(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let count = state.notification_service.unread_count(user.0.id).await?;
    Ok(Json(UnreadCountResponse { count }))
}

/// PUT /api/v1/notifications/{id}/read
async fn mark_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.notification_service.mark_read(id, user.0.id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// PUT /api/v1/notifications/read-all
async fn mark_all_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<ReadAllResponse>, ApiError> {
    let updated = state.notification_service.mark_all_read(user.0.id).await?;
    Ok(Json(ReadAllResponse { updated }))
}

/// DELETE /api/v1/notifications/{id}
async fn delete_notification(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.notification_service.delete(id, user.0.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
