//! Publication API endpoints
//!
//! Handles HTTP requests for publications and the interactions on them:
//! - POST   /api/v1/publications - Create a publication
//! - GET    /api/v1/publications/saved - The caller's saved publications
//! - GET    /api/v1/publications/{id} - Get a publication
//! - PUT    /api/v1/publications/{id} - Update (author only)
//! - DELETE /api/v1/publications/{id} - Delete (author only)
//! - POST   /api/v1/publications/{id}/rate - Rate 1..5, or 0 to remove
//! - DELETE /api/v1/publications/{id}/rate - Remove the caller's rating
//! - POST   /api/v1/publications/{id}/save - Toggle save
//! - POST   /api/v1/publications/{id}/share - Share with an optional note
//! - PUT    /api/v1/publications/{id}/share - Edit the share note
//! - DELETE /api/v1/publications/{id}/share - Unshare

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::PageQuery;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};
use crate::models::{
    CreatePublicationInput, PagedResult, PublicationView, RatingSummary, SaveState, ShareInput,
    ShareState, UpdatePublicationInput,
};

/// Body of POST /publications/{id}/rate
#[derive(Debug, Deserialize)]
pub struct RateRequest {
    pub score: i32,
}

#[derive(Debug, Serialize)]
pub struct ShareUpdatedResponse {
    pub updated: bool,
}

/// Build the publications router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_publication))
        .route("/saved", get(list_saved))
        .route(
            "/{id}",
            get(get_publication)
                .put(update_publication)
                .delete(delete_publication),
        )
        .route("/{id}/rate", post(rate).delete(remove_rating))
        .route("/{id}/save", post(toggle_save))
        .route(
            "/{id}/share",
            post(share).put(update_share_note).delete(unshare),
        )
}

/// POST /api/v1/publications
async fn create_publication(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(input): Json<CreatePublicationInput>,
) -> Result<(StatusCode, Json<PublicationView>), ApiError> {
    let view = state.publication_service.create(user.0.id, input).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /api/v1/publications/saved
async fn list_saved(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<PagedResult<PublicationView>>, ApiError> {
    let page = state
        .publication_service
        .list_saved(user.0.id, query.params())
        .await?;
    Ok(Json(page))
}

/// GET /api/v1/publications/{id}
async fn get_publication(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<i64>,
) -> Result<Json<PublicationView>, ApiError> {
    Ok(Json(state.publication_service.get(id, viewer.id()).await?))
}

/// PUT /api/v1/publications/{id}
async fn update_publication(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<UpdatePublicationInput>,
) -> Result<Json<PublicationView>, ApiError> {
    Ok(Json(state.publication_service.update(id, user.0.id, input).await?))
}

/// DELETE /api/v1/publications/{id}
async fn delete_publication(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.publication_service.delete(id, user.0.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/publications/{id}/rate
///
/// A score of 0 is accepted as "remove my rating" for older clients.
async fn rate(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<RateRequest>,
) -> Result<Json<RatingSummary>, ApiError> {
    let summary = if body.score == 0 {
        state.interaction_service.remove_rating(id, user.0.id).await?
    } else {
        state.interaction_service.rate(id, &user.0, body.score).await?
    };
    Ok(Json(summary))
}

/// DELETE /api/v1/publications/{id}/rate
async fn remove_rating(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<RatingSummary>, ApiError> {
    Ok(Json(state.interaction_service.remove_rating(id, user.0.id).await?))
}

/// POST /api/v1/publications/{id}/save
async fn toggle_save(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<SaveState>, ApiError> {
    Ok(Json(state.interaction_service.toggle_save(id, user.0.id).await?))
}

/// POST /api/v1/publications/{id}/share
///
/// The body is optional; without one the share carries no note.
async fn share(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    body: Option<Json<ShareInput>>,
) -> Result<(StatusCode, Json<ShareState>), ApiError> {
    let note = body.and_then(|Json(input)| input.note);
    let shared = state
        .interaction_service
        .share(id, &user.0, note.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(shared)))
}

/// PUT /api/v1/publications/{id}/share
async fn update_share_note(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(input): Json<ShareInput>,
) -> Result<Json<ShareUpdatedResponse>, ApiError> {
    state
        .interaction_service
        .update_share_note(id, user.0.id, input.note.as_deref())
        .await?;
    Ok(Json(ShareUpdatedResponse { updated: true }))
}

/// DELETE /api/v1/publications/{id}/share
async fn unshare(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<ShareState>, ApiError> {
    Ok(Json(state.interaction_service.unshare(id, user.0.id).await?))
}
