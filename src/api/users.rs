//! User API endpoints
//!
//! - GET    /api/v1/users/{id} - Profile with the viewer's follow state
//! - GET    /api/v1/users/{id}/publications - Authored publications
//! - GET    /api/v1/users/{id}/shares - Shares made by the user
//! - POST   /api/v1/users/{id}/follow - Follow
//! - DELETE /api/v1/users/{id}/follow - Unfollow
//! - GET    /api/v1/users/{id}/followers
//! - GET    /api/v1/users/{id}/following
//! - GET    /api/v1/users/me/interests - The caller's interest tags
//! - POST   /api/v1/users/me/interests - Add an interest
//! - DELETE /api/v1/users/me/interests/{name} - Remove an interest

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware as axum_middleware,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::PageQuery;
use crate::api::middleware::{self, ApiError, AppState, AuthenticatedUser, MaybeUser};
use crate::models::{FollowState, PagedResult, PublicationView, ShareView, Tag, User, UserSummary};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub user: User,
    /// Whether the viewer follows this user; false for anonymous viewers
    pub is_following: bool,
}

#[derive(Debug, Serialize)]
pub struct InterestListResponse {
    pub interests: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
pub struct AddInterestRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct InterestRemovedResponse {
    pub removed: bool,
}

/// Build the users router
pub fn router() -> Router<AppState> {
    let interests = Router::new()
        .route("/me/interests", get(list_interests).post(add_interest))
        .route("/me/interests/{name}", delete(remove_interest))
        .route_layer(axum_middleware::from_fn(middleware::require_auth));

    Router::new()
        .route("/{id}", get(get_profile))
        .route("/{id}/publications", get(list_publications))
        .route("/{id}/shares", get(list_shares))
        .route("/{id}/follow", post(follow).delete(unfollow))
        .route("/{id}/followers", get(list_followers))
        .route("/{id}/following", get(list_following))
        .merge(interests)
}

/// GET /api/v1/users/{id}
async fn get_profile(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<i64>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user = state.user_service.get_by_id(id).await?;
    let is_following = match viewer.id() {
        Some(viewer_id) if viewer_id != id => {
            state
                .interaction_service
                .follow_state(viewer_id, id)
                .await?
                .following
        }
        _ => false,
    };
    Ok(Json(ProfileResponse { user, is_following }))
}

/// GET /api/v1/users/{id}/publications
async fn list_publications(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PagedResult<PublicationView>>, ApiError> {
    let page = state
        .publication_service
        .list_by_author(id, viewer.id(), query.params())
        .await?;
    Ok(Json(page))
}

/// GET /api/v1/users/{id}/shares
async fn list_shares(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PagedResult<ShareView>>, ApiError> {
    let page = state
        .publication_service
        .list_shares_by_user(id, viewer.id(), query.params())
        .await?;
    Ok(Json(page))
}

/// POST /api/v1/users/{id}/follow
async fn follow(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<FollowState>), ApiError> {
    let followed = state.interaction_service.follow(&user.0, id).await?;
    Ok((StatusCode::CREATED, Json(followed)))
}

/// DELETE /api/v1/users/{id}/follow
async fn unfollow(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<FollowState>, ApiError> {
    Ok(Json(state.interaction_service.unfollow(user.0.id, id).await?))
}

/// GET /api/v1/users/{id}/followers
async fn list_followers(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PagedResult<UserSummary>>, ApiError> {
    Ok(Json(state.user_service.followers(id, query.params()).await?))
}

/// GET /api/v1/users/{id}/following
async fn list_following(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PagedResult<UserSummary>>, ApiError> {
    Ok(Json(state.user_service.following(id, query.params()).await?))
}

/// GET /api/v1/users/me/interests
async fn list_interests(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<InterestListResponse>, ApiError> {
    let interests = state.tag_service.interests(user.0.id).await?;
    Ok(Json(InterestListResponse { interests }))
}

/// POST /api/v1/users/me/interests
async fn add_interest(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<AddInterestRequest>,
) -> Result<Json<Tag>, ApiError> {
    Ok(Json(state.tag_service.add_interest(user.0.id, &body.name).await?))
}

/// DELETE /api/v1/users/me/interests/{name}
async fn remove_interest(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(name): Path<String>,
) -> Result<Json<InterestRemovedResponse>, ApiError> {
    let removed = state.tag_service.remove_interest(user.0.id, &name).await?;
    Ok(Json(InterestRemovedResponse { removed }))
}
