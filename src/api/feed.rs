//! Feed API endpoint
//!
//! - GET /api/v1/feed - Ranked publications and shares, anonymous allowed

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;

use crate::api::common::PageQuery;
use crate::api::middleware::{ApiError, AppState, MaybeUser};
use crate::models::FeedPage;

/// Build the feed router
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_feed))
}

/// GET /api/v1/feed
async fn get_feed(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<FeedPage>, ApiError> {
    let params = state.feed_service.page_params(query.page, query.page_size);
    let page = state
        .feed_service
        .get_feed(viewer.id(), params, Utc::now())
        .await?;
    Ok(Json(page))
}
