//! Tag API endpoints
//!
//! - GET /api/v1/tags - Tags by usage
//! - GET /api/v1/tags/search?query= - Substring search

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState};
use crate::models::Tag;

/// Query parameters for tag list
#[derive(Debug, Deserialize)]
pub struct ListTagsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchTagsQuery {
    #[serde(default)]
    pub query: String,
}

/// Response for tag list
#[derive(Debug, Serialize)]
pub struct TagListResponse {
    pub tags: Vec<Tag>,
}

/// Build the tags router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tags))
        .route("/search", get(search_tags))
}

/// GET /api/v1/tags
async fn list_tags(
    State(state): State<AppState>,
    Query(query): Query<ListTagsQuery>,
) -> Result<Json<TagListResponse>, ApiError> {
    let tags = state.tag_service.list(query.limit).await?;
    Ok(Json(TagListResponse { tags }))
}

/// GET /api/v1/tags/search
async fn search_tags(
    State(state): State<AppState>,
    Query(query): Query<SearchTagsQuery>,
) -> Result<Json<TagListResponse>, ApiError> {
    let tags = state.tag_service.search(&query.query).await?;
    Ok(Json(TagListResponse { tags }))
}
