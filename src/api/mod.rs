//! API layer - HTTP handlers and routing
//!
//! This module contains all HTTP API endpoints of ScholarFeed, served under
//! `/api/v1`:
//! - Feed endpoint
//! - Publication and interaction endpoints (rate, save, share)
//! - User endpoints (profile, follow graph, interests)
//! - Tag endpoints
//! - Notification inbox endpoints

pub mod common;
pub mod feed;
pub mod middleware;
pub mod notifications;
pub mod publications;
pub mod tags;
pub mod users;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub use middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};

/// Build the main API router
pub fn build_api_router() -> Router<AppState> {
    Router::new()
        .nest("/feed", feed::router())
        .nest("/publications", publications::router())
        .nest("/users", users::router())
        .nest("/tags", tags::router())
        .nest("/notifications", notifications::router())
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    Router::new()
        .nest("/api/v1", build_api_router())
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::optional_auth,
        ))
        .layer(cors_layer(cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Cookie auth needs an explicit origin; `*` serves any origin without
/// credentials.
fn cors_layer(origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE]);

    if origin == "*" {
        return cors.allow_origin(AllowOrigin::any());
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => cors.allow_origin(value).allow_credentials(true),
        Err(e) => {
            tracing::warn!("Invalid CORS origin {:?} ({}); cross-origin requests disabled", origin, e);
            cors
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::repositories::test_support::migrated_pool;
    use crate::models::CreateUserInput;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        state: AppState,
    }

    impl TestApp {
        async fn new() -> Self {
            let pool = migrated_pool().await;
            let state = AppState::new(pool, &Config::default());
            Self {
                router: build_router(state.clone(), "http://localhost:3000"),
                state,
            }
        }

        /// Register a user and return (id, session token)
        async fn login(&self, name: &str) -> (i64, String) {
            let user = self
                .state
                .user_service
                .register(CreateUserInput::new(format!("{}@example.org", name), name))
                .await
                .unwrap();
            let session = self.state.user_service.create_session(user.id).await.unwrap();
            (user.id, session.id)
        }

        async fn send(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut builder = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
            }
            let request = match body {
                Some(body) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };

            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }

        async fn publish(&self, token: &str, title: &str) -> i64 {
            let (status, body) = self
                .send(
                    Method::POST,
                    "/api/v1/publications",
                    Some(token),
                    Some(json!({"title": title, "tags": ["Optics"]})),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
            body["id"].as_i64().unwrap()
        }
    }

    #[tokio::test]
    async fn test_anonymous_feed_and_protected_routes() {
        let app = TestApp::new().await;

        let (status, body) = app.send(Method::GET, "/api/v1/feed", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalCount"], 0);
        assert_eq!(body["hasMore"], false);
        assert_eq!(body["degraded"], false);

        let (status, body) = app.send(Method::GET, "/api/v1/notifications", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");

        let (status, _) = app
            .send(Method::GET, "/api/v1/notifications", Some("bogus-token"), None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app
            .send(Method::POST, "/api/v1/publications/1/save", None, None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_rating_flow_notifies_author() {
        let app = TestApp::new().await;
        let (_, author) = app.login("ada").await;
        let (_, reader) = app.login("bob").await;
        let id = app.publish(&author, "Quantum Optics").await;
        let rate_uri = format!("/api/v1/publications/{}/rate", id);

        let (status, body) = app
            .send(Method::POST, &rate_uri, Some(&reader), Some(json!({"score": 4})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["averageRating"], 4.0);
        assert_eq!(body["userRating"], 4);

        let (status, body) = app
            .send(Method::POST, &rate_uri, Some(&reader), Some(json!({"score": 9})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (_, body) = app
            .send(Method::GET, "/api/v1/notifications/unread-count", Some(&author), None)
            .await;
        assert_eq!(body["count"], 1);
        let (_, body) = app
            .send(Method::GET, "/api/v1/notifications", Some(&author), None)
            .await;
        assert_eq!(body["notifications"][0]["title"], "Publication Rated");

        let (_, body) = app
            .send(Method::POST, &rate_uri, Some(&reader), Some(json!({"score": 0})))
            .await;
        assert_eq!(body["averageRating"], 0.0);
        assert_eq!(body["userRating"], Value::Null);
    }

    #[tokio::test]
    async fn test_share_conflict_and_note_update() {
        let app = TestApp::new().await;
        let (_, author) = app.login("ada").await;
        let (_, reader) = app.login("bob").await;
        let id = app.publish(&author, "Graph Minors").await;
        let share_uri = format!("/api/v1/publications/{}/share", id);

        let (status, body) = app.send(Method::POST, &share_uri, Some(&reader), None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["shareCount"], 1);

        let (status, body) = app
            .send(Method::POST, &share_uri, Some(&reader), Some(json!({"note": "again"})))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");

        let (status, body) = app
            .send(Method::PUT, &share_uri, Some(&reader), Some(json!({"note": "worth a read"})))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["updated"], true);

        let (_, body) = app.send(Method::DELETE, &share_uri, Some(&reader), None).await;
        assert_eq!(body["shared"], false);
        assert_eq!(body["shareCount"], 0);
    }

    #[tokio::test]
    async fn test_foreign_notification_is_forbidden() {
        let app = TestApp::new().await;
        let (ada_id, ada) = app.login("ada").await;
        let (_, bob) = app.login("bob").await;

        let (status, body) = app
            .send(Method::POST, &format!("/api/v1/users/{}/follow", ada_id), Some(&bob), None)
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["followerCount"], 1);

        let (_, body) = app.send(Method::GET, "/api/v1/notifications", Some(&ada), None).await;
        let notification_id = body["notifications"][0]["id"].as_i64().unwrap();
        let read_uri = format!("/api/v1/notifications/{}/read", notification_id);

        let (status, _) = app.send(Method::PUT, &read_uri, Some(&bob), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app.send(Method::PUT, &read_uri, Some(&ada), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.send(Method::PUT, &read_uri, Some(&ada), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_profile_and_interests() {
        let app = TestApp::new().await;
        let (ada_id, ada) = app.login("ada").await;
        let (_, bob) = app.login("bob").await;
        app.send(Method::POST, &format!("/api/v1/users/{}/follow", ada_id), Some(&bob), None)
            .await;

        let (status, body) = app
            .send(Method::GET, &format!("/api/v1/users/{}", ada_id), Some(&bob), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isFollowing"], true);
        assert_eq!(body["followerCount"], 1);
        assert!(body.get("email").is_none());

        let (status, _) = app.send(Method::GET, "/api/v1/users/999", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, tag) = app
            .send(Method::POST, "/api/v1/users/me/interests", Some(&ada), Some(json!({"name": "Optics"})))
            .await;
        assert_eq!(tag["name"], "Optics");
        let (_, body) = app
            .send(Method::GET, "/api/v1/users/me/interests", Some(&ada), None)
            .await;
        assert_eq!(body["interests"].as_array().unwrap().len(), 1);
        let (_, body) = app
            .send(Method::DELETE, "/api/v1/users/me/interests/optics", Some(&ada), None)
            .await;
        assert_eq!(body["removed"], true);

        let (_, body) = app.send(Method::GET, "/api/v1/tags/search?query=opt", None, None).await;
        assert_eq!(body["tags"][0]["usageCount"], 0);
    }
}
