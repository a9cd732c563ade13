//! User model
//!
//! Users are the actors of every interaction and the owners of the derived
//! reputation and follow counters. Account management itself lives outside
//! this service; only the fields the feed and notifications need are kept.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User entity with its derived counters.
///
/// `avg_score`, `follower_count` and `following_count` are written only by
/// the interaction repositories, never by profile edits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    #[serde(skip_serializing)]
    pub email: String,
    pub full_name: String,
    pub title: Option<String>,
    pub institution: Option<String>,
    pub profile_image_url: Option<String>,
    pub is_verified: bool,
    /// Mean rating across the user's rated publications
    pub avg_score: f64,
    pub follower_count: i64,
    pub following_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            full_name: self.full_name.clone(),
            title: self.title.clone(),
            institution: self.institution.clone(),
            profile_image_url: self.profile_image_url.clone(),
            is_verified: self.is_verified,
        }
    }
}

/// Compact author/sharer card embedded in feed items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i64,
    pub full_name: String,
    pub title: Option<String>,
    pub institution: Option<String>,
    pub profile_image_url: Option<String>,
    pub is_verified: bool,
}

impl UserSummary {
    /// Placeholder used when a referenced user row has vanished mid-request
    pub fn unknown(id: i64) -> Self {
        Self {
            id,
            full_name: String::new(),
            title: None,
            institution: None,
            profile_image_url: None,
            is_verified: false,
        }
    }
}

/// Input for registering a user row
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateUserInput {
    pub email: String,
    pub full_name: String,
    pub title: Option<String>,
    pub institution: Option<String>,
    pub profile_image_url: Option<String>,
    pub is_verified: bool,
}

impl CreateUserInput {
    pub fn new(email: impl Into<String>, full_name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            full_name: full_name.into(),
            ..Self::default()
        }
    }

    pub fn with_profile_image(mut self, url: impl Into<String>) -> Self {
        self.profile_image_url = Some(url.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        let now = Utc::now();
        User {
            id: 7,
            email: "ada@example.org".to_string(),
            full_name: "Ada Lovelace".to_string(),
            title: Some("Analyst".to_string()),
            institution: None,
            profile_image_url: Some("/img/ada.png".to_string()),
            is_verified: true,
            avg_score: 4.5,
            follower_count: 3,
            following_count: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_summary_copies_public_fields() {
        let summary = user().summary();
        assert_eq!(summary.id, 7);
        assert_eq!(summary.full_name, "Ada Lovelace");
        assert_eq!(summary.profile_image_url.as_deref(), Some("/img/ada.png"));
        assert!(summary.is_verified);
    }

    #[test]
    fn test_email_is_not_serialized() {
        let json = serde_json::to_value(user()).unwrap();
        assert!(json.get("email").is_none());
        assert_eq!(json["followerCount"], 3);
        assert_eq!(json["avgScore"], 4.5);
    }
}
