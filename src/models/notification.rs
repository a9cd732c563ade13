//! Notification model
//!
//! Notifications carry a snapshot of the actor taken when they were created,
//! so later profile changes do not rewrite history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub recipient_id: i64,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub target_url: Option<String>,
    pub is_read: bool,
    pub actor_id: Option<i64>,
    pub actor_name: Option<String>,
    pub actor_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    General,
    NewFollower,
    Recommendation,
    PublicationAlert,
    PublicationRated,
    PublicationShared,
    PublicationCited,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::General => "general",
            NotificationType::NewFollower => "new_follower",
            NotificationType::Recommendation => "recommendation",
            NotificationType::PublicationAlert => "publication_alert",
            NotificationType::PublicationRated => "publication_rated",
            NotificationType::PublicationShared => "publication_shared",
            NotificationType::PublicationCited => "publication_cited",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(NotificationType::General),
            "new_follower" => Ok(NotificationType::NewFollower),
            "recommendation" => Ok(NotificationType::Recommendation),
            "publication_alert" => Ok(NotificationType::PublicationAlert),
            "publication_rated" => Ok(NotificationType::PublicationRated),
            "publication_shared" => Ok(NotificationType::PublicationShared),
            "publication_cited" => Ok(NotificationType::PublicationCited),
            _ => Err(anyhow::anyhow!("Invalid notification type: {}", s)),
        }
    }
}

/// Row to insert; the repository assigns id, read state and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub recipient_id: i64,
    pub title: String,
    pub message: String,
    pub notification_type: NotificationType,
    pub target_url: Option<String>,
    pub actor_id: Option<i64>,
    pub actor_name: Option<String>,
    pub actor_image_url: Option<String>,
}
