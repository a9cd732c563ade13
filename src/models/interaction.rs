//! Interaction facts (ratings, shares, follow edges) and the aggregate
//! snapshots returned after each mutation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::publication::{PublicationDetail, PublicationView, ViewerFlags};
use super::user::UserSummary;

pub const MIN_SCORE: i32 = 1;
pub const MAX_SCORE: i32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub id: i64,
    pub publication_id: i64,
    pub user_id: i64,
    pub score: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user's repost of a publication. At most one per (user, publication).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Share {
    pub id: i64,
    pub user_id: i64,
    pub publication_id: i64,
    pub note: Option<String>,
    pub shared_at: DateTime<Utc>,
}

/// Share joined with its sharer card and the shared publication
#[derive(Debug, Clone, PartialEq)]
pub struct ShareDetail {
    pub share: Share,
    pub sharer: UserSummary,
    pub publication: PublicationDetail,
}

impl ShareDetail {
    /// `flags` describe the viewer's relation to the shared publication
    pub fn into_view(self, flags: ViewerFlags) -> ShareView {
        ShareView {
            id: self.share.id,
            sharer: self.sharer,
            note: self.share.note,
            shared_at: self.share.shared_at,
            publication: self.publication.into_view(flags),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareView {
    pub id: i64,
    pub sharer: UserSummary,
    pub note: Option<String>,
    pub shared_at: DateTime<Utc>,
    pub publication: PublicationView,
}

/// Result of rating or un-rating a publication
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    pub average_rating: f64,
    pub user_rating: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveState {
    pub saved: bool,
    pub save_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareState {
    pub shared: bool,
    pub share_count: i64,
}

/// Counters of both ends of a follow edge after a follow/unfollow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowState {
    pub following: bool,
    /// Followee's follower count
    pub follower_count: i64,
    /// Follower's following count
    pub following_count: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShareInput {
    #[serde(default)]
    pub note: Option<String>,
}

/// Mean of the given scores; 0 for an empty slice.
pub fn mean_score(scores: &[i32]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let sum: i64 = scores.iter().map(|s| i64::from(*s)).sum();
    sum as f64 / scores.len() as f64
}

/// Mean of publication averages; 0 for an empty slice.
pub fn mean_average(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_score() {
        assert_eq!(mean_score(&[]), 0.0);
        assert_eq!(mean_score(&[5, 3, 4]), 4.0);
        assert_eq!(mean_score(&[5, 3, 4, 2]), 3.5);
    }

    #[test]
    fn test_mean_average() {
        assert_eq!(mean_average(&[]), 0.0);
        assert_eq!(mean_average(&[4.0, 3.0]), 3.5);
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_value(SaveState {
            saved: true,
            save_count: 3,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"saved": true, "saveCount": 3}));

        let json = serde_json::to_value(RatingSummary {
            average_rating: 4.0,
            user_rating: None,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"averageRating": 4.0, "userRating": null}));
    }
}
