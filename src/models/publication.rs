//! Publication model
//!
//! A publication is the rankable unit of content. Its engagement columns
//! (`average_rating`, `save_count`, `share_count`) are derived data kept in
//! step with the ratings, saves and shares tables by the repositories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::UserSummary;

/// Longest accepted title, in characters
pub const MAX_TITLE_LEN: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Publication {
    pub id: i64,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub doi: Option<String>,
    pub file_url: Option<String>,
    pub published_date: Option<DateTime<Utc>>,
    pub author_id: i64,
    /// Mean of the current rating scores, 0 when unrated
    pub average_rating: f64,
    pub citation_count: i64,
    pub save_count: i64,
    pub share_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Publication {
    /// Saves + shares + citations, the raw input of the engagement score
    pub fn engagement(&self) -> i64 {
        self.save_count + self.share_count + self.citation_count
    }
}

/// Publication with its tag names and author card
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicationDetail {
    #[serde(flatten)]
    pub publication: Publication,
    pub tags: Vec<String>,
    pub author: UserSummary,
}

impl PublicationDetail {
    pub fn into_view(self, flags: ViewerFlags) -> PublicationView {
        PublicationView {
            detail: self,
            flags,
        }
    }
}

/// Per-viewer display state. Never feeds into ranking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerFlags {
    pub is_saved: bool,
    pub is_shared: bool,
    pub user_rating: Option<i32>,
}

/// What a client sees for one publication
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicationView {
    #[serde(flatten)]
    pub detail: PublicationDetail,
    #[serde(flatten)]
    pub flags: ViewerFlags,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePublicationInput {
    pub title: String,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub published_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CreatePublicationInput {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_doi(mut self, doi: impl Into<String>) -> Self {
        self.doi = Some(doi.into());
        self
    }
}

/// Partial update; `None` leaves a field unchanged. `tags: Some(..)` replaces
/// the whole tag set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePublicationInput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub published_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl UpdatePublicationInput {
    pub fn has_changes(&self) -> bool {
        self.title.is_some()
            || self.abstract_text.is_some()
            || self.doi.is_some()
            || self.file_url.is_some()
            || self.published_date.is_some()
            || self.tags.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Publication {
        let now = Utc::now();
        Publication {
            id: 1,
            title: "Graph Sparsifiers".to_string(),
            abstract_text: Some("We study...".to_string()),
            doi: None,
            file_url: None,
            published_date: None,
            author_id: 2,
            average_rating: 3.5,
            citation_count: 4,
            save_count: 2,
            share_count: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_engagement_sums_counters() {
        assert_eq!(sample().engagement(), 7);
    }

    #[test]
    fn test_view_serializes_flat_camel_case() {
        let detail = PublicationDetail {
            publication: sample(),
            tags: vec!["graphs".to_string()],
            author: UserSummary::unknown(2),
        };
        let view = detail.into_view(ViewerFlags {
            is_saved: true,
            is_shared: false,
            user_rating: Some(4),
        });

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["title"], "Graph Sparsifiers");
        assert_eq!(json["abstract"], "We study...");
        assert_eq!(json["averageRating"], 3.5);
        assert_eq!(json["isSaved"], true);
        assert_eq!(json["userRating"], 4);
        assert_eq!(json["author"]["id"], 2);
    }

    #[test]
    fn test_update_input_has_changes() {
        assert!(!UpdatePublicationInput::default().has_changes());
        let input = UpdatePublicationInput {
            tags: Some(vec![]),
            ..Default::default()
        };
        assert!(input.has_changes());
    }
}
