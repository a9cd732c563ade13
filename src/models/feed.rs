//! Feed entries: the union of publications and shares that the ranker merges
//! into one stream.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::interaction::{ShareDetail, ShareView};
use super::publication::{PublicationDetail, PublicationView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Publication,
    Share,
}

/// Identity of an entry across both tables; ordered by id, then kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeedKey {
    pub id: i64,
    pub kind: FeedKind,
}

/// Rankable candidate
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEntry {
    Publication(PublicationDetail),
    Share(ShareDetail),
}

impl FeedEntry {
    pub fn key(&self) -> FeedKey {
        match self {
            FeedEntry::Publication(p) => FeedKey {
                id: p.publication.id,
                kind: FeedKind::Publication,
            },
            FeedEntry::Share(s) => FeedKey {
                id: s.share.id,
                kind: FeedKind::Share,
            },
        }
    }

    /// Creation time of a publication, or the moment a share happened
    pub fn sort_date(&self) -> DateTime<Utc> {
        match self {
            FeedEntry::Publication(p) => p.publication.created_at,
            FeedEntry::Share(s) => s.share.shared_at,
        }
    }

    /// User whose follow status matters: the author, or the sharer
    pub fn actor_id(&self) -> i64 {
        match self {
            FeedEntry::Publication(p) => p.publication.author_id,
            FeedEntry::Share(s) => s.share.user_id,
        }
    }

    /// The publication being shown (for a share, the shared one)
    pub fn publication(&self) -> &PublicationDetail {
        match self {
            FeedEntry::Publication(p) => p,
            FeedEntry::Share(s) => &s.publication,
        }
    }
}

/// One rendered feed item
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    #[serde(flatten)]
    pub content: FeedContent,
    pub score: f64,
    pub sort_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeedContent {
    Publication { publication: PublicationView },
    Share { share: ShareView },
}

impl FeedItem {
    pub fn key(&self) -> FeedKey {
        match &self.content {
            FeedContent::Publication { publication } => FeedKey {
                id: publication.detail.publication.id,
                kind: FeedKind::Publication,
            },
            FeedContent::Share { share } => FeedKey {
                id: share.id,
                kind: FeedKind::Share,
            },
        }
    }
}

/// A page of the ranked feed
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    pub items: Vec<FeedItem>,
    pub total_count: u64,
    pub page: u32,
    pub page_size: u32,
    pub has_more: bool,
    /// Scoring ran out of time and the page is in date order
    pub degraded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Publication, Share, UserSummary, ViewerFlags};
    use chrono::TimeZone;

    fn detail(id: i64, author_id: i64) -> PublicationDetail {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        PublicationDetail {
            publication: Publication {
                id,
                title: format!("Paper {}", id),
                abstract_text: None,
                doi: None,
                file_url: None,
                published_date: None,
                author_id,
                average_rating: 0.0,
                citation_count: 0,
                save_count: 0,
                share_count: 0,
                created_at: at,
                updated_at: at,
            },
            tags: vec![],
            author: UserSummary::unknown(author_id),
        }
    }

    #[test]
    fn test_share_entry_uses_sharer_and_share_time() {
        let shared_at = Utc.with_ymd_and_hms(2024, 3, 5, 8, 0, 0).unwrap();
        let entry = FeedEntry::Share(ShareDetail {
            share: Share {
                id: 1,
                user_id: 9,
                publication_id: 1,
                note: None,
                shared_at,
            },
            sharer: UserSummary::unknown(9),
            publication: detail(1, 2),
        });

        assert_eq!(entry.actor_id(), 9);
        assert_eq!(entry.sort_date(), shared_at);
        assert_eq!(entry.publication().publication.author_id, 2);
        assert_eq!(entry.key(), FeedKey { id: 1, kind: FeedKind::Share });
    }

    #[test]
    fn test_key_orders_by_id_then_kind() {
        let a = FeedKey { id: 1, kind: FeedKind::Share };
        let b = FeedKey { id: 2, kind: FeedKind::Publication };
        let c = FeedKey { id: 1, kind: FeedKind::Publication };
        assert!(a < b);
        assert!(c < a);
    }

    #[test]
    fn test_item_serializes_type_tag() {
        let item = FeedItem {
            content: FeedContent::Publication {
                publication: detail(3, 2).into_view(ViewerFlags::default()),
            },
            score: 0.5,
            sort_date: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "publication");
        assert_eq!(json["publication"]["id"], 3);
        assert_eq!(json["score"], 0.5);
        assert!(json.get("sortDate").is_some());
    }
}
