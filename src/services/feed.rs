//! Feed service
//!
//! Merges every publication and every active share into one stream, scores
//! each entry for the viewer, sorts and cuts one page.
//!
//! Score of an entry:
//!
//! ```text
//! recency    * 1 / (1 + age_hours / half_life_hours)
//! + follow     * [viewer follows the author (or the sharer, for a share)]
//! + topic      * |publication tags ∩ viewer interests|   (case-insensitive)
//! + engagement * ln(1 + saves + shares + citations)
//! + rating     * average_rating
//! ```
//!
//! Ordering is score descending, then sort date descending, then entry key
//! ascending, which makes it total. If scoring overruns the configured time
//! budget the page falls back to sort-date order and is flagged `degraded`.
//!
//! The whole corpus is materialized per request, which caps the corpus size
//! this can serve with acceptable latency.
// TODO: replace the full scan with an indexed top-k candidate query once the
// corpus outgrows a single in-memory sort.

use crate::config::{FeedConfig, FeedWeights};
use crate::db::repositories::{FollowRepository, InteractionRepository, TagRepository};
use crate::models::{
    FeedContent, FeedEntry, FeedItem, FeedPage, ListParams, PublicationDetail,
};
use crate::services::content::ContentLoader;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Entries scored between two budget checks
const BUDGET_CHECK_INTERVAL: usize = 64;

/// What the ranker knows about the viewer
#[derive(Debug, Clone, Default)]
pub struct ViewerContext {
    followed: HashSet<i64>,
    /// Lowercased interest names
    interests: HashSet<String>,
}

impl ViewerContext {
    /// No follows, no interests
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn new(followed: impl IntoIterator<Item = i64>, interests: impl IntoIterator<Item = String>) -> Self {
        Self {
            followed: followed.into_iter().collect(),
            interests: interests.into_iter().map(|i| i.to_lowercase()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub entry: FeedEntry,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct RankedFeed {
    pub entries: Vec<ScoredEntry>,
    pub degraded: bool,
}

/// Stateless scorer and sorter
#[derive(Debug, Clone)]
pub struct FeedRanker {
    weights: FeedWeights,
    half_life_hours: f64,
    budget: Duration,
}

impl FeedRanker {
    pub fn new(weights: FeedWeights, half_life_hours: f64, budget: Duration) -> Self {
        Self {
            weights,
            half_life_hours,
            budget,
        }
    }

    pub fn from_config(config: &FeedConfig) -> Self {
        Self::new(
            config.weights,
            config.recency_half_life_hours,
            Duration::from_millis(config.scoring_budget_ms),
        )
    }

    /// Recency factor in (0, 1]; entries dated in the future count as new
    pub fn recency(&self, sort_date: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let age_hours = (now - sort_date).num_milliseconds().max(0) as f64 / 3_600_000.0;
        1.0 / (1.0 + age_hours / self.half_life_hours)
    }

    pub fn score(&self, entry: &FeedEntry, viewer: &ViewerContext, now: DateTime<Utc>) -> f64 {
        let w = &self.weights;
        let detail = entry.publication();
        let publication = &detail.publication;

        let followed = if viewer.followed.contains(&entry.actor_id()) {
            1.0
        } else {
            0.0
        };
        let topic_hits = topic_overlap(detail, &viewer.interests) as f64;
        let engagement = (publication.engagement().max(0) as f64).ln_1p();

        w.recency * self.recency(entry.sort_date(), now)
            + w.follow * followed
            + w.topic * topic_hits
            + w.engagement * engagement
            + w.rating * publication.average_rating
    }

    /// Score and sort all entries against one `now`
    pub fn rank(&self, entries: Vec<FeedEntry>, viewer: &ViewerContext, now: DateTime<Utc>) -> RankedFeed {
        let started = Instant::now();
        let mut scores = Vec::with_capacity(entries.len());

        for (i, entry) in entries.iter().enumerate() {
            if i % BUDGET_CHECK_INTERVAL == 0 && started.elapsed() >= self.budget {
                tracing::warn!(
                    scored = i,
                    total = entries.len(),
                    budget_ms = self.budget.as_millis() as u64,
                    "Feed scoring exceeded its budget, falling back to date order"
                );
                return by_date(entries);
            }
            scores.push(self.score(entry, viewer, now));
        }

        let mut scored: Vec<ScoredEntry> = entries
            .into_iter()
            .zip(scores)
            .map(|(entry, score)| ScoredEntry { entry, score })
            .collect();
        scored.sort_by(compare_scored);

        RankedFeed {
            entries: scored,
            degraded: false,
        }
    }
}

fn topic_overlap(detail: &PublicationDetail, interests: &HashSet<String>) -> usize {
    if interests.is_empty() {
        return 0;
    }
    detail
        .tags
        .iter()
        .map(|t| t.to_lowercase())
        .collect::<HashSet<_>>()
        .iter()
        .filter(|t| interests.contains(*t))
        .count()
}

fn compare_scored(a: &ScoredEntry, b: &ScoredEntry) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| compare_by_date(&a.entry, &b.entry))
}

fn compare_by_date(a: &FeedEntry, b: &FeedEntry) -> Ordering {
    b.sort_date()
        .cmp(&a.sort_date())
        .then_with(|| a.key().cmp(&b.key()))
}

/// Degraded ordering: sort date only, scores zeroed
fn by_date(mut entries: Vec<FeedEntry>) -> RankedFeed {
    entries.sort_by(compare_by_date);
    RankedFeed {
        entries: entries
            .into_iter()
            .map(|entry| ScoredEntry { entry, score: 0.0 })
            .collect(),
        degraded: true,
    }
}

/// Feed read path
pub struct FeedService {
    loader: ContentLoader,
    interactions: Arc<dyn InteractionRepository>,
    follows: Arc<dyn FollowRepository>,
    tags: Arc<dyn TagRepository>,
    ranker: FeedRanker,
    default_page_size: u32,
    max_page_size: u32,
}

impl FeedService {
    pub fn new(
        loader: ContentLoader,
        interactions: Arc<dyn InteractionRepository>,
        follows: Arc<dyn FollowRepository>,
        tags: Arc<dyn TagRepository>,
        config: &FeedConfig,
    ) -> Self {
        Self {
            loader,
            interactions,
            follows,
            tags,
            ranker: FeedRanker::from_config(config),
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
        }
    }

    /// Normalize raw query values against the configured page sizes
    pub fn page_params(&self, page: Option<i64>, page_size: Option<i64>) -> ListParams {
        ListParams::normalize(
            page.unwrap_or(1),
            page_size.unwrap_or(0),
            self.default_page_size,
            self.max_page_size,
        )
    }

    /// Ranked page for `viewer_id` (anonymous when `None`)
    pub async fn get_feed(
        &self,
        viewer_id: Option<i64>,
        params: ListParams,
        now: DateTime<Utc>,
    ) -> Result<FeedPage> {
        let viewer = self.viewer_context(viewer_id).await?;
        let entries = self.candidates().await?;
        let total_count = entries.len() as u64;

        let ranked = self.ranker.rank(entries, &viewer, now);
        let degraded = ranked.degraded;

        let offset = usize::try_from(params.offset()).unwrap_or(usize::MAX);
        let page: Vec<ScoredEntry> = ranked
            .entries
            .into_iter()
            .skip(offset)
            .take(params.per_page as usize)
            .collect();

        let flags = self
            .loader
            .viewer_flags(viewer_id, page.iter().map(|s| s.entry.publication().publication.id))
            .await?;
        let items: Vec<FeedItem> = page
            .into_iter()
            .map(|scored| {
                let sort_date = scored.entry.sort_date();
                let publication_id = scored.entry.publication().publication.id;
                let f = flags.get(&publication_id).copied().unwrap_or_default();
                let content = match scored.entry {
                    FeedEntry::Publication(detail) => FeedContent::Publication {
                        publication: detail.into_view(f),
                    },
                    FeedEntry::Share(detail) => FeedContent::Share {
                        share: detail.into_view(f),
                    },
                };
                FeedItem {
                    content,
                    score: scored.score,
                    sort_date,
                }
            })
            .collect();

        tracing::debug!(
            viewer_id,
            page = params.page,
            returned = items.len(),
            total_count,
            degraded,
            "Feed page built"
        );

        Ok(FeedPage {
            items,
            total_count,
            page: params.page,
            page_size: params.per_page,
            has_more: params.offset() + params.limit() < total_count,
            degraded,
        })
    }

    async fn viewer_context(&self, viewer_id: Option<i64>) -> Result<ViewerContext> {
        let Some(viewer_id) = viewer_id else {
            return Ok(ViewerContext::anonymous());
        };
        let followed = self.follows.following_ids(viewer_id).await?;
        let interests = self.tags.interest_names(viewer_id).await?;
        Ok(ViewerContext::new(followed, interests))
    }

    /// All publications and all shares
    async fn candidates(&self) -> Result<Vec<FeedEntry>> {
        let publications = self.loader.all_publication_details().await?;
        let by_id: HashMap<i64, PublicationDetail> = publications
            .iter()
            .map(|d| (d.publication.id, d.clone()))
            .collect();

        let shares = self.interactions.list_shares().await?;
        let shares = self.loader.share_details(shares, &by_id).await?;

        let mut entries = Vec::with_capacity(publications.len() + shares.len());
        entries.extend(publications.into_iter().map(FeedEntry::Publication));
        entries.extend(shares.into_iter().map(FeedEntry::Share));
        Ok(entries)
    }
}
