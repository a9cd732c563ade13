//! Assembles display models from repository rows.
//!
//! Publications and shares are stored flat; the API returns them with tag
//! names, author/sharer cards and the viewer's flags. All lookups are bulk
//! queries keyed by the ids present in the batch.

use crate::db::repositories::{InteractionRepository, PublicationRepository, UserRepository};
use crate::models::{
    Publication, PublicationDetail, PublicationView, Share, ShareDetail, ShareView, UserSummary,
    ViewerFlags,
};
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Clone)]
pub struct ContentLoader {
    publications: Arc<dyn PublicationRepository>,
    users: Arc<dyn UserRepository>,
    interactions: Arc<dyn InteractionRepository>,
}

impl ContentLoader {
    pub fn new(
        publications: Arc<dyn PublicationRepository>,
        users: Arc<dyn UserRepository>,
        interactions: Arc<dyn InteractionRepository>,
    ) -> Self {
        Self {
            publications,
            users,
            interactions,
        }
    }

    /// User cards for the given ids; vanished users get a placeholder
    pub async fn summaries(&self, ids: impl IntoIterator<Item = i64>) -> Result<HashMap<i64, UserSummary>> {
        let ids: Vec<i64> = unique(ids);
        let users = self.users.get_by_ids(&ids).await?;
        let mut cards: HashMap<i64, UserSummary> =
            users.iter().map(|u| (u.id, u.summary())).collect();
        for id in ids {
            cards.entry(id).or_insert_with(|| UserSummary::unknown(id));
        }
        Ok(cards)
    }

    /// Attach tags and author cards, preserving input order
    pub async fn publication_details(&self, publications: Vec<Publication>) -> Result<Vec<PublicationDetail>> {
        let ids: Vec<i64> = publications.iter().map(|p| p.id).collect();
        let mut tags = self.publications.tag_names(&ids).await?;
        let authors = self.summaries(publications.iter().map(|p| p.author_id)).await?;
        Ok(join_details(publications, &mut tags, &authors))
    }

    /// Details for every publication in the corpus, newest first
    pub async fn all_publication_details(&self) -> Result<Vec<PublicationDetail>> {
        let publications = self.publications.list_all().await?;
        let mut tags = self.publications.all_tag_names().await?;
        let authors = self.summaries(publications.iter().map(|p| p.author_id)).await?;
        Ok(join_details(publications, &mut tags, &authors))
    }

    /// Join shares with their sharer and shared publication. Shares whose
    /// publication is gone are dropped.
    pub async fn share_details(
        &self,
        shares: Vec<Share>,
        known: &HashMap<i64, PublicationDetail>,
    ) -> Result<Vec<ShareDetail>> {
        let missing: Vec<i64> = unique(
            shares
                .iter()
                .map(|s| s.publication_id)
                .filter(|id| !known.contains_key(id)),
        );
        let mut fetched: HashMap<i64, PublicationDetail> = HashMap::new();
        if !missing.is_empty() {
            let publications = self.publications.get_by_ids(&missing).await?;
            for detail in self.publication_details(publications).await? {
                fetched.insert(detail.publication.id, detail);
            }
        }

        let sharers = self.summaries(shares.iter().map(|s| s.user_id)).await?;
        Ok(shares
            .into_iter()
            .filter_map(|share| {
                let publication = known
                    .get(&share.publication_id)
                    .or_else(|| fetched.get(&share.publication_id))?
                    .clone();
                let sharer = sharers
                    .get(&share.user_id)
                    .cloned()
                    .unwrap_or_else(|| UserSummary::unknown(share.user_id));
                Some(ShareDetail {
                    share,
                    sharer,
                    publication,
                })
            })
            .collect())
    }

    /// Viewer flags for the given publications; all-false for anonymous viewers
    pub async fn viewer_flags(
        &self,
        viewer_id: Option<i64>,
        publication_ids: impl IntoIterator<Item = i64>,
    ) -> Result<HashMap<i64, ViewerFlags>> {
        match viewer_id {
            Some(viewer_id) => {
                let ids = unique(publication_ids);
                self.interactions.viewer_flags(viewer_id, &ids).await
            }
            None => Ok(HashMap::new()),
        }
    }

    pub async fn publication_views(
        &self,
        details: Vec<PublicationDetail>,
        viewer_id: Option<i64>,
    ) -> Result<Vec<PublicationView>> {
        let flags = self
            .viewer_flags(viewer_id, details.iter().map(|d| d.publication.id))
            .await?;
        Ok(details
            .into_iter()
            .map(|d| {
                let f = flags.get(&d.publication.id).copied().unwrap_or_default();
                d.into_view(f)
            })
            .collect())
    }

    pub async fn share_views(&self, details: Vec<ShareDetail>, viewer_id: Option<i64>) -> Result<Vec<ShareView>> {
        let flags = self
            .viewer_flags(viewer_id, details.iter().map(|d| d.share.publication_id))
            .await?;
        Ok(details
            .into_iter()
            .map(|d| {
                let f = flags.get(&d.share.publication_id).copied().unwrap_or_default();
                d.into_view(f)
            })
            .collect())
    }
}

fn join_details(
    publications: Vec<Publication>,
    tags: &mut HashMap<i64, Vec<String>>,
    authors: &HashMap<i64, UserSummary>,
) -> Vec<PublicationDetail> {
    publications
        .into_iter()
        .map(|publication| PublicationDetail {
            tags: tags.remove(&publication.id).unwrap_or_default(),
            author: authors
                .get(&publication.author_id)
                .cloned()
                .unwrap_or_else(|| UserSummary::unknown(publication.author_id)),
            publication,
        })
        .collect()
}

/// Deduplicate ids keeping first-seen order
fn unique(ids: impl IntoIterator<Item = i64>) -> Vec<i64> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_publication, insert_user, migrated_pool};
    use crate::db::repositories::{
        SqlxInteractionRepository, SqlxPublicationRepository, SqlxUserRepository,
    };
    use crate::models::CreatePublicationInput;

    #[test]
    fn test_unique_keeps_first_occurrence() {
        assert_eq!(unique([3, 1, 3, 2, 1]), vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_share_details_join_and_flags() {
        let pool = migrated_pool().await;
        let author = insert_user(&pool, "Ada").await;
        let fan = insert_user(&pool, "Cyd").await;
        let publications = SqlxPublicationRepository::boxed(pool.clone());
        let interactions = SqlxInteractionRepository::boxed(pool.clone());
        let loader = ContentLoader::new(
            publications.clone(),
            SqlxUserRepository::boxed(pool.clone()),
            interactions.clone(),
        );

        let paper = publications
            .create(author, &CreatePublicationInput::new("Paper").with_tags(["Graphs"]))
            .await
            .unwrap();
        let orphan = insert_publication(&pool, author, "Untagged").await;
        interactions.create_share(paper.id, fan, Some("must read")).await.unwrap();
        interactions.toggle_save(paper.id, fan).await.unwrap();

        let shares = interactions.list_shares().await.unwrap();
        let details = loader.share_details(shares, &HashMap::new()).await.unwrap();
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].sharer.full_name, "Cyd");
        assert_eq!(details[0].publication.tags, vec!["Graphs".to_string()]);
        assert_eq!(details[0].publication.author.full_name, "Ada");

        let views = loader.share_views(details, Some(fan)).await.unwrap();
        assert!(views[0].publication.flags.is_saved);
        assert!(views[0].publication.flags.is_shared);

        let anonymous = loader
            .publication_views(loader.all_publication_details().await.unwrap(), None)
            .await
            .unwrap();
        assert_eq!(anonymous.len(), 2);
        assert!(anonymous.iter().all(|v| v.flags == ViewerFlags::default()));
        assert!(anonymous
            .iter()
            .any(|v| v.detail.publication.id == orphan && v.detail.tags.is_empty()));
    }
}
