//! Publication service
//!
//! Publication lifecycle (create, edit, delete by the author) and the
//! per-user listings: authored, saved and shared publications.

use crate::db::repositories::{InteractionRepository, PublicationRepository};
use crate::models::{
    dedup_tag_names, paginate, CreatePublicationInput, ListParams, PagedResult, Publication,
    PublicationView, ShareView, UpdatePublicationInput, MAX_TAG_NAME_LEN, MAX_TITLE_LEN,
};
use crate::services::content::ContentLoader;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

/// `10.<registrant>/<suffix>`
static DOI_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^10\.\d{4,9}/\S+$").expect("DOI pattern is valid"));

/// Error types for publication service operations
#[derive(Debug, thiserror::Error)]
pub enum PublicationServiceError {
    #[error("Publication not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Only the author may change or remove a publication
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct PublicationService {
    repo: Arc<dyn PublicationRepository>,
    interactions: Arc<dyn InteractionRepository>,
    loader: ContentLoader,
}

impl PublicationService {
    pub fn new(
        repo: Arc<dyn PublicationRepository>,
        interactions: Arc<dyn InteractionRepository>,
        loader: ContentLoader,
    ) -> Self {
        Self {
            repo,
            interactions,
            loader,
        }
    }

    pub async fn create(
        &self,
        author_id: i64,
        mut input: CreatePublicationInput,
    ) -> Result<PublicationView, PublicationServiceError> {
        input.title = validate_title(&input.title)?;
        input.doi = validate_doi(input.doi.as_deref())?;
        input.abstract_text = non_blank(input.abstract_text);
        input.file_url = non_blank(input.file_url);
        input.tags = validate_tags(&input.tags)?;

        let publication = self.repo.create(author_id, &input).await?;
        tracing::info!(
            publication_id = publication.id,
            author_id,
            tags = input.tags.len(),
            "Publication created"
        );
        self.view(publication, Some(author_id)).await
    }

    /// Author-only partial update
    pub async fn update(
        &self,
        id: i64,
        user_id: i64,
        mut input: UpdatePublicationInput,
    ) -> Result<PublicationView, PublicationServiceError> {
        let existing = self.owned(id, user_id).await?;

        if let Some(title) = &input.title {
            input.title = Some(validate_title(title)?);
        }
        input.doi = validate_doi(input.doi.as_deref())?;
        input.abstract_text = non_blank(input.abstract_text);
        input.file_url = non_blank(input.file_url);
        if let Some(tags) = &input.tags {
            input.tags = Some(validate_tags(tags)?);
        }

        if !input.has_changes() {
            return self.view(existing, Some(user_id)).await;
        }

        let updated = self
            .repo
            .update(id, &input)
            .await?
            .ok_or_else(|| PublicationServiceError::NotFound(id.to_string()))?;
        tracing::info!(publication_id = id, "Publication updated");
        self.view(updated, Some(user_id)).await
    }

    /// Author-only; takes ratings, saves, shares and tag links with it
    pub async fn delete(&self, id: i64, user_id: i64) -> Result<(), PublicationServiceError> {
        self.owned(id, user_id).await?;
        if !self.repo.delete(id).await? {
            return Err(PublicationServiceError::NotFound(id.to_string()));
        }
        tracing::info!(publication_id = id, author_id = user_id, "Publication deleted");
        Ok(())
    }

    pub async fn get(
        &self,
        id: i64,
        viewer_id: Option<i64>,
    ) -> Result<PublicationView, PublicationServiceError> {
        let publication = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| PublicationServiceError::NotFound(id.to_string()))?;
        self.view(publication, viewer_id).await
    }

    pub async fn list_by_author(
        &self,
        author_id: i64,
        viewer_id: Option<i64>,
        params: ListParams,
    ) -> Result<PagedResult<PublicationView>, PublicationServiceError> {
        let all = self.repo.list_by_author(author_id).await?;
        let page = paginate(all, &params);
        let total = page.total_count;

        let details = self.loader.publication_details(page.items).await?;
        let views = self.loader.publication_views(details, viewer_id).await?;
        Ok(PagedResult::new(views, total, &params))
    }

    /// The user's saved publications, most recently saved first
    pub async fn list_saved(
        &self,
        user_id: i64,
        params: ListParams,
    ) -> Result<PagedResult<PublicationView>, PublicationServiceError> {
        let ids = self.interactions.saved_publication_ids(user_id).await?;
        let page = paginate(ids, &params);
        let total = page.total_count;

        let mut found: HashMap<i64, Publication> = self
            .repo
            .get_by_ids(&page.items)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        let ordered: Vec<Publication> = page.items.iter().filter_map(|id| found.remove(id)).collect();

        let details = self.loader.publication_details(ordered).await?;
        let views = self.loader.publication_views(details, Some(user_id)).await?;
        Ok(PagedResult::new(views, total, &params))
    }

    pub async fn list_shares_by_user(
        &self,
        user_id: i64,
        viewer_id: Option<i64>,
        params: ListParams,
    ) -> Result<PagedResult<ShareView>, PublicationServiceError> {
        let shares = self.interactions.list_shares_by_user(user_id).await?;
        let page = paginate(shares, &params);
        let total = page.total_count;

        let details = self.loader.share_details(page.items, &HashMap::new()).await?;
        let views = self.loader.share_views(details, viewer_id).await?;
        Ok(PagedResult::new(views, total, &params))
    }

    async fn owned(&self, id: i64, user_id: i64) -> Result<Publication, PublicationServiceError> {
        let publication = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| PublicationServiceError::NotFound(id.to_string()))?;
        if publication.author_id != user_id {
            return Err(PublicationServiceError::Forbidden(
                "Only the author can modify this publication".to_string(),
            ));
        }
        Ok(publication)
    }

    async fn view(
        &self,
        publication: Publication,
        viewer_id: Option<i64>,
    ) -> Result<PublicationView, PublicationServiceError> {
        let details = self.loader.publication_details(vec![publication]).await?;
        let mut views = self.loader.publication_views(details, viewer_id).await?;
        views
            .pop()
            .ok_or_else(|| PublicationServiceError::InternalError(anyhow::anyhow!("Publication view missing")))
    }
}

fn validate_title(title: &str) -> Result<String, PublicationServiceError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(PublicationServiceError::ValidationError(
            "Title is required".to_string(),
        ));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(PublicationServiceError::ValidationError(format!(
            "Title must be at most {} characters",
            MAX_TITLE_LEN
        )));
    }
    Ok(title.to_string())
}

/// Blank means "no DOI"; anything else must look like `10.xxxx/suffix`
fn validate_doi(doi: Option<&str>) -> Result<Option<String>, PublicationServiceError> {
    let Some(doi) = doi.map(str::trim).filter(|d| !d.is_empty()) else {
        return Ok(None);
    };
    if !DOI_PATTERN.is_match(doi) {
        return Err(PublicationServiceError::ValidationError(format!(
            "Invalid DOI: {}",
            doi
        )));
    }
    Ok(Some(doi.to_string()))
}

fn validate_tags(tags: &[String]) -> Result<Vec<String>, PublicationServiceError> {
    let tags = dedup_tag_names(tags);
    if let Some(long) = tags.iter().find(|t| t.chars().count() > MAX_TAG_NAME_LEN) {
        return Err(PublicationServiceError::ValidationError(format!(
            "Tag name too long: {}",
            long
        )));
    }
    Ok(tags)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
