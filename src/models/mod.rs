//! Data models
//!
//! This module contains the data structures used throughout ScholarFeed:
//! - Database entities (User, Session, Publication, Rating, Share, Tag, Notification)
//! - Feed entries and pages
//! - API request/response types

mod feed;
mod interaction;
mod notification;
mod pagination;
mod publication;
mod session;
mod tag;
mod user;

pub use feed::{FeedContent, FeedEntry, FeedItem, FeedKey, FeedKind, FeedPage};
pub use interaction::{
    mean_average, mean_score, FollowState, Rating, RatingSummary, SaveState, Share, ShareDetail,
    ShareInput, ShareState, ShareView, MAX_SCORE, MIN_SCORE,
};
pub use notification::{NewNotification, Notification, NotificationType};
pub use pagination::{paginate, ListParams, PagedResult, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use publication::{
    CreatePublicationInput, Publication, PublicationDetail, PublicationView,
    UpdatePublicationInput, ViewerFlags, MAX_TITLE_LEN,
};
pub use session::Session;
pub use tag::{dedup_tag_names, normalize_tag_name, Tag, MAX_TAG_NAME_LEN};
pub use user::{CreateUserInput, User, UserSummary};
