//! Services layer - Business logic
//!
//! This module contains the business logic of ScholarFeed.
//! Services are responsible for:
//! - Validating input before it reaches the repositories
//! - Ranking the feed
//! - Dispatching notifications after successful interactions

pub mod content;
pub mod feed;
pub mod interaction;
pub mod notification;
pub mod publication;
pub mod tag;
pub mod user;

pub use content::ContentLoader;
pub use feed::{FeedRanker, FeedService, RankedFeed, ScoredEntry, ViewerContext};
pub use interaction::{InteractionService, InteractionServiceError};
pub use notification::{NotificationDispatcher, NotificationService, NotificationServiceError};
pub use publication::{PublicationService, PublicationServiceError};
pub use tag::{TagService, TagServiceError};
pub use user::{UserService, UserServiceError};
