//! Database repositories
//!
//! Repository pattern implementations for database access. Every mutation
//! that touches a fact row and a derived counter runs in one transaction
//! inside the repository, so callers never observe them apart.

mod aggregate;
pub mod follow;
pub mod interaction;
pub mod notification;
pub mod publication;
pub mod session;
pub mod tag;
pub mod user;

pub use follow::{FollowRepository, SqlxFollowRepository};
pub use interaction::{InteractionRepository, SqlxInteractionRepository};
pub use notification::{NotificationRepository, SqlxNotificationRepository};
pub use publication::{PublicationRepository, SqlxPublicationRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use tag::{SqlxTagRepository, TagRepository};
pub use user::{SqlxUserRepository, UserRepository};

/// Outcome of a guarded write.
///
/// `NotFound` and `Conflict` are ordinary business outcomes (missing row,
/// uniqueness constraint hit), kept apart from storage failures which travel
/// as `Err`.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome<T> {
    Applied(T),
    NotFound,
    Conflict,
}

/// Upper bound of bind parameters per `IN (...)` query
pub(crate) const IN_CHUNK: usize = 500;

/// `?, ?, ?` with `n` markers
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
