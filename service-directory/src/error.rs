//! Error taxonomy shared by every [`Directory`](crate::Directory) and
//! [`ChangeFeed`](crate::ChangeFeed).
//!
//! Setup-time failures are returned from `lookup()` and `subscribe()`.
//! Steady-state failures are delivered inside the feed as
//! `Err(SubscriptionError)` and never end it; the end of a feed is `None`.

use std::time::Duration;

/// Returned by [`Directory::lookup`](crate::Directory::lookup).
///
/// Fatal to the call that produced it only, callers may retry.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// The backend could not be reached.
    #[error("service discovery backend is unreachable")]
    Unreachable(#[source] anyhow::Error),
    /// The backend rejected the query.
    #[error("invalid service discovery query: {0}")]
    InvalidQuery(String),
    /// The backend did not answer in time.
    #[error("service discovery lookup timed out after {0:?}")]
    Timeout(Duration),
    /// The backend is permanently gone.
    #[error("service discovery backend has shut down")]
    Shutdown,
}

impl LookupError {
    /// Whether no later lookup can succeed either.
    ///
    /// Feeds fed by a lookup that fails this way are exhausted rather than
    /// handed an interim error.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LookupError::Shutdown)
    }
}

/// Returned by [`Directory::subscribe`](crate::Directory::subscribe): the
/// feed was never created.
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionSetupError {
    /// The initial resolution required to open the feed failed.
    #[error("failed to resolve service instances while subscribing")]
    Lookup(#[from] LookupError),
    /// The service the subscription was requested for is not valid.
    #[error("invalid service: {0}")]
    InvalidService(String),
    /// The backend no longer accepts subscriptions.
    #[error("service discovery backend has shut down")]
    Shutdown,
}

/// An interim failure carried as an element of a feed.
///
/// Receiving one says nothing about the feed's lifetime: the producer keeps
/// delivering afterwards.
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    /// A refresh of the instance set failed.
    #[error("failed to refresh service instances")]
    Lookup(#[from] LookupError),
    /// The backend reported a failure of its own.
    #[error("service discovery backend failure")]
    Backend(#[source] anyhow::Error),
}

/// Returned by [`FeedSender`](crate::FeedSender) once its feed has been
/// cancelled or dropped by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("change feed was closed by its consumer")]
pub struct FeedClosed;
