//! Defines the interface every service discovery backend implements.

use crate::{ChangeFeed, Instance, LookupError, Snapshot, SubscriptionSetupError};

/// Provides the instances of one service, on demand and on change.
///
/// A `Directory` is bound to a single service at construction time. It must
/// be safe to call [`lookup`](Directory::lookup) and
/// [`subscribe`](Directory::subscribe) concurrently from many tasks.
///
/// The element type of the feed is tied to the directory's instance type
/// through the `Feed` bound, so a directory of `SocketAddr`s can only hand
/// out feeds of `SocketAddr` snapshots.
#[async_trait::async_trait]
pub trait Directory: Send + Sync {
    /// The instance type this directory discovers.
    type Instance: Instance;
    /// The feed returned by [`subscribe`](Directory::subscribe).
    type Feed: ChangeFeed<Instance = Self::Instance>;

    /// Return every instance currently known for the service.
    ///
    /// Has no side effect on shared state. Backends that impose a timeout
    /// report it as [`LookupError::Timeout`].
    async fn lookup(&self) -> Result<Snapshot<Self::Instance>, LookupError>;

    /// Open a new feed of instance-set changes.
    ///
    /// Every call returns an independent feed. Failures to establish the
    /// feed are returned here; failures after that are delivered through
    /// the feed as interim errors.
    async fn subscribe(&self) -> Result<Self::Feed, SubscriptionSetupError>;
}
