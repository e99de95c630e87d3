//! `service-directory` defines the contract between service discovery backends and the
//! clients that consume them: a [`Directory`] that can look up the instances of a service,
//! and a [`ChangeFeed`] that streams every change of that instance set.
//!
//! # Simple example
//!
//! ```rust
//! #[tokio::main]
//! async fn main() {
//!     use service_directory::{Directory, InMemoryDirectory};
//!
//!     // A directory over a fixed set of instances.
//!     let directory = InMemoryDirectory::new(["10.0.0.1:5000", "10.0.0.2:5000"]);
//!
//!     let snapshot = directory.lookup().await.expect("lookup failed");
//!     assert_eq!(snapshot.len(), 2);
//! }
//! ```
//!
//! # Subscriptions
//!
//! A feed yields `Some(Ok(snapshot))` for every new instance set and `Some(Err(_))` for
//! interim failures of the backend. Interim failures do not end the feed: a consumer that
//! stops at the first error turns a hiccup of the discovery backend into an outage of its own,
//! even though the discovered service may be perfectly healthy. The feed only ends (`None`)
//! when the backend is gone for good or the consumer cancels it.
//!
//! ```rust
//! #[tokio::main]
//! async fn main() {
//!     use service_directory::{Directory, InMemoryDirectory, SnapshotTracker, Update};
//!
//!     let directory = InMemoryDirectory::new(["a", "b"]);
//!     let mut feed = directory.subscribe().await.expect("failed to subscribe");
//!     let mut tracker = SnapshotTracker::new();
//!
//!     // The first event is the current instance set.
//!     let update = tracker.observe(feed.next().await.expect("feed ended"));
//!     assert!(matches!(update, Update::Changed(_)));
//!
//!     directory.fail("registry unavailable");
//!     let update = tracker.observe(feed.next().await.expect("feed ended"));
//!     assert_eq!(update, Update::Degraded { consecutive_errors: 1 });
//!     // Keep serving the last known instances.
//!     assert_eq!(tracker.current().map(|snapshot| snapshot.len()), Some(2));
//!
//!     directory.shutdown();
//!     assert!(feed.next().await.is_none());
//! }
//! ```
//!
//! # Polling backends
//!
//! Backends that can only list instances implement [`LookupService`] and are turned into a
//! [`Directory`] by [`PollingDirectory`], which probes them on an interval.
//!
//! ```rust
//! use service_directory::{LookupError, LookupService, ServiceDefinition};
//! use std::net::SocketAddr;
//!
//! // This does nothing
//! struct DummyLookupService;
//!
//! #[async_trait::async_trait]
//! impl LookupService for DummyLookupService {
//!     type Instance = SocketAddr;
//!
//!     async fn resolve_service_instances(
//!         &self,
//!         _definition: &ServiceDefinition,
//!     ) -> Result<Vec<SocketAddr>, LookupError> {
//!         Ok(Vec::new())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     use service_directory::{PollingDirectory, ResolutionStrategy};
//!     use std::time::Duration;
//!
//!     let directory = PollingDirectory::builder(("my.hostname", 5000), DummyLookupService)
//!         .probe_interval(Duration::from_secs(3))
//!         .lookup_timeout(Duration::from_secs(1))
//!         .resolution_strategy(ResolutionStrategy::Eager {
//!             timeout: Duration::from_secs(20),
//!         })
//!         .build()
//!         .expect("failed to construct PollingDirectory");
//! }
//! ```
//!
//! # Internals
//! Every feed handed out by this crate is a [`Subscription`]: a bounded channel filled by a
//! producer task. Cancelling or dropping the subscription aborts that task, so backend
//! resources are released even if the producer is stuck waiting on the backend.

mod consumer;
mod directory;
mod error;
pub mod feed;
mod in_memory;
mod lookup_service;
mod polling;
mod service_definition;
mod service_probe;
mod snapshot;

pub use consumer::*;
pub use directory::*;
pub use error::*;
pub use feed::{CancelHandle, ChangeFeed, FeedSender, FeedState, Subscription};
pub use in_memory::*;
pub use lookup_service::*;
pub use polling::*;
pub use service_definition::*;
pub use snapshot::*;
