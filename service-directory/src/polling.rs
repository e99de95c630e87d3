//! Provides the builder and implementation of a [`Directory`] that enables
//! periodic service discovery over any [`LookupService`].

use crate::{
    service_probe::{ServiceProbe, ServiceProbeConfig},
    Directory, LookupError, LookupService, ServiceDefinition, Snapshot, Subscription,
    SubscriptionSetupError,
};
use anyhow::Context as _;
use std::sync::Arc;
use tokio::time::Duration;

// How often every subscription re-resolves the service by default.
static DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(10);

// Bounds every single lookup unless configured otherwise, so that a stalled
// backend surfaces as `LookupError::Timeout`.
static DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

// Determines how many events a subscription buffers for a slow consumer
// before its probe waits.
static DEFAULT_FEED_CAPACITY: usize = 32;

/// Implements [`Directory`] for backends that can only list the instances of
/// a service, by polling them on an interval.
///
/// Every subscription polls independently. Results equal to the last
/// delivered snapshot are not delivered again, so a quiet service produces no
/// events. Failed polls are delivered as interim errors and never end a
/// subscription; only [`LookupError::Shutdown`] does.
///
/// ```rust
/// use service_directory::{LookupError, LookupService, ServiceDefinition};
/// use std::net::SocketAddr;
///
/// struct Loopback;
///
/// #[async_trait::async_trait]
/// impl LookupService for Loopback {
///     type Instance = SocketAddr;
///
///     async fn resolve_service_instances(
///         &self,
///         definition: &ServiceDefinition,
///     ) -> Result<Vec<SocketAddr>, LookupError> {
///         Ok(vec![([127, 0, 0, 1], definition.port()).into()])
///     }
/// }
///
/// #[tokio::main]
/// async fn main() {
///     use service_directory::{Directory, PollingDirectory};
///     use std::time::Duration;
///
///     let directory = PollingDirectory::builder(("my.hostname", 5000), Loopback)
///         .probe_interval(Duration::from_secs(3))
///         .build()
///         .expect("failed to construct PollingDirectory");
///
///     let snapshot = directory.lookup().await.expect("lookup failed");
///     assert_eq!(snapshot.len(), 1);
///
///     let mut feed = directory.subscribe().await.expect("subscribe failed");
///     let first = feed.next().await.expect("feed ended").expect("interim error");
///     assert_eq!(first, snapshot);
/// }
/// ```
pub struct PollingDirectory<L> {
    probe: Arc<ServiceProbe<L>>,
    feed_capacity: usize,
    resolution_strategy: ResolutionStrategy,
}

impl<L> Clone for PollingDirectory<L> {
    fn clone(&self) -> Self {
        Self {
            probe: Arc::clone(&self.probe),
            feed_capacity: self.feed_capacity,
            resolution_strategy: self.resolution_strategy,
        }
    }
}

impl<L: LookupService + 'static> PollingDirectory<L> {
    /// Start configuring a `PollingDirectory` by passing in the [`ServiceDefinition`]
    /// of the service you want to discover - e.g. `my.service.uri` and `5000` -
    /// and the [`LookupService`] that resolves it.
    pub fn builder<S>(service_definition: S, lookup_service: L) -> PollingDirectoryBuilder<L, S>
    where
        S: TryInto<ServiceDefinition>,
        S::Error: Into<Box<dyn std::error::Error + Send + Sync>> + Send + Sync,
    {
        PollingDirectoryBuilder::new(service_definition, lookup_service)
    }

    /// The service this directory resolves.
    pub fn service_definition(&self) -> &ServiceDefinition {
        self.probe.service_definition()
    }

    async fn resolve_eagerly(
        &self,
        timeout: Duration,
    ) -> Result<Snapshot<L::Instance>, SubscriptionSetupError> {
        match tokio::time::timeout(timeout, self.probe.probe_once()).await {
            Ok(Ok(snapshot)) => Ok(snapshot),
            Ok(Err(LookupError::Shutdown)) => Err(SubscriptionSetupError::Shutdown),
            Ok(Err(err)) => Err(err.into()),
            Err(_) => Err(LookupError::Timeout(timeout).into()),
        }
    }
}

#[async_trait::async_trait]
impl<L: LookupService + 'static> Directory for PollingDirectory<L> {
    type Instance = L::Instance;
    type Feed = Subscription<L::Instance>;

    #[tracing::instrument(level = "debug", skip(self))]
    async fn lookup(&self) -> Result<Snapshot<L::Instance>, LookupError> {
        self.probe.probe_once().await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn subscribe(&self) -> Result<Subscription<L::Instance>, SubscriptionSetupError> {
        let initial = match self.resolution_strategy {
            ResolutionStrategy::Lazy => None,
            ResolutionStrategy::Eager { timeout } => Some(self.resolve_eagerly(timeout).await?),
        };

        let probe = Arc::clone(&self.probe);
        Ok(Subscription::spawn(self.feed_capacity, move |sender| async move {
            if let Some(snapshot) = &initial {
                if sender.send_snapshot(snapshot.clone()).await.is_err() {
                    return;
                }
            }
            probe.probe(sender, initial).await
        }))
    }
}

/// Enumerates the different resolution strategies that
/// [`PollingDirectory::subscribe`](Directory::subscribe) supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStrategy {
    /// Opens the subscription without contacting the backend; the first
    /// probe runs in the background.
    Lazy,
    /// Resolves the service before the subscription is returned, so that it
    /// starts with a known snapshot. If that fails, subscribing fails too.
    Eager { timeout: Duration },
}

/// Builder to configure and create a [`PollingDirectory`].
pub struct PollingDirectoryBuilder<L, S> {
    service_definition: S,
    lookup_service: L,
    probe_interval: Option<Duration>,
    lookup_timeout: Option<Duration>,
    feed_capacity: Option<usize>,
    resolution_strategy: ResolutionStrategy,
}

impl<L, S> PollingDirectoryBuilder<L, S>
where
    L: LookupService + 'static,
    S: TryInto<ServiceDefinition>,
    S::Error: Into<Box<dyn std::error::Error + Send + Sync>> + Send + Sync,
{
    /// Set the [`ServiceDefinition`] of the service and the [`LookupService`]
    /// used to resolve it.
    pub fn new(service_definition: S, lookup_service: L) -> PollingDirectoryBuilder<L, S> {
        Self {
            service_definition,
            lookup_service,
            probe_interval: None,
            lookup_timeout: None,
            feed_capacity: None,
            resolution_strategy: ResolutionStrategy::Lazy,
        }
    }

    /// Set how often subscriptions probe for changes to the service instances.
    /// Default interval in seconds is 10.
    pub fn probe_interval(self, interval: Duration) -> PollingDirectoryBuilder<L, S> {
        Self {
            probe_interval: Some(interval),
            ..self
        }
    }

    /// Set a timeout that bounds every lookup against the backend.
    /// Default timeout in seconds is 5.
    pub fn lookup_timeout(self, timeout: Duration) -> PollingDirectoryBuilder<L, S> {
        Self {
            lookup_timeout: Some(timeout),
            ..self
        }
    }

    /// Set how many events a subscription buffers for its consumer.
    /// Default is 32.
    pub fn feed_capacity(self, capacity: usize) -> PollingDirectoryBuilder<L, S> {
        Self {
            feed_capacity: Some(capacity),
            ..self
        }
    }

    /// Set the [`ResolutionStrategy`].
    ///
    /// Default set to [`ResolutionStrategy::Lazy`].
    pub fn resolution_strategy(
        self,
        resolution_strategy: ResolutionStrategy,
    ) -> PollingDirectoryBuilder<L, S> {
        Self {
            resolution_strategy,
            ..self
        }
    }

    /// Construct a [`PollingDirectory`] from the [`PollingDirectoryBuilder`] instance.
    pub fn build(self) -> Result<PollingDirectory<L>, anyhow::Error> {
        let service_definition = self
            .service_definition
            .try_into()
            .map_err(Into::into)
            .map_err(|err| anyhow::anyhow!(err))
            .context("invalid service definition")?;

        let probe_interval = self.probe_interval.unwrap_or(DEFAULT_PROBE_INTERVAL);
        anyhow::ensure!(!probe_interval.is_zero(), "'probe_interval' must be non-zero");

        let lookup_timeout = self.lookup_timeout.unwrap_or(DEFAULT_LOOKUP_TIMEOUT);

        let feed_capacity = self.feed_capacity.unwrap_or(DEFAULT_FEED_CAPACITY);
        anyhow::ensure!(feed_capacity > 0, "'feed_capacity' must be non-zero");

        let config = ServiceProbeConfig {
            service_definition,
            lookup_service: self.lookup_service,
            lookup_timeout,
            probe_interval,
        };

        Ok(PollingDirectory {
            probe: Arc::new(ServiceProbe::new(config)),
            feed_capacity,
            resolution_strategy: self.resolution_strategy,
        })
    }
}


const _: () = {
    const fn assert_is_send<T: Send>() {}
    assert_is_send::<PollingDirectoryBuilder<(), ServiceDefinition>>();
    assert_is_send::<Subscription<std::net::SocketAddr>>();
};
