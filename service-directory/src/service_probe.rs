//! Periodically resolves a service and reports instance-set changes into a
//! [`FeedSender`].

use crate::{
    FeedSender, LookupError, LookupService, ServiceDefinition, Snapshot, SubscriptionError,
};
use std::sync::Arc;
use tokio::time::{Duration, MissedTickBehavior};

pub(crate) struct ServiceProbeConfig<L> {
    pub(crate) service_definition: ServiceDefinition,
    pub(crate) lookup_service: L,
    pub(crate) lookup_timeout: Duration,
    pub(crate) probe_interval: Duration,
}

/// Shared by every subscription of a [`PollingDirectory`](crate::PollingDirectory):
/// each feed runs its own [`ServiceProbe::probe`] loop over the same probe.
pub(crate) struct ServiceProbe<L> {
    service_definition: ServiceDefinition,
    lookup_service: L,
    lookup_timeout: Duration,
    probe_interval: Duration,
}

impl<L: LookupService> ServiceProbe<L> {
    pub(crate) fn new(config: ServiceProbeConfig<L>) -> Self {
        Self {
            service_definition: config.service_definition,
            lookup_service: config.lookup_service,
            lookup_timeout: config.lookup_timeout,
            probe_interval: config.probe_interval,
        }
    }

    pub(crate) fn service_definition(&self) -> &ServiceDefinition {
        &self.service_definition
    }

    /// Resolve the service once, bounded by the lookup timeout.
    pub(crate) async fn probe_once(&self) -> Result<Snapshot<L::Instance>, LookupError> {
        let resolve = self
            .lookup_service
            .resolve_service_instances(&self.service_definition);

        let instances = tokio::time::timeout(self.lookup_timeout, resolve)
            .await
            .map_err(|_| LookupError::Timeout(self.lookup_timeout))??;

        Ok(instances.into_iter().collect())
    }

    /// Run until the feed is closed or the backend shuts down.
    ///
    /// A snapshot is only sent when it differs from the last one sent.
    /// Every failed probe is sent as an interim error, and the first
    /// successful probe after a failure is always sent.
    /// When `last` is set, it has already been delivered and the first
    /// probe waits for a full interval.
    pub(crate) async fn probe(
        self: Arc<Self>,
        sender: FeedSender<L::Instance>,
        mut last: Option<Snapshot<L::Instance>>,
    ) {
        let mut interval = tokio::time::interval(self.probe_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if last.is_some() {
            // The first tick completes immediately.
            interval.tick().await;
        }

        loop {
            tokio::select! {
                _ = sender.closed() => {
                    tracing::debug!("subscriber went away, stopping probe for {}", self.service_definition);
                    return;
                }
                _ = interval.tick() => {}
            }

            let event = match self.probe_once().await {
                Ok(snapshot) => {
                    if last.as_ref() == Some(&snapshot) {
                        continue;
                    }
                    tracing::debug!(
                        "instances of {} changed: {} known",
                        self.service_definition,
                        snapshot.len()
                    );
                    last = Some(snapshot.clone());
                    Ok(snapshot)
                }
                Err(err) if err.is_terminal() => {
                    tracing::info!(
                        "lookup backend for {} shut down, ending subscription",
                        self.service_definition
                    );
                    return;
                }
                Err(err) => {
                    tracing::warn!(
                        "failed to refresh instances of {}: {:?}",
                        self.service_definition,
                        err
                    );
                    last = None;
                    Err(SubscriptionError::Lookup(err))
                }
            };

            if sender.send(event).await.is_err() {
                tracing::debug!("subscriber went away, stopping probe for {}", self.service_definition);
                return;
            }
        }
    }
}
