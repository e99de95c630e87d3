//! Defines the interface that [`PollingDirectory`](crate::PollingDirectory) requires in order
//! to resolve all the instances of a given service.

use crate::{Instance, LookupError, ServiceDefinition};

/// Interface that provides functionality to
/// acquire the instances of a service from a backend that only supports
/// full refreshes, e.g. DNS or a registry's list endpoint.
///
/// ```rust
/// use service_directory::{LookupError, LookupService, ServiceDefinition};
/// use std::net::SocketAddr;
///
/// // Always resolves to the loopback address.
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
/// ```
#[async_trait::async_trait]
pub trait LookupService: Send + Sync {
    /// The instance type produced by this backend.
    type Instance: Instance;

    /// Return every instance associated with the provided
    /// [`ServiceDefinition`] containing the `hostname` and `port` of the service.
    /// If no instances were resolved, an empty list is returned.
    ///
    /// Return [`LookupError::Shutdown`] only when the backend is gone for good:
    /// subscriptions fed by this lookup end when they see it.
    async fn resolve_service_instances(
        &self,
        definition: &ServiceDefinition,
    ) -> Result<Vec<Self::Instance>, LookupError>;
}
