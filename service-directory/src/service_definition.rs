use anyhow::Context;

/// Defines a service with a `hostname` and a `port`.
/// The hostname is what a [`LookupService`](crate::LookupService) resolves to
/// the concrete instances of the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefinition {
    /// The hostname of the service.
    hostname: String,
    /// The service port.
    port: u16,
}

impl ServiceDefinition {
    /// Create a [`ServiceDefinition`] from a valid `hostname` and `port`.
    ///
    /// This function will fail if the `hostname` is empty or not a valid domain name.
    pub fn from_parts<T: ToString>(hostname: T, port: u16) -> Result<Self, anyhow::Error> {
        let hostname = hostname.to_string();

        anyhow::ensure!(!hostname.is_empty(), "'hostname' must not be empty");
        hickory_resolver::Name::from_ascii(&hostname)
            .map_err(anyhow::Error::from)
            .context("invalid 'hostname'")?;

        Ok(Self { hostname, port })
    }

    /// Get the `hostname` part of a `ServiceDefinition`.
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Get the `port` part of a `ServiceDefinition`.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl std::fmt::Display for ServiceDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.hostname, self.port)
    }
}

/// ```
/// let sd = service_directory::ServiceDefinition::try_from(("localhost", 8090)).unwrap();
/// assert_eq!(sd.hostname(), "localhost");
/// assert_eq!(sd.port(), 8090);
/// assert_eq!(sd.to_string(), "localhost:8090");
/// ```
impl TryFrom<(&str, u16)> for ServiceDefinition {
    type Error = anyhow::Error;

    fn try_from((hostname, port): (&str, u16)) -> Result<Self, Self::Error> {
        Self::from_parts(hostname, port)
    }
}

/// ```
/// let sd = service_directory::ServiceDefinition::try_from((String::from("localhost"), 8090)).unwrap();
/// assert_eq!(sd.hostname(), "localhost");
/// assert_eq!(sd.port(), 8090);
/// ```
impl TryFrom<(String, u16)> for ServiceDefinition {
    type Error = anyhow::Error;

    fn try_from((hostname, port): (String, u16)) -> Result<Self, Self::Error> {
        Self::from_parts(hostname, port)
    }
}
