use anyhow::Context;
use service_directory::{
    Directory, LookupError, LookupService, PollingDirectory, ServiceDefinition,
};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

/// Resolves the service through the operating system resolver.
struct SystemResolver;

#[async_trait::async_trait]
impl LookupService for SystemResolver {
    type Instance = SocketAddr;

    async fn resolve_service_instances(
        &self,
        definition: &ServiceDefinition,
    ) -> Result<Vec<SocketAddr>, LookupError> {
        let target = (definition.hostname().to_string(), definition.port());
        tokio::task::spawn_blocking(move || target.to_socket_addrs())
            .await
            .map_err(|err| LookupError::Unreachable(err.into()))?
            .map(|addrs| addrs.collect())
            .map_err(|err| LookupError::Unreachable(err.into()))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let directory = PollingDirectory::builder(("localhost", 5000_u16), SystemResolver)
        .probe_interval(Duration::from_secs(2))
        .build()
        .context("failed to build PollingDirectory")?;

    let snapshot = directory.lookup().await?;
    println!("LOOKUP={:?}", snapshot.as_slice());

    let mut feed = directory.subscribe().await?;
    for _ in 0..3 {
        match tokio::time::timeout(Duration::from_secs(5), feed.next()).await {
            Ok(Some(Ok(snapshot))) => println!("SNAPSHOT={:?}", snapshot.as_slice()),
            Ok(Some(Err(err))) => println!("INTERIM ERROR={err:?}"),
            Ok(None) => break,
            Err(_) => println!("NO CHANGE"),
        }
    }

    Ok(())
}
