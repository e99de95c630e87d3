use service_directory::{
    Directory, FeedState, LookupError, PollingDirectory, ResolutionStrategy, Snapshot,
    SubscriptionError, SubscriptionSetupError,
};
use std::net::SocketAddr;
use tests::contract::{
    assert_exhausted, assert_lookup_is_idempotent, assert_quiet, next_interim_error,
    next_snapshot,
};
use tests::scripted_lookup::ScriptedLookup;
use tokio::time::Duration;

const PROBE_INTERVAL: Duration = Duration::from_millis(10);

fn directory(lookup: &ScriptedLookup) -> PollingDirectory<ScriptedLookup> {
    PollingDirectory::builder(("test", 5000), lookup.clone())
        .probe_interval(PROBE_INTERVAL)
        .build()
        .expect("failed to build PollingDirectory")
}

fn addr(address: &str) -> SocketAddr {
    address.parse().unwrap()
}

#[tokio::test(start_paused = true)]
async fn subscription_follows_churn() {
    // Steps:
    //  1. Register an instance with the lookup service.
    //  2. Wait for the subscription to report it.
    //  3. Remove the instance and wait for the subscription to report that.
    //  4. Repeat 1-3.
    // What we want to test:
    //  Every change of the instance set is delivered, in order.
    let lookup = ScriptedLookup::default();
    let directory = directory(&lookup);
    let mut feed = directory.subscribe().await.unwrap();

    assert!(next_snapshot(&mut feed).await.is_empty());

    for i in 0..10 {
        let name = i.to_string();
        let address = format!("127.0.0.{}:5000", i + 1);

        lookup.add_instance(&name, &address).await;
        assert_eq!(next_snapshot(&mut feed).await.to_vec(), vec![addr(&address)]);

        lookup.remove_instance(&name).await;
        assert!(next_snapshot(&mut feed).await.is_empty());
    }
}

#[tokio::test(start_paused = true)]
async fn transient_outage_does_not_end_the_subscription() {
    // Scenario:
    //  The service has two instances, one of them goes away, then the
    //  discovery backend becomes unreachable for a while and recovers.
    //  The subscription reports the outage and carries on.
    let lookup = ScriptedLookup::default();
    lookup.add_instance("a", "10.0.0.1:5000").await;
    lookup.add_instance("b", "10.0.0.2:5000").await;
    let directory = directory(&lookup);

    let both = directory.lookup().await.unwrap();
    assert_eq!(
        both,
        Snapshot::from(vec![addr("10.0.0.2:5000"), addr("10.0.0.1:5000")])
    );

    let mut feed = directory.subscribe().await.unwrap();
    assert_eq!(next_snapshot(&mut feed).await, both);

    lookup.remove_instance("b").await;
    assert_eq!(next_snapshot(&mut feed).await.to_vec(), vec![addr("10.0.0.1:5000")]);

    lookup.fail("dns server unreachable").await;
    let err = next_interim_error(&mut feed).await;
    assert!(matches!(
        err,
        SubscriptionError::Lookup(LookupError::Unreachable(_))
    ));

    lookup.recover().await;
    assert_eq!(next_snapshot(&mut feed).await.to_vec(), vec![addr("10.0.0.1:5000")]);
    assert_eq!(feed.state(), FeedState::Active);
}

#[tokio::test(start_paused = true)]
async fn repeated_interim_errors_are_followed_by_a_snapshot() {
    let lookup = ScriptedLookup::default();
    lookup.add_instance("a", "10.0.0.1:5000").await;
    let directory = directory(&lookup);
    let mut feed = directory.subscribe().await.unwrap();
    next_snapshot(&mut feed).await;

    lookup.fail("registry overloaded").await;
    for _ in 0..5 {
        next_interim_error(&mut feed).await;
    }

    lookup.recover().await;
    assert_eq!(next_snapshot(&mut feed).await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stalled_backend_is_reported_as_timeout() {
    let lookup = ScriptedLookup::default();
    lookup.add_instance("a", "10.0.0.1:5000").await;
    let directory = PollingDirectory::builder(("test", 5000), lookup.clone())
        .probe_interval(PROBE_INTERVAL)
        .lookup_timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let mut feed = directory.subscribe().await.unwrap();
    next_snapshot(&mut feed).await;

    lookup.stall().await;
    let err = next_interim_error(&mut feed).await;
    assert!(matches!(
        err,
        SubscriptionError::Lookup(LookupError::Timeout(_))
    ));

    lookup.recover().await;
    assert_eq!(next_snapshot(&mut feed).await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn backend_shutdown_exhausts_the_subscription() {
    let lookup = ScriptedLookup::default();
    lookup.add_instance("a", "10.0.0.1:5000").await;
    let directory = directory(&lookup);
    let mut feed = directory.subscribe().await.unwrap();
    next_snapshot(&mut feed).await;

    lookup.shutdown().await;

    assert_exhausted(&mut feed).await;
    assert_eq!(feed.state(), FeedState::Exhausted);
    assert!(matches!(
        directory.lookup().await,
        Err(LookupError::Shutdown)
    ));
}

#[tokio::test(start_paused = true)]
async fn cancelling_stops_the_probe() {
    let lookup = ScriptedLookup::default();
    let directory = directory(&lookup);
    let mut feed = directory.subscribe().await.unwrap();
    next_snapshot(&mut feed).await;

    // Cancel while the consumer is waiting for an event that never comes.
    let handle = feed.cancel_handle();
    let consumer = tokio::spawn(async move {
        let event = feed.next().await;
        (event.is_none(), feed.state())
    });
    tokio::time::sleep(PROBE_INTERVAL * 3).await;
    handle.cancel();

    let (ended, state) = consumer.await.unwrap();
    assert!(ended);
    assert_eq!(state, FeedState::Cancelled);

    let lookups = lookup.lookups();
    tokio::time::sleep(PROBE_INTERVAL * 10).await;
    assert_eq!(lookup.lookups(), lookups, "probe kept running after cancel");
}

#[tokio::test(start_paused = true)]
async fn subscriptions_are_independent() {
    let lookup = ScriptedLookup::default();
    let directory = directory(&lookup);
    let mut first = directory.subscribe().await.unwrap();
    let mut second = directory.subscribe().await.unwrap();
    next_snapshot(&mut first).await;
    next_snapshot(&mut second).await;

    first.cancel();
    lookup.add_instance("a", "10.0.0.1:5000").await;

    assert_eq!(next_snapshot(&mut second).await.len(), 1);
    assert!(first.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn quiet_service_produces_no_events() {
    let lookup = ScriptedLookup::default();
    lookup.add_instance("a", "10.0.0.1:5000").await;
    let directory = directory(&lookup);
    let mut feed = directory.subscribe().await.unwrap();
    next_snapshot(&mut feed).await;

    assert_quiet(&mut feed, PROBE_INTERVAL * 20).await;
    assert!(lookup.lookups() > 10);
}

#[tokio::test(start_paused = true)]
async fn lookup_is_idempotent() {
    let lookup = ScriptedLookup::default();
    lookup.add_instance("a", "10.0.0.1:5000").await;
    lookup.add_instance("b", "10.0.0.2:5000").await;

    assert_lookup_is_idempotent(&directory(&lookup)).await;
}

#[tokio::test(start_paused = true)]
async fn eager_subscription_fails_when_backend_is_unreachable() {
    let lookup = ScriptedLookup::default();
    lookup.fail("connection refused").await;
    let directory = PollingDirectory::builder(("test", 5000), lookup.clone())
        .resolution_strategy(ResolutionStrategy::Eager {
            timeout: Duration::from_secs(1),
        })
        .build()
        .unwrap();

    assert!(matches!(
        directory.subscribe().await,
        Err(SubscriptionSetupError::Lookup(LookupError::Unreachable(_)))
    ));

    lookup.recover().await;
    assert!(directory.subscribe().await.is_ok());
}
