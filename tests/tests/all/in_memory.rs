use futures::StreamExt;
use service_directory::{
    Directory, FeedState, InMemoryDirectory, LookupError, Snapshot, SnapshotTracker,
    SubscriptionError, SubscriptionSetupError, Update,
};
use std::net::SocketAddr;
use std::time::Duration;
use tests::contract::{
    assert_cancel_stops_delivery, assert_exhausted, assert_lookup_is_idempotent, next_event,
    next_interim_error, next_snapshot,
};
use tower::discover::Change;

fn snapshot(instances: &[&'static str]) -> Snapshot<&'static str> {
    instances.iter().copied().collect()
}

#[tokio::test]
async fn static_two_instance_scenario() {
    // Scenario:
    //  lookup() returns [A, B]. The backend drops B, becomes unreachable,
    //  then recovers. The feed reports each step and never ends.
    let directory = InMemoryDirectory::new(["A", "B"]);
    assert_eq!(directory.lookup().await.unwrap(), snapshot(&["A", "B"]));

    let mut feed = directory.subscribe().await.unwrap();
    assert_eq!(next_snapshot(&mut feed).await, snapshot(&["A", "B"]));

    directory.remove(&"B");
    assert_eq!(next_snapshot(&mut feed).await, snapshot(&["A"]));

    directory.fail("transient failure");
    assert!(matches!(
        next_interim_error(&mut feed).await,
        SubscriptionError::Backend(_)
    ));

    directory.recover();
    assert_eq!(next_snapshot(&mut feed).await, snapshot(&["A"]));
    assert_eq!(feed.state(), FeedState::Active);
}

#[tokio::test]
async fn permanent_shutdown_ends_every_feed() {
    let directory = InMemoryDirectory::new(["A"]);
    let mut feeds = Vec::new();
    for _ in 0..3 {
        let mut feed = directory.subscribe().await.unwrap();
        next_snapshot(&mut feed).await;
        feeds.push(feed);
    }

    directory.shutdown();

    for feed in &mut feeds {
        assert_exhausted(feed).await;
        assert_eq!(feed.state(), FeedState::Exhausted);
    }
    assert!(matches!(directory.lookup().await, Err(LookupError::Shutdown)));
    assert!(matches!(
        directory.subscribe().await,
        Err(SubscriptionSetupError::Shutdown)
    ));
}

#[tokio::test]
async fn many_interim_errors_do_not_end_the_feed() {
    let directory = InMemoryDirectory::new(["A"]);
    let mut feed = directory.subscribe().await.unwrap();
    next_snapshot(&mut feed).await;

    for attempt in 0..10 {
        directory.fail(format!("attempt {attempt} failed"));
        next_interim_error(&mut feed).await;
    }

    directory.recover();
    assert_eq!(next_snapshot(&mut feed).await, snapshot(&["A"]));
}

#[tokio::test]
async fn cancel_discards_pending_events() {
    let directory = InMemoryDirectory::new(["A"]);
    let mut feed = directory.subscribe().await.unwrap();
    next_snapshot(&mut feed).await;

    directory.insert("B");
    tokio::task::yield_now().await;

    assert_cancel_stops_delivery(feed).await;
}

#[tokio::test]
async fn lookup_is_idempotent() {
    assert_lookup_is_idempotent(&InMemoryDirectory::new(["A", "B", "C"])).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_subscribers_each_see_every_change() {
    let directory = InMemoryDirectory::new(Vec::<u32>::new());
    let (ready_tx, mut ready_rx) = tokio::sync::mpsc::channel(8);

    let mut consumers = Vec::new();
    for _ in 0..8 {
        let mut feed = directory.subscribe().await.unwrap();
        let ready = ready_tx.clone();
        consumers.push(tokio::spawn(async move {
            assert!(next_snapshot(&mut feed).await.is_empty());
            ready.send(()).await.unwrap();
            next_snapshot(&mut feed).await
        }));
    }
    for _ in 0..8 {
        ready_rx.recv().await.unwrap();
    }

    directory.set_instances([1, 2, 3]);

    for consumer in consumers {
        let seen = consumer.await.unwrap();
        assert_eq!(seen, Snapshot::from(vec![3, 2, 1]));
    }
}

#[tokio::test(start_paused = true)]
async fn feed_can_be_consumed_as_a_stream() {
    let directory = InMemoryDirectory::new(["A"]);
    let feed = directory.subscribe().await.unwrap();

    let backend = directory.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        backend.shutdown();
    });

    let events: Vec<_> = feed.into_stream().collect().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].as_ref().unwrap(), &snapshot(&["A"]));
}

fn apply(update: Update<SocketAddr>, changes: &mut Vec<Change<SocketAddr, String>>) {
    if let Update::Changed(diff) = update {
        changes.extend(diff.into_changes(|addr| format!("http://{addr}")));
    }
}

#[tokio::test]
async fn tracked_changes_drive_a_balancer() {
    // A consumer keeps a balancer's endpoint list in sync, and keeps serving
    // the last known endpoints while discovery is degraded.
    let a: SocketAddr = "10.0.0.1:5000".parse().unwrap();
    let b: SocketAddr = "10.0.0.2:5000".parse().unwrap();
    let directory = InMemoryDirectory::new([a]);
    let mut feed = directory.subscribe().await.unwrap();
    let mut tracker = SnapshotTracker::new();
    let mut changes: Vec<Change<SocketAddr, String>> = Vec::new();

    apply(tracker.observe(next_event(&mut feed).await), &mut changes);
    directory.insert(b);
    apply(tracker.observe(next_event(&mut feed).await), &mut changes);
    directory.fail("registry restarting");
    apply(tracker.observe(next_event(&mut feed).await), &mut changes);
    assert_eq!(tracker.consecutive_errors(), 1);
    assert_eq!(tracker.current().map(Snapshot::len), Some(2));
    directory.set_instances([b]);
    directory.recover();
    apply(tracker.observe(next_event(&mut feed).await), &mut changes);

    assert_eq!(changes.len(), 3);
    assert!(matches!(
        &changes[0],
        Change::Insert(addr, uri) if *addr == a && uri == "http://10.0.0.1:5000"
    ));
    assert!(matches!(&changes[1], Change::Insert(addr, _) if *addr == b));
    assert!(matches!(&changes[2], Change::Remove(addr) if *addr == a));
    assert!(!tracker.is_degraded());
}
