//! Implements [`Directory`] over an instance set held in memory, for static
//! configurations and for exercising consumers in tests.

use crate::{
    Directory, FeedSender, Instance, LookupError, Snapshot, Subscription, SubscriptionError,
    SubscriptionSetupError,
};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};

static DEFAULT_FEED_CAPACITY: usize = 32;

/// Changes a feed may fall behind by before it skips to the latest state.
const CHANGE_BACKLOG: usize = 64;

#[derive(Debug, Clone)]
struct State<I> {
    instances: Snapshot<I>,
    outage: Option<String>,
    shut_down: bool,
}

impl<I: Instance> State<I> {
    fn published(&self) -> Published<I> {
        if self.shut_down {
            return Published::Shutdown;
        }
        match &self.outage {
            Some(reason) => Published::Outage(reason.clone()),
            None => Published::Instances(self.instances.clone()),
        }
    }
}

/// A change as seen by every feed of the directory.
#[derive(Debug, Clone)]
enum Published<I> {
    Instances(Snapshot<I>),
    Outage(String),
    Shutdown,
}

/// A [`Directory`] whose instances are set by hand.
///
/// Besides changing the instance set, the directory can simulate a
/// transient backend outage with [`fail`](InMemoryDirectory::fail) and
/// [`recover`](InMemoryDirectory::recover), and a permanent one with
/// [`shutdown`](InMemoryDirectory::shutdown).
///
/// Every feed starts with the current snapshot and then receives one event
/// per published change, in the order the changes were made: a snapshot for
/// each change of the instance set and for each recovery, an interim error
/// for each call to `fail`. Changes made during an outage are delivered
/// together on recovery. A feed whose consumer falls behind by more than its
/// capacity plus an internal backlog of changes skips the changes it missed
/// and receives the latest state instead.
/// Shutting the directory down, or dropping its last clone, exhausts every
/// feed.
///
/// ```rust
/// #[tokio::main]
/// async fn main() {
///     use service_directory::{Directory, InMemoryDirectory};
///
///     let directory = InMemoryDirectory::new(["a", "b"]);
///     let mut feed = directory.subscribe().await.expect("failed to subscribe");
///     assert_eq!(feed.next().await.unwrap().unwrap().len(), 2);
///
///     directory.remove(&"b");
///     assert_eq!(feed.next().await.unwrap().unwrap().to_vec(), vec!["a"]);
///
///     directory.fail("registry restarting");
///     assert!(feed.next().await.unwrap().is_err());
///
///     directory.recover();
///     assert_eq!(feed.next().await.unwrap().unwrap().to_vec(), vec!["a"]);
///
///     directory.shutdown();
///     assert!(feed.next().await.is_none());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryDirectory<I> {
    state: Arc<watch::Sender<State<I>>>,
    changes: broadcast::Sender<Published<I>>,
    feed_capacity: usize,
}

impl<I: Instance> InMemoryDirectory<I> {
    pub fn new<T: IntoIterator<Item = I>>(instances: T) -> Self {
        let (state, _) = watch::channel(State {
            instances: instances.into_iter().collect(),
            outage: None,
            shut_down: false,
        });
        let (changes, _) = broadcast::channel(CHANGE_BACKLOG);

        Self {
            state: Arc::new(state),
            changes,
            feed_capacity: DEFAULT_FEED_CAPACITY,
        }
    }

    /// Set how many events each feed buffers for its consumer.
    ///
    /// Panics if `capacity` is zero.
    pub fn with_feed_capacity(self, capacity: usize) -> Self {
        assert!(capacity > 0, "feed capacity must be > 0");
        Self {
            feed_capacity: capacity,
            ..self
        }
    }

    /// The instance set, regardless of any simulated outage.
    pub fn instances(&self) -> Snapshot<I> {
        self.state.borrow().instances.clone()
    }

    /// Replace the whole instance set.
    pub fn set_instances<T: IntoIterator<Item = I>>(&self, instances: T) {
        let instances: Snapshot<I> = instances.into_iter().collect();
        self.update(move |current| {
            if *current == instances {
                return false;
            }
            *current = instances;
            true
        });
    }

    pub fn insert(&self, instance: I) {
        self.update(move |current| {
            if current.contains(&instance) {
                return false;
            }
            *current = current.iter().cloned().chain([instance]).collect();
            true
        });
    }

    pub fn remove(&self, instance: &I) {
        self.update(|current| {
            if !current.contains(instance) {
                return false;
            }
            *current = current.iter().filter(|i| *i != instance).cloned().collect();
            true
        });
    }

    /// Simulate a transient outage: lookups fail and every feed receives an
    /// interim error. Calling it again delivers another error.
    pub fn fail<R: Into<String>>(&self, reason: R) {
        let reason = reason.into();
        tracing::debug!("simulating outage: {}", reason);
        self.apply(move |state| {
            state.outage = Some(reason.clone());
            Some(Published::Outage(reason))
        });
    }

    /// End a simulated outage; every feed receives the current snapshot.
    pub fn recover(&self) {
        self.apply(|state| {
            state.outage.take()?;
            Some(Published::Instances(state.instances.clone()))
        });
    }

    /// Shut the directory down for good, exhausting every feed.
    pub fn shutdown(&self) {
        tracing::debug!("shutting down in-memory directory");
        self.apply(|state| {
            state.shut_down = true;
            Some(Published::Shutdown)
        });
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.borrow().shut_down
    }

    /// Apply `change` to the instance set. Feeds are only notified when it
    /// reports a change and no outage is in progress.
    fn update<F>(&self, change: F)
    where
        F: FnOnce(&mut Snapshot<I>) -> bool,
    {
        self.apply(|state| {
            if !change(&mut state.instances) || state.outage.is_some() {
                return None;
            }
            Some(Published::Instances(state.instances.clone()))
        });
    }

    /// Mutate the state and hand what `change` returns to every feed.
    ///
    /// The change is broadcast while the state is still locked, so feeds
    /// observe changes in the order they were made. A shut down directory
    /// no longer changes.
    fn apply<F>(&self, change: F)
    where
        F: FnOnce(&mut State<I>) -> Option<Published<I>>,
    {
        self.state.send_if_modified(|state| {
            if state.shut_down {
                return false;
            }
            match change(state) {
                Some(published) => {
                    // No feed is listening.
                    let _ = self.changes.send(published);
                    true
                }
                None => false,
            }
        });
    }
}

#[async_trait::async_trait]
impl<I: Instance> Directory for InMemoryDirectory<I> {
    type Instance = I;
    type Feed = Subscription<I>;

    async fn lookup(&self) -> Result<Snapshot<I>, LookupError> {
        match self.state.borrow().published() {
            Published::Instances(instances) => Ok(instances),
            Published::Outage(reason) => Err(LookupError::Unreachable(anyhow::anyhow!(reason))),
            Published::Shutdown => Err(LookupError::Shutdown),
        }
    }

    async fn subscribe(&self) -> Result<Subscription<I>, SubscriptionSetupError> {
        // Read the current state and join the broadcast under the same lock,
        // so that no change falls in between.
        let (current, changes) = {
            let state = self.state.borrow();
            (state.published(), self.changes.subscribe())
        };

        let initial = match current {
            Published::Instances(instances) => instances,
            Published::Outage(reason) => {
                let err = LookupError::Unreachable(anyhow::anyhow!(reason));
                return Err(err.into());
            }
            Published::Shutdown => return Err(SubscriptionSetupError::Shutdown),
        };

        let state = self.state.subscribe();
        Ok(Subscription::spawn(self.feed_capacity, move |sender| {
            forward(state, changes, Published::Instances(initial), sender)
        }))
    }
}

/// Deliver `first`, then every broadcast change, into the feed.
async fn forward<I: Instance>(
    state: watch::Receiver<State<I>>,
    mut changes: broadcast::Receiver<Published<I>>,
    first: Published<I>,
    sender: FeedSender<I>,
) {
    let mut next = first;
    loop {
        let event = match next {
            Published::Instances(instances) => Ok(instances),
            Published::Outage(reason) => Err(SubscriptionError::Backend(anyhow::anyhow!(reason))),
            Published::Shutdown => return,
        };

        if sender.send(event).await.is_err() {
            return;
        }

        let received = tokio::select! {
            received = changes.recv() => received,
            _ = sender.closed() => return,
        };

        next = match received {
            Ok(published) => published,
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!("feed fell behind by {} changes, sending the latest state", skipped);
                let current = state.borrow();
                changes = changes.resubscribe();
                current.published()
            }
            // The directory was dropped.
            Err(RecvError::Closed) => return,
        };
    }
}
