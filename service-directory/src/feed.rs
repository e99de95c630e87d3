//! Defines [`ChangeFeed`], the consumer side of a subscription, and
//! [`Subscription`], the channel-backed feed every directory in this crate
//! hands out.
//!
//! A [`Subscription`] is paired with one or more [`FeedSender`]s. The feed
//! stays [`FeedState::Active`] while a sender is alive, becomes
//! [`FeedState::Exhausted`] once all senders are gone and the buffer is
//! drained, and becomes [`FeedState::Cancelled`] when the consumer gives up on
//! it. Neither end state can be left.

use crate::{ChangeEvent, FeedClosed, Instance, Snapshot, SubscriptionError};
use futures::Stream;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing_futures::Instrument;

/// A live, cancellable sequence of [`ChangeEvent`]s.
///
/// `next` suspends until the next event is available. `Some(Err(_))` is an
/// interim error and the feed remains usable. `None` means the feed is over,
/// and every later call returns `None` as well.
#[async_trait::async_trait]
pub trait ChangeFeed: Send {
    /// The instance type of the snapshots delivered by this feed.
    type Instance: Instance;

    /// Wait for the next event.
    async fn next(&mut self) -> Option<ChangeEvent<Self::Instance>>;

    /// Stop consuming the feed and release whatever backs it.
    ///
    /// Events that were already buffered are discarded.
    fn cancel(&mut self);
}

/// Lifecycle of a [`Subscription`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    /// Events may still be delivered.
    Active,
    /// The producer went away for good.
    Exhausted,
    /// The consumer cancelled the feed.
    Cancelled,
}

/// Create a [`FeedSender`] and the [`Subscription`] it delivers to.
///
/// `capacity` bounds how many events may wait for the consumer before
/// [`FeedSender::send`] starts waiting. Panics if `capacity` is zero.
pub fn channel<I: Instance>(capacity: usize) -> (FeedSender<I>, Subscription<I>) {
    let (sender, receiver) = mpsc::channel(capacity);
    let (cancel, cancelled) = watch::channel(false);

    let sender = FeedSender { sender, cancelled };
    let subscription = Subscription {
        receiver,
        cancel: Arc::new(cancel),
        producer: None,
        state: FeedState::Active,
    };

    (sender, subscription)
}

/// The producer half of a [`Subscription`].
///
/// Dropping every clone of the sender exhausts the feed.
#[derive(Debug)]
pub struct FeedSender<I> {
    sender: mpsc::Sender<ChangeEvent<I>>,
    cancelled: watch::Receiver<bool>,
}

impl<I> Clone for FeedSender<I> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            cancelled: self.cancelled.clone(),
        }
    }
}

impl<I: Instance> FeedSender<I> {
    /// Deliver an event, waiting for buffer space if the consumer lags.
    ///
    /// Fails once the consumer cancelled or dropped the feed.
    pub async fn send(&self, event: ChangeEvent<I>) -> Result<(), FeedClosed> {
        tokio::select! {
            biased;
            _ = self.closed() => Err(FeedClosed),
            sent = self.sender.send(event) => sent.map_err(|_| FeedClosed),
        }
    }

    pub async fn send_snapshot(&self, snapshot: Snapshot<I>) -> Result<(), FeedClosed> {
        self.send(Ok(snapshot)).await
    }

    pub async fn send_error(&self, error: SubscriptionError) -> Result<(), FeedClosed> {
        self.send(Err(error)).await
    }

    /// Resolves once the consumer cancelled or dropped the feed.
    ///
    /// Producers select on this to release their resources promptly.
    pub async fn closed(&self) {
        tokio::select! {
            _ = self.sender.closed() => {}
            _ = cancelled(self.cancelled.clone()) => {}
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed() || *self.cancelled.borrow()
    }
}

/// Cancels a [`Subscription`] from anywhere, including while its consumer
/// is suspended in [`Subscription::next`].
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

/// Channel-backed [`ChangeFeed`].
///
/// ```rust
/// #[tokio::main]
/// async fn main() {
///     use service_directory::{feed, FeedState, Snapshot};
///
///     let mut subscription = feed::Subscription::spawn(4, |sender| async move {
///         let snapshot: Snapshot<u16> = vec![8080, 8081].into();
///         let _ = sender.send_snapshot(snapshot).await;
///     });
///
///     let first = subscription.next().await.expect("one event").expect("a snapshot");
///     assert_eq!(first.len(), 2);
///
///     // The producer finished, so the feed is over.
///     assert!(subscription.next().await.is_none());
///     assert_eq!(subscription.state(), FeedState::Exhausted);
/// }
/// ```
#[derive(Debug)]
pub struct Subscription<I> {
    receiver: mpsc::Receiver<ChangeEvent<I>>,
    cancel: Arc<watch::Sender<bool>>,
    producer: Option<JoinHandle<()>>,
    state: FeedState,
}

impl<I: Instance> Subscription<I> {
    /// Spawn `producer` on the current tokio runtime and return the feed it
    /// delivers to.
    ///
    /// The producer task is aborted when the feed is cancelled or dropped.
    pub fn spawn<F, Fut>(capacity: usize, producer: F) -> Self
    where
        F: FnOnce(FeedSender<I>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (sender, mut subscription) = channel(capacity);
        let task = producer(sender).instrument(tracing::debug_span!("change_feed_producer"));
        subscription.producer = Some(tokio::spawn(task));
        subscription
    }

    /// The feed's lifecycle state, including a cancellation requested
    /// through a [`CancelHandle`] that `next` has not observed yet.
    pub fn state(&self) -> FeedState {
        if self.state == FeedState::Active && *self.cancel.borrow() {
            return FeedState::Cancelled;
        }
        self.state
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancel))
    }

    /// Wait for the next event. See [`ChangeFeed::next`].
    pub async fn next(&mut self) -> Option<ChangeEvent<I>> {
        if self.state != FeedState::Active {
            return None;
        }

        let event = tokio::select! {
            biased;
            _ = cancelled(self.cancel.subscribe()) => {
                self.cancel();
                return None;
            }
            event = self.receiver.recv() => event,
        };

        if event.is_none() {
            tracing::debug!("change feed exhausted");
            self.state = FeedState::Exhausted;
        }
        event
    }

    /// Cancel the feed. See [`ChangeFeed::cancel`].
    pub fn cancel(&mut self) {
        if self.state == FeedState::Active {
            tracing::debug!("change feed cancelled");
            self.state = FeedState::Cancelled;
        }
        self.release();
    }

    /// Consume the feed as a [`Stream`] that ends where the feed ends.
    pub fn into_stream(self) -> impl Stream<Item = ChangeEvent<I>> {
        futures::stream::unfold(self, |mut subscription| async move {
            let event = subscription.next().await?;
            Some((event, subscription))
        })
    }

    fn release(&mut self) {
        self.cancel.send_replace(true);
        self.receiver.close();
        while self.receiver.try_recv().is_ok() {}
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
    }
}

/// Resolves once the cancel flag is raised or its owner is gone.
async fn cancelled(mut flag: watch::Receiver<bool>) {
    let _ = flag.wait_for(|cancelled| *cancelled).await;
}

impl<I> Drop for Subscription<I> {
    fn drop(&mut self) {
        self.cancel.send_replace(true);
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
    }
}

#[async_trait::async_trait]
impl<I: Instance> ChangeFeed for Subscription<I> {
    type Instance = I;

    async fn next(&mut self) -> Option<ChangeEvent<I>> {
        Subscription::next(self).await
    }

    fn cancel(&mut self) {
        Subscription::cancel(self)
    }
}
