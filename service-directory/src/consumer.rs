//! Consumer-side bookkeeping for a [`ChangeFeed`](crate::ChangeFeed).
//!
//! Producers only ever send full snapshots. [`SnapshotTracker`] turns them
//! into diffs and keeps the last good snapshot around while the feed reports
//! interim errors, so a consumer can keep serving from it.

use crate::{ChangeEvent, Instance, Snapshot, SnapshotDiff};

/// What a single event meant for the tracked instance set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update<I> {
    /// The instance set changed.
    Changed(SnapshotDiff<I>),
    /// A snapshot arrived, but it holds the instances already known.
    Unchanged,
    /// An interim error arrived. The last good snapshot, if any, is kept.
    Degraded { consecutive_errors: usize },
}

/// Follows a feed and remembers the last good snapshot.
///
/// Whether to give up after repeated errors is the caller's decision;
/// [`consecutive_errors`](SnapshotTracker::consecutive_errors) is there to
/// base it on.
///
/// ```rust
/// use service_directory::{Snapshot, SnapshotTracker, SubscriptionError, Update};
///
/// let mut tracker = SnapshotTracker::new();
///
/// let first: Snapshot<&str> = vec!["a", "b"].into();
/// assert!(matches!(tracker.observe(Ok(first)), Update::Changed(_)));
///
/// let hiccup = SubscriptionError::Backend(anyhow::anyhow!("timeout"));
/// assert_eq!(
///     tracker.observe(Err(hiccup)),
///     Update::Degraded { consecutive_errors: 1 }
/// );
/// // Still serving the stale snapshot.
/// assert_eq!(tracker.current().map(|s| s.len()), Some(2));
///
/// let second: Snapshot<&str> = vec!["a"].into();
/// match tracker.observe(Ok(second)) {
///     Update::Changed(diff) => assert_eq!(diff.removed, vec!["b"]),
///     other => panic!("unexpected update: {other:?}"),
/// }
/// assert_eq!(tracker.consecutive_errors(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct SnapshotTracker<I> {
    current: Option<Snapshot<I>>,
    consecutive_errors: usize,
}

impl<I: Instance> SnapshotTracker<I> {
    pub fn new() -> Self {
        Self {
            current: None,
            consecutive_errors: 0,
        }
    }

    /// The last snapshot received, stale or not.
    pub fn current(&self) -> Option<&Snapshot<I>> {
        self.current.as_ref()
    }

    /// Number of interim errors received since the last snapshot.
    pub fn consecutive_errors(&self) -> usize {
        self.consecutive_errors
    }

    pub fn is_degraded(&self) -> bool {
        self.consecutive_errors > 0
    }

    /// Fold the next event of the feed into the tracked state.
    ///
    /// The first snapshot is reported as a change adding all its instances.
    pub fn observe(&mut self, event: ChangeEvent<I>) -> Update<I> {
        match event {
            Ok(snapshot) => {
                self.consecutive_errors = 0;
                let diff = match &self.current {
                    Some(current) => current.diff(&snapshot),
                    None => Snapshot::empty().diff(&snapshot),
                };
                let first = self.current.is_none();
                self.current = Some(snapshot);

                if diff.is_empty() && !first {
                    Update::Unchanged
                } else {
                    Update::Changed(diff)
                }
            }
            Err(err) => {
                self.consecutive_errors += 1;
                tracing::debug!(
                    "interim service discovery error #{}: {}",
                    self.consecutive_errors,
                    err
                );
                Update::Degraded {
                    consecutive_errors: self.consecutive_errors,
                }
            }
        }
    }
}

impl<I: Instance> Default for SnapshotTracker<I> {
    fn default() -> Self {
        Self::new()
    }
}
