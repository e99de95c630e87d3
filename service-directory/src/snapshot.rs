//! Point-in-time instance sets and the consumer-side diff between two of them.

use crate::SubscriptionError;
use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use tower::discover::Change;

/// One addressable endpoint of a service, e.g. a [`SocketAddr`](std::net::SocketAddr)
/// or a struct of host, port and metadata.
///
/// Instances carry no identity beyond value equality. Implemented for every
/// type that satisfies the bounds.
pub trait Instance: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> Instance for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

/// A single element of a [`ChangeFeed`](crate::ChangeFeed): either the full
/// current instance set or an interim, non-terminal error.
pub type ChangeEvent<I> = Result<Snapshot<I>, SubscriptionError>;

/// Every instance known for a service at one point in time.
///
/// A snapshot always replaces the previous one in full, it is never a delta.
/// Duplicate instances are dropped on construction, keeping the first
/// occurrence. Order is preserved but carries no meaning: two snapshots are
/// equal when they hold the same set of instances.
///
/// Cloning is cheap, the instances live behind an [`Arc`].
///
/// ```
/// use service_directory::Snapshot;
///
/// let a: Snapshot<&str> = ["a", "b", "a"].into_iter().collect();
/// let b: Snapshot<&str> = ["b", "a"].into_iter().collect();
/// assert_eq!(a.len(), 2);
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone)]
pub struct Snapshot<I>(Arc<[I]>);

impl<I: Instance> Snapshot<I> {
    /// A snapshot without instances.
    pub fn empty() -> Self {
        Self(Arc::from(Vec::new()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, I> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[I] {
        &self.0
    }

    pub fn contains(&self, instance: &I) -> bool {
        self.0.contains(instance)
    }

    pub fn to_vec(&self) -> Vec<I> {
        self.0.to_vec()
    }

    /// Compute which instances appear in `next` but not in `self`, and the
    /// other way around.
    pub fn diff(&self, next: &Snapshot<I>) -> SnapshotDiff<I> {
        let before: HashSet<&I> = self.iter().collect();
        let after: HashSet<&I> = next.iter().collect();

        SnapshotDiff {
            added: next
                .iter()
                .filter(|instance| !before.contains(instance))
                .cloned()
                .collect(),
            removed: self
                .iter()
                .filter(|instance| !after.contains(instance))
                .cloned()
                .collect(),
        }
    }
}

impl<I: Instance> Default for Snapshot<I> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<I: Instance> FromIterator<I> for Snapshot<I> {
    fn from_iter<T: IntoIterator<Item = I>>(iter: T) -> Self {
        let mut seen = HashSet::new();
        let instances: Vec<I> = iter
            .into_iter()
            .filter(|instance| seen.insert(instance.clone()))
            .collect();

        Self(Arc::from(instances))
    }
}

impl<I: Instance> From<Vec<I>> for Snapshot<I> {
    fn from(instances: Vec<I>) -> Self {
        instances.into_iter().collect()
    }
}

impl<I: Instance> PartialEq for Snapshot<I> {
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() {
            return false;
        }
        let other: HashSet<&I> = other.iter().collect();
        self.iter().all(|instance| other.contains(instance))
    }
}

impl<I: Instance> Eq for Snapshot<I> {}

impl<'a, I: Instance> IntoIterator for &'a Snapshot<I> {
    type Item = &'a I;
    type IntoIter = std::slice::Iter<'a, I>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// The instances added and removed between two [`Snapshot`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotDiff<I> {
    pub added: Vec<I>,
    pub removed: Vec<I>,
}

impl<I: Instance> SnapshotDiff<I> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Turn the diff into the [`Change`]s a tower balancer consumes.
    ///
    /// `make` builds the service value for each inserted instance.
    /// Removals are yielded before insertions.
    ///
    /// ```
    /// use service_directory::Snapshot;
    /// use tower::discover::Change;
    ///
    /// let before: Snapshot<u16> = vec![1, 2].into();
    /// let after: Snapshot<u16> = vec![2, 3].into();
    ///
    /// let changes: Vec<Change<u16, String>> = before
    ///     .diff(&after)
    ///     .into_changes(|port| format!("127.0.0.1:{port}"))
    ///     .collect();
    ///
    /// assert!(matches!(changes[0], Change::Remove(1)));
    /// assert!(matches!(&changes[1], Change::Insert(3, addr) if addr == "127.0.0.1:3"));
    /// ```
    pub fn into_changes<V, F>(self, mut make: F) -> impl Iterator<Item = Change<I, V>>
    where
        F: FnMut(&I) -> V,
    {
        let removed = self.removed.into_iter().map(Change::Remove);
        let added = self.added.into_iter().map(move |instance| {
            let service = make(&instance);
            Change::Insert(instance, service)
        });

        removed.chain(added)
    }
}
