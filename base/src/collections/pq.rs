//! A keyed priority queue which yields its smallest item first.
//!
//! `keyed_priority_queue` pops the greatest priority, but a
//! discrete-event queue wants the earliest time.  We wrap the
//! priority in `Earliest`, which inverts its ordering.
use std::cmp::Ordering;
use std::fmt::{self, Debug, Formatter};
use std::hash::Hash;

use keyed_priority_queue::KeyedPriorityQueue;

#[derive(Debug, Clone)]
struct Earliest<T> {
    inner: T,
}

impl<T> From<T> for Earliest<T> {
    fn from(inner: T) -> Earliest<T> {
        Earliest { inner }
    }
}

impl<T: Ord> PartialOrd for Earliest<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Eq> Eq for Earliest<T> {}

impl<T: Eq> PartialEq for Earliest<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T: Ord> Ord for Earliest<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.inner.cmp(&self.inner)
    }
}

#[test]
fn test_earliest_inverts_order() {
    assert_eq!(Earliest::from(1), Earliest::from(1));
    assert!(Earliest::from(1) < Earliest::from(0));
    assert!(Earliest::from((5, 2)) > Earliest::from((5, 3)));
}

/// Priority queue keyed by `K` which pops the item with the
/// smallest priority `P` first.
pub struct EarliestFirstQueue<K: Hash + Eq, P: Ord> {
    items: KeyedPriorityQueue<K, Earliest<P>>,
}

impl<K, P> EarliestFirstQueue<K, P>
where
    K: Hash + Eq,
    P: Ord,
{
    #[must_use]
    pub fn new() -> EarliestFirstQueue<K, P> {
        EarliestFirstQueue {
            items: KeyedPriorityQueue::new(),
        }
    }

    pub fn peek(&self) -> Option<(&K, &P)> {
        self.items.peek().map(|(k, p)| (k, &p.inner))
    }

    pub fn pop(&mut self) -> Option<(K, P)> {
        self.items.pop().map(|(k, p)| (k, p.inner))
    }

    /// Add an item.  If `key` was already present its old priority is
    /// replaced and returned.
    pub fn push(&mut self, key: K, priority: P) -> Option<P> {
        self.items.push(key, Earliest::from(priority)).map(|e| e.inner)
    }

    /// Remove the item identified by `key`, returning its priority.
    pub fn remove(&mut self, key: &K) -> Option<P> {
        self.items.remove(key).map(|e| e.inner)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<K, P> Default for EarliestFirstQueue<K, P>
where
    K: Hash + Eq,
    P: Ord,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, P> Debug for EarliestFirstQueue<K, P>
where
    K: Hash + Eq + Debug,
    P: Ord + Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("EarliestFirstQueue")
            .field("len", &self.items.len())
            .field("head", &self.peek())
            .finish()
    }
}

#[test]
fn test_empty() {
    let mut q: EarliestFirstQueue<u64, u64> = EarliestFirstQueue::default();
    assert!(q.is_empty());
    assert_eq!(q.peek(), None);
    assert_eq!(q.pop(), None);
    assert_eq!(q.remove(&3), None);
}

#[test]
fn test_pops_smallest_first() {
    let mut q: EarliestFirstQueue<u64, (u64, u64)> = EarliestFirstQueue::new();
    q.push(7, (500, 7));
    q.push(2, (100, 2));
    q.push(4, (100, 4));
    assert_eq!(q.len(), 3);
    assert_eq!(q.peek(), Some((&2, &(100, 2))));
    assert_eq!(q.pop(), Some((2, (100, 2))));
    assert_eq!(q.pop(), Some((4, (100, 4))));
    assert_eq!(q.pop(), Some((7, (500, 7))));
    assert!(q.is_empty());
}

#[test]
fn test_remove_and_replace() {
    let mut q: EarliestFirstQueue<char, u32> = EarliestFirstQueue::new();
    q.push('a', 10);
    q.push('b', 20);
    q.push('c', 30);
    assert_eq!(q.remove(&'a'), Some(10));
    assert_eq!(q.remove(&'a'), None);
    assert_eq!(q.push('c', 5), Some(30));
    assert_eq!(q.pop(), Some(('c', 5)));
    assert_eq!(q.push('b', 1), Some(20));
    assert_eq!(q.pop(), Some(('b', 1)));
    assert!(q.is_empty());
}
