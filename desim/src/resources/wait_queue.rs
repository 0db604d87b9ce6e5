//! Ordered queues of parties waiting on a resource.
//!
//! A queue keeps its entries in service order, so the head is always the
//! next party to serve. How a new entry is placed depends on the
//! [`WaitPolicy`] the queue was built with.

use std::collections::VecDeque;

use crate::sim::{rng::SimRng, world::Environment};

/// Order in which waiting parties are served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WaitPolicy {
    /// Arrival order.
    #[default]
    Fifo,
    /// Reverse arrival order.
    Lifo,
    /// Ascending priority value, ties in arrival order.
    Priority,
    /// Uniformly shuffled at insertion, drawn from the environment's seeded generator.
    Random,
}

#[derive(Debug)]
struct Entry<T> {
    key: f64,
    item: T,
}

/// A queue of waiting parties ordered by a [`WaitPolicy`].
#[derive(Debug)]
pub(crate) struct WaitQueue<T> {
    policy: WaitPolicy,
    entries: VecDeque<Entry<T>>,
    rng: Option<SimRng>,
}

impl<T> WaitQueue<T> {
    /// Creates a queue; random queues fork their own generator from `env`.
    pub(crate) fn new(policy: WaitPolicy, env: &Environment) -> Self {
        let rng = match policy {
            WaitPolicy::Random => Some(env.fork_rng()),
            _ => None,
        };
        Self {
            policy,
            entries: VecDeque::new(),
            rng,
        }
    }

    pub(crate) fn policy(&self) -> WaitPolicy {
        self.policy
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds `item`; `priority` only matters under [`WaitPolicy::Priority`].
    pub(crate) fn push(&mut self, item: T, priority: f64) {
        match self.policy {
            WaitPolicy::Fifo => self.entries.push_back(Entry { key: 0.0, item }),
            WaitPolicy::Lifo => self.entries.push_front(Entry { key: 0.0, item }),
            WaitPolicy::Priority => self.insert_sorted(priority, item),
            WaitPolicy::Random => {
                let key = match self.rng.as_mut() {
                    Some(rng) => rng.random::<u32>() as f64,
                    None => 0.0,
                };
                self.insert_sorted(key, item);
            }
        }
    }

    // Stable: goes after every entry with an equal key.
    fn insert_sorted(&mut self, key: f64, item: T) {
        let index = self
            .entries
            .partition_point(|entry| entry.key.total_cmp(&key).is_le());
        self.entries.insert(index, Entry { key, item });
    }

    pub(crate) fn first(&self) -> Option<&T> {
        self.entries.front().map(|entry| &entry.item)
    }

    pub(crate) fn pop_first(&mut self) -> Option<T> {
        self.entries.pop_front().map(|entry| entry.item)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|entry| &entry.item)
    }

    pub(crate) fn position(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<usize> {
        self.entries.iter().position(|entry| predicate(&entry.item))
    }

    pub(crate) fn remove(&mut self, index: usize) -> Option<T> {
        self.entries.remove(index).map(|entry| entry.item)
    }

    /// Removes the first entry matching `predicate`.
    pub(crate) fn remove_where(&mut self, predicate: impl FnMut(&T) -> bool) -> Option<T> {
        let index = self.position(predicate)?;
        self.remove(index)
    }
}
