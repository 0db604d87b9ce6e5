//! Scheduling keys and the priority queues behind the main loop.

use std::{cmp::Ordering, collections::BinaryHeap};

/// Priority tier of a scheduled item.
///
/// At equal times, urgent items run before normal ones regardless of sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    /// Interrupt deliveries.
    Urgent,
    /// Everything else.
    Normal,
}

/// Total order over everything the environment schedules: time, then tier, then sequence.
#[derive(Debug, Clone, Copy)]
pub struct Key {
    time: f64,
    tier: Tier,
    sequence: u64,
}

impl Key {
    /// The key of the sentinel that sits at the bottom of every agenda.
    pub const SENTINEL: Key = Key {
        time: f64::INFINITY,
        tier: Tier::Normal,
        sequence: u64::MAX,
    };

    /// Creates a new key.
    pub fn new(time: f64, tier: Tier, sequence: u64) -> Self {
        Self {
            time,
            tier,
            sequence,
        }
    }

    /// Returns the scheduled time.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Returns the priority tier.
    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Returns the insertion sequence.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns `true` for the sentinel key.
    pub fn is_sentinel(&self) -> bool {
        self.cmp(&Key::SENTINEL) == Ordering::Equal
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .total_cmp(&other.time)
            .then(self.tier.cmp(&other.tier))
            .then(self.sequence.cmp(&other.sequence))
    }
}

#[derive(Debug)]
struct Entry<T> {
    key: Key,
    // `None` marks the sentinel.
    item: Option<T>,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max heap, reverse so the smallest key surfaces first
        other.key.cmp(&self.key)
    }
}

/// A priority queue ordered by [`Key`] that is never empty.
///
/// A sentinel entry at `+∞` stays at the bottom of the heap, so the head of an
/// agenda always has a well-defined key and two agendas can be compared
/// without special-casing emptiness.
#[derive(Debug)]
pub struct Agenda<T> {
    heap: BinaryHeap<Entry<T>>,
}

impl<T> Agenda<T> {
    /// Creates an agenda holding only the sentinel.
    pub fn new() -> Self {
        let mut heap = BinaryHeap::new();
        heap.push(Entry {
            key: Key::SENTINEL,
            item: None,
        });
        Self { heap }
    }

    /// Schedules an item under the given key.
    pub fn schedule(&mut self, key: Key, item: T) {
        self.heap.push(Entry {
            key,
            item: Some(item),
        });
    }

    /// Returns the key at the head of the agenda, the sentinel key when nothing is scheduled.
    pub fn peek_key(&self) -> Key {
        self.heap.peek().map(|entry| entry.key).unwrap_or(Key::SENTINEL)
    }

    /// Removes and returns the earliest item, never the sentinel.
    pub fn pop_earliest(&mut self) -> Option<(Key, T)> {
        if self.heap.peek().map_or(true, |entry| entry.item.is_none()) {
            return None;
        }
        self.heap
            .pop()
            .and_then(|entry| entry.item.map(|item| (entry.key, item)))
    }

    /// Returns `true` if only the sentinel is left.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of scheduled items, sentinel excluded.
    pub fn len(&self) -> usize {
        self.heap.len().saturating_sub(1)
    }
}

impl<T> Default for Agenda<T> {
    fn default() -> Self {
        Self::new()
    }
}
