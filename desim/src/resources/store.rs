//! Bounded queue of items.
//!
//! Getters, putters and the stored items each have their own [`WaitPolicy`],
//! so a store can for instance hand out items by priority while serving
//! getters in arrival order.

use std::{cell::RefCell, fmt, future::IntoFuture, rc::Rc};
use tracing::trace;

use crate::{
    error::{SimulationError, SimulationResult, WaitError},
    resources::{grant, wait_queue::WaitQueue, WaitPolicy, DEFAULT_PRIORITY},
    sim::{
        event::{AnyEvent, EndHook, Event, EventId, EventKind},
        future::EventFuture,
        world::{Environment, WeakEnvironment},
    },
};

/// Ordering policies of a store's three queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorePolicies {
    /// Order in which waiting getters are served.
    pub get: WaitPolicy,
    /// Order in which waiting putters are served.
    pub put: WaitPolicy,
    /// Order in which stored items are handed out.
    pub item: WaitPolicy,
}

#[derive(Debug)]
struct Getter {
    token: u64,
    event: EventId,
}

#[derive(Debug)]
struct Putter<T> {
    token: u64,
    event: EventId,
    item: T,
    item_priority: f64,
}

#[derive(Debug)]
struct StoreState<T> {
    capacity: usize,
    items: WaitQueue<T>,
    gets: WaitQueue<Getter>,
    puts: WaitQueue<Putter<T>>,
    next_token: u64,
}

impl<T> StoreState<T> {
    fn next_token(&mut self) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        token
    }
}

pub(crate) fn validate_capacity(capacity: Option<usize>) -> SimulationResult<usize> {
    match capacity {
        Some(0) => Err(SimulationError::InvalidCapacity(
            "store capacity must be positive".to_string(),
        )),
        Some(capacity) => Ok(capacity),
        None => Ok(usize::MAX),
    }
}

/// A queue of items with optional capacity.
pub struct Store<T> {
    env: WeakEnvironment,
    state: Rc<RefCell<StoreState<T>>>,
}

impl<T: Clone + 'static> Store<T> {
    fn new(env: &Environment, capacity: Option<usize>, policies: StorePolicies) -> SimulationResult<Self> {
        let capacity = validate_capacity(capacity)?;
        Ok(Self {
            env: env.downgrade(),
            state: Rc::new(RefCell::new(StoreState {
                capacity,
                items: WaitQueue::new(policies.item, env),
                gets: WaitQueue::new(policies.get, env),
                puts: WaitQueue::new(policies.put, env),
                next_token: 0,
            })),
        })
    }

    /// Maximum number of stored items; `usize::MAX` when unbounded.
    pub fn capacity(&self) -> usize {
        self.state.borrow().capacity
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.state.borrow().items.len()
    }

    /// Returns `true` if no item is stored.
    pub fn is_empty(&self) -> bool {
        self.state.borrow().items.is_empty()
    }

    /// Snapshot of the stored items, in the order they would be handed out.
    pub fn items(&self) -> Vec<T> {
        self.state.borrow().items.iter().cloned().collect()
    }

    /// Number of getters waiting for an item.
    pub fn get_queue_len(&self) -> usize {
        self.state.borrow().gets.len()
    }

    /// Number of putters waiting for room.
    pub fn put_queue_len(&self) -> usize {
        self.state.borrow().puts.len()
    }

    /// Takes the next item; the event carries it.
    pub fn get(&self) -> SimulationResult<StoreGet<T>> {
        self.get_with_priority(DEFAULT_PRIORITY)
    }

    /// Takes the next item, queueing with `priority` if the store is empty.
    pub fn get_with_priority(&self, priority: f64) -> SimulationResult<StoreGet<T>> {
        let env = self.env.upgrade()?;
        let id = env.alloc_event(EventKind::Resource);

        let mut state = self.state.borrow_mut();
        let token = state.next_token();
        let item = if state.gets.is_empty() {
            state.items.pop_first()
        } else {
            None
        };
        match item {
            Some(item) => {
                drop(state);
                self.finish(&env, id, item);
            }
            None => {
                state.gets.push(Getter { token, event: id }, priority);
                trace!(event = %id, "store get queued");
            }
        }

        Ok(StoreGet {
            event: Event::new(id, self.env.clone()),
            token,
            store: self.clone(),
        })
    }

    /// Stores `item`; the event carries it.
    pub fn put(&self, item: T) -> SimulationResult<StorePut<T>> {
        self.put_with_priorities(item, DEFAULT_PRIORITY, DEFAULT_PRIORITY)
    }

    /// Stores `item`, queueing with `priority` if the store is full.
    pub fn put_with_priority(&self, item: T, priority: f64) -> SimulationResult<StorePut<T>> {
        self.put_with_priorities(item, priority, DEFAULT_PRIORITY)
    }

    /// Stores `item`; `put_priority` orders waiting putters and
    /// `item_priority` orders the item among stored items.
    pub fn put_with_priorities(
        &self,
        item: T,
        put_priority: f64,
        item_priority: f64,
    ) -> SimulationResult<StorePut<T>> {
        let env = self.env.upgrade()?;
        let id = env.alloc_event(EventKind::Resource);

        let mut state = self.state.borrow_mut();
        let token = state.next_token();
        if state.puts.is_empty() && state.items.len() < state.capacity {
            state.items.push(item.clone(), item_priority);
            drop(state);
            self.finish(&env, id, item);
        } else {
            state.puts.push(
                Putter {
                    token,
                    event: id,
                    item,
                    item_priority,
                },
                put_priority,
            );
            trace!(event = %id, "store put queued");
        }

        Ok(StorePut {
            event: Event::new(id, self.env.clone()),
            token,
            store: self.clone(),
        })
    }

    fn finish(&self, env: &Environment, id: EventId, item: T) {
        let store = self.clone();
        let hook: EndHook = Box::new(move |env: &Environment| store.balance(env));
        grant(env, id, Rc::new(item), Some(hook));
    }

    fn balance(&self, env: &Environment) {
        let (got, put) = {
            let mut state = self.state.borrow_mut();
            let got = if !state.gets.is_empty() && !state.items.is_empty() {
                let getter = state.gets.pop_first();
                let item = state.items.pop_first();
                getter.zip(item)
            } else {
                None
            };
            let put = if !state.puts.is_empty() && state.items.len() < state.capacity {
                state.puts.pop_first().map(|putter| {
                    state.items.push(putter.item.clone(), putter.item_priority);
                    (putter.event, putter.item)
                })
            } else {
                None
            };
            (got, put)
        };

        if let Some((getter, item)) = got {
            self.finish(env, getter.event, item);
        }
        if let Some((event, item)) = put {
            self.finish(env, event, item);
        }
    }

    fn cancel_get(&self, token: u64) -> bool {
        let removed = self
            .state
            .borrow_mut()
            .gets
            .remove_where(|g| g.token == token)
            .is_some();
        if removed {
            if let Ok(env) = self.env.upgrade() {
                self.balance(&env);
            }
        }
        removed
    }

    fn cancel_put(&self, token: u64) -> bool {
        let removed = self
            .state
            .borrow_mut()
            .puts
            .remove_where(|p| p.token == token)
            .is_some();
        if removed {
            if let Ok(env) = self.env.upgrade() {
                self.balance(&env);
            }
        }
        removed
    }
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            env: self.env.clone(),
            state: self.state.clone(),
        }
    }
}

impl<T> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Store")
            .field("capacity", &state.capacity)
            .field("items", &state.items.len())
            .field("gets", &state.gets.len())
            .field("puts", &state.puts.len())
            .finish()
    }
}

/// A get issued on a [`Store`].
#[derive(Debug)]
pub struct StoreGet<T> {
    event: Event<T>,
    token: u64,
    store: Store<T>,
}

impl<T: Clone + 'static> StoreGet<T> {
    /// The get event; its value is the item.
    pub fn event(&self) -> &Event<T> {
        &self.event
    }

    /// Future resolving to the item.
    pub fn wait(&self) -> EventFuture<T> {
        self.event.wait()
    }

    /// Withdraws the get if it is still queued; returns whether it was.
    pub fn dispose(&self) -> bool {
        self.store.cancel_get(self.token)
    }
}

/// A put issued on a [`Store`].
#[derive(Debug)]
pub struct StorePut<T> {
    event: Event<T>,
    token: u64,
    store: Store<T>,
}

impl<T: Clone + 'static> StorePut<T> {
    /// The put event; its value is the item.
    pub fn event(&self) -> &Event<T> {
        &self.event
    }

    /// Future resolving once the item is stored.
    pub fn wait(&self) -> EventFuture<T> {
        self.event.wait()
    }

    /// Withdraws the put if it is still queued; returns whether it was.
    pub fn dispose(&self) -> bool {
        self.store.cancel_put(self.token)
    }
}

impl<T> Clone for StoreGet<T> {
    fn clone(&self) -> Self {
        Self {
            event: self.event.clone(),
            token: self.token,
            store: self.store.clone(),
        }
    }
}

impl<T> Clone for StorePut<T> {
    fn clone(&self) -> Self {
        Self {
            event: self.event.clone(),
            token: self.token,
            store: self.store.clone(),
        }
    }
}

impl<T: Clone + 'static> IntoFuture for StoreGet<T> {
    type Output = Result<T, WaitError<T>>;
    type IntoFuture = EventFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        self.event.wait()
    }
}

impl<T: Clone + 'static> IntoFuture for StorePut<T> {
    type Output = Result<T, WaitError<T>>;
    type IntoFuture = EventFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        self.event.wait()
    }
}

impl<T> From<&StoreGet<T>> for AnyEvent {
    fn from(get: &StoreGet<T>) -> Self {
        get.event.erase()
    }
}

impl<T> From<&StorePut<T>> for AnyEvent {
    fn from(put: &StorePut<T>) -> Self {
        put.event.erase()
    }
}

impl Environment {
    /// Creates an unbounded FIFO store.
    pub fn store<T: Clone + 'static>(&self) -> SimulationResult<Store<T>> {
        Store::new(self, None, StorePolicies::default())
    }

    /// Creates a FIFO store holding at most `capacity` items.
    pub fn store_with_capacity<T: Clone + 'static>(&self, capacity: usize) -> SimulationResult<Store<T>> {
        Store::new(self, Some(capacity), StorePolicies::default())
    }

    /// Creates a store with the given capacity (`None` for unbounded) and policies.
    pub fn store_with<T: Clone + 'static>(
        &self,
        capacity: Option<usize>,
        policies: StorePolicies,
    ) -> SimulationResult<Store<T>> {
        Store::new(self, capacity, policies)
    }
}
