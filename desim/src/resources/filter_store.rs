//! Store whose getters choose items with a predicate.
//!
//! A get takes the first stored item its filter accepts, scanning in the
//! item queue's order. A put first looks for a waiting getter that accepts
//! the item and hands it over directly; only when nobody wants it does the
//! item go into the store.

use std::{cell::RefCell, fmt, future::IntoFuture, rc::Rc};
use tracing::trace;

use crate::{
    error::{SimulationResult, WaitError},
    resources::{
        grant, store::validate_capacity, wait_queue::WaitQueue, StorePolicies, DEFAULT_PRIORITY,
    },
    sim::{
        event::{AnyEvent, EndHook, Event, EventId, EventKind},
        future::EventFuture,
        world::{Environment, WeakEnvironment},
    },
};

type Filter<T> = Rc<dyn Fn(&T) -> bool>;

struct Getter<T> {
    token: u64,
    event: EventId,
    filter: Filter<T>,
}

struct Putter<T> {
    token: u64,
    event: EventId,
    item: T,
    item_priority: f64,
}

struct FilterStoreState<T> {
    capacity: usize,
    items: WaitQueue<T>,
    gets: WaitQueue<Getter<T>>,
    puts: WaitQueue<Putter<T>>,
    next_token: u64,
}

impl<T> FilterStoreState<T> {
    fn next_token(&mut self) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        token
    }
}

/// A store whose getters select items with a filter.
pub struct FilterStore<T> {
    env: WeakEnvironment,
    state: Rc<RefCell<FilterStoreState<T>>>,
}

impl<T: Clone + 'static> FilterStore<T> {
    fn new(env: &Environment, capacity: Option<usize>, policies: StorePolicies) -> SimulationResult<Self> {
        let capacity = validate_capacity(capacity)?;
        Ok(Self {
            env: env.downgrade(),
            state: Rc::new(RefCell::new(FilterStoreState {
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

    /// Snapshot of the stored items, in scan order.
    pub fn items(&self) -> Vec<T> {
        self.state.borrow().items.iter().cloned().collect()
    }

    /// Number of getters waiting for a matching item.
    pub fn get_queue_len(&self) -> usize {
        self.state.borrow().gets.len()
    }

    /// Number of putters waiting for room.
    pub fn put_queue_len(&self) -> usize {
        self.state.borrow().puts.len()
    }

    /// Takes the next item, whatever it is.
    pub fn get(&self) -> SimulationResult<FilterStoreGet<T>> {
        self.get_filtered_with_priority(|_| true, DEFAULT_PRIORITY)
    }

    /// Takes the first item accepted by `filter`.
    pub fn get_filtered<F>(&self, filter: F) -> SimulationResult<FilterStoreGet<T>>
    where
        F: Fn(&T) -> bool + 'static,
    {
        self.get_filtered_with_priority(filter, DEFAULT_PRIORITY)
    }

    /// Takes the first item accepted by `filter`, queueing with `priority` if none matches.
    pub fn get_filtered_with_priority<F>(
        &self,
        filter: F,
        priority: f64,
    ) -> SimulationResult<FilterStoreGet<T>>
    where
        F: Fn(&T) -> bool + 'static,
    {
        let env = self.env.upgrade()?;
        let id = env.alloc_event(EventKind::Resource);
        let filter: Filter<T> = Rc::new(filter);

        let mut state = self.state.borrow_mut();
        let token = state.next_token();
        match state.items.remove_where(|item| filter(item)) {
            Some(item) => {
                drop(state);
                self.finish(&env, id, item);
            }
            None => {
                state.gets.push(
                    Getter {
                        token,
                        event: id,
                        filter,
                    },
                    priority,
                );
                trace!(event = %id, "filtered get queued");
            }
        }

        Ok(FilterStoreGet {
            event: Event::new(id, self.env.clone()),
            token,
            store: self.clone(),
        })
    }

    /// Stores `item` or hands it to a waiting getter that accepts it.
    pub fn put(&self, item: T) -> SimulationResult<FilterStorePut<T>> {
        self.put_with_priorities(item, DEFAULT_PRIORITY, DEFAULT_PRIORITY)
    }

    /// Like [`FilterStore::put`], queueing with `priority` if the store is full.
    pub fn put_with_priority(&self, item: T, priority: f64) -> SimulationResult<FilterStorePut<T>> {
        self.put_with_priorities(item, priority, DEFAULT_PRIORITY)
    }

    /// Like [`FilterStore::put`]; `item_priority` orders the item among stored items.
    pub fn put_with_priorities(
        &self,
        item: T,
        put_priority: f64,
        item_priority: f64,
    ) -> SimulationResult<FilterStorePut<T>> {
        let env = self.env.upgrade()?;
        let id = env.alloc_event(EventKind::Resource);

        let mut state = self.state.borrow_mut();
        let token = state.next_token();
        let handed = state.gets.remove_where(|getter| (getter.filter)(&item));

        if let Some(getter) = handed {
            drop(state);
            trace!(put = %id, get = %getter.event, "item handed to waiting getter");
            self.finish(&env, getter.event, item.clone());
            self.finish(&env, id, item);
        } else if state.items.len() < state.capacity {
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
            trace!(event = %id, "filter store put queued");
        }

        Ok(FilterStorePut {
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
            let servable = state
                .gets
                .position(|getter| state.items.iter().any(|item| (getter.filter)(item)));
            let got = servable.and_then(|index| {
                let getter = state.gets.remove(index)?;
                let item = state.items.remove_where(|item| (getter.filter)(item))?;
                Some((getter.event, item))
            });
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

        if let Some((event, item)) = got {
            self.finish(env, event, item);
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

impl<T> Clone for FilterStore<T> {
    fn clone(&self) -> Self {
        Self {
            env: self.env.clone(),
            state: self.state.clone(),
        }
    }
}

impl<T> fmt::Debug for FilterStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("FilterStore")
            .field("capacity", &state.capacity)
            .field("items", &state.items.len())
            .field("gets", &state.gets.len())
            .field("puts", &state.puts.len())
            .finish()
    }
}

impl<T> fmt::Debug for Getter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Getter").field("event", &self.event).finish_non_exhaustive()
    }
}

impl<T> fmt::Debug for Putter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Putter").field("event", &self.event).finish_non_exhaustive()
    }
}

/// A filtered get issued on a [`FilterStore`].
pub struct FilterStoreGet<T> {
    event: Event<T>,
    token: u64,
    store: FilterStore<T>,
}

/// A put issued on a [`FilterStore`].
pub struct FilterStorePut<T> {
    event: Event<T>,
    token: u64,
    store: FilterStore<T>,
}

impl<T: Clone + 'static> FilterStoreGet<T> {
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

impl<T: Clone + 'static> FilterStorePut<T> {
    /// The put event; its value is the item.
    pub fn event(&self) -> &Event<T> {
        &self.event
    }

    /// Future resolving once the item is stored or handed over.
    pub fn wait(&self) -> EventFuture<T> {
        self.event.wait()
    }

    /// Withdraws the put if it is still queued; returns whether it was.
    pub fn dispose(&self) -> bool {
        self.store.cancel_put(self.token)
    }
}

impl<T> Clone for FilterStoreGet<T> {
    fn clone(&self) -> Self {
        Self {
            event: self.event.clone(),
            token: self.token,
            store: self.store.clone(),
        }
    }
}

impl<T> Clone for FilterStorePut<T> {
    fn clone(&self) -> Self {
        Self {
            event: self.event.clone(),
            token: self.token,
            store: self.store.clone(),
        }
    }
}

impl<T> fmt::Debug for FilterStoreGet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FilterStoreGet").field(&self.event.id()).finish()
    }
}

impl<T> fmt::Debug for FilterStorePut<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FilterStorePut").field(&self.event.id()).finish()
    }
}

impl<T: Clone + 'static> IntoFuture for FilterStoreGet<T> {
    type Output = Result<T, WaitError<T>>;
    type IntoFuture = EventFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        self.event.wait()
    }
}

impl<T: Clone + 'static> IntoFuture for FilterStorePut<T> {
    type Output = Result<T, WaitError<T>>;
    type IntoFuture = EventFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        self.event.wait()
    }
}

impl<T> From<&FilterStoreGet<T>> for AnyEvent {
    fn from(get: &FilterStoreGet<T>) -> Self {
        get.event.erase()
    }
}

impl<T> From<&FilterStorePut<T>> for AnyEvent {
    fn from(put: &FilterStorePut<T>) -> Self {
        put.event.erase()
    }
}

impl Environment {
    /// Creates an unbounded filter store with FIFO queues.
    pub fn filter_store<T: Clone + 'static>(&self) -> SimulationResult<FilterStore<T>> {
        FilterStore::new(self, None, StorePolicies::default())
    }

    /// Creates a FIFO filter store holding at most `capacity` items.
    pub fn filter_store_with_capacity<T: Clone + 'static>(
        &self,
        capacity: usize,
    ) -> SimulationResult<FilterStore<T>> {
        FilterStore::new(self, Some(capacity), StorePolicies::default())
    }

    /// Creates a filter store with the given capacity (`None` for unbounded) and policies.
    pub fn filter_store_with<T: Clone + 'static>(
        &self,
        capacity: Option<usize>,
        policies: StorePolicies,
    ) -> SimulationResult<FilterStore<T>> {
        FilterStore::new(self, capacity, policies)
    }
}
