//! Continuous quantity between zero and a capacity.
//!
//! A get succeeds once the level can drop by its quantity, a put once the
//! level can rise by its quantity without passing the capacity. Both queues
//! are retried whenever a granted get or put is finalized.

use std::{cell::RefCell, future::IntoFuture, rc::Rc};
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

#[derive(Debug)]
struct Transfer {
    token: u64,
    event: EventId,
    quantity: f64,
}

#[derive(Debug)]
struct ContainerState {
    capacity: f64,
    level: f64,
    gets: WaitQueue<Transfer>,
    puts: WaitQueue<Transfer>,
    next_token: u64,
}

impl ContainerState {
    fn can_get(&self, quantity: f64) -> bool {
        self.level - quantity >= 0.0
    }

    fn can_put(&self, quantity: f64) -> bool {
        self.level + quantity <= self.capacity
    }
}

/// A tank holding a continuous quantity.
#[derive(Debug, Clone)]
pub struct Container {
    env: WeakEnvironment,
    state: Rc<RefCell<ContainerState>>,
}

impl Container {
    fn new(
        env: &Environment,
        capacity: f64,
        level: f64,
        get_policy: WaitPolicy,
        put_policy: WaitPolicy,
    ) -> SimulationResult<Self> {
        if capacity.is_nan() || capacity <= 0.0 {
            return Err(SimulationError::InvalidCapacity(format!(
                "container capacity must be positive, got {capacity}"
            )));
        }
        if level.is_nan() || level < 0.0 || level > capacity {
            return Err(SimulationError::InvalidLevel { level, capacity });
        }
        Ok(Self {
            env: env.downgrade(),
            state: Rc::new(RefCell::new(ContainerState {
                capacity,
                level,
                gets: WaitQueue::new(get_policy, env),
                puts: WaitQueue::new(put_policy, env),
                next_token: 0,
            })),
        })
    }

    /// Maximum level.
    pub fn capacity(&self) -> f64 {
        self.state.borrow().capacity
    }

    /// Current level.
    pub fn level(&self) -> f64 {
        self.state.borrow().level
    }

    /// Number of gets waiting for enough quantity.
    pub fn get_queue_len(&self) -> usize {
        self.state.borrow().gets.len()
    }

    /// Number of puts waiting for enough room.
    pub fn put_queue_len(&self) -> usize {
        self.state.borrow().puts.len()
    }

    fn check(&self, quantity: f64) -> SimulationResult<()> {
        if quantity.is_nan() || quantity < 0.0 {
            return Err(SimulationError::NegativeQuantity(quantity));
        }
        let capacity = self.capacity();
        if quantity > capacity {
            return Err(SimulationError::ExcessiveQuantity { quantity, capacity });
        }
        Ok(())
    }

    /// Takes `quantity` out; the event carries the quantity.
    pub fn get(&self, quantity: f64) -> SimulationResult<ContainerGet> {
        self.get_with_priority(quantity, DEFAULT_PRIORITY)
    }

    /// Takes `quantity` out, queueing with `priority` if needed.
    pub fn get_with_priority(&self, quantity: f64, priority: f64) -> SimulationResult<ContainerGet> {
        self.check(quantity)?;
        let env = self.env.upgrade()?;
        let id = env.alloc_event(EventKind::Resource);

        let mut state = self.state.borrow_mut();
        let token = state.next_token;
        state.next_token += 1;
        if state.gets.is_empty() && state.can_get(quantity) {
            state.level -= quantity;
            drop(state);
            self.finish(&env, id, quantity);
        } else {
            state.gets.push(Transfer { token, event: id, quantity }, priority);
            trace!(event = %id, quantity, "container get queued");
        }

        Ok(ContainerGet {
            event: Event::new(id, self.env.clone()),
            token,
            container: self.clone(),
        })
    }

    /// Adds `quantity`; the event carries the quantity.
    pub fn put(&self, quantity: f64) -> SimulationResult<ContainerPut> {
        self.put_with_priority(quantity, DEFAULT_PRIORITY)
    }

    /// Adds `quantity`, queueing with `priority` if needed.
    pub fn put_with_priority(&self, quantity: f64, priority: f64) -> SimulationResult<ContainerPut> {
        self.check(quantity)?;
        let env = self.env.upgrade()?;
        let id = env.alloc_event(EventKind::Resource);

        let mut state = self.state.borrow_mut();
        let token = state.next_token;
        state.next_token += 1;
        if state.puts.is_empty() && state.can_put(quantity) {
            state.level += quantity;
            drop(state);
            self.finish(&env, id, quantity);
        } else {
            state.puts.push(Transfer { token, event: id, quantity }, priority);
            trace!(event = %id, quantity, "container put queued");
        }

        Ok(ContainerPut {
            event: Event::new(id, self.env.clone()),
            token,
            container: self.clone(),
        })
    }

    fn finish(&self, env: &Environment, id: EventId, quantity: f64) {
        let container = self.clone();
        let hook: EndHook = Box::new(move |env: &Environment| container.balance(env));
        grant(env, id, Rc::new(quantity), Some(hook));
    }

    fn balance(&self, env: &Environment) {
        let (got, put) = {
            let mut state = self.state.borrow_mut();
            let got = if state.gets.first().is_some_and(|t| state.can_get(t.quantity)) {
                state.gets.pop_first()
            } else {
                None
            };
            if let Some(get) = &got {
                state.level -= get.quantity;
            }
            let put = if state.puts.first().is_some_and(|t| state.can_put(t.quantity)) {
                state.puts.pop_first()
            } else {
                None
            };
            if let Some(put) = &put {
                state.level += put.quantity;
            }
            (got, put)
        };

        for transfer in got.into_iter().chain(put) {
            trace!(event = %transfer.event, quantity = transfer.quantity, "container transfer granted");
            self.finish(env, transfer.event, transfer.quantity);
        }
    }

    fn cancel(&self, token: u64, gets: bool) -> bool {
        let removed = {
            let mut state = self.state.borrow_mut();
            let queue = if gets { &mut state.gets } else { &mut state.puts };
            queue.remove_where(|t| t.token == token).is_some()
        };
        if removed {
            if let Ok(env) = self.env.upgrade() {
                self.balance(&env);
            }
        }
        removed
    }
}

macro_rules! transfer_handle {
    ($(#[$meta:meta])* $name:ident, $gets:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            event: Event<f64>,
            token: u64,
            container: Container,
        }

        impl $name {
            /// The transfer event; its value is the quantity.
            pub fn event(&self) -> &Event<f64> {
                &self.event
            }

            /// Future resolving once the transfer happened.
            pub fn wait(&self) -> EventFuture<f64> {
                self.event.wait()
            }

            /// Withdraws the transfer if it is still queued; returns whether it was.
            pub fn dispose(&self) -> bool {
                self.container.cancel(self.token, $gets)
            }
        }

        impl IntoFuture for $name {
            type Output = Result<f64, WaitError<f64>>;
            type IntoFuture = EventFuture<f64>;

            fn into_future(self) -> Self::IntoFuture {
                self.event.wait()
            }
        }

        impl IntoFuture for &$name {
            type Output = Result<f64, WaitError<f64>>;
            type IntoFuture = EventFuture<f64>;

            fn into_future(self) -> Self::IntoFuture {
                self.event.wait()
            }
        }

        impl From<&$name> for AnyEvent {
            fn from(handle: &$name) -> Self {
                handle.event.erase()
            }
        }
    };
}

transfer_handle!(
    /// A get issued on a [`Container`].
    ContainerGet,
    true
);
transfer_handle!(
    /// A put issued on a [`Container`].
    ContainerPut,
    false
);

impl Environment {
    /// Creates a container with FIFO queues.
    pub fn container(&self, capacity: f64, level: f64) -> SimulationResult<Container> {
        Container::new(self, capacity, level, WaitPolicy::Fifo, WaitPolicy::Fifo)
    }

    /// Creates a container whose get and put queues follow the given policies.
    pub fn container_with_policies(
        &self,
        capacity: f64,
        level: f64,
        get_policy: WaitPolicy,
        put_policy: WaitPolicy,
    ) -> SimulationResult<Container> {
        Container::new(self, capacity, level, get_policy, put_policy)
    }
}
