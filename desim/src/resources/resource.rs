//! Capacity-limited resource.
//!
//! A [`Resource`] admits up to `capacity` holders. Each [`Request`] is both
//! the acquire event and an RAII guard: dropping it, disposing it or passing
//! it to [`Resource::release`] gives the slot back. Disposing is idempotent.

use std::{cell::RefCell, future::IntoFuture, rc::Rc};
use tracing::trace;

use crate::{
    error::{SimulationError, SimulationResult, WaitError},
    resources::{grant, wait_queue::WaitQueue, WaitPolicy, DEFAULT_PRIORITY},
    sim::{
        event::{AnyEvent, Event, EventId, EventKind},
        future::EventFuture,
        world::{Environment, WeakEnvironment},
    },
};

#[derive(Debug)]
struct Waiting {
    token: u64,
    event: EventId,
}

#[derive(Debug)]
struct ResourceState {
    capacity: usize,
    users: Vec<Waiting>,
    queue: WaitQueue<Waiting>,
    next_token: u64,
}

/// A resource with a fixed number of slots.
#[derive(Debug, Clone)]
pub struct Resource {
    env: WeakEnvironment,
    id: u64,
    state: Rc<RefCell<ResourceState>>,
}

impl Resource {
    fn new(env: &Environment, capacity: usize, policy: WaitPolicy) -> SimulationResult<Self> {
        if capacity == 0 {
            return Err(SimulationError::InvalidCapacity(
                "resource capacity must be positive".to_string(),
            ));
        }
        Ok(Self {
            env: env.downgrade(),
            id: env.next_resource_id(),
            state: Rc::new(RefCell::new(ResourceState {
                capacity,
                users: Vec::new(),
                queue: WaitQueue::new(policy, env),
                next_token: 0,
            })),
        })
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.state.borrow().capacity
    }

    /// Number of granted requests currently holding a slot.
    pub fn count(&self) -> usize {
        self.state.borrow().users.len()
    }

    /// Number of requests waiting for a slot.
    pub fn queue_len(&self) -> usize {
        self.state.borrow().queue.len()
    }

    /// Policy ordering the request queue.
    pub fn policy(&self) -> WaitPolicy {
        self.state.borrow().queue.policy()
    }

    /// Acquire events of the current holders, in grant order.
    pub fn users(&self) -> Vec<AnyEvent> {
        self.state
            .borrow()
            .users
            .iter()
            .map(|user| AnyEvent {
                id: user.event,
                env: self.env.clone(),
            })
            .collect()
    }

    /// Requests a slot with the default priority.
    pub fn request(&self) -> SimulationResult<Request> {
        self.request_with_priority(DEFAULT_PRIORITY)
    }

    /// Requests a slot; `priority` orders the queue under [`WaitPolicy::Priority`].
    pub fn request_with_priority(&self, priority: f64) -> SimulationResult<Request> {
        let env = self.env.upgrade()?;
        let id = env.alloc_event(EventKind::Resource);

        let mut state = self.state.borrow_mut();
        let token = state.next_token;
        state.next_token += 1;
        let waiting = Waiting { token, event: id };

        if state.queue.is_empty() && state.users.len() < state.capacity {
            state.users.push(waiting);
            drop(state);
            trace!(resource = self.id, event = %id, "request granted on the spot");
            grant(&env, id, Rc::new(()), None);
        } else {
            state.queue.push(waiting, priority);
            trace!(resource = self.id, event = %id, queued = state.queue.len(), "request queued");
        }

        Ok(Request {
            event: Event::new(id, self.env.clone()),
            token,
            priority,
            resource: self.clone(),
        })
    }

    /// Gives back the slot of `request` and returns an event that completes now.
    ///
    /// Fails with [`SimulationError::ForeignRequest`] if `request` was issued
    /// by another resource.
    pub fn release(&self, request: &Request) -> SimulationResult<Event<()>> {
        if request.resource.id != self.id || !request.resource.env.same_environment(&self.env) {
            return Err(SimulationError::ForeignRequest);
        }
        let env = self.env.upgrade()?;
        request.dispose();
        let id = env.alloc_event(EventKind::Resource);
        grant(&env, id, Rc::new(()), None);
        Ok(Event::new(id, self.env.clone()))
    }

    fn dispose(&self, token: u64) -> bool {
        {
            let mut state = self.state.borrow_mut();
            if let Some(index) = state.users.iter().position(|user| user.token == token) {
                state.users.remove(index);
            } else if state.queue.remove_where(|w| w.token == token).is_none() {
                return false;
            }
        }
        if let Ok(env) = self.env.upgrade() {
            self.balance(&env);
        }
        true
    }

    fn balance(&self, env: &Environment) {
        let granted = {
            let mut state = self.state.borrow_mut();
            if state.users.len() < state.capacity {
                state.queue.pop_first().map(|waiting| {
                    let id = waiting.event;
                    state.users.push(waiting);
                    id
                })
            } else {
                None
            }
        };
        if let Some(id) = granted {
            trace!(resource = self.id, event = %id, "queued request granted");
            grant(env, id, Rc::new(()), None);
        }
    }
}

/// A pending or granted claim on a [`Resource`] slot.
///
/// Await it (by reference) to wait for the grant. Dropping the request
/// releases the slot or leaves the queue.
#[must_use = "dropping a request releases it"]
#[derive(Debug)]
pub struct Request {
    event: Event<()>,
    token: u64,
    priority: f64,
    resource: Resource,
}

impl Request {
    /// The acquire event.
    pub fn event(&self) -> &Event<()> {
        &self.event
    }

    /// Priority the request was issued with.
    pub fn priority(&self) -> f64 {
        self.priority
    }

    /// Returns `true` while the request holds a slot.
    pub fn is_granted(&self) -> bool {
        self.resource
            .state
            .borrow()
            .users
            .iter()
            .any(|user| user.token == self.token)
    }

    /// Future resolving once the slot is granted.
    pub fn wait(&self) -> EventFuture<()> {
        self.event.wait()
    }

    /// Releases the slot or leaves the queue; returns `false` if there was nothing to do.
    pub fn dispose(&self) -> bool {
        self.resource.dispose(self.token)
    }
}

impl Drop for Request {
    fn drop(&mut self) {
        self.resource.dispose(self.token);
    }
}

impl IntoFuture for &Request {
    type Output = Result<(), WaitError<()>>;
    type IntoFuture = EventFuture<()>;

    fn into_future(self) -> Self::IntoFuture {
        self.wait()
    }
}

impl From<&Request> for AnyEvent {
    fn from(request: &Request) -> Self {
        request.event.erase()
    }
}

impl Environment {
    /// Creates a FIFO resource with `capacity` slots.
    ///
    /// # Example
    ///
    /// ```rust
    /// use desim::Environment;
    ///
    /// let env = Environment::new();
    /// let desk = env.resource(1).unwrap();
    ///
    /// let clerk = desk.clone();
    /// env.process(move |ctx| async move {
    ///     let seat = clerk.request()?;
    ///     (&seat).await?;
    ///     ctx.timeout(4.0)?.await?;
    ///     Ok::<_, desim::SimulationError>(())
    /// });
    ///
    /// env.run_until(1.0).unwrap();
    /// assert_eq!(desk.count(), 1);
    /// ```
    pub fn resource(&self, capacity: usize) -> SimulationResult<Resource> {
        Resource::new(self, capacity, WaitPolicy::Fifo)
    }

    /// Creates a resource whose request queue follows `policy`.
    pub fn resource_with_policy(
        &self,
        capacity: usize,
        policy: WaitPolicy,
    ) -> SimulationResult<Resource> {
        Resource::new(self, capacity, policy)
    }
}
