//! Resource whose holders can be evicted by more urgent requests.
//!
//! Requests are ordered by `(priority, issue time, preempt first, issue
//! order)`, lower values first. When the resource is full and a preempting
//! request reaches the head of the queue with a priority value strictly lower
//! than the worst current holder's, that holder is disposed and its process
//! is interrupted with a [`Preempted`] notice.

use std::{cell::RefCell, cmp::Ordering, future::IntoFuture, rc::Rc};
use tracing::{debug, trace};

use crate::{
    error::{SimulationError, SimulationResult, WaitError},
    resources::{grant, DEFAULT_PRIORITY},
    sim::{
        event::{AnyEvent, Event, EventId, EventKind},
        future::EventFuture,
        process::{Interrupt, Preempted, ProcessId},
        world::{Environment, WeakEnvironment},
    },
};

/// Whether requests preempt by default.
pub const DEFAULT_PREEMPT: bool = true;

#[derive(Debug, Clone, Copy)]
struct RequestKey {
    priority: f64,
    time: f64,
    preempt: bool,
    version: u64,
}

impl RequestKey {
    fn order(&self, other: &Self) -> Ordering {
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| self.time.total_cmp(&other.time))
            .then_with(|| other.preempt.cmp(&self.preempt))
            .then_with(|| self.version.cmp(&other.version))
    }
}

#[derive(Debug)]
struct Claim {
    key: RequestKey,
    event: EventId,
    process: Option<ProcessId>,
    granted_at: f64,
}

#[derive(Debug)]
struct PreemptiveState {
    capacity: usize,
    users: Vec<Claim>,
    // Sorted by key.
    queue: Vec<Claim>,
    next_version: u64,
}

impl PreemptiveState {
    fn enqueue(&mut self, claim: Claim) {
        let index = self
            .queue
            .partition_point(|queued| queued.key.order(&claim.key).is_lt());
        self.queue.insert(index, claim);
    }

    fn worst_user(&self) -> Option<usize> {
        self.users
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.key.order(&b.key))
            .map(|(index, _)| index)
    }
}

/// A resource with a fixed number of slots and priority-based eviction.
#[derive(Debug, Clone)]
pub struct PreemptiveResource {
    env: WeakEnvironment,
    id: u64,
    state: Rc<RefCell<PreemptiveState>>,
}

impl PreemptiveResource {
    fn new(env: &Environment, capacity: usize) -> SimulationResult<Self> {
        if capacity == 0 {
            return Err(SimulationError::InvalidCapacity(
                "resource capacity must be positive".to_string(),
            ));
        }
        Ok(Self {
            env: env.downgrade(),
            id: env.next_resource_id(),
            state: Rc::new(RefCell::new(PreemptiveState {
                capacity,
                users: Vec::new(),
                queue: Vec::new(),
                next_version: 0,
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

    /// Requests a slot with priority `0.0`, allowed to preempt.
    pub fn request(&self) -> SimulationResult<PreemptiveRequest> {
        self.request_with(DEFAULT_PRIORITY, DEFAULT_PREEMPT)
    }

    /// Requests a slot with `priority` (lower is more urgent), allowed to preempt.
    pub fn request_with_priority(&self, priority: f64) -> SimulationResult<PreemptiveRequest> {
        self.request_with(priority, DEFAULT_PREEMPT)
    }

    /// Requests a slot with `priority`; `preempt` decides whether it may evict a holder.
    pub fn request_with(&self, priority: f64, preempt: bool) -> SimulationResult<PreemptiveRequest> {
        let env = self.env.upgrade()?;
        let id = env.alloc_event(EventKind::Resource);
        let now = env.now();
        let process = env.active_process();

        let mut state = self.state.borrow_mut();
        let key = RequestKey {
            priority,
            time: now,
            preempt,
            version: state.next_version,
        };
        state.next_version += 1;
        let claim = Claim {
            key,
            event: id,
            process,
            granted_at: now,
        };

        let request = PreemptiveRequest {
            event: Event::new(id, self.env.clone()),
            version: key.version,
            priority,
            preempt,
            resource: self.clone(),
        };

        if state.queue.is_empty() && state.users.len() < state.capacity {
            state.users.push(claim);
            drop(state);
            trace!(resource = self.id, event = %id, "preemptive request granted on the spot");
            grant(&env, id, Rc::new(()), None);
            return Ok(request);
        }

        state.enqueue(claim);
        let at_head = state.queue.first().is_some_and(|head| head.event == id);
        if !preempt || !at_head || state.users.len() < state.capacity {
            drop(state);
            self.balance(&env);
            return Ok(request);
        }

        let victim = state.worst_user().and_then(|index| {
            if priority < state.users[index].key.priority {
                Some(state.users.remove(index))
            } else {
                None
            }
        });
        drop(state);

        if let Some(victim) = victim {
            debug!(
                resource = self.id,
                evicted = %victim.event,
                by = ?process,
                "holder preempted"
            );
            self.balance(&env);
            if let Some(pid) = victim.process {
                let notice = Preempted {
                    by: process,
                    usage_since: victim.granted_at,
                };
                if let Err(err) = env.interrupt(pid, Interrupt::new(Some(Rc::new(notice)))) {
                    debug!(process = %pid, %err, "preempted holder not interrupted");
                }
            }
        }
        Ok(request)
    }

    /// Gives back the slot of `request` and returns an event that completes now.
    pub fn release(&self, request: &PreemptiveRequest) -> SimulationResult<Event<()>> {
        if request.resource.id != self.id || !request.resource.env.same_environment(&self.env) {
            return Err(SimulationError::ForeignRequest);
        }
        let env = self.env.upgrade()?;
        request.dispose();
        let id = env.alloc_event(EventKind::Resource);
        grant(&env, id, Rc::new(()), None);
        Ok(Event::new(id, self.env.clone()))
    }

    fn dispose(&self, version: u64) -> bool {
        {
            let mut state = self.state.borrow_mut();
            if let Some(index) = state.users.iter().position(|u| u.key.version == version) {
                state.users.remove(index);
            } else if let Some(index) = state.queue.iter().position(|q| q.key.version == version) {
                state.queue.remove(index);
            } else {
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
            if state.users.len() < state.capacity && !state.queue.is_empty() {
                let mut claim = state.queue.remove(0);
                claim.granted_at = env.now();
                let id = claim.event;
                state.users.push(claim);
                Some(id)
            } else {
                None
            }
        };
        if let Some(id) = granted {
            trace!(resource = self.id, event = %id, "queued preemptive request granted");
            grant(env, id, Rc::new(()), None);
        }
    }
}

/// A pending or granted claim on a [`PreemptiveResource`] slot.
///
/// Dropping the request releases the slot or leaves the queue. A preempted
/// request no longer holds anything, so dropping it afterwards is a no-op.
#[must_use = "dropping a request releases it"]
#[derive(Debug)]
pub struct PreemptiveRequest {
    event: Event<()>,
    version: u64,
    priority: f64,
    preempt: bool,
    resource: PreemptiveResource,
}

impl PreemptiveRequest {
    /// The acquire event.
    pub fn event(&self) -> &Event<()> {
        &self.event
    }

    /// Priority the request was issued with.
    pub fn priority(&self) -> f64 {
        self.priority
    }

    /// Whether the request may evict a holder.
    pub fn preempt(&self) -> bool {
        self.preempt
    }

    /// Returns `true` while the request holds a slot.
    pub fn is_granted(&self) -> bool {
        self.resource
            .state
            .borrow()
            .users
            .iter()
            .any(|user| user.key.version == self.version)
    }

    /// Future resolving once the slot is granted.
    pub fn wait(&self) -> EventFuture<()> {
        self.event.wait()
    }

    /// Releases the slot or leaves the queue; returns `false` if there was nothing to do.
    pub fn dispose(&self) -> bool {
        self.resource.dispose(self.version)
    }
}

impl Drop for PreemptiveRequest {
    fn drop(&mut self) {
        self.resource.dispose(self.version);
    }
}

impl IntoFuture for &PreemptiveRequest {
    type Output = Result<(), WaitError<()>>;
    type IntoFuture = EventFuture<()>;

    fn into_future(self) -> Self::IntoFuture {
        self.wait()
    }
}

impl From<&PreemptiveRequest> for AnyEvent {
    fn from(request: &PreemptiveRequest) -> Self {
        request.event.erase()
    }
}

impl Environment {
    /// Creates a preemptive resource with `capacity` slots.
    pub fn preemptive_resource(&self, capacity: usize) -> SimulationResult<PreemptiveResource> {
        PreemptiveResource::new(self, capacity)
    }
}
