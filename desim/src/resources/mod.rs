//! Shared-resource primitives built on events.
//!
//! Every primitive follows the same two-phase protocol: a request is
//! satisfied on the spot when capacity allows and nobody is queued ahead of
//! it, otherwise it joins a [`WaitPolicy`]-ordered queue and is retried each
//! time capacity changes. Granted events rebalance their primitive again when
//! the main loop finalizes them, so one release can cascade through the queue.
//!
//! ## Submodules
//!
//! - `wait_queue` - Policy-ordered queues of waiting parties
//! - `resource` - Capacity-limited resource with RAII requests
//! - `preemptive` - Resource whose holders can be evicted by higher priorities
//! - `container` - Continuous quantity between zero and a capacity
//! - `store` - Bounded queue of items
//! - `filter_store` - Store whose getters select items with a predicate

pub mod container;
pub mod filter_store;
pub mod preemptive;
pub mod resource;
pub mod store;
pub mod wait_queue;

pub use container::{Container, ContainerGet, ContainerPut};
pub use filter_store::{FilterStore, FilterStoreGet, FilterStorePut};
pub use preemptive::{PreemptiveRequest, PreemptiveResource};
pub use resource::{Request, Resource};
pub use store::{Store, StoreGet, StorePolicies, StorePut};
pub use wait_queue::WaitPolicy;

use crate::sim::{
    event::{EndHook, EventId, Outcome, Value},
    world::Environment,
};

/// Default priority of requests, gets and puts.
pub const DEFAULT_PRIORITY: f64 = 0.0;

/// Succeeds a resource event now, attaching `on_end` to run when it is finalized.
pub(crate) fn grant(env: &Environment, id: EventId, value: Value, on_end: Option<EndHook>) {
    if let Some(hook) = on_end {
        env.set_end_hook(id, hook);
    }
    env.trigger(id, Outcome::Success, value, 0.0);
}
