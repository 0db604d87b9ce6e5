//! # Desim
//!
//! A deterministic discrete-event simulation kernel in the style of SimPy.
//!
//! Simulated time only moves when the [`Environment`] pops the next scheduled
//! event off its agenda, so an hour of model time costs as much as the work
//! done inside it. Behaviour is written as processes: async bodies that await
//! events (timeouts, other processes, conditions, resource grants) and are
//! resumed by the kernel when those events complete.
//!
//! Key properties:
//! - **Reproducible**: same seed and same model produce the same trace
//! - **Single-threaded**: no locks, shared state lives in `Rc<RefCell<_>>`
//! - **Fast**: logical time skips idle periods, real-time pacing is opt-in
//!
//! ## Core Components
//!
//! - [`Environment`]: clock, agendas, event and process arenas, run control
//! - [`Event`] and [`AnyEvent`]: typed and type-erased handles to events
//! - [`Process`] and [`ProcessContext`]: simulated activities and their API
//! - [`Condition`]: events completing on a predicate over other events
//! - [`resources`]: resources, containers and stores
//! - [`realtime`]: wall-clock pacing with an injectable [`WallClock`]
//!
//! ## Quick Start
//!
//! ```rust
//! use desim::{Environment, SimulationError};
//!
//! let env = Environment::new_with_seed(42);
//! let pump = env.resource(1).unwrap();
//!
//! for car in 0..3 {
//!     let pump = pump.clone();
//!     env.process(move |ctx| async move {
//!         let slot = pump.request()?;
//!         (&slot).await?;
//!         ctx.timeout(5.0)?.await?;
//!         Ok::<_, SimulationError>(car)
//!     });
//! }
//!
//! env.run().unwrap();
//! assert_eq!(env.now(), 15.0);
//! ```
//!
//! ## Ordering
//!
//! Events are processed in ascending `(time, tier, insertion order)`.
//! Interrupt deliveries use the urgent tier, so they are handled before
//! ordinary events scheduled at the same instant.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

// =============================================================================
// Core Modules
// =============================================================================

/// Core simulation engine: clock, agendas, events, processes and conditions.
pub mod sim;

/// Shared-resource primitives built on events.
pub mod resources;

/// Environment configuration.
pub mod config;

/// Error types.
pub mod error;

/// Wall-clock pacing for real-time runs.
pub mod realtime;

/// Time unit conversions.
pub mod time;

// =============================================================================
// Public API Re-exports
// =============================================================================

// Sim module re-exports
pub use sim::{
    AnyEvent, Condition, ConditionView, Environment, Event, EventFuture, EventId, EventState,
    Interrupt, Preempted, Process, ProcessContext, ProcessId, RunOutcome, SimRng,
    WeakEnvironment,
};

// Resource exports
pub use resources::{
    Container, ContainerGet, ContainerPut, FilterStore, FilterStoreGet, FilterStorePut,
    PreemptiveRequest, PreemptiveResource, Request, Resource, Store, StoreGet, StorePolicies,
    StorePut, WaitPolicy, DEFAULT_PRIORITY,
};

// Configuration and errors
pub use config::EnvironmentConfig;
pub use error::{SimulationError, SimulationResult, WaitError};
pub use realtime::{ManualWallClock, RealTimeOptions, SystemWallClock, WallClock};
pub use time::TimeUnit;
