//! Core discrete-event simulation engine.
//!
//! This module provides the central [`Environment`] that owns the logical
//! clock, the agendas and the arenas of events and processes.
//!
//! ## Submodules
//!
//! - `agenda` - Scheduling key and the sentinel-terminated priority queue
//! - `world` - Core Environment and WeakEnvironment types, run control
//! - `event` - Event arena slots and typed/erased handles
//! - `condition` - Conditions over several events
//! - `process` - Processes, calls and interrupts
//! - `future` - Future awaited by processes
//! - `rng` - Environment-owned random number generation

pub mod agenda;
pub mod condition;
pub mod event;
pub mod future;
pub mod process;
pub mod rng;
pub mod world;

// Re-export main types at module level
pub use agenda::{Key, Tier};
pub use condition::{Condition, ConditionView};
pub use event::{AnyEvent, Event, EventId, EventState};
pub use future::EventFuture;
pub use process::{Interrupt, Preempted, Process, ProcessContext, ProcessId};
pub use rng::SimRng;
pub use world::{Environment, RunOutcome, WeakEnvironment};
