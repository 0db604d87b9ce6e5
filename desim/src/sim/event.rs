//! Events: one-shot state cells stored in the environment's arena.
//!
//! The arena owns every event's state, value, subscribers and parent
//! conditions. User code only holds handles: [`Event<T>`] is typed by the
//! value it carries, [`AnyEvent`] erases that type so events of different
//! kinds can be mixed in a condition.

use std::{
    any::Any,
    fmt,
    future::IntoFuture,
    hash::{Hash, Hasher},
    marker::PhantomData,
    rc::Rc,
};

use crate::{
    error::SimulationResult,
    sim::{
        condition::{Condition, Evaluator},
        future::EventFuture,
        process::ProcessId,
        world::{Environment, WeakEnvironment},
    },
};

/// Type-erased event payload.
pub(crate) type Value = Rc<dyn Any>;

/// Hook run when an event is finalized, before its state changes.
pub(crate) type EndHook = Box<dyn FnOnce(&Environment)>;

/// Stable handle of an event inside its environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub(crate) usize);

impl EventId {
    /// Position of the event in the arena.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event#{}", self.0)
    }
}

/// Lifecycle of an event.
///
/// `Triggered` events have their outcome decided and sit in the agenda; they
/// become `Succeeded` or `Failed` when the main loop reaches them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventState {
    /// Nothing decided yet.
    Pending,
    /// Outcome decided, completion scheduled.
    Triggered,
    /// Completed successfully.
    Succeeded,
    /// Completed with a failure.
    Failed,
}

impl EventState {
    /// Returns `true` once the event has succeeded or failed.
    pub fn is_done(&self) -> bool {
        matches!(self, EventState::Succeeded | EventState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Success,
    Failure,
}

/// What an event stands for; decides who may trigger it and what its completion does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EventKind {
    Generic,
    Timeout,
    Process(ProcessId),
    Call(ProcessId),
    Condition,
    Interrupt(ProcessId),
    Suspend(ProcessId),
    Resource,
}

pub(crate) struct EventSlot {
    pub(crate) kind: EventKind,
    pub(crate) state: EventState,
    pub(crate) outcome: Outcome,
    pub(crate) value: Option<Value>,
    pub(crate) subscribers: Vec<ProcessId>,
    pub(crate) parents: Vec<EventId>,
    pub(crate) on_end: Option<EndHook>,
}

impl EventSlot {
    pub(crate) fn new(kind: EventKind) -> Self {
        Self {
            kind,
            state: EventState::Pending,
            outcome: Outcome::Success,
            value: None,
            subscribers: Vec::new(),
            parents: Vec::new(),
            on_end: None,
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.state.is_done()
    }

    /// Value once the event is done.
    pub(crate) fn settled_value(&self) -> Option<Value> {
        if self.is_done() {
            self.value.clone()
        } else {
            None
        }
    }
}

impl fmt::Debug for EventSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSlot")
            .field("kind", &self.kind)
            .field("state", &self.state)
            .field("subscribers", &self.subscribers)
            .field("parents", &self.parents)
            .finish_non_exhaustive()
    }
}

pub(crate) fn extract<T: Clone + 'static>(value: &Value) -> Option<T> {
    value.downcast_ref::<T>().cloned()
}

fn extract_unit(_: &Value) -> Option<()> {
    Some(())
}

/// Typed handle to an event.
///
/// Handles are cheap to clone and do not keep the environment alive. Awaiting
/// a handle from inside a process suspends the process until the event is done.
pub struct Event<T> {
    pub(crate) id: EventId,
    pub(crate) env: WeakEnvironment,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Event<T> {
    pub(crate) fn new(id: EventId, env: WeakEnvironment) -> Self {
        Self {
            id,
            env,
            _marker: PhantomData,
        }
    }

    /// Arena handle of this event.
    pub fn id(&self) -> EventId {
        self.id
    }

    /// Current state.
    pub fn state(&self) -> SimulationResult<EventState> {
        Ok(self.env.upgrade()?.event_state(self.id))
    }

    /// Returns `true` while the event has neither been triggered nor completed.
    pub fn is_pending(&self) -> bool {
        matches!(self.state(), Ok(EventState::Pending))
    }

    /// Returns `true` once the outcome is decided, done or not.
    pub fn is_triggered(&self) -> bool {
        matches!(
            self.state(),
            Ok(EventState::Triggered | EventState::Succeeded | EventState::Failed)
        )
    }

    /// Returns `true` once the event has succeeded.
    pub fn is_succeeded(&self) -> bool {
        matches!(self.state(), Ok(EventState::Succeeded))
    }

    /// Returns `true` once the event has failed.
    pub fn is_failed(&self) -> bool {
        matches!(self.state(), Ok(EventState::Failed))
    }

    /// Type-erased handle to the same event.
    pub fn erase(&self) -> AnyEvent {
        AnyEvent {
            id: self.id,
            env: self.env.clone(),
        }
    }

    /// Condition satisfied once both events have succeeded.
    pub fn and(&self, other: impl Into<AnyEvent>) -> SimulationResult<Condition> {
        self.env
            .upgrade()?
            .build_condition(vec![self.erase(), other.into()], Evaluator::All)
    }

    /// Condition satisfied once either event has succeeded.
    pub fn or(&self, other: impl Into<AnyEvent>) -> SimulationResult<Condition> {
        self.env
            .upgrade()?
            .build_condition(vec![self.erase(), other.into()], Evaluator::Any)
    }
}

impl<T: 'static> Event<T> {
    /// Triggers a generic event as succeeded; it completes at the current time.
    ///
    /// Fails with [`SimulationError::EventAlreadyTriggered`](crate::SimulationError::EventAlreadyTriggered) if the event already
    /// left the pending state, and with [`SimulationError::NotTriggerable`](crate::SimulationError::NotTriggerable) for
    /// events the kernel completes by itself.
    pub fn succeed(&self, value: T) -> SimulationResult<()> {
        self.env
            .upgrade()?
            .trigger_user(self.id, Outcome::Success, Rc::new(value))
    }

    /// Triggers a generic event as failed; it completes at the current time.
    pub fn fail(&self, value: T) -> SimulationResult<()> {
        self.env
            .upgrade()?
            .trigger_user(self.id, Outcome::Failure, Rc::new(value))
    }

    /// Like [`Event::succeed`], returning whether the event was triggered.
    pub fn try_succeed(&self, value: T) -> bool {
        self.succeed(value).is_ok()
    }

    /// Like [`Event::fail`], returning whether the event was triggered.
    pub fn try_fail(&self, value: T) -> bool {
        self.fail(value).is_ok()
    }
}

impl<T: Clone + 'static> Event<T> {
    /// The value, once the event is done.
    pub fn value(&self) -> Option<T> {
        let env = self.env.upgrade().ok()?;
        let value = env.event_value(self.id)?;
        extract(&value)
    }

    /// Future resolving when the event is done.
    pub fn wait(&self) -> EventFuture<T> {
        EventFuture::new(self.env.clone(), self.id, extract::<T>)
    }
}

impl<T: Clone + 'static> IntoFuture for Event<T> {
    type Output = Result<T, crate::error::WaitError<T>>;
    type IntoFuture = EventFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        self.wait()
    }
}

impl<T: Clone + 'static> IntoFuture for &Event<T> {
    type Output = Result<T, crate::error::WaitError<T>>;
    type IntoFuture = EventFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        self.wait()
    }
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self::new(self.id, self.env.clone())
    }
}

impl<T> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Event").field(&self.id).finish()
    }
}

impl<T> PartialEq for Event<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.env.same_environment(&other.env)
    }
}

impl<T> Eq for Event<T> {}

/// Handle to an event whose value type has been erased.
///
/// Conditions report their results as lists of erased handles.
#[derive(Clone)]
pub struct AnyEvent {
    pub(crate) id: EventId,
    pub(crate) env: WeakEnvironment,
}

impl AnyEvent {
    /// Arena handle of this event.
    pub fn id(&self) -> EventId {
        self.id
    }

    /// Current state.
    pub fn state(&self) -> SimulationResult<EventState> {
        Ok(self.env.upgrade()?.event_state(self.id))
    }

    /// Returns `true` once the event has succeeded.
    pub fn is_succeeded(&self) -> bool {
        matches!(self.state(), Ok(EventState::Succeeded))
    }

    /// Returns `true` once the event has failed.
    pub fn is_failed(&self) -> bool {
        matches!(self.state(), Ok(EventState::Failed))
    }

    /// Reads the value as `T`, once the event is done.
    pub fn value<T: Clone + 'static>(&self) -> Option<T> {
        let env = self.env.upgrade().ok()?;
        let value = env.event_value(self.id)?;
        extract(&value)
    }

    /// Typed handle to the same event.
    ///
    /// The type is not checked here; awaiting or reading a value of another
    /// type yields a type mismatch.
    pub fn downcast<T>(&self) -> Event<T> {
        Event::new(self.id, self.env.clone())
    }

    /// Condition satisfied once both events have succeeded.
    pub fn and(&self, other: impl Into<AnyEvent>) -> SimulationResult<Condition> {
        self.env
            .upgrade()?
            .build_condition(vec![self.clone(), other.into()], Evaluator::All)
    }

    /// Condition satisfied once either event has succeeded.
    pub fn or(&self, other: impl Into<AnyEvent>) -> SimulationResult<Condition> {
        self.env
            .upgrade()?
            .build_condition(vec![self.clone(), other.into()], Evaluator::Any)
    }

    /// Future resolving when the event is done, without its value.
    pub fn wait(&self) -> EventFuture<()> {
        EventFuture::new(self.env.clone(), self.id, extract_unit)
    }

    pub(crate) fn belongs_to(&self, env: &Environment) -> bool {
        env.owns(&self.env)
    }
}

impl IntoFuture for AnyEvent {
    type Output = Result<(), crate::error::WaitError<()>>;
    type IntoFuture = EventFuture<()>;

    fn into_future(self) -> Self::IntoFuture {
        self.wait()
    }
}

impl fmt::Debug for AnyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AnyEvent").field(&self.id).finish()
    }
}

impl PartialEq for AnyEvent {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.env.same_environment(&other.env)
    }
}

impl Eq for AnyEvent {}

impl Hash for AnyEvent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> From<Event<T>> for AnyEvent {
    fn from(event: Event<T>) -> Self {
        AnyEvent {
            id: event.id,
            env: event.env,
        }
    }
}

impl<T> From<&Event<T>> for AnyEvent {
    fn from(event: &Event<T>) -> Self {
        event.erase()
    }
}

impl From<&AnyEvent> for AnyEvent {
    fn from(event: &AnyEvent) -> Self {
        event.clone()
    }
}

impl<T> PartialEq<Event<T>> for AnyEvent {
    fn eq(&self, other: &Event<T>) -> bool {
        self.id == other.id && self.env.same_environment(&other.env)
    }
}

