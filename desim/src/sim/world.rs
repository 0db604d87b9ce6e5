//! The simulation environment and its run loop.
//!
//! [`Environment`] owns the clock, both agendas and the event and process
//! arenas behind a single `Rc<RefCell<_>>`. Handles held by events, processes
//! and resources keep a [`WeakEnvironment`] so they never keep a finished
//! simulation alive.

use std::{
    cell::RefCell,
    collections::HashMap,
    fmt,
    rc::{Rc, Weak},
};
use tracing::{debug, instrument, trace};

use crate::{
    config::EnvironmentConfig,
    error::{SimulationError, SimulationResult},
    realtime::Pacer,
    sim::{
        agenda::{Agenda, Key, Tier},
        condition::ConditionState,
        event::{AnyEvent, EndHook, Event, EventId, EventKind, EventSlot, EventState, Outcome, Value},
        future::WaitPoll,
        process::{Frame, ProcessId, ProcessSlot},
        rng::SimRng,
    },
};

/// Why a run returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing was left to do.
    Exhausted,
    /// The next item lies beyond the requested horizon.
    HorizonReached,
    /// The event the run was waiting for completed.
    TargetCompleted,
}

/// Item popped from one of the two agendas.
#[derive(Debug, Clone, Copy)]
enum Due {
    Process(ProcessId),
    Event(EventId),
}

pub(crate) struct EnvInner {
    pub(crate) now: f64,
    pub(crate) ready: Agenda<ProcessId>,
    pub(crate) pending: Agenda<EventId>,
    pub(crate) next_sequence: u64,

    // Arenas addressed by handle
    pub(crate) slots: Vec<EventSlot>,
    pub(crate) processes: Vec<ProcessSlot>,
    pub(crate) conditions: HashMap<EventId, ConditionState>,
    pub(crate) calls: HashMap<EventId, Frame>,

    pub(crate) active: Option<ProcessId>,
    pub(crate) ended: bool,

    pub(crate) rng: SimRng,
    pub(crate) pacer: Option<Pacer>,
    pub(crate) next_resource_id: u64,

    // Event processing metrics
    pub(crate) events_processed: u64,
}

impl EnvInner {
    fn new(config: EnvironmentConfig) -> Self {
        Self {
            now: 0.0,
            ready: Agenda::new(),
            pending: Agenda::new(),
            next_sequence: 0,
            slots: Vec::new(),
            processes: Vec::new(),
            conditions: HashMap::new(),
            calls: HashMap::new(),
            active: None,
            ended: false,
            rng: SimRng::new(config.seed),
            pacer: config.realtime.map(Pacer::new),
            next_resource_id: 0,
            events_processed: 0,
        }
    }

    pub(crate) fn alloc_event(&mut self, kind: EventKind) -> EventId {
        let id = EventId(self.slots.len());
        self.slots.push(EventSlot::new(kind));
        id
    }

    pub(crate) fn slot(&self, id: EventId) -> &EventSlot {
        &self.slots[id.0]
    }

    pub(crate) fn slot_mut(&mut self, id: EventId) -> &mut EventSlot {
        &mut self.slots[id.0]
    }

    pub(crate) fn process(&self, pid: ProcessId) -> &ProcessSlot {
        &self.processes[pid.index()]
    }

    pub(crate) fn process_mut(&mut self, pid: ProcessId) -> &mut ProcessSlot {
        &mut self.processes[pid.index()]
    }

    fn next_key(&mut self, delay: f64, tier: Tier) -> Key {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        Key::new(self.now + delay, tier, sequence)
    }

    /// Decides the outcome of an event and schedules its completion.
    pub(crate) fn trigger(
        &mut self,
        id: EventId,
        outcome: Outcome,
        value: Value,
        delay: f64,
        tier: Tier,
    ) {
        let key = self.next_key(delay, tier);
        let slot = self.slot_mut(id);
        slot.state = EventState::Triggered;
        slot.outcome = outcome;
        slot.value = Some(value);
        self.pending.schedule(key, id);
    }

    /// Schedules an event whose completion does more than flip its state.
    pub(crate) fn schedule_event(&mut self, id: EventId, delay: f64, tier: Tier) {
        let key = self.next_key(delay, tier);
        self.pending.schedule(key, id);
    }

    /// Puts a process on the ready agenda unless it is already there or done.
    pub(crate) fn schedule_process(&mut self, pid: ProcessId) {
        let process = self.process(pid);
        if process.scheduled || process.finished {
            return;
        }
        let key = self.next_key(0.0, Tier::Normal);
        self.process_mut(pid).scheduled = true;
        self.ready.schedule(key, pid);
    }

    pub(crate) fn subscribe(&mut self, pid: ProcessId, id: EventId) {
        self.unsubscribe(pid);
        let slot = self.slot_mut(id);
        if !slot.subscribers.contains(&pid) {
            slot.subscribers.push(pid);
        }
        self.process_mut(pid).target = Some(id);
    }

    pub(crate) fn unsubscribe(&mut self, pid: ProcessId) {
        if let Some(target) = self.process_mut(pid).target.take() {
            self.slot_mut(target).subscribers.retain(|p| *p != pid);
        }
    }

    fn pop_due(&mut self, limit: Option<Key>) -> Option<(Key, Due)> {
        let process_key = self.ready.peek_key();
        let event_key = self.pending.peek_key();
        let key = process_key.min(event_key);
        if key.is_sentinel() || limit.is_some_and(|limit| key > limit) {
            return None;
        }
        if process_key < event_key {
            let (key, pid) = self.ready.pop_earliest()?;
            self.process_mut(pid).scheduled = false;
            Some((key, Due::Process(pid)))
        } else {
            let (key, id) = self.pending.pop_earliest()?;
            Some((key, Due::Event(id)))
        }
    }

    fn has_work(&self) -> bool {
        !(self.ready.is_empty() && self.pending.is_empty())
    }
}

impl fmt::Debug for EnvInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvInner")
            .field("now", &self.now)
            .field("ready", &self.ready.len())
            .field("pending", &self.pending.len())
            .field("events", &self.slots.len())
            .field("processes", &self.processes.len())
            .field("ended", &self.ended)
            .field("events_processed", &self.events_processed)
            .finish_non_exhaustive()
    }
}

/// The simulation environment: a logical clock and the agendas that drive it.
///
/// `Environment` owns every event, process and condition of a simulation. It
/// keeps two agendas, one for processes ready to resume and one for event
/// completions, both ordered by `(time, tier, sequence)`. The main loop
/// repeatedly takes the smaller head of the two, so items due at the same
/// time always run in the order they were scheduled.
///
/// Handles given to user code ([`Event`], [`Process`](crate::Process),
/// resources) only hold a [`WeakEnvironment`]; dropping the environment tears
/// the whole simulation down.
#[derive(Debug)]
pub struct Environment {
    pub(crate) inner: Rc<RefCell<EnvInner>>,
}

impl Environment {
    fn create(config: EnvironmentConfig) -> Self {
        Self {
            inner: Rc::new(RefCell::new(EnvInner::new(config))),
        }
    }

    /// Creates an environment with the default configuration (seed `0`, no pacing).
    pub fn new() -> Self {
        Self::create(EnvironmentConfig::default())
    }

    /// Creates an environment whose random number generator is seeded with `seed`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use desim::Environment;
    ///
    /// let a = Environment::new_with_seed(42);
    /// let b = Environment::new_with_seed(42);
    /// assert_eq!(a.random::<u64>(), b.random::<u64>());
    /// ```
    pub fn new_with_seed(seed: u64) -> Self {
        Self::create(EnvironmentConfig::seeded(seed))
    }

    /// Creates an environment from a full configuration.
    ///
    /// Fails with [`SimulationError::InvalidScalingFactor`] when real-time
    /// pacing is requested with a scaling factor that is too small.
    pub fn with_config(config: EnvironmentConfig) -> SimulationResult<Self> {
        config.validate()?;
        Ok(Self::create(config))
    }

    /// Creates a weak reference to this environment.
    pub fn downgrade(&self) -> WeakEnvironment {
        WeakEnvironment {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub(crate) fn owns(&self, weak: &WeakEnvironment) -> bool {
        std::ptr::eq(Rc::as_ptr(&self.inner), weak.inner.as_ptr())
    }

    /// Returns the current simulation time.
    pub fn now(&self) -> f64 {
        self.inner.borrow().now
    }

    /// Returns the seed of the random number generator.
    pub fn seed(&self) -> u64 {
        self.inner.borrow().rng.seed()
    }

    /// Returns `true` once a run has exhausted the agenda.
    pub fn is_ended(&self) -> bool {
        self.inner.borrow().ended
    }

    /// Returns `true` when runs are paced against a wall clock.
    pub fn is_realtime(&self) -> bool {
        self.inner.borrow().pacer.is_some()
    }

    /// The process whose body is executing, if any.
    pub fn active_process(&self) -> Option<ProcessId> {
        self.inner.borrow().active
    }

    /// Generates a random value from the environment's generator.
    pub fn random<T>(&self) -> T
    where
        rand::distr::StandardUniform: rand::distr::Distribution<T>,
    {
        self.inner.borrow_mut().rng.random()
    }

    /// Generates a random value within `range` from the environment's generator.
    pub fn random_range<T, R>(&self, range: R) -> T
    where
        T: rand::distr::uniform::SampleUniform,
        R: rand::distr::uniform::SampleRange<T>,
    {
        self.inner.borrow_mut().rng.random_range(range)
    }

    /// Returns `true` with probability `p`.
    pub fn random_bool(&self, p: f64) -> bool {
        self.inner.borrow_mut().rng.random_bool(p)
    }

    pub(crate) fn fork_rng(&self) -> SimRng {
        self.inner.borrow_mut().rng.fork()
    }

    pub(crate) fn next_resource_id(&self) -> u64 {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_resource_id;
        inner.next_resource_id += 1;
        id
    }

    /// Number of agenda items processed so far.
    pub fn events_processed(&self) -> u64 {
        self.inner.borrow().events_processed
    }

    /// Number of scheduled process resumptions and event completions.
    pub fn pending_count(&self) -> usize {
        let inner = self.inner.borrow();
        inner.ready.len() + inner.pending.len()
    }

    /// Returns `true` if anything is scheduled.
    pub fn has_pending_work(&self) -> bool {
        self.inner.borrow().has_work()
    }

    /// Creates a pending event that user code triggers with
    /// [`Event::succeed`] or [`Event::fail`].
    pub fn event<T: 'static>(&self) -> Event<T> {
        let id = self.inner.borrow_mut().alloc_event(EventKind::Generic);
        Event::new(id, self.downgrade())
    }

    /// Creates an event that succeeds after `delay`, carrying the delay as its value.
    pub fn timeout(&self, delay: f64) -> SimulationResult<Event<f64>> {
        self.timeout_with(delay, delay)
    }

    /// Creates an event that succeeds after `delay`, carrying `value`.
    #[instrument(skip(self, value))]
    pub fn timeout_with<T: 'static>(&self, delay: f64, value: T) -> SimulationResult<Event<T>> {
        let mut inner = self.inner.borrow_mut();
        validate_delay(inner.now, delay)?;
        let id = inner.alloc_event(EventKind::Timeout);
        inner.trigger(id, Outcome::Success, Rc::new(value), delay, Tier::Normal);
        drop(inner);
        Ok(Event::new(id, self.downgrade()))
    }

    pub(crate) fn alloc_event(&self, kind: EventKind) -> EventId {
        self.inner.borrow_mut().alloc_event(kind)
    }

    pub(crate) fn set_end_hook(&self, id: EventId, hook: EndHook) {
        self.inner.borrow_mut().slot_mut(id).on_end = Some(hook);
    }

    pub(crate) fn trigger(&self, id: EventId, outcome: Outcome, value: Value, delay: f64) {
        self.inner
            .borrow_mut()
            .trigger(id, outcome, value, delay, Tier::Normal);
    }

    pub(crate) fn trigger_user(
        &self,
        id: EventId,
        outcome: Outcome,
        value: Value,
    ) -> SimulationResult<()> {
        let mut inner = self.inner.borrow_mut();
        let slot = inner.slot(id);
        if slot.kind != EventKind::Generic {
            return Err(SimulationError::NotTriggerable);
        }
        if slot.state != EventState::Pending {
            return Err(SimulationError::EventAlreadyTriggered);
        }
        inner.trigger(id, outcome, value, 0.0, Tier::Normal);
        Ok(())
    }

    pub(crate) fn event_state(&self, id: EventId) -> EventState {
        self.inner.borrow().slot(id).state
    }

    pub(crate) fn event_value(&self, id: EventId) -> Option<Value> {
        self.inner.borrow().slot(id).settled_value()
    }

    /// Answers a process awaiting `id`, parking it on the event when not done.
    pub(crate) fn poll_event(&self, id: EventId) -> WaitPoll {
        let mut inner = self.inner.borrow_mut();
        let Some(pid) = inner.active else {
            return WaitPoll::Detached;
        };
        let process = inner.process_mut(pid);
        if process.woken_by_interrupt {
            process.woken_by_interrupt = false;
            return WaitPoll::Interrupted;
        }
        let slot = inner.slot(id);
        if slot.is_done() {
            if let Some(value) = slot.value.clone() {
                return WaitPoll::Done(slot.outcome, value);
            }
        }
        inner.subscribe(pid, id);
        WaitPoll::Parked
    }

    /// Finalizes an event: runs its hook, settles its state, then notifies
    /// parent conditions and reschedules subscribers other than `skip`.
    pub(crate) fn complete(&self, id: EventId, skip: Option<ProcessId>) {
        let hook = self.inner.borrow_mut().slot_mut(id).on_end.take();
        if let Some(hook) = hook {
            hook(self);
        }

        let (parents, subscribers) = {
            let mut inner = self.inner.borrow_mut();
            let slot = inner.slot_mut(id);
            slot.state = match slot.outcome {
                Outcome::Success => EventState::Succeeded,
                Outcome::Failure => EventState::Failed,
            };
            trace!(event = %id, state = ?slot.state, "event completed");
            (
                std::mem::take(&mut slot.parents),
                std::mem::take(&mut slot.subscribers),
            )
        };

        for parent in parents {
            self.notify_condition(parent, id);
        }

        let mut inner = self.inner.borrow_mut();
        for pid in subscribers {
            if Some(pid) == skip {
                continue;
            }
            let process = inner.process_mut(pid);
            if process.target == Some(id) {
                process.target = None;
            }
            inner.schedule_process(pid);
        }
    }

    fn end_event(&self, id: EventId) {
        let kind = self.inner.borrow().slot(id).kind;
        match kind {
            EventKind::Interrupt(victim) => {
                self.inner.borrow_mut().slot_mut(id).state = EventState::Succeeded;
                self.deliver_interrupt(victim);
            }
            EventKind::Call(owner) => self.start_call(id, owner),
            _ => self.complete(id, None),
        }
    }

    fn advance_clock(&self, time: f64) {
        let sleep = {
            let mut inner = self.inner.borrow_mut();
            if time <= inner.now {
                return;
            }
            let sleep = inner
                .pacer
                .as_mut()
                .and_then(|pacer| pacer.delay_for(time).map(|d| (pacer.clock(), d)));
            inner.now = time;
            sleep
        };
        if let Some((clock, duration)) = sleep {
            debug!(?duration, time, "pacing against wall clock");
            clock.sleep(duration);
        }
    }

    /// Runs the next due item if it is not beyond `limit`; `false` when nothing ran.
    fn advance(&self, limit: Option<Key>) -> SimulationResult<bool> {
        let due = {
            let mut inner = self.inner.borrow_mut();
            let due = inner.pop_due(limit);
            if due.is_some() {
                inner.events_processed += 1;
            }
            due
        };
        let Some((key, due)) = due else {
            return Ok(false);
        };

        self.advance_clock(key.time());
        match due {
            Due::Process(pid) => self.step_process(pid)?,
            Due::Event(id) => self.end_event(id),
        }
        Ok(true)
    }

    /// Processes the next scheduled item and advances time.
    ///
    /// Returns `true` if more items are available for processing,
    /// `false` if this was the last one or if nothing was scheduled.
    #[instrument(skip(self))]
    pub fn step(&self) -> SimulationResult<bool> {
        self.check_not_nested()?;
        self.advance(None)?;
        Ok(self.has_pending_work())
    }

    fn check_not_nested(&self) -> SimulationResult<()> {
        if self.inner.borrow().active.is_some() {
            return Err(SimulationError::ReentrantRun);
        }
        Ok(())
    }

    fn begin_run(&self) -> SimulationResult<()> {
        self.check_not_nested()?;
        let mut inner = self.inner.borrow_mut();
        if inner.ended {
            return Err(SimulationError::EnvironmentEnded);
        }
        let now = inner.now;
        if let Some(pacer) = inner.pacer.as_mut() {
            pacer.restart(now);
        }
        Ok(())
    }

    fn end_run(&self, outcome: SimulationResult<RunOutcome>) -> SimulationResult<RunOutcome> {
        let mut inner = self.inner.borrow_mut();
        if outcome == Ok(RunOutcome::Exhausted) {
            inner.ended = true;
        }
        debug!(?outcome, now = inner.now, "run finished");
        outcome
    }

    /// Runs until nothing is left to do.
    ///
    /// Fails with [`SimulationError::UnboundedRun`] when nothing is scheduled,
    /// and with [`SimulationError::EnvironmentEnded`] if a previous run already
    /// exhausted the agenda.
    #[instrument(skip(self))]
    pub fn run(&self) -> SimulationResult<RunOutcome> {
        self.check_not_nested()?;
        if self.is_ended() {
            return Err(SimulationError::EnvironmentEnded);
        }
        if !self.has_pending_work() {
            return Err(SimulationError::UnboundedRun);
        }
        self.begin_run()?;
        let result = self.drain();
        self.end_run(result)
    }

    fn drain(&self) -> SimulationResult<RunOutcome> {
        while self.advance(None)? {}
        Ok(RunOutcome::Exhausted)
    }

    /// Runs until the clock would pass `until`, then sets the clock to `until`.
    ///
    /// Items due exactly at `until` that were scheduled before this call are
    /// processed. Returns [`RunOutcome::Exhausted`] if the agenda ran dry first.
    #[instrument(skip(self))]
    pub fn run_until(&self, until: f64) -> SimulationResult<RunOutcome> {
        let now = self.now();
        if until.is_nan() || until < now {
            return Err(SimulationError::InvalidHorizon { until, now });
        }
        self.begin_run()?;
        let limit = {
            let mut inner = self.inner.borrow_mut();
            let sequence = inner.next_sequence;
            inner.next_sequence += 1;
            Key::new(until, Tier::Normal, sequence)
        };
        let result = self.drain_until(limit);
        self.end_run(result)
    }

    fn drain_until(&self, limit: Key) -> SimulationResult<RunOutcome> {
        while self.advance(Some(limit))? {}
        let mut inner = self.inner.borrow_mut();
        if !inner.has_work() {
            return Ok(RunOutcome::Exhausted);
        }
        if limit.time().is_finite() {
            inner.now = limit.time();
        }
        Ok(RunOutcome::HorizonReached)
    }

    /// Runs until `target` is done.
    ///
    /// Fails with [`SimulationError::TargetFailed`] if the target fails, and
    /// returns [`RunOutcome::Exhausted`] if the agenda runs dry first. A target
    /// that is still pending while nothing is scheduled can never complete, so
    /// that case fails with [`SimulationError::UnboundedRun`].
    #[instrument(skip(self, target))]
    pub fn run_until_event(&self, target: impl Into<AnyEvent>) -> SimulationResult<RunOutcome> {
        let target = target.into();
        if !target.belongs_to(self) {
            return Err(SimulationError::ForeignEnvironment);
        }
        self.check_not_nested()?;
        if self.is_ended() {
            return Err(SimulationError::EnvironmentEnded);
        }
        if !self.event_state(target.id).is_done() && !self.has_pending_work() {
            return Err(SimulationError::UnboundedRun);
        }
        self.begin_run()?;
        let result = self.drain_until_done(target.id);
        self.end_run(result)
    }

    fn drain_until_done(&self, target: EventId) -> SimulationResult<RunOutcome> {
        loop {
            match self.event_state(target) {
                EventState::Succeeded => return Ok(RunOutcome::TargetCompleted),
                EventState::Failed => return Err(SimulationError::TargetFailed),
                EventState::Pending | EventState::Triggered => {}
            }
            if !self.advance(None)? {
                return Ok(RunOutcome::Exhausted);
            }
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

/// Checks that `delay` is a valid, finite, non-negative offset from `now`.
pub(crate) fn validate_delay(now: f64, delay: f64) -> SimulationResult<()> {
    if delay.is_finite() && delay >= 0.0 && (now + delay).is_finite() {
        Ok(())
    } else {
        Err(SimulationError::InvalidDelay(delay))
    }
}

macro_rules! weak_forward {
    // For methods returning T that need Ok() wrapping
    (wrap $(#[$meta:meta])* $method:ident(&self $(, $arg:ident : $arg_ty:ty)*) -> $ret:ty) => {
        $(#[$meta])*
        pub fn $method(&self $(, $arg: $arg_ty)*) -> SimulationResult<$ret> {
            Ok(self.upgrade()?.$method($($arg),*))
        }
    };
    // For methods already returning SimulationResult
    (pass $(#[$meta:meta])* $method:ident(&self $(, $arg:ident : $arg_ty:ty)*) -> $ret:ty) => {
        $(#[$meta])*
        pub fn $method(&self $(, $arg: $arg_ty)*) -> SimulationResult<$ret> {
            self.upgrade()?.$method($($arg),*)
        }
    };
}

/// A weak reference to an environment.
///
/// This provides handle-based access to the environment without holding
/// a strong reference that would prevent cleanup. All operations
/// return `SimulationResult` and will fail if the environment has been dropped.
#[derive(Debug, Clone)]
pub struct WeakEnvironment {
    inner: Weak<RefCell<EnvInner>>,
}

impl WeakEnvironment {
    /// Attempts to upgrade this weak reference to a strong reference.
    ///
    /// Returns `Err(SimulationError::SimulationShutdown)` if the environment
    /// has been dropped.
    pub fn upgrade(&self) -> SimulationResult<Environment> {
        self.inner
            .upgrade()
            .map(|inner| Environment { inner })
            .ok_or(SimulationError::SimulationShutdown)
    }

    pub(crate) fn same_environment(&self, other: &WeakEnvironment) -> bool {
        self.inner.ptr_eq(&other.inner)
    }

    weak_forward!(wrap #[doc = "Returns the current simulation time."] now(&self) -> f64);
    weak_forward!(wrap #[doc = "The process whose body is executing, if any."] active_process(&self) -> Option<ProcessId>);
    weak_forward!(wrap #[doc = "Returns `true` with probability `p`."] random_bool(&self, p: f64) -> bool);
    weak_forward!(pass #[doc = "Creates an event that succeeds after `delay`, carrying the delay."] timeout(&self, delay: f64) -> Event<f64>);

    /// Creates an event that succeeds after `delay`, carrying `value`.
    pub fn timeout_with<T: 'static>(&self, delay: f64, value: T) -> SimulationResult<Event<T>> {
        self.upgrade()?.timeout_with(delay, value)
    }

    /// Creates a pending event for user code to trigger.
    pub fn event<T: 'static>(&self) -> SimulationResult<Event<T>> {
        Ok(self.upgrade()?.event())
    }

    /// Generates a random value from the environment's generator.
    pub fn random<T>(&self) -> SimulationResult<T>
    where
        rand::distr::StandardUniform: rand::distr::Distribution<T>,
    {
        Ok(self.upgrade()?.random())
    }

    /// Generates a random value within `range` from the environment's generator.
    pub fn random_range<T, R>(&self, range: R) -> SimulationResult<T>
    where
        T: rand::distr::uniform::SampleUniform,
        R: rand::distr::uniform::SampleRange<T>,
    {
        Ok(self.upgrade()?.random_range(range))
    }
}
