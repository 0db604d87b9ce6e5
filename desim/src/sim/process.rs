//! Processes: simulated actors whose bodies are `async` blocks.
//!
//! A process body is an ordinary future, but it is never handed to an async
//! runtime. The environment polls it with a no-op waker, only when the
//! process reaches the head of the ready agenda. Awaiting an [`Event`]
//! subscribes the process and returns `Pending`; completing that event puts
//! the process back on the agenda. Scheduling order is therefore decided by
//! the environment alone.
//!
//! Each process keeps a stack of frames. The root frame is the body; a
//! [`ProcessContext::call`] pushes the callee on top once the call event is
//! reached, and the caller resumes in the same step when the callee returns.

use std::{
    collections::VecDeque,
    fmt,
    future::{Future, IntoFuture},
    pin::Pin,
    rc::Rc,
    task::{Context, Poll, Waker},
};
use tracing::{debug, trace, warn};

use crate::{
    error::{SimulationError, SimulationResult, WaitError},
    sim::{
        agenda::Tier,
        event::{extract, AnyEvent, Event, EventId, EventKind, EventState, Outcome, Value},
        future::EventFuture,
        world::{validate_delay, Environment, WeakEnvironment},
    },
};

/// Stable handle of a process inside its environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(pub(crate) usize);

impl ProcessId {
    /// Position of the process in the arena.
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "process#{}", self.0)
    }
}

pub(crate) type BoxedBody = Pin<Box<dyn Future<Output = Value>>>;

/// One level of a process's call stack.
pub(crate) struct Frame {
    // Taken out while the frame is being polled.
    pub(crate) future: Option<BoxedBody>,
    pub(crate) call: Option<EventId>,
}

impl Frame {
    fn root(future: BoxedBody) -> Self {
        Self {
            future: Some(future),
            call: None,
        }
    }

    fn call(future: BoxedBody, call: EventId) -> Self {
        Self {
            future: Some(future),
            call: Some(call),
        }
    }
}

pub(crate) struct ProcessSlot {
    pub(crate) event: EventId,
    pub(crate) frames: Vec<Frame>,
    pub(crate) target: Option<EventId>,
    pub(crate) interrupts: VecDeque<Interrupt>,
    pub(crate) woken_by_interrupt: bool,
    pub(crate) scheduled: bool,
    pub(crate) finished: bool,
    pub(crate) suspended: Option<EventId>,
}

impl ProcessSlot {
    fn new(event: EventId) -> Self {
        Self {
            event,
            frames: Vec::new(),
            target: None,
            interrupts: VecDeque::new(),
            woken_by_interrupt: false,
            scheduled: false,
            finished: false,
            suspended: None,
        }
    }
}

/// Notice delivered to a resource holder that was evicted by a higher-priority request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preempted {
    /// Process that issued the evicting request, if it came from a process.
    pub by: Option<ProcessId>,
    /// Time at which the evicted request had been granted.
    pub usage_since: f64,
}

/// An interrupt taken from a process's pending queue.
#[derive(Clone)]
pub struct Interrupt {
    cause: Option<Value>,
}

impl Interrupt {
    pub(crate) fn new(cause: Option<Value>) -> Self {
        Self { cause }
    }

    /// Returns `true` if the interrupt carries a payload.
    pub fn has_value(&self) -> bool {
        self.cause.is_some()
    }

    /// The payload, if it is a `T`.
    pub fn value<T: Clone + 'static>(&self) -> Option<T> {
        self.cause.as_ref().and_then(extract::<T>)
    }

    /// The preemption notice, if this interrupt is one.
    pub fn preemption(&self) -> Option<Preempted> {
        self.value::<Preempted>()
    }
}

impl fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interrupt")
            .field("has_value", &self.has_value())
            .field("preemption", &self.preemption())
            .finish()
    }
}

/// Handle to a process; also the event of its completion.
///
/// Awaiting a process yields its body's output.
pub struct Process<T> {
    pid: ProcessId,
    event: Event<T>,
}

impl<T> Process<T> {
    /// Identifier of the process.
    pub fn id(&self) -> ProcessId {
        self.pid
    }

    /// The completion event of the process.
    pub fn event(&self) -> Event<T> {
        self.event.clone()
    }

    /// Type-erased handle to the completion event.
    pub fn erase(&self) -> AnyEvent {
        self.event.erase()
    }

    /// Returns `true` until the body has returned.
    pub fn is_alive(&self) -> bool {
        self.event
            .env
            .upgrade()
            .map(|env| env.is_alive(self.pid))
            .unwrap_or(false)
    }

    /// Returns `true` once the body has returned.
    pub fn is_finished(&self) -> bool {
        self.event.is_succeeded()
    }

    /// Interrupts the process without a payload.
    ///
    /// Fails with [`SimulationError::InterruptSelf`] when called from the
    /// process itself and with [`SimulationError::ProcessFinished`] when the
    /// process has already returned.
    pub fn interrupt(&self) -> SimulationResult<()> {
        self.event
            .env
            .upgrade()?
            .interrupt(self.pid, Interrupt::new(None))
    }

    /// Interrupts the process with a payload it can read from [`Interrupt::value`].
    pub fn interrupt_with<V: 'static>(&self, value: V) -> SimulationResult<()> {
        self.event
            .env
            .upgrade()?
            .interrupt(self.pid, Interrupt::new(Some(Rc::new(value))))
    }

    /// Resumes the process from [`ProcessContext::suspend`] at the current time.
    ///
    /// Returns `false` if the process is not suspended.
    pub fn resume(&self) -> SimulationResult<bool> {
        self.event.env.upgrade()?.resume(self.pid, 0.0)
    }

    /// Resumes the process from [`ProcessContext::suspend`] after `delay`.
    pub fn resume_after(&self, delay: f64) -> SimulationResult<bool> {
        self.event.env.upgrade()?.resume(self.pid, delay)
    }
}

impl<T: Clone + 'static> Process<T> {
    /// The body's output, once the process has finished.
    pub fn value(&self) -> Option<T> {
        self.event.value()
    }

    /// Future resolving to the body's output.
    pub fn wait(&self) -> EventFuture<T> {
        self.event.wait()
    }
}

impl<T: Clone + 'static> IntoFuture for Process<T> {
    type Output = Result<T, WaitError<T>>;
    type IntoFuture = EventFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        self.event.wait()
    }
}

impl<T: Clone + 'static> IntoFuture for &Process<T> {
    type Output = Result<T, WaitError<T>>;
    type IntoFuture = EventFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        self.event.wait()
    }
}

impl<T> Clone for Process<T> {
    fn clone(&self) -> Self {
        Self {
            pid: self.pid,
            event: self.event.clone(),
        }
    }
}

impl<T> fmt::Debug for Process<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("event", &self.event.id())
            .finish()
    }
}

impl<T> From<&Process<T>> for AnyEvent {
    fn from(process: &Process<T>) -> Self {
        process.erase()
    }
}

impl<T> From<Process<T>> for AnyEvent {
    fn from(process: Process<T>) -> Self {
        process.event.into()
    }
}

/// What a process body sees of the environment.
///
/// Passed by value to every process body and callee.
#[derive(Debug, Clone)]
pub struct ProcessContext {
    env: WeakEnvironment,
    pid: ProcessId,
}

impl ProcessContext {
    /// The environment running this process.
    pub fn env(&self) -> &WeakEnvironment {
        &self.env
    }

    /// Identifier of this process.
    pub fn id(&self) -> ProcessId {
        self.pid
    }

    /// Returns the current simulation time.
    pub fn now(&self) -> SimulationResult<f64> {
        self.env.now()
    }

    /// Creates an event that succeeds after `delay`, carrying the delay.
    pub fn timeout(&self, delay: f64) -> SimulationResult<Event<f64>> {
        self.env.timeout(delay)
    }

    /// Creates an event that succeeds after `delay`, carrying `value`.
    pub fn timeout_with<T: 'static>(&self, delay: f64, value: T) -> SimulationResult<Event<T>> {
        self.env.timeout_with(delay, value)
    }

    /// Creates a pending event for user code to trigger.
    pub fn event<T: 'static>(&self) -> SimulationResult<Event<T>> {
        self.env.event()
    }

    /// Starts another process.
    pub fn process<F, Fut, R>(&self, body: F) -> SimulationResult<Process<R>>
    where
        F: FnOnce(ProcessContext) -> Fut,
        Fut: Future<Output = R> + 'static,
        R: 'static,
    {
        Ok(self.env.upgrade()?.process(body))
    }

    /// Invokes `body` as a sub-routine of this process.
    ///
    /// The returned event is scheduled now; when the environment reaches it
    /// the callee runs on this process, and the event succeeds with the
    /// callee's output when it returns.
    pub fn call<F, Fut, R>(&self, body: F) -> SimulationResult<Event<R>>
    where
        F: FnOnce(ProcessContext) -> Fut,
        Fut: Future<Output = R> + 'static,
        R: 'static,
    {
        let env = self.env.upgrade()?;
        let future = body(self.clone());
        let boxed: BoxedBody = Box::pin(async move { Rc::new(future.await) as Value });
        let id = env.call(self.pid, boxed)?;
        Ok(Event::new(id, self.env.clone()))
    }

    /// Takes the oldest pending interrupt, acknowledging it.
    pub fn interrupted(&self) -> Option<Interrupt> {
        self.env.upgrade().ok()?.take_interrupt(self.pid)
    }

    /// Takes the oldest pending interrupt only if it is a preemption notice.
    pub fn preempted(&self) -> Option<Preempted> {
        self.env.upgrade().ok()?.take_preemption(self.pid)
    }

    /// Returns `true` if an interrupt is waiting to be acknowledged.
    pub fn has_pending_interrupt(&self) -> bool {
        self.env
            .upgrade()
            .map(|env| env.pending_interrupts(self.pid) > 0)
            .unwrap_or(false)
    }

    /// Creates an event that completes when another party resumes this process.
    ///
    /// See [`Process::resume`] and [`Process::resume_after`].
    pub fn suspend(&self) -> SimulationResult<Event<()>> {
        let id = self.env.upgrade()?.suspend(self.pid)?;
        Ok(Event::new(id, self.env.clone()))
    }
}

impl Environment {
    /// Creates a process running `body`, ready at the current time.
    ///
    /// The body receives a [`ProcessContext`] and its output becomes the
    /// value of the process's completion event.
    ///
    /// # Example
    ///
    /// ```rust
    /// use desim::Environment;
    ///
    /// let env = Environment::new();
    /// let worker = env.process(|ctx| async move {
    ///     ctx.timeout(3.0)?.await?;
    ///     ctx.now()
    /// });
    ///
    /// env.run().unwrap();
    /// assert_eq!(worker.value(), Some(Ok(3.0)));
    /// ```
    pub fn process<F, Fut, R>(&self, body: F) -> Process<R>
    where
        F: FnOnce(ProcessContext) -> Fut,
        Fut: Future<Output = R> + 'static,
        R: 'static,
    {
        let (pid, event) = {
            let mut inner = self.inner.borrow_mut();
            let pid = ProcessId(inner.processes.len());
            let event = inner.alloc_event(EventKind::Process(pid));
            inner.processes.push(ProcessSlot::new(event));
            (pid, event)
        };

        let future = body(ProcessContext {
            env: self.downgrade(),
            pid,
        });
        let boxed: BoxedBody = Box::pin(async move { Rc::new(future.await) as Value });

        let mut inner = self.inner.borrow_mut();
        inner.process_mut(pid).frames.push(Frame::root(boxed));
        inner.schedule_process(pid);
        debug!(process = %pid, now = inner.now, "process created");

        Process {
            pid,
            event: Event::new(event, self.downgrade()),
        }
    }

    /// Creates a process that starts running `body` after `delay`.
    ///
    /// An interrupt arriving during the delay starts the body early, with the
    /// interrupt still pending for it to acknowledge.
    pub fn delayed_process<F, Fut, R>(&self, delay: f64, body: F) -> SimulationResult<Process<R>>
    where
        F: FnOnce(ProcessContext) -> Fut + 'static,
        Fut: Future<Output = R> + 'static,
        R: 'static,
    {
        validate_delay(self.now(), delay)?;
        Ok(self.process(move |ctx| async move {
            if let Ok(timeout) = ctx.timeout(delay) {
                let _ = timeout.await;
            }
            body(ctx).await
        }))
    }

    pub(crate) fn is_alive(&self, pid: ProcessId) -> bool {
        !self.inner.borrow().process(pid).finished
    }

    /// Resumes a process until it waits on an event or returns.
    pub(crate) fn step_process(&self, pid: ProcessId) -> SimulationResult<()> {
        let mut cx = Context::from_waker(Waker::noop());
        let pending_before = self.inner.borrow().process(pid).interrupts.len();

        loop {
            let taken = {
                let mut inner = self.inner.borrow_mut();
                if inner.process(pid).finished {
                    return Ok(());
                }
                let future = inner
                    .process_mut(pid)
                    .frames
                    .last_mut()
                    .and_then(|frame| frame.future.take());
                if future.is_some() {
                    inner.active = Some(pid);
                }
                future
            };
            let Some(mut future) = taken else {
                warn!(process = %pid, "process scheduled without a body to resume");
                return Ok(());
            };

            trace!(process = %pid, "resuming process");
            match future.as_mut().poll(&mut cx) {
                Poll::Pending => {
                    let mut inner = self.inner.borrow_mut();
                    inner.active = None;
                    let process = inner.process_mut(pid);
                    if let Some(frame) = process.frames.last_mut() {
                        frame.future = Some(future);
                    }
                    if process.target.is_none() && !process.scheduled {
                        return Err(SimulationError::ForeignAwait {
                            process: pid.index() as u64,
                        });
                    }
                    let pending_now = process.interrupts.len();
                    if pending_before > 0 && pending_now == pending_before {
                        process.interrupts.clear();
                        warn!(process = %pid, pending = pending_now, "interrupt left unchecked");
                        return Err(SimulationError::UncheckedInterrupt {
                            process: pid.index() as u64,
                        });
                    }
                    return Ok(());
                }
                Poll::Ready(value) => {
                    let (frame, process_event) = {
                        let mut inner = self.inner.borrow_mut();
                        inner.active = None;
                        let process = inner.process_mut(pid);
                        (process.frames.pop(), process.event)
                    };
                    drop(future);

                    match frame.and_then(|frame| frame.call) {
                        Some(call) => {
                            {
                                let mut inner = self.inner.borrow_mut();
                                let slot = inner.slot_mut(call);
                                slot.outcome = Outcome::Success;
                                slot.value = Some(value);
                            }
                            trace!(process = %pid, call = %call, "call returned");
                            self.complete(call, Some(pid));
                        }
                        None => {
                            {
                                let mut inner = self.inner.borrow_mut();
                                let process = inner.process_mut(pid);
                                process.finished = true;
                                process.target = None;
                                let slot = inner.slot_mut(process_event);
                                slot.outcome = Outcome::Success;
                                slot.value = Some(value);
                            }
                            debug!(process = %pid, "process finished");
                            self.complete(process_event, None);
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    pub(crate) fn interrupt(&self, victim: ProcessId, interrupt: Interrupt) -> SimulationResult<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.active == Some(victim) {
            return Err(SimulationError::InterruptSelf);
        }
        if inner.process(victim).finished {
            return Err(SimulationError::ProcessFinished(victim.index() as u64));
        }
        inner.process_mut(victim).interrupts.push_back(interrupt);
        let id = inner.alloc_event(EventKind::Interrupt(victim));
        inner.slot_mut(id).state = EventState::Triggered;
        inner.schedule_event(id, 0.0, Tier::Urgent);
        debug!(process = %victim, by = ?inner.active, "interrupt scheduled");
        Ok(())
    }

    /// Pulls an interrupted process off whatever it waits on and readies it.
    pub(crate) fn deliver_interrupt(&self, victim: ProcessId) {
        let mut inner = self.inner.borrow_mut();
        let process = inner.process(victim);
        if process.finished || process.interrupts.is_empty() {
            trace!(process = %victim, "interrupt no longer deliverable");
            return;
        }
        inner.unsubscribe(victim);
        inner.process_mut(victim).woken_by_interrupt = true;
        inner.schedule_process(victim);
    }

    pub(crate) fn call(&self, owner: ProcessId, body: BoxedBody) -> SimulationResult<EventId> {
        let mut inner = self.inner.borrow_mut();
        if inner.process(owner).finished {
            return Err(SimulationError::ProcessFinished(owner.index() as u64));
        }
        let id = inner.alloc_event(EventKind::Call(owner));
        inner.calls.insert(id, Frame::call(body, id));
        inner.schedule_event(id, 0.0, Tier::Normal);
        Ok(id)
    }

    /// Pushes the callee of `id` onto its owner's stack.
    pub(crate) fn start_call(&self, id: EventId, owner: ProcessId) {
        let orphan = {
            let mut inner = self.inner.borrow_mut();
            let Some(frame) = inner.calls.remove(&id) else {
                return;
            };
            if inner.process(owner).finished {
                Some(frame)
            } else {
                inner.unsubscribe(owner);
                inner.process_mut(owner).frames.push(frame);
                inner.schedule_process(owner);
                None
            }
        };
        if orphan.is_some() {
            debug!(call = %id, process = %owner, "dropping call of a finished process");
        }
    }

    pub(crate) fn take_interrupt(&self, pid: ProcessId) -> Option<Interrupt> {
        self.inner.borrow_mut().process_mut(pid).interrupts.pop_front()
    }

    pub(crate) fn take_preemption(&self, pid: ProcessId) -> Option<Preempted> {
        let mut inner = self.inner.borrow_mut();
        let interrupts = &mut inner.process_mut(pid).interrupts;
        let preempted = interrupts.front().and_then(Interrupt::preemption)?;
        interrupts.pop_front();
        Some(preempted)
    }

    pub(crate) fn pending_interrupts(&self, pid: ProcessId) -> usize {
        self.inner.borrow().process(pid).interrupts.len()
    }

    pub(crate) fn suspend(&self, pid: ProcessId) -> SimulationResult<EventId> {
        let mut inner = self.inner.borrow_mut();
        if inner.process(pid).finished {
            return Err(SimulationError::ProcessFinished(pid.index() as u64));
        }
        let id = inner.alloc_event(EventKind::Suspend(pid));
        inner.process_mut(pid).suspended = Some(id);
        Ok(id)
    }

    pub(crate) fn resume(&self, pid: ProcessId, delay: f64) -> SimulationResult<bool> {
        let mut inner = self.inner.borrow_mut();
        validate_delay(inner.now, delay)?;
        let Some(id) = inner.process_mut(pid).suspended.take() else {
            return Ok(false);
        };
        if inner.slot(id).state != EventState::Pending {
            return Ok(false);
        }
        inner.trigger(id, Outcome::Success, Rc::new(()), delay, Tier::Normal);
        Ok(true)
    }
}
