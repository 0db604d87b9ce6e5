//! The future a process awaits to wait on an event.
//!
//! Polling parks the running process on the event by subscribing it. The
//! environment, not a waker, resumes the process: when the event completes the
//! process is put back on the ready agenda and its body is polled again.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::{
    error::WaitError,
    sim::{
        event::{EventId, Outcome, Value},
        world::WeakEnvironment,
    },
};

/// Result of asking the environment about an awaited event.
pub(crate) enum WaitPoll {
    /// The event is done.
    Done(Outcome, Value),
    /// The running process was woken by an interrupt.
    Interrupted,
    /// No process of this environment is running.
    Detached,
    /// The running process is now subscribed to the event.
    Parked,
}

/// Future that completes when an event is done.
///
/// Resolves to the event value on success, [`WaitError::Failed`] on failure,
/// and [`WaitError::Interrupted`] when the waiting process is interrupted
/// first; the event itself is unaffected and may be awaited again.
pub struct EventFuture<T> {
    /// Weak reference to the environment
    env: WeakEnvironment,
    /// Event being awaited
    id: EventId,
    extract: fn(&Value) -> Option<T>,
}

impl<T> EventFuture<T> {
    pub(crate) fn new(env: WeakEnvironment, id: EventId, extract: fn(&Value) -> Option<T>) -> Self {
        Self { env, id, extract }
    }

    /// The awaited event.
    pub fn event_id(&self) -> EventId {
        self.id
    }
}

impl<T> Future for EventFuture<T> {
    type Output = Result<T, WaitError<T>>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let env = match self.env.upgrade() {
            Ok(env) => env,
            Err(_) => return Poll::Ready(Err(WaitError::Detached)),
        };

        match env.poll_event(self.id) {
            WaitPoll::Done(outcome, value) => {
                let value = match (self.extract)(&value) {
                    Some(value) => value,
                    None => return Poll::Ready(Err(WaitError::TypeMismatch)),
                };
                match outcome {
                    Outcome::Success => Poll::Ready(Ok(value)),
                    Outcome::Failure => Poll::Ready(Err(WaitError::Failed(value))),
                }
            }
            WaitPoll::Interrupted => Poll::Ready(Err(WaitError::Interrupted)),
            WaitPoll::Detached => Poll::Ready(Err(WaitError::Detached)),
            WaitPoll::Parked => Poll::Pending,
        }
    }
}
