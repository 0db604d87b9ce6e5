use thiserror::Error;

/// Errors that can occur during simulation operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    /// The environment has been dropped and is no longer accessible.
    #[error("Simulation has been shut down")]
    SimulationShutdown,

    /// A delay was negative, not finite, or would push the clock past `f64::MAX`.
    #[error("Invalid delay: {0}")]
    InvalidDelay(f64),
    /// A run horizon lies in the past.
    #[error("Invalid horizon {until}: the clock is already at {now}")]
    InvalidHorizon {
        /// Requested horizon.
        until: f64,
        /// Clock value when the run was requested.
        now: f64,
    },
    /// A quantity was negative.
    #[error("Quantity cannot be negative: {0}")]
    NegativeQuantity(f64),
    /// A quantity can never fit into the primitive.
    #[error("Quantity {quantity} exceeds capacity {capacity}")]
    ExcessiveQuantity {
        /// Requested quantity.
        quantity: f64,
        /// Capacity of the primitive.
        capacity: f64,
    },
    /// A capacity was zero, negative, or not finite.
    #[error("Invalid capacity: {0}")]
    InvalidCapacity(String),
    /// An initial level lies outside `[0, capacity]`.
    #[error("Invalid level {level} for capacity {capacity}")]
    InvalidLevel {
        /// Requested initial level.
        level: f64,
        /// Capacity of the container.
        capacity: f64,
    },
    /// A real-time scaling factor was too small.
    #[error("Scaling factor {0} is too small")]
    InvalidScalingFactor(f64),
    /// A condition was built over fewer than two children.
    #[error("A condition needs at least two child events, got {0}")]
    TooFewChildren(usize),
    /// `succeed`/`fail` was called on an event that already left the pending state.
    #[error("Event has already been triggered")]
    EventAlreadyTriggered,
    /// `succeed`/`fail` was called on an event the kernel completes by itself.
    #[error("Event is managed by the kernel and cannot be triggered by hand")]
    NotTriggerable,

    /// A process tried to interrupt itself.
    #[error("A process cannot interrupt itself")]
    InterruptSelf,
    /// The target process has already finished.
    #[error("Process {0} has already finished")]
    ProcessFinished(u64),
    /// A request was handed to a resource that did not issue it.
    #[error("Request belongs to a different resource")]
    ForeignRequest,
    /// A handle from another environment was used.
    #[error("Handle belongs to a different environment")]
    ForeignEnvironment,
    /// The environment has already ended.
    #[error("Environment has already ended")]
    EnvironmentEnded,
    /// A run was started from inside a running process.
    #[error("Cannot run the environment from inside a process")]
    ReentrantRun,
    /// `run()` was called with nothing scheduled and no horizon.
    #[error("Nothing is scheduled: run without a horizon would never end")]
    UnboundedRun,
    /// The event a run was waiting for failed.
    #[error("The target event of the run failed")]
    TargetFailed,

    /// A process yielded again without acknowledging a pending interrupt.
    #[error("Process {process} resumed after an interrupt without checking it")]
    UncheckedInterrupt {
        /// Identifier of the offending process.
        process: u64,
    },
    /// A process awaited a future that is not backed by a kernel event.
    #[error("Process {process} awaited a future the kernel does not drive")]
    ForeignAwait {
        /// Identifier of the offending process.
        process: u64,
    },

    /// An awaited event failed.
    #[error("Awaited event failed")]
    EventFailed,
    /// An await was cut short by an interrupt.
    #[error("Process was interrupted")]
    Interrupted,
    /// An event was awaited outside of a process of its environment.
    #[error("Event awaited outside of a simulated process")]
    Detached,
    /// An event value was read under the wrong type.
    #[error("Event value has an unexpected type")]
    TypeMismatch,
}

impl SimulationError {
    /// Returns `true` for errors that mean the process body was interrupted.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, SimulationError::Interrupted)
    }
}

/// A type alias for `Result<T, SimulationError>`.
pub type SimulationResult<T> = Result<T, SimulationError>;

/// Why awaiting an event did not produce a success value.
#[derive(Debug, Clone, PartialEq)]
pub enum WaitError<T> {
    /// The event failed with this value.
    Failed(T),
    /// The process was interrupted while waiting. Query the interrupt before waiting again.
    Interrupted,
    /// The event was awaited outside of a process of its environment.
    Detached,
    /// The event holds a value of another type.
    TypeMismatch,
}

impl<T> WaitError<T> {
    /// Returns `true` if the wait ended because of an interrupt.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, WaitError::Interrupted)
    }
}

impl<T> From<WaitError<T>> for SimulationError {
    fn from(err: WaitError<T>) -> Self {
        match err {
            WaitError::Failed(_) => SimulationError::EventFailed,
            WaitError::Interrupted => SimulationError::Interrupted,
            WaitError::Detached => SimulationError::Detached,
            WaitError::TypeMismatch => SimulationError::TypeMismatch,
        }
    }
}
