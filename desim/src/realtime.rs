//! Wall-clock pacing for real-time runs.
//!
//! A real-time environment keeps logical ordering untouched and only sleeps
//! before each clock advance, so that the wall time elapsed since the run
//! started is at least `(simulated time elapsed) * scaling_factor`.

use std::{
    cell::RefCell,
    fmt,
    rc::Rc,
    time::{Duration, Instant},
};

use crate::error::{SimulationError, SimulationResult};

/// Source of wall-clock time used to pace a real-time environment.
///
/// Injectable so tests can drive pacing without really sleeping.
pub trait WallClock {
    /// Wall time elapsed since an arbitrary, fixed origin.
    fn now(&self) -> Duration;

    /// Blocks the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by [`Instant`] and [`std::thread::sleep`].
#[derive(Debug, Clone)]
pub struct SystemWallClock {
    origin: Instant,
}

impl SystemWallClock {
    /// Creates a clock whose origin is the moment of creation.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemWallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WallClock for SystemWallClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Wall clock that never blocks: sleeping simply advances its reading.
///
/// Records every requested sleep, which makes pacing observable in tests.
#[derive(Debug, Clone, Default)]
pub struct ManualWallClock {
    state: Rc<RefCell<ManualState>>,
}

#[derive(Debug, Default)]
struct ManualState {
    now: Duration,
    sleeps: Vec<Duration>,
}

impl ManualWallClock {
    /// Creates a clock reading zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward without recording a sleep, as if other work took time.
    pub fn advance(&self, duration: Duration) {
        self.state.borrow_mut().now += duration;
    }

    /// Sleeps requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.borrow().sleeps.clone()
    }

    /// Total time spent sleeping.
    pub fn total_slept(&self) -> Duration {
        self.state.borrow().sleeps.iter().sum()
    }
}

impl WallClock for ManualWallClock {
    fn now(&self) -> Duration {
        self.state.borrow().now
    }

    fn sleep(&self, duration: Duration) {
        let mut state = self.state.borrow_mut();
        state.now += duration;
        state.sleeps.push(duration);
    }
}

/// Options for a real-time environment.
#[derive(Clone)]
pub struct RealTimeOptions {
    /// Wall seconds per simulated time unit.
    pub scaling_factor: f64,
    /// Clock used to measure and wait.
    pub wall_clock: Rc<dyn WallClock>,
}

impl RealTimeOptions {
    /// Smallest scaling factor accepted; the factor must be strictly greater.
    pub const MIN_SCALING_FACTOR: f64 = 1e-6;

    /// One wall second per simulated unit on the system clock.
    pub fn new() -> Self {
        Self {
            scaling_factor: 1.0,
            wall_clock: Rc::new(SystemWallClock::new()),
        }
    }

    /// Sets the scaling factor.
    pub fn with_scaling_factor(mut self, scaling_factor: f64) -> Self {
        self.scaling_factor = scaling_factor;
        self
    }

    /// Sets the wall clock.
    pub fn with_wall_clock(mut self, wall_clock: Rc<dyn WallClock>) -> Self {
        self.wall_clock = wall_clock;
        self
    }

    /// Checks the scaling factor.
    pub fn validate(&self) -> SimulationResult<()> {
        if self.scaling_factor.is_finite() && self.scaling_factor > Self::MIN_SCALING_FACTOR {
            Ok(())
        } else {
            Err(SimulationError::InvalidScalingFactor(self.scaling_factor))
        }
    }
}

impl Default for RealTimeOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RealTimeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealTimeOptions")
            .field("scaling_factor", &self.scaling_factor)
            .finish_non_exhaustive()
    }
}

/// Tracks the wall/simulated anchor of the current run.
#[derive(Debug)]
pub(crate) struct Pacer {
    options: RealTimeOptions,
    anchor: Option<(Duration, f64)>,
}

impl Pacer {
    pub(crate) fn new(options: RealTimeOptions) -> Self {
        Self {
            options,
            anchor: None,
        }
    }

    /// Anchors pacing at the start of a run.
    pub(crate) fn restart(&mut self, sim_now: f64) {
        self.anchor = Some((self.options.wall_clock.now(), sim_now));
    }

    /// How long to sleep before the clock may show `target`.
    pub(crate) fn delay_for(&mut self, target: f64) -> Option<Duration> {
        if !target.is_finite() {
            return None;
        }
        let clock = &self.options.wall_clock;
        let (wall_start, sim_start) = *self.anchor.get_or_insert_with(|| (clock.now(), target));
        let offset =
            Duration::try_from_secs_f64((target - sim_start) * self.options.scaling_factor).ok()?;
        let due = wall_start.checked_add(offset)?;
        due.checked_sub(clock.now()).filter(|d| !d.is_zero())
    }

    pub(crate) fn clock(&self) -> Rc<dyn WallClock> {
        Rc::clone(&self.options.wall_clock)
    }
}
