//! Time-unit helpers.
//!
//! The simulation clock is a bare `f64`. By convention one unit is one
//! second; these helpers convert other units to and from that scale.

/// A unit of simulated time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    /// 1e-9 seconds.
    Nanoseconds,
    /// 1e-6 seconds.
    Microseconds,
    /// 1e-3 seconds.
    Milliseconds,
    /// The base unit.
    Seconds,
    /// 60 seconds.
    Minutes,
    /// 3600 seconds.
    Hours,
    /// 86400 seconds.
    Days,
}

impl TimeUnit {
    /// Length of one of this unit, in seconds.
    pub fn seconds_per_unit(self) -> f64 {
        match self {
            TimeUnit::Nanoseconds => 1e-9,
            TimeUnit::Microseconds => 1e-6,
            TimeUnit::Milliseconds => 1e-3,
            TimeUnit::Seconds => 1.0,
            TimeUnit::Minutes => 60.0,
            TimeUnit::Hours => 3_600.0,
            TimeUnit::Days => 86_400.0,
        }
    }

    /// Converts `amount` of this unit to seconds.
    pub fn to_seconds(self, amount: f64) -> f64 {
        amount * self.seconds_per_unit()
    }

    /// Converts `seconds` to this unit.
    pub fn from_seconds(self, seconds: f64) -> f64 {
        seconds / self.seconds_per_unit()
    }
}

/// `amount` nanoseconds, in seconds.
pub fn nanoseconds(amount: f64) -> f64 {
    TimeUnit::Nanoseconds.to_seconds(amount)
}

/// `amount` microseconds, in seconds.
pub fn microseconds(amount: f64) -> f64 {
    TimeUnit::Microseconds.to_seconds(amount)
}

/// `amount` milliseconds, in seconds.
pub fn milliseconds(amount: f64) -> f64 {
    TimeUnit::Milliseconds.to_seconds(amount)
}

/// `amount` seconds.
pub fn seconds(amount: f64) -> f64 {
    amount
}

/// `amount` minutes, in seconds.
pub fn minutes(amount: f64) -> f64 {
    TimeUnit::Minutes.to_seconds(amount)
}

/// `amount` hours, in seconds.
pub fn hours(amount: f64) -> f64 {
    TimeUnit::Hours.to_seconds(amount)
}

/// `amount` days, in seconds.
pub fn days(amount: f64) -> f64 {
    TimeUnit::Days.to_seconds(amount)
}
