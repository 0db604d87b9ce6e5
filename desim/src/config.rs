//! Environment configuration.

use crate::{error::SimulationResult, realtime::RealTimeOptions};

/// Configuration for an [`Environment`](crate::Environment).
///
/// The default configuration uses seed `0` and runs as fast as possible.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentConfig {
    /// Seed for the environment's random number generator.
    pub seed: u64,
    /// Wall-clock pacing, `None` for a purely logical run.
    pub realtime: Option<RealTimeOptions>,
}

impl EnvironmentConfig {
    /// Logical-time configuration with the given seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed,
            realtime: None,
        }
    }

    /// Real-time configuration with the given pacing options and seed `0`.
    pub fn realtime(options: RealTimeOptions) -> Self {
        Self {
            seed: 0,
            realtime: Some(options),
        }
    }

    /// Replaces the seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Enables real-time pacing.
    pub fn with_realtime(mut self, options: RealTimeOptions) -> Self {
        self.realtime = Some(options);
        self
    }

    /// Checks the configuration before an environment is built from it.
    pub fn validate(&self) -> SimulationResult<()> {
        match &self.realtime {
            Some(options) => options.validate(),
            None => Ok(()),
        }
    }
}
