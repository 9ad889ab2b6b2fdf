use super::errors::{SpawnError, SpawnResult};
use std::num::NonZeroUsize;

/// Pool configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of simultaneously running tasks.
    pub concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self::io_bound()
    }
}

impl Config {
    pub fn cpu_bound() -> Self {
        Self {
            concurrency: num_cpus::get(),
        }
    }

    pub fn io_bound() -> Self {
        Self {
            concurrency: num_cpus::get() * 2,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Rejects a zero limit instead of falling back to a default.
    pub fn validate(&self) -> SpawnResult<NonZeroUsize> {
        NonZeroUsize::new(self.concurrency).ok_or_else(|| SpawnError::invalid_limit(self.concurrency))
    }
}
