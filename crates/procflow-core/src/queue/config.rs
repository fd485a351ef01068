//! Queue configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Upper bound on leaf bodies running at once, shared with every group
    /// queue nested below this one.
    pub max_concurrent: usize,

    /// Applied to tasks without their own `with_timeout`.
    pub default_timeout_ms: Option<u64>,
}

impl QueueConfig {
    pub const DEFAULT_MAX_CONCURRENT: usize = 16;

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }

    /// `max_concurrent`, never below one.
    pub(crate) fn permits(&self) -> usize {
        self.max_concurrent.max(1)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: Self::DEFAULT_MAX_CONCURRENT,
            default_timeout_ms: None,
        }
    }
}
