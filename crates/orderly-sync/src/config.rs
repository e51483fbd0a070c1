//! # Engine Configuration
//!
//! Tunables for batch processing and the change feed. Defaults come from
//! orderly-core's limits; deployments override through the builder setters.

use chrono::Duration;

use orderly_core::{DEFAULT_CLOCK_SKEW_SECS, DEFAULT_FEED_LIMIT, MAX_BATCH_ACTIONS, MAX_FEED_LIMIT};

/// How long a batch-apply call may run before returning partial results.
const DEFAULT_BATCH_DEADLINE_SECS: i64 = 30;

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How far ahead of server time a client timestamp may be.
    pub skew_tolerance: Duration,

    /// Wall-clock budget for one batch-apply call. On expiry the engine
    /// returns outcomes for actions completed so far; the rest stay
    /// un-journaled and the client retries with the remainder.
    pub batch_deadline: Duration,

    /// Hard cap on actions per uploaded batch.
    pub max_batch_actions: usize,

    /// Feed page size when the client does not pass a limit.
    pub default_feed_limit: usize,

    /// Hard cap on the feed page size.
    pub max_feed_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            skew_tolerance: Duration::seconds(DEFAULT_CLOCK_SKEW_SECS),
            batch_deadline: Duration::seconds(DEFAULT_BATCH_DEADLINE_SECS),
            max_batch_actions: MAX_BATCH_ACTIONS,
            default_feed_limit: DEFAULT_FEED_LIMIT,
            max_feed_limit: MAX_FEED_LIMIT,
        }
    }
}

impl EngineConfig {
    /// Creates a config with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the clock-skew tolerance.
    pub fn with_skew_tolerance(mut self, tolerance: Duration) -> Self {
        self.skew_tolerance = tolerance;
        self
    }

    /// Sets the batch-apply deadline.
    pub fn with_batch_deadline(mut self, deadline: Duration) -> Self {
        self.batch_deadline = deadline;
        self
    }

    /// Sets the per-batch action cap.
    pub fn with_max_batch_actions(mut self, max: usize) -> Self {
        self.max_batch_actions = max;
        self
    }

    /// Clamps a client-requested feed limit into `1..=max_feed_limit`.
    pub fn clamp_feed_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_feed_limit)
            .clamp(1, self.max_feed_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.skew_tolerance, Duration::seconds(300));
        assert_eq!(config.batch_deadline, Duration::seconds(30));
        assert_eq!(config.max_batch_actions, 500);
    }

    #[test]
    fn test_clamp_feed_limit() {
        let config = EngineConfig::default();
        assert_eq!(config.clamp_feed_limit(None), 200);
        assert_eq!(config.clamp_feed_limit(Some(0)), 1);
        assert_eq!(config.clamp_feed_limit(Some(50)), 50);
        assert_eq!(config.clamp_feed_limit(Some(99_999)), 1000);
    }
}
