//! # Server Time Source
//!
//! The engine never calls `Utc::now()` directly. Time enters through the
//! [`Clock`] trait so skew checks, batch deadlines and feed watermarks are
//! deterministic under test.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, Utc};

/// Server time source.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current server time.
    fn now(&self) -> DateTime<Utc>;
}

/// The production clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A manually advanced clock for tests.
///
/// Stored as microseconds since the epoch so `advance` is a plain atomic
/// add and the clock can be shared across tasks without locking.
#[derive(Debug)]
pub struct FixedClock {
    micros: AtomicI64,
}

impl FixedClock {
    /// Creates a clock frozen at the given instant.
    pub fn at(instant: DateTime<Utc>) -> Self {
        FixedClock {
            micros: AtomicI64::new(instant.timestamp_micros()),
        }
    }

    /// Moves the clock forward (or backward, with a negative duration).
    pub fn advance(&self, by: Duration) {
        self.micros
            .fetch_add(by.num_microseconds().unwrap_or(0), Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_micros(self.micros.load(Ordering::SeqCst))
            .unwrap_or(DateTime::UNIX_EPOCH)
    }
}
