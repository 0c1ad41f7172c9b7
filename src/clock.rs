//! Source of "now" for missing timestamps and upload metadata.

use chrono::{NaiveDateTime, Utc};

/// Supplies the current time to an import.
pub trait Clock: Send + Sync {
    /// Current UTC time without offset.
    fn now(&self) -> NaiveDateTime;
}

/// Wall clock (UTC).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().naive_utc()
    }
}

/// A clock frozen at one instant. Useful for deterministic imports and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}
