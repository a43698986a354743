//! Timestamp utilities
//!
//! Result prefixes embed the local wall-clock time at second resolution
//! (`YYYYMMDDHHMMSS`). The [`Clock`] trait lets tests freeze that time.

use chrono::{DateTime, Local, Utc};
use std::fmt;

/// Format used for the timestamp part of a result prefix
pub const STAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Source of the current time
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current local time
    fn now(&self) -> DateTime<Local>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock frozen at one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Local>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Local> {
        self.0
    }
}

/// Render a timestamp as `YYYYMMDDHHMMSS`
pub fn stamp(time: &DateTime<Local>) -> String {
    time.format(STAMP_FORMAT).to_string()
}

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}
