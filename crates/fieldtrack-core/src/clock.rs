//! Wall-clock access.
//!
//! Every time-dependent decision (event stamps, send windows, token expiry)
//! reads the clock through [`Clock`] so the rules can be exercised with a
//! controllable [`ManualClock`].

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Offset, SubsecRound, Utc};
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;

    /// Local wall time at the given UTC offset, truncated to whole seconds.
    fn now_local(&self, utc_offset_hours: i32) -> NaiveDateTime {
        local_time(self.now_utc(), utc_offset_hours)
    }
}

/// Convert a UTC instant to second-precision local time.
pub fn local_time(at: DateTime<Utc>, utc_offset_hours: i32) -> NaiveDateTime {
    let offset = FixedOffset::east_opt(utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix());
    at.with_timezone(&offset).naive_local().trunc_subsecs(0)
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = to;
        }
    }
}

impl Clock for ManualClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|_| Utc::now())
    }
}
