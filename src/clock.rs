//! Time source.
//!
//! Throttle windows are calendar days of the server, so the clock yields
//! local wall time.

use chrono::NaiveDateTime;

/// Port for getting the current time.
pub trait Clock: Send + Sync {
    /// Current server-local date and time.
    fn now(&self) -> NaiveDateTime;
}

/// System clock using the OS time zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// Clock frozen at a given instant.
#[cfg(test)]
#[derive(Debug)]
pub struct FixedClock(std::sync::Mutex<NaiveDateTime>);

#[cfg(test)]
impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self(std::sync::Mutex::new(now))
    }

    /// Move the clock to `now`.
    pub fn set(&self, now: NaiveDateTime) {
        *self.0.lock().unwrap() = now;
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.0.lock().unwrap()
    }
}
