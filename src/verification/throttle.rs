//! Gate refusing submissions while a review is pending or after too many
//! rejections today.

use chrono::NaiveDateTime;

use crate::error::{Result, ServerError};
use crate::user::{Category, ReviewStatus, User};

/// Default number of rejected reviews allowed per calendar day.
pub const DEFAULT_MAX_DAILY_ERRORS: i32 = 3;

/// Read-only throttle over the counters stored on [`User`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleGuard {
    max_daily_errors: i32,
}

impl ThrottleGuard {
    /// Create a new [`ThrottleGuard`].
    pub fn new(max_daily_errors: i32) -> Self {
        Self { max_daily_errors }
    }

    /// Allow a new submission of `category` by `user` at `now`.
    ///
    /// The counter only applies if its last error is on the same calendar
    /// day as `now`. A stale count from a previous day never blocks.
    pub fn check(
        &self,
        category: Category,
        user: &User,
        now: NaiveDateTime,
    ) -> Result<()> {
        if user.status(category) == ReviewStatus::Waiting {
            return Err(ServerError::RecordPendingReview(category));
        }

        let errors = user.errors(category);
        let today = errors
            .last_at
            .is_some_and(|at| at.date() == now.date());
        if today && errors.count >= self.max_daily_errors {
            return Err(ServerError::DailyAttemptLimitExceeded);
        }

        Ok(())
    }
}

impl Default for ThrottleGuard {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DAILY_ERRORS)
    }
}
