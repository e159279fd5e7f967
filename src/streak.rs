//! Day-counting rules for a user's completion streak.
//!
//! Everything here is pure: callers supply `today` and `now`, and persisting
//! the result is the store's job (see `ops`).

use chrono::{DateTime, NaiveDate, Utc};

use crate::model::{StreakRecord, StreakState};

/// Whole calendar days between two dates, regardless of order.
pub fn days_between(a: NaiveDate, b: NaiveDate) -> i64 {
    (b - a).num_days().abs()
}

/// True when a full day has passed with no completion since the last one.
/// A record that never completed anything has nothing to reset.
pub fn evaluate_reset(record: &StreakRecord, today: NaiveDate) -> bool {
    match record.last_completed_date {
        Some(last) => days_between(last, today) > 1,
        None => false,
    }
}

/// Produce the next state of `record` given whether the user completed at
/// least one task on `today`.
///
/// A completion on any day other than the one right after the last
/// completion starts a fresh run at 1. That includes a second completion on
/// the same day, which drops an already-grown streak back to 1.
pub fn update(
    record: &StreakRecord,
    has_completed_today: bool,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> StreakRecord {
    let mut next = record.clone();

    if has_completed_today {
        next.current_streak = match record.last_completed_date {
            Some(last) if days_between(last, today) == 1 => record.current_streak + 1,
            _ => 1,
        };
        next.last_completed_date = Some(today);
    } else if evaluate_reset(record, today) {
        next.current_streak = 0;
    }

    next.updated_at = now;
    next
}

pub fn state(record: &StreakRecord) -> StreakState {
    match record.last_completed_date {
        None => StreakState::New,
        Some(_) if record.current_streak == 0 => StreakState::Broken,
        Some(_) => StreakState::Active,
    }
}
