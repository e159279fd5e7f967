use anyhow::{bail, Result};
use serde::Serialize;

use crate::model::StreakRecord;

pub const USER_ID_REQUIRED: &str = "User ID is required";
pub const NEGATIVE_STREAK: &str = "Current streak cannot be negative";
pub const DAILY_GOAL_TOO_LOW: &str = "Daily goal must be at least 1";

/// Outcome of checking a streak record. Advisory: callers decide whether to
/// refuse the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Validation {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

pub fn validate(record: &StreakRecord) -> Validation {
    let mut errors = Vec::new();

    if record.user_id.as_deref().map_or(true, |u| u.trim().is_empty()) {
        errors.push(USER_ID_REQUIRED.to_string());
    }
    if record.current_streak < 0 {
        errors.push(NEGATIVE_STREAK.to_string());
    }
    if record.daily_goal < 1 {
        errors.push(DAILY_GOAL_TOO_LOW.to_string());
    }

    Validation {
        is_valid: errors.is_empty(),
        errors,
    }
}

/// Refuse a record that fails `validate`, joining every message.
pub fn ensure_valid(record: &StreakRecord) -> Result<()> {
    let v = validate(record);
    if !v.is_valid {
        bail!("invalid streak record: {}", v.errors.join("; "));
    }
    Ok(())
}

pub fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        bail!(USER_ID_REQUIRED);
    }
    Ok(())
}

pub fn validate_daily_goal(goal: i64) -> Result<()> {
    if goal < 1 {
        bail!(DAILY_GOAL_TOO_LOW);
    }
    Ok(())
}

pub fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        bail!("task title must not be empty");
    }
    Ok(())
}
