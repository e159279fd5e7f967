use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fmt;

/// Goal assigned to a user's streak before they pick one.
pub const DEFAULT_DAILY_GOAL: i64 = 5;

/// One user's streak row.
///
/// `user_id`, `current_streak` and `daily_goal` are wide enough to hold
/// invalid values so that `validate::validate` has something to report on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreakRecord {
    pub id: Option<i64>,
    pub user_id: Option<String>,
    pub current_streak: i64,
    pub last_completed_date: Option<NaiveDate>,
    pub daily_goal: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StreakRecord {
    /// A not-yet-stored record for `user_id` with the default goal.
    pub fn new(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: None,
            user_id: Some(user_id.to_string()),
            current_streak: 0,
            last_completed_date: None,
            daily_goal: DEFAULT_DAILY_GOAL,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn user_id_str(&self) -> &str {
        self.user_id.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreakState {
    /// Never completed anything.
    New,
    /// Completed on `last_completed_date` and the run is still counting.
    Active,
    /// Missed at least one full day since the last completion.
    Broken,
}

impl StreakState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Active => "active",
            Self::Broken => "broken",
        }
    }

    /// Returns display icon: .=new, *=active, x=broken
    pub fn icon(self) -> &'static str {
        match self {
            Self::New => ".",
            Self::Active => "*",
            Self::Broken => "x",
        }
    }
}

impl fmt::Display for StreakState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Task {
    pub id: i64,
    pub user_id: String,
    pub title: String,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Returns display icon: x=completed, .=open
    pub fn icon(&self) -> &'static str {
        if self.completed {
            "x"
        } else {
            "."
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StreakStats {
    pub user_id: String,
    pub current_streak: i64,
    pub daily_goal: i64,
    pub last_completed_date: Option<NaiveDate>,
    pub state: StreakState,
    pub completed_today: i64,
    pub goal_met: bool,
    pub completion_rate: f64,
}

/// Who is acting and what day it is for them.
///
/// Built once per invocation and handed to every user-scoped store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: String,
    pub today: NaiveDate,
}

impl RequestContext {
    pub fn new(user_id: impl Into<String>, today: NaiveDate) -> Self {
        Self {
            user_id: user_id.into(),
            today,
        }
    }
}
