use crate::model::{StreakRecord, StreakStats, Task};
use crate::ops::{format_date, format_timestamp};
use crate::streak;
use crate::validate::Validation;

fn date_or_never(date: Option<chrono::NaiveDate>) -> String {
    date.map(format_date).unwrap_or_else(|| "never".to_string())
}

pub fn format_streak(record: &StreakRecord) -> String {
    let mut out = String::new();
    out.push_str(&format!("User:           {}\n", record.user_id_str()));
    out.push_str(&format!("State:          {}\n", streak::state(record)));
    out.push_str(&format!("Current streak: {}\n", record.current_streak));
    out.push_str(&format!(
        "Last completed: {}\n",
        date_or_never(record.last_completed_date)
    ));
    out.push_str(&format!("Daily goal:     {}\n", record.daily_goal));
    out.push_str(&format!("Created:        {}\n", format_timestamp(record.created_at)));
    out.push_str(&format!("Updated:        {}\n", format_timestamp(record.updated_at)));
    out
}

pub fn format_stats(stats: &StreakStats) -> String {
    let mut out = String::new();
    out.push_str(&format!("User:            {}\n", stats.user_id));
    out.push_str(&format!("State:           {}\n", stats.state));
    out.push_str(&format!("Current streak:  {}\n", stats.current_streak));
    out.push_str(&format!(
        "Last completed:  {}\n",
        date_or_never(stats.last_completed_date)
    ));
    let mark = if stats.goal_met { " (goal met)" } else { "" };
    out.push_str(&format!(
        "Today:           {}/{}{}\n",
        stats.completed_today, stats.daily_goal, mark
    ));
    out.push_str(&format!(
        "30-day rate:     {:.0}%\n",
        stats.completion_rate * 100.0
    ));
    out
}

pub fn format_leaderboard(records: &[StreakRecord]) -> String {
    let mut out = String::new();
    for record in records {
        out.push_str(&format!(
            "{} {:>4}  {}  (last: {})\n",
            streak::state(record).icon(),
            record.current_streak,
            record.user_id_str(),
            date_or_never(record.last_completed_date)
        ));
    }
    out
}

pub fn format_task_list(tasks: &[Task]) -> String {
    let mut out = String::new();
    for task in tasks {
        let done = task
            .completed_at
            .map(|ts| format!("  (completed {})", format_timestamp(ts)))
            .unwrap_or_default();
        out.push_str(&format!("{} {:>4}  {}{}\n", task.icon(), task.id, task.title, done));
    }
    out
}

pub fn format_validation(v: &Validation) -> String {
    if v.is_valid {
        return "valid\n".to_string();
    }
    let mut out = String::new();
    for e in &v.errors {
        out.push_str(&format!("- {e}\n"));
    }
    out
}
