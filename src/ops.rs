use anyhow::{bail, Result};
use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, SubsecRound, Utc};
use log::{debug, info, warn};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension};

use crate::model::{RequestContext, StreakRecord, StreakStats, Task};
use crate::streak;
use crate::validate::{ensure_valid, validate, validate_daily_goal, validate_title, validate_user_id};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Days looked back over when computing the completion rate.
const COMPLETION_WINDOW_DAYS: i64 = 30;

const STREAK_COLUMNS: &str =
    "id, user_id, current_streak, last_completed_date, daily_goal, created_at, updated_at";

const TASK_COLUMNS: &str = "id, user_id, title, completed, completed_at, created_at, updated_at";

const INSERT_STREAK: &str = "
INSERT INTO streaks (user_id, current_streak, last_completed_date, daily_goal, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
";

const WRITE_STREAK: &str = "
UPDATE streaks
SET current_streak = ?1, last_completed_date = ?2, daily_goal = ?3, updated_at = ?4
WHERE user_id = ?5
";

const COMPLETED_ON_DAY: &str = "
SELECT COUNT(*) FROM tasks
WHERE user_id = ?1 AND completed = 1 AND substr(completed_at, 1, 10) = ?2
";

const COMPLETION_DAYS_IN_RANGE: &str = "
SELECT COUNT(DISTINCT substr(completed_at, 1, 10)) FROM tasks
WHERE user_id = ?1 AND completed = 1
  AND substr(completed_at, 1, 10) BETWEEN ?2 AND ?3
";

const STALE_STREAKS: &str = "
SELECT id, user_id, current_streak, last_completed_date, daily_goal, created_at, updated_at
FROM streaks
WHERE current_streak > 0 AND last_completed_date IS NOT NULL AND last_completed_date < ?1
ORDER BY user_id
";

/// Current time at the precision timestamps are stored with.
fn now_secs() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn conversion_error(idx: usize, e: chrono::ParseError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn read_date(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn read_timestamp(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

fn required_timestamp(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    read_timestamp(row, idx)?.ok_or(rusqlite::Error::InvalidColumnType(
        idx,
        "timestamp".into(),
        Type::Null,
    ))
}

fn read_streak_row(row: &rusqlite::Row) -> rusqlite::Result<StreakRecord> {
    Ok(StreakRecord {
        id: Some(row.get(0)?),
        user_id: Some(row.get(1)?),
        current_streak: row.get(2)?,
        last_completed_date: read_date(row, 3)?,
        daily_goal: row.get(4)?,
        created_at: required_timestamp(row, 5)?,
        updated_at: required_timestamp(row, 6)?,
    })
}

fn read_task_row(row: &rusqlite::Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        completed: row.get::<_, i64>(3)? != 0,
        completed_at: read_timestamp(row, 4)?,
        created_at: required_timestamp(row, 5)?,
        updated_at: required_timestamp(row, 6)?,
    })
}

/// Run `f` as one write transaction.
///
/// Outside a transaction this takes the write lock up front with
/// `BEGIN IMMEDIATE`, so a read-modify-write cannot interleave with another
/// writer. Inside one (e.g. `complete_task` calling `update_streak`) it nests
/// as a SAVEPOINT.
fn with_write_txn<T>(conn: &Connection, name: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let nested = !conn.is_autocommit();
    if nested {
        conn.execute_batch(&format!("SAVEPOINT {name}"))?;
    } else {
        conn.execute_batch("BEGIN IMMEDIATE")?;
    }

    match f() {
        Ok(v) => {
            if nested {
                conn.execute_batch(&format!("RELEASE {name}"))?;
            } else {
                conn.execute_batch("COMMIT")?;
            }
            Ok(v)
        }
        Err(e) => {
            if nested {
                let _ = conn.execute_batch(&format!("ROLLBACK TO {name}"));
                let _ = conn.execute_batch(&format!("RELEASE {name}"));
            } else {
                let _ = conn.execute_batch("ROLLBACK");
            }
            Err(e)
        }
    }
}

fn find_streak(conn: &Connection, user_id: &str) -> Result<Option<StreakRecord>> {
    let record = conn
        .query_row(
            &format!("SELECT {STREAK_COLUMNS} FROM streaks WHERE user_id = ?1"),
            [user_id],
            read_streak_row,
        )
        .optional()?;
    Ok(record)
}

fn insert_streak(conn: &Connection, record: &StreakRecord) -> Result<StreakRecord> {
    ensure_valid(record)?;
    conn.execute(
        INSERT_STREAK,
        rusqlite::params![
            record.user_id_str(),
            record.current_streak,
            record.last_completed_date.map(format_date),
            record.daily_goal,
            format_timestamp(record.created_at),
            format_timestamp(record.updated_at),
        ],
    )?;
    Ok(StreakRecord {
        id: Some(conn.last_insert_rowid()),
        ..record.clone()
    })
}

fn write_streak(conn: &Connection, record: &StreakRecord) -> Result<()> {
    ensure_valid(record)?;
    let rows = conn.execute(
        WRITE_STREAK,
        rusqlite::params![
            record.current_streak,
            record.last_completed_date.map(format_date),
            record.daily_goal,
            format_timestamp(record.updated_at),
            record.user_id_str(),
        ],
    )?;
    if rows == 0 {
        bail!("no streak stored for user '{}'", record.user_id_str());
    }
    Ok(())
}

fn get_or_create(conn: &Connection, user_id: &str) -> Result<StreakRecord> {
    if let Some(record) = find_streak(conn, user_id)? {
        let v = validate(&record);
        if !v.is_valid {
            warn!("stored streak for '{user_id}' is invalid: {}", v.errors.join("; "));
        }
        return Ok(record);
    }
    debug!("creating streak for '{user_id}'");
    insert_streak(conn, &StreakRecord::new(user_id, now_secs()))
}

/// The user's streak, created with defaults on first access.
pub fn get_streak(conn: &Connection, ctx: &RequestContext) -> Result<StreakRecord> {
    validate_user_id(&ctx.user_id)?;
    with_write_txn(conn, "get_streak", || get_or_create(conn, &ctx.user_id))
}

/// Number of the user's tasks completed on `day`.
pub fn completed_on(conn: &Connection, user_id: &str, day: NaiveDate) -> Result<i64> {
    let count = conn.query_row(
        COMPLETED_ON_DAY,
        rusqlite::params![user_id, format_date(day)],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Apply one day's completion status to the user's streak and store it.
///
/// With `has_completed = None` the status is taken from the tasks table:
/// any task completed on `ctx.today` counts.
pub fn update_streak(
    conn: &Connection,
    ctx: &RequestContext,
    has_completed: Option<bool>,
) -> Result<StreakRecord> {
    validate_user_id(&ctx.user_id)?;
    with_write_txn(conn, "update_streak", || {
        let record = get_or_create(conn, &ctx.user_id)?;
        if let Some(last) = record.last_completed_date {
            if ctx.today < last {
                bail!(
                    "date {} is before the last completion on {}",
                    format_date(ctx.today),
                    format_date(last)
                );
            }
        }

        let completed = match has_completed {
            Some(c) => c,
            None => completed_on(conn, &ctx.user_id, ctx.today)? > 0,
        };

        let next = streak::update(&record, completed, ctx.today, now_secs());
        write_streak(conn, &next)?;

        let before = streak::state(&record);
        let after = streak::state(&next);
        if before != after || record.current_streak != next.current_streak {
            info!(
                "streak for '{}': {} -> {} ({} -> {})",
                ctx.user_id, record.current_streak, next.current_streak, before, after
            );
        }
        Ok(next)
    })
}

/// Put the user back to the `new` state.
///
/// Unlike the old service's reset, which also put the goal back to
/// `DEFAULT_DAILY_GOAL`, the user's daily goal is kept.
pub fn reset_streak(conn: &Connection, ctx: &RequestContext) -> Result<StreakRecord> {
    validate_user_id(&ctx.user_id)?;
    with_write_txn(conn, "reset_streak", || {
        let record = get_or_create(conn, &ctx.user_id)?;
        let next = StreakRecord {
            current_streak: 0,
            last_completed_date: None,
            updated_at: now_secs(),
            ..record
        };
        write_streak(conn, &next)?;
        info!("streak for '{}' reset", ctx.user_id);
        Ok(next)
    })
}

pub fn set_daily_goal(conn: &Connection, ctx: &RequestContext, goal: i64) -> Result<StreakRecord> {
    validate_user_id(&ctx.user_id)?;
    validate_daily_goal(goal)?;
    with_write_txn(conn, "set_daily_goal", || {
        let record = get_or_create(conn, &ctx.user_id)?;
        let next = StreakRecord {
            daily_goal: goal,
            updated_at: now_secs(),
            ..record
        };
        write_streak(conn, &next)?;
        Ok(next)
    })
}

/// Break every streak whose last completion is more than a day before
/// `today`. Returns how many were broken.
pub fn sweep_broken_streaks(conn: &Connection, today: NaiveDate) -> Result<usize> {
    let cutoff = format_date(today - Duration::days(1));
    with_write_txn(conn, "sweep", || {
        let stale: Vec<StreakRecord> = {
            let mut stmt = conn.prepare(STALE_STREAKS)?;
            let rows = stmt.query_map([&cutoff], read_streak_row)?;
            rows.collect::<rusqlite::Result<_>>()?
        };

        let now = now_secs();
        let mut broken = 0;
        for record in stale.iter().filter(|r| streak::evaluate_reset(r, today)) {
            let next = streak::update(record, false, today, now);
            write_streak(conn, &next)?;
            broken += 1;
        }
        if broken > 0 {
            warn!("broke {broken} streak(s) idle since before {cutoff}");
        }
        Ok(broken)
    })
}

pub fn streak_stats(conn: &Connection, ctx: &RequestContext) -> Result<StreakStats> {
    let record = get_streak(conn, ctx)?;
    let completed_today = completed_on(conn, &ctx.user_id, ctx.today)?;

    let window_start = ctx.today - Duration::days(COMPLETION_WINDOW_DAYS - 1);
    let active_days: i64 = conn.query_row(
        COMPLETION_DAYS_IN_RANGE,
        rusqlite::params![ctx.user_id, format_date(window_start), format_date(ctx.today)],
        |row| row.get(0),
    )?;
    let rate = active_days as f64 / COMPLETION_WINDOW_DAYS as f64;

    Ok(StreakStats {
        user_id: ctx.user_id.clone(),
        current_streak: record.current_streak,
        daily_goal: record.daily_goal,
        last_completed_date: record.last_completed_date,
        state: streak::state(&record),
        completed_today,
        goal_met: completed_today >= record.daily_goal,
        completion_rate: (rate * 100.0).round() / 100.0,
    })
}

/// All stored streaks, longest first.
pub fn list_streaks(conn: &Connection) -> Result<Vec<StreakRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STREAK_COLUMNS} FROM streaks ORDER BY current_streak DESC, user_id ASC"
    ))?;
    let records = stmt
        .query_map([], read_streak_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(records)
}

pub fn add_task(conn: &Connection, ctx: &RequestContext, title: &str) -> Result<i64> {
    validate_user_id(&ctx.user_id)?;
    validate_title(title)?;
    let now = format_timestamp(now_secs());
    conn.execute(
        "INSERT INTO tasks (user_id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
        rusqlite::params![ctx.user_id, title.trim(), now],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Fetch one of the user's tasks. Other users' tasks are reported as missing.
pub fn get_task(conn: &Connection, ctx: &RequestContext, id: i64) -> Result<Task> {
    let task = conn
        .query_row(
            &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1 AND user_id = ?2"),
            rusqlite::params![id, ctx.user_id],
            read_task_row,
        )
        .optional()?;
    match task {
        Some(t) => Ok(t),
        None => bail!("task {id} not found"),
    }
}

/// Mark a task complete at `now` and count it towards today's streak.
///
/// `now` must fall on `ctx.today` (UTC), so that the task and the streak
/// agree on which day the completion belongs to.
pub fn complete_task(
    conn: &Connection,
    ctx: &RequestContext,
    id: i64,
    now: DateTime<Utc>,
) -> Result<StreakRecord> {
    if now.date_naive() != ctx.today {
        bail!(
            "completion time {} is not on {}",
            format_timestamp(now),
            format_date(ctx.today)
        );
    }
    with_write_txn(conn, "complete_task", || {
        let task = get_task(conn, ctx, id)?;
        if task.completed {
            bail!("task {id} is already completed");
        }
        let ts = format_timestamp(now);
        conn.execute(
            "UPDATE tasks SET completed = 1, completed_at = ?1, updated_at = ?1 WHERE id = ?2",
            rusqlite::params![ts, id],
        )?;
        update_streak(conn, ctx, Some(true))
    })
}

/// Undo a completion. The streak is left as it is.
pub fn reopen_task(conn: &Connection, ctx: &RequestContext, id: i64) -> Result<()> {
    let task = get_task(conn, ctx, id)?;
    if !task.completed {
        bail!("task {id} is not completed");
    }
    conn.execute(
        "UPDATE tasks SET completed = 0, completed_at = NULL, updated_at = ?1 WHERE id = ?2",
        rusqlite::params![format_timestamp(now_secs()), id],
    )?;
    Ok(())
}

pub fn list_tasks(conn: &Connection, ctx: &RequestContext, include_completed: bool) -> Result<Vec<Task>> {
    let sql = if include_completed {
        format!("SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ?1 ORDER BY id ASC")
    } else {
        format!("SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ?1 AND completed = 0 ORDER BY id ASC")
    };
    let mut stmt = conn.prepare(&sql)?;
    let tasks = stmt
        .query_map([&ctx.user_id], read_task_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tasks)
}
