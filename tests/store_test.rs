use chrono::{NaiveDate, TimeZone, Utc};
use rusqlite::Connection;

use captus::model::{RequestContext, StreakState};
use captus::{db, ops, streak, validate};

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn open(path: &str) -> Connection {
    let conn = db::open(path).unwrap();
    db::init(&conn).unwrap();
    conn
}

#[test]
fn week_of_completions_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("captus.db");
    let path = path.to_str().unwrap();

    // Two handles on one file, as two processes would have.
    let writer = open(path);
    let reader = open(path);

    let days = ["2024-06-01", "2024-06-02", "2024-06-03"];
    for (i, day) in days.iter().enumerate() {
        let ctx = RequestContext::new("student-7", date(day));
        let id = ops::add_task(&writer, &ctx, &format!("problem set {i}")).unwrap();
        let at = Utc.from_utc_datetime(&date(day).and_hms_opt(18, 30, 0).unwrap());
        ops::complete_task(&writer, &ctx, id, at).unwrap();
    }

    let ctx = RequestContext::new("student-7", date("2024-06-03"));
    let seen = ops::get_streak(&reader, &ctx).unwrap();
    assert_eq!(seen.current_streak, 3);
    assert_eq!(seen.last_completed_date, Some(date("2024-06-03")));
    assert!(validate::validate(&seen).is_valid);

    // Skip the 4th, check in on the 5th without completing anything.
    let ctx = RequestContext::new("student-7", date("2024-06-05"));
    let broken = ops::update_streak(&reader, &ctx, None).unwrap();
    assert_eq!(broken.current_streak, 0);
    assert_eq!(streak::state(&broken), StreakState::Broken);

    let seen = ops::get_streak(&writer, &ctx).unwrap();
    assert_eq!(seen.current_streak, 0);
    assert_eq!(seen.last_completed_date, Some(date("2024-06-03")));

    let stats = ops::streak_stats(&writer, &ctx).unwrap();
    assert_eq!(stats.completed_today, 0);
    assert!(!stats.goal_met);
    assert_eq!(stats.completion_rate, 0.1);
}

#[test]
fn sweep_sees_rows_written_elsewhere() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("captus.db");
    let path = path.to_str().unwrap();

    let a = open(path);
    let b = open(path);

    ops::update_streak(&a, &RequestContext::new("idle", date("2024-06-01")), Some(true)).unwrap();
    ops::update_streak(&a, &RequestContext::new("busy", date("2024-06-09")), Some(true)).unwrap();

    assert_eq!(ops::sweep_broken_streaks(&b, date("2024-06-10")).unwrap(), 1);

    let board = ops::list_streaks(&a).unwrap();
    let idle = board
        .iter()
        .find(|r| r.user_id.as_deref() == Some("idle"))
        .unwrap();
    assert_eq!(idle.current_streak, 0);
    assert_eq!(board[0].user_id.as_deref(), Some("busy"));
}
