mod cli;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clap::Parser;
use rusqlite::Connection;

use captus::model::RequestContext;
use captus::paths::{ensure_db_dir, resolve_db_path};
use captus::{db, ops, output, validate};
use cli::{Cli, Command, TaskCommand};

fn setup_logging() {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or("CAPTUS_LOG", "warn"))
        .format_timestamp_secs()
        .init();
}

fn open_db(db_path: &str) -> Result<Connection> {
    let conn = db::open(db_path)?;
    db::init(&conn)?;
    Ok(conn)
}

fn request_context(user: Option<String>, today: Option<NaiveDate>) -> Result<RequestContext> {
    let user = user.context("no user given (pass --user or set CAPTUS_USER)")?;
    let today = today.unwrap_or_else(|| Utc::now().date_naive());
    Ok(RequestContext::new(user, today))
}

/// Current time of day placed on `today`, so a completion made under
/// `--today` is stamped on that day.
fn completion_time(today: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&today.and_time(Utc::now().time()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run one parsed command against an open database connection.
fn dispatch(
    conn: &Connection,
    user: Option<String>,
    today: Option<NaiveDate>,
    command: Command,
) -> Result<()> {
    match command {
        Command::Init => {
            eprintln!("Database ready");
        }

        Command::Show { json } => {
            let ctx = request_context(user, today)?;
            let record = ops::get_streak(conn, &ctx)?;
            if json {
                print_json(&record)?;
            } else {
                print!("{}", output::format_streak(&record));
            }
        }

        Command::Update {
            completed,
            missed,
            json,
        } => {
            let ctx = request_context(user, today)?;
            let has_completed = match (completed, missed) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let record = ops::update_streak(conn, &ctx, has_completed)?;
            if json {
                print_json(&record)?;
            } else {
                print!("{}", output::format_streak(&record));
            }
            eprintln!(
                "Streak for '{}' is {}",
                ctx.user_id, record.current_streak
            );
        }

        Command::Reset => {
            let ctx = request_context(user, today)?;
            ops::reset_streak(conn, &ctx)?;
            eprintln!("Reset streak for '{}'", ctx.user_id);
        }

        Command::Goal { goal } => {
            let ctx = request_context(user, today)?;
            ops::set_daily_goal(conn, &ctx, goal)?;
            eprintln!("Daily goal for '{}' set to {goal}", ctx.user_id);
        }

        Command::Stats { json } => {
            let ctx = request_context(user, today)?;
            let stats = ops::streak_stats(conn, &ctx)?;
            if json {
                print_json(&stats)?;
            } else {
                print!("{}", output::format_stats(&stats));
            }
        }

        Command::Sweep => {
            let today = today.unwrap_or_else(|| Utc::now().date_naive());
            let broken = ops::sweep_broken_streaks(conn, today)?;
            eprintln!("Broke {broken} idle streak(s)");
        }

        Command::Leaderboard { json } => {
            let records = ops::list_streaks(conn)?;
            if json {
                print_json(&records)?;
            } else {
                print!("{}", output::format_leaderboard(&records));
            }
        }

        Command::Validate => {
            let ctx = request_context(user, today)?;
            let record = ops::get_streak(conn, &ctx)?;
            let v = validate::validate(&record);
            print!("{}", output::format_validation(&v));
            if !v.is_valid {
                std::process::exit(1);
            }
        }

        Command::Task { command } => {
            let ctx = request_context(user, today)?;
            dispatch_task(conn, &ctx, command)?;
        }
    }

    Ok(())
}

fn dispatch_task(conn: &Connection, ctx: &RequestContext, command: TaskCommand) -> Result<()> {
    match command {
        TaskCommand::Add { title } => {
            let id = ops::add_task(conn, ctx, &title)?;
            println!("{id}");
            eprintln!("Added task {id}");
        }

        TaskCommand::Done { id } => {
            let record = ops::complete_task(conn, ctx, id, completion_time(ctx.today))?;
            eprintln!(
                "Completed task {id}; streak for '{}' is {}",
                ctx.user_id, record.current_streak
            );
        }

        TaskCommand::Reopen { id } => {
            ops::reopen_task(conn, ctx, id)?;
            eprintln!("Reopened task {id}");
        }

        TaskCommand::List { all, json } => {
            let tasks = ops::list_tasks(conn, ctx, all)?;
            if json {
                print_json(&tasks)?;
            } else {
                print!("{}", output::format_task_list(&tasks));
            }
        }
    }
    Ok(())
}

fn main() {
    setup_logging();
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db)?;
    ensure_db_dir(&db_path)?;
    let conn = open_db(&db_path)?;
    dispatch(&conn, cli.user, cli.today, cli.command)
}
