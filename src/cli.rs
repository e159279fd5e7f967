use chrono::NaiveDate;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "captus", about = "Daily task-completion streaks")]
pub struct Cli {
    /// Path to the SQLite database [default: ~/.captus/captus.db]
    #[arg(long, env = "CAPTUS_DB", global = true)]
    pub db: Option<String>,

    /// User whose streak to act on
    #[arg(long, env = "CAPTUS_USER", global = true)]
    pub user: Option<String>,

    /// Calendar date to treat as today, YYYY-MM-DD [default: current UTC date]
    #[arg(long, env = "CAPTUS_TODAY", global = true)]
    pub today: Option<NaiveDate>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create database and tables (idempotent)
    Init,

    /// Show the user's streak
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Record today's completion status for the user
    ///
    /// Without --completed or --missed the status is read from the user's
    /// tasks completed today.
    Update {
        /// The user completed at least one task today
        #[arg(long, conflicts_with = "missed")]
        completed: bool,
        /// The user has not completed anything today
        #[arg(long)]
        missed: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Clear the user's streak (keeps the daily goal)
    Reset,

    /// Set the user's daily goal
    Goal {
        /// Tasks per day, at least 1
        #[arg(allow_negative_numbers = true)]
        goal: i64,
    },

    /// Show streak statistics
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Break every streak idle for more than a day
    Sweep,

    /// List all streaks, longest first
    Leaderboard {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Re-check the stored streak record for consistency; exits 1 when invalid
    ///
    /// Records are validated before every write, so a failure here means the
    /// row was changed outside captus.
    Validate,

    /// Manage the user's tasks
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },
}

#[derive(Subcommand)]
pub enum TaskCommand {
    /// Add a task
    Add {
        /// Task title
        title: String,
    },

    /// Mark a task completed and update the streak
    Done {
        /// Task id
        id: i64,
    },

    /// Mark a completed task as open again
    Reopen {
        /// Task id
        id: i64,
    },

    /// List the user's tasks
    List {
        /// Include completed tasks
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
