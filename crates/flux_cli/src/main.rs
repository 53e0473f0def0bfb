//! Command-line front end for the Flux planner core.
//!
//! # Responsibility
//! - Inspect and edit the weekly task forest and the goal list from a shell.
//! - Read configuration from `FLUX_*` environment variables.

use clap::{Parser, Subcommand};
use flux_core::planner::tree::TaskNode;
use flux_core::repo::share_connection;
use flux_core::service::goal_service::{
    CreateGoalRequest, DeleteGoalRequest, GoalService, PatchGoalRequest,
};
use flux_core::service::task_service::{
    CreateTaskRequest, DeleteTaskRequest, PatchTaskRequest, TaskService,
};
use flux_core::week::{current_week_dates, format_week_range, short_day_name};
use flux_core::{
    init_logging_from_config, open_db, OpenSessionGuard, Planner, PlannerConfig, SessionGuard,
    SqliteGoalStore, SqliteTaskStore,
};
use log::info;
use std::error::Error;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "flux")]
#[command(version, about = "Weekly task and goal planner")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the task forest of a week, or of one day.
    Tree {
        /// Weeks from the current week; negative for past weeks.
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        week: i32,
        /// Day index, 0 = Sunday.
        #[arg(long)]
        day: Option<u8>,
    },
    /// Add a task, or a subtask with `--parent`.
    Add {
        content: String,
        #[arg(long, required_unless_present = "parent")]
        day: Option<i64>,
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        week: i32,
        #[arg(long)]
        parent: Option<Uuid>,
    },
    /// Mark a task completed, or open again with `--undo`.
    Done {
        id: Uuid,
        #[arg(long)]
        undo: bool,
    },
    /// Delete a task and its subtasks.
    Rm { id: Uuid },
    /// Manage goals.
    Goals {
        #[command(subcommand)]
        command: Option<GoalCommand>,
    },
}

#[derive(Subcommand)]
enum GoalCommand {
    List,
    Add { content: String },
    Done { id: Uuid },
    Rm { id: Uuid },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(err) = run(args).await {
        eprintln!("flux: {err}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = PlannerConfig::from_env()?;
    init_logging_from_config(&config)?;
    info!(
        "event=cli_start module=cli status=ok version={}",
        flux_core::core_version()
    );

    let conn = share_connection(open_db(&config.db_path)?)?;
    let guard: Arc<dyn SessionGuard> = Arc::new(OpenSessionGuard);
    let tasks = TaskService::new(
        SqliteTaskStore::with_shared(Arc::clone(&conn)),
        Arc::clone(&guard),
    );

    match args.command {
        Command::Tree { week, day } => {
            let store = Arc::new(SqliteTaskStore::with_shared(conn));
            let (planner, _notices) = Planner::new(store, guard, &config);
            planner.load_week(week).await?;
            let dates = current_week_dates(week);
            println!("Week {week} ({})", format_week_range(&dates));
            match day {
                Some(day) => {
                    let forest = planner.day_tree(day)?;
                    let label = dates[usize::from(day)].format("%b %-d").to_string();
                    print_day(day, &label, &forest);
                }
                None => {
                    for (day, forest) in planner.week_tree().iter().enumerate() {
                        let label = dates[day].format("%b %-d").to_string();
                        print_day(day as u8, &label, forest);
                    }
                }
            }
        }
        Command::Add {
            content,
            day,
            week,
            parent,
        } => {
            let request = CreateTaskRequest {
                content: Some(content),
                day_of_week: day,
                week_offset: week,
                parent_task_id: parent,
            };
            let task = tasks.create(None, &request).await?;
            println!("{}", task.id);
        }
        Command::Done { id, undo } => {
            let request = PatchTaskRequest {
                id: Some(id),
                completed: Some(!undo),
                ..PatchTaskRequest::default()
            };
            tasks.patch(None, &request).await?;
        }
        Command::Rm { id } => {
            tasks.delete(None, &DeleteTaskRequest { id: Some(id) }).await?;
        }
        Command::Goals { command } => {
            let goals = GoalService::new(SqliteGoalStore::with_shared(conn), guard);
            match command.unwrap_or(GoalCommand::List) {
                GoalCommand::List => {
                    for goal in goals.list(None).await? {
                        println!("{} {}  {}", checkbox(goal.completed), goal.content, goal.id);
                    }
                }
                GoalCommand::Add { content } => {
                    let request = CreateGoalRequest {
                        content: Some(content),
                    };
                    println!("{}", goals.create(None, &request).await?.id);
                }
                GoalCommand::Done { id } => {
                    let request = PatchGoalRequest {
                        id: Some(id),
                        completed: Some(true),
                        ..PatchGoalRequest::default()
                    };
                    goals.patch(None, &request).await?;
                }
                GoalCommand::Rm { id } => {
                    goals.delete(None, &DeleteGoalRequest { id: Some(id) }).await?;
                }
            }
        }
    }
    Ok(())
}

fn print_day(day: u8, date_label: &str, forest: &[TaskNode]) {
    println!("{} {date_label}", short_day_name(day));
    print_nodes(forest, 1);
}

fn print_nodes(nodes: &[TaskNode], depth: usize) {
    for node in nodes {
        println!(
            "{}{} {}  {}",
            "  ".repeat(depth),
            checkbox(node.task.completed),
            node.task.content,
            node.task.id
        );
        print_nodes(&node.subtasks, depth + 1);
    }
}

fn checkbox(completed: bool) -> &'static str {
    if completed {
        "[x]"
    } else {
        "[ ]"
    }
}
