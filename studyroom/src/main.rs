//! `studyroom`: command-line client for shared study-room task boards.
//!
//! One-shot subcommands talk to the task store and print the result;
//! `watch` keeps polling a session and re-renders the board after every
//! change. Configuration via CLI flags, environment variables, or config
//! file (`~/.config/studyroom/config.toml`).
//!
//! ```bash
//! # Offline demo with an in-memory store and a simulated second participant
//! cargo run --bin studyroom -- watch --demo
//!
//! # Against a task store
//! STUDYROOM_TOKEN=f00d cargo run --bin studyroom -- \
//!     --api-url http://127.0.0.1:8000/api watch 0190c6a8-...
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::time::Instant;
use tracing_appender::non_blocking::WorkerGuard;

use studyroom::board::{SessionBoard, ViewPhase};
use studyroom::config::{CliArgs, ClientConfig};
use studyroom::directory::SessionDirectory;
use studyroom::render::{render_board, render_sessions};
use studyroom::store::TaskStore;
use studyroom::store::http::HttpTaskStore;
use studyroom::store::memory::InMemoryTaskStore;
use studyroom_proto::api::AddTaskRequest;
use studyroom_proto::{SessionId, TaskId, User, UserId};

type CliResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser, Debug)]
#[command(version, about = "Shared study-room task board")]
struct Cli {
    #[command(flatten)]
    args: CliArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the authenticated user.
    Whoami,
    /// List your study rooms, newest first.
    Sessions,
    /// Create a study room.
    Create { name: String },
    /// Rename a study room (creator only).
    Rename { session: String, name: String },
    /// Delete a study room and all its tasks (creator only).
    DeleteSession { session: String },
    /// Leave a study room.
    Leave { session: String },
    /// Print a study room's board.
    Tasks { session: String },
    /// Add a task to your list.
    Add {
        session: String,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Flip a task between active and completed.
    Toggle { session: String, task: u64 },
    /// Replace a task's text.
    Edit {
        session: String,
        task: u64,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Delete a task.
    Delete { session: String, task: u64 },
    /// Poll a study room and re-render its board on every change.
    Watch {
        session: Option<String>,
        /// Run against an in-memory store with a simulated second participant.
        #[arg(long)]
        demo: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match ClientConfig::load(&cli.args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Logs go to a file so they never interleave with the rendered board.
    let _log_guard = init_logging(&cli.args.log_level, cli.args.log_file.as_deref());
    tracing::info!("studyroom starting");

    let result = match cli.command {
        Command::Watch { demo: true, .. } => run_demo(&config).await,
        command => match HttpTaskStore::new(&config.http_store()) {
            Ok(store) => run(store, command, &config).await,
            Err(e) => Err(e.into()),
        },
    };

    tracing::info!("studyroom exiting");
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("studyroom.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

async fn run<S>(store: S, command: Command, config: &ClientConfig) -> CliResult
where
    S: TaskStore + 'static,
{
    match command {
        Command::Whoami => {
            let me = store.current_user().await?;
            println!("{} (id {})", me.username, me.id);
        }
        Command::Sessions => {
            let directory = open_directory(store, config).await?;
            print!("{}", render_sessions(&directory.sessions()));
        }
        Command::Create { name } => {
            let me = store.current_user().await?;
            let directory = SessionDirectory::new(store, me.id, config.error_display);
            let session = directory.create(&name).await?;
            println!("created {} ({})", session.name, session.id);
        }
        Command::DeleteSession { session } => {
            let directory = open_directory(store, config).await?;
            directory.delete(&SessionId::new(session)).await?;
            println!("deleted");
        }
        Command::Leave { session } => {
            let directory = open_directory(store, config).await?;
            directory.leave(&SessionId::new(session)).await?;
            println!("left");
        }
        Command::Rename { session, name } => {
            let board = open_board(store, session, config).await?;
            let session = board.rename_session(&name).await?;
            println!("renamed to {}", session.name);
        }
        Command::Tasks { session } => {
            let board = open_board(store, session, config).await?;
            print!("{}", render_board(&board.view()));
        }
        Command::Add { session, text } => {
            let board = open_board(store, session, config).await?;
            let task = board.add_task(&text.join(" "), board.me().id).await?;
            println!("added #{} {}", task.id, task.text);
        }
        Command::Toggle { session, task } => {
            let board = open_board(store, session, config).await?;
            let task = board.toggle_task(TaskId(task)).await?;
            let state = if task.is_done { "completed" } else { "active" };
            println!("#{} is now {state}", task.id);
        }
        Command::Edit {
            session,
            task,
            text,
        } => {
            let board = open_board(store, session, config).await?;
            let task = board.edit_task(TaskId(task), &text.join(" ")).await?;
            println!("#{} {}", task.id, task.text);
        }
        Command::Delete { session, task } => {
            let board = open_board(store, session, config).await?;
            board.delete_task(TaskId(task)).await?;
            println!("deleted #{task}");
        }
        Command::Watch {
            session: Some(session),
            ..
        } => {
            let me = store.current_user().await?;
            watch(store, SessionId::new(session), me, config).await?;
        }
        Command::Watch { session: None, .. } => {
            return Err("watch needs a session id (or --demo)".into());
        }
    }
    Ok(())
}

async fn open_directory<S: TaskStore>(
    store: S,
    config: &ClientConfig,
) -> Result<SessionDirectory<S>, Box<dyn std::error::Error + Send + Sync>> {
    let me = store.current_user().await?;
    let directory = SessionDirectory::new(store, me.id, config.error_display);
    directory.load().await?;
    Ok(directory)
}

async fn open_board<S: TaskStore>(
    store: S,
    session: String,
    config: &ClientConfig,
) -> Result<SessionBoard<S>, Box<dyn std::error::Error + Send + Sync>> {
    let me = store.current_user().await?;
    let board = SessionBoard::new(
        store,
        SessionId::new(session),
        me,
        config.board_settings(),
    );
    board.load_initial().await;
    if let ViewPhase::Errored(message) = board.phase() {
        return Err(message.into());
    }
    Ok(board)
}

async fn watch<S>(store: S, session: SessionId, me: User, config: &ClientConfig) -> CliResult
where
    S: TaskStore + 'static,
{
    let board = Arc::new(SessionBoard::new(
        store,
        session,
        me,
        config.board_settings(),
    ));
    let mut changes = board.subscribe();
    let poller = config.poller().spawn(Arc::clone(&board));

    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                board.expire_errors(Instant::now());
                print!("\x1b[2J\x1b[H{}", render_board(&board.view()));
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    poller.stop().await;
    Ok(())
}

/// Watches a seeded in-memory room while a simulated participant keeps
/// adding and completing tasks.
async fn run_demo(config: &ClientConfig) -> CliResult {
    let me = User::new(UserId(1), "you");
    let store = InMemoryTaskStore::new(me.clone());
    let partner = store.as_user(User::new(UserId(2), "sam"));

    let session = store.create_session("Demo room").await?;
    partner.join_session(&session.id)?;
    store.seed_task(&session.id, me.id, "Review lecture notes", false)?;
    store.seed_task(&session.id, me.id, "Buy flashcards", true)?;
    partner.seed_task(&session.id, partner.user_id(), "Read chapter 3", false)?;

    let simulation = tokio::spawn(simulate_partner(partner, session.id.clone()));
    let result = watch(store, session.id, me, config).await;
    simulation.abort();
    result
}

async fn simulate_partner(store: InMemoryTaskStore, session: SessionId) {
    let mut ticker = tokio::time::interval(Duration::from_secs(4));
    ticker.tick().await;
    let mut round = 1u32;
    loop {
        ticker.tick().await;
        let request = AddTaskRequest {
            text: format!("Practice problem set {round}"),
            user_id: store.user_id(),
        };
        if let Err(e) = store.add_task(&session, &request).await {
            tracing::warn!(error = %e, "demo partner add failed");
        }
        let open = store
            .tasks_snapshot(&session)
            .into_iter()
            .find(|t| t.user == store.user_id() && !t.is_done);
        if let Some(task) = open.filter(|_| round % 2 == 0) {
            if let Err(e) = store
                .update_task(&session, task.id, &task.toggled_patch())
                .await
            {
                tracing::warn!(error = %e, "demo partner toggle failed");
            }
        }
        round += 1;
    }
}
