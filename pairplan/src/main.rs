//! `PairPlan` command-line client.
//!
//! Connects to a document store and runs one planner command as the local
//! user. Configuration via CLI flags, environment variables, or config file
//! (`~/.config/pairplan/config.toml`).
//!
//! ```bash
//! # Create a two-person session
//! cargo run --bin pairplan -- create --mode individual
//!
//! # Add a timed task and watch the list converge
//! cargo run --bin pairplan -- add AB12CD --title Gym --weekday 2 --time 18:00
//! cargo run --bin pairplan -- watch AB12CD
//! ```

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use pairplan_proto::task::{Task, TaskId, Weekday};
use tracing_appender::non_blocking::WorkerGuard;

use pairplan::config::{CliArgs, ClientConfig, Command};
use pairplan::identity::LocalIdentity;
use pairplan::notify::RecordingScheduler;
use pairplan::recent::{RECENT_FILE, RecentSessions};
use pairplan::session::{SessionError, SessionEvent, SessionViewModel, TaskDraft};
use pairplan::store::remote::RemoteStore;

type ViewModel = SessionViewModel<Arc<RemoteStore>>;

#[tokio::main]
async fn main() {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!(store = %config.store_url, "pairplan starting");

    let Some(command) = cli.command else {
        eprintln!("No command given. Run with --help for usage.");
        std::process::exit(2);
    };

    if let Err(e) = run(&config, command).await {
        tracing::error!(error = %e, "command failed");
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }
}

/// Initialize file-based logging so stdout stays reserved for command output.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("pairplan.log");
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

async fn run(config: &ClientConfig, command: Command) -> Result<(), SessionError> {
    let state_err = |e: pairplan::state::StateError| SessionError::Validation(e.to_string());
    let identity = LocalIdentity::load_or_create(&config.state_dir).map_err(state_err)?;
    let recent = RecentSessions::load(&config.state_dir.join(RECENT_FILE), config.recent_limit)
        .map_err(state_err)?;
    let store = RemoteStore::connect(
        &config.store_url,
        config.connect_timeout,
        config.request_timeout,
    )
    .await?;

    let (mut vm, mut events) = SessionViewModel::new(
        Arc::new(store),
        identity,
        recent,
        Arc::new(RecordingScheduler::new()),
        config.session_options(),
    );

    match command {
        Command::Create { mode } => {
            let code = vm.create_session(mode.into()).await?;
            println!("{code}");
        }
        Command::Join { code } => {
            let code = vm.join_session(&code).await?;
            println!("Joined {code}");
        }
        Command::Leave { code } => {
            vm.open_session(&code).await?;
            vm.leave_session().await?;
            println!("Left {code}");
        }
        Command::Sessions => {
            for session in vm.load_my_sessions().await? {
                println!(
                    "{}  {:<10}  {} participant(s)",
                    session.code,
                    session.mode,
                    session.participants.len()
                );
            }
        }
        Command::Recent => {
            for code in vm.recent_sessions() {
                println!("{code}");
            }
        }
        Command::Delete { code } => {
            vm.delete_session(&code).await?;
            println!("Deleted {code}");
        }
        Command::Tasks { code } => {
            vm.open_session(&code).await?;
            print_tasks(&vm.tasks());
        }
        Command::Add {
            code,
            title,
            weekday,
            time,
            end,
            task_type,
        } => {
            vm.open_session(&code).await?;
            let mut draft = TaskDraft::new(title, parse_weekday(weekday)?).with_type(task_type.into());
            draft.time = time;
            draft.end_time = end;
            let task = vm.add_task(draft).await?;
            println!("{}", task.id);
        }
        Command::Status {
            code,
            task_id,
            action,
        } => {
            vm.open_session(&code).await?;
            let status = vm
                .apply_status(&TaskId::from_string(task_id), action.into())
                .await?;
            println!("{status}");
        }
        Command::Watch { code } => {
            vm.open_session(&code).await?;
            watch(&vm, &mut events).await;
        }
        Command::Free { code, weekday } => {
            vm.open_session(&code).await?;
            for (start, end) in vm.free_slots(parse_weekday(weekday)?) {
                println!("{start}-{end}");
            }
        }
    }
    Ok(())
}

fn parse_weekday(n: u8) -> Result<Weekday, SessionError> {
    Weekday::from_number(i64::from(n))
        .ok_or_else(|| SessionError::Validation(format!("weekday must be 1-7, got {n}")))
}

async fn watch(vm: &ViewModel, events: &mut tokio::sync::mpsc::Receiver<SessionEvent>) {
    print_tasks(&vm.tasks());
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SessionEvent::TasksUpdated(tasks)) => {
                    println!("---");
                    print_tasks(&tasks);
                }
                Some(SessionEvent::Deleted { code }) => {
                    println!("Session {code} was deleted");
                    break;
                }
                Some(SessionEvent::FeedLost { code }) => {
                    eprintln!("Lost the live connection to session {code}");
                    break;
                }
                Some(_) => {}
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("watch interrupted");
                break;
            }
        }
    }
}

fn print_tasks(tasks: &[Task]) {
    for task in tasks {
        let time = match (task.time, task.end_time) {
            (Some(start), Some(end)) => format!("{start}-{end}"),
            (Some(start), None) => start.to_string(),
            _ => "--:--".to_string(),
        };
        println!(
            "{:<9} {:<11} {:<9} {}  [{}]",
            task.weekday, time, task.status, task.title, task.id
        );
    }
}
