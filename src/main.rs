//! ticket CLI - a local ticket/subtask workflow engine.

use clap::Parser;
use std::env;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::Ordering;
use std::time::Instant;
use ticketbook::action_log;
use ticketbook::cli::{
    Cli, Commands, ConfigCommands, KeyCommands, SubtaskCommands, SummaryCommands,
};
use ticketbook::commands::{self, Output, SubtaskChange};
use ticketbook::config::{ConfigOverrides, OutputFormat, ResolvedConfig, resolve_config};
use ticketbook::runner::ProcessExecutor;
use ticketbook::storage::find_project_root;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the diagnostic log filter.
const LOG_ENV: &str = "TICKET_LOG";

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let human_flag = cli.human_readable;

    // Determine repo path: --repo flag > TICKET_REPO env > project root detection > cwd
    let repo_path = resolve_repo_path(cli.repo_path, human_flag);

    let mut overrides = ConfigOverrides::new();
    if let Some(db) = cli.db_path {
        overrides = overrides.with_store_path(db);
    }
    if let Some(secs) = cli.timeout_secs {
        overrides = overrides.with_test_timeout_secs(secs);
    }
    if human_flag {
        overrides = overrides.with_output_format(OutputFormat::Human);
    }
    let config = match resolve_config(&repo_path, &overrides) {
        Ok(config) => config,
        Err(e) => exit_with_error(&e.to_string(), human_flag),
    };
    let human = config.output_format() == OutputFormat::Human;

    // Serialize command for the audit trail
    let audit = serialize_command(&cli.command);

    let start = Instant::now();
    let result = run_command(cli.command, &config, human);
    let duration = start.elapsed().as_millis() as u64;

    if let Some((cmd_name, args_json)) = audit {
        let ticket_id = args_json
            .get("ticket_id")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let (success, error) = match &result {
            Ok(code) => (*code == 0, None),
            Err(e) => (false, Some(e.to_string())),
        };
        action_log::log_command(
            config.store_path(),
            ticket_id.as_deref(),
            &cmd_name,
            args_json,
            success,
            error,
            duration,
        );
    }

    match result {
        Ok(0) => {}
        Ok(code) => process::exit(code),
        Err(e) => exit_with_error(&e.to_string(), human),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn exit_with_error(message: &str, human: bool) -> ! {
    if human {
        eprintln!("Error: {}", message);
    } else {
        eprintln!("{}", serde_json::json!({ "error": message }));
    }
    process::exit(1);
}

/// Resolve the project root based on explicit flag, environment variable, or auto-detection.
///
/// When an explicit path is provided (via -C/--repo or TICKET_REPO), it is used literally.
/// Otherwise the nearest ancestor holding a `tickets/` store or config (or a `.git`
/// directory) is used, falling back to the current directory.
fn resolve_repo_path(explicit_path: Option<PathBuf>, human: bool) -> PathBuf {
    match explicit_path {
        Some(path) => {
            if !path.exists() {
                exit_with_error(
                    &format!("Specified repo path does not exist: {}", path.display()),
                    human,
                );
            }
            path
        }
        None => {
            let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            find_project_root(&cwd).unwrap_or(cwd)
        }
    }
}

/// Test executor isolating each run in a child process; Ctrl-C cancels it.
fn process_executor(config: &ResolvedConfig) -> Result<ProcessExecutor, ticketbook::Error> {
    let executor = ProcessExecutor::new(config.store_path(), &config.repo, config.test_timeout())?;
    let cancel = executor.cancel_flag();
    if let Err(e) = ctrlc::set_handler(move || cancel.store(true, Ordering::SeqCst)) {
        warn!(error = %e, "could not install Ctrl-C handler");
    }
    Ok(executor)
}

/// Run a command and return the process exit code.
fn run_command(
    command: Commands,
    config: &ResolvedConfig,
    human: bool,
) -> Result<i32, ticketbook::Error> {
    let store = config.store_path();
    match command {
        Commands::Add { id } => output(&commands::ticket_add(store, &id)?, human),
        Commands::Start { id } => output(&commands::ticket_start(store, &id)?, human),
        Commands::List => output(&commands::ticket_list(store)?, human),
        Commands::Validate { id } => output(&commands::ticket_validate(store, &id)?, human),
        Commands::Upsert { file } => {
            output(&commands::ticket_upsert(store, file.as_deref())?, human)
        }
        Commands::Subtask { command } => run_subtask_command(command, config, human)?,
        Commands::Next { id } => {
            let executor = process_executor(config)?;
            // A failing test is recorded data, not a command failure
            output(&commands::next(store, id.as_deref(), &executor)?, human);
        }
        Commands::Test { id } => {
            let executor = process_executor(config)?;
            let result = commands::ticket_test(store, &id, &executor)?;
            output(&result, human);
            if !result.run.passed {
                return Ok(1);
            }
        }
        Commands::Done { summary } => {
            output(&commands::ticket_done(store, summary.as_deref())?, human)
        }
        Commands::Delete { id } => output(&commands::ticket_delete(store, &id)?, human),
        Commands::Summary { command } => match command {
            None => output(&commands::summary_list(store)?, human),
            Some(SummaryCommands::Add { content }) => {
                output(&commands::summary_add(store, &content.join(" "))?, human)
            }
        },
        Commands::Search { query } => output(&commands::search(store, &query)?, human),
        Commands::Log { message } => {
            output(&commands::log_append(store, "log", &message.join(" "), None)?, human)
        }
        Commands::Ask { subtask, question } => output(
            &commands::log_append(store, "question", &question.join(" "), subtask.as_deref())?,
            human,
        ),
        Commands::Ack { message } => {
            output(&commands::ack(store, &message.join(" "))?, human)
        }
        Commands::Logs { id } => output(&commands::logs(store, id.as_deref())?, human),
        Commands::Key {
            command,
            name,
            password,
        } => match command {
            Some(KeyCommands::Add {
                name,
                value,
                password,
            }) => output(&commands::key_add(store, &name, &value, &password)?, human),
            Some(KeyCommands::List) => output(&commands::key_list(store)?, human),
            Some(KeyCommands::Rm { name }) => output(&commands::key_remove(store, &name)?, human),
            None => match (name, password) {
                (Some(name), Some(password)) => {
                    output(&commands::key_lease(store, &name, &password)?, human)
                }
                _ => {
                    return Err(ticketbook::Error::InvalidInput(
                        "usage: ticket key <name> <password>".to_string(),
                    ));
                }
            },
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show => output(&commands::config_show(config), human),
        },
        Commands::Harness { ticket_id, subtask } => {
            let run = commands::harness(&ticket_id, subtask.as_deref())?;
            print!("{}", run.output);
            return Ok(if run.passed { 0 } else { 1 });
        }
    }

    Ok(0)
}

fn run_subtask_command(
    command: SubtaskCommands,
    config: &ResolvedConfig,
    human: bool,
) -> Result<(), ticketbook::Error> {
    let store = config.store_path();
    match command {
        SubtaskCommands::List { id } => output(&commands::subtask_list(store, &id)?, human),
        SubtaskCommands::Done { id, subtask } => output(
            &commands::subtask_update(store, &id, &subtask, SubtaskChange::Done)?,
            human,
        ),
        SubtaskCommands::Failed { id, subtask, note } => output(
            &commands::subtask_update(store, &id, &subtask, SubtaskChange::Failed { note })?,
            human,
        ),
        SubtaskCommands::Note { id, subtask, note } => output(
            &commands::subtask_update(store, &id, &subtask, SubtaskChange::Note(note.join(" ")))?,
            human,
        ),
        SubtaskCommands::Status {
            id,
            subtask,
            status,
            clear_timestamps,
        } => output(
            &commands::subtask_update(
                store,
                &id,
                &subtask,
                SubtaskChange::Status {
                    status,
                    clear_timestamps,
                },
            )?,
            human,
        ),
        SubtaskCommands::Test { id, subtask } => {
            let executor = process_executor(config)?;
            let result = commands::subtask_test(store, &id, &subtask, &executor)?;
            output(&result, human);
            if !result.step.passed {
                return Err(ticketbook::Error::Execution(format!(
                    "subtask {} failed",
                    result.step.subtask
                )));
            }
        }
    }
    Ok(())
}

/// Print output in JSON or human-readable format.
fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}

/// Name and arguments of a ticket-scoped command, for the audit trail.
///
/// Secrets never appear here: vault commands are not audited.
fn serialize_command(command: &Commands) -> Option<(String, serde_json::Value)> {
    match command {
        Commands::Add { id } => Some(("add".to_string(), serde_json::json!({ "ticket_id": id }))),
        Commands::Start { id } => {
            Some(("start".to_string(), serde_json::json!({ "ticket_id": id })))
        }
        Commands::Validate { id } => {
            Some(("validate".to_string(), serde_json::json!({ "ticket_id": id })))
        }
        Commands::Next { id } => Some(("next".to_string(), serde_json::json!({ "ticket_id": id }))),
        Commands::Test { id } => Some(("test".to_string(), serde_json::json!({ "ticket_id": id }))),
        Commands::Done { summary } => Some((
            "done".to_string(),
            serde_json::json!({ "summary": summary }),
        )),
        Commands::Summary {
            command: Some(SummaryCommands::Add { content }),
        } => Some((
            "summary add".to_string(),
            serde_json::json!({ "content": content.join(" ") }),
        )),
        Commands::Subtask { command } => Some(match command {
            SubtaskCommands::List { id } => (
                "subtask list".to_string(),
                serde_json::json!({ "ticket_id": id }),
            ),
            SubtaskCommands::Done { id, subtask } => (
                "subtask done".to_string(),
                serde_json::json!({ "ticket_id": id, "subtask": subtask }),
            ),
            SubtaskCommands::Failed { id, subtask, note } => (
                "subtask failed".to_string(),
                serde_json::json!({ "ticket_id": id, "subtask": subtask, "note": note }),
            ),
            SubtaskCommands::Note { id, subtask, note } => (
                "subtask note".to_string(),
                serde_json::json!({ "ticket_id": id, "subtask": subtask, "note": note.join(" ") }),
            ),
            SubtaskCommands::Test { id, subtask } => (
                "subtask test".to_string(),
                serde_json::json!({ "ticket_id": id, "subtask": subtask }),
            ),
            SubtaskCommands::Status {
                id,
                subtask,
                status,
                clear_timestamps,
            } => (
                "subtask status".to_string(),
                serde_json::json!({
                    "ticket_id": id,
                    "subtask": subtask,
                    "status": status,
                    "clear_timestamps": clear_timestamps,
                }),
            ),
        }),
        _ => None,
    }
}
