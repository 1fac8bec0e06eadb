//! Line-oriented terminal driver.
//!
//! Plain lines go to `chat`; lines starting with `/` are commands. Results
//! are printed as JSON on stdout, logs go to stderr.

use serde::Serialize;
use serde_json::Map;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use convo_engine::adapters::telemetry::TracingTelemetry;
use convo_engine::application::IntegrationAdapter;
use convo_engine::config::{EngineConfig, LoggingConfig};
use convo_engine::domain::conversation::ThreadMetadata;
use convo_engine::domain::foundation::{InteractionId, ThreadId};
use convo_engine::ports::{CommandContext, EngineError};

const DEFAULT_HISTORY_LIMIT: usize = 10;

const HELP: &str = "\
commands:
  <message>              chat in the current thread
  /explain <command>     explain a shell command
  /suggest <task>        suggest a command for a task
  /new                   start a new thread
  /switch <thread-id>    switch to an existing thread
  /threads               list threads
  /history [n]           show recent interactions
  /travel <id>           rewind the current thread to an interaction
  /checkpoint            checkpoint the current thread
  /debug                 engine state
  /health                probe the active provider
  /quit                  exit";

#[tokio::main]
async fn main() -> ExitCode {
    let config = match EngineConfig::load_validated() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_logging(&config.logging);

    let adapter = match IntegrationAdapter::from_config(config, Arc::new(TracingTelemetry)).await {
        Ok(adapter) => adapter,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };
    if adapter.is_fallback() {
        eprintln!("running in fallback mode; see /debug");
    }
    eprintln!("{HELP}");

    let context = command_context();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read stdin");
                return ExitCode::FAILURE;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        if let Err(e) = dispatch(&adapter, &context, line).await {
            print_json(&ErrorOutput {
                error: e.to_string(),
            });
        }
    }
    ExitCode::SUCCESS
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn command_context() -> CommandContext {
    CommandContext {
        platform: Some(std::env::consts::OS.to_string()),
        working_directory: std::env::current_dir()
            .ok()
            .map(|dir| dir.display().to_string()),
        ..CommandContext::default()
    }
}

#[derive(Serialize)]
struct ErrorOutput {
    error: String,
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!(error = %e, "Failed to serialize output"),
    }
}

fn parse_thread_id(arg: &str) -> Result<ThreadId, EngineError> {
    arg.parse::<ThreadId>()
        .map_err(|_| EngineError::InvalidRequest(format!("not a thread id: {arg}")))
}

fn parse_number(arg: &str, what: &str) -> Result<u64, EngineError> {
    arg.parse::<u64>()
        .map_err(|_| EngineError::InvalidRequest(format!("not a valid {what}: {arg}")))
}

async fn dispatch(
    adapter: &IntegrationAdapter,
    context: &CommandContext,
    line: &str,
) -> Result<(), EngineError> {
    let Some(command) = line.strip_prefix('/') else {
        print_json(&adapter.chat(line, None).await?);
        return Ok(());
    };
    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };

    match name {
        "explain" if !arg.is_empty() => print_json(&adapter.explain_command(arg, context).await?),
        "suggest" if !arg.is_empty() => print_json(&adapter.suggest_command(arg, context).await?),
        "new" => print_json(&adapter.create_new_thread(ThreadMetadata::new()).await?),
        "switch" => print_json(&adapter.switch_thread(parse_thread_id(arg)?).await?),
        "threads" => print_json(&adapter.list_threads().await?),
        "history" => {
            let limit = if arg.is_empty() {
                DEFAULT_HISTORY_LIMIT
            } else {
                parse_number(arg, "limit")? as usize
            };
            print_json(&adapter.conversation_history(limit).await?)
        }
        "travel" => {
            let id = InteractionId::new(parse_number(arg, "interaction id")?);
            print_json(&adapter.time_travel(id).await?)
        }
        "checkpoint" => print_json(&adapter.create_checkpoint(Map::new()).await?),
        "debug" => print_json(&adapter.debug_info().await),
        "health" => print_json(&adapter.health_check().await),
        _ => eprintln!("{HELP}"),
    }
    Ok(())
}
