//! Interactive terminal chat over the Duet core.

mod commands;
mod reachability;
mod render;

use anyhow::Context;
use clap::Parser;
use commands::{HELP, SlashCommand, parse_slash_command, resolve_session};
use duet_rs::config::{ConnectionMode, DuetConfig, LayeredConfigOptions};
use duet_rs::core::{ChatController, Connectivity, EventSink, RejectReason, TurnOutcome};
use log::{debug, info};
use reachability::Reachability;
use render::{TerminalSink, print_sessions, print_status, print_transcript};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

/// Command-line options for the chat client.
#[derive(Parser)]
#[command(name = "duet", version)]
struct Cli {
    /// Optional path to a duet.json5 config file (highest precedence layer)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Connection mode override: cloud, local or auto
    #[arg(long)]
    mode: Option<ConnectionMode>,
    /// Session id to activate on start
    #[arg(long)]
    session: Option<Uuid>,
    /// Start offline and skip the reachability probe
    #[arg(long)]
    offline: bool,
}

/// Whether the loop keeps reading input.
#[derive(PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    duet_rs::init_logging();

    let cli = Cli::parse();
    info!(
        "starting duet (config_set={}, mode={:?}, session_set={}, offline={})",
        cli.config.is_some(),
        cli.mode,
        cli.session.is_some(),
        cli.offline
    );
    let cwd = std::env::current_dir().context("failed to resolve current working directory")?;
    let mut options = LayeredConfigOptions::new(&cwd);
    if let Some(path) = cli.config.as_ref() {
        options = options.with_runtime_path(path);
    }
    let layered =
        DuetConfig::load_layered_with_options(options).context("failed to load layered config")?;
    debug!("layered config loaded (layers={})", layered.layers.len());
    let mut config = layered.config;
    if let Some(mode) = cli.mode {
        config.mode = mode;
    }

    let connectivity = Connectivity::new(!cli.offline);
    let sink: Arc<dyn EventSink> = Arc::new(TerminalSink);
    let controller = Arc::new(
        ChatController::from_config(&config, connectivity, Some(sink))
            .context("failed to initialize chat controller")?,
    );
    controller.start().await;
    if let Some(session_id) = cli.session {
        controller
            .select_session(session_id)
            .with_context(|| format!("failed to open session {session_id}"))?;
    }

    let reachability = Reachability::spawn(controller.clone(), &config.connectivity, cli.offline);

    println!("duet: {} (type /help for commands)", controller.active_mode_label());
    if let Some(session) = controller.active_session() {
        print_transcript(&session);
    }
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt();
    while let Some(line) = lines.next_line().await.context("failed to read input")? {
        match parse_slash_command(&line) {
            Ok(Some(command)) => {
                if run_command(&controller, &reachability, command) == Flow::Quit {
                    break;
                }
            }
            Ok(None) => send(&controller, &line).await,
            Err(message) => eprintln!("{message}"),
        }
        prompt();
    }

    reachability.stop();
    info!("duet exiting");
    Ok(())
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

async fn send(controller: &ChatController, line: &str) {
    match controller.send_message(line).await {
        TurnOutcome::Rejected(RejectReason::EmptyInput) => {}
        TurnOutcome::Rejected(RejectReason::NoActiveSession) => {
            eprintln!("no active chat; use /new to start one");
        }
        TurnOutcome::Rejected(RejectReason::Busy) => {
            eprintln!("still generating the previous response");
        }
        TurnOutcome::Committed { .. } | TurnOutcome::Failed { .. } => {}
    }
}

fn run_command(
    controller: &ChatController,
    reachability: &Reachability,
    command: SlashCommand,
) -> Flow {
    let result = match command {
        SlashCommand::New => {
            let session_id = controller.new_chat();
            println!("started chat {session_id}");
            Ok(())
        }
        SlashCommand::Sessions => {
            print_sessions(&controller.sessions(), controller.active_session_id());
            Ok(())
        }
        SlashCommand::Switch(needle) => resolve_session(&controller.sessions(), &needle)
            .and_then(|session_id| {
                controller
                    .select_session(session_id)
                    .map_err(|err| err.to_string())
            })
            .map(|()| {
                if let Some(session) = controller.active_session() {
                    print_transcript(&session);
                }
            }),
        SlashCommand::Delete(needle) => {
            let target = match needle {
                Some(needle) => resolve_session(&controller.sessions(), &needle),
                None => controller
                    .active_session_id()
                    .ok_or_else(|| "no active chat".to_string()),
            };
            target.map(|session_id| {
                controller.delete_session(session_id);
                println!("deleted chat {session_id}");
            })
        }
        SlashCommand::Rename(title) => controller
            .active_session_id()
            .ok_or_else(|| "no active chat".to_string())
            .and_then(|session_id| {
                controller
                    .rename_session(session_id, &title)
                    .map_err(|err| err.to_string())
            }),
        SlashCommand::Mode(None) => {
            println!("mode: {}", controller.active_mode_label());
            Ok(())
        }
        SlashCommand::Mode(Some(mode)) => {
            controller.set_mode(mode);
            println!("mode: {}", controller.active_mode_label());
            Ok(())
        }
        SlashCommand::Online => {
            reachability.override_online(controller, true);
            Ok(())
        }
        SlashCommand::Offline => {
            reachability.override_online(controller, false);
            Ok(())
        }
        SlashCommand::Status => {
            print_status(controller);
            Ok(())
        }
        SlashCommand::Help => {
            println!("{HELP}");
            Ok(())
        }
        SlashCommand::Quit => return Flow::Quit,
    };
    if let Err(message) = result {
        eprintln!("{message}");
    }
    Flow::Continue
}
