//! Terminal rendering of controller events and snapshots.

use duet_rs_core::{
    ChatController, ChatEvent, ChatSession, EventMsg, EventSink, Role, SessionId, generating_label,
};
use std::io::{self, Write};

/// Event sink that streams responses to stdout as they arrive.
pub struct TerminalSink;

impl EventSink for TerminalSink {
    fn emit(&self, event: EventMsg) {
        let mut out = io::stdout().lock();
        let _ = match event.payload {
            ChatEvent::TurnStarted { backend, .. } => {
                writeln!(out, "[{}]", generating_label(backend))
            }
            ChatEvent::MessageDelta { delta, .. } => write!(out, "{delta}"),
            ChatEvent::TurnCommitted { .. } => writeln!(out),
            ChatEvent::TurnFailed { message, .. } => writeln!(out, "\nError: {message}"),
            ChatEvent::CapabilityChanged { availability } => {
                writeln!(out, "[on-device model: {availability}]")
            }
            ChatEvent::ConnectivityChanged { online } => {
                writeln!(out, "[{}]", if online { "online" } else { "offline" })
            }
            ChatEvent::SessionsChanged { .. } => Ok(()),
        };
        let _ = out.flush();
    }
}

pub fn print_sessions(sessions: &[ChatSession], active: Option<SessionId>) {
    if sessions.is_empty() {
        println!("no chats");
        return;
    }
    for session in sessions {
        let marker = if Some(session.id) == active { "*" } else { " " };
        let id = session.id.to_string();
        println!(
            "{marker} {}  {}  ({} messages)",
            &id[..8],
            session.title,
            session.messages.len()
        );
    }
}

/// Replay the transcript of a session, e.g. after switching to it.
pub fn print_transcript(session: &ChatSession) {
    println!("== {} ==", session.title);
    for message in &session.messages {
        let speaker = match message.role {
            Role::User => "you",
            _ if message.is_error => "!",
            _ => "assistant",
        };
        println!("{speaker}> {}", message.content());
    }
}

pub fn print_status(controller: &ChatController) {
    let availability = controller
        .capability()
        .map(|availability| availability.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    println!("mode: {}", controller.active_mode_label());
    println!(
        "connectivity: {}",
        if controller.is_online() { "online" } else { "offline" }
    );
    println!(
        "cloud: {}",
        if controller.remote_configured() {
            "configured"
        } else {
            "missing API key"
        }
    );
    println!("on-device model: {availability}");
    if let Some(session) = controller.active_session() {
        println!("active chat: {} ({})", session.title, session.id);
    }
}
