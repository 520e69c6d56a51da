//! Slash commands accepted by the interactive loop.

use duet_rs_core::{ChatSession, ConnectionMode, SessionId};

/// Supported slash commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    New,
    Sessions,
    /// Activate a session by id or unique id prefix.
    Switch(String),
    /// Delete a session, or the active one when no id is given.
    Delete(Option<String>),
    Rename(String),
    /// Show or change the connection mode.
    Mode(Option<ConnectionMode>),
    Online,
    Offline,
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
/new                      start a new chat
/sessions                 list chats
/switch <id>              activate a chat (id prefix is enough)
/delete [id]              delete a chat (default: the active one)
/rename <title>           rename the active chat
/mode [cloud|local|auto]  show or change the connection mode
/online, /offline         override the connectivity signal
/status                   show mode, connectivity and model availability
/quit                     exit";

/// Parse a slash command from the input line.
///
/// Returns `Ok(None)` for plain chat input.
pub fn parse_slash_command(input: &str) -> Result<Option<SlashCommand>, String> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return Ok(None);
    }
    let body = trimmed.trim_start_matches('/');
    let (command, rest) = match body.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (body, ""),
    };
    let argument = (!rest.is_empty()).then(|| rest.to_string());
    match command.to_lowercase().as_str() {
        "new" => Ok(Some(SlashCommand::New)),
        "sessions" | "list" => Ok(Some(SlashCommand::Sessions)),
        "switch" => argument
            .map(|id| Some(SlashCommand::Switch(id)))
            .ok_or_else(|| "usage: /switch <session_id>".to_string()),
        "delete" => Ok(Some(SlashCommand::Delete(argument))),
        "rename" => argument
            .map(|title| Some(SlashCommand::Rename(title)))
            .ok_or_else(|| "usage: /rename <title>".to_string()),
        "mode" => match argument {
            None => Ok(Some(SlashCommand::Mode(None))),
            Some(value) => value
                .parse::<ConnectionMode>()
                .map(|mode| Some(SlashCommand::Mode(Some(mode)))),
        },
        "online" => Ok(Some(SlashCommand::Online)),
        "offline" => Ok(Some(SlashCommand::Offline)),
        "status" => Ok(Some(SlashCommand::Status)),
        "help" | "?" => Ok(Some(SlashCommand::Help)),
        "quit" | "exit" => Ok(Some(SlashCommand::Quit)),
        _ => Err(format!("unknown command: /{command} (try /help)")),
    }
}

/// Resolve a full session id or a unique id prefix.
pub fn resolve_session(sessions: &[ChatSession], needle: &str) -> Result<SessionId, String> {
    let needle = needle.trim().to_lowercase();
    let matches: Vec<SessionId> = sessions
        .iter()
        .map(|session| session.id)
        .filter(|id| id.to_string().starts_with(&needle))
        .collect();
    match matches.as_slice() {
        [id] => Ok(*id),
        [] => Err(format!("no session matches {needle}")),
        _ => Err(format!("session prefix {needle} is ambiguous")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn plain_input_is_not_a_command() {
        assert_eq!(parse_slash_command("hello there"), Ok(None));
    }

    #[test]
    fn parses_commands_with_arguments() {
        assert_eq!(
            parse_slash_command("/rename  Trip to Lisbon "),
            Ok(Some(SlashCommand::Rename("Trip to Lisbon".to_string())))
        );
        assert_eq!(
            parse_slash_command("/mode offline"),
            Ok(Some(SlashCommand::Mode(Some(ConnectionMode::Local))))
        );
        assert_eq!(
            parse_slash_command("/MODE"),
            Ok(Some(SlashCommand::Mode(None)))
        );
        assert_eq!(
            parse_slash_command("/delete"),
            Ok(Some(SlashCommand::Delete(None)))
        );
        assert_eq!(
            parse_slash_command("/switch 1a2b"),
            Ok(Some(SlashCommand::Switch("1a2b".to_string())))
        );
    }

    #[test]
    fn reports_usage_and_unknown_commands() {
        assert!(parse_slash_command("/switch").is_err());
        assert!(parse_slash_command("/rename   ").is_err());
        assert!(parse_slash_command("/mode turbo").is_err());
        assert_eq!(
            parse_slash_command("/teleport"),
            Err("unknown command: /teleport (try /help)".to_string())
        );
    }

    #[test]
    fn resolves_unique_prefixes() {
        let first = ChatSession::new(1);
        let second = ChatSession::new(2);
        let sessions = vec![first.clone(), second.clone()];
        let full = first.id.to_string();
        assert_eq!(resolve_session(&sessions, &full), Ok(first.id));
        assert!(resolve_session(&sessions, "").is_err());
        assert!(resolve_session(&sessions, "not-a-prefix").is_err());
    }
}
