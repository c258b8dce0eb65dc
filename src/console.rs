//! Operator console
//!
//! Reads administrative commands from stdin while the service runs.

use crate::CONSOLE_TARGET;
use crate::dispatcher::Dispatcher;
use crate::logging::log_console;
use crate::punish::Identity;
use crate::stream::EventClass;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

pub const HELP: &str = "commands: announce <target> <message> | dispatch <target> <cmd> | \
quit <consumer> | unban <name|uuid> | consumers | help | stop";

/// A parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Announce { target: String, message: String },
    Dispatch { target: String, cmd: String },
    Quit { name: String },
    Unban { target: Identity },
    Consumers,
    Help,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsoleError {
    #[error("unknown command: {0}")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),
}

/// Parse one console line, `None` for a blank line
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, ConsoleError> {
    let line = line.trim();
    let Some((name, rest)) = split_word(line) else {
        return Ok(None);
    };

    let command = match name.to_lowercase().as_str() {
        "announce" => {
            let (target, message) =
                split_word(rest).ok_or(ConsoleError::Usage("announce <target> <message>"))?;
            if message.is_empty() {
                return Err(ConsoleError::Usage("announce <target> <message>"));
            }
            ConsoleCommand::Announce {
                target: target.to_string(),
                message: message.to_string(),
            }
        }
        "dispatch" => {
            let (target, cmd) =
                split_word(rest).ok_or(ConsoleError::Usage("dispatch <target> <cmd>"))?;
            if cmd.is_empty() {
                return Err(ConsoleError::Usage("dispatch <target> <cmd>"));
            }
            ConsoleCommand::Dispatch {
                target: target.to_string(),
                cmd: cmd.to_string(),
            }
        }
        "quit" => match split_word(rest) {
            Some((name, "")) => ConsoleCommand::Quit {
                name: name.to_string(),
            },
            _ => return Err(ConsoleError::Usage("quit <consumer>")),
        },
        "unban" => match split_word(rest) {
            Some((player, "")) => ConsoleCommand::Unban {
                target: match Uuid::parse_str(player) {
                    Ok(uuid) => Identity::new(uuid.to_string(), ""),
                    Err(_) => Identity::named(player),
                },
            },
            _ => return Err(ConsoleError::Usage("unban <name|uuid>")),
        },
        "consumers" => ConsoleCommand::Consumers,
        "help" => ConsoleCommand::Help,
        "stop" => ConsoleCommand::Stop,
        other => return Err(ConsoleError::Unknown(other.to_string())),
    };

    Ok(Some(command))
}

/// First word and the trimmed remainder
fn split_word(input: &str) -> Option<(&str, &str)> {
    let input = input.trim_start();
    if input.is_empty() {
        return None;
    }
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => Some((word, rest.trim())),
        None => Some((input, "")),
    }
}

/// Run a command and describe the outcome
pub async fn execute(dispatcher: &Dispatcher, command: ConsoleCommand) -> String {
    match command {
        ConsoleCommand::Announce { target, message } => {
            let delivered = dispatcher.announce(&target, &message);
            format!("announce queued for {delivered} consumer(s)")
        }
        ConsoleCommand::Dispatch { target, cmd } => {
            let delivered = dispatcher.dispatch(&target, &cmd);
            format!("dispatch queued for {delivered} consumer(s)")
        }
        ConsoleCommand::Quit { name } => {
            let delivered = dispatcher.quit(&name);
            format!("quit sent to {name} ({delivered} outbox(es))")
        }
        ConsoleCommand::Unban { target } => match dispatcher.unban(target.clone()).await {
            Ok(record) => format!("unbanned {} (punishment {})", record.target, record.id),
            Err(e) => format!("unban failed for {target}: {e}"),
        },
        ConsoleCommand::Consumers => EventClass::ALL
            .iter()
            .map(|class| {
                let names = dispatcher.hub().consumer_names(*class);
                format!("{class}: {} [{}]", names.len(), names.join(", "))
            })
            .collect::<Vec<_>>()
            .join("\n"),
        ConsoleCommand::Help => HELP.to_string(),
        ConsoleCommand::Stop => "stopping".to_string(),
    }
}

/// Read commands from stdin until `stop` or end of input
///
/// A `stop` command is reported through `shutdown`.
pub async fn run(dispatcher: Dispatcher, shutdown: mpsc::Sender<()>) -> Result<(), crate::Error> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Ok(None) => {}
            Ok(Some(ConsoleCommand::Stop)) => {
                log_console("stop requested from console");
                let _ = shutdown.send(()).await;
                break;
            }
            Ok(Some(command)) => log_console(execute(&dispatcher, command).await),
            Err(e) => warn!(target: CONSOLE_TARGET, error = %e, "Invalid console command"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{MemoryGateway, PersistenceGateway, PlayerProfile};
    use crate::punish::{PunishLevel, PunishmentRecord};
    use crate::stream::{ActionPayload, GLOBAL_TARGET, Hub};
    use chrono::Utc;
    use std::sync::Arc;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("   "), Ok(None));
        assert_eq!(
            parse_command("announce GLOBAL Server restarts in 5 minutes"),
            Ok(Some(ConsoleCommand::Announce {
                target: GLOBAL_TARGET.to_string(),
                message: "Server restarts in 5 minutes".to_string(),
            }))
        );
        assert_eq!(
            parse_command("DISPATCH lobby-1   say hi"),
            Ok(Some(ConsoleCommand::Dispatch {
                target: "lobby-1".to_string(),
                cmd: "say hi".to_string(),
            }))
        );
        assert_eq!(
            parse_command("quit lobby-1"),
            Ok(Some(ConsoleCommand::Quit {
                name: "lobby-1".to_string()
            }))
        );
        assert_eq!(parse_command("consumers"), Ok(Some(ConsoleCommand::Consumers)));
        assert_eq!(parse_command("stop"), Ok(Some(ConsoleCommand::Stop)));
    }

    #[test]
    fn test_parse_unban_target() {
        assert_eq!(
            parse_command("unban Steve"),
            Ok(Some(ConsoleCommand::Unban {
                target: Identity::named("Steve")
            }))
        );

        let uuid = "0f8fad5b-d9cb-469f-a165-70867728950e";
        assert_eq!(
            parse_command(&format!("unban {uuid}")),
            Ok(Some(ConsoleCommand::Unban {
                target: Identity::new(uuid, "")
            }))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_command("teleport Steve"),
            Err(ConsoleError::Unknown("teleport".to_string()))
        );
        assert_eq!(
            parse_command("announce GLOBAL"),
            Err(ConsoleError::Usage("announce <target> <message>"))
        );
        assert_eq!(
            parse_command("dispatch"),
            Err(ConsoleError::Usage("dispatch <target> <cmd>"))
        );
        assert_eq!(parse_command("quit a b"), Err(ConsoleError::Usage("quit <consumer>")));
        assert_eq!(parse_command("unban"), Err(ConsoleError::Usage("unban <name|uuid>")));
    }

    #[tokio::test]
    async fn test_execute() {
        let gateway = MemoryGateway::new();
        gateway.upsert_player(PlayerProfile::new("1234", "Steve"));
        let dispatcher = Dispatcher::new(Arc::new(Hub::default()), Arc::new(gateway.clone()));
        let mut lobby = dispatcher.subscribe_action("lobby-1");

        let output = execute(
            &dispatcher,
            ConsoleCommand::Dispatch {
                target: "lobby-1".to_string(),
                cmd: "say hi".to_string(),
            },
        )
        .await;
        assert_eq!(output, "dispatch queued for 1 consumer(s)");
        let event = lobby.next_event().await.unwrap().unwrap();
        assert_eq!(
            event.payload(),
            Some(&ActionPayload::Dispatch {
                cmd: "say hi".to_string()
            })
        );

        let output = execute(&dispatcher, ConsoleCommand::Consumers).await;
        assert_eq!(output, "action: 1 [lobby-1]\nplayer: 0 []\npunish: 0 []");

        let output = execute(
            &dispatcher,
            ConsoleCommand::Unban {
                target: Identity::named("Steve"),
            },
        )
        .await;
        assert!(output.starts_with("unban failed for Steve: player not punished"));

        let ban = PunishmentRecord::new(
            PunishLevel::PermBan,
            "griefing",
            Utc::now(),
            None,
            Identity::new("admin-uuid", "Admin"),
            Identity::new("1234", "Steve"),
        );
        gateway.record_punishment(&ban).await.unwrap();
        let output = execute(
            &dispatcher,
            ConsoleCommand::Unban {
                target: Identity::named("steve"),
            },
        )
        .await;
        assert_eq!(output, format!("unbanned Steve (1234) (punishment {})", ban.id));
    }
}
