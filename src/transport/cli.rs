//! CLI transport for direct terminal interaction

use anyhow::{Context, Result};
use colored::Colorize;
use std::io::Write;
use std::sync::Arc;
use tabled::{settings::Style, Table, Tabled};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::config::Config;
use crate::core::{
    ConnectionError, ConnectionState, Identity, Message, MessageLog, NotesObserver,
    PendingProposal, Resolution, Role,
};
use crate::session::{SessionController, SessionEvent};

use super::http::{HttpNotesApi, Note};
use super::ws::WsConnector;

/// Refreshes the notes list after the assistant created a note
struct NotesRefresher {
    api: Arc<HttpNotesApi>,
}

impl NotesObserver for NotesRefresher {
    fn notes_changed(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no runtime to refresh notes on");
            return;
        };
        let api = Arc::clone(&self.api);
        runtime.spawn(async move {
            match api.list_notes().await {
                Ok(notes) => print_notes(&notes),
                Err(e) => tracing::error!("Error fetching notes: {:#}", e),
            }
        });
    }
}

/// What a line of input asks for
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Send(String),
    Decide(bool),
    Dismiss,
    Clear,
    SwitchUser(Identity),
    Reconnect,
    Quit,
    Help,
    Invalid(String),
}

impl Input {
    /// Parse one line; `deciding` makes bare y/n answers count as decisions
    fn parse(line: &str, deciding: bool) -> Self {
        let line = line.trim();
        if deciding {
            match line.to_lowercase().as_str() {
                "y" | "yes" => return Self::Decide(true),
                "n" | "no" => return Self::Decide(false),
                _ => {}
            }
        }

        let Some(command) = line.strip_prefix('/') else {
            return Self::Send(line.to_string());
        };
        let mut parts = command.split_whitespace();
        match parts.next().unwrap_or_default() {
            "yes" => Self::Decide(true),
            "no" => Self::Decide(false),
            "dismiss" => Self::Dismiss,
            "clear" => Self::Clear,
            "reconnect" => Self::Reconnect,
            "quit" | "exit" => Self::Quit,
            "help" => Self::Help,
            "user" => match (parts.next(), parts.next()) {
                (Some(user), Some(token)) => Self::SwitchUser(Identity::new(user, token)),
                _ => Self::Invalid("usage: /user <id> <token>".to_string()),
            },
            other => Self::Invalid(format!("unknown command: /{}", other)),
        }
    }
}

/// Incrementally prints the message log as snapshots arrive
#[derive(Debug, Default)]
struct Transcript {
    /// Entries already printed in full
    printed: usize,
    /// Streaming text already on screen
    streamed: String,
    /// Cursor sits after streamed text with no newline yet
    line_open: bool,
}

impl Transcript {
    fn render(&mut self, log: &MessageLog) {
        if log.len() < self.printed || log.is_empty() {
            self.end_line();
            self.printed = 0;
            self.streamed.clear();
        }

        for message in log.iter().skip(self.printed) {
            if message.is_streaming() {
                if self.streamed.is_empty() {
                    self.end_line();
                    print!("{} ", "assistant>".cyan().bold());
                }
                let rest = message
                    .content
                    .strip_prefix(self.streamed.as_str())
                    .unwrap_or(&message.content);
                print!("{}", rest);
                let _ = std::io::stdout().flush();
                self.streamed = message.content.clone();
                self.line_open = true;
                return;
            }

            if self.streamed.is_empty() {
                self.end_line();
                print_message(message);
            } else {
                // The stream was replaced by its final text, or sealed
                match message.content.strip_prefix(self.streamed.as_str()) {
                    Some(rest) if self.line_open => println!("{}", rest),
                    _ => {
                        self.end_line();
                        print_message(message);
                    }
                }
                self.line_open = false;
                self.streamed.clear();
            }
            self.printed += 1;
        }
    }

    fn end_line(&mut self) {
        if self.line_open {
            println!();
            self.line_open = false;
        }
    }
}

fn print_message(message: &Message) {
    let label = format!("{}>", message.role.label());
    let prefix = match message.role {
        Role::User => label.green().bold(),
        Role::Assistant => label.cyan().bold(),
        Role::Error => label.red().bold(),
    };
    println!("{} {}", prefix, message.content);
}

fn print_proposal(proposal: &PendingProposal) {
    println!();
    println!("{}", "=== NOTE PROPOSAL ===".bold().yellow());
    match &proposal.suggestion {
        Some(suggestion) => {
            println!("  {} {}", "Title:".bold(), suggestion.display_title());
            println!("  {} {}", "Description:".bold(), suggestion.display_description());
            println!("  {} {}", "Reminder:".bold(), suggestion.display_reminder());
        }
        None => println!("  {}", proposal.fallback_text()),
    }
    println!("Create this note? [y/n] ({} to close)", "/dismiss".dimmed());
}

fn print_notes(notes: &[Note]) {
    #[derive(Tabled)]
    struct NoteRow {
        #[tabled(rename = "Title")]
        title: String,
        #[tabled(rename = "Text")]
        text: String,
        #[tabled(rename = "Created")]
        created: String,
    }

    println!("\n{}", "=== NOTES ===".bold().cyan());
    if notes.is_empty() {
        println!("No notes yet.");
        return;
    }

    let rows: Vec<NoteRow> = notes
        .iter()
        .map(|note| NoteRow {
            title: note.title.clone(),
            text: note.text.clone(),
            created: note
                .created_at
                .map(|at| at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", table);
}

fn print_help() {
    println!("{}", "Commands:".bold());
    println!("  {}            accept the pending note", "/yes".green());
    println!("  {}             decline the pending note", "/no".green());
    println!("  {}        close the proposal without choosing", "/dismiss".green());
    println!("  {}          clear the conversation", "/clear".green());
    println!("  {} switch user", "/user <id> <token>".green());
    println!("  {}      reopen a dropped connection", "/reconnect".green());
    println!("  {}           exit", "/quit".green());
}

fn render_event(transcript: &mut Transcript, event: SessionEvent) {
    match event {
        SessionEvent::LogChanged(log) => transcript.render(&log),
        SessionEvent::ProposalPresented(proposal) => {
            transcript.end_line();
            print_proposal(&proposal);
        }
        SessionEvent::ProposalCleared => {}
        SessionEvent::TurnEnded => transcript.end_line(),
        SessionEvent::ConnectionChanged(state) => {
            let label = match state {
                ConnectionState::Open => state.as_str().green(),
                ConnectionState::Closed => state.as_str().red(),
                _ => state.as_str().yellow(),
            };
            println!("{} {}", "connection:".dimmed(), label);
        }
        SessionEvent::Notice(text) => {
            transcript.end_line();
            eprintln!("{} {}", "notice:".yellow(), text);
        }
    }
}

/// Act on one line of input; returns `false` when the user wants to leave
async fn handle_input(controller: &mut SessionController, line: &str) -> bool {
    if line.trim().is_empty() {
        return true;
    }

    let outcome = match Input::parse(line, controller.awaiting_decision()) {
        Input::Quit => return false,
        Input::Help => {
            print_help();
            Ok(())
        }
        Input::Invalid(reason) => {
            eprintln!("{} {}", "error:".red(), reason);
            Ok(())
        }
        Input::Send(text) => controller.send_user_message(&text),
        Input::Decide(accepted) => controller.resolve(accepted).await.map(report_resolution),
        Input::Dismiss => controller.dismiss_proposal().await.map(report_resolution),
        Input::Clear => controller.clear().await.map(|()| println!("Conversation cleared.")),
        Input::SwitchUser(identity) => {
            controller.set_identity(identity);
            Ok(())
        }
        Input::Reconnect => match controller.identity().cloned() {
            Some(identity) => {
                controller.set_identity(identity);
                Ok(())
            }
            None => Err(ConnectionError::NoIdentity.into()),
        },
    };

    if let Err(e) = outcome {
        eprintln!("{} {}", "error:".red(), e);
        if e.is_degraded() {
            eprintln!("{}", "Chat is disconnected; use /reconnect to open it again.".dimmed());
        }
    }
    true
}

fn report_resolution(resolution: Resolution) {
    match resolution {
        Resolution::Accepted => println!("{} Note confirmed.", "✓".green()),
        Resolution::Declined => println!("Note declined."),
        Resolution::NothingPending => println!("{}", "No proposal is pending.".dimmed()),
    }
}

/// Run the interactive chat client for `identity`
pub async fn run_chat(config: Config, identity: Identity) -> Result<()> {
    let api = Arc::new(HttpNotesApi::new(config.server.clone())?);
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();

    let (controller, mut inbound) = SessionController::new(
        Arc::new(WsConnector::new()),
        api.clone(),
        config,
        events_tx,
    );
    let mut controller = controller.with_notes_observer(Arc::new(NotesRefresher { api }));

    println!("{}", "notechat".bold().cyan());
    println!("Type a message to chat, {} for commands\n", "/help".green());

    controller.set_identity(identity);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut transcript = Transcript::default();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read input")? else {
                    break;
                };
                if !handle_input(&mut controller, &line).await {
                    break;
                }
            }
            Some(envelope) = inbound.recv() => controller.handle_connection_event(envelope),
            Some(event) = events_rx.recv() => render_event(&mut transcript, event),
        }
    }

    controller.sign_out();
    println!("Goodbye!");
    Ok(())
}

/// Print the notes collection once
pub async fn run_notes(config: Config) -> Result<()> {
    let api = HttpNotesApi::new(config.server)?;
    let notes = api.list_notes().await?;
    print_notes(&notes);
    Ok(())
}

/// Print where the configuration lives and what it currently holds
pub fn run_config(config: &Config) -> Result<()> {
    let path = Config::config_path()?;
    println!("{} {}", "Config file:".bold(), path.display());
    if !path.exists() {
        println!("{}", "(not present, showing defaults)".dimmed());
    }
    println!();
    println!(
        "{}",
        toml::to_string_pretty(config).context("Failed to render config")?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MessageId;

    #[test]
    fn test_parse_plain_text() {
        assert_eq!(
            Input::parse("  remind me  ", false),
            Input::Send("remind me".into())
        );
    }

    #[test]
    fn test_bare_answers_only_while_deciding() {
        assert_eq!(Input::parse("yes", true), Input::Decide(true));
        assert_eq!(Input::parse("N", true), Input::Decide(false));
        assert_eq!(Input::parse("yes", false), Input::Send("yes".into()));
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Input::parse("/no", false), Input::Decide(false));
        assert_eq!(Input::parse("/dismiss", true), Input::Dismiss);
        assert_eq!(Input::parse("/clear", false), Input::Clear);
        assert_eq!(Input::parse("/quit", false), Input::Quit);
        assert_eq!(Input::parse("/reconnect", false), Input::Reconnect);
        assert_eq!(
            Input::parse("/user u2 tok", false),
            Input::SwitchUser(Identity::new("u2", "tok"))
        );
        assert!(matches!(Input::parse("/user u2", false), Input::Invalid(_)));
        assert!(matches!(Input::parse("/bogus", false), Input::Invalid(_)));
    }

    #[test]
    fn test_transcript_tracks_stream_and_reset() {
        let mut transcript = Transcript::default();
        let log = MessageLog::new().append(Message::streaming("Hel"));
        transcript.render(&log);
        assert_eq!(transcript.streamed, "Hel");
        assert_eq!(transcript.printed, 0);

        let log = log.replace_last(Message::new(
            MessageId::Assigned("42".into()),
            Role::Assistant,
            "Hello!",
        ));
        transcript.render(&log);
        assert!(transcript.streamed.is_empty());
        assert_eq!(transcript.printed, 1);

        transcript.render(&MessageLog::new());
        assert_eq!(transcript.printed, 0);
    }
}
