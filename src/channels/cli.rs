//! CLI channel: a stdin/stdout REPL.

use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use crate::chat::ChatSession;
use crate::error::Error;
use crate::tasks::{TaskBoard, TaskStatus};

const HELP: &str = "\
Commands:
  /tasks          list open tasks
  /start <id>     mark a task in progress (id prefix is enough)
  /done <id>      mark a task done
  /title          show the conversation title
  /help           show this help
  /quit           exit
Anything else is sent to the assistant.";

/// A parsed line of REPL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    Help,
    Tasks,
    Start(String),
    Done(String),
    Title,
    Chat(String),
    Empty,
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Chat(line.to_string());
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        match name.to_ascii_lowercase().as_str() {
            "quit" | "exit" | "q" => Self::Quit,
            "help" | "?" => Self::Help,
            "tasks" | "list" => Self::Tasks,
            "start" => Self::Start(arg.to_string()),
            "done" => Self::Done(arg.to_string()),
            "title" => Self::Title,
            // Unknown slash commands go to the model verbatim.
            _ => Self::Chat(line.to_string()),
        }
    }
}

/// Terminal front end: one chat session plus the task board it feeds.
pub struct CliChannel {
    session: ChatSession,
    board: TaskBoard,
    user_id: String,
}

impl CliChannel {
    pub fn new(session: ChatSession, user_id: impl Into<String>) -> Self {
        Self {
            session,
            board: TaskBoard::new(),
            user_id: user_id.into(),
        }
    }

    pub fn board(&self) -> &TaskBoard {
        &self.board
    }

    /// Read stdin until EOF or `/quit`.
    pub async fn run(mut self) -> Result<(), Error> {
        let stdin = tokio::io::stdin();
        let mut lines = BufReader::new(stdin).lines();

        eprint!("> ");
        while let Some(line) = lines.next_line().await? {
            match Command::parse(&line) {
                Command::Quit => break,
                Command::Empty => {}
                Command::Chat(text) => self.chat(&text).await,
                command => println!("{}", self.run_command(command)),
            }
            eprint!("> ");
        }
        Ok(())
    }

    async fn chat(&mut self, text: &str) {
        let mut stdout = std::io::stdout();
        let result = self
            .session
            .send(text, |update| {
                print!("{}", update.delta);
                if let Err(e) = stdout.flush() {
                    debug!(error = %e, "Failed to flush stdout");
                }
            })
            .await;

        match result {
            Ok(reply) => {
                println!("\n");
                for draft in reply.tasks {
                    let task = self.board.add_draft(&self.user_id, draft);
                    println!("  + [{}] {}", task.short_id(), task.title);
                }
                if let Some(title) = reply.title {
                    eprintln!("💬 {}", title);
                }
            }
            Err(e) => {
                println!();
                tracing::error!(error = %e, "Chat turn failed");
                eprintln!("Error: {}", e);
            }
        }
    }

    /// Run a non-chat command and return its output.
    pub fn run_command(&mut self, command: Command) -> String {
        match command {
            Command::Help => HELP.to_string(),
            Command::Tasks => {
                let lines: Vec<String> = self
                    .board
                    .pending()
                    .map(|t| {
                        let due = t
                            .due_date
                            .map(|d| format!(" (due {})", d))
                            .unwrap_or_default();
                        let marker = if t.status == TaskStatus::InProgress { "▶ " } else { "" };
                        format!(
                            "  [{}] {:?} {}{}{}",
                            t.short_id(),
                            t.priority,
                            marker,
                            t.title,
                            due
                        )
                    })
                    .collect();
                if lines.is_empty() {
                    "No open tasks.".to_string()
                } else {
                    lines.join("\n")
                }
            }
            Command::Start(prefix) if prefix.is_empty() => "Usage: /start <id>".to_string(),
            Command::Start(prefix) => match self.board.start(&prefix) {
                Some(task) => format!("▶ {}", task.title),
                None => format!("No single open task matches '{}'.", prefix),
            },
            Command::Done(prefix) if prefix.is_empty() => "Usage: /done <id>".to_string(),
            Command::Done(prefix) => match self.board.complete(&prefix) {
                Some(task) => format!("✅ {}", task.title),
                None => format!("No single open task matches '{}'.", prefix),
            },
            Command::Title => self
                .session
                .title()
                .unwrap_or(crate::chat::naming::DEFAULT_TITLE)
                .to_string(),
            Command::Quit | Command::Empty | Command::Chat(_) => String::new(),
        }
    }
}
