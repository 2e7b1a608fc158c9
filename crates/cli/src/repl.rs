//! Interactive multi-thread chat on the terminal.

use lib::api::Backend;
use lib::dispatch::Dispatcher;
use lib::poller::StatusPoller;
use lib::status::{BackendState, StatusReport, StatusSnapshot};
use lib::store::{ChatStore, ChatThread, Message, MessageKind, ThreadId};
use lib::view::{self, EmptyState};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "available commands:
  /new              start a new chat and switch to it
  /list             list chats (* marks the active one)
  /switch <id>      switch to chat <id>
  /delete [id]      delete chat <id> (default: the active chat)
  /rename <title>   rename the active chat
  /whoami           show your IP and the backend instance
  /status           show backend status
  /help             show this help message
  /exit, /quit      leave
anything else is sent to the active chat";

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    New,
    List,
    Switch(ThreadId),
    Delete(Option<ThreadId>),
    Rename(String),
    Whoami,
    Status,
    Help,
    Exit,
    Invalid(String),
}

/// Parse a line of input. Blank lines yield None.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if !line.starts_with('/') {
        return Some(Command::Send(line.to_string()));
    }
    let (name, arg) = match line.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (line, ""),
    };
    let cmd = match name.to_ascii_lowercase().as_str() {
        "/new" => Command::New,
        "/list" => Command::List,
        "/switch" => match arg.parse() {
            Ok(id) => Command::Switch(id),
            Err(_) => Command::Invalid("usage: /switch <id>".to_string()),
        },
        "/delete" if arg.is_empty() => Command::Delete(None),
        "/delete" => match arg.parse() {
            Ok(id) => Command::Delete(Some(id)),
            Err(_) => Command::Invalid("usage: /delete [id]".to_string()),
        },
        "/rename" if arg.is_empty() => Command::Invalid("usage: /rename <title>".to_string()),
        "/rename" => Command::Rename(arg.to_string()),
        "/whoami" => Command::Whoami,
        "/status" => Command::Status,
        "/help" => Command::Help,
        "/exit" | "/quit" => Command::Exit,
        other => Command::Invalid(format!("unknown command: {} (try /help)", other)),
    };
    Some(cmd)
}

/// Status line plus the state hint while the model is not ready.
pub fn status_banner(status: &StatusSnapshot) -> String {
    let state = match status.state.as_str() {
        "" => "checking",
        s => s,
    };
    let mut out = format!("status: {} - {}", state, status.message);
    if !status.ready {
        if let Some(hint) = view::state_hint(&status.state) {
            out.push_str("\n  ");
            out.push_str(hint);
        }
    }
    out
}

fn render_message(m: &Message) -> String {
    match m.kind {
        MessageKind::User => format!("you: {}", m.text),
        MessageKind::Assistant => match m.source_instance {
            Some(ref instance) => format!("assistant: {}\n  (instance: {})", m.text.trim(), instance),
            None => format!("assistant: {}", m.text.trim()),
        },
        MessageKind::Error => format!("error: {}", m.text),
    }
}

fn render_thread_list(store: &ChatStore) -> String {
    store
        .threads()
        .iter()
        .map(|t| {
            let marker = if t.id == store.active_id() { '*' } else { ' ' };
            format!("{} {:>3}  {}  ({} messages)", marker, t.id, t.title, t.messages.len())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn print_transcript(status: &StatusSnapshot, thread: &ChatThread) {
    println!("-- {} --", thread.title);
    match view::empty_state(status, thread) {
        Some(EmptyState::NoMessages) => println!("{}", EmptyState::NO_MESSAGES_TEXT),
        _ if thread.messages.is_empty() => println!("(no messages)"),
        _ => {
            for m in &thread.messages {
                println!("{}", render_message(m));
            }
        }
    }
}

/// Terminal session state: the same pieces the desktop view wires together.
struct Session {
    backend: Arc<dyn Backend>,
    poller: StatusPoller,
    dispatcher: Dispatcher,
    store: ChatStore,
    status: StatusSnapshot,
    current_backend: String,
    shown_state: Option<BackendState>,
}

impl Session {
    fn apply_report(&mut self, report: StatusReport) {
        if let Some(label) = report.backend_label() {
            self.current_backend = label;
        }
        self.status = report.snapshot;
    }

    /// Apply the latest poll result, if one landed since the last look.
    fn refresh_status(&mut self) {
        if let Some(report) = self.poller.take_update() {
            self.apply_report(report);
        }
    }

    fn drain_status(&mut self) {
        self.refresh_status();
        if self.shown_state.as_ref() != Some(&self.status.state) {
            println!("{}", status_banner(&self.status));
            self.shown_state = Some(self.status.state.clone());
        }
    }

    /// Returns false when the user asked to leave.
    async fn handle(&mut self, cmd: Command) -> bool {
        // Input can sit unread across several polls.
        self.refresh_status();
        match cmd {
            Command::Send(text) => self.send(&text).await,
            Command::New => {
                let id = self.store.create_thread();
                println!("started chat {}", id);
            }
            Command::List => println!("{}", render_thread_list(&self.store)),
            Command::Switch(id) => {
                if self.store.select_thread(id) {
                    print_transcript(&self.status, self.store.active_thread());
                } else {
                    println!("no chat with id {}", id);
                }
            }
            Command::Delete(id) => {
                let id = id.unwrap_or_else(|| self.store.active_id());
                if self.store.thread(id).is_none() {
                    println!("no chat with id {}", id);
                } else {
                    self.store.delete_thread(id);
                    println!("deleted chat {}; now in chat {}", id, self.store.active_id());
                }
            }
            Command::Rename(title) => {
                let id = self.store.active_id();
                if self.store.rename_thread(id, &title) {
                    println!("renamed chat {}", id);
                }
            }
            Command::Whoami => {
                let result = self.backend.whoami().await;
                if let Ok(ref who) = result {
                    self.current_backend = view::backend_label(who.instance_id.as_deref());
                }
                println!("{}", view::whoami_notice(&result));
            }
            Command::Status => {
                println!("{}", status_banner(&self.status));
                println!("backend: {}", self.current_backend);
                if let Some(ref model) = self.status.model {
                    println!("model: {}", model);
                }
            }
            Command::Help => println!("{}", HELP),
            Command::Exit => return false,
            Command::Invalid(msg) => println!("{}", msg),
        }
        true
    }

    async fn send(&mut self, text: &str) {
        let thread_id = self.store.active_id();
        println!("(waiting for {})", self.current_backend);
        match self
            .dispatcher
            .send(&mut self.store, &self.status, self.backend.as_ref(), thread_id, text)
            .await
        {
            Ok(label) => {
                if let Some(label) = label {
                    self.current_backend = label;
                }
                if let Some(reply) = self
                    .store
                    .thread(thread_id)
                    .and_then(|t| t.messages.last())
                {
                    println!("{}", render_message(reply));
                }
            }
            Err(e) => println!("not sent: {}", e),
        }
    }
}

/// Run the REPL until /exit or end of input. Polling stops when this returns.
pub async fn run(backend: Arc<dyn Backend>, interval: Duration) -> anyhow::Result<()> {
    let mut poller = StatusPoller::spawn(backend.clone(), interval);
    // Give the first poll a moment so the first banner is real status, not "checking".
    let first = tokio::time::timeout(Duration::from_secs(5), poller.wait_for_update())
        .await
        .ok()
        .flatten();

    let mut session = Session {
        backend,
        poller,
        dispatcher: Dispatcher::new(),
        store: ChatStore::new(),
        status: StatusSnapshot::checking(),
        current_backend: view::CONNECTING_LABEL.to_string(),
        shown_state: None,
    };
    if let Some(report) = first {
        session.apply_report(report);
    }
    println!("backend: {}", session.current_backend);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        session.drain_status();
        print!("[{}] > ", session.store.active_thread().title);
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let Some(cmd) = parse_command(&line) else {
            continue;
        };
        if !session.handle(cmd).await {
            break;
        }
    }
    Ok(())
}
