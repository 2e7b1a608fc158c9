//! Display derivations shared by the CLI and desktop front ends.
//!
//! Everything here is a pure function of the status snapshot, the busy flag, and the
//! active thread; front ends only decide how to draw the result.

use crate::api::{BackendError, WhoAmI};
use crate::status::{BackendState, StatusSnapshot};
use crate::store::ChatThread;

/// Header value before any backend has answered.
pub const CONNECTING_LABEL: &str = "Connecting...";

/// Backend display label: the instance id, or "localhost" when the backend sent none.
pub fn backend_label(instance_id: Option<&str>) -> String {
    instance_id
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("localhost")
        .to_string()
}

/// Secondary hint shown under the status message while the model is not ready.
pub fn state_hint(state: &BackendState) -> Option<&'static str> {
    match state {
        BackendState::LoadingModel => Some("You can send a message now - it will process once ready"),
        BackendState::Starting => Some("Ollama service is starting..."),
        BackendState::Initializing => Some("Setting up the environment..."),
        BackendState::Error => Some("Check that the backend is running and reachable"),
        BackendState::Ready | BackendState::Unknown(_) => None,
    }
}

/// Enabled state and placeholder of the message input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputState {
    pub enabled: bool,
    pub placeholder: &'static str,
}

pub fn input_state(status: &StatusSnapshot, busy: bool) -> InputState {
    let placeholder = if !status.accepts_messages() {
        "Backend not available"
    } else if !status.ready {
        "Model loading... You can still send!"
    } else {
        "Type your message..."
    };
    InputState {
        enabled: !busy && status.accepts_messages(),
        placeholder,
    }
}

/// Whether the send action should be offered for the current draft.
pub fn can_submit(status: &StatusSnapshot, busy: bool, draft: &str) -> bool {
    input_state(status, busy).enabled && !draft.trim().is_empty()
}

/// What to show in place of the message list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmptyState<'a> {
    /// Backend not ready: its status message plus a state-specific hint.
    Waiting {
        message: &'a str,
        hint: Option<&'static str>,
    },
    /// Backend ready but the thread has no messages yet.
    NoMessages,
}

impl EmptyState<'_> {
    pub const NO_MESSAGES_TEXT: &'static str = "Start a conversation";
}

/// None means the thread's messages should be listed.
pub fn empty_state<'a>(status: &'a StatusSnapshot, thread: &ChatThread) -> Option<EmptyState<'a>> {
    if !status.ready {
        Some(EmptyState::Waiting {
            message: &status.message,
            hint: state_hint(&status.state),
        })
    } else if thread.messages.is_empty() {
        Some(EmptyState::NoMessages)
    } else {
        None
    }
}

/// Text of the one-off "who am I" notice.
pub fn whoami_notice(result: &Result<WhoAmI, BackendError>) -> String {
    match result {
        Ok(who) => format!(
            "Your IP: {}\nBackend Instance: {}",
            who.your_ip,
            backend_label(who.instance_id.as_deref())
        ),
        Err(e) => format!("Failed to get IP: {}", e),
    }
}
