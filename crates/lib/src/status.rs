//! Backend readiness as reported by `GET /api/status`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Message shown when the status endpoint cannot be reached or parsed.
pub const UNREACHABLE_MESSAGE: &str = "Cannot connect to backend.";

/// Lifecycle state reported by the backend. Unknown strings are kept as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BackendState {
    Starting,
    Initializing,
    LoadingModel,
    Ready,
    Error,
    Unknown(String),
}

impl BackendState {
    pub fn as_str(&self) -> &str {
        match self {
            BackendState::Starting => "starting",
            BackendState::Initializing => "initializing",
            BackendState::LoadingModel => "loading_model",
            BackendState::Ready => "ready",
            BackendState::Error => "error",
            BackendState::Unknown(s) => s,
        }
    }
}

impl From<String> for BackendState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "starting" => BackendState::Starting,
            "initializing" => BackendState::Initializing,
            "loading_model" => BackendState::LoadingModel,
            "ready" => BackendState::Ready,
            "error" => BackendState::Error,
            _ => BackendState::Unknown(s),
        }
    }
}

impl From<BackendState> for String {
    fn from(state: BackendState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for BackendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of backend health. Replaced wholesale on every poll, never merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    #[serde(default)]
    pub ready: bool,
    #[serde(rename = "status")]
    pub state: BackendState,
    #[serde(default)]
    pub message: String,
    /// Hostname of the backend instance that answered.
    #[serde(
        rename = "instance_id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub backend_instance_id: Option<String>,
    /// Model the backend serves, when it reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl StatusSnapshot {
    /// Local fallback used whenever a poll fails.
    pub fn unreachable() -> Self {
        Self {
            ready: false,
            state: BackendState::Error,
            message: UNREACHABLE_MESSAGE.to_string(),
            backend_instance_id: None,
            model: None,
        }
    }

    /// Placeholder shown before the first poll lands. Does not block sending.
    pub fn checking() -> Self {
        Self {
            ready: false,
            state: BackendState::Unknown(String::new()),
            message: "Checking status...".to_string(),
            backend_instance_id: None,
            model: None,
        }
    }

    /// An errored backend blocks sending; any other state (even not ready) allows it.
    pub fn accepts_messages(&self) -> bool {
        self.state != BackendState::Error
    }
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self::checking()
    }
}

/// What the poller publishes after each tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub snapshot: StatusSnapshot,
    /// True when the snapshot came from the backend rather than the local fallback.
    pub reached: bool,
}

impl StatusReport {
    pub fn initial() -> Self {
        Self {
            snapshot: StatusSnapshot::checking(),
            reached: false,
        }
    }

    pub fn reached(snapshot: StatusSnapshot) -> Self {
        Self {
            snapshot,
            reached: true,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            snapshot: StatusSnapshot::unreachable(),
            reached: false,
        }
    }

    /// Backend display label to show in the header; only set by a successful poll.
    pub fn backend_label(&self) -> Option<String> {
        self.reached
            .then(|| crate::view::backend_label(self.snapshot.backend_instance_id.as_deref()))
    }
}
