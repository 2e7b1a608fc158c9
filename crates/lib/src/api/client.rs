//! Backend HTTP client (http://localhost:5000 by default).
//! Non-streaming: one JSON request, one JSON response per call.

use crate::status::StatusSnapshot;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The remote side of the chat: anything that can answer status, whoami, and chat.
#[async_trait]
pub trait Backend: Send + Sync {
    /// GET /api/status: current readiness of the backend's model.
    async fn status(&self) -> Result<StatusSnapshot, BackendError>;

    /// GET /api/whoami: caller IP as seen by the backend, plus the answering instance.
    async fn whoami(&self) -> Result<WhoAmI, BackendError>;

    /// POST /api/chat: one prompt, one complete reply.
    async fn chat(&self, prompt: &str) -> Result<ChatResponse, BackendError>;
}

/// Client for the backend HTTP API.
#[derive(Clone)]
pub struct BackendClient {
    base_url: String,
    status_timeout: Option<Duration>,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend returned invalid JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("backend api error: {0}")]
    Api(String),
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            status_timeout: None,
            client: reqwest::Client::new(),
        }
    }

    /// Bound each status request; chat and whoami keep transport defaults.
    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = Some(timeout);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Parse the body as JSON whatever the HTTP status: the backend reports logical failures
    /// (e.g. an empty prompt, 400) in a well-formed body.
    async fn read_json<T: DeserializeOwned>(res: reqwest::Response) -> Result<T, BackendError> {
        let status = res.status();
        let body = res.text().await?;
        match serde_json::from_str(&body) {
            Ok(data) => Ok(data),
            Err(_) if !status.is_success() => {
                Err(BackendError::Api(format!("{} {}", status, body.trim())))
            }
            Err(e) => Err(BackendError::Decode(e)),
        }
    }
}

#[async_trait]
impl Backend for BackendClient {
    async fn status(&self) -> Result<StatusSnapshot, BackendError> {
        let url = format!("{}/api/status", self.base_url);
        let mut req = self.client.get(&url);
        if let Some(timeout) = self.status_timeout {
            req = req.timeout(timeout);
        }
        let res = req.send().await?;
        Self::read_json(res).await
    }

    async fn whoami(&self) -> Result<WhoAmI, BackendError> {
        let url = format!("{}/api/whoami", self.base_url);
        let res = self.client.get(&url).send().await?;
        Self::read_json(res).await
    }

    async fn chat(&self, prompt: &str) -> Result<ChatResponse, BackendError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            prompt: prompt.to_string(),
        };
        let res = self.client.post(&url).json(&body).send().await?;
        Self::read_json(res).await
    }
}

/// Response of GET /api/whoami.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhoAmI {
    pub your_ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub prompt: String,
}

/// Response of POST /api/chat. `response` is set on success, `message` on failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// A chat response read as either a reply or a backend-reported failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatReply {
    Answer {
        text: String,
        instance_id: Option<String>,
    },
    Rejected {
        reason: String,
    },
}

impl ChatResponse {
    pub fn success(text: impl Into<String>, instance_id: Option<String>) -> Self {
        Self {
            success: true,
            response: Some(text.into()),
            instance_id,
            ..Default::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn into_reply(self) -> ChatReply {
        if self.success {
            ChatReply::Answer {
                text: self.response.unwrap_or_default(),
                instance_id: self.instance_id,
            }
        } else {
            ChatReply::Rejected {
                reason: self
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "Request failed".to_string()),
            }
        }
    }
}
