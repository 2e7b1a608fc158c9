//! Sending prompts to the backend and recording the outcome in a chat thread.
//!
//! A send runs in three steps so a UI can keep the network call off its own thread:
//! [`Dispatcher::begin`] validates, records the user message, and takes the busy flag;
//! [`PendingSend::run`] talks to the backend; [`Dispatcher::complete`] appends the reply
//! or error to the originating thread and releases the flag. Only one send is in flight
//! at a time across all threads.

use crate::api::{Backend, ChatReply};
use crate::status::StatusSnapshot;
use crate::store::{ChatStore, Message, ThreadId};
use crate::view::backend_label;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Why a send was not started.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendRejected {
    #[error("message is empty")]
    EmptyPrompt,
    #[error("a message is already being sent")]
    Busy,
    #[error("backend not available")]
    BackendUnavailable,
    #[error("chat {0} does not exist")]
    UnknownThread(ThreadId),
}

/// Holds the global busy flag for as long as it lives.
#[derive(Debug)]
struct BusyGuard {
    flag: Arc<AtomicBool>,
}

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: flag.clone() })
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// A validated send whose user message is already in the thread.
#[derive(Debug)]
pub struct PendingSend {
    thread_id: ThreadId,
    prompt: String,
    guard: BusyGuard,
}

/// Result of the network step, ready to be recorded.
#[derive(Debug)]
pub struct SendOutcome {
    pub thread_id: ThreadId,
    pub message: Message,
    /// Backend label to display when the backend answered successfully.
    pub backend: Option<String>,
    guard: BusyGuard,
}

impl PendingSend {
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// POST the prompt and turn whatever comes back into a message. Never fails.
    pub async fn run(self, backend: &dyn Backend) -> SendOutcome {
        let PendingSend {
            thread_id,
            prompt,
            guard,
        } = self;
        log::debug!("sending prompt for chat {} ({} chars)", thread_id, prompt.len());
        let (message, label) = match backend.chat(&prompt).await {
            Ok(res) => match res.into_reply() {
                ChatReply::Answer { text, instance_id } => {
                    let label = backend_label(instance_id.as_deref());
                    (Message::assistant(text, instance_id), Some(label))
                }
                ChatReply::Rejected { reason } => {
                    log::warn!("backend rejected prompt for chat {}: {}", thread_id, reason);
                    (Message::error(reason), None)
                }
            },
            Err(e) => {
                log::warn!("chat request for chat {} failed: {}", thread_id, e);
                (Message::error(format!("Failed to get response: {}", e)), None)
            }
        };
        SendOutcome {
            thread_id,
            message,
            backend: label,
            guard,
        }
    }
}

/// Mediates sends and owns the single in-flight guard.
#[derive(Debug, Default, Clone)]
pub struct Dispatcher {
    busy: Arc<AtomicBool>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a send is between `begin` and `complete`.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Validate and start a send: the trimmed prompt is appended to `thread_id` as a user
    /// message before this returns.
    pub fn begin(
        &self,
        store: &mut ChatStore,
        status: &StatusSnapshot,
        thread_id: ThreadId,
        prompt: &str,
    ) -> Result<PendingSend, SendRejected> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(SendRejected::EmptyPrompt);
        }
        if self.is_busy() {
            return Err(SendRejected::Busy);
        }
        if !status.accepts_messages() {
            return Err(SendRejected::BackendUnavailable);
        }
        if store.thread(thread_id).is_none() {
            return Err(SendRejected::UnknownThread(thread_id));
        }
        let guard = BusyGuard::acquire(&self.busy).ok_or(SendRejected::Busy)?;
        store.append_message(thread_id, Message::user(prompt));
        Ok(PendingSend {
            thread_id,
            prompt: prompt.to_string(),
            guard,
        })
    }

    /// Record the outcome in its thread and release the busy flag. Returns the backend label
    /// to display, if the backend answered.
    pub fn complete(&self, store: &mut ChatStore, outcome: SendOutcome) -> Option<String> {
        let SendOutcome {
            thread_id,
            message,
            backend,
            guard,
        } = outcome;
        if !store.append_message(thread_id, message) {
            log::info!("chat {} was deleted before its reply arrived; dropping reply", thread_id);
        }
        drop(guard);
        backend
    }

    /// Begin, run, and complete in one call, for callers that can await in place.
    pub async fn send(
        &self,
        store: &mut ChatStore,
        status: &StatusSnapshot,
        backend: &dyn Backend,
        thread_id: ThreadId,
        prompt: &str,
    ) -> Result<Option<String>, SendRejected> {
        let pending = self.begin(store, status, thread_id, prompt)?;
        let outcome = pending.run(backend).await;
        Ok(self.complete(store, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{BackendError, ChatResponse, WhoAmI};
    use crate::status::BackendState;
    use crate::store::MessageKind;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers every chat with a fixed result and records the prompts it saw.
    struct FakeChat {
        reply: Result<ChatResponse, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl FakeChat {
        fn answering(reply: Result<ChatResponse, String>) -> Self {
            Self {
                reply,
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Backend for FakeChat {
        async fn status(&self) -> Result<StatusSnapshot, BackendError> {
            Ok(StatusSnapshot::checking())
        }

        async fn whoami(&self) -> Result<WhoAmI, BackendError> {
            Err(BackendError::Api("unused".to_string()))
        }

        async fn chat(&self, prompt: &str) -> Result<ChatResponse, BackendError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().map_err(BackendError::Api)
        }
    }

    fn with_state(state: BackendState) -> StatusSnapshot {
        StatusSnapshot {
            ready: state == BackendState::Ready,
            state,
            message: String::new(),
            backend_instance_id: None,
            model: None,
        }
    }

    #[tokio::test]
    async fn successful_send_appends_user_then_assistant() {
        let backend = FakeChat::answering(Ok(ChatResponse::success("hi", Some("A".to_string()))));
        let dispatcher = Dispatcher::new();
        let mut store = ChatStore::new();
        let status = with_state(BackendState::Ready);

        let label = dispatcher
            .send(&mut store, &status, &backend, 1, "hello")
            .await
            .unwrap();

        assert_eq!(label.as_deref(), Some("A"));
        assert_eq!(
            store.active_thread().messages,
            vec![
                Message::user("hello"),
                Message::assistant("hi", Some("A".to_string())),
            ]
        );
        assert!(!dispatcher.is_busy());
        assert_eq!(*backend.prompts.lock().unwrap(), vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn backend_failure_becomes_error_message() {
        let backend = FakeChat::answering(Ok(ChatResponse::failure("busy")));
        let dispatcher = Dispatcher::new();
        let mut store = ChatStore::new();

        let label = dispatcher
            .send(&mut store, &with_state(BackendState::Ready), &backend, 1, "hello")
            .await
            .unwrap();

        assert_eq!(label, None);
        let last = store.active_thread().messages.last().unwrap();
        assert_eq!(last, &Message::error("busy"));
    }

    #[tokio::test]
    async fn transport_failure_reports_cause_and_clears_busy() {
        let backend = FakeChat::answering(Err("connection reset".to_string()));
        let dispatcher = Dispatcher::new();
        let mut store = ChatStore::new();

        dispatcher
            .send(&mut store, &with_state(BackendState::Ready), &backend, 1, "hello")
            .await
            .unwrap();

        let last = store.active_thread().messages.last().unwrap();
        assert_eq!(last.kind, MessageKind::Error);
        assert!(last.text.starts_with("Failed to get response: "));
        assert!(last.text.contains("connection reset"));
        assert!(!dispatcher.is_busy());
    }

    #[test]
    fn second_send_while_busy_is_rejected() {
        let dispatcher = Dispatcher::new();
        let mut store = ChatStore::new();
        let status = with_state(BackendState::Ready);

        let pending = dispatcher.begin(&mut store, &status, 1, "first").unwrap();
        assert!(dispatcher.is_busy());
        let other = store.create_thread();
        assert_eq!(
            dispatcher.begin(&mut store, &status, other, "second").unwrap_err(),
            SendRejected::Busy
        );
        assert!(store.thread(other).unwrap().messages.is_empty());

        drop(pending);
        assert!(!dispatcher.is_busy());
    }

    #[test]
    fn errored_backend_blocks_sending() {
        let dispatcher = Dispatcher::new();
        let mut store = ChatStore::new();
        let err = dispatcher
            .begin(&mut store, &StatusSnapshot::unreachable(), 1, "hello")
            .unwrap_err();
        assert_eq!(err, SendRejected::BackendUnavailable);
        assert!(store.active_thread().messages.is_empty());
        assert!(!dispatcher.is_busy());
    }

    #[test]
    fn starting_and_loading_backends_accept_sends() {
        for state in [BackendState::LoadingModel, BackendState::Starting] {
            let dispatcher = Dispatcher::new();
            let mut store = ChatStore::new();
            let pending = dispatcher.begin(&mut store, &with_state(state), 1, "hello");
            assert!(pending.is_ok());
        }
    }

    #[test]
    fn blank_prompt_is_rejected_and_prompt_is_trimmed() {
        let dispatcher = Dispatcher::new();
        let mut store = ChatStore::new();
        let status = with_state(BackendState::Ready);
        assert_eq!(
            dispatcher.begin(&mut store, &status, 1, "  \n ").unwrap_err(),
            SendRejected::EmptyPrompt
        );
        let pending = dispatcher.begin(&mut store, &status, 1, "  hello  ").unwrap();
        assert_eq!(pending.prompt(), "hello");
        assert_eq!(store.active_thread().messages, vec![Message::user("hello")]);
        assert_eq!(store.active_thread().title, "hello");
    }

    #[test]
    fn unknown_thread_is_rejected() {
        let dispatcher = Dispatcher::new();
        let mut store = ChatStore::new();
        assert_eq!(
            dispatcher
                .begin(&mut store, &with_state(BackendState::Ready), 7, "hi")
                .unwrap_err(),
            SendRejected::UnknownThread(7)
        );
    }

    #[tokio::test]
    async fn reply_goes_to_originating_thread_after_switch() {
        let backend = FakeChat::answering(Ok(ChatResponse::success("pong", None)));
        let dispatcher = Dispatcher::new();
        let mut store = ChatStore::new();
        let status = with_state(BackendState::Ready);

        let pending = dispatcher.begin(&mut store, &status, 1, "ping").unwrap();
        let other = store.create_thread();
        let outcome = pending.run(&backend).await;
        let label = dispatcher.complete(&mut store, outcome);

        assert_eq!(label.as_deref(), Some("localhost"));
        assert_eq!(store.thread(1).unwrap().messages.len(), 2);
        assert!(store.thread(other).unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn reply_for_deleted_thread_is_dropped_and_busy_clears() {
        let backend = FakeChat::answering(Ok(ChatResponse::success("pong", None)));
        let dispatcher = Dispatcher::new();
        let mut store = ChatStore::new();
        let status = with_state(BackendState::Ready);

        store.create_thread();
        let pending = dispatcher.begin(&mut store, &status, 2, "ping").unwrap();
        store.delete_thread(2);
        let outcome = pending.run(&backend).await;
        dispatcher.complete(&mut store, outcome);

        assert!(store.thread(2).is_none());
        assert!(!dispatcher.is_busy());
    }

    #[tokio::test]
    async fn reply_after_resetting_last_thread_keeps_default_title() {
        let backend = FakeChat::answering(Ok(ChatResponse::success(
            "Sure, here is a long assistant answer text",
            None,
        )));
        let dispatcher = Dispatcher::new();
        let mut store = ChatStore::new();
        let status = with_state(BackendState::Ready);

        let pending = dispatcher.begin(&mut store, &status, 1, "hello").unwrap();
        store.delete_thread(1);
        let outcome = pending.run(&backend).await;
        dispatcher.complete(&mut store, outcome);

        let thread = store.thread(1).unwrap();
        assert_eq!(thread.title, "New Chat");
        assert_eq!(
            thread.messages,
            vec![Message::assistant("Sure, here is a long assistant answer text", None)]
        );
        assert!(!dispatcher.is_busy());
    }
}
