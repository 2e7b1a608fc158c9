//! Chat threads and their message history.
//!
//! Threads are kept in creation order with one active thread. The collection is never
//! empty: deleting the last thread replaces it with a fresh one under the same id.
//! Nothing here is persisted; the store lives as long as the front end does.

/// Thread identifier, assigned from a counter that is never reused within a session.
pub type ThreadId = u64;

/// Title of the thread that exists at startup (and replaces the last deleted one).
pub const NEW_CHAT_TITLE: &str = "New Chat";

/// Derived titles keep at most this many characters before the ellipsis.
pub const TITLE_MAX_CHARS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    User,
    Assistant,
    Error,
}

/// A single message in a thread. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub text: String,
    /// Backend instance that produced an assistant reply.
    pub source_instance: Option<String>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::User,
            text: text.into(),
            source_instance: None,
        }
    }

    pub fn assistant(text: impl Into<String>, source_instance: Option<String>) -> Self {
        Self {
            kind: MessageKind::Assistant,
            text: text.into(),
            source_instance,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Error,
            text: text.into(),
            source_instance: None,
        }
    }
}

/// A conversation: id, display title, and ordered messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatThread {
    pub id: ThreadId,
    pub title: String,
    pub messages: Vec<Message>,
}

impl ChatThread {
    fn new(id: ThreadId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            messages: Vec::new(),
        }
    }

    /// True while the title is still one we assigned ("New Chat" or "Chat N").
    pub fn has_default_title(&self) -> bool {
        self.title == NEW_CHAT_TITLE || self.title.starts_with("Chat ")
    }
}

/// Title derived from a first message: the text itself, or its first 30 characters plus "...".
pub fn derive_title(text: &str) -> String {
    if text.chars().count() > TITLE_MAX_CHARS {
        let head: String = text.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// In-memory store of chat threads (create, select, delete, rename, append).
#[derive(Debug, Clone)]
pub struct ChatStore {
    threads: Vec<ChatThread>,
    active: ThreadId,
    next_id: ThreadId,
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatStore {
    /// One empty "New Chat" thread with id 1, active.
    pub fn new() -> Self {
        Self {
            threads: vec![ChatThread::new(1, NEW_CHAT_TITLE)],
            active: 1,
            next_id: 2,
        }
    }

    pub fn threads(&self) -> &[ChatThread] {
        &self.threads
    }

    pub fn active_id(&self) -> ThreadId {
        self.active
    }

    pub fn thread(&self, id: ThreadId) -> Option<&ChatThread> {
        self.threads.iter().find(|t| t.id == id)
    }

    fn thread_mut(&mut self, id: ThreadId) -> Option<&mut ChatThread> {
        self.threads.iter_mut().find(|t| t.id == id)
    }

    pub fn active_thread(&self) -> &ChatThread {
        // `active` always names a stored thread; fall back to the first for safety.
        self.thread(self.active).unwrap_or(&self.threads[0])
    }

    /// Append a "Chat N" thread at the end and make it active. Returns its id.
    pub fn create_thread(&mut self) -> ThreadId {
        let id = self.next_id;
        self.next_id += 1;
        self.threads.push(ChatThread::new(id, format!("Chat {}", id)));
        self.active = id;
        log::debug!("created chat thread {}", id);
        id
    }

    /// Make `id` the active thread. Returns false (and changes nothing) for an unknown id.
    pub fn select_thread(&mut self, id: ThreadId) -> bool {
        if self.thread(id).is_none() {
            log::debug!("ignoring select of unknown chat thread {}", id);
            return false;
        }
        self.active = id;
        true
    }

    /// Remove thread `id`. The last remaining thread is reset in place instead of removed.
    /// If the active thread goes away, the first remaining thread becomes active.
    pub fn delete_thread(&mut self, id: ThreadId) {
        let Some(pos) = self.threads.iter().position(|t| t.id == id) else {
            log::debug!("ignoring delete of unknown chat thread {}", id);
            return;
        };
        if self.threads.len() == 1 {
            self.threads[0] = ChatThread::new(id, NEW_CHAT_TITLE);
            self.active = id;
            log::debug!("reset last chat thread {}", id);
            return;
        }
        self.threads.remove(pos);
        if self.active == id {
            self.active = self.threads[0].id;
        }
        log::debug!("deleted chat thread {}", id);
    }

    /// Explicit rename by the user. Blank titles are ignored. Returns true if renamed.
    pub fn rename_thread(&mut self, id: ThreadId, title: &str) -> bool {
        let title = title.trim();
        if title.is_empty() {
            return false;
        }
        match self.thread_mut(id) {
            Some(thread) => {
                thread.title = title.to_string();
                true
            }
            None => false,
        }
    }

    /// Append a message to thread `id`. The first user message also derives the title while it
    /// is still a default one. Returns false if the thread does not exist.
    pub fn append_message(&mut self, id: ThreadId, message: Message) -> bool {
        let Some(thread) = self.thread_mut(id) else {
            return false;
        };
        let first_user = message.kind == MessageKind::User
            && !thread.messages.iter().any(|m| m.kind == MessageKind::User);
        let candidate = first_user.then(|| message.text.clone());
        thread.messages.push(message);
        if let Some(text) = candidate {
            self.rename_if_default(id, &text);
        }
        true
    }

    /// Replace a default title ("New Chat" or "Chat ...") with one derived from `text`.
    /// Any other title is left untouched. Returns true if the title changed.
    pub fn rename_if_default(&mut self, id: ThreadId, text: &str) -> bool {
        match self.thread_mut(id) {
            Some(thread) if thread.has_default_title() => {
                thread.title = derive_title(text);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn assert_invariants(store: &ChatStore) {
        assert!(!store.threads().is_empty());
        assert!(store.thread(store.active_id()).is_some());
        let ids: HashSet<_> = store.threads().iter().map(|t| t.id).collect();
        assert_eq!(ids.len(), store.threads().len());
    }

    #[test]
    fn starts_with_one_active_new_chat() {
        let store = ChatStore::new();
        assert_eq!(store.threads().len(), 1);
        assert_eq!(store.active_id(), 1);
        assert_eq!(store.active_thread().title, "New Chat");
        assert!(store.active_thread().messages.is_empty());
    }

    #[test]
    fn create_appends_and_activates() {
        let mut store = ChatStore::new();
        let id = store.create_thread();
        assert_eq!(id, 2);
        assert_eq!(store.active_id(), 2);
        assert_eq!(store.threads().last().unwrap().title, "Chat 2");
    }

    #[test]
    fn ids_are_never_reused() {
        let mut store = ChatStore::new();
        let a = store.create_thread();
        store.delete_thread(a);
        let b = store.create_thread();
        assert!(b > a);
    }

    #[test]
    fn deleting_only_thread_resets_it_with_same_id() {
        let mut store = ChatStore::new();
        store.append_message(1, Message::user("hello"));
        store.delete_thread(1);
        assert_eq!(store.threads().len(), 1);
        let t = &store.threads()[0];
        assert_eq!(t.id, 1);
        assert_eq!(t.title, "New Chat");
        assert!(t.messages.is_empty());
        assert_eq!(store.active_id(), 1);
    }

    #[test]
    fn deleting_active_selects_first_remaining() {
        let mut store = ChatStore::new();
        store.create_thread();
        let third = store.create_thread();
        store.delete_thread(third);
        assert_eq!(store.active_id(), 1);

        let mut store = ChatStore::new();
        store.create_thread();
        store.select_thread(1);
        store.delete_thread(1);
        assert_eq!(store.active_id(), 2);
    }

    #[test]
    fn deleting_inactive_keeps_active() {
        let mut store = ChatStore::new();
        store.create_thread();
        let third = store.create_thread();
        store.delete_thread(2);
        assert_eq!(store.active_id(), third);
    }

    #[test]
    fn invariants_hold_over_mixed_operations() {
        let mut store = ChatStore::new();
        // Deterministic pseudo-random sequence of creates, deletes, and selects.
        let mut seed: u64 = 0x2545_F491;
        for _ in 0..500 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let ids: Vec<_> = store.threads().iter().map(|t| t.id).collect();
            let pick = ids[(seed as usize / 7) % ids.len()];
            match seed % 3 {
                0 => {
                    store.create_thread();
                }
                1 => store.delete_thread(pick),
                _ => {
                    store.select_thread(pick);
                }
            }
            assert_invariants(&store);
        }
    }

    #[test]
    fn select_unknown_is_ignored() {
        let mut store = ChatStore::new();
        assert!(!store.select_thread(42));
        assert_eq!(store.active_id(), 1);
    }

    #[test]
    fn first_message_derives_title() {
        let mut store = ChatStore::new();
        store.append_message(1, Message::user("What is Rust?"));
        assert_eq!(store.active_thread().title, "What is Rust?");
        store.append_message(1, Message::user("Something else entirely"));
        assert_eq!(store.active_thread().title, "What is Rust?");
    }

    #[test]
    fn long_first_message_is_truncated_with_ellipsis() {
        let mut store = ChatStore::new();
        let id = store.create_thread();
        let text = "abcdefghijklmnopqrstuvwxyz0123456789";
        store.append_message(id, Message::user(text));
        assert_eq!(store.active_thread().title, "abcdefghijklmnopqrstuvwxyz0123...");
    }

    #[test]
    fn exactly_thirty_chars_is_kept() {
        let text = "a".repeat(30);
        assert_eq!(derive_title(&text), text);
        assert_eq!(derive_title(&"a".repeat(31)), format!("{}...", "a".repeat(30)));
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let text = "é".repeat(31);
        assert_eq!(derive_title(&text), format!("{}...", "é".repeat(30)));
    }

    #[test]
    fn rename_if_default_only_touches_default_titles() {
        let mut store = ChatStore::new();
        assert!(store.rename_if_default(1, "first"));
        assert_eq!(store.active_thread().title, "first");
        assert!(!store.rename_if_default(1, "second"));

        let id = store.create_thread();
        assert!(store.rename_thread(id, "Notes"));
        assert!(!store.rename_if_default(id, "ignored"));
        assert_eq!(store.thread(id).unwrap().title, "Notes");

        let id = store.create_thread();
        assert!(store.rename_if_default(id, "derived"));
    }

    #[test]
    fn only_user_messages_derive_the_title() {
        let mut store = ChatStore::new();
        store.append_message(1, Message::assistant("Sure, here is a long assistant answer", None));
        store.append_message(1, Message::error("Failed to get response: timeout"));
        assert_eq!(store.active_thread().title, "New Chat");

        store.append_message(1, Message::user("plan a trip"));
        assert_eq!(store.active_thread().title, "plan a trip");
    }

    #[test]
    fn user_renamed_title_survives_first_message() {
        let mut store = ChatStore::new();
        store.rename_thread(1, "Planning");
        store.append_message(1, Message::user("hello"));
        assert_eq!(store.active_thread().title, "Planning");
    }

    #[test]
    fn blank_rename_is_ignored() {
        let mut store = ChatStore::new();
        assert!(!store.rename_thread(1, "   "));
        assert_eq!(store.active_thread().title, "New Chat");
    }

    #[test]
    fn append_to_unknown_thread_fails() {
        let mut store = ChatStore::new();
        assert!(!store.append_message(9, Message::user("x")));
    }
}
