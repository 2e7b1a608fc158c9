//! Backend abstraction and HTTP client.
//!
//! Three endpoints: status polling, "who am I", and non-streaming chat completion.

mod client;

pub use client::{
    Backend, BackendClient, BackendError, ChatReply, ChatRequest, ChatResponse, WhoAmI,
};
