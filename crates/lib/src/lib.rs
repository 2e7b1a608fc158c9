//! Ollama Chat core library: backend client, chat threads, status polling, and
//! send dispatch shared by the CLI and desktop applications.

pub mod api;
pub mod config;
pub mod dispatch;
pub mod poller;
pub mod status;
pub mod store;
pub mod view;
