//! Network client for the Third Chair analysis backend.
//!
//! Provides the REST API wrapper, the progress-stream WebSocket
//! connection and message processing loop, bounded backoff for
//! idempotent calls, and the parameterized analysis workflow that ties
//! them together. Chat and authentication services sit on top of the
//! same API wrapper.

pub mod api;
pub mod auth;
pub mod chat;
pub mod client;
pub mod config;
pub mod events;
pub mod messages;
pub mod processor;
pub mod retry;
pub mod workflow;
