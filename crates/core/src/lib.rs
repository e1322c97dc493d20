//! Domain model for the Third Chair document-analysis client.
//!
//! Everything in this crate is free of network IO: staged files, the
//! job state machine, report normalization and rendering, the chat
//! transcript, and the injected session context.

pub mod chat;
pub mod error;
pub mod job;
pub mod render;
pub mod report;
pub mod session;
pub mod staging;
pub mod types;
