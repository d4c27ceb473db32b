//! quill-client: HTTP client for the agent server
//!
//! This crate implements the `AgentServer` trait over the server's REST
//! endpoints and its server-sent event feed.

pub mod client;

pub use client::{ServerClient, DEFAULT_BASE_URL};
