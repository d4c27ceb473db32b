//! quill-core: Core types for the quill streaming client
//!
//! This crate folds the agent server's event feed into per-turn state, decides
//! what is visible, and wraps text for the terminal. It has no terminal or
//! network I/O of its own.

pub mod accumulator;
pub mod ansi;
pub mod error;
pub mod event;
pub mod part;
pub mod server;
pub mod visibility;
pub mod wrap;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use accumulator::apply;
pub use ansi::{escape_len_at, split_at_width, strip_ansi, visible_width};
pub use error::Error;
pub use event::{FileDiff, SessionStatus, StreamEvent, TimeSpan, ToolState, WirePart};
pub use part::{Part, PartBody, PartKind, TurnState};
pub use server::{AgentServer, EventFeed, FeedEvent};
pub use visibility::compute_active;
pub use wrap::wrap;

pub type Result<T> = std::result::Result<T, Error>;
