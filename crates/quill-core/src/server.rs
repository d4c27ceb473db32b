use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use tokio_util::sync::CancellationToken;

use crate::error::Error;

/// One item from the server's event feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// The feed connection is established.
    Open,
    /// Raw data of one message, expected to hold a single JSON event.
    Message(String),
}

pub type EventFeed = Pin<Box<dyn Stream<Item = Result<FeedEvent, Error>> + Send>>;

/// The remote agent server.
#[async_trait]
pub trait AgentServer: Send + Sync {
    fn name(&self) -> &str;

    /// Open the long-lived event feed. The stream ends when the connection is
    /// lost.
    async fn subscribe(&self) -> Result<EventFeed, Error>;

    async fn create_session(&self) -> Result<String, Error>;

    /// Submit a user message. The server may hold the request open until the
    /// turn finishes, so this can resolve late; the response itself arrives
    /// over the event feed. Cancelling `cancel` yields [`Error::Cancelled`].
    async fn send_message(
        &self,
        session_id: &str,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<(), Error>;
}
