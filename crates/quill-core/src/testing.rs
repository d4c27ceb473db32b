//! Test utilities shared across the workspace.
//! Only compiled when running tests or with the `testing` feature.

use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::server::{AgentServer, EventFeed, FeedEvent};

/// A mock server that replays a scripted feed and records sends.
pub struct MockServer {
    feed: Mutex<Vec<Result<FeedEvent, Error>>>,
    send_results: Mutex<Vec<Result<(), Error>>>,
    /// Captured `(session_id, text)` pairs (for assertion).
    pub sent: Mutex<Vec<(String, String)>>,
    pub session_id: String,
    /// When set, sends wait for cancellation instead of returning.
    pub hang_sends: bool,
    /// When set, the feed stays open after the scripted items.
    pub hold_feed: bool,
    held: Mutex<Vec<mpsc::Sender<Result<FeedEvent, Error>>>>,
}

impl MockServer {
    pub fn new() -> Self {
        Self {
            feed: Mutex::new(Vec::new()),
            send_results: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            session_id: "mock-session".to_string(),
            hang_sends: false,
            hold_feed: false,
            held: Mutex::new(Vec::new()),
        }
    }

    pub fn with_hanging_sends(mut self) -> Self {
        self.hang_sends = true;
        self
    }

    pub fn with_held_feed(mut self) -> Self {
        self.hold_feed = true;
        self
    }

    /// Queue a raw feed message. Messages are replayed in FIFO order after an
    /// initial `Open`.
    pub fn queue_message(&self, data: impl Into<String>) {
        self.feed
            .lock()
            .unwrap()
            .push(Ok(FeedEvent::Message(data.into())));
    }

    /// Queue a JSON event.
    pub fn queue_event(&self, event: serde_json::Value) {
        self.queue_message(event.to_string());
    }

    pub fn queue_feed_error(&self, error: Error) {
        self.feed.lock().unwrap().push(Err(error));
    }

    /// Queue the result of the next send (FIFO). Sends succeed when nothing
    /// is queued.
    pub fn queue_send_result(&self, result: Result<(), Error>) {
        self.send_results.lock().unwrap().insert(0, result);
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn last_sent(&self) -> Option<(String, String)> {
        self.sent.lock().unwrap().last().cloned()
    }
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentServer for MockServer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn subscribe(&self) -> Result<EventFeed, Error> {
        let items: Vec<_> = std::mem::take(&mut *self.feed.lock().unwrap());
        let (tx, rx) = mpsc::channel(items.len() + 1);
        let _ = tx.send(Ok(FeedEvent::Open)).await;
        for item in items {
            let _ = tx.send(item).await;
        }
        if self.hold_feed {
            self.held.lock().unwrap().push(tx);
        }
        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn create_session(&self) -> Result<String, Error> {
        Ok(self.session_id.clone())
    }

    async fn send_message(
        &self,
        session_id: &str,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<(), Error> {
        self.sent
            .lock()
            .unwrap()
            .push((session_id.to_string(), text.to_string()));
        if self.hang_sends {
            cancel.cancelled().await;
            return Err(Error::Cancelled);
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.send_results.lock().unwrap().pop().unwrap_or(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_mock_feed_replays_in_order() {
        let server = MockServer::new();
        server.queue_message("one");
        server.queue_message("two");
        let feed = server.subscribe().await.unwrap();
        let items: Vec<_> = feed.map(|r| r.unwrap()).collect().await;
        assert_eq!(
            items,
            vec![
                FeedEvent::Open,
                FeedEvent::Message("one".into()),
                FeedEvent::Message("two".into())
            ]
        );
    }

    #[tokio::test]
    async fn test_mock_send_records_and_cancels() {
        let server = MockServer::new().with_hanging_sends();
        let token = CancellationToken::new();
        let child = token.clone();
        let handle = tokio::spawn(async move {
            let result = server.send_message("s1", "hi", child).await;
            (result, server.send_count())
        });
        token.cancel();
        let (result, count) = handle.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(count, 1);
    }
}
