use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use quill_core::{AgentServer, Error, EventFeed, FeedEvent};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:4096";

/// HTTP client for a locally running agent server.
pub struct ServerClient {
    client: Client,
    base_url: String,
}

impl ServerClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn event_url(&self) -> String {
        format!("{}/event", self.base_url)
    }

    fn session_url(&self) -> String {
        format!("{}/session", self.base_url)
    }

    fn message_url(&self, session_id: &str) -> String {
        format!("{}/session/{}/message", self.base_url, session_id)
    }

    fn parse_error(status: u16, body: &str) -> Error {
        #[derive(Deserialize)]
        struct ErrorResponse {
            #[serde(default)]
            message: Option<String>,
            #[serde(default)]
            data: Option<ErrorData>,
        }

        #[derive(Deserialize)]
        struct ErrorData {
            #[serde(default)]
            message: Option<String>,
        }

        match serde_json::from_str::<ErrorResponse>(body) {
            Ok(ErrorResponse {
                message: Some(message),
                ..
            })
            | Ok(ErrorResponse {
                data: Some(ErrorData {
                    message: Some(message),
                }),
                ..
            }) => Error::api(status, message),
            _ => Error::api(status, body.to_string()),
        }
    }
}

impl Default for ServerClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

fn request_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else if e.is_connect() {
        Error::connection(e.to_string())
    } else {
        Error::network(e.to_string())
    }
}

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    parts: Vec<TextPartInput<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPartInput<'a> {
    #[serde(rename = "type")]
    part_type: &'static str,
    text: &'a str,
}

impl<'a> MessageRequest<'a> {
    fn text(text: &'a str) -> Self {
        Self {
            parts: vec![TextPartInput {
                part_type: "text",
                text,
            }],
        }
    }
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
}

#[async_trait]
impl AgentServer for ServerClient {
    fn name(&self) -> &str {
        "server"
    }

    async fn subscribe(&self) -> Result<EventFeed, Error> {
        debug!(url = %self.event_url(), "Opening event feed");

        let request_builder = self
            .client
            .get(self.event_url())
            .header("Accept", "text/event-stream");
        let es = EventSource::new(request_builder).map_err(|e| Error::stream(e.to_string()))?;

        let (tx, rx) = mpsc::channel::<Result<FeedEvent, Error>>(100);

        tokio::spawn(async move {
            let mut es = es;

            while let Some(event) = es.next().await {
                match event {
                    Ok(Event::Open) => {
                        debug!("Event feed connection opened");
                        if tx.send(Ok(FeedEvent::Open)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Event::Message(msg)) => {
                        trace!(event_type = %msg.event, data = %msg.data, "Feed SSE message");
                        if tx.send(Ok(FeedEvent::Message(msg.data))).await.is_err() {
                            break;
                        }
                    }
                    Err(reqwest_eventsource::Error::StreamEnded) => {
                        debug!("Event feed ended");
                        break;
                    }
                    Err(e) => {
                        error!(error = ?e, "Event feed error");
                        let _ = tx
                            .send(Err(Error::connection(format!("event feed: {e}"))))
                            .await;
                        break;
                    }
                }
            }

            es.close();
        });

        let stream = ReceiverStream::new(rx);
        Ok(Box::pin(stream) as EventFeed)
    }

    async fn create_session(&self) -> Result<String, Error> {
        let response = self
            .client
            .post(self.session_url())
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Self::parse_error(status.as_u16(), &error_text));
        }

        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| Error::serialization(e.to_string()))?;
        debug!(session_id = %session.id, "Created session");
        Ok(session.id)
    }

    async fn send_message(
        &self,
        session_id: &str,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<(), Error> {
        let body = MessageRequest::text(text);
        debug!(session_id = %session_id, chars = text.len(), "Sending message");

        let request = async {
            let response = self
                .client
                .post(self.message_url(session_id))
                .json(&body)
                .send()
                .await
                .map_err(request_error)?;

            let status = response.status();
            // The server may hold the request open until the turn finishes, so
            // the body is drained under the same cancellation.
            let body = response.text().await.map_err(request_error)?;
            if !status.is_success() {
                return Err(Self::parse_error(status.as_u16(), &body));
            }
            Ok(())
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(session_id = %session_id, "Send cancelled");
                Err(Error::Cancelled)
            }
            result = request => result,
        }
    }
}
