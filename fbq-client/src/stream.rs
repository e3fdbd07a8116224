//! Query stream transport
//!
//! The session controller never talks HTTP directly. It asks a
//! [`StreamConnector`] to open a stream for one session; the connector pushes
//! session-tagged [`SessionEvent`]s into the controller's channel and hands
//! back a [`StreamHandle`] the controller uses to close the stream.
//!
//! The HTTP connector runs one pump task per stream: it reads the SSE body,
//! decodes it, and forwards raw data payloads. It never touches session
//! state; classification and all state changes happen in the controller.

use fbq_common::sse::{SseDecoder, SseEvent};
use futures::StreamExt;
use reqwest::{header, Client, Url};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ClientError, ClientResult};
use crate::frame::decode_history;
use crate::http::{build_client, endpoint};
use crate::models::DisplayResponse;
use crate::normalizer::normalize;
use fbq_common::events::AttemptRecord;

/// What happened on a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// One SSE data payload, not yet classified
    Message(String),
    /// The stream failed or ended; no more events will follow
    Failed(String),
}

/// Stream event tagged with the session that opened the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub session_id: Uuid,
    pub kind: StreamEvent,
}

impl SessionEvent {
    pub fn message(session_id: Uuid, data: impl Into<String>) -> Self {
        Self {
            session_id,
            kind: StreamEvent::Message(data.into()),
        }
    }

    pub fn failed(session_id: Uuid, reason: impl Into<String>) -> Self {
        Self {
            session_id,
            kind: StreamEvent::Failed(reason.into()),
        }
    }
}

/// Channel end a connector pushes events into
pub type EventSink = mpsc::UnboundedSender<SessionEvent>;

/// Handle to one open stream
///
/// Closing is best-effort and client-side only: the pump stops reading and
/// drops the connection, the backend may keep computing.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    cancel: CancellationToken,
}

impl StreamHandle {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Opens query streams on behalf of the session controller
pub trait StreamConnector {
    /// Open one stream for `query`
    ///
    /// Every event produced by this stream must carry `session_id`.
    fn open(&self, session_id: Uuid, query: &str, sink: EventSink) -> StreamHandle;
}

/// Result of the non-streaming `/ask` endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct OneShotAnswer {
    pub response: DisplayResponse,
    pub history: Vec<AttemptRecord>,
}

/// HTTP connector for `GET {query_url}/ask_stream?question=…`
#[derive(Debug, Clone)]
pub struct HttpStreamConnector {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpStreamConnector {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> ClientResult<Self> {
        Ok(Self {
            client: build_client(None)?,
            base_url: base_url.into(),
            request_timeout,
        })
    }

    /// Streaming endpoint URL for one question
    pub fn stream_url(&self, query: &str) -> ClientResult<Url> {
        let mut url = endpoint(&self.base_url, "/ask_stream")?;
        url.query_pairs_mut().append_pair("question", query);
        Ok(url)
    }

    /// Ask through the non-streaming endpoint
    ///
    /// No progress lines are available on this path; the answer envelope goes
    /// through the same normalizer as streamed results.
    pub async fn ask_once(&self, question: &str) -> ClientResult<OneShotAnswer> {
        let url = endpoint(&self.base_url, "/ask")?;
        debug!(url = %url, "Sending one-shot query");

        let response = self
            .client
            .post(url)
            .timeout(self.request_timeout)
            .json(&json!({ "question": question }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await);
        }

        let mut body: Value = response.json().await?;
        let history = decode_history(body.get_mut("dev_history").map(Value::take));
        Ok(OneShotAnswer {
            response: normalize(&body),
            history,
        })
    }
}

impl StreamConnector for HttpStreamConnector {
    fn open(&self, session_id: Uuid, query: &str, sink: EventSink) -> StreamHandle {
        let cancel = CancellationToken::new();
        let handle = StreamHandle::new(cancel.clone());
        let client = self.client.clone();
        let url = self.stream_url(query);

        tokio::spawn(async move {
            let url = match url {
                Ok(url) => url,
                Err(e) => {
                    let _ = sink.send(SessionEvent::failed(session_id, e.to_string()));
                    return;
                }
            };

            info!(session_id = %session_id, "Opening query stream");
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(session_id = %session_id, "Query stream closed by client");
                }
                _ = pump(client, url, session_id, &sink) => {}
            }
        });

        handle
    }
}

/// Read one SSE response body and forward its events
async fn pump(client: Client, url: Url, session_id: Uuid, sink: &EventSink) {
    let response = match client
        .get(url)
        .header(header::ACCEPT, "text/event-stream")
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "Query stream request failed");
            let _ = sink.send(SessionEvent::failed(session_id, e.to_string()));
            return;
        }
    };

    if !response.status().is_success() {
        let err = ClientError::from_response(response).await;
        warn!(session_id = %session_id, error = %err, "Query stream rejected");
        let _ = sink.send(SessionEvent::failed(session_id, err.to_string()));
        return;
    }

    let mut decoder = SseDecoder::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(bytes) => {
                for event in decoder.push(&bytes) {
                    if !forward(session_id, event, sink) {
                        return;
                    }
                }
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Query stream read failed");
                let _ = sink.send(SessionEvent::failed(session_id, e.to_string()));
                return;
            }
        }
    }

    if let Some(event) = decoder.finish() {
        if !forward(session_id, event, sink) {
            return;
        }
    }

    debug!(session_id = %session_id, "Query stream body ended");
    let _ = sink.send(SessionEvent::failed(
        session_id,
        "stream ended before a terminal frame",
    ));
}

/// Forward one decoded SSE event; `false` once the receiver is gone
fn forward(session_id: Uuid, event: SseEvent, sink: &EventSink) -> bool {
    if !event.is_message() {
        debug!(event = ?event.event, "Ignoring named SSE event");
        return true;
    }
    sink.send(SessionEvent::message(session_id, event.data)).is_ok()
}
