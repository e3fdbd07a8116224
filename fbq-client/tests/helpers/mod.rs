//! Test Helper Utilities
//!
//! Mock query and ingestion backend for fbq-client integration tests. One
//! axum server on an ephemeral port serves every endpoint the client uses.

#![allow(dead_code)]

use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use fbq_common::events::StreamFrame;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One step of a scripted SSE stream
#[derive(Debug, Clone)]
pub enum StreamStep {
    /// Unnamed event carrying this data
    Data(String),
    /// Named event (ignored by the client)
    Named(String, String),
    /// Keep the connection open without sending anything
    Hang,
}

impl StreamStep {
    pub fn frame(value: Value) -> Self {
        StreamStep::Data(value.to_string())
    }

    pub fn log(message: &str) -> Self {
        Self::frame(serde_json::to_value(StreamFrame::log(message)).unwrap())
    }
}

/// Upload received by the mock ingestion endpoint
#[derive(Debug, Clone)]
pub struct ReceivedUpload {
    pub field: String,
    pub file_name: Option<String>,
    pub content: String,
}

#[derive(Default)]
struct MockState {
    streams: HashMap<String, Vec<StreamStep>>,
    feedbacks: Vec<Value>,
    failing_offices: Vec<String>,
    upload_reply: Option<(StatusCode, Value)>,
    ask_reply: Option<Value>,
    stream_requests: Mutex<Vec<String>>,
    feedback_requests: Mutex<Vec<HashMap<String, String>>>,
    uploads: Mutex<Vec<ReceivedUpload>>,
}

/// Builder for [`MockBackend`]
#[derive(Default)]
pub struct MockBackendBuilder {
    state: MockState,
}

impl MockBackendBuilder {
    /// Script the SSE stream answered for `question`
    pub fn stream(mut self, question: &str, steps: Vec<StreamStep>) -> Self {
        self.state.streams.insert(question.to_string(), steps);
        self
    }

    /// Rows served by `/feedbacks` (filtered by office/service/Level)
    pub fn feedbacks(mut self, rows: Value) -> Self {
        self.state.feedbacks = rows.as_array().cloned().unwrap_or_default();
        self
    }

    /// `/feedbacks?office=<office>` answers 500
    pub fn failing_office(mut self, office: &str) -> Self {
        self.state.failing_offices.push(office.to_string());
        self
    }

    pub fn upload_reply(mut self, status: StatusCode, body: Value) -> Self {
        self.state.upload_reply = Some((status, body));
        self
    }

    pub fn ask_reply(mut self, body: Value) -> Self {
        self.state.ask_reply = Some(body);
        self
    }

    pub async fn start(self) -> MockBackend {
        let state = Arc::new(self.state);
        let app = Router::new()
            .route("/ask_stream", get(ask_stream))
            .route("/ask", post(ask))
            .route("/feedbacks", get(feedbacks))
            .route("/upload_csv", post(upload_csv))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        MockBackend {
            base_url: format!("http://{}", addr),
            state,
        }
    }
}

/// Running mock backend
pub struct MockBackend {
    pub base_url: String,
    state: Arc<MockState>,
}

impl MockBackend {
    pub fn builder() -> MockBackendBuilder {
        MockBackendBuilder::default()
    }

    /// Questions received on `/ask_stream`, in arrival order
    pub fn stream_requests(&self) -> Vec<String> {
        self.state.stream_requests.lock().unwrap().clone()
    }

    /// Query parameters received on `/feedbacks`, in arrival order
    pub fn feedback_requests(&self) -> Vec<HashMap<String, String>> {
        self.state.feedback_requests.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<ReceivedUpload> {
        self.state.uploads.lock().unwrap().clone()
    }
}

async fn ask_stream(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let question = params.get("question").cloned().unwrap_or_default();
    state.stream_requests.lock().unwrap().push(question.clone());

    let Some(steps) = state.streams.get(&question).cloned() else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "no script for question").into_response();
    };

    let stream = async_stream::stream! {
        for step in steps {
            match step {
                StreamStep::Data(data) => {
                    yield Ok::<Event, Infallible>(Event::default().data(data))
                }
                StreamStep::Named(name, data) => {
                    yield Ok::<Event, Infallible>(Event::default().event(name).data(data))
                }
                StreamStep::Hang => tokio::time::sleep(Duration::from_secs(3600)).await,
            }
        }
    };

    Sse::new(stream).into_response()
}

async fn ask(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    if body.get("question").and_then(Value::as_str).is_none() {
        return (StatusCode::UNPROCESSABLE_ENTITY, "missing question").into_response();
    }
    match &state.ask_reply {
        Some(reply) => Json(reply.clone()).into_response(),
        None => (StatusCode::INTERNAL_SERVER_ERROR, "no reply configured").into_response(),
    }
}

async fn feedbacks(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state.feedback_requests.lock().unwrap().push(params.clone());

    if let Some(office) = params.get("office") {
        if state.failing_offices.contains(office) {
            return (StatusCode::INTERNAL_SERVER_ERROR, "qdrant unavailable").into_response();
        }
    }

    let matches = |row: &Value, field: &str, param: &str| match params.get(param) {
        None => true,
        Some(wanted) => match row.get(field) {
            Some(Value::String(s)) => s == wanted,
            Some(other) => other.to_string() == *wanted,
            None => false,
        },
    };

    let rows: Vec<Value> = state
        .feedbacks
        .iter()
        .filter(|row| {
            matches(row, "office", "office")
                && matches(row, "service", "service")
                && matches(row, "Level", "level")
        })
        .cloned()
        .collect();

    Json(json!({ "feedbacks": rows })).into_response()
}

async fn upload_csv(State(state): State<Arc<MockState>>, mut multipart: Multipart) -> Response {
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content = field.text().await.unwrap_or_default();
        state.uploads.lock().unwrap().push(ReceivedUpload {
            field: name,
            file_name,
            content,
        });
    }

    let (status, body) = state
        .upload_reply
        .clone()
        .unwrap_or((StatusCode::OK, json!({"status": "success", "inserted": 0})));
    (status, Json(body)).into_response()
}
