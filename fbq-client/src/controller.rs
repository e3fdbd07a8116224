//! Session controller
//!
//! Owns the one active [`Session`] and the stream feeding it. Events from the
//! connector arrive over an unbounded channel and are handled one at a time
//! on the caller's task:
//!
//! ```text
//! submit(q) ──► Loading ──log──► Loading (transcript grows)
//!                  │
//!                  ├──result──► Done     (stream closed)
//!                  ├──error───► Errored  (stream closed)
//!                  └──failure─► Errored  (stream closed)
//! ```
//!
//! Every event carries the id of the session that opened its stream. Events
//! for any other session, or for a session that already reached a terminal
//! state, are ignored.

use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::frame::{parse_frame, Frame};
use crate::models::{DisplayResponse, Session, SessionState, StateTransition};
use crate::normalizer::normalize;
use crate::stream::{EventSink, SessionEvent, StreamConnector, StreamEvent, StreamHandle};

/// Displayed when the stream fails before a terminal frame
pub const CONNECTION_FAILED_TEXT: &str = "Connection to the query stream failed";

/// Displayed when the optional stall timeout fires
pub const STREAM_TIMEOUT_TEXT: &str = "Connection to the query stream timed out";

/// What handling one event did to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Event belongs to another session or arrived after a terminal state
    Stale,
    /// Payload could not be classified
    Dropped,
    /// Log line without the marker
    Filtered,
    /// Log line accepted into the transcript (marker stripped)
    Appended(String),
    /// Result frame; session is `Done`
    Completed,
    /// Error frame or transport failure; session is `Errored`
    Failed,
}

impl FrameOutcome {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FrameOutcome::Completed | FrameOutcome::Failed)
    }
}

/// Drives one query session at a time
pub struct SessionController<C: StreamConnector> {
    connector: C,
    marker: char,
    stream_timeout: Option<Duration>,
    session: Session,
    active: Option<StreamHandle>,
    sink: EventSink,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl<C: StreamConnector> SessionController<C> {
    pub fn new(connector: C, marker: char) -> Self {
        let (sink, events) = mpsc::unbounded_channel();
        Self {
            connector,
            marker,
            stream_timeout: None,
            session: Session::idle(marker),
            active: None,
            sink,
            events,
        }
    }

    /// Treat `timeout` without any event as a transport failure
    pub fn with_stream_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stream_timeout = timeout;
        self
    }

    pub fn stream_timeout(&self) -> Option<Duration> {
        self.stream_timeout
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// True while a stream is open for the current session
    pub fn is_stream_open(&self) -> bool {
        self.active.as_ref().is_some_and(|handle| !handle.is_closed())
    }

    /// Start a new session for `query`
    ///
    /// Blank queries are ignored and return `None`. Otherwise any prior
    /// stream is closed, the session is replaced and exactly one new stream
    /// is opened; the new session id is returned.
    pub fn submit(&mut self, query: &str) -> Option<Uuid> {
        let query = query.trim();
        if query.is_empty() {
            debug!("Ignoring blank query");
            return None;
        }

        if let Some(previous) = self.active.take() {
            debug!(session_id = %self.session.id(), "Superseding in-flight session");
            previous.close();
        }

        self.session = Session::start(query.to_string(), self.marker);
        let session_id = self.session.id();
        info!(session_id = %session_id, query = %query, "Query session started");

        self.active = Some(self.connector.open(session_id, query, self.sink.clone()));
        Some(session_id)
    }

    /// Apply one stream event to the current session
    pub fn handle_event(&mut self, event: SessionEvent) -> FrameOutcome {
        if event.session_id != self.session.id() || self.session.state() != SessionState::Loading
        {
            debug!(
                event_session = %event.session_id,
                current_session = %self.session.id(),
                "Ignoring stale stream event"
            );
            return FrameOutcome::Stale;
        }

        match event.kind {
            StreamEvent::Message(raw) => self.handle_message(&raw),
            StreamEvent::Failed(reason) => {
                warn!(
                    session_id = %self.session.id(),
                    reason = %reason,
                    "Query stream failed before a terminal frame"
                );
                self.fail(CONNECTION_FAILED_TEXT.to_string());
                FrameOutcome::Failed
            }
        }
    }

    fn handle_message(&mut self, raw: &str) -> FrameOutcome {
        let Some(frame) = parse_frame(raw) else {
            return FrameOutcome::Dropped;
        };

        match frame {
            Frame::Log { message } => match self.session.record_log(&message) {
                Some(line) => FrameOutcome::Appended(line.to_string()),
                None => {
                    debug!(message = %message, "Filtered unmarked log line");
                    FrameOutcome::Filtered
                }
            },
            Frame::Result { payload, history } => {
                let response = normalize(&payload);
                let transition = self.session.complete(response, history);
                self.finish(transition);
                FrameOutcome::Completed
            }
            Frame::Error { message } => {
                self.fail(format!("Server error: {}", message));
                FrameOutcome::Failed
            }
        }
    }

    /// Fail a loading session whose stream went quiet for too long
    ///
    /// Returns false when no session is loading.
    pub fn fail_stalled(&mut self) -> bool {
        if self.session.state() != SessionState::Loading {
            return false;
        }
        warn!(
            session_id = %self.session.id(),
            timeout = ?self.stream_timeout,
            "Query stream stalled"
        );
        self.fail(STREAM_TIMEOUT_TEXT.to_string());
        true
    }

    fn fail(&mut self, text: String) {
        let transition = self.session.fail(DisplayResponse::text(text));
        self.finish(transition);
    }

    /// Close the stream after a terminal transition
    fn finish(&mut self, transition: StateTransition) {
        if let Some(handle) = self.active.take() {
            handle.close();
        }
        info!(
            session_id = %transition.session_id,
            old_state = ?transition.old_state,
            new_state = ?transition.new_state,
            log_lines = self.session.transcript().len(),
            "Query session finished"
        );
    }

    /// Wait for the next event from any stream
    ///
    /// The controller keeps its own sender alive, so this only resolves when
    /// an event arrives.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Pump events until the current session is terminal
    ///
    /// `on_progress` sees every newly accepted transcript line. Returns
    /// immediately when no session is loading.
    pub async fn run_to_completion<F>(&mut self, mut on_progress: F) -> SessionState
    where
        F: FnMut(&str),
    {
        while self.session.state() == SessionState::Loading {
            let event = match self.stream_timeout {
                Some(limit) => match tokio::time::timeout(limit, self.events.recv()).await {
                    Ok(event) => event,
                    Err(_) => {
                        self.fail_stalled();
                        break;
                    }
                },
                None => self.events.recv().await,
            };

            let Some(event) = event else {
                break;
            };
            if let FrameOutcome::Appended(line) = self.handle_event(event) {
                on_progress(&line);
            }
        }

        self.session.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResponseKind;
    use std::cell::RefCell;
    use tokio_util::sync::CancellationToken;

    /// Connector that records every open and lets tests push events
    #[derive(Default)]
    struct FakeConnector {
        opened: RefCell<Vec<(Uuid, String, EventSink, StreamHandle)>>,
    }

    impl FakeConnector {
        fn open_count(&self) -> usize {
            self.opened.borrow().len()
        }

        fn handle(&self, index: usize) -> StreamHandle {
            self.opened.borrow()[index].3.clone()
        }

        fn push(&self, index: usize, data: &str) {
            let opened = self.opened.borrow();
            let (session_id, _, sink, _) = &opened[index];
            sink.send(SessionEvent::message(*session_id, data)).unwrap();
        }

        fn push_failure(&self, index: usize, reason: &str) {
            let opened = self.opened.borrow();
            let (session_id, _, sink, _) = &opened[index];
            sink.send(SessionEvent::failed(*session_id, reason)).unwrap();
        }
    }

    impl StreamConnector for FakeConnector {
        fn open(&self, session_id: Uuid, query: &str, sink: EventSink) -> StreamHandle {
            let handle = StreamHandle::new(CancellationToken::new());
            self.opened
                .borrow_mut()
                .push((session_id, query.to_string(), sink, handle.clone()));
            handle
        }
    }

    fn controller() -> SessionController<FakeConnector> {
        SessionController::new(FakeConnector::default(), '§')
    }

    fn log(message: &str) -> String {
        serde_json::json!({"type": "log", "message": message}).to_string()
    }

    #[test]
    fn test_initial_state_is_idle() {
        let controller = controller();
        assert_eq!(controller.state(), SessionState::Idle);
        assert!(!controller.is_stream_open());
        assert!(controller.session().result().is_none());
    }

    #[test]
    fn test_blank_submit_is_ignored() {
        let mut controller = controller();
        assert!(controller.submit("   \t").is_none());
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(controller.connector().open_count(), 0);
    }

    #[test]
    fn test_submit_opens_one_stream() {
        let mut controller = controller();
        let id = controller.submit("  q  ").unwrap();

        assert_eq!(controller.state(), SessionState::Loading);
        assert!(controller.session().transcript().is_empty());
        assert_eq!(controller.session().query(), "q");
        assert_eq!(controller.session().id(), id);
        assert!(controller.is_stream_open());

        let opened = controller.connector().opened.borrow();
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].0, id);
        assert_eq!(opened[0].1, "q");
    }

    #[test]
    fn test_log_frames_keep_loading() {
        let mut controller = controller();
        let id = controller.submit("q").unwrap();

        let outcome = controller.handle_event(SessionEvent::message(id, log("§ step1")));
        assert_eq!(outcome, FrameOutcome::Appended("step1".to_string()));
        let outcome = controller.handle_event(SessionEvent::message(id, log("internal debug")));
        assert_eq!(outcome, FrameOutcome::Filtered);
        let outcome = controller.handle_event(SessionEvent::message(id, "not json"));
        assert_eq!(outcome, FrameOutcome::Dropped);

        assert_eq!(controller.state(), SessionState::Loading);
        assert!(controller.is_stream_open());
        assert_eq!(controller.session().transcript().entries(), ["step1"]);
    }

    #[test]
    fn test_result_frame_completes_and_closes() {
        let mut controller = controller();
        let id = controller.submit("q").unwrap();

        let result = serde_json::json!({
            "type": "result",
            "answer": {"type": "text", "text": "42"},
            "history": [{"attempt": 1, "code": "x = 1", "error": null}]
        });
        let outcome = controller.handle_event(SessionEvent::message(id, result.to_string()));

        assert_eq!(outcome, FrameOutcome::Completed);
        assert_eq!(controller.state(), SessionState::Done);
        assert!(!controller.is_stream_open());
        assert!(controller.connector().handle(0).is_closed());
        assert_eq!(
            controller.session().result(),
            Some(&DisplayResponse::text("42"))
        );
        assert_eq!(controller.session().history().len(), 1);
    }

    #[test]
    fn test_error_frame_fails_and_closes() {
        let mut controller = controller();
        let id = controller.submit("q").unwrap();

        let error = serde_json::json!({"type": "error", "error": "boom"});
        let outcome = controller.handle_event(SessionEvent::message(id, error.to_string()));

        assert_eq!(outcome, FrameOutcome::Failed);
        assert_eq!(controller.state(), SessionState::Errored);
        assert!(controller.connector().handle(0).is_closed());
        let result = controller.session().result().unwrap();
        assert_eq!(result.kind, ResponseKind::Text);
        assert_eq!(result.text.as_deref(), Some("Server error: boom"));
    }

    #[test]
    fn test_transport_failure_fails_and_closes() {
        let mut controller = controller();
        let id = controller.submit("q").unwrap();
        controller.handle_event(SessionEvent::message(id, log("§ step1")));

        let outcome = controller.handle_event(SessionEvent::failed(id, "connection reset"));

        assert_eq!(outcome, FrameOutcome::Failed);
        assert_eq!(controller.state(), SessionState::Errored);
        assert!(!controller.is_stream_open());
        assert_eq!(
            controller.session().result(),
            Some(&DisplayResponse::text(CONNECTION_FAILED_TEXT))
        );
        assert_eq!(controller.session().transcript().entries(), ["step1"]);
    }

    #[test]
    fn test_frames_after_terminal_state_are_ignored() {
        let mut controller = controller();
        let id = controller.submit("q").unwrap();
        let error = serde_json::json!({"type": "error", "error": "boom"}).to_string();
        controller.handle_event(SessionEvent::message(id, error));

        let outcome = controller.handle_event(SessionEvent::message(id, log("§ late")));
        assert_eq!(outcome, FrameOutcome::Stale);
        let result = serde_json::json!({"type": "result", "answer": {"type": "text", "text": "late"}});
        let outcome = controller.handle_event(SessionEvent::message(id, result.to_string()));
        assert_eq!(outcome, FrameOutcome::Stale);

        assert_eq!(controller.state(), SessionState::Errored);
        assert!(controller.session().transcript().is_empty());
        assert_eq!(
            controller.session().result().unwrap().text.as_deref(),
            Some("Server error: boom")
        );
    }

    #[test]
    fn test_new_submission_supersedes_prior_session() {
        let mut controller = controller();
        let first = controller.submit("first").unwrap();
        controller.handle_event(SessionEvent::message(first, log("§ old step")));

        let second = controller.submit("second").unwrap();
        assert_ne!(first, second);
        assert!(controller.connector().handle(0).is_closed());
        assert!(!controller.connector().handle(1).is_closed());
        assert!(controller.session().transcript().is_empty());

        // A frame already in flight from the first stream must not leak in
        let outcome = controller.handle_event(SessionEvent::message(first, log("§ leaked")));
        assert_eq!(outcome, FrameOutcome::Stale);
        assert!(controller.session().transcript().is_empty());
        assert_eq!(controller.state(), SessionState::Loading);
    }

    #[tokio::test]
    async fn test_run_to_completion_reports_progress() {
        let mut controller = controller();
        controller.submit("how many feedbacks?").unwrap();
        controller.connector().push(0, &log("§ step1"));
        controller.connector().push(0, &log("internal debug"));
        controller.connector().push(0, &log("§ step2"));
        controller.connector().push(
            0,
            &serde_json::json!({"type": "result", "answer": {"type": "text", "text": "42"}})
                .to_string(),
        );

        let mut progress = Vec::new();
        let state = controller
            .run_to_completion(|line| progress.push(line.to_string()))
            .await;

        assert_eq!(state, SessionState::Done);
        assert_eq!(progress, vec!["step1", "step2"]);
        assert_eq!(
            controller.session().result(),
            Some(&DisplayResponse::text("42"))
        );
    }

    #[tokio::test]
    async fn test_run_to_completion_skips_superseded_events() {
        let mut controller = controller();
        controller.submit("first").unwrap();
        controller.connector().push(0, &log("§ from first"));
        controller.submit("second").unwrap();
        controller.connector().push_failure(1, "stream ended before a terminal frame");

        let state = controller.run_to_completion(|_| {}).await;

        assert_eq!(state, SessionState::Errored);
        assert!(controller.session().transcript().is_empty());
    }

    #[tokio::test]
    async fn test_run_to_completion_without_session_returns_immediately() {
        let mut controller = controller();
        let state = controller.run_to_completion(|_| {}).await;
        assert_eq!(state, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_stall_timeout_fails_session() {
        let mut controller = controller().with_stream_timeout(Some(Duration::from_millis(50)));
        controller.submit("q").unwrap();
        controller.connector().push(0, &log("§ step1"));

        let state = controller.run_to_completion(|_| {}).await;

        assert_eq!(state, SessionState::Errored);
        assert!(!controller.is_stream_open());
        assert_eq!(
            controller.session().result(),
            Some(&DisplayResponse::text(STREAM_TIMEOUT_TEXT))
        );
        assert_eq!(controller.session().transcript().entries(), ["step1"]);
    }

    #[test]
    fn test_fail_stalled_only_affects_loading_session() {
        let mut controller = controller();
        assert!(!controller.fail_stalled());
        assert_eq!(controller.state(), SessionState::Idle);

        controller.submit("q").unwrap();
        assert!(controller.fail_stalled());
        assert_eq!(controller.state(), SessionState::Errored);
        assert!(!controller.is_stream_open());
        assert!(controller.connector().handle(0).is_closed());
        assert_eq!(
            controller.session().result(),
            Some(&DisplayResponse::text(STREAM_TIMEOUT_TEXT))
        );

        assert!(!controller.fail_stalled());
    }
}
