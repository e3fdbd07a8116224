//! Query session state machine
//!
//! A session progresses through 4 states:
//! IDLE → LOADING → DONE | ERRORED
//!
//! A new submission replaces the session wholesale (fresh id, empty
//! transcript, no result). Only the session controller mutates a session.

use chrono::{DateTime, Utc};
use fbq_common::events::AttemptRecord;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::DisplayResponse;
use crate::transcript::Transcript;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionState {
    /// No query submitted yet
    Idle,
    /// Stream open, waiting for a terminal frame
    Loading,
    /// Result frame received
    Done,
    /// Error frame or transport failure
    Errored,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Done | SessionState::Errored)
    }
}

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub session_id: Uuid,
    pub old_state: SessionState,
    pub new_state: SessionState,
    pub transitioned_at: DateTime<Utc>,
}

/// One query session
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    query: String,
    state: SessionState,
    transcript: Transcript,
    result: Option<DisplayResponse>,
    history: Vec<AttemptRecord>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Placeholder session before the first submission
    pub fn idle(marker: char) -> Self {
        Self {
            id: Uuid::nil(),
            query: String::new(),
            state: SessionState::Idle,
            transcript: Transcript::new(marker),
            result: None,
            history: Vec::new(),
            started_at: None,
            ended_at: None,
        }
    }

    /// New loading session for `query`
    pub(crate) fn start(query: String, marker: char) -> Self {
        Self {
            id: Uuid::new_v4(),
            query,
            state: SessionState::Loading,
            transcript: Transcript::new(marker),
            result: None,
            history: Vec::new(),
            started_at: Some(Utc::now()),
            ended_at: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn result(&self) -> Option<&DisplayResponse> {
        self.result.as_ref()
    }

    /// Attempt history from the result frame (empty otherwise)
    pub fn history(&self) -> &[AttemptRecord] {
        &self.history
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Feed one log message through the marker filter
    pub(crate) fn record_log(&mut self, message: &str) -> Option<&str> {
        self.transcript.accept(message)
    }

    /// Terminal success
    pub(crate) fn complete(
        &mut self,
        result: DisplayResponse,
        history: Vec<AttemptRecord>,
    ) -> StateTransition {
        self.result = Some(result);
        self.history = history;
        self.transition_to(SessionState::Done)
    }

    /// Terminal failure
    pub(crate) fn fail(&mut self, result: DisplayResponse) -> StateTransition {
        self.result = Some(result);
        self.transition_to(SessionState::Errored)
    }

    fn transition_to(&mut self, new_state: SessionState) -> StateTransition {
        let transition = StateTransition {
            session_id: self.id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if new_state.is_terminal() {
            self.ended_at = Some(transition.transitioned_at);
        }

        transition
    }
}
