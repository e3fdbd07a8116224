//! Event frame parser
//!
//! Classifies one raw SSE data payload into a typed [`Frame`]. Malformed or
//! unrecognized payloads are dropped with a diagnostic and never reach the
//! session: a single bad frame must not abort an otherwise healthy stream.

use fbq_common::events::{AttemptRecord, StreamFrame};
use serde_json::Value;
use tracing::{debug, warn};

/// Fallback text for an `error` frame that carries no message
const UNKNOWN_SERVER_ERROR: &str = "unknown error";

/// One classified frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Progress line (unfiltered)
    Log { message: String },
    /// Terminal success: response envelope plus attempt history
    Result {
        payload: Value,
        history: Vec<AttemptRecord>,
    },
    /// Terminal failure reported by the backend
    Error { message: String },
}

impl Frame {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Frame::Log { .. })
    }
}

/// Decode and classify one pushed message
///
/// Returns `None` for payloads that are not JSON, have no string `type`, carry
/// an unknown `type`, or do not match the shape of their `type`.
pub fn parse_frame(raw: &str) -> Option<Frame> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "Dropping undecodable stream frame");
            return None;
        }
    };

    let frame_type = match value.get("type").and_then(Value::as_str) {
        Some(t) => t.to_string(),
        None => {
            warn!("Dropping stream frame without a type discriminant");
            return None;
        }
    };

    if !matches!(frame_type.as_str(), "log" | "result" | "error") {
        warn!(frame_type = %frame_type, "Dropping stream frame of unrecognized type");
        return None;
    }

    let frame: StreamFrame = match serde_json::from_value(value) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(frame_type = %frame_type, error = %e, "Dropping malformed stream frame");
            return None;
        }
    };

    debug!(frame_type = %frame_type, "Stream frame classified");

    Some(match frame {
        StreamFrame::Log { message } => Frame::Log { message },
        StreamFrame::Result { answer, history } => Frame::Result {
            payload: answer,
            history: decode_history(history),
        },
        StreamFrame::Error { error } => Frame::Error {
            message: error
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| UNKNOWN_SERVER_ERROR.to_string()),
        },
    })
}

/// Decode attempt history leniently
///
/// Missing or `null` history is empty; entries that do not decode are skipped
/// so a malformed record cannot discard the terminal frame.
pub(crate) fn decode_history(history: Option<Value>) -> Vec<AttemptRecord> {
    let entries = match history {
        None | Some(Value::Null) => return Vec::new(),
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            warn!(history = %other, "Ignoring non-array attempt history");
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value(entry) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(index, error = %e, "Skipping malformed attempt record");
                None
            }
        })
        .collect()
}
