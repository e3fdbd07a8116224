//! Stream frame types for the query stream
//!
//! Wire shape of the JSON objects carried in the `data:` field of each SSE
//! event pushed by `/ask_stream`. The discriminant is the `type` field.
//!
//! The client classifies raw payloads itself (so unknown or malformed frames
//! can be dropped with a diagnostic); these types define the contract and are
//! what a producer serializes.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Frame pushed over the query stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamFrame {
    /// Progress output from the backend computation
    ///
    /// Only lines starting with the marker glyph are meant for the user.
    Log {
        /// One line of output
        message: String,
    },

    /// Terminal success frame
    Result {
        /// Backend response envelope (shape not fixed)
        #[serde(default)]
        answer: Value,
        /// Attempt history, one record per backend retry (optional)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        history: Option<Value>,
    },

    /// Terminal failure frame
    Error {
        /// Server-reported error message
        #[serde(default)]
        error: Option<String>,
    },
}

impl StreamFrame {
    /// Build a `log` frame
    pub fn log(message: impl Into<String>) -> Self {
        StreamFrame::Log {
            message: message.into(),
        }
    }

    /// Build a `result` frame without history
    pub fn result(answer: Value) -> Self {
        StreamFrame::Result {
            answer,
            history: None,
        }
    }

    /// Build an `error` frame
    pub fn error(message: impl Into<String>) -> Self {
        StreamFrame::Error {
            error: Some(message.into()),
        }
    }
}

/// One backend attempt (dev-mode history)
///
/// Supplied wholesale by the terminal `result` frame and never mutated by the
/// client. Attempt numbers are not validated for order or uniqueness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based attempt number as reported by the backend
    #[serde(default)]
    pub attempt: i64,
    /// Code generated for this attempt
    #[serde(default, deserialize_with = "null_as_default")]
    pub code: String,
    /// Failure text, `None` when the attempt succeeded
    #[serde(default)]
    pub error: Option<String>,
}

impl AttemptRecord {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
