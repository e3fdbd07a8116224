//! Canonical display model
//!
//! Every backend result, error and upload outcome ends up as one
//! [`DisplayResponse`]. Text, image and table are independent optional
//! facets of one response and are all shown when present.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

/// One table row (column name → cell value, backend column order)
pub type TableRow = Map<String, Value>;

/// Response kind marker as declared by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseKind {
    Text,
    Image,
    Table,
    Chart,
    Mixed,
    /// Kind string the client does not know; facets are still displayed
    Other(String),
}

impl ResponseKind {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "text" => ResponseKind::Text,
            "image" => ResponseKind::Image,
            "table" => ResponseKind::Table,
            "chart" => ResponseKind::Chart,
            "mixed" => ResponseKind::Mixed,
            _ => ResponseKind::Other(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ResponseKind::Text => "text",
            ResponseKind::Image => "image",
            ResponseKind::Table => "table",
            ResponseKind::Chart => "chart",
            ResponseKind::Mixed => "mixed",
            ResponseKind::Other(raw) => raw,
        }
    }
}

/// Image payload: bare base64 or a `data:` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData(String);

impl ImageData {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn raw(&self) -> &str {
        &self.0
    }

    /// `data:` URL for the image; bare base64 is assumed to be PNG
    pub fn data_url(&self) -> String {
        if self.0.starts_with("data:image") {
            self.0.clone()
        } else {
            format!("data:image/png;base64,{}", self.0)
        }
    }

    /// MIME type declared by a `data:` URL, `image/png` otherwise
    pub fn mime_type(&self) -> &str {
        self.0
            .strip_prefix("data:")
            .and_then(|rest| rest.split([';', ',']).next())
            .filter(|mime| !mime.is_empty())
            .unwrap_or("image/png")
    }

    /// Decode the base64 body into raw bytes
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        let body = if self.0.starts_with("data:") {
            self.0.split_once(',').map(|(_, body)| body).unwrap_or("")
        } else {
            self.0.as_str()
        };
        let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
        STANDARD.decode(compact)
    }
}

/// Optional provenance attached by the backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ResponseMetadata {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
}

/// Canonical, UI-agnostic response
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayResponse {
    pub kind: ResponseKind,
    pub text: Option<String>,
    pub image: Option<ImageData>,
    pub table: Option<Vec<TableRow>>,
    pub metadata: Option<ResponseMetadata>,
}

impl DisplayResponse {
    /// Text-only response
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            kind: ResponseKind::Text,
            text: Some(body.into()),
            image: None,
            table: None,
            metadata: None,
        }
    }

    /// Read a value that already carries a `type` marker
    ///
    /// Facets are read leniently: empty strings and empty tables count as
    /// absent, scalar `text` values are rendered as strings, and table
    /// entries that are not records are skipped.
    pub fn from_canonical(value: &Value) -> Self {
        let kind = match value.get("type") {
            Some(Value::String(raw)) => ResponseKind::parse(raw),
            None | Some(Value::Null) => ResponseKind::Text,
            Some(other) => ResponseKind::Other(other.to_string()),
        };

        let text = match value.get("text") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(v @ (Value::Number(_) | Value::Bool(_))) => Some(v.to_string()),
            _ => None,
        };

        let image = value
            .get("image")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(ImageData::new);

        let table = value.get("table").and_then(Value::as_array).and_then(|rows| {
            let records: Vec<TableRow> = rows
                .iter()
                .filter_map(|row| match row {
                    Value::Object(map) => Some(map.clone()),
                    other => {
                        debug!(row = %other, "Skipping non-record table row");
                        None
                    }
                })
                .collect();
            (!records.is_empty()).then_some(records)
        });

        let metadata = value
            .get("metadata")
            .filter(|m| m.is_object())
            .and_then(|m| serde_json::from_value(m.clone()).ok());

        Self {
            kind,
            text,
            image,
            table,
            metadata,
        }
    }

    pub fn has_text(&self) -> bool {
        self.text.is_some()
    }

    pub fn has_image(&self) -> bool {
        self.image.is_some()
    }

    pub fn has_table(&self) -> bool {
        self.table.as_ref().is_some_and(|rows| !rows.is_empty())
    }

    /// True when no facet is present
    pub fn is_empty(&self) -> bool {
        !(self.has_text() || self.has_image() || self.has_table())
    }

    /// Column names of the table facet (keys of the first row)
    pub fn table_columns(&self) -> Vec<String> {
        self.table
            .as_ref()
            .and_then(|rows| rows.first())
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default()
    }
}
