//! CSV upload client
//!
//! Posts one CSV file to the ingestion backend and turns whatever comes back
//! into a text response. Success and failure are not distinguished
//! structurally; the outcome message is shown as-is.

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};
use crate::http::{build_client, endpoint};
use crate::models::DisplayResponse;

/// HTTP client for `POST {ingest_url}/upload_csv`
#[derive(Debug, Clone)]
pub struct UploadClient {
    client: Client,
    base_url: String,
}

impl UploadClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ClientResult<Self> {
        Ok(Self {
            client: build_client(Some(timeout))?,
            base_url: base_url.into(),
        })
    }

    /// Upload `path` and describe the outcome
    pub async fn upload_csv(&self, path: &Path) -> DisplayResponse {
        match self.send_csv(path).await {
            Ok(body) => {
                let response = DisplayResponse::text(describe_upload_outcome(&body));
                info!(path = %path.display(), outcome = ?response.text, "CSV upload finished");
                response
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "CSV upload failed");
                DisplayResponse::text(format!("Failed to upload file: {}", e))
            }
        }
    }

    /// Post the file and return the JSON body, whatever the status
    async fn send_csv(&self, path: &Path) -> ClientResult<Value> {
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if !is_csv {
            return Err(ClientError::InvalidInput(format!(
                "{} is not a .csv file",
                path.display()
            )));
        }

        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.csv".to_string());
        debug!(file_name = %file_name, size = bytes.len(), "Uploading CSV");

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("text/csv")?;
        let form = Form::new().part("file", part);

        let url = endpoint(&self.base_url, "/upload_csv")?;
        let response = self.client.post(url).multipart(form).send().await?;
        let status = response.status();
        let text = response.text().await?;

        match serde_json::from_str::<Value>(&text) {
            Ok(body) => Ok(body),
            Err(_) if !status.is_success() => Err(ClientError::Status {
                status: status.as_u16(),
                body: text,
            }),
            Err(e) => Err(ClientError::Decode(format!("upload response: {}", e))),
        }
    }
}

/// Text shown for an ingestion response body
///
/// `message` wins, then `error`, then a summary of `status`/`inserted`,
/// then the raw JSON.
pub fn describe_upload_outcome(body: &Value) -> String {
    let field = |name: &str| {
        body.get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    };

    if let Some(message) = field("message") {
        return message.to_string();
    }
    if let Some(error) = field("error") {
        return error.to_string();
    }

    let inserted = body.get("inserted").and_then(Value::as_u64);
    match (field("status"), inserted) {
        (Some(status), Some(count)) => format!("Upload {}: {} rows inserted", status, count),
        (Some(status), None) => format!("Upload {}", status),
        (None, Some(count)) => format!("{} rows inserted", count),
        (None, None) => body.to_string(),
    }
}
