//! Feedback query component
//!
//! Fetches filtered feedback rows from the query backend and derives the
//! filter option lists (facets) from the rows it fetched. Facets are never
//! requested from the server.
//!
//! A failed load keeps the previously loaded rows and facets and records an
//! error string instead.

use reqwest::Client;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};
use crate::http::{build_client, endpoint};

/// Default table columns when no rows are loaded
pub const DEFAULT_COLUMNS: [&str; 2] = ["ID", "Text"];

/// One feedback record; schema is determined by the backend
pub type FeedbackRow = Map<String, Value>;

/// Equality filters sent as query parameters
///
/// Blank filters (unset or whitespace-only) are omitted from the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackFilters {
    pub office: Option<String>,
    pub service: Option<String>,
    pub level: Option<String>,
}

impl FeedbackFilters {
    /// Query parameters for the non-blank filters, in office/service/level order
    pub fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("office", &self.office),
            ("service", &self.service),
            ("level", &self.level),
        ]
        .into_iter()
        .filter_map(|(name, value)| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (name, v))
        })
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.query_pairs().is_empty()
    }
}

/// Filter option lists derived from loaded rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FacetOptions {
    /// Distinct offices in encounter order
    pub offices: Vec<Value>,
    /// Distinct services in encounter order
    pub services: Vec<Value>,
    /// Distinct levels, numbers ascending then strings
    pub levels: Vec<Value>,
}

/// Derive facet options from `rows`
pub fn derive_facets(rows: &[FeedbackRow]) -> FacetOptions {
    let offices = distinct(rows.iter().filter_map(|row| row.get("office")), true);
    let services = distinct(rows.iter().filter_map(|row| row.get("service")), true);
    let mut levels = distinct(rows.iter().filter_map(level_of), false);
    levels.sort_by(compare_levels);

    FacetOptions {
        offices,
        services,
        levels,
    }
}

/// Level field of a row; the backend stores it capitalised
fn level_of(row: &FeedbackRow) -> Option<&Value> {
    row.get("Level")
        .filter(|v| !v.is_null())
        .or_else(|| row.get("level"))
}

/// Distinct non-null values in encounter order
///
/// With `skip_empty`, empty strings are not options either.
fn distinct<'a>(values: impl Iterator<Item = &'a Value>, skip_empty: bool) -> Vec<Value> {
    let mut seen = HashSet::new();
    values
        .filter(|v| match v {
            Value::Null => false,
            Value::String(s) => !(skip_empty && s.is_empty()),
            _ => true,
        })
        .filter(|v| seen.insert(v.to_string()))
        .cloned()
        .collect()
}

fn compare_levels(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Number(_) => 0,
            Value::String(_) => 1,
            _ => 2,
        }
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a)
            .cmp(&rank(b))
            .then_with(|| a.to_string().cmp(&b.to_string())),
    }
}

/// Facet value as shown to the user and sent back as a filter
pub fn facet_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Rows, filters and status of the feedback view
#[derive(Debug, Clone, Default)]
pub struct FeedbackQueryState {
    rows: Vec<FeedbackRow>,
    filters: FeedbackFilters,
    loading: bool,
    error: Option<String>,
    facets: FacetOptions,
}

impl FeedbackQueryState {
    pub fn rows(&self) -> &[FeedbackRow] {
        &self.rows
    }

    pub fn filters(&self) -> &FeedbackFilters {
        &self.filters
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn facets(&self) -> &FacetOptions {
        &self.facets
    }

    /// Table columns: keys of the first row, or the default pair
    pub fn columns(&self) -> Vec<String> {
        match self.rows.first() {
            Some(row) => row.keys().cloned().collect(),
            None => DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Mark a request for `filters` as in flight
    pub fn begin(&mut self, filters: FeedbackFilters) {
        self.filters = filters;
        self.loading = true;
        self.error = None;
    }

    /// Apply the outcome of the in-flight request
    ///
    /// Success replaces rows wholesale and recomputes facets. Failure keeps
    /// the prior rows and facets.
    pub fn complete(&mut self, outcome: Result<Vec<FeedbackRow>, String>) {
        self.loading = false;
        match outcome {
            Ok(rows) => {
                self.facets = derive_facets(&rows);
                self.rows = rows;
            }
            Err(message) => self.error = Some(message),
        }
    }
}

/// HTTP client for `GET {query_url}/feedbacks`
#[derive(Debug, Clone)]
pub struct FeedbackClient {
    client: Client,
    base_url: String,
}

impl FeedbackClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ClientResult<Self> {
        Ok(Self {
            client: build_client(Some(timeout))?,
            base_url: base_url.into(),
        })
    }

    /// Fetch rows matching `filters`
    pub async fn fetch(&self, filters: &FeedbackFilters) -> ClientResult<Vec<FeedbackRow>> {
        let url = endpoint(&self.base_url, "/feedbacks")?;
        let pairs = filters.query_pairs();
        debug!(url = %url, filters = ?pairs, "Fetching feedbacks");

        let response = self.client.get(url).query(&pairs).send().await?;
        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await);
        }

        let body: Value = response.json().await?;
        let entries = match body.get("feedbacks") {
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(Value::Array(entries)) => entries,
            Some(other) => {
                return Err(ClientError::Decode(format!(
                    "feedbacks is not an array: {}",
                    other
                )))
            }
        };

        Ok(entries
            .iter()
            .filter_map(|entry| match entry {
                Value::Object(row) => Some(row.clone()),
                other => {
                    warn!(entry = %other, "Skipping non-record feedback entry");
                    None
                }
            })
            .collect())
    }
}

/// Feedback view: client plus the state it keeps between loads
#[derive(Debug, Clone)]
pub struct FeedbackBrowser {
    client: FeedbackClient,
    state: FeedbackQueryState,
}

impl FeedbackBrowser {
    pub fn new(client: FeedbackClient) -> Self {
        Self {
            client,
            state: FeedbackQueryState::default(),
        }
    }

    pub fn state(&self) -> &FeedbackQueryState {
        &self.state
    }

    /// Load rows for `filters`; failures end up in `state().error()`
    pub async fn load(&mut self, filters: FeedbackFilters) -> &FeedbackQueryState {
        self.state.begin(filters);
        let outcome = self.client.fetch(self.state.filters()).await;

        match outcome {
            Ok(rows) => {
                info!(rows = rows.len(), "Feedbacks loaded");
                self.state.complete(Ok(rows));
            }
            Err(e) => {
                warn!(error = %e, "Failed to load feedbacks");
                self.state
                    .complete(Err(format!("Failed to load feedbacks: {}", e)));
            }
        }

        &self.state
    }

    /// Clear all filters and load unfiltered
    pub async fn reset_and_load(&mut self) -> &FeedbackQueryState {
        self.load(FeedbackFilters::default()).await
    }
}
