//! Shared HTTP plumbing for the backend clients

use reqwest::{header, Client, Url};
use std::time::Duration;

use crate::error::{ClientError, ClientResult};

/// User-Agent header sent with every request
const USER_AGENT: &str = concat!("fbq/", env!("CARGO_PKG_VERSION"));

/// Connect timeout for every client (the streaming client has no total timeout)
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build a reqwest client
///
/// `timeout` bounds the whole request including the body, so the streaming
/// client is built without one.
pub fn build_client(timeout: Option<Duration>) -> ClientResult<Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::USER_AGENT,
        header::HeaderValue::from_static(USER_AGENT),
    );

    let mut builder = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .default_headers(headers);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

/// Join a base URL and an absolute endpoint path
pub fn endpoint(base_url: &str, path: &str) -> ClientResult<Url> {
    let joined = format!("{}{}", base_url.trim_end_matches('/'), path);
    Url::parse(&joined).map_err(|e| ClientError::InvalidUrl(format!("{}: {}", joined, e)))
}
