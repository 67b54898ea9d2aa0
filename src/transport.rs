//! # HTTP Transport
//!
//! One bounded-timeout GET per logical call, returning the decoded JSON body.
//!
//! The transport never retries and never caches: retry policy belongs to whoever
//! schedules refreshes. Every failure surfaces as a [`TransportError`]:
//! - **Timeout**: the whole request (connect, headers, body) exceeded the limit
//! - **Connection**: DNS, refused connection, TLS or other transport failures
//! - **Remote**: the server answered with a non-2xx status
//! - **InvalidBody**: a 2xx answer whose body is not JSON
//!
//! The [`JsonFetcher`] trait is the seam the catalog and poller depend on, so
//! both can be driven by scripted responses in tests.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Per-call timeout used unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client identifier sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("havvarsel-tracker/", env!("CARGO_PKG_VERSION"));

/// Public Havvarsel API root.
pub const DEFAULT_BASE_URL: &str = "https://api.havvarsel.no/apis/duapi/havvarsel/v2/";

/// URL builder for the endpoints this crate consumes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl Endpoints {
    /// Accepts the base with or without a trailing slash.
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// Variable list with per-variable `units`.
    pub fn variables(&self) -> String {
        format!("{}/variables", self.base)
    }

    /// Richer variable metadata (`long_name`, `standard_name`, ...).
    pub fn projection_variables(&self) -> String {
        format!("{}/dataprojectionvariables", self.base)
    }

    /// Projection for a set of variables at one point; depth goes in the query.
    pub fn projection<S: AsRef<str>>(&self, variables: &[S], longitude: f64, latitude: f64) -> String {
        let names: Vec<&str> = variables.iter().map(AsRef::as_ref).collect();
        format!(
            "{}/dataprojection/{}/{}/{}",
            self.base,
            names.join(","),
            longitude,
            latitude
        )
    }
}

/// Failures of a single fetch.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("connection to {url} failed: {source}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with HTTP {status}")]
    Remote { url: String, status: u16 },

    #[error("{url} returned a body that is not JSON: {source}")]
    InvalidBody {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl TransportError {
    /// HTTP status for `Remote` failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Something that can GET a URL and hand back its JSON body.
#[async_trait]
pub trait JsonFetcher: Send + Sync {
    async fn fetch(&self, url: &str, query: &[(&str, String)]) -> Result<Value, TransportError>;
}

/// [`JsonFetcher`] backed by a shared `reqwest` client.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport with the default timeout and client identifier.
    pub fn new() -> reqwest::Result<Self> {
        Self::with_options(DEFAULT_TIMEOUT, DEFAULT_USER_AGENT)
    }

    /// Build a transport with an explicit timeout and `User-Agent`.
    pub fn with_options(timeout: Duration, user_agent: &str) -> reqwest::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        // Fall back to the crate identifier rather than failing on odd characters
        let agent = HeaderValue::from_str(user_agent)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_USER_AGENT));
        headers.insert(USER_AGENT, agent);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl JsonFetcher for HttpTransport {
    async fn fetch(&self, url: &str, query: &[(&str, String)]) -> Result<Value, TransportError> {
        debug!(url, ?query, "GET");

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|source| request_error(url, source))?;

        let status = response.status();
        debug!(url, status = status.as_u16(), "response received");
        if !status.is_success() {
            return Err(TransportError::Remote {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.json::<Value>().await.map_err(|source| {
            if source.is_timeout() {
                TransportError::Timeout {
                    url: url.to_string(),
                }
            } else {
                TransportError::InvalidBody {
                    url: url.to_string(),
                    source,
                }
            }
        })
    }
}

fn request_error(url: &str, source: reqwest::Error) -> TransportError {
    if source.is_timeout() {
        TransportError::Timeout {
            url: url.to_string(),
        }
    } else {
        TransportError::Connection {
            url: url.to_string(),
            source,
        }
    }
}
