//! Natural-language analysis client for hazard reports
//!
//! Renders a [`HazardRecord`] into a sentence and posts it to a Watson-style
//! `/v1/analyze` endpoint for keyword/entity extraction.
//!
//! # Features
//! - HTTP Basic authentication (`apikey:<key>`) with the key held as a secret
//! - Bounded request timeout, single attempt, no retry
//! - Error messages sanitized before they are logged or surfaced

#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

use std::time::Duration;

use async_trait::async_trait;
use civicloop_core::{Analysis, HazardAnalyzer, HazardRecord, Settings, SubmitError};
use reqwest::header::{self, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, instrument};
use url::Url;

pub mod request;

pub use request::*;

/// Path of the analyze operation, relative to the instance URL
pub const ANALYZE_PATH: &str = "v1/analyze";
/// API version pinned in the `version` query parameter
pub const API_VERSION: &str = "2022-04-07";

/// Errors raised while building a client
#[derive(Debug, Error)]
pub enum ClientError {
    /// Instance URL is missing or malformed
    #[error("invalid analysis URL: {0}")]
    InvalidUrl(String),

    /// API key is missing
    #[error("analysis API key not set")]
    MissingApiKey,

    /// HTTP client could not be built
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Configuration for the client
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// Instance URL (e.g. "https://api.us-south.natural-language-understanding.watson.cloud.ibm.com/instances/<id>")
    pub base_url: String,
    /// API key for Basic authentication
    pub api_key: SecretString,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl AnalysisConfig {
    /// Build from settings plus an API key taken from the environment
    pub fn from_settings(settings: &Settings, api_key: Option<String>) -> Result<Self, ClientError> {
        let base_url = settings
            .analysis_url
            .clone()
            .ok_or_else(|| ClientError::InvalidUrl("not configured".to_string()))?;
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(ClientError::MissingApiKey)?;

        Ok(Self {
            base_url,
            api_key: SecretString::new(api_key.into_boxed_str()),
            timeout_seconds: settings.analysis_timeout_seconds,
        })
    }
}

/// Subset of the analyze response kept for logging
#[derive(Debug, Default, Deserialize)]
struct AnalyzeResponse {
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    keywords: Vec<Keyword>,
    #[serde(default)]
    entities: Vec<Entity>,
}

#[derive(Debug, Deserialize)]
struct Keyword {
    text: String,
}

#[derive(Debug, Deserialize)]
struct Entity {
    #[serde(rename = "type")]
    entity_type: String,
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error message
    pub error: String,
    /// HTTP status echoed by the service
    pub code: Option<u16>,
}

/// HTTP client for the analysis service
#[derive(Debug, Clone)]
pub struct AnalysisClient {
    endpoint: Url,
    api_key: SecretString,
    http: reqwest::Client,
    timeout_seconds: u64,
}

impl AnalysisClient {
    /// Create a new client
    pub fn new(config: AnalysisConfig) -> Result<Self, ClientError> {
        let endpoint = analyze_url(&config.base_url)?;

        // Never log the key or the full instance path
        info!(
            "Creating analysis client for host: {}",
            endpoint.host_str().unwrap_or("unknown")
        );

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            endpoint,
            api_key: config.api_key,
            http,
            timeout_seconds: config.timeout_seconds,
        })
    }

    /// Fully-qualified analyze URL, including the version query
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }

    /// Send one analyze request for `record`
    #[instrument(skip(self, record), fields(id = %record.id))]
    pub async fn analyze(&self, record: &HazardRecord) -> Result<Analysis, SubmitError> {
        let body = AnalyzeRequest::for_record(record);
        debug!("Sending analyze request to {}", self.endpoint.path());

        let response = self
            .http
            .post(self.endpoint.clone())
            .headers(self.build_headers())
            .basic_auth("apikey", Some(self.api_key.expose_secret()))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        info!("Analysis service status: {}", status.as_u16());

        if status.is_success() {
            let text = response
                .text()
                .await
                .map_err(|e| self.map_transport_error(e))?;
            let parsed: AnalyzeResponse = serde_json::from_str(&text)
                .map_err(|e| SubmitError::InvalidResponse(e.to_string()))?;

            let analysis = Analysis {
                status: status.as_u16(),
                language: parsed.language,
                keywords: parsed.keywords.into_iter().map(|k| k.text).collect(),
                entities: parsed.entities.into_iter().map(|e| e.entity_type).collect(),
            };
            debug!(
                keywords = ?analysis.keywords,
                entities = ?analysis.entities,
                "Analysis response"
            );
            Ok(analysis)
        } else {
            let error_text = response.text().await.unwrap_or_default();
            error!("API error ({}): {}", status, sanitize_error_message(&error_text));

            let message = match serde_json::from_str::<ApiError>(&error_text) {
                Ok(api_error) => sanitize_error_message(&api_error.error),
                Err(_) => status
                    .canonical_reason()
                    .unwrap_or("Unknown error")
                    .to_string(),
            };
            Err(SubmitError::Status {
                status: status.as_u16(),
                message,
            })
        }
    }

    fn map_transport_error(&self, e: reqwest::Error) -> SubmitError {
        if e.is_timeout() {
            SubmitError::Timeout(self.timeout_seconds)
        } else {
            SubmitError::Transport(sanitize_error_message(&e.to_string()))
        }
    }
}

#[async_trait]
impl HazardAnalyzer for AnalysisClient {
    async fn submit(&self, record: &HazardRecord) -> Result<Analysis, SubmitError> {
        self.analyze(record).await
    }
}

/// Append the analyze path and version query to an instance URL
fn analyze_url(base_url: &str) -> Result<Url, ClientError> {
    let base = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(ClientError::InvalidUrl(format!(
            "unsupported scheme: {}",
            base.scheme()
        )));
    }

    // Url::join replaces the last segment unless the base ends with '/'
    let mut url_str = base.to_string();
    if !url_str.ends_with('/') {
        url_str.push('/');
    }
    let mut url = Url::parse(&url_str)
        .and_then(|u| u.join(ANALYZE_PATH))
        .map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
    url.set_query(None);
    url.query_pairs_mut().append_pair("version", API_VERSION);
    Ok(url)
}

/// Sanitize error messages to prevent information disclosure
fn sanitize_error_message(message: &str) -> String {
    let patterns = [
        (r"(?i)apikey:[^\s@]+", "apikey:***"),
        (r"(?i)basic\s+[A-Za-z0-9+/=]+", "Basic ***"),
    ];

    let mut sanitized = message.to_string();

    for (pattern, replacement) in patterns {
        if let Ok(re) = regex::Regex::new(pattern) {
            sanitized = re.replace_all(&sanitized, replacement).to_string();
        }
    }

    // Long opaque tokens may be keys; record ids are UUIDs and stay readable.
    if let (Ok(token), Ok(uuid)) = (
        regex::Regex::new(r"[a-zA-Z0-9_-]{32,}"),
        regex::Regex::new(r"^[0-9a-fA-F]{8}(-[0-9a-fA-F]{4}){3}-[0-9a-fA-F]{12}$"),
    ) {
        sanitized = token
            .replace_all(&sanitized, |caps: &regex::Captures<'_>| {
                if uuid.is_match(&caps[0]) {
                    caps[0].to_string()
                } else {
                    "***REDACTED***".to_string()
                }
            })
            .to_string();
    }

    if sanitized.chars().count() > 256 {
        let truncated: String = sanitized.chars().take(256).collect();
        format!("{truncated}... [truncated]")
    } else {
        sanitized
    }
}
