//! Report pipeline
//!
//! Filing a report always saves the record locally first; remote analysis
//! is attempted only after the record is durable and never decides whether
//! the record stays.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::models::{HazardRecord, RecordError};
use crate::persistence::StoreError;
use crate::store::HazardStore;

/// Latitude used by the zero-argument voice report
pub const VOICE_REPORT_LATITUDE: f64 = 42.3595;
/// Longitude used by the zero-argument voice report
pub const VOICE_REPORT_LONGITUDE: f64 = -83.0725;

/// Summary of a successful remote analysis
///
/// Only used for logging and display; nothing downstream depends on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// HTTP status returned by the service
    pub status: u16,
    /// Language the service detected or echoed back
    pub language: Option<String>,
    /// Extracted keyword texts
    pub keywords: Vec<String>,
    /// Extracted entity types
    pub entities: Vec<String>,
}

/// Why a remote analysis did not complete
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SubmitError {
    /// Analyzer is not configured (missing endpoint or credential)
    #[error("analysis service not configured: {0}")]
    NotConfigured(String),

    /// Request did not complete within the configured timeout
    #[error("analysis request timed out after {0}s")]
    Timeout(u64),

    /// Connection, TLS, or other transport failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Service answered with a non-2xx status
    #[error("HTTP error {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Sanitized reason
        message: String,
    },

    /// 2xx response whose body could not be parsed
    #[error("invalid response body: {0}")]
    InvalidResponse(String),
}

/// Trait for remote analysis backends.
#[async_trait]
pub trait HazardAnalyzer: Send + Sync {
    /// Submit one record for analysis. Single attempt, no retry.
    async fn submit(&self, record: &HazardRecord) -> Result<Analysis, SubmitError>;
}

/// Analyzer used when no remote service is configured
#[derive(Debug, Clone)]
pub struct UnavailableAnalyzer {
    reason: String,
}

impl UnavailableAnalyzer {
    /// Create an analyzer that always fails with `reason`
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl HazardAnalyzer for UnavailableAnalyzer {
    async fn submit(&self, _record: &HazardRecord) -> Result<Analysis, SubmitError> {
        Err(SubmitError::NotConfigured(self.reason.clone()))
    }
}

/// Report pipeline phases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportPhase {
    /// Record generated, nothing saved yet
    Created,
    /// Record committed to the report log
    LocallyPersisted,
    /// Remote analysis succeeded
    Submitted,
    /// Remote analysis failed
    SubmitFailed,
    /// Outcome produced
    Reported,
}

impl std::fmt::Display for ReportPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportPhase::Created => write!(f, "Created"),
            ReportPhase::LocallyPersisted => write!(f, "Locally Persisted"),
            ReportPhase::Submitted => write!(f, "Submitted"),
            ReportPhase::SubmitFailed => write!(f, "Submit Failed"),
            ReportPhase::Reported => write!(f, "Reported"),
        }
    }
}

/// Errors that abort a report before anything is saved
#[derive(Debug, Error)]
pub enum ReportError {
    /// The record could not be built
    #[error("invalid report: {0}")]
    InvalidRecord(#[from] RecordError),

    /// The record could not be saved locally; no remote attempt was made
    #[error("could not save report locally: {0}")]
    LocalPersistence(#[from] StoreError),
}

/// Input for an explicit report
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportRequest {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Report date
    pub reported_on: NaiveDate,
}

impl ReportRequest {
    /// Request at the fixed voice-report location, dated `reported_on`.
    pub fn voice(reported_on: NaiveDate) -> Self {
        Self {
            latitude: VOICE_REPORT_LATITUDE,
            longitude: VOICE_REPORT_LONGITUDE,
            reported_on,
        }
    }
}

/// Result of the remote step
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOutcome {
    /// Service accepted and analyzed the report
    Analyzed(Analysis),
    /// Service could not be reached or rejected the report
    Failed(SubmitError),
}

/// Terminal state of a report that was saved locally
#[derive(Debug, Clone)]
pub struct ReportOutcome {
    /// The committed record
    pub record: HazardRecord,
    /// What happened remotely
    pub remote: RemoteOutcome,
}

impl ReportOutcome {
    /// Whether the remote analysis completed
    pub fn analyzed(&self) -> bool {
        matches!(self.remote, RemoteOutcome::Analyzed(_))
    }

    /// Short status line for the caller
    ///
    /// Always states the report was saved; mentions the remote step only
    /// when it failed.
    pub fn message(&self) -> String {
        match &self.remote {
            RemoteOutcome::Analyzed(_) => {
                "Reported. Saved locally and analyzed by the language service.".to_string()
            }
            RemoteOutcome::Failed(e) => {
                format!("Saved locally. Remote analysis failed: {e}")
            }
        }
    }
}

/// Pipeline for filing a hazard report
#[derive(Clone)]
pub struct ReportPipeline {
    store: HazardStore,
    analyzer: Arc<dyn HazardAnalyzer>,
}

impl std::fmt::Debug for ReportPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportPipeline")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl ReportPipeline {
    /// Create a pipeline writing to `store` and analyzing with `analyzer`
    pub fn new(store: HazardStore, analyzer: Arc<dyn HazardAnalyzer>) -> Self {
        Self { store, analyzer }
    }

    /// Store the pipeline writes to
    pub fn store(&self) -> &HazardStore {
        &self.store
    }

    /// Voice entry point: fixed location, today's local date.
    pub async fn submit_voice_report(&self) -> Result<ReportOutcome, ReportError> {
        self.submit(ReportRequest::voice(Local::now().date_naive()))
            .await
    }

    /// File a report and wait for the remote step to finish.
    #[instrument(skip(self))]
    pub async fn submit(&self, request: ReportRequest) -> Result<ReportOutcome, ReportError> {
        let record = HazardRecord::new(request.latitude, request.longitude, request.reported_on)?;
        info!(id = %record.id, phase = %ReportPhase::Created, "Report created");

        self.store.append(record.clone()).await?;
        info!(id = %record.id, phase = %ReportPhase::LocallyPersisted, "Report saved locally");

        let remote = match self.analyzer.submit(&record).await {
            Ok(analysis) => {
                info!(
                    id = %record.id,
                    phase = %ReportPhase::Submitted,
                    keywords = analysis.keywords.len(),
                    entities = analysis.entities.len(),
                    "Remote analysis completed"
                );
                RemoteOutcome::Analyzed(analysis)
            }
            Err(e) => {
                warn!(id = %record.id, phase = %ReportPhase::SubmitFailed, error = %e, "Remote analysis failed");
                RemoteOutcome::Failed(e)
            }
        };

        info!(id = %record.id, phase = %ReportPhase::Reported, "Report complete");
        Ok(ReportOutcome { record, remote })
    }
}
