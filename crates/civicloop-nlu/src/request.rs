//! Analyze request body and the sentence sent for analysis.

use civicloop_core::HazardRecord;
use serde::Serialize;

/// Severity wording used in every report sentence
pub const REPORT_SEVERITY: &str = "High";

/// Render the sentence submitted for analysis
pub fn describe_hazard(record: &HazardRecord) -> String {
    format!(
        "Urgent: Pothole reported on {} at coordinates latitude {}, longitude {} in Michigan. {} severity.",
        record.date_reported, record.latitude, record.longitude, REPORT_SEVERITY
    )
}

/// Body of `POST /v1/analyze`
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeRequest {
    /// Text to analyze
    pub text: String,
    /// Requested analysis features
    pub features: Features,
    /// Language of `text`
    pub language: String,
}

impl AnalyzeRequest {
    /// Request analyzing the description of `record`
    pub fn for_record(record: &HazardRecord) -> Self {
        Self {
            text: describe_hazard(record),
            features: Features::default(),
            language: "en".to_string(),
        }
    }
}

/// Analysis features; empty objects request service defaults
#[derive(Debug, Clone, Default, Serialize)]
pub struct Features {
    /// Keyword extraction
    pub keywords: EmptyOptions,
    /// Entity extraction
    pub entities: EntityOptions,
    /// Category classification
    pub categories: EmptyOptions,
}

/// Serializes as `{}`
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct EmptyOptions {}

/// Entity extraction options
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EntityOptions {
    /// Return every mention of each entity
    pub mentions: bool,
    /// Score sentiment per entity
    pub sentiment: bool,
    /// Score emotion per entity
    pub emotion: bool,
}

impl Default for EntityOptions {
    fn default() -> Self {
        Self {
            mentions: true,
            sentiment: true,
            emotion: true,
        }
    }
}
