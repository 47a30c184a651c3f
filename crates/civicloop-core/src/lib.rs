//! CivicLoop Core - hazard records, the report log, and the report pipeline
//!
//! This crate provides the foundational types and logic for CivicLoop.
//!
//! # Modules
//!
//! - [`models`] - Hazard records and the actionability rule
//! - [`persistence`] - Key-value storage backing the report log
//! - [`store`] - The aggregated hazard list (baseline ++ report log)
//! - [`report`] - The report pipeline (persist locally, then analyze)
//! - [`settings`] - Runtime configuration

#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

pub mod models;
pub mod persistence;
pub mod report;
pub mod settings;
pub mod store;

pub use models::*;
pub use persistence::*;
pub use report::*;
pub use settings::*;
pub use store::*;
