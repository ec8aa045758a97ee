//! Risk aggregation module
//!
//! Scores categories, buckets them into levels and attaches
//! recommendations and annotations.

mod aggregator;
mod recommendations;
mod types;

pub use aggregator::{recency_weight, status_severity, RiskAggregator};
pub use recommendations::template as recommendation_template;
pub use types::*;
