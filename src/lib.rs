//! Diligence-RS: multi-source counterparty risk assessment
//!
//! Fans a single company query out to a corporate registry, a court
//! archive, a news provider and a web crawler under one deadline, keeps
//! the records that are about the company, and turns them into per
//! category risk scores with recommendations.

pub mod access;
pub mod cache;
pub mod config;
pub mod limiter;
pub mod matcher;
pub mod metrics;
pub mod network;
pub mod query;
pub mod records;
pub mod risk;
pub mod search;
pub mod sources;
pub mod web;

pub use config::Settings;
pub use query::Query;
pub use risk::{RiskAssessment, RiskLevel};
pub use search::{AssessError, Assessor};
pub use sources::Collaborator;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
