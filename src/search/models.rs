//! Assessment lifecycle and engine-level errors

use crate::query::QueryError;
use crate::records::SourceStatus;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle of one assessment.
///
/// `Pending -> Fetching -> Aggregating -> Complete`, ending in `Degraded`
/// instead when some collaborator failed and in `Failed` when all did.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentState {
    Pending,
    Fetching,
    Aggregating,
    Complete,
    Degraded,
    Failed,
}

impl AssessmentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Degraded | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Aggregating => "aggregating",
            Self::Complete => "complete",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for AssessmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an assessment produced no result
#[derive(Debug, Clone, Error)]
pub enum AssessError {
    #[error("invalid query: {0}")]
    InvalidQuery(#[from] QueryError),
    #[error("no sources are configured")]
    NoSources,
    #[error("all sources failed: {}", describe_failures(.failures))]
    AllSourcesFailed { failures: Vec<SourceStatus> },
}

impl AssessError {
    /// Statuses of the failed sources, empty for other errors
    pub fn failures(&self) -> &[SourceStatus] {
        match self {
            Self::AllSourcesFailed { failures } => failures,
            _ => &[],
        }
    }
}

fn describe_failures(failures: &[SourceStatus]) -> String {
    failures
        .iter()
        .map(|s| match s.failure {
            Some(kind) => format!("{} ({})", s.name, kind),
            None => s.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{FailureKind, SourceCategory};

    #[test]
    fn test_all_failed_names_every_source() {
        let err = AssessError::AllSourcesFailed {
            failures: vec![
                SourceStatus::degraded("kvk", SourceCategory::Registry, FailureKind::Unavailable),
                SourceStatus::degraded("rechtspraak", SourceCategory::Legal, FailureKind::Timeout),
            ],
        };
        assert_eq!(
            err.to_string(),
            "all sources failed: kvk (Source unavailable), rechtspraak (Request timed out)"
        );
        assert_eq!(err.failures().len(), 2);
    }

    #[test]
    fn test_terminal_states() {
        assert!(AssessmentState::Degraded.is_terminal());
        assert!(!AssessmentState::Fetching.is_terminal());
    }
}
