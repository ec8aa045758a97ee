//! Risk assessment output types

use crate::query::{LookbackWindow, SearchDepth};
use crate::records::{LegalOutcome, RiskCategory, SourceStatus};
use crate::search::AssessmentState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound (exclusive) of the low band
pub const LOW_BELOW: f64 = 0.3;
/// Upper bound (inclusive) of the medium band
pub const MEDIUM_UP_TO: f64 = 0.6;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Bucket a score: below 0.3 low, up to 0.6 medium, above high
    pub fn from_score(score: f64) -> Self {
        if score < LOW_BELOW {
            Self::Low
        } else if score <= MEDIUM_UP_TO {
            Self::Medium
        } else {
            Self::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    /// Not an error: the score rests on little or no data
    InsufficientData,
    /// Sources disagreed on the outcome of one case
    UnresolvedDuplicate,
    /// The caller excluded the category
    CategoryExcluded,
}

/// Qualifier attached to an assessment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Annotation {
    pub kind: AnnotationKind,
    /// `None` when the annotation concerns the whole assessment
    pub category: Option<RiskCategory>,
    pub message: String,
}

impl Annotation {
    pub fn new(kind: AnnotationKind, category: Option<RiskCategory>, message: impl Into<String>) -> Self {
        Self {
            kind,
            category,
            message: message.into(),
        }
    }
}

/// One record backing a category score
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Evidence {
    pub title: String,
    pub source: String,
    pub url: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub relevance: f64,
    pub sentiment: Option<f64>,
    pub legal_outcome: Option<LegalOutcome>,
    /// Weighted contribution to the category score
    pub contribution: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryRisk {
    pub category: RiskCategory,
    pub included: bool,
    pub score: f64,
    pub level: RiskLevel,
    pub record_count: usize,
    /// Publication date of the newest record
    pub newest_record: Option<DateTime<Utc>>,
    pub evidence: Vec<Evidence>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    /// `None` for assessment-wide advice
    pub category: Option<RiskCategory>,
    pub level: Option<RiskLevel>,
    pub text: String,
}

/// Final result of one assessment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskAssessment {
    pub entity_name: String,
    pub registry_id: Option<String>,
    /// Reference instant the assessment was computed for
    pub as_of: DateTime<Utc>,
    pub depth: SearchDepth,
    pub lookback: LookbackWindow,
    pub status: AssessmentState,
    pub overall_score: f64,
    pub overall_level: RiskLevel,
    /// One entry per risk category, in reporting order
    pub categories: Vec<CategoryRisk>,
    pub recommendations: Vec<Recommendation>,
    pub annotations: Vec<Annotation>,
    pub sources: Vec<SourceStatus>,
    pub record_count: usize,
}

impl RiskAssessment {
    pub fn category(&self, category: RiskCategory) -> Option<&CategoryRisk> {
        self.categories.iter().find(|c| c.category == category)
    }

    pub fn is_degraded(&self) -> bool {
        self.status == AssessmentState::Degraded
    }

    /// Whether the score of `category` (or, for `None`, the whole
    /// assessment) rests on no data
    pub fn has_insufficient_data(&self, category: Option<RiskCategory>) -> bool {
        self.annotations
            .iter()
            .any(|a| a.kind == AnnotationKind::InsufficientData && a.category == category)
    }

    pub fn degraded_sources(&self) -> impl Iterator<Item = &SourceStatus> {
        self.sources.iter().filter(|s| s.is_degraded())
    }
}
