//! Record type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which kind of collaborator produced a record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum SourceCategory {
    Registry,
    Legal,
    News,
    Web,
}

impl SourceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registry => "registry",
            Self::Legal => "legal",
            Self::News => "news",
            Self::Web => "web",
        }
    }
}

/// Risk category a scored record contributes to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum RiskCategory {
    Legal,
    Reputation,
    Financial,
    Operational,
}

impl RiskCategory {
    /// All categories in reporting order
    pub const ALL: [RiskCategory; 4] = [
        RiskCategory::Legal,
        RiskCategory::Reputation,
        RiskCategory::Financial,
        RiskCategory::Operational,
    ];

    /// Fixed weight in the overall score
    pub fn weight(&self) -> f64 {
        match self {
            Self::Legal => 0.4,
            Self::Reputation => 0.3,
            Self::Financial => 0.2,
            Self::Operational => 0.1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legal => "legal",
            Self::Reputation => "reputation",
            Self::Financial => "financial",
            Self::Operational => "operational",
        }
    }
}

impl std::fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome tag of a court decision, most severe first
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum LegalOutcome {
    Criminal,
    CivilLoss,
    CivilOther,
    Administrative,
}

impl LegalOutcome {
    /// Severity multiplier applied to a legal record's contribution
    pub fn severity(&self) -> f64 {
        match self {
            Self::Criminal => 1.0,
            Self::CivilLoss => 0.7,
            Self::CivilOther => 0.4,
            Self::Administrative => 0.25,
        }
    }

    /// Pick the more severe of two tags
    pub fn most_severe(self, other: LegalOutcome) -> LegalOutcome {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Criminal => "criminal",
            Self::CivilLoss => "civil_loss",
            Self::CivilOther => "civil_other",
            Self::Administrative => "administrative",
        }
    }
}

/// A single item fetched from one collaborator, normalized at the adapter boundary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollaboratorRecord {
    /// Name of the collaborator that produced the record
    pub source: String,
    pub source_category: SourceCategory,
    /// Stable identifier from the source (case identifier for legal records)
    pub record_id: Option<String>,
    /// Explicitly named subject: registered name, case party
    pub subject: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub title: String,
    pub summary: Option<String>,
    /// Body excerpt (case text, article excerpt, page text)
    pub body: Option<String>,
    pub url: Option<String>,
    /// Outcome tag for legal records
    pub legal_outcome: Option<LegalOutcome>,
    /// Court or issuing body for legal records
    pub court: Option<String>,
    /// Registration status for registry records
    pub registry_status: Option<String>,
    /// When the record was fetched from the collaborator
    pub retrieved_at: DateTime<Utc>,
}

impl CollaboratorRecord {
    /// Create a new record
    pub fn new(
        source: impl Into<String>,
        source_category: SourceCategory,
        title: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            source_category,
            record_id: None,
            subject: None,
            published: None,
            title: title.into(),
            summary: None,
            body: None,
            url: None,
            legal_outcome: None,
            court: None,
            registry_status: None,
            retrieved_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.record_id = Some(id.into());
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_published(mut self, published: DateTime<Utc>) -> Self {
        self.published = Some(published);
        self
    }

    pub fn with_outcome(mut self, outcome: LegalOutcome) -> Self {
        self.legal_outcome = Some(outcome);
        self
    }

    /// All free text of the record joined for matching
    pub fn text(&self) -> String {
        let mut text = self.title.clone();
        for part in [&self.subject, &self.summary, &self.body].into_iter().flatten() {
            text.push(' ');
            text.push_str(part);
        }
        text
    }

    /// Merge a duplicate of this record into it
    pub fn merge(&mut self, other: &CollaboratorRecord) {
        if self.summary.is_none() && other.summary.is_some() {
            self.summary = other.summary.clone();
        }
        if self.body.is_none() && other.body.is_some() {
            self.body = other.body.clone();
        }
        if self.published.is_none() {
            self.published = other.published;
        }
    }
}

/// A record that passed the relevance filter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredRecord {
    pub record: CollaboratorRecord,
    /// Confidence in [0, 1] that the record concerns the queried entity
    pub relevance: f64,
    /// Sentiment in [-1, 1] from the scoring service, where available
    pub sentiment: Option<f64>,
    #[serde(default)]
    pub key_phrases: Vec<String>,
    pub matched_entity: bool,
    pub matched_contact: bool,
    pub category: RiskCategory,
    /// Set when duplicates of the same case disagreed on the outcome tag
    #[serde(default)]
    pub conflicting_outcomes: bool,
}

/// Collaborator failure kinds, as reported in output metadata
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RateExceeded,
    Timeout,
    NotFound,
    Unavailable,
    ParseError,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateExceeded => write!(f, "Rate limit exceeded"),
            Self::Timeout => write!(f, "Request timed out"),
            Self::NotFound => write!(f, "Not found"),
            Self::Unavailable => write!(f, "Source unavailable"),
            Self::ParseError => write!(f, "Failed to parse response"),
        }
    }
}

/// How a collaborator fared during one assessment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceOutcome {
    Succeeded,
    Degraded,
    Skipped,
}

/// Per-collaborator metadata of one assessment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceStatus {
    pub name: String,
    pub kind: SourceCategory,
    pub mandatory: bool,
    pub outcome: SourceOutcome,
    pub failure: Option<FailureKind>,
    pub detail: Option<String>,
    pub record_count: usize,
    pub elapsed_ms: u64,
    pub from_cache: bool,
}

impl SourceStatus {
    pub fn succeeded(name: impl Into<String>, kind: SourceCategory, record_count: usize) -> Self {
        Self {
            name: name.into(),
            kind,
            mandatory: false,
            outcome: SourceOutcome::Succeeded,
            failure: None,
            detail: None,
            record_count,
            elapsed_ms: 0,
            from_cache: false,
        }
    }

    pub fn degraded(name: impl Into<String>, kind: SourceCategory, failure: FailureKind) -> Self {
        Self {
            outcome: SourceOutcome::Degraded,
            failure: Some(failure),
            ..Self::succeeded(name, kind, 0)
        }
    }

    pub fn skipped(name: impl Into<String>, kind: SourceCategory, reason: impl Into<String>) -> Self {
        Self {
            outcome: SourceOutcome::Skipped,
            detail: Some(reason.into()),
            ..Self::succeeded(name, kind, 0)
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.outcome == SourceOutcome::Degraded
    }
}
