//! Assessment query model
//!
//! A [`Query`] is built once per invocation, validated, and then only read.
//! Besides the target entity it carries the knobs that shape the fan-out:
//! - search depth (`simple`, `standard`, `deep`) which sets the global deadline
//! - lookback window which bounds the dates requested from collaborators
//! - per-category inclusion flags

use crate::records::RiskCategory;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

const FORBIDDEN_CHARS: [char; 7] = ['<', '>', '"', '\'', '\n', '\r', '\t'];

/// Validation failures for an incoming query
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("entity name must be between 2 and 200 characters")]
    EntityNameLength,
    #[error("{0} contains invalid characters")]
    InvalidCharacters(&'static str),
    #[error("registry identifier must be exactly 8 digits")]
    RegistryId,
    #[error("contact person name must be at most 100 characters")]
    ContactLength,
    #[error("website must be an absolute http(s) URL")]
    Website,
}

/// How much effort to spend on an assessment
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    Simple,
    #[default]
    Standard,
    Deep,
}

impl SearchDepth {
    /// Maximum number of news articles requested from the news provider
    pub fn max_articles(&self) -> usize {
        match self {
            Self::Simple => 10,
            Self::Standard => 20,
            Self::Deep => 50,
        }
    }

    /// Crawl depth for the website crawler; `None` skips crawling entirely
    pub fn crawl_depth(&self) -> Option<u32> {
        match self {
            Self::Simple => None,
            Self::Standard => Some(1),
            Self::Deep => Some(2),
        }
    }

    /// Maximum number of pages fetched by the crawler
    pub fn crawl_pages(&self) -> usize {
        match self {
            Self::Simple => 0,
            Self::Standard => 10,
            Self::Deep => 25,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Standard => "standard",
            Self::Deep => "deep",
        }
    }
}

/// How far back collaborators are asked to look
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LookbackWindow {
    #[default]
    LastYear,
    Last3Years,
    Last5Years,
    All,
}

impl LookbackWindow {
    pub fn days(&self) -> Option<i64> {
        match self {
            Self::LastYear => Some(365),
            Self::Last3Years => Some(3 * 365),
            Self::Last5Years => Some(5 * 365),
            Self::All => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LastYear => "last_year",
            Self::Last3Years => "last_3_years",
            Self::Last5Years => "last_5_years",
            Self::All => "all",
        }
    }
}

/// Closed-open date range handed to collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: DateTime<Utc>,
}

impl DateRange {
    /// Whether a record dated `date` falls inside the range.
    /// Undated records are kept; the aggregator treats them as old.
    pub fn contains(&self, date: Option<DateTime<Utc>>) -> bool {
        match date {
            Some(d) => self.from.map_or(true, |from| d >= from) && d <= self.to,
            None => true,
        }
    }
}

/// Which risk categories take part in the assessment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(default)]
pub struct CategoryFlags {
    pub legal: bool,
    pub reputation: bool,
    pub financial: bool,
    pub operational: bool,
}

impl Default for CategoryFlags {
    fn default() -> Self {
        Self {
            legal: true,
            reputation: true,
            financial: true,
            operational: true,
        }
    }
}

impl CategoryFlags {
    pub fn includes(&self, category: RiskCategory) -> bool {
        match category {
            RiskCategory::Legal => self.legal,
            RiskCategory::Reputation => self.reputation,
            RiskCategory::Financial => self.financial,
            RiskCategory::Operational => self.operational,
        }
    }

    /// True if any of the categories fed by free-text sources is included
    pub fn any_text_category(&self) -> bool {
        self.reputation || self.financial || self.operational
    }
}

/// Immutable input of a single assessment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    /// Legal entity name, e.g. "ASML Holding N.V."
    pub entity_name: String,
    /// Person whose presence next to the entity raises relevance
    #[serde(default)]
    pub contact_person: Option<String>,
    /// Chamber of commerce number
    #[serde(default)]
    pub registry_id: Option<String>,
    /// Trade or alternate names the entity operates under
    #[serde(default)]
    pub trade_names: Vec<String>,
    /// Seed URL for the website crawler
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub lookback: LookbackWindow,
    #[serde(default)]
    pub depth: SearchDepth,
    #[serde(default)]
    pub include: CategoryFlags,
    /// Reference instant for date ranges and recency weighting
    #[serde(default = "Utc::now")]
    pub as_of: DateTime<Utc>,
}

impl Query {
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            contact_person: None,
            registry_id: None,
            trade_names: Vec::new(),
            website: None,
            lookback: LookbackWindow::default(),
            depth: SearchDepth::default(),
            include: CategoryFlags::default(),
            as_of: Utc::now(),
        }
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact_person = Some(contact.into());
        self
    }

    pub fn with_registry_id(mut self, id: impl Into<String>) -> Self {
        self.registry_id = Some(id.into());
        self
    }

    pub fn with_trade_name(mut self, name: impl Into<String>) -> Self {
        self.trade_names.push(name.into());
        self
    }

    pub fn with_website(mut self, url: impl Into<String>) -> Self {
        self.website = Some(url.into());
        self
    }

    pub fn with_depth(mut self, depth: SearchDepth) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_lookback(mut self, lookback: LookbackWindow) -> Self {
        self.lookback = lookback;
        self
    }

    pub fn with_categories(mut self, include: CategoryFlags) -> Self {
        self.include = include;
        self
    }

    pub fn as_of(mut self, as_of: DateTime<Utc>) -> Self {
        self.as_of = as_of;
        self
    }

    /// Clean up and validate user input, returning the canonical query
    pub fn validate(mut self) -> Result<Self, QueryError> {
        self.entity_name = collapse_whitespace(&self.entity_name);
        let len = self.entity_name.chars().count();
        if !(2..=200).contains(&len) {
            return Err(QueryError::EntityNameLength);
        }
        if self.entity_name.contains(FORBIDDEN_CHARS) {
            return Err(QueryError::InvalidCharacters("entity name"));
        }

        if let Some(contact) = self.contact_person.take() {
            let contact = collapse_whitespace(&contact);
            if contact.chars().count() > 100 {
                return Err(QueryError::ContactLength);
            }
            if contact.contains(FORBIDDEN_CHARS) {
                return Err(QueryError::InvalidCharacters("contact person"));
            }
            self.contact_person = (!contact.is_empty()).then_some(contact);
        }

        if let Some(id) = self.registry_id.take() {
            let digits: String = id.chars().filter(|c| !matches!(c, ' ' | '-' | '.')).collect();
            if digits.len() != 8 || !digits.chars().all(|c| c.is_ascii_digit()) {
                return Err(QueryError::RegistryId);
            }
            self.registry_id = Some(digits);
        }

        self.trade_names = self
            .trade_names
            .iter()
            .map(|t| collapse_whitespace(t))
            .filter(|t| t.chars().count() >= 2)
            .collect();

        if let Some(ref site) = self.website {
            match url::Url::parse(site) {
                Ok(u) if matches!(u.scheme(), "http" | "https") => {}
                _ => return Err(QueryError::Website),
            }
        }

        Ok(self)
    }

    /// Date range derived from the lookback window and `as_of`
    pub fn date_range(&self) -> DateRange {
        DateRange {
            from: self
                .lookback
                .days()
                .map(|d| self.as_of - ChronoDuration::days(d)),
            to: self.as_of,
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_validate_cleans_input() {
        let query = Query::new("  ASML   Holding  N.V. ")
            .with_contact(" Peter   Wennink ")
            .with_registry_id("1701-4545")
            .validate()
            .unwrap();

        assert_eq!(query.entity_name, "ASML Holding N.V.");
        assert_eq!(query.contact_person.as_deref(), Some("Peter Wennink"));
        assert_eq!(query.registry_id.as_deref(), Some("17014545"));
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        assert_eq!(
            Query::new("A").validate().unwrap_err(),
            QueryError::EntityNameLength
        );
        assert_eq!(
            Query::new("Acme <script>").validate().unwrap_err(),
            QueryError::InvalidCharacters("entity name")
        );
        assert_eq!(
            Query::new("Acme").with_registry_id("1234").validate().unwrap_err(),
            QueryError::RegistryId
        );
        assert_eq!(
            Query::new("Acme").with_website("ftp://acme.nl").validate().unwrap_err(),
            QueryError::Website
        );
    }

    #[test]
    fn test_date_range() {
        let as_of = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let query = Query::new("Acme").as_of(as_of);
        let range = query.date_range();

        assert!(range.contains(Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())));
        assert!(!range.contains(Some(Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap())));
        assert!(range.contains(None));

        let all = query.with_lookback(LookbackWindow::All).date_range();
        assert!(all.from.is_none());
    }

    #[test]
    fn test_deserialize_defaults() {
        let query: Query = serde_json::from_str(r#"{"entity_name": "Acme B.V."}"#).unwrap();
        assert_eq!(query.depth, SearchDepth::Standard);
        assert_eq!(query.lookback, LookbackWindow::LastYear);
        assert!(query.include.legal);
    }
}
