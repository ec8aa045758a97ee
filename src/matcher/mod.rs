//! Relevance matching
//!
//! Decides how confidently a fetched record concerns the queried entity.
//! Names are compared in normalized form (see [`normalize_entity`]), so
//! "Acme B.V." and "ACME BV" share the core name `acme`.
//!
//! Base tiers, first match wins:
//! - record subject equals the core name: 1.0
//! - core name appears in the record text: 0.8
//! - a trade name matches: 0.7
//! - partial match: 0.5
//!
//! Legal forms never affect the tier; "Acme N.V." matches a query for
//! "Acme B.V." as strongly as "Acme B.V." itself.
//!
//! A contact-person hit lifts an entity match to at least 0.8. Names made
//! only of generic words are penalized. Records under the threshold are dropped.

mod classify;
mod normalize;

pub use classify::{classify, financial_signal};
pub use normalize::{is_legal_form, normalize_entity, normalize_text, NormalizedEntity};

use crate::query::Query;
use crate::records::{CollaboratorRecord, ScoredRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

pub const TIER_EXACT: f64 = 1.0;
pub const TIER_TEXT: f64 = 0.8;
pub const TIER_TRADE_NAME: f64 = 0.7;
pub const TIER_PARTIAL: f64 = 0.5;
pub const CONTACT_FLOOR: f64 = 0.8;

const EPSILON: f64 = 1e-9;

/// Share of significant tokens that must appear for a partial match
const PARTIAL_SHARE: f64 = 0.6;

/// Words too common in company names to identify anyone on their own
const GENERIC_WORDS: &[&str] = &[
    "holding", "holdings", "group", "groep", "company", "international", "services",
    "service", "solutions", "consultancy", "consulting", "trading", "nederland",
    "netherlands", "europe", "global", "general", "management", "beheer", "investments",
    "capital", "partners", "media", "advies", "bouw", "transport", "techniek", "zorg",
    "bank", "systems", "industries", "products", "logistics",
];

/// Matcher tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Minimum relevance for a record to be kept (inclusive)
    pub threshold: f64,
    /// Subtracted when the core name consists of generic words only
    pub frequency_penalty: f64,
    /// Extra words added to the built-in generic list
    pub stop_words: Vec<String>,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            threshold: 0.6,
            frequency_penalty: 0.2,
            stop_words: Vec::new(),
        }
    }
}

/// Scores records against a query and drops the irrelevant ones
pub struct RelevanceMatcher {
    threshold: f64,
    frequency_penalty: f64,
    stop_words: HashSet<String>,
}

impl Default for RelevanceMatcher {
    fn default() -> Self {
        Self::new(&MatcherConfig::default())
    }
}

impl RelevanceMatcher {
    pub fn new(config: &MatcherConfig) -> Self {
        let stop_words = GENERIC_WORDS
            .iter()
            .map(|w| w.to_string())
            .chain(config.stop_words.iter().map(|w| normalize_text(w)))
            .filter(|w| !w.is_empty())
            .collect();

        Self {
            threshold: config.threshold,
            frequency_penalty: config.frequency_penalty,
            stop_words,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Whether a relevance score clears the inclusion threshold
    pub fn passes(&self, relevance: f64) -> bool {
        relevance + EPSILON >= self.threshold
    }

    /// Score a single record against the query
    pub fn score(&self, record: CollaboratorRecord, query: &Query) -> ScoredRecord {
        let entity = normalize_entity(&query.entity_name);
        let text = padded(&normalize_text(&record.text()));

        let base = self.base_score(&record, &entity, &text, query);

        let matched_contact = query
            .contact_person
            .as_deref()
            .map(normalize_text)
            .filter(|c| !c.is_empty())
            .map_or(false, |c| text.contains(&padded(&c)));

        let mut relevance = base;
        if matched_contact && base >= TIER_PARTIAL {
            relevance = relevance.max(CONTACT_FLOOR);
        }
        if self.is_generic(&entity) {
            relevance -= self.frequency_penalty;
        }
        let relevance = relevance.clamp(0.0, 1.0);

        let category = classify(&record);

        ScoredRecord {
            record,
            relevance,
            sentiment: None,
            key_phrases: Vec::new(),
            matched_entity: base >= TIER_PARTIAL,
            matched_contact,
            category,
            conflicting_outcomes: false,
        }
    }

    /// Score every record and keep those at or above the threshold
    pub fn filter(&self, records: Vec<CollaboratorRecord>, query: &Query) -> Vec<ScoredRecord> {
        let total = records.len();
        let kept: Vec<ScoredRecord> = records
            .into_iter()
            .map(|r| self.score(r, query))
            .filter(|s| self.passes(s.relevance))
            .collect();

        debug!(
            "Relevance filter kept {} of {} records for '{}'",
            kept.len(),
            total,
            query.entity_name
        );
        kept
    }

    fn base_score(
        &self,
        record: &CollaboratorRecord,
        entity: &NormalizedEntity,
        text: &str,
        query: &Query,
    ) -> f64 {
        if entity.is_empty() {
            return 0.0;
        }

        if let Some(subject) = record.subject.as_deref().map(normalize_entity) {
            if subject.core == entity.core {
                return TIER_EXACT;
            }
        }

        if text.contains(&padded(&entity.core)) {
            return TIER_TEXT;
        }

        let subject_core = record.subject.as_deref().map(|s| normalize_entity(s).core);
        let trade_match = query
            .trade_names
            .iter()
            .map(|t| normalize_entity(t).core)
            .filter(|t| !t.is_empty())
            .any(|t| subject_core.as_deref() == Some(t.as_str()) || text.contains(&padded(&t)));
        if trade_match {
            return TIER_TRADE_NAME;
        }

        if self.partial_match(entity, text) {
            return TIER_PARTIAL;
        }

        0.0
    }

    fn partial_match(&self, entity: &NormalizedEntity, text: &str) -> bool {
        if entity.tokens().count() < 2 {
            return false;
        }
        let significant: Vec<&str> = entity
            .tokens()
            .filter(|t| t.chars().count() >= 3 && !self.stop_words.contains(*t))
            .collect();
        if significant.is_empty() {
            return false;
        }
        let found = significant
            .iter()
            .filter(|t| text.contains(&padded(t)))
            .count();
        found as f64 / significant.len() as f64 >= PARTIAL_SHARE
    }

    fn is_generic(&self, entity: &NormalizedEntity) -> bool {
        !entity.is_empty() && entity.tokens().all(|t| self.stop_words.contains(t))
    }
}

fn padded(s: &str) -> String {
    format!(" {} ", s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{RiskCategory, SourceCategory};

    fn news(title: &str) -> CollaboratorRecord {
        CollaboratorRecord::new("news", SourceCategory::News, title)
    }

    fn score(query: &Query, record: CollaboratorRecord) -> f64 {
        RelevanceMatcher::default().score(record, query).relevance
    }

    #[test]
    fn test_tiers() {
        let query = Query::new("Acme Robotics B.V.").with_trade_name("RoboCo");

        let exact = CollaboratorRecord::new("kvk", SourceCategory::Registry, "Profile")
            .with_subject("ACME ROBOTICS BV");
        assert_eq!(score(&query, exact), TIER_EXACT);

        assert_eq!(score(&query, news("Acme Robotics opens new plant")), TIER_TEXT);
        assert_eq!(score(&query, news("Acme Robotics B.V. opens new plant")), TIER_TEXT);
        assert_eq!(score(&query, news("RoboCo recalls product")), TIER_TRADE_NAME);
        assert_eq!(score(&query, news("Robotics firm Acme expands")), TIER_PARTIAL);
        assert_eq!(score(&query, news("Weather report")), 0.0);
    }

    #[test]
    fn test_record_legal_form_does_not_change_tier() {
        let query = Query::new("Acme Robotics B.V.");
        let matcher = RelevanceMatcher::default();

        for suffix in ["B.V.", "N.V.", "Ltd", ""] {
            let name = format!("Acme Robotics {}", suffix);
            let subject = CollaboratorRecord::new("kvk", SourceCategory::Registry, "Profile")
                .with_subject(name.trim());
            assert_eq!(score(&query, subject.clone()), TIER_EXACT, "subject {}", name);
            assert_eq!(matcher.filter(vec![subject], &query).len(), 1);

            let article = news(&format!("{} annual report", name.trim()));
            assert_eq!(score(&query, article), TIER_TEXT, "text {}", name);
        }
    }

    #[test]
    fn test_legal_form_suffix_invariance() {
        let record = news("Acme Robotics under investigation").with_summary("Regulator fines Acme Robotics");
        let bv = Query::new("Acme Robotics B.V.");
        let nv = Query::new("Acme Robotics N.V.");
        assert_eq!(score(&bv, record.clone()), score(&nv, record));

        let registry = CollaboratorRecord::new("kvk", SourceCategory::Registry, "Profile")
            .with_subject("Acme Robotics");
        assert_eq!(score(&bv, registry.clone()), score(&nv, registry));
    }

    #[test]
    fn test_contact_boost_requires_entity_match() {
        let query = Query::new("Acme Robotics B.V.").with_contact("Jan de Vries");
        let matcher = RelevanceMatcher::default();

        let contact_only = matcher.score(news("Jan de Vries wins local award"), &query);
        assert!(contact_only.matched_contact);
        assert!(!contact_only.matched_entity);
        assert_eq!(contact_only.relevance, 0.0);

        let both = matcher.score(
            news("Robotics pioneer Acme hires Jan de Vries"),
            &query,
        );
        assert!(both.matched_entity);
        assert!(both.matched_contact);
        assert_eq!(both.relevance, CONTACT_FLOOR);
    }

    #[test]
    fn test_threshold_boundary() {
        let matcher = RelevanceMatcher::default();
        assert!(matcher.passes(0.6));
        assert!(!matcher.passes(0.59));

        // text tier 0.8 minus the penalty lands exactly on the threshold
        let query = Query::new("Global Holding");
        let record = news("Global Holding reports results");
        assert_eq!(matcher.filter(vec![record.clone()], &query).len(), 1);

        let stricter = RelevanceMatcher::new(&MatcherConfig {
            frequency_penalty: 0.21,
            ..Default::default()
        });
        let scored = stricter.score(record.clone(), &query);
        assert!((scored.relevance - 0.59).abs() < 1e-9);
        assert!(stricter.filter(vec![record], &query).is_empty());
    }

    #[test]
    fn test_configured_stop_words() {
        let matcher = RelevanceMatcher::new(&MatcherConfig {
            stop_words: vec!["Acme".to_string()],
            ..Default::default()
        });
        let query = Query::new("Acme");
        let scored = matcher.score(news("Acme in the news"), &query);
        assert!((scored.relevance - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_category_assigned() {
        let query = Query::new("Acme");
        let scored = RelevanceMatcher::default().score(news("Acme declared bankrupt"), &query);
        assert_eq!(scored.category, RiskCategory::Financial);
    }
}
