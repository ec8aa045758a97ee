//! Record container for deduplicating and ordering scored records

use super::types::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Two sources disagreed on the outcome of the same case
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DuplicateCase {
    pub case_id: String,
    pub outcomes: Vec<LegalOutcome>,
    pub sources: Vec<String>,
}

/// Container that merges scored records from all collaborators of one assessment
///
/// Legal records are keyed by case identifier, everything else by normalized URL.
/// Feed records in a stable order (collaborator registration order) and the
/// ordered output is deterministic.
#[derive(Debug, Clone, Default)]
pub struct RecordContainer {
    records: HashMap<String, ScoredRecord>,
    duplicates: Vec<DuplicateCase>,
}

impl RecordContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record, merging with an existing one under the same key
    pub fn add(&mut self, scored: ScoredRecord) {
        let key = Self::dedup_key(&scored.record);

        let Some(existing) = self.records.get_mut(&key) else {
            self.records.insert(key, scored);
            return;
        };

        if let (Some(a), Some(b)) = (existing.record.legal_outcome, scored.record.legal_outcome) {
            if a != b {
                existing.record.legal_outcome = Some(a.most_severe(b));
                existing.conflicting_outcomes = true;
                let case_id = existing.record.record_id.clone().unwrap_or_else(|| key.clone());
                match self.duplicates.iter_mut().find(|d| d.case_id == case_id) {
                    Some(dup) => {
                        if !dup.outcomes.contains(&b) {
                            dup.outcomes.push(b);
                        }
                        if !dup.sources.contains(&scored.record.source) {
                            dup.sources.push(scored.record.source.clone());
                        }
                    }
                    None => {
                        let mut sources = vec![existing.record.source.clone()];
                        if scored.record.source != existing.record.source {
                            sources.push(scored.record.source.clone());
                        }
                        self.duplicates.push(DuplicateCase {
                            case_id,
                            outcomes: vec![a, b],
                            sources,
                        });
                    }
                }
            }
        }

        existing.record.merge(&scored.record);
        existing.relevance = existing.relevance.max(scored.relevance);
        existing.matched_contact |= scored.matched_contact;
        existing.matched_entity |= scored.matched_entity;
        if existing.sentiment.is_none() {
            existing.sentiment = scored.sentiment;
        }
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = ScoredRecord>) {
        for record in records {
            self.add(record);
        }
    }

    /// Unresolved duplicate cases seen so far
    pub fn duplicates(&self) -> &[DuplicateCase] {
        &self.duplicates
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records ordered by category, relevance, recency and key
    pub fn into_ordered(self) -> Vec<ScoredRecord> {
        let mut entries: Vec<(String, ScoredRecord)> = self.records.into_iter().collect();
        entries.sort_by(|(ka, a), (kb, b)| {
            a.category
                .cmp(&b.category)
                .then_with(|| b.relevance.partial_cmp(&a.relevance).unwrap_or(Ordering::Equal))
                .then_with(|| b.record.published.cmp(&a.record.published))
                .then_with(|| ka.cmp(kb))
        });
        entries.into_iter().map(|(_, r)| r).collect()
    }

    fn dedup_key(record: &CollaboratorRecord) -> String {
        if record.source_category == SourceCategory::Legal {
            if let Some(ref id) = record.record_id {
                return format!("case:{}", id.trim().to_uppercase());
            }
        }
        if let Some(ref url) = record.url {
            return format!("url:{}", Self::url_hash(url));
        }
        format!(
            "{}:{}:{}",
            record.source,
            record.record_id.as_deref().unwrap_or_default(),
            record.title.to_lowercase()
        )
    }

    /// Normalize a URL for deduplication
    fn url_hash(url: &str) -> String {
        let url = url
            .trim_end_matches('/')
            .replace("https://", "")
            .replace("http://", "")
            .replace("www.", "");

        url.to_lowercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(record: CollaboratorRecord, relevance: f64, category: RiskCategory) -> ScoredRecord {
        ScoredRecord {
            record,
            relevance,
            sentiment: None,
            key_phrases: vec![],
            matched_entity: true,
            matched_contact: false,
            category,
            conflicting_outcomes: false,
        }
    }

    #[test]
    fn test_url_deduplication() {
        let mut container = RecordContainer::new();

        let a = CollaboratorRecord::new("news", SourceCategory::News, "Acme fined")
            .with_url("https://www.example.com/acme");
        let b = CollaboratorRecord::new("web", SourceCategory::Web, "Acme fined again")
            .with_url("http://example.com/acme/")
            .with_summary("details");

        container.add(scored(a, 0.8, RiskCategory::Reputation));
        container.add(scored(b, 1.0, RiskCategory::Reputation));

        assert_eq!(container.len(), 1);
        let records = container.into_ordered();
        assert_eq!(records[0].relevance, 1.0);
        assert_eq!(records[0].record.summary.as_deref(), Some("details"));
    }

    #[test]
    fn test_conflicting_case_outcomes_are_flagged() {
        let mut container = RecordContainer::new();

        let a = CollaboratorRecord::new("rechtspraak", SourceCategory::Legal, "Uitspraak")
            .with_id("ECLI:NL:RBAMS:2024:1")
            .with_outcome(LegalOutcome::CivilOther);
        let b = CollaboratorRecord::new("mirror", SourceCategory::Legal, "Uitspraak (kopie)")
            .with_id("ecli:nl:rbams:2024:1")
            .with_outcome(LegalOutcome::CivilLoss);

        container.add(scored(a, 0.8, RiskCategory::Legal));
        container.add(scored(b, 0.8, RiskCategory::Legal));

        assert_eq!(container.len(), 1);
        assert_eq!(container.duplicates().len(), 1);
        assert_eq!(container.duplicates()[0].sources, vec!["rechtspraak", "mirror"]);

        let records = container.into_ordered();
        assert!(records[0].conflicting_outcomes);
        assert_eq!(records[0].record.legal_outcome, Some(LegalOutcome::CivilLoss));
    }

    #[test]
    fn test_ordering_is_stable() {
        let mut container = RecordContainer::new();
        for (i, rel) in [0.6, 1.0, 0.8].iter().enumerate() {
            let record = CollaboratorRecord::new("news", SourceCategory::News, format!("item {}", i))
                .with_url(format!("https://news.example/{}", i));
            container.add(scored(record, *rel, RiskCategory::Reputation));
        }
        let legal = CollaboratorRecord::new("rechtspraak", SourceCategory::Legal, "case")
            .with_id("ECLI:1");
        container.add(scored(legal, 0.6, RiskCategory::Legal));

        let ordered = container.into_ordered();
        assert_eq!(ordered[0].category, RiskCategory::Legal);
        let rels: Vec<f64> = ordered[1..].iter().map(|r| r.relevance).collect();
        assert_eq!(rels, vec![1.0, 0.8, 0.6]);
    }
}
