//! Risk aggregation
//!
//! Turns the scored records of one assessment into category scores, an
//! overall score, recommendations and annotations. Pure and deterministic:
//! "now" is the query's `as_of`.

use super::recommendations;
use super::types::*;
use crate::matcher::financial_signal;
use crate::query::Query;
use crate::records::{
    DuplicateCase, LegalOutcome, RiskCategory, ScoredRecord, SourceCategory, SourceOutcome,
    SourceStatus,
};
use crate::search::AssessmentState;
use chrono::{DateTime, Months, Utc};
use std::cmp::Ordering;

pub const RECENT_WEIGHT: f64 = 1.0;
pub const PAST_YEAR_WEIGHT: f64 = 0.8;
pub const OLD_WEIGHT: f64 = 0.6;

/// Free-text records count for at most this much before relevance and recency
const TEXT_SEVERITY: f64 = 0.3;
/// Adversity of a text record the scoring service has not rated
const NEUTRAL_ADVERSITY: f64 = 0.5;
/// Severity added per strong distress term in a financial text record
const DISTRESS_STEP: f64 = 0.15;
const DISTRESS_MAX: f64 = 0.6;

const CLOSED_STATUSES: &[&str] = &[
    "bankrupt",
    "failliet",
    "faillissement",
    "dissolved",
    "ontbonden",
    "inactive",
    "uitgeschreven",
    "liquidation",
    "in liquidatie",
];

const SUSPENDED_STATUSES: &[&str] = &["suspended", "surseance", "moratorium"];

/// Recency multiplier: under 6 months 1.0, under 12 months 0.8, older 0.6.
/// Undated records count as old.
pub fn recency_weight(published: Option<DateTime<Utc>>, as_of: DateTime<Utc>) -> f64 {
    let Some(published) = published else {
        return OLD_WEIGHT;
    };
    let six_months = as_of.checked_sub_months(Months::new(6));
    let twelve_months = as_of.checked_sub_months(Months::new(12));

    if six_months.map_or(true, |d| published > d) {
        RECENT_WEIGHT
    } else if twelve_months.map_or(true, |d| published > d) {
        PAST_YEAR_WEIGHT
    } else {
        OLD_WEIGHT
    }
}

/// Severity of a registration status
pub fn status_severity(status: &str) -> f64 {
    let status = status.to_lowercase();
    if CLOSED_STATUSES.iter().any(|s| status.contains(s)) {
        0.8
    } else if SUSPENDED_STATUSES.iter().any(|s| status.contains(s)) {
        0.6
    } else {
        0.0
    }
}

fn severity(scored: &ScoredRecord) -> f64 {
    let record = &scored.record;
    match record.source_category {
        SourceCategory::Legal => record
            .legal_outcome
            .unwrap_or(LegalOutcome::CivilOther)
            .severity(),
        SourceCategory::Registry => record.registry_status.as_deref().map_or(0.0, status_severity),
        SourceCategory::News | SourceCategory::Web => {
            let adversity = scored
                .sentiment
                .map_or(NEUTRAL_ADVERSITY, |s| ((1.0 - s) / 2.0).clamp(0.0, 1.0));
            let severity = TEXT_SEVERITY * adversity;
            if scored.category == RiskCategory::Financial {
                severity.max((DISTRESS_STEP * financial_signal(record) as f64).min(DISTRESS_MAX))
            } else {
                severity
            }
        }
    }
}

fn round(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Aggregates scored records into a [`RiskAssessment`]
#[derive(Debug, Clone)]
pub struct RiskAggregator {
    evidence_limit: usize,
}

impl Default for RiskAggregator {
    fn default() -> Self {
        Self::new(5)
    }
}

impl RiskAggregator {
    pub fn new(evidence_limit: usize) -> Self {
        Self { evidence_limit }
    }

    /// Weighted contribution of one record: relevance x severity x recency.
    /// Registry records describe the current state and are never discounted.
    pub fn contribution(&self, scored: &ScoredRecord, as_of: DateTime<Utc>) -> f64 {
        let recency = match scored.record.source_category {
            SourceCategory::Registry => RECENT_WEIGHT,
            _ => recency_weight(scored.record.published, as_of),
        };
        scored.relevance * severity(scored) * recency
    }

    /// Aggregate the records of one assessment.
    ///
    /// `sources` is the per-collaborator metadata; any degraded entry marks
    /// the assessment degraded. `duplicates` are cases whose sources
    /// disagreed on the outcome.
    pub fn aggregate(
        &self,
        records: &[ScoredRecord],
        query: &Query,
        sources: &[SourceStatus],
        duplicates: &[DuplicateCase],
    ) -> RiskAssessment {
        let mut annotations = Vec::new();
        let mut recommendations = Vec::new();
        let mut categories = Vec::with_capacity(RiskCategory::ALL.len());
        let mut record_count = 0;

        for category in RiskCategory::ALL {
            let included = query.include.includes(category);
            let members: Vec<&ScoredRecord> = if included {
                records.iter().filter(|r| r.category == category).collect()
            } else {
                Vec::new()
            };
            record_count += members.len();

            let mut weighted: Vec<(f64, &ScoredRecord)> = members
                .iter()
                .map(|r| (self.contribution(r, query.as_of), *r))
                .collect();
            let score = round(weighted.iter().map(|(c, _)| c).sum::<f64>().min(1.0));
            let level = RiskLevel::from_score(score);

            if !included {
                annotations.push(Annotation::new(
                    AnnotationKind::CategoryExcluded,
                    Some(category),
                    format!("{} risk was excluded from this assessment", category),
                ));
            } else if members.is_empty() {
                annotations.push(Annotation::new(
                    AnnotationKind::InsufficientData,
                    Some(category),
                    format!("No qualifying {} records were found", category),
                ));
            }

            if let Some(rec) = recommendations::for_category(category, level) {
                recommendations.push(rec);
            }

            let newest_record = members.iter().filter_map(|r| r.record.published).max();

            weighted.sort_by(|(ca, a), (cb, b)| {
                cb.partial_cmp(ca)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| b.relevance.partial_cmp(&a.relevance).unwrap_or(Ordering::Equal))
                    .then_with(|| a.record.title.cmp(&b.record.title))
            });
            let evidence = weighted
                .iter()
                .take(self.evidence_limit)
                .map(|(contribution, r)| Evidence {
                    title: r.record.title.clone(),
                    source: r.record.source.clone(),
                    url: r.record.url.clone(),
                    published: r.record.published,
                    relevance: round(r.relevance),
                    sentiment: r.sentiment,
                    legal_outcome: r.record.legal_outcome,
                    contribution: round(*contribution),
                })
                .collect();

            categories.push(CategoryRisk {
                category,
                included,
                score,
                level,
                record_count: members.len(),
                newest_record,
                evidence,
            });
        }

        if record_count == 0 {
            annotations.push(Annotation::new(
                AnnotationKind::InsufficientData,
                None,
                "No qualifying records were found in any category; the low rating reflects missing data, not confirmed low risk",
            ));
        }

        for dup in duplicates {
            let outcomes: Vec<&str> = dup.outcomes.iter().map(|o| o.as_str()).collect();
            annotations.push(Annotation::new(
                AnnotationKind::UnresolvedDuplicate,
                Some(RiskCategory::Legal),
                format!(
                    "Case {} is reported with conflicting outcomes ({}) by {}; the most severe is used",
                    dup.case_id,
                    outcomes.join(", "),
                    dup.sources.join(", ")
                ),
            ));
        }

        // most urgent first: higher level, then heavier category
        recommendations.sort_by(|a, b| {
            b.level.cmp(&a.level).then_with(|| {
                let weight = |r: &Recommendation| r.category.map_or(0.0, |c| c.weight());
                weight(b).partial_cmp(&weight(a)).unwrap_or(Ordering::Equal)
            })
        });
        if let Some(rec) = recommendations::for_degradation(sources) {
            recommendations.push(rec);
        }

        let overall_score = round(
            categories
                .iter()
                .map(|c| c.score * c.category.weight())
                .sum::<f64>(),
        );

        let status = if sources.iter().any(|s| s.outcome == SourceOutcome::Degraded) {
            AssessmentState::Degraded
        } else {
            AssessmentState::Complete
        };

        RiskAssessment {
            entity_name: query.entity_name.clone(),
            registry_id: query.registry_id.clone(),
            as_of: query.as_of,
            depth: query.depth,
            lookback: query.lookback,
            status,
            overall_score,
            overall_level: RiskLevel::from_score(overall_score),
            categories,
            recommendations,
            annotations,
            sources: sources.to_vec(),
            record_count,
        }
    }
}
