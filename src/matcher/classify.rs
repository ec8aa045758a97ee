//! Risk-category assignment for collaborator records

use super::normalize::normalize_text;
use crate::records::{CollaboratorRecord, RiskCategory, SourceCategory};

/// Financial distress vocabulary (English and Dutch)
const FINANCIAL_KEYWORDS: &[&str] = &[
    "bankruptcy",
    "bankrupt",
    "insolvency",
    "insolvent",
    "faillissement",
    "failliet",
    "surseance",
    "debt",
    "schuld",
    "losses",
    "verlies",
    "restructuring",
    "herstructurering",
    "layoffs",
    "ontslagen",
    "fraud",
    "fraude",
    "budget cuts",
    "financial trouble",
    "payment arrears",
    "betalingsachterstand",
];

/// Operational change vocabulary (English and Dutch)
const OPERATIONAL_KEYWORDS: &[&str] = &[
    "merger",
    "fusie",
    "acquisition",
    "overname",
    "reorganisation",
    "reorganization",
    "reorganisatie",
    "management change",
    "new ceo",
    "relocation",
    "verhuizing",
    "recall",
    "terugroepactie",
    "strike",
    "staking",
    "outage",
    "storing",
    "data breach",
    "datalek",
];

/// Assign the risk category a record contributes to
pub fn classify(record: &CollaboratorRecord) -> RiskCategory {
    match record.source_category {
        SourceCategory::Legal => RiskCategory::Legal,
        SourceCategory::Registry => RiskCategory::Financial,
        SourceCategory::News | SourceCategory::Web => {
            let text = format!(" {} ", normalize_text(&record.text()));
            if contains_any(&text, FINANCIAL_KEYWORDS) {
                RiskCategory::Financial
            } else if contains_any(&text, OPERATIONAL_KEYWORDS) {
                RiskCategory::Operational
            } else {
                RiskCategory::Reputation
            }
        }
    }
}

/// Count of strong financial distress terms in the record text
pub fn financial_signal(record: &CollaboratorRecord) -> usize {
    let text = format!(" {} ", normalize_text(&record.text()));
    ["bankruptcy", "bankrupt", "faillissement", "failliet", "insolvency", "fraud", "fraude"]
        .iter()
        .filter(|k| text.contains(&format!(" {} ", k)))
        .count()
}

fn contains_any(normalized: &str, keywords: &[&str]) -> bool {
    keywords
        .iter()
        .any(|k| normalized.contains(&format!(" {} ", k)))
}
