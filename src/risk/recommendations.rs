//! Recommendation templates

use super::types::{Recommendation, RiskLevel};
use crate::records::{RiskCategory, SourceStatus};

/// Fixed advice per category and level; `None` below medium
pub fn template(category: RiskCategory, level: RiskLevel) -> Option<&'static str> {
    let text = match (category, level) {
        (_, RiskLevel::Low) => return None,
        (RiskCategory::Legal, RiskLevel::High) => {
            "Monitor ongoing proceedings and have the cases found reviewed by legal counsel before contracting."
        }
        (RiskCategory::Legal, RiskLevel::Medium) => {
            "Review the court decisions found and ask the counterparty to explain their outcome."
        }
        (RiskCategory::Reputation, RiskLevel::High) => {
            "Investigate the negative media coverage and weigh its effect on your own reputation."
        }
        (RiskCategory::Reputation, RiskLevel::Medium) => {
            "Keep monitoring media coverage of the counterparty."
        }
        (RiskCategory::Financial, RiskLevel::High) => {
            "Verify solvency through annual accounts or a credit report and consider payment upfront or security."
        }
        (RiskCategory::Financial, RiskLevel::Medium) => {
            "Request recent financial statements and agree payment terms that limit exposure."
        }
        (RiskCategory::Operational, RiskLevel::High) => {
            "Assess continuity of delivery; changes in ownership or operations may affect the agreement."
        }
        (RiskCategory::Operational, RiskLevel::Medium) => {
            "Confirm key contacts and delivery capacity before committing."
        }
    };
    Some(text)
}

/// Recommendation for a category, if its level warrants one
pub fn for_category(category: RiskCategory, level: RiskLevel) -> Option<Recommendation> {
    template(category, level).map(|text| Recommendation {
        category: Some(category),
        level: Some(level),
        text: text.to_string(),
    })
}

/// Reduced-confidence advice when collaborators degraded
pub fn for_degradation(sources: &[SourceStatus]) -> Option<Recommendation> {
    let degraded: Vec<&str> = sources
        .iter()
        .filter(|s| s.is_degraded())
        .map(|s| s.name.as_str())
        .collect();
    if degraded.is_empty() {
        return None;
    }

    Some(Recommendation {
        category: None,
        level: None,
        text: format!(
            "Not every source could be consulted ({}); confidence in this assessment is reduced, repeat it before relying on a low score.",
            degraded.join(", ")
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{FailureKind, SourceCategory};

    #[test]
    fn test_only_medium_and_high_get_advice() {
        for category in RiskCategory::ALL {
            assert!(for_category(category, RiskLevel::Low).is_none());
            assert!(for_category(category, RiskLevel::Medium).is_some());
            assert!(for_category(category, RiskLevel::High).is_some());
        }
        assert!(template(RiskCategory::Legal, RiskLevel::High)
            .unwrap()
            .contains("Monitor ongoing proceedings"));
    }

    #[test]
    fn test_degradation_names_sources() {
        let sources = vec![
            SourceStatus::succeeded("kvk", SourceCategory::Registry, 1),
            SourceStatus::degraded("news", SourceCategory::News, FailureKind::Timeout),
        ];
        let rec = for_degradation(&sources).unwrap();
        assert!(rec.text.contains("(news)"));
        assert!(for_degradation(&sources[..1]).is_none());
    }
}
