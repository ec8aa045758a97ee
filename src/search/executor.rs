//! Assessment execution and orchestration

use super::cancel::CancelToken;
use super::models::{AssessError, AssessmentState};
use crate::access::{AccessLayer, FetchError, FetchOutcome};
use crate::cache::query_cache_key;
use crate::config::AssessmentSettings;
use crate::matcher::RelevanceMatcher;
use crate::query::Query;
use crate::records::{
    CollaboratorRecord, FailureKind, RecordContainer, RiskCategory, ScoredRecord,
    SourceCategory, SourceOutcome, SourceStatus,
};
use crate::risk::{RiskAggregator, RiskAssessment};
use crate::sources::{Collaborator, ScoringService, SourceRegistry, SCORING_SOURCE};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

/// Scoring calls in flight at once
const SCORING_CONCURRENCY: usize = 4;

type TaskOutput = (usize, Result<FetchOutcome, FetchError>, Duration);

/// Assessment executor that fans a query out to every collaborator
pub struct Assessor {
    /// Collaborators in registration order
    registry: Arc<SourceRegistry>,
    /// Cache, limiter and retry in front of the collaborators
    access: Arc<AccessLayer>,
    matcher: RelevanceMatcher,
    aggregator: RiskAggregator,
    settings: AssessmentSettings,
}

impl Assessor {
    /// Create a new assessor
    pub fn new(
        registry: Arc<SourceRegistry>,
        access: Arc<AccessLayer>,
        settings: AssessmentSettings,
    ) -> Self {
        Self {
            registry,
            access,
            matcher: RelevanceMatcher::new(&settings.matcher),
            aggregator: RiskAggregator::new(settings.evidence_limit),
            settings,
        }
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    pub fn access(&self) -> &Arc<AccessLayer> {
        &self.access
    }

    /// Why a collaborator is not consulted for a query, if it is not.
    /// Mandatory collaborators are always consulted.
    fn skip_reason(source: &dyn Collaborator, query: &Query) -> Option<&'static str> {
        if source.mandatory() {
            return None;
        }
        match source.kind() {
            SourceCategory::Legal if !query.include.legal => Some("legal category excluded"),
            SourceCategory::Registry if !query.include.financial => {
                Some("financial category excluded")
            }
            SourceCategory::News | SourceCategory::Web if !query.include.any_text_category() => {
                Some("text categories excluded")
            }
            SourceCategory::Web if query.website.is_none() => Some("no website given"),
            SourceCategory::Web if query.depth.crawl_depth().is_none() => {
                Some("crawling not included at this depth")
            }
            _ => None,
        }
    }

    /// Run one assessment
    pub async fn assess(&self, query: Query) -> Result<RiskAssessment, AssessError> {
        let started = Instant::now();
        let query = query.validate()?;
        let metrics = self.access.metrics().clone();
        metrics.inc_assessment();

        if self.registry.is_empty() {
            return Err(AssessError::NoSources);
        }

        let mut state = AssessmentState::Pending;
        let global = self.settings.deadline(query.depth);
        let deadline = started + global;
        let source_deadline = (started + self.settings.source_budget(global)).min(deadline);
        let query_key = query_cache_key(&query);
        let query = Arc::new(query);
        let cancel = CancelToken::new();

        let sources = self.registry.all();
        let mut statuses: Vec<Option<SourceStatus>> = vec![None; sources.len()];
        let mut results: Vec<Vec<CollaboratorRecord>> = vec![Vec::new(); sources.len()];
        let mut tasks: JoinSet<TaskOutput> = JoinSet::new();

        for (index, source) in sources.iter().enumerate() {
            if let Some(reason) = Self::skip_reason(source.as_ref(), &query) {
                debug!("Skipping {}: {}", source.name(), reason);
                statuses[index] = Some(SourceStatus {
                    mandatory: source.mandatory(),
                    ..SourceStatus::skipped(source.name(), source.kind(), reason)
                });
                continue;
            }

            let source = source.clone();
            let access = self.access.clone();
            let query = query.clone();
            let query_key = query_key.clone();
            let cancel = cancel.clone();

            tasks.spawn(async move {
                let begun = Instant::now();
                let fetch = access.fetch(
                    source.as_ref(),
                    &query,
                    &query_key,
                    source.cache_ttl(),
                    source.timeout(),
                    &cancel,
                );
                let result = match timeout_at(source_deadline, fetch).await {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::Timeout),
                };
                (index, result, begun.elapsed())
            });
        }

        state = advance(state, AssessmentState::Fetching, &query.entity_name);
        info!(
            "Assessing '{}' ({}) with {} of {} sources",
            query.entity_name,
            query.depth.as_str(),
            tasks.len(),
            sources.len()
        );

        let mut timed_out = false;
        let global_timer = tokio::time::sleep_until(deadline);
        tokio::pin!(global_timer);

        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((index, result, elapsed))) => {
                        let source = &sources[index];
                        let elapsed_ms = elapsed.as_millis() as u64;
                        let status = match result {
                            Ok(outcome) => {
                                let status = SourceStatus {
                                    mandatory: source.mandatory(),
                                    elapsed_ms,
                                    from_cache: outcome.from_cache,
                                    ..SourceStatus::succeeded(source.name(), source.kind(), outcome.records.len())
                                };
                                results[index] = outcome.records;
                                status
                            }
                            Err(err) => {
                                warn!("{} degraded: {}", source.name(), err);
                                SourceStatus {
                                    mandatory: source.mandatory(),
                                    elapsed_ms,
                                    detail: Some(err.to_string()),
                                    ..SourceStatus::degraded(source.name(), source.kind(), err.kind())
                                }
                            }
                        };
                        statuses[index] = Some(status);
                    }
                    Some(Err(e)) => {
                        error!("Source task failed: {}", e);
                    }
                },
                _ = &mut global_timer => {
                    timed_out = true;
                    cancel.cancel();
                    tasks.abort_all();
                    break;
                }
            }
        }

        let cutoff_ms = started.elapsed().as_millis() as u64;
        let statuses: Vec<SourceStatus> = statuses
            .into_iter()
            .zip(sources.iter())
            .map(|(status, source)| {
                status.unwrap_or_else(|| {
                    let (kind, detail) = if timed_out {
                        (FailureKind::Timeout, "global deadline elapsed")
                    } else {
                        (FailureKind::Unavailable, "source task failed")
                    };
                    warn!("{}: {}", source.name(), detail);
                    SourceStatus {
                        mandatory: source.mandatory(),
                        elapsed_ms: cutoff_ms,
                        detail: Some(detail.to_string()),
                        ..SourceStatus::degraded(source.name(), source.kind(), kind)
                    }
                })
            })
            .collect();

        let attempted: Vec<&SourceStatus> = statuses
            .iter()
            .filter(|s| s.outcome != SourceOutcome::Skipped)
            .collect();
        if !attempted.is_empty() && attempted.iter().all(|s| s.is_degraded()) {
            advance(state, AssessmentState::Failed, &query.entity_name);
            error!("All sources failed for '{}'", query.entity_name);
            metrics.inc_failed();
            return Err(AssessError::AllSourcesFailed {
                failures: attempted.into_iter().cloned().collect(),
            });
        }

        state = advance(state, AssessmentState::Aggregating, &query.entity_name);

        let mut container = RecordContainer::new();
        for records in results {
            let kept = self
                .matcher
                .filter(records, &query)
                .into_iter()
                .filter(|r| query.include.includes(r.category));
            container.extend(kept);
        }
        let duplicates = container.duplicates().to_vec();
        let mut records = container.into_ordered();

        let mut sources_meta = statuses;
        if let Some(scorer) = self.registry.scorer() {
            if let Some(status) = self.enrich(scorer, &mut records, &query, deadline).await {
                sources_meta.push(status);
            }
        }

        let assessment = self
            .aggregator
            .aggregate(&records, &query, &sources_meta, &duplicates);

        advance(state, assessment.status, &query.entity_name);
        if assessment.is_degraded() {
            metrics.inc_degraded();
        }
        info!(
            "Assessment of '{}' finished: {} ({:.2}) from {} records in {:?}",
            query.entity_name,
            assessment.overall_level,
            assessment.overall_score,
            assessment.record_count,
            started.elapsed()
        );

        Ok(assessment)
    }

    /// Attach sentiment and key phrases to news and web records, within
    /// what is left of the global deadline. Returns the status of the
    /// scoring service, `None` when there was nothing to score.
    async fn enrich(
        &self,
        scorer: &Arc<dyn ScoringService>,
        records: &mut [ScoredRecord],
        query: &Query,
        deadline: Instant,
    ) -> Option<SourceStatus> {
        let targets: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| {
                matches!(r.record.source_category, SourceCategory::News | SourceCategory::Web)
                    && r.category != RiskCategory::Legal
                    && r.sentiment.is_none()
            })
            .map(|(i, _)| i)
            .collect();
        if targets.is_empty() {
            return None;
        }

        let begun = Instant::now();
        let metrics = self.access.metrics().clone();
        let scoring_deadline = deadline
            .checked_sub(self.settings.grace())
            .unwrap_or(deadline);

        if scoring_deadline <= begun {
            warn!("No time left to score {} records", targets.len());
            return Some(SourceStatus {
                detail: Some("global deadline reached before scoring".to_string()),
                ..SourceStatus::degraded(SCORING_SOURCE, SourceCategory::News, FailureKind::Timeout)
            });
        }

        let limiter = self.access.limiter().clone();
        let scorer = scorer.clone();
        let entity: Arc<str> = Arc::from(query.entity_name.as_str());
        let texts: Vec<String> = targets.iter().map(|&i| records[i].record.text()).collect();
        let calls = stream::iter(texts.into_iter().map(|text| {
            let limiter = limiter.clone();
            let scorer = scorer.clone();
            let metrics = metrics.clone();
            let entity = entity.clone();
            async move {
                limiter.acquire(SCORING_SOURCE).await?;
                metrics.record_call(SCORING_SOURCE);
                let started = Instant::now();
                let result = scorer.score(&text, &entity).await;
                match result {
                    Ok(_) => metrics.record_success(SCORING_SOURCE, started.elapsed().as_millis() as u64),
                    Err(ref e) => metrics.record_error(SCORING_SOURCE, e.kind()),
                }
                result
            }
        }))
        .buffered(SCORING_CONCURRENCY)
        .collect::<Vec<_>>();

        let scores = match timeout_at(scoring_deadline, calls).await {
            Ok(scores) => scores,
            Err(_) => {
                warn!("Scoring of {} records timed out", targets.len());
                return Some(SourceStatus {
                    elapsed_ms: begun.elapsed().as_millis() as u64,
                    detail: Some("scoring exceeded the global deadline".to_string()),
                    ..SourceStatus::degraded(SCORING_SOURCE, SourceCategory::News, FailureKind::Timeout)
                });
            }
        };

        let mut scored = 0;
        let mut first_error: Option<FetchError> = None;
        for (&index, score) in targets.iter().zip(scores) {
            match score {
                Ok(score) => {
                    records[index].sentiment = Some(score.sentiment);
                    records[index].key_phrases = score.key_phrases;
                    scored += 1;
                }
                Err(e) => {
                    debug!("Scoring failed for '{}': {}", records[index].record.title, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        let elapsed_ms = begun.elapsed().as_millis() as u64;
        Some(match first_error {
            None => SourceStatus {
                elapsed_ms,
                ..SourceStatus::succeeded(SCORING_SOURCE, SourceCategory::News, scored)
            },
            Some(err) => {
                warn!("Scoring degraded ({} of {} scored): {}", scored, targets.len(), err);
                SourceStatus {
                    elapsed_ms,
                    record_count: scored,
                    detail: Some(err.to_string()),
                    ..SourceStatus::degraded(SCORING_SOURCE, SourceCategory::News, err.kind())
                }
            }
        })
    }
}

/// Log a state transition and return the new state
fn advance(from: AssessmentState, to: AssessmentState, entity: &str) -> AssessmentState {
    debug!("Assessment of '{}': {} -> {}", entity, from, to);
    to
}
