//! HTTP request handlers

use super::state::AppState;
use crate::query::{CategoryFlags, LookbackWindow, Query, SearchDepth};
use crate::records::{SourceCategory, SourceStatus};
use crate::search::AssessError;
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Body of an assessment request
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssessRequest {
    pub entity_name: String,
    #[serde(default)]
    pub contact_person: Option<String>,
    #[serde(default)]
    pub registry_id: Option<String>,
    #[serde(default)]
    pub trade_names: Vec<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub lookback: LookbackWindow,
    #[serde(default)]
    pub depth: SearchDepth,
    #[serde(default)]
    pub include: CategoryFlags,
    /// Reference time, now when absent
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
}

impl AssessRequest {
    pub fn into_query(self) -> Query {
        let mut query = Query::new(self.entity_name)
            .with_lookback(self.lookback)
            .with_depth(self.depth)
            .with_categories(self.include);
        query.contact_person = self.contact_person;
        query.registry_id = self.registry_id;
        query.trade_names = self.trade_names;
        query.website = self.website;
        if let Some(as_of) = self.as_of {
            query = query.as_of(as_of);
        }
        query
    }
}

/// Error body returned when no assessment could be produced
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<SourceStatus>,
}

impl From<&AssessError> for ErrorResponse {
    fn from(err: &AssessError) -> Self {
        let error = match err {
            AssessError::InvalidQuery(_) => "invalid_query",
            AssessError::NoSources => "no_sources",
            AssessError::AllSourcesFailed { .. } => "all_sources_failed",
        };
        Self {
            error,
            message: err.to_string(),
            failures: err.failures().to_vec(),
        }
    }
}

fn error_status(err: &AssessError) -> StatusCode {
    match err {
        AssessError::InvalidQuery(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AssessError::NoSources | AssessError::AllSourcesFailed { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Assessment handler
pub async fn assess(State(state): State<AppState>, Json(request): Json<AssessRequest>) -> Response {
    let request_id = Uuid::new_v4().to_string();
    info!(
        "[{}] Assessment requested for '{}'",
        request_id, request.entity_name
    );

    let span = info_span!("assess", request_id = %request_id);
    let outcome = state
        .assessor
        .assess(request.into_query())
        .instrument(span)
        .await;

    let mut response = match outcome {
        Ok(assessment) => Json(assessment).into_response(),
        Err(err) => {
            warn!("[{}] Assessment failed: {}", request_id, err);
            (error_status(&err), Json(ErrorResponse::from(&err))).into_response()
        }
    };

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[derive(Debug, Serialize)]
pub struct SourceInfo {
    pub name: String,
    pub kind: SourceCategory,
    pub mandatory: bool,
    pub timeout_ms: u64,
}

/// Configured collaborators, in the order they are consulted
pub async fn sources(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.assessor.registry();
    let sources: Vec<SourceInfo> = registry
        .all()
        .iter()
        .map(|s| SourceInfo {
            name: s.name().to_string(),
            kind: s.kind(),
            mandatory: s.mandatory(),
            timeout_ms: s.timeout().as_millis() as u64,
        })
        .collect();

    Json(serde_json::json!({
        "sources": sources,
        "scoring": registry.scorer().is_some(),
    }))
}

/// Stats handler
pub async fn stats(State(state): State<AppState>) -> Response {
    if !state.metrics_enabled() {
        return StatusCode::NOT_FOUND.into_response();
    }
    Json(serde_json::json!({
        "instance_name": state.instance_name(),
        "metrics": state.metrics.snapshot(),
    }))
    .into_response()
}

/// Health check handler
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION
    }))
}
