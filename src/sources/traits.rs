//! Collaborator contracts and shared request types

use crate::access::FetchError;
use crate::query::{DateRange, Query};
use crate::records::{CollaboratorRecord, LegalOutcome, SourceCategory};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// HTTP request built by a collaborator implementation
#[derive(Debug, Clone)]
pub struct SourceRequest {
    pub url: String,
    pub method: HttpMethod,
    pub headers: HashMap<String, String>,
    /// Query parameters, sent in insertion order
    pub params: Vec<(String, String)>,
    pub data: Option<RequestBody>,
}

impl SourceRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            headers: HashMap::new(),
            params: Vec::new(),
            data: None,
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Post,
            ..Self::get(url)
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Add JSON body
    pub fn json(mut self, data: serde_json::Value) -> Self {
        self.data = Some(RequestBody::Json(data));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Form(HashMap<String, String>),
    Json(serde_json::Value),
}

/// HTTP response handed back to the collaborator implementation
#[derive(Debug, Clone)]
pub struct SourceResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub text: String,
    /// Final URL after redirects
    pub url: String,
}

impl SourceResponse {
    /// Parse response as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, FetchError> {
        Ok(serde_json::from_str(&self.text)?)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(|s| s.as_str())
    }
}

/// Registered entity profile from the corporate registry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityProfile {
    pub registry_id: String,
    pub name: String,
    #[serde(default)]
    pub trade_names: Vec<String>,
    /// Registration status, e.g. `active`, `dissolved`, `bankrupt`
    pub status: String,
    pub legal_form: Option<String>,
    pub registered_on: Option<DateTime<Utc>>,
    pub address: Option<String>,
    pub url: Option<String>,
}

/// One case from the legal archive search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseSummary {
    /// Stable case identifier (ECLI for Dutch courts)
    pub case_id: Option<String>,
    pub title: String,
    pub summary: Option<String>,
    pub issued: Option<DateTime<Utc>>,
    pub court: Option<String>,
    /// Area of law as reported by the archive
    pub category: Option<String>,
    pub outcome: LegalOutcome,
    pub url: Option<String>,
}

/// One article reference from the news provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArticleRef {
    pub title: String,
    pub source: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub url: String,
    pub excerpt: Option<String>,
}

/// One crawled page with boilerplate removed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageDocument {
    pub url: String,
    pub title: Option<String>,
    pub text: String,
    pub depth: u32,
}

/// Output of the generative scoring service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextScore {
    /// Sentiment in [-1, 1]
    pub sentiment: f64,
    /// Relevance in [0, 1] as judged by the service
    pub relevance: f64,
    #[serde(default)]
    pub key_phrases: Vec<String>,
}

/// Corporate registry
#[async_trait]
pub trait RegistryLookup: Send + Sync {
    /// Look up by registry identifier or, without one, by name
    async fn lookup(&self, identifier_or_name: &str) -> Result<EntityProfile, FetchError>;
}

/// Legal-case archive
#[async_trait]
pub trait LegalArchive: Send + Sync {
    async fn search(
        &self,
        entity_name: &str,
        range: &DateRange,
        limit: usize,
    ) -> Result<Vec<CaseSummary>, FetchError>;

    /// Full text of a single case
    async fn fetch_detail(&self, case_id: &str) -> Result<String, FetchError>;
}

/// News or web search provider
#[async_trait]
pub trait NewsProvider: Send + Sync {
    async fn search(
        &self,
        entity_name: &str,
        contact_name: Option<&str>,
        range: &DateRange,
        limit: usize,
    ) -> Result<Vec<ArticleRef>, FetchError>;
}

/// Website crawler
#[async_trait]
pub trait ContentCrawler: Send + Sync {
    async fn crawl(
        &self,
        seed_url: &str,
        max_depth: u32,
        same_domain_only: bool,
        max_pages: usize,
    ) -> Result<Vec<PageDocument>, FetchError>;
}

/// Generative scoring service
#[async_trait]
pub trait ScoringService: Send + Sync {
    async fn score(&self, text: &str, entity_name: &str) -> Result<TextScore, FetchError>;
}

/// Uniform fetch contract every collaborator adapter implements
#[async_trait]
pub trait Collaborator: Send + Sync {
    /// Collaborator name; also the rate-limit and cache namespace
    fn name(&self) -> &str;

    fn kind(&self) -> SourceCategory;

    /// Mandatory collaborators are never skipped
    fn mandatory(&self) -> bool {
        false
    }

    /// Default per-call timeout
    fn timeout(&self) -> Duration {
        Duration::from_secs(20)
    }

    /// Default cache TTL
    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(3600)
    }

    /// Fetch records for a query, normalized to [`CollaboratorRecord`]
    async fn fetch(&self, query: &Query) -> Result<Vec<CollaboratorRecord>, FetchError>;
}
