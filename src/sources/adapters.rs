//! Collaborator adapters
//!
//! One adapter per collaborator contract. Each turns the contract's own
//! payload into [`CollaboratorRecord`]s, so nothing provider specific
//! leaks past this module.

use super::traits::*;
use crate::access::FetchError;
use crate::config::SourceConfig;
use crate::query::Query;
use crate::records::{CollaboratorRecord, SourceCategory};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Cases requested from the legal archive per assessment
const LEGAL_SEARCH_LIMIT: usize = 50;

/// Identity and budgets of one configured collaborator
#[derive(Debug, Clone)]
pub struct SourceMeta {
    pub name: String,
    pub mandatory: bool,
    pub timeout: Duration,
    pub cache_ttl: Duration,
}

impl SourceMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mandatory: false,
            timeout: Duration::from_secs(20),
            cache_ttl: Duration::from_secs(3600),
        }
    }

    /// Take name, flags and budgets from configuration
    pub fn from_config(config: &SourceConfig, default_timeout: Duration) -> Self {
        Self {
            name: config.name.clone(),
            mandatory: config.mandatory,
            timeout: config.timeout().unwrap_or(default_timeout),
            cache_ttl: config.cache_ttl(),
        }
    }

    pub fn mandatory(mut self, mandatory: bool) -> Self {
        self.mandatory = mandatory;
        self
    }
}

macro_rules! collaborator_meta {
    ($kind:expr) => {
        fn name(&self) -> &str {
            &self.meta.name
        }

        fn kind(&self) -> SourceCategory {
            $kind
        }

        fn mandatory(&self) -> bool {
            self.meta.mandatory
        }

        fn timeout(&self) -> Duration {
            self.meta.timeout
        }

        fn cache_ttl(&self) -> Duration {
            self.meta.cache_ttl
        }
    };
}

/// Stable identifier for a case the archive gave no identifier for
pub fn synthetic_case_id(case: &CaseSummary) -> String {
    let mut hasher = Sha256::new();
    hasher.update(case.url.as_deref().unwrap_or(&case.title).as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().take(12).map(|b| format!("{:02x}", b)).collect();
    format!("case:{}", hex)
}

/// Corporate registry adapter
pub struct RegistrySource {
    meta: SourceMeta,
    registry: Arc<dyn RegistryLookup>,
}

impl RegistrySource {
    pub fn new(meta: SourceMeta, registry: Arc<dyn RegistryLookup>) -> Self {
        Self { meta, registry }
    }

    fn to_record(&self, profile: EntityProfile) -> CollaboratorRecord {
        let mut summary = vec![format!("Status: {}", profile.status)];
        if let Some(ref form) = profile.legal_form {
            summary.push(format!("Legal form: {}", form));
        }
        if let Some(registered) = profile.registered_on {
            summary.push(format!("Registered: {}", registered.format("%Y-%m-%d")));
        }
        if !profile.trade_names.is_empty() {
            summary.push(format!("Trade names: {}", profile.trade_names.join(", ")));
        }
        if let Some(ref address) = profile.address {
            summary.push(format!("Address: {}", address));
        }

        let mut record = CollaboratorRecord::new(
            self.meta.name.clone(),
            SourceCategory::Registry,
            format!("{} ({})", profile.name, profile.registry_id),
        )
        .with_id(profile.registry_id)
        .with_subject(profile.name)
        .with_summary(summary.join(". "));

        if let Some(url) = profile.url {
            record = record.with_url(url);
        }
        record.registry_status = Some(profile.status);
        record
    }
}

#[async_trait]
impl Collaborator for RegistrySource {
    collaborator_meta!(SourceCategory::Registry);

    async fn fetch(&self, query: &Query) -> Result<Vec<CollaboratorRecord>, FetchError> {
        let key = query.registry_id.as_deref().unwrap_or(&query.entity_name);
        let profile = self.registry.lookup(key).await?;
        Ok(vec![self.to_record(profile)])
    }
}

/// Legal-case archive adapter; enriches the newest cases with their full text
pub struct LegalSource {
    meta: SourceMeta,
    archive: Arc<dyn LegalArchive>,
    detail_limit: usize,
}

impl LegalSource {
    pub fn new(meta: SourceMeta, archive: Arc<dyn LegalArchive>) -> Self {
        Self {
            meta,
            archive,
            detail_limit: 5,
        }
    }

    pub fn with_detail_limit(mut self, detail_limit: usize) -> Self {
        self.detail_limit = detail_limit;
        self
    }
}

#[async_trait]
impl Collaborator for LegalSource {
    collaborator_meta!(SourceCategory::Legal);

    async fn fetch(&self, query: &Query) -> Result<Vec<CollaboratorRecord>, FetchError> {
        let range = query.date_range();
        let cases = self
            .archive
            .search(&query.entity_name, &range, LEGAL_SEARCH_LIMIT)
            .await?;

        let mut records = Vec::with_capacity(cases.len());
        for case in cases.into_iter().filter(|c| range.contains(c.issued)) {
            let case_id = case.case_id.clone().unwrap_or_else(|| synthetic_case_id(&case));

            let body = if records.len() < self.detail_limit && case.case_id.is_some() {
                match self.archive.fetch_detail(&case_id).await {
                    Ok(text) if !text.trim().is_empty() => Some(text),
                    Ok(_) => None,
                    Err(e) => {
                        warn!("Detail fetch failed for {}: {}", case_id, e);
                        None
                    }
                }
            } else {
                None
            };

            let mut record = CollaboratorRecord::new(self.meta.name.clone(), SourceCategory::Legal, case.title)
                .with_id(case_id)
                .with_outcome(case.outcome);
            record.summary = case.summary;
            record.body = body;
            record.url = case.url;
            record.published = case.issued;
            record.court = case.court;
            records.push(record);
        }

        debug!("{}: {} cases in range", self.meta.name, records.len());
        Ok(records)
    }
}

/// News provider adapter
pub struct NewsSource {
    meta: SourceMeta,
    provider: Arc<dyn NewsProvider>,
}

impl NewsSource {
    pub fn new(meta: SourceMeta, provider: Arc<dyn NewsProvider>) -> Self {
        Self { meta, provider }
    }
}

#[async_trait]
impl Collaborator for NewsSource {
    collaborator_meta!(SourceCategory::News);

    async fn fetch(&self, query: &Query) -> Result<Vec<CollaboratorRecord>, FetchError> {
        let range = query.date_range();
        let articles = self
            .provider
            .search(
                &query.entity_name,
                query.contact_person.as_deref(),
                &range,
                query.depth.max_articles(),
            )
            .await?;

        Ok(articles
            .into_iter()
            .filter(|a| range.contains(a.published))
            .map(|article| {
                let mut record =
                    CollaboratorRecord::new(self.meta.name.clone(), SourceCategory::News, article.title)
                        .with_url(article.url);
                record.summary = article.excerpt;
                record.published = article.published;
                record.body = article.source.map(|outlet| format!("Source: {}", outlet));
                record
            })
            .collect())
    }
}

/// Website crawler adapter; crawls the queried entity's own site
pub struct WebSource {
    meta: SourceMeta,
    crawler: Arc<dyn ContentCrawler>,
}

impl WebSource {
    pub fn new(meta: SourceMeta, crawler: Arc<dyn ContentCrawler>) -> Self {
        Self { meta, crawler }
    }
}

#[async_trait]
impl Collaborator for WebSource {
    collaborator_meta!(SourceCategory::Web);

    async fn fetch(&self, query: &Query) -> Result<Vec<CollaboratorRecord>, FetchError> {
        let (Some(website), Some(max_depth)) = (query.website.as_deref(), query.depth.crawl_depth()) else {
            return Ok(Vec::new());
        };

        let pages = self
            .crawler
            .crawl(website, max_depth, true, query.depth.crawl_pages())
            .await?;

        Ok(pages
            .into_iter()
            .map(|page| {
                let title = page.title.unwrap_or_else(|| page.url.clone());
                CollaboratorRecord::new(self.meta.name.clone(), SourceCategory::Web, title)
                    .with_url(page.url)
                    .with_body(page.text)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{DateRange, LookbackWindow, SearchDepth};
    use crate::records::LegalOutcome;
    use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
    use std::sync::Mutex;

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    struct FakeRegistry {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RegistryLookup for FakeRegistry {
        async fn lookup(&self, identifier_or_name: &str) -> Result<EntityProfile, FetchError> {
            self.seen.lock().unwrap().push(identifier_or_name.to_string());
            Ok(EntityProfile {
                registry_id: "12345678".to_string(),
                name: "Acme B.V.".to_string(),
                trade_names: vec!["Acme Bouw".to_string()],
                status: "bankrupt".to_string(),
                legal_form: Some("Besloten Vennootschap".to_string()),
                registered_on: None,
                address: None,
                url: None,
            })
        }
    }

    struct FakeArchive {
        cases: Vec<CaseSummary>,
        failing_detail: Option<String>,
        details: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LegalArchive for FakeArchive {
        async fn search(
            &self,
            _entity_name: &str,
            _range: &DateRange,
            _limit: usize,
        ) -> Result<Vec<CaseSummary>, FetchError> {
            Ok(self.cases.clone())
        }

        async fn fetch_detail(&self, case_id: &str) -> Result<String, FetchError> {
            self.details.lock().unwrap().push(case_id.to_string());
            if self.failing_detail.as_deref() == Some(case_id) {
                return Err(FetchError::Timeout);
            }
            Ok(format!("full text of {}", case_id))
        }
    }

    fn case(id: Option<&str>, days_ago: i64) -> CaseSummary {
        CaseSummary {
            case_id: id.map(String::from),
            title: format!("Case {}", id.unwrap_or("unnamed")),
            summary: Some("Acme B.V. ordered to pay".to_string()),
            issued: Some(as_of() - ChronoDuration::days(days_ago)),
            court: Some("Rechtbank Amsterdam".to_string()),
            category: None,
            outcome: LegalOutcome::CivilLoss,
            url: Some(format!("https://uitspraken.example/{}", days_ago)),
        }
    }

    #[tokio::test]
    async fn test_registry_prefers_identifier() {
        let registry = Arc::new(FakeRegistry {
            seen: Mutex::new(Vec::new()),
        });
        let source = RegistrySource::new(SourceMeta::new("kvk"), registry.clone());

        let query = Query::new("Acme B.V.").with_registry_id("12345678");
        let records = source.fetch(&query).await.unwrap();
        source.fetch(&Query::new("Acme B.V.")).await.unwrap();

        assert_eq!(*registry.seen.lock().unwrap(), vec!["12345678", "Acme B.V."]);
        let record = &records[0];
        assert_eq!(record.subject.as_deref(), Some("Acme B.V."));
        assert_eq!(record.registry_status.as_deref(), Some("bankrupt"));
        assert!(record.summary.as_deref().unwrap().contains("Acme Bouw"));
    }

    #[tokio::test]
    async fn test_legal_range_detail_and_synthetic_id() {
        let archive = Arc::new(FakeArchive {
            cases: vec![
                case(Some("ECLI:NL:A:1"), 10),
                case(Some("ECLI:NL:A:2"), 20),
                case(None, 30),
                case(Some("ECLI:NL:A:OLD"), 800),
                case(Some("ECLI:NL:A:3"), 40),
            ],
            failing_detail: Some("ECLI:NL:A:2".to_string()),
            details: Mutex::new(Vec::new()),
        });
        let source = LegalSource::new(SourceMeta::new("rechtspraak"), archive.clone()).with_detail_limit(2);

        let query = Query::new("Acme B.V.")
            .as_of(as_of())
            .with_lookback(LookbackWindow::LastYear);
        let records = source.fetch(&query).await.unwrap();

        assert_eq!(records.len(), 4);
        assert_eq!(records[0].body.as_deref(), Some("full text of ECLI:NL:A:1"));
        // failed detail keeps the summary
        assert!(records[1].body.is_none());
        assert!(records[1].summary.is_some());
        assert_eq!(*archive.details.lock().unwrap(), vec!["ECLI:NL:A:1", "ECLI:NL:A:2"]);

        let synthetic = records[2].record_id.clone().unwrap();
        assert!(synthetic.starts_with("case:"));
        assert_eq!(synthetic, synthetic_case_id(&case(None, 30)));
        assert!(records.iter().all(|r| r.legal_outcome == Some(LegalOutcome::CivilLoss)));
    }

    struct FakeNews;

    #[async_trait]
    impl NewsProvider for FakeNews {
        async fn search(
            &self,
            _entity_name: &str,
            contact_name: Option<&str>,
            _range: &DateRange,
            limit: usize,
        ) -> Result<Vec<ArticleRef>, FetchError> {
            Ok((0..limit)
                .map(|i| ArticleRef {
                    title: format!("{} {}", contact_name.unwrap_or("Acme"), i),
                    source: Some("fd.nl".to_string()),
                    published: None,
                    url: format!("https://fd.example/{}", i),
                    excerpt: None,
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_news_limit_follows_depth() {
        let source = NewsSource::new(SourceMeta::new("news"), Arc::new(FakeNews));

        let simple = Query::new("Acme").with_depth(SearchDepth::Simple);
        assert_eq!(source.fetch(&simple).await.unwrap().len(), 10);

        let deep = Query::new("Acme").with_depth(SearchDepth::Deep).with_contact("Jan");
        let records = source.fetch(&deep).await.unwrap();
        assert_eq!(records.len(), 50);
        assert_eq!(records[0].title, "Jan 0");
    }

    struct FakeCrawler;

    #[async_trait]
    impl ContentCrawler for FakeCrawler {
        async fn crawl(
            &self,
            seed_url: &str,
            max_depth: u32,
            _same_domain_only: bool,
            _max_pages: usize,
        ) -> Result<Vec<PageDocument>, FetchError> {
            Ok(vec![PageDocument {
                url: seed_url.to_string(),
                title: None,
                text: format!("depth {}", max_depth),
                depth: 0,
            }])
        }
    }

    #[tokio::test]
    async fn test_web_needs_website_and_depth() {
        let source = WebSource::new(SourceMeta::new("web"), Arc::new(FakeCrawler));

        assert!(source.fetch(&Query::new("Acme")).await.unwrap().is_empty());

        let simple = Query::new("Acme")
            .with_website("https://acme.example")
            .with_depth(SearchDepth::Simple);
        assert!(source.fetch(&simple).await.unwrap().is_empty());

        let deep = Query::new("Acme")
            .with_website("https://acme.example")
            .with_depth(SearchDepth::Deep);
        let records = source.fetch(&deep).await.unwrap();
        assert_eq!(records[0].title, "https://acme.example");
        assert_eq!(records[0].body.as_deref(), Some("depth 2"));
    }

    #[test]
    fn test_meta_from_config() {
        let config = SourceConfig {
            name: "rechtspraak".to_string(),
            mandatory: true,
            timeout: Some(2.5),
            cache_ttl: 60,
            ..Default::default()
        };
        let meta = SourceMeta::from_config(&config, Duration::from_secs(20));
        assert!(meta.mandatory);
        assert_eq!(meta.timeout, Duration::from_millis(2500));
        assert_eq!(meta.cache_ttl, Duration::from_secs(60));
    }
}
