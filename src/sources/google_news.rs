//! Google Custom Search implementation of the news provider
//!
//! Uses the Custom Search JSON API with a news-focused search engine id.
//! The API returns at most 10 items per call, so larger limits are paged.

use super::traits::*;
use crate::access::FetchError;
use crate::network::HttpClient;
use crate::query::DateRange;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/customsearch/v1";

const PAGE_SIZE: usize = 10;

/// The API refuses `start` beyond 91
const MAX_START: usize = 91;

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    items: Vec<ApiItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiItem {
    #[serde(default)]
    title: Option<String>,
    link: String,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    display_link: Option<String>,
    #[serde(default)]
    pagemap: Option<ApiPagemap>,
}

#[derive(Debug, Deserialize)]
struct ApiPagemap {
    #[serde(default)]
    metatags: Vec<serde_json::Map<String, serde_json::Value>>,
}

const DATE_METATAGS: &[&str] = &[
    "article:published_time",
    "og:article:published_time",
    "datepublished",
    "pubdate",
    "date",
];

/// Google Custom Search news client
pub struct GoogleNews {
    client: HttpClient,
    base_url: String,
    api_key: Option<String>,
    engine_id: Option<String>,
}

impl GoogleNews {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            engine_id: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_credentials(mut self, api_key: Option<String>, engine_id: Option<String>) -> Self {
        self.api_key = api_key;
        self.engine_id = engine_id;
        self
    }

    /// Search terms: the exact entity name, plus one combined with the contact
    fn queries(entity_name: &str, contact_name: Option<&str>) -> Vec<String> {
        let mut queries = vec![format!("\"{}\"", entity_name)];
        if let Some(contact) = contact_name.filter(|c| !c.trim().is_empty()) {
            queries.push(format!("\"{}\" \"{}\"", entity_name, contact.trim()));
        }
        queries
    }

    fn request(&self, query: &str, range: &DateRange, start: usize, num: usize) -> SourceRequest {
        let mut request = SourceRequest::get(&self.base_url)
            .param("q", query)
            .param("num", num.clamp(1, PAGE_SIZE).to_string())
            .param("start", start.to_string())
            .param("lr", "lang_nl")
            .param("gl", "nl")
            .param("hl", "nl")
            .param("sort", "date");

        if let Some(from) = range.from {
            let days = (range.to - from).num_days().max(1);
            request = request.param("dateRestrict", format!("d{}", days));
        }
        if let Some(ref key) = self.api_key {
            request = request.param("key", key);
        }
        if let Some(ref cx) = self.engine_id {
            request = request.param("cx", cx);
        }
        request
    }

    fn response(&self, response: SourceResponse) -> Result<Vec<ArticleRef>, FetchError> {
        let api: ApiResponse = response.json()?;

        Ok(api
            .items
            .into_iter()
            .filter(|item| !item.link.is_empty())
            .map(|item| {
                let published = item.pagemap.as_ref().and_then(published_date);
                let source = item.display_link.map(|d| d.trim_start_matches("www.").to_string());
                ArticleRef {
                    title: item.title.unwrap_or_else(|| item.link.clone()),
                    source,
                    published,
                    url: item.link,
                    excerpt: item.snippet.map(|s| s.replace('\n', " ")),
                }
            })
            .collect())
    }
}

fn published_date(pagemap: &ApiPagemap) -> Option<DateTime<Utc>> {
    pagemap.metatags.iter().find_map(|tags| {
        DATE_METATAGS.iter().find_map(|key| {
            tags.get(*key)
                .and_then(|v| v.as_str())
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc))
        })
    })
}

#[async_trait]
impl NewsProvider for GoogleNews {
    async fn search(
        &self,
        entity_name: &str,
        contact_name: Option<&str>,
        range: &DateRange,
        limit: usize,
    ) -> Result<Vec<ArticleRef>, FetchError> {
        if self.api_key.is_none() || self.engine_id.is_none() {
            return Err(FetchError::Unavailable(
                "news search is not configured (api_key, engine_id)".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let mut articles = Vec::new();

        for query in Self::queries(entity_name, contact_name) {
            let mut start = 1;
            while articles.len() < limit && start <= MAX_START {
                let num = (limit - articles.len()).min(PAGE_SIZE);
                let response = self.client.execute(self.request(&query, range, start, num)).await?;
                let page = self.response(response)?;
                let page_len = page.len();

                for article in page {
                    if seen.insert(article.url.clone()) {
                        articles.push(article);
                    }
                }

                if page_len < num {
                    break;
                }
                start += PAGE_SIZE;
            }
        }

        articles.truncate(limit);
        debug!("News search returned {} articles for '{}'", articles.len(), entity_name);
        Ok(articles)
    }
}
