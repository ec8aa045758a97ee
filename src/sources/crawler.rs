//! Website crawler
//!
//! Breadth-first crawl from a seed URL. Honours robots.txt (including
//! Crawl-delay) and strips navigation, scripts and other boilerplate
//! before handing the page text back.

use super::traits::*;
use crate::access::FetchError;
use crate::network::{HttpClient, RobotsRules};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Elements whose text never counts as page content
const BOILERPLATE: &[&str] = &[
    "nav", "header", "footer", "script", "style", "noscript", "aside", "form", "iframe", "svg",
];

/// Cap on text kept per page
const MAX_PAGE_CHARS: usize = 20_000;

/// A parsed page before it becomes a [`PageDocument`]
struct ParsedPage {
    title: Option<String>,
    text: String,
    links: Vec<Url>,
}

/// Same-site breadth-first crawler
pub struct WebCrawler {
    client: HttpClient,
    page_timeout: Duration,
}

impl WebCrawler {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            page_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_page_timeout(mut self, page_timeout: Duration) -> Self {
        self.page_timeout = page_timeout;
        self
    }

    /// Fetch and parse robots.txt for the origin of `url`; anything but a
    /// successful response allows everything
    async fn robots(&self, url: &Url) -> RobotsRules {
        let robots_url = match url.join("/robots.txt") {
            Ok(u) => u,
            Err(_) => return RobotsRules::allow_all(),
        };

        match self
            .client
            .send(SourceRequest::get(robots_url.as_str()), self.page_timeout)
            .await
        {
            Ok(response) if response.is_success() => {
                RobotsRules::parse(&response.text, self.client.user_agent())
            }
            Ok(_) => RobotsRules::allow_all(),
            Err(e) => {
                debug!("robots.txt unavailable for {}: {}", url, e);
                RobotsRules::allow_all()
            }
        }
    }
}

fn origin_key(url: &Url) -> String {
    url.origin().ascii_serialization()
}

fn is_html(response: &SourceResponse) -> bool {
    match response.content_type() {
        Some(ct) => {
            let ct = ct.to_lowercase();
            ct.contains("html") || ct.starts_with("text/")
        }
        None => true,
    }
}

/// Parse a page; kept synchronous since the parsed document is not `Send`
fn parse_page(html: &str, base: &Url) -> ParsedPage {
    let document = Html::parse_document(html);

    let title_selector = Selector::parse("title").unwrap();
    let body_selector = Selector::parse("body").unwrap();
    let link_selector = Selector::parse("a[href]").unwrap();

    let title = document
        .select(&title_selector)
        .next()
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    let root = document
        .select(&body_selector)
        .next()
        .unwrap_or_else(|| document.root_element());

    let mut parts = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let in_boilerplate = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .map_or(false, |e| BOILERPLATE.contains(&e.name()))
        });
        if !in_boilerplate && !text.trim().is_empty() {
            parts.push(text.trim().to_string());
        }
    }
    let mut text = collapse_whitespace(&parts.join(" "));
    if text.chars().count() > MAX_PAGE_CHARS {
        text = text.chars().take(MAX_PAGE_CHARS).collect();
    }

    let links = document
        .select(&link_selector)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .map(|mut u| {
            u.set_fragment(None);
            u
        })
        .collect();

    ParsedPage { title, text, links }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl ContentCrawler for WebCrawler {
    async fn crawl(
        &self,
        seed_url: &str,
        max_depth: u32,
        same_domain_only: bool,
        max_pages: usize,
    ) -> Result<Vec<PageDocument>, FetchError> {
        let mut seed = Url::parse(seed_url.trim())
            .map_err(|e| FetchError::parse(format!("invalid seed url '{}': {}", seed_url, e)))?;
        if !matches!(seed.scheme(), "http" | "https") {
            return Err(FetchError::parse(format!("unsupported seed url '{}'", seed_url)));
        }
        seed.set_fragment(None);

        let mut pages = Vec::new();
        if max_pages == 0 {
            return Ok(pages);
        }

        let mut robots: HashMap<String, RobotsRules> = HashMap::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(Url, u32)> = VecDeque::new();
        visited.insert(seed.to_string());
        queue.push_back((seed.clone(), 0));

        while let Some((url, depth)) = queue.pop_front() {
            if pages.len() >= max_pages {
                break;
            }

            let origin = origin_key(&url);
            if !robots.contains_key(&origin) {
                let rules = self.robots(&url).await;
                robots.insert(origin.clone(), rules);
            }
            let rules = robots.get(&origin).cloned().unwrap_or_default();

            if !rules.is_allowed(url.path()) {
                debug!("robots.txt disallows {}", url);
                continue;
            }
            if !pages.is_empty() {
                if let Some(delay) = rules.crawl_delay() {
                    tokio::time::sleep(delay).await;
                }
            }

            let response = match self
                .client
                .execute_with_timeout(SourceRequest::get(url.as_str()), self.page_timeout)
                .await
            {
                Ok(response) => response,
                // the seed decides whether the site is reachable at all
                Err(e) if depth == 0 => return Err(e),
                Err(e) => {
                    warn!("Skipping {}: {}", url, e);
                    continue;
                }
            };

            if !is_html(&response) {
                continue;
            }

            let parsed = parse_page(&response.text, &url);

            if depth < max_depth {
                for link in parsed.links {
                    if same_domain_only && link.host_str() != seed.host_str() {
                        continue;
                    }
                    if visited.insert(link.to_string()) {
                        queue.push_back((link, depth + 1));
                    }
                }
            }

            if !parsed.text.is_empty() {
                pages.push(PageDocument {
                    url: url.to_string(),
                    title: parsed.title,
                    text: parsed.text,
                    depth,
                });
            }
        }

        debug!("Crawled {} pages from {}", pages.len(), seed);
        Ok(pages)
    }
}
