//! Rechtspraak.nl open data implementation
//!
//! Searches published Dutch court decisions (Atom feed) and fetches the full
//! decision text by ECLI. The open data service asks for at most one request
//! per second, so every request waits out the interval since the previous one.

use super::traits::*;
use crate::access::FetchError;
use crate::network::HttpClient;
use crate::query::DateRange;
use crate::records::LegalOutcome;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://data.rechtspraak.nl/uitspraken";

/// Longest case text kept from a detail fetch
const MAX_DETAIL_CHARS: usize = 5000;

static ECLI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)ECLI:[A-Z]{2}:[A-Z0-9]{2,}:[0-9]{4}:[A-Z0-9.]+").unwrap());

static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

const CRIMINAL_TERMS: &[&str] = &["strafrecht", "criminal", "verdachte", "strafzaak", "officier van justitie"];

const ADMINISTRATIVE_TERMS: &[&str] = &["bestuursrecht", "administrative", "belastingrecht", "verweerder"];

const ADVERSE_TERMS: &[&str] = &[
    "veroordeelt",
    "veroordeeld",
    "ordered to pay",
    "aansprakelijk",
    "schadevergoeding",
    "faillissement",
    "ontbinding",
];

/// Client for the Rechtspraak open data API
pub struct RechtspraakArchive {
    client: HttpClient,
    base_url: String,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RechtspraakArchive {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            min_interval: Duration::from_secs(1),
            last_request: Mutex::new(None),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    fn search_request(&self, entity_name: &str, range: &DateRange, limit: usize) -> SourceRequest {
        let mut request = SourceRequest::get(format!("{}/zoeken", self.base_url))
            .header("Accept", "application/atom+xml")
            .header("Accept-Language", "nl,en;q=0.5")
            .param("q", entity_name)
            .param("max", limit.clamp(1, 1000).to_string())
            .param("return", "DOC")
            .param("sort", "DESC");

        if let Some(from) = range.from {
            request = request
                .param("date", from.format("%Y-%m-%d").to_string())
                .param("date", range.to.format("%Y-%m-%d").to_string());
        }
        request
    }

    fn detail_request(&self, case_id: &str) -> SourceRequest {
        SourceRequest::get(format!("{}/content", self.base_url))
            .header("Accept", "application/xml")
            .param("id", case_id)
            .param("return", "DOC")
    }

    /// Parse the Atom search feed
    fn search_response(&self, response: SourceResponse) -> Result<Vec<CaseSummary>, FetchError> {
        let xml = response.text;
        if !xml.contains("<feed") {
            return Err(FetchError::parse("expected an Atom feed"));
        }

        let mut cases = Vec::new();
        for entry_str in xml.split("<entry").skip(1) {
            let Some(entry_end) = entry_str.find("</entry>") else {
                debug!("Dropping unterminated Atom entry");
                continue;
            };
            let entry = &entry_str[..entry_end];

            let title = extract_tag(entry, "title").map(|t| clean_text(&t)).unwrap_or_default();
            let id = extract_tag(entry, "id").unwrap_or_default();
            if title.is_empty() && id.is_empty() {
                continue;
            }

            let case_id = ECLI
                .find(&id)
                .or_else(|| ECLI.find(&title))
                .map(|m| m.as_str().to_uppercase());

            let summary = extract_tag(entry, "summary")
                .or_else(|| extract_tag(entry, "content"))
                .map(|s| clean_text(&s))
                .filter(|s| !s.is_empty() && s != "-");

            let issued = extract_tag(entry, "published")
                .or_else(|| extract_tag(entry, "updated"))
                .and_then(|d| parse_date(&d));

            let url = extract_attr(entry, "link", "href").or_else(|| {
                case_id
                    .as_ref()
                    .map(|id| format!("https://uitspraken.rechtspraak.nl/details?id={}", urlencoding::encode(id)))
            });

            let category = extract_attr(entry, "category", "term");

            // titles read "ECLI:NL:RBAMS:2023:123, Rechtbank Amsterdam, 01-02-2023, ..."
            let court = title
                .split(',')
                .nth(1)
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty());

            let outcome = derive_outcome(&format!(
                "{} {} {}",
                category.as_deref().unwrap_or_default(),
                title,
                summary.as_deref().unwrap_or_default()
            ));

            cases.push(CaseSummary {
                case_id,
                title,
                summary,
                issued,
                court,
                category,
                outcome,
                url,
            });
        }

        Ok(cases)
    }

    /// Extract the decision text from a content document
    fn detail_response(&self, response: SourceResponse) -> Result<String, FetchError> {
        let xml = response.text;
        let body = extract_tag(&xml, "uitspraak")
            .or_else(|| extract_tag(&xml, "conclusie"))
            .or_else(|| extract_tag(&xml, "inhoudsindicatie"))
            .ok_or_else(|| FetchError::parse("no decision text in document"))?;

        let text = clean_text(&TAGS.replace_all(&body, " "));
        Ok(text.chars().take(MAX_DETAIL_CHARS).collect())
    }

    /// Wait until the minimum interval since the previous request has passed
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let ready = prev + self.min_interval;
            if ready > Instant::now() {
                tokio::time::sleep_until(ready).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[async_trait]
impl LegalArchive for RechtspraakArchive {
    async fn search(
        &self,
        entity_name: &str,
        range: &DateRange,
        limit: usize,
    ) -> Result<Vec<CaseSummary>, FetchError> {
        self.pace().await;
        let response = self
            .client
            .execute(self.search_request(entity_name, range, limit))
            .await?;
        let cases = self.search_response(response)?;
        debug!("Rechtspraak returned {} cases for '{}'", cases.len(), entity_name);
        Ok(cases)
    }

    async fn fetch_detail(&self, case_id: &str) -> Result<String, FetchError> {
        self.pace().await;
        let response = self.client.execute(self.detail_request(case_id)).await?;
        self.detail_response(response)
    }
}

/// Classify a decision from its area of law and wording
pub fn derive_outcome(text: &str) -> LegalOutcome {
    let text = text.to_lowercase();
    let has = |terms: &[&str]| terms.iter().any(|t| text.contains(t));

    if has(CRIMINAL_TERMS) {
        LegalOutcome::Criminal
    } else if has(ADMINISTRATIVE_TERMS) {
        LegalOutcome::Administrative
    } else if has(ADVERSE_TERMS) {
        LegalOutcome::CivilLoss
    } else {
        LegalOutcome::CivilOther
    }
}

/// Extract text content from an XML tag
fn extract_tag(xml: &str, tag: &str) -> Option<String> {
    let start_tag = format!("<{}", tag);
    let end_tag = format!("</{}>", tag);

    let mut from = 0;
    loop {
        let start = xml[from..].find(&start_tag)? + from;
        let after = xml[start + start_tag.len()..].chars().next()?;
        // skip tags that merely share the prefix, e.g. <titleExtra>
        if after != '>' && after != ' ' && after != '/' {
            from = start + start_tag.len();
            continue;
        }
        let open_end = xml[start..].find('>')? + start;
        if xml[..open_end].ends_with('/') {
            return Some(String::new());
        }
        let content_start = open_end + 1;
        let end = xml[content_start..].find(&end_tag)? + content_start;
        return Some(xml[content_start..end].to_string());
    }
}

/// Extract an attribute of the first `tag` element
fn extract_attr(xml: &str, tag: &str, attr: &str) -> Option<String> {
    let start = xml.find(&format!("<{} ", tag))?;
    let element = &xml[start..start + xml[start..].find('>')?];
    let needle = format!("{}=\"", attr);
    let value_start = element.find(&needle)? + needle.len();
    let value_end = element[value_start..].find('"')? + value_start;
    Some(decode_entities(&element[value_start..value_end]))
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn clean_text(s: &str) -> String {
    let s = s
        .trim()
        .trim_start_matches("<![CDATA[")
        .trim_end_matches("]]>");
    WHITESPACE.replace_all(&decode_entities(s), " ").trim().to_string()
}

/// Feed dates come as RFC 3339, plain dates or Dutch `DD-MM-YYYY`
fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Query;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="text">Rechtspraak.nl - Uitspraken</title>
  <entry>
    <id>ECLI:NL:RBAMS:2024:1234</id>
    <title type="text">ECLI:NL:RBAMS:2024:1234, Rechtbank Amsterdam, 12-03-2024, C/13/700000</title>
    <summary type="text">De rechtbank veroordeelt Acme B.V. tot betaling van schadevergoeding.</summary>
    <updated>2024-03-14T10:00:00Z</updated>
    <link rel="alternate" type="text/html" href="https://uitspraken.rechtspraak.nl/details?id=ECLI:NL:RBAMS:2024:1234"/>
  </entry>
  <entry>
    <id>ECLI:NL:RBROT:2023:99</id>
    <title type="text">ECLI:NL:RBROT:2023:99, Rechtbank Rotterdam, 01-06-2023, 10/123456-22</title>
    <summary type="text">Strafrecht. Verdachte bestuurder van Acme B.V.</summary>
    <updated>2023-06-02T08:00:00Z</updated>
  </entry>
  <entry>
    <id>ECLI:NL:CBB:2022:5</id>
    <title type="text">ECLI:NL:CBB:2022:5, College van Beroep voor het bedrijfsleven, 04-01-2022</title>
    <summary type="text">-</summary>
    <updated>2022-01-05T08:00:00Z</updated>
    <category term="Bestuursrecht"/>
  </entry>
</feed>"#;

    fn archive(server: &MockServer) -> RechtspraakArchive {
        RechtspraakArchive::new(HttpClient::new().unwrap())
            .with_base_url(server.uri())
            .with_min_interval(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_search_parses_feed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zoeken"))
            .and(query_param("q", "Acme B.V."))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
            .mount(&server)
            .await;

        let range = Query::new("Acme B.V.")
            .with_lookback(crate::query::LookbackWindow::All)
            .date_range();
        let cases = archive(&server).search("Acme B.V.", &range, 50).await.unwrap();

        assert_eq!(cases.len(), 3);
        assert_eq!(cases[0].case_id.as_deref(), Some("ECLI:NL:RBAMS:2024:1234"));
        assert_eq!(cases[0].court.as_deref(), Some("Rechtbank Amsterdam"));
        assert_eq!(cases[0].outcome, LegalOutcome::CivilLoss);
        assert!(cases[0].url.as_deref().unwrap().contains("details?id="));
        assert_eq!(cases[1].outcome, LegalOutcome::Criminal);
        assert!(cases[1].url.is_some());
        assert_eq!(cases[2].outcome, LegalOutcome::Administrative);
        assert!(cases[2].summary.is_none());
    }

    #[tokio::test]
    async fn test_fetch_detail_strips_markup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/content"))
            .and(query_param("id", "ECLI:NL:RBAMS:2024:1234"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<open-rechtspraak><uitspraak id=\"x\"><para>De rechtbank</para>\n<para>wijst de vordering toe.</para></uitspraak></open-rechtspraak>",
            ))
            .mount(&server)
            .await;

        let text = archive(&server)
            .fetch_detail("ECLI:NL:RBAMS:2024:1234")
            .await
            .unwrap();
        assert_eq!(text, "De rechtbank wijst de vordering toe.");
    }

    #[tokio::test]
    async fn test_non_feed_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let range = Query::new("Acme").date_range();
        let err = archive(&server).search("Acme", &range, 10).await.unwrap_err();
        assert!(matches!(err, FetchError::ParseError(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_are_paced() {
        let archive = RechtspraakArchive::new(HttpClient::new().unwrap());
        let start = Instant::now();
        archive.pace().await;
        archive.pace().await;
        archive.pace().await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[test]
    fn test_derive_outcome() {
        assert_eq!(derive_outcome("Strafrecht; verdachte"), LegalOutcome::Criminal);
        assert_eq!(derive_outcome("Bestuursrecht"), LegalOutcome::Administrative);
        assert_eq!(derive_outcome("Civiel recht. Gedaagde wordt veroordeeld"), LegalOutcome::CivilLoss);
        assert_eq!(derive_outcome("Civiel recht. Vordering afgewezen"), LegalOutcome::CivilOther);
    }
}
