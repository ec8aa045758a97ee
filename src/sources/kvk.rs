//! KvK (Dutch chamber of commerce) registry implementation
//!
//! Looks companies up by their 8-digit registry number, or by name when no
//! number is known. A 404 means the company is not registered.

use super::traits::*;
use crate::access::FetchError;
use crate::network::HttpClient;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.kvk.nl/api/v1/";

/// Company record as returned by the registry API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCompany {
    kvk_number: String,
    name: String,
    #[serde(default)]
    trade_name: Option<String>,
    #[serde(default)]
    trade_names: Vec<String>,
    #[serde(default)]
    legal_form: Option<String>,
    #[serde(default)]
    foundation_date: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    addresses: Vec<ApiAddress>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiAddress {
    #[serde(default)]
    street: Option<String>,
    #[serde(default)]
    house_number: Option<String>,
    #[serde(default)]
    postal_code: Option<String>,
    #[serde(default)]
    city: Option<String>,
}

/// Either a bare company or `{"company": {...}}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiProfile {
    Wrapped { company: ApiCompany },
    Bare(ApiCompany),
}

#[derive(Debug, Deserialize)]
struct ApiSearch {
    #[serde(default)]
    results: Vec<ApiCompany>,
}

/// KvK registry client
pub struct KvkRegistry {
    client: HttpClient,
    base_url: String,
    api_key: Option<String>,
}

impl KvkRegistry {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        self.base_url = base_url;
        self
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Build the lookup request: by number when `identifier_or_name` is
    /// an 8-digit registry number, by name otherwise
    fn request(&self, identifier_or_name: &str) -> SourceRequest {
        let is_number =
            identifier_or_name.len() == 8 && identifier_or_name.chars().all(|c| c.is_ascii_digit());

        let request = if is_number {
            SourceRequest::get(format!("{}companies/{}", self.base_url, identifier_or_name))
        } else {
            SourceRequest::get(format!("{}search", self.base_url))
                .param("name", identifier_or_name)
                .param("max", "1")
        };

        let request = request.header("Accept", "application/json");
        match self.api_key {
            Some(ref key) => request.header("apikey", key),
            None => request,
        }
    }

    fn response(&self, response: SourceResponse) -> Result<EntityProfile, FetchError> {
        let company = match response.json::<ApiProfile>() {
            Ok(ApiProfile::Wrapped { company }) | Ok(ApiProfile::Bare(company)) => company,
            Err(_) => response
                .json::<ApiSearch>()?
                .results
                .into_iter()
                .next()
                .ok_or(FetchError::NotFound)?,
        };

        Ok(Self::to_profile(company))
    }

    fn to_profile(company: ApiCompany) -> EntityProfile {
        let mut trade_names = company.trade_names;
        if let Some(name) = company.trade_name {
            if !trade_names.contains(&name) {
                trade_names.insert(0, name);
            }
        }

        let address = company.addresses.first().map(|a| {
            let street = [a.street.as_deref(), a.house_number.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
            [Some(street.as_str()), a.postal_code.as_deref(), a.city.as_deref()]
                .into_iter()
                .flatten()
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(", ")
        });

        EntityProfile {
            url: Some(format!(
                "https://www.kvk.nl/zoeken/?source=all&q={}",
                company.kvk_number
            )),
            registry_id: company.kvk_number,
            name: company.name,
            trade_names,
            status: company
                .status
                .map(|s| s.to_lowercase())
                .unwrap_or_else(|| "unknown".to_string()),
            legal_form: company.legal_form,
            registered_on: company.foundation_date.as_deref().and_then(parse_date),
            address,
        }
    }
}

/// Registry dates come as `YYYY-MM-DD` or `YYYYMMDD`
fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    ["%Y-%m-%d", "%Y%m%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text.trim(), fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
}

#[async_trait]
impl RegistryLookup for KvkRegistry {
    async fn lookup(&self, identifier_or_name: &str) -> Result<EntityProfile, FetchError> {
        debug!("KvK lookup for {}", identifier_or_name);
        let response = self.client.execute(self.request(identifier_or_name)).await?;
        self.response(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn registry(server: &MockServer) -> KvkRegistry {
        KvkRegistry::new(HttpClient::new().unwrap())
            .with_base_url(server.uri())
            .with_api_key(Some("test-key".to_string()))
    }

    #[tokio::test]
    async fn test_lookup_by_number() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/companies/27312152"))
            .and(header("apikey", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "company": {
                    "kvkNumber": "27312152",
                    "name": "ASML Holding N.V.",
                    "tradeName": "ASML",
                    "legalForm": "Naamloze Vennootschap",
                    "foundationDate": "1984-04-09",
                    "status": "Active",
                    "addresses": [{"street": "De Run", "houseNumber": "6501", "postalCode": "5504 DR", "city": "Veldhoven"}]
                }
            })))
            .mount(&server)
            .await;

        let profile = registry(&server).lookup("27312152").await.unwrap();
        assert_eq!(profile.name, "ASML Holding N.V.");
        assert_eq!(profile.trade_names, vec!["ASML".to_string()]);
        assert_eq!(profile.status, "active");
        assert_eq!(profile.address.as_deref(), Some("De Run 6501, 5504 DR, Veldhoven"));
        assert!(profile.registered_on.is_some());
    }

    #[tokio::test]
    async fn test_lookup_by_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("name", "Acme B.V."))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [{"kvkNumber": "12345678", "name": "Acme B.V.", "status": "bankrupt"}]
            })))
            .mount(&server)
            .await;

        let profile = registry(&server).lookup("Acme B.V.").await.unwrap();
        assert_eq!(profile.registry_id, "12345678");
        assert_eq!(profile.status, "bankrupt");
    }

    #[tokio::test]
    async fn test_unknown_number_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = registry(&server).lookup("00000000").await.unwrap_err();
        assert_eq!(err, FetchError::NotFound);
    }

    #[tokio::test]
    async fn test_empty_search_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"results": []})))
            .mount(&server)
            .await;

        let err = registry(&server).lookup("Nobody").await.unwrap_err();
        assert_eq!(err, FetchError::NotFound);
    }
}
