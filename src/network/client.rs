//! HTTP client shared by the collaborator implementations

use crate::access::FetchError;
use crate::config::OutgoingSettings;
use crate::sources::{HttpMethod, RequestBody, SourceRequest, SourceResponse};
use anyhow::Result;
use reqwest::{Client, Response};
use std::collections::HashMap;
use std::time::Duration;

/// Map an HTTP status onto the failure taxonomy; `None` for success
pub fn classify_status(status: u16) -> Option<FetchError> {
    match status {
        200..=399 => None,
        404 | 410 => Some(FetchError::NotFound),
        429 => Some(FetchError::RateExceeded),
        408 | 504 => Some(FetchError::Timeout),
        _ => Some(FetchError::Unavailable(format!("HTTP {}", status))),
    }
}

/// HTTP client wrapper with collaborator-wide configuration
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    default_timeout: Duration,
    user_agent: String,
    extra_headers: HashMap<String, String>,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> Result<Self> {
        Self::with_settings(&OutgoingSettings::default())
    }

    /// Create a new HTTP client with custom settings
    pub fn with_settings(settings: &OutgoingSettings) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs_f64(settings.request_timeout))
            .pool_max_idle_per_host(settings.pool_maxsize)
            .gzip(true)
            .brotli(true);

        if !settings.verify_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(ref proxy_url) = settings.proxies.all {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
        } else {
            if let Some(ref http) = settings.proxies.http {
                builder = builder.proxy(reqwest::Proxy::http(http)?);
            }
            if let Some(ref https) = settings.proxies.https {
                builder = builder.proxy(reqwest::Proxy::https(https)?);
            }
        }

        let client = builder.build()?;

        Ok(Self {
            client,
            default_timeout: Duration::from_secs_f64(settings.request_timeout),
            user_agent: settings.useragent.clone(),
            extra_headers: settings.extra_headers.clone(),
        })
    }

    /// Execute a request; non-success statuses become a [`FetchError`]
    pub async fn execute(&self, request: SourceRequest) -> Result<SourceResponse, FetchError> {
        self.execute_with_timeout(request, self.default_timeout).await
    }

    /// Execute a request with custom timeout
    pub async fn execute_with_timeout(
        &self,
        request: SourceRequest,
        timeout: Duration,
    ) -> Result<SourceResponse, FetchError> {
        let response = self.send(request, timeout).await?;
        if let Some(err) = classify_status(response.status) {
            return Err(err);
        }
        Ok(response)
    }

    /// Execute a request and hand back any status unclassified
    pub async fn send(
        &self,
        request: SourceRequest,
        timeout: Duration,
    ) -> Result<SourceResponse, FetchError> {
        let mut req_builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };

        req_builder = req_builder
            .timeout(timeout)
            .header("User-Agent", &self.user_agent);

        for (key, value) in self.extra_headers.iter().chain(request.headers.iter()) {
            req_builder = req_builder.header(key, value);
        }

        if !request.params.is_empty() {
            req_builder = req_builder.query(&request.params);
        }

        if let Some(body) = request.data {
            req_builder = match body {
                RequestBody::Form(data) => req_builder.form(&data),
                RequestBody::Json(json) => req_builder.json(&json),
            };
        }

        let response = req_builder.send().await?;

        Self::parse_response(response).await
    }

    /// Simple GET request
    pub async fn get(&self, url: &str) -> Result<SourceResponse, FetchError> {
        self.execute(SourceRequest::get(url)).await
    }

    async fn parse_response(response: Response) -> Result<SourceResponse, FetchError> {
        let status = response.status().as_u16();
        let url = response.url().to_string();

        let mut headers = HashMap::new();
        for (key, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(key.to_string(), v.to_string());
            }
        }

        let text = response.text().await?;

        Ok(SourceResponse {
            status,
            headers,
            text,
            url,
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(200), None);
        assert_eq!(classify_status(404), Some(FetchError::NotFound));
        assert_eq!(classify_status(429), Some(FetchError::RateExceeded));
        assert_eq!(classify_status(504), Some(FetchError::Timeout));
        assert!(matches!(classify_status(503), Some(FetchError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_execute_sends_params_and_classifies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "acme"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let response = client
            .execute(SourceRequest::get(format!("{}/search", server.uri())).param("q", "acme"))
            .await
            .unwrap();
        assert_eq!(response.text, "ok");

        let err = client
            .get(&format!("{}/missing", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::NotFound);
    }

    #[tokio::test]
    async fn test_slow_response_is_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client = HttpClient::new().unwrap();
        let err = client
            .execute_with_timeout(SourceRequest::get(server.uri()), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Timeout);
    }
}
