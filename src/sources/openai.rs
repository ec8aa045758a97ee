//! OpenAI-compatible chat completion scorer
//!
//! Asks the model for a JSON object with sentiment, relevance and key
//! phrases of a text about a named entity.

use super::traits::*;
use crate::access::FetchError;
use crate::network::HttpClient;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const MAX_KEY_PHRASES: usize = 5;

const SYSTEM_PROMPT: &str = "You assess texts about companies for counterparty risk. \
Answer with a JSON object: {\"sentiment\": number between -1 (very negative) and 1 (very positive) \
describing how the text reflects on the entity, \"relevance\": number between 0 and 1 describing \
how much the text is about the entity, \"key_phrases\": up to 5 short phrases}.";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Scoring through an OpenAI-compatible `/chat/completions` endpoint
pub struct OpenAiScorer {
    client: HttpClient,
    base_url: String,
    api_key: Option<String>,
    model: String,
    max_chars: usize,
    timeout: Duration,
}

impl OpenAiScorer {
    pub fn new(client: HttpClient, model: impl Into<String>) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: model.into(),
            max_chars: 4000,
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn request(&self, text: &str, entity_name: &str) -> SourceRequest {
        let text: String = text.chars().take(self.max_chars).collect();

        let request = SourceRequest::post(format!("{}/chat/completions", self.base_url)).json(
            serde_json::json!({
                "model": self.model,
                "temperature": 0,
                "response_format": {"type": "json_object"},
                "messages": [
                    {"role": "system", "content": SYSTEM_PROMPT},
                    {"role": "user", "content": format!("Entity: {}\n\nText:\n{}", entity_name, text)}
                ]
            }),
        );

        match self.api_key {
            Some(ref key) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }

    fn response(&self, response: SourceResponse) -> Result<TextScore, FetchError> {
        let chat: ChatResponse = response.json()?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| FetchError::parse("scoring response has no content"))?;

        let score: TextScore = serde_json::from_str(strip_code_fence(&content))?;
        Ok(sanitize(score))
    }
}

/// Some models wrap JSON in a markdown fence despite the response format
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

fn sanitize(mut score: TextScore) -> TextScore {
    let finite_or = |v: f64, fallback: f64| if v.is_finite() { v } else { fallback };
    score.sentiment = finite_or(score.sentiment, 0.0).clamp(-1.0, 1.0);
    score.relevance = finite_or(score.relevance, 0.0).clamp(0.0, 1.0);
    score.key_phrases.retain(|p| !p.trim().is_empty());
    score.key_phrases.truncate(MAX_KEY_PHRASES);
    score
}

#[async_trait]
impl ScoringService for OpenAiScorer {
    async fn score(&self, text: &str, entity_name: &str) -> Result<TextScore, FetchError> {
        if self.api_key.is_none() {
            return Err(FetchError::Unavailable("scoring service has no api_key".to_string()));
        }
        debug!("Scoring {} chars for '{}'", text.len().min(self.max_chars), entity_name);
        let response = self
            .client
            .execute_with_timeout(self.request(text, entity_name), self.timeout)
            .await?;
        self.response(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
        })
    }

    fn scorer(server: &MockServer) -> OpenAiScorer {
        OpenAiScorer::new(HttpClient::new().unwrap(), "test-model")
            .with_base_url(server.uri())
            .with_api_key(Some("sk-test".to_string()))
    }

    #[tokio::test]
    async fn test_score_is_parsed_and_clamped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                r#"{"sentiment": -1.7, "relevance": 0.9, "key_phrases": ["faillissement", "", "schuldeisers"]}"#,
            )))
            .mount(&server)
            .await;

        let score = scorer(&server).score("Acme failliet verklaard", "Acme").await.unwrap();
        assert_eq!(score.sentiment, -1.0);
        assert_eq!(score.relevance, 0.9);
        assert_eq!(score.key_phrases, vec!["faillissement", "schuldeisers"]);
    }

    #[tokio::test]
    async fn test_fenced_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                "```json\n{\"sentiment\": 0.4, \"relevance\": 0.5}\n```",
            )))
            .mount(&server)
            .await;

        let score = scorer(&server).score("text", "Acme").await.unwrap();
        assert_eq!(score.sentiment, 0.4);
        assert!(score.key_phrases.is_empty());
    }

    #[tokio::test]
    async fn test_garbage_content_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("I cannot help with that")))
            .mount(&server)
            .await;

        let err = scorer(&server).score("text", "Acme").await.unwrap_err();
        assert!(matches!(err, FetchError::ParseError(_)));
    }

    #[tokio::test]
    async fn test_without_key_is_unavailable() {
        let scorer = OpenAiScorer::new(HttpClient::new().unwrap(), "m");
        let err = scorer.score("text", "Acme").await.unwrap_err();
        assert!(matches!(err, FetchError::Unavailable(_)));
    }
}
