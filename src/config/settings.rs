//! Settings structures for Diligence-RS configuration

use crate::access::RetryPolicy;
use crate::limiter::RateLimit;
use crate::matcher::MatcherConfig;
use crate::query::SearchDepth;
use crate::records::SourceCategory;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Main settings structure, read from settings.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub server: ServerSettings,
    pub outgoing: OutgoingSettings,
    pub cache: CacheSettings,
    pub assessment: AssessmentSettings,
    pub sources: Vec<SourceConfig>,
    pub scoring: ScoringConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            general: GeneralSettings::default(),
            server: ServerSettings::default(),
            outgoing: OutgoingSettings::default(),
            cache: CacheSettings::default(),
            assessment: AssessmentSettings::default(),
            sources: default_sources(),
            scoring: ScoringConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(content)?;
        Ok(settings)
    }

    /// Merge with environment variables (DILIGENCE_* prefix)
    pub fn merge_env(&mut self) {
        self.merge_vars(|key| std::env::var(key).ok());
    }

    fn merge_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("DILIGENCE_DEBUG") {
            self.general.debug = val.parse().unwrap_or(false);
        }
        if let Some(val) = var("DILIGENCE_LOG_LEVEL") {
            self.general.log_level = val;
        }
        if let Some(port) = var("DILIGENCE_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Some(val) = var("DILIGENCE_BIND_ADDRESS") {
            self.server.bind_address = val;
        }

        for source in &mut self.sources {
            let prefix = format!("DILIGENCE_{}", source.name.to_uppercase().replace([' ', '-'], "_"));
            if let Some(key) = var(&format!("{}_API_KEY", prefix)) {
                source.api_key = Some(key);
            }
            if let Some(url) = var(&format!("{}_BASE_URL", prefix)) {
                source.base_url = Some(url);
            }
        }

        if let Some(key) = var("DILIGENCE_SCORING_API_KEY") {
            self.scoring.api_key = Some(key);
        }
        if let Some(url) = var("DILIGENCE_SCORING_BASE_URL") {
            self.scoring.base_url = Some(url);
        }
    }

    /// Get source config by name
    pub fn get_source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Get all enabled sources
    pub fn enabled_sources(&self) -> Vec<&SourceConfig> {
        self.sources.iter().filter(|s| !s.disabled).collect()
    }
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Enable debug mode
    pub debug: bool,
    /// Instance name reported by /health
    pub instance_name: String,
    /// Default tracing filter; `RUST_LOG` takes precedence
    pub log_level: String,
    /// Enable metrics collection
    pub enable_metrics: bool,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            debug: false,
            instance_name: "Diligence".to_string(),
            log_level: "info".to_string(),
            enable_metrics: true,
        }
    }
}

/// Server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub port: u16,
    pub bind_address: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_address: "127.0.0.1".to_string(),
        }
    }
}

/// Outgoing request settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutgoingSettings {
    /// Default request timeout in seconds
    pub request_timeout: f64,
    /// Pool max size
    pub pool_maxsize: usize,
    /// User agent sent to every collaborator
    pub useragent: String,
    /// Verify SSL certificates
    pub verify_ssl: bool,
    pub proxies: ProxySettings,
    /// Extra headers to send
    pub extra_headers: HashMap<String, String>,
}

impl Default for OutgoingSettings {
    fn default() -> Self {
        Self {
            request_timeout: 20.0,
            pool_maxsize: 20,
            useragent: format!("diligence-rs/{}", env!("CARGO_PKG_VERSION")),
            verify_ssl: true,
            proxies: ProxySettings::default(),
            extra_headers: HashMap::new(),
        }
    }
}

/// Proxy settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    pub http: Option<String>,
    pub https: Option<String>,
    pub all: Option<String>,
}

/// Result cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub max_entries: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self { max_entries: 10_000 }
    }
}

/// Deadlines, retry and scoring knobs of a single assessment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessmentSettings {
    /// Global deadline per depth, in milliseconds
    pub simple_deadline_ms: u64,
    pub standard_deadline_ms: u64,
    pub deep_deadline_ms: u64,
    /// Share of the global deadline a single collaborator may use
    pub source_budget_fraction: f64,
    /// Slack allowed past the global deadline for teardown
    pub grace_ms: u64,
    pub retry: RetryPolicy,
    pub matcher: MatcherConfig,
    /// Legal cases enriched with their full text
    pub legal_detail_limit: usize,
    /// Records listed as evidence per category
    pub evidence_limit: usize,
}

impl Default for AssessmentSettings {
    fn default() -> Self {
        Self {
            simple_deadline_ms: 15_000,
            standard_deadline_ms: 30_000,
            deep_deadline_ms: 60_000,
            source_budget_fraction: 0.75,
            grace_ms: 500,
            retry: RetryPolicy::default(),
            matcher: MatcherConfig::default(),
            legal_detail_limit: 5,
            evidence_limit: 5,
        }
    }
}

impl AssessmentSettings {
    /// Global deadline for a search depth
    pub fn deadline(&self, depth: SearchDepth) -> Duration {
        Duration::from_millis(match depth {
            SearchDepth::Simple => self.simple_deadline_ms,
            SearchDepth::Standard => self.standard_deadline_ms,
            SearchDepth::Deep => self.deep_deadline_ms,
        })
    }

    /// Budget of one collaborator under a global deadline
    pub fn source_budget(&self, deadline: Duration) -> Duration {
        deadline.mul_f64(self.source_budget_fraction.clamp(0.0, 1.0))
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

/// Individual collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Source name (unique identifier, rate-limit and cache namespace)
    pub name: String,
    /// Implementation to use: `kvk`, `rechtspraak`, `google_news`, `crawler`
    pub engine: String,
    pub kind: SourceCategory,
    /// Whether source is disabled
    pub disabled: bool,
    /// Mandatory sources are never skipped
    pub mandatory: bool,
    pub base_url: Option<String>,
    /// API key if required
    pub api_key: Option<String>,
    pub rate_limit: RateLimit,
    /// Cache lifetime in seconds
    pub cache_ttl: u64,
    /// Custom timeout for this source, in seconds
    pub timeout: Option<f64>,
    /// Additional source-specific settings
    #[serde(flatten)]
    pub extra: HashMap<String, serde_yaml::Value>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            engine: String::new(),
            kind: SourceCategory::News,
            disabled: false,
            mandatory: false,
            base_url: None,
            api_key: None,
            rate_limit: RateLimit::per_second(1),
            cache_ttl: 3600,
            timeout: None,
            extra: HashMap::new(),
        }
    }
}

impl SourceConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs_f64)
    }

    /// String value of a source-specific setting
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|v| v.as_str())
    }
}

/// Generative scoring service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub enabled: bool,
    pub engine: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    pub rate_limit: RateLimit,
    /// Per-call timeout in seconds
    pub timeout: f64,
    /// Longest text sent for scoring, in characters
    pub max_chars: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            engine: "openai".to_string(),
            base_url: None,
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            rate_limit: RateLimit::per_second(3),
            timeout: 15.0,
            max_chars: 4000,
        }
    }
}

/// Default collaborator configurations
fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig {
            name: "kvk".to_string(),
            engine: "kvk".to_string(),
            kind: SourceCategory::Registry,
            rate_limit: RateLimit {
                capacity: 5,
                refill_every_ms: 1000,
                max_wait_ms: 2000,
            },
            cache_ttl: 3600,
            ..Default::default()
        },
        SourceConfig {
            name: "rechtspraak".to_string(),
            engine: "rechtspraak".to_string(),
            kind: SourceCategory::Legal,
            mandatory: true,
            rate_limit: RateLimit::per_second(1).with_max_wait(Duration::from_secs(5)),
            cache_ttl: 7200,
            ..Default::default()
        },
        SourceConfig {
            name: "news".to_string(),
            engine: "google_news".to_string(),
            kind: SourceCategory::News,
            rate_limit: RateLimit::per_second(5),
            cache_ttl: 1800,
            ..Default::default()
        },
        SourceConfig {
            name: "web".to_string(),
            engine: "crawler".to_string(),
            kind: SourceCategory::Web,
            rate_limit: RateLimit::per_second(1),
            cache_ttl: 3600,
            ..Default::default()
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8080);
        assert!(!settings.general.debug);
        assert_eq!(settings.sources.len(), 4);

        let legal = settings.get_source("rechtspraak").unwrap();
        assert!(legal.mandatory);
        assert_eq!(legal.cache_ttl(), Duration::from_secs(7200));
        assert_eq!(settings.get_source("news").unwrap().cache_ttl, 1800);
    }

    #[test]
    fn test_deadlines() {
        let assessment = AssessmentSettings::default();
        assert_eq!(assessment.deadline(SearchDepth::Simple), Duration::from_secs(15));
        assert_eq!(assessment.deadline(SearchDepth::Deep), Duration::from_secs(60));
        assert_eq!(
            assessment.source_budget(Duration::from_secs(30)),
            Duration::from_millis(22_500)
        );
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
server:
  port: 9000
assessment:
  matcher:
    threshold: 0.7
sources:
  - name: news
    engine: google_news
    kind: news
    engine_id: abc123
    rate_limit:
      capacity: 2
"#;
        let settings = Settings::from_yaml(yaml).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.bind_address, "127.0.0.1");
        assert_eq!(settings.assessment.matcher.threshold, 0.7);
        assert_eq!(settings.assessment.matcher.frequency_penalty, 0.2);

        let news = settings.get_source("news").unwrap();
        assert_eq!(news.extra_str("engine_id"), Some("abc123"));
        assert_eq!(news.rate_limit.capacity, 2);
        assert_eq!(news.rate_limit.max_wait_ms, 2000);
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = Settings::default();
        let vars: HashMap<&str, &str> = [
            ("DILIGENCE_PORT", "9999"),
            ("DILIGENCE_KVK_API_KEY", "secret"),
            ("DILIGENCE_SCORING_API_KEY", "sk-test"),
        ]
        .into_iter()
        .collect();
        settings.merge_vars(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(settings.server.port, 9999);
        assert_eq!(settings.get_source("kvk").unwrap().api_key.as_deref(), Some("secret"));
        assert_eq!(settings.scoring.api_key.as_deref(), Some("sk-test"));
    }
}
