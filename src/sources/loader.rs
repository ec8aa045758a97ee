//! Source loader for initializing collaborators from configuration

use super::adapters::{LegalSource, NewsSource, RegistrySource, SourceMeta, WebSource};
use super::registry::SourceRegistry;
use super::traits::{Collaborator, ScoringService};
use super::{crawler, google_news, kvk, openai, rechtspraak, SCORING_SOURCE};
use crate::config::{ScoringConfig, Settings, SourceConfig};
use crate::limiter::RateLimit;
use crate::network::HttpClient;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Loader for initializing collaborators from configuration
pub struct SourceLoader;

impl SourceLoader {
    /// Load all enabled sources and the scoring service from settings
    pub fn load(settings: &Settings, client: &HttpClient) -> Result<SourceRegistry> {
        let mut registry = SourceRegistry::new();

        for config in &settings.sources {
            if config.disabled {
                info!("Skipping disabled source: {}", config.name);
                continue;
            }

            match Self::create_source(config, settings, client) {
                Ok(source) => {
                    info!("Loaded source: {} ({})", config.name, config.engine);
                    registry.register(source, config.clone());
                }
                Err(e) => {
                    warn!("Failed to load source {}: {}", config.name, e);
                }
            }
        }

        if settings.scoring.enabled {
            match Self::create_scorer(&settings.scoring, client) {
                Ok(scorer) => {
                    info!("Loaded scoring service: {}", settings.scoring.engine);
                    registry.set_scorer(scorer);
                }
                Err(e) => warn!("Failed to load scoring service: {}", e),
            }
        }

        info!("Loaded {} sources", registry.len());
        Ok(registry)
    }

    /// Rate limits of every configured collaborator, keyed by name
    pub fn rate_limits(settings: &Settings) -> Vec<(String, RateLimit)> {
        let mut limits: Vec<(String, RateLimit)> = settings
            .enabled_sources()
            .into_iter()
            .map(|c| (c.name.clone(), c.rate_limit))
            .collect();
        limits.push((SCORING_SOURCE.to_string(), settings.scoring.rate_limit));
        limits
    }

    /// Create a collaborator instance by engine type
    fn create_source(
        config: &SourceConfig,
        settings: &Settings,
        client: &HttpClient,
    ) -> Result<Arc<dyn Collaborator>> {
        let default_timeout = Duration::from_secs_f64(settings.outgoing.request_timeout);
        let meta = SourceMeta::from_config(config, default_timeout);

        let source: Arc<dyn Collaborator> = match config.engine.as_str() {
            "kvk" => {
                let mut registry = kvk::KvkRegistry::new(client.clone()).with_api_key(config.api_key.clone());
                if let Some(ref url) = config.base_url {
                    registry = registry.with_base_url(url);
                }
                Arc::new(RegistrySource::new(meta, Arc::new(registry)))
            }
            "rechtspraak" => {
                let mut archive = rechtspraak::RechtspraakArchive::new(client.clone());
                if let Some(ref url) = config.base_url {
                    archive = archive.with_base_url(url);
                }
                if let Some(ms) = config.extra.get("min_interval_ms").and_then(|v| v.as_u64()) {
                    archive = archive.with_min_interval(Duration::from_millis(ms));
                }
                Arc::new(
                    LegalSource::new(meta, Arc::new(archive))
                        .with_detail_limit(settings.assessment.legal_detail_limit),
                )
            }
            "google_news" => {
                let mut news = google_news::GoogleNews::new(client.clone()).with_credentials(
                    config.api_key.clone(),
                    config.extra_str("engine_id").map(String::from),
                );
                if let Some(ref url) = config.base_url {
                    news = news.with_base_url(url);
                }
                Arc::new(NewsSource::new(meta, Arc::new(news)))
            }
            "crawler" => {
                let crawler = crawler::WebCrawler::new(client.clone())
                    .with_page_timeout(meta.timeout.min(Duration::from_secs(10)));
                Arc::new(WebSource::new(meta, Arc::new(crawler)))
            }
            _ => {
                return Err(anyhow::anyhow!("Unknown source engine: {}", config.engine));
            }
        };

        if source.kind() != config.kind {
            warn!(
                "Source {} is configured as {} but {} produces {} records",
                config.name,
                config.kind.as_str(),
                config.engine,
                source.kind().as_str()
            );
        }

        Ok(source)
    }

    /// Create the scoring service by engine type
    fn create_scorer(config: &ScoringConfig, client: &HttpClient) -> Result<Arc<dyn ScoringService>> {
        match config.engine.as_str() {
            "openai" => {
                let mut scorer = openai::OpenAiScorer::new(client.clone(), config.model.clone())
                    .with_api_key(config.api_key.clone())
                    .with_max_chars(config.max_chars)
                    .with_timeout(Duration::from_secs_f64(config.timeout));
                if let Some(ref url) = config.base_url {
                    scorer = scorer.with_base_url(url);
                }
                Ok(Arc::new(scorer))
            }
            other => Err(anyhow::anyhow!("Unknown scoring engine: {}", other)),
        }
    }

    /// Get list of available source engine types
    pub fn available_engines() -> Vec<&'static str> {
        vec!["kvk", "rechtspraak", "google_news", "crawler"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::SourceCategory;

    #[test]
    fn test_load_default_sources() {
        let settings = Settings::default();
        let registry = SourceLoader::load(&settings, &HttpClient::new().unwrap()).unwrap();

        assert_eq!(registry.names(), vec!["kvk", "rechtspraak", "news", "web"]);
        let legal = registry.get("rechtspraak").unwrap();
        assert!(legal.mandatory());
        assert_eq!(legal.kind(), SourceCategory::Legal);
        assert_eq!(legal.cache_ttl(), Duration::from_secs(7200));
        assert!(registry.scorer().is_some());
    }

    #[test]
    fn test_unknown_and_disabled_sources_are_skipped() {
        let mut settings = Settings::default();
        settings.sources[2].disabled = true;
        settings.sources.push(SourceConfig {
            name: "mystery".to_string(),
            engine: "mystery".to_string(),
            ..Default::default()
        });
        settings.scoring.enabled = false;

        let registry = SourceLoader::load(&settings, &HttpClient::new().unwrap()).unwrap();
        assert_eq!(registry.names(), vec!["kvk", "rechtspraak", "web"]);
        assert!(registry.scorer().is_none());

        let limits = SourceLoader::rate_limits(&settings);
        assert!(limits.iter().any(|(name, _)| name == SCORING_SOURCE));
        assert!(!limits.iter().any(|(name, _)| name == "news"));
        let legal = limits.iter().find(|(name, _)| name == "rechtspraak").unwrap();
        assert_eq!(legal.1.max_wait_ms, 5000);
    }
}
