//! Source registry holding the configured collaborators

use super::traits::{Collaborator, ScoringService};
use crate::config::SourceConfig;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of all collaborators of an assessor, in registration order
pub struct SourceRegistry {
    /// Collaborators in registration order; results are merged in this order
    sources: Vec<Arc<dyn Collaborator>>,
    /// Source configurations by name
    configs: HashMap<String, SourceConfig>,
    /// Optional generative scoring service
    scorer: Option<Arc<dyn ScoringService>>,
}

impl SourceRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            configs: HashMap::new(),
            scorer: None,
        }
    }

    /// Register a collaborator; a later registration under the same name replaces it
    pub fn register(&mut self, source: Arc<dyn Collaborator>, config: SourceConfig) {
        let name = source.name().to_string();
        match self.sources.iter().position(|s| s.name() == name) {
            Some(i) => self.sources[i] = source,
            None => self.sources.push(source),
        }
        self.configs.insert(name, config);
    }

    pub fn set_scorer(&mut self, scorer: Arc<dyn ScoringService>) {
        self.scorer = Some(scorer);
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn ScoringService>) -> Self {
        self.set_scorer(scorer);
        self
    }

    pub fn scorer(&self) -> Option<&Arc<dyn ScoringService>> {
        self.scorer.as_ref()
    }

    /// Get a collaborator by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Collaborator>> {
        self.sources.iter().find(|s| s.name() == name)
    }

    pub fn get_config(&self, name: &str) -> Option<&SourceConfig> {
        self.configs.get(name)
    }

    /// All collaborators in registration order
    pub fn all(&self) -> &[Arc<dyn Collaborator>] {
        &self.sources
    }

    pub fn names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
