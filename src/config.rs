//! Engine configuration
//!
//! All tuning knobs recognized by the engine. The confidence and
//! similarity defaults were tuned empirically in the source system and
//! are starting points, not contracts; hosts override them per store.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Configuration for the knowledge graph and search engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum confidence for an extracted tag candidate to be kept
    pub min_tag_confidence: f64,
    /// Confidence assigned to bare-keyword tag candidates
    pub bare_keyword_confidence: f64,
    /// Maximum number of search suggestions returned
    pub max_suggestions: usize,
    /// Bound on store waits; surfaced as `StoreTimeout` on expiry
    pub search_timeout_ms: u64,
    /// Maximum snippet length in characters
    pub snippet_length: usize,
    /// Apply Porter stemming when tokenizing for matching
    pub stemming: bool,
    /// Minimum trigram similarity for `similar_tags` results
    pub similarity_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_tag_confidence: 0.6,
            bare_keyword_confidence: 0.5,
            max_suggestions: 10,
            search_timeout_ms: 5000,
            snippet_length: 160,
            stemming: true,
            similarity_threshold: 0.3,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| EngineError::Other(format!("failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.min_tag_confidence, 0.6);
        assert_eq!(config.max_suggestions, 10);
        assert_eq!(config.search_timeout_ms, 5000);
        assert_eq!(config.snippet_length, 160);
        assert!(config.stemming);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = EngineConfig {
            min_tag_confidence: 0.4,
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: EngineConfig = toml::from_str("max_suggestions = 5").unwrap();
        assert_eq!(config.max_suggestions, 5);
        assert_eq!(config.snippet_length, 160);
    }
}
