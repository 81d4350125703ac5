//! Configuration system for Delve.
//!
//! Uses `figment` for layered configuration: defaults -> config file ->
//! environment. Configuration is loaded from `delve.toml` in the working
//! directory and `DELVE_*` environment variables.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Top-level configuration for the Delve engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DelveConfig {
    pub research: ResearchConfig,
    pub breaker: BreakerConfig,
    pub search: SearchConfig,
}

impl DelveConfig {
    /// Load configuration with figment layering: defaults -> optional TOML
    /// file -> `DELVE_*` environment variables.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(DelveConfig::default()));

        match config_path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::FileNotFound {
                        path: path.to_path_buf(),
                    });
                }
                figment = figment.merge(Toml::file(path));
            }
            None => {
                figment = figment.merge(Toml::file("delve.toml"));
            }
        }

        let config: DelveConfig = figment
            .merge(Env::prefixed("DELVE_").split("__"))
            .extract()
            .map_err(|e| ConfigError::ParseError {
                message: e.to_string(),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.research.max_iterations == 0 {
            return Err(ConfigError::Invalid {
                message: "research.max_iterations must be at least 1".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.research.min_completion_score) {
            return Err(ConfigError::Invalid {
                message: "research.min_completion_score must be within [0.0, 1.0]".into(),
            });
        }
        if self.research.max_concurrent_queries == 0 {
            return Err(ConfigError::Invalid {
                message: "research.max_concurrent_queries must be at least 1".into(),
            });
        }
        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid {
                message: "breaker.failure_threshold must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Configuration for the research loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Maximum loop passes before the session is forced to terminate.
    pub max_iterations: usize,
    /// Completion score at which the session stops successfully.
    pub min_completion_score: f64,
    /// Maximum external calls (planner + searches + writer) per session.
    pub call_budget: usize,
    /// Upper bound on concurrently executing search queries.
    pub max_concurrent_queries: usize,
    /// Topic areas the evaluator scores coverage against.
    #[serde(default = "default_coverage_areas")]
    pub coverage_areas: Vec<String>,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            min_completion_score: 0.75,
            call_budget: 100,
            max_concurrent_queries: 4,
            coverage_areas: default_coverage_areas(),
        }
    }
}

fn default_coverage_areas() -> Vec<String> {
    vec![
        "overview".to_string(),
        "recent developments".to_string(),
        "expert analysis".to_string(),
        "data and statistics".to_string(),
    ]
}

/// Configuration for the per-provider circuit breakers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: usize,
    /// Seconds before an open breaker admits a recovery probe.
    pub recovery_timeout_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 30,
        }
    }
}

/// Configuration for the built-in web search provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum results requested per query.
    pub max_results: usize,
    /// Per-request transport timeout in seconds.
    pub timeout_secs: u64,
    /// User agent sent with search requests.
    pub user_agent: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: 5,
            timeout_secs: 15,
            user_agent: "Delve/0.1".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DelveConfig::default();
        assert_eq!(config.research.max_iterations, 3);
        assert!((config.research.min_completion_score - 0.75).abs() < f64::EPSILON);
        assert_eq!(config.research.call_budget, 100);
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.research.coverage_areas.len(), 4);
    }

    #[test]
    fn test_validate_rejects_zero_iterations() {
        let mut config = DelveConfig::default();
        config.research.max_iterations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_score() {
        let mut config = DelveConfig::default();
        config.research.min_completion_score = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let result = DelveConfig::load(Some(Path::new("/nonexistent/delve.toml")));
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }
}
