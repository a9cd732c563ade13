//! Configuration management
//!
//! This module handles loading and parsing configuration for ScholarFeed.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};

use crate::models::MAX_PAGE_SIZE;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Feed ranking configuration
    #[serde(default)]
    pub feed: FeedConfig,
    /// Notification inbox configuration
    #[serde(default)]
    pub notifications: NotificationConfig,
    /// Session configuration
    #[serde(default)]
    pub session: SessionConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (for cookie-based auth)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/scholarfeed.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Feed ranking configuration.
///
/// The weights multiply the individual score components; see
/// `services::feed::FeedRanker` for how they are combined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default)]
    pub weights: FeedWeights,
    /// Age at which the recency component has dropped to one half
    #[serde(default = "default_half_life_hours")]
    pub recency_half_life_hours: f64,
    /// Soft limit for the scoring pass; exceeded means date-only ordering
    #[serde(default = "default_scoring_budget_ms")]
    pub scoring_budget_ms: u64,
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            weights: FeedWeights::default(),
            recency_half_life_hours: default_half_life_hours(),
            scoring_budget_ms: default_scoring_budget_ms(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

fn default_half_life_hours() -> f64 {
    48.0
}

fn default_scoring_budget_ms() -> u64 {
    250
}

fn default_page_size() -> u32 {
    10
}

fn default_max_page_size() -> u32 {
    MAX_PAGE_SIZE
}

/// Score component weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeedWeights {
    #[serde(default = "default_w_recency")]
    pub recency: f64,
    #[serde(default = "default_w_follow")]
    pub follow: f64,
    #[serde(default = "default_w_topic")]
    pub topic: f64,
    #[serde(default = "default_w_engagement")]
    pub engagement: f64,
    #[serde(default = "default_w_rating")]
    pub rating: f64,
}

impl Default for FeedWeights {
    fn default() -> Self {
        Self {
            recency: default_w_recency(),
            follow: default_w_follow(),
            topic: default_w_topic(),
            engagement: default_w_engagement(),
            rating: default_w_rating(),
        }
    }
}

fn default_w_recency() -> f64 {
    0.30
}

fn default_w_follow() -> f64 {
    0.20
}

fn default_w_topic() -> f64 {
    0.15
}

fn default_w_engagement() -> f64 {
    0.10
}

fn default_w_rating() -> f64 {
    0.05
}

/// Notification inbox configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Maximum number of notifications returned by the inbox listing
    #[serde(default = "default_list_limit")]
    pub list_limit: u32,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            list_limit: default_list_limit(),
        }
    }
}

fn default_list_limit() -> u32 {
    50
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session lifetime in hours
    #[serde(default = "default_session_ttl_hours")]
    pub ttl_hours: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_session_ttl_hours(),
        }
    }
}

fn default_session_ttl_hours() -> i64 {
    24 * 7
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - SCHOLARFEED_SERVER_HOST
    /// - SCHOLARFEED_SERVER_PORT
    /// - SCHOLARFEED_SERVER_CORS_ORIGIN
    /// - SCHOLARFEED_DATABASE_DRIVER
    /// - SCHOLARFEED_DATABASE_URL
    /// - SCHOLARFEED_FEED_HALF_LIFE_HOURS
    /// - SCHOLARFEED_FEED_SCORING_BUDGET_MS
    /// - SCHOLARFEED_NOTIFICATIONS_LIST_LIMIT
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values the feed ranker cannot work with
    fn validate(&self) -> Result<(), ConfigError> {
        let feed = &self.feed;
        let half_life = feed.recency_half_life_hours;
        if !half_life.is_finite() || half_life <= 0.0 {
            return Err(ConfigError::ValidationError(
                "feed.recency_half_life_hours must be positive".to_string(),
            ));
        }
        if feed.max_page_size == 0 || feed.max_page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::ValidationError(format!(
                "feed.max_page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        if feed.default_page_size == 0 || feed.default_page_size > feed.max_page_size {
            return Err(ConfigError::ValidationError(format!(
                "feed.default_page_size must be between 1 and {}",
                feed.max_page_size
            )));
        }
        let w = &feed.weights;
        let weights = [w.recency, w.follow, w.topic, w.engagement, w.rating];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::ValidationError(
                "feed weights must be finite and non-negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        // Server configuration
        if let Ok(host) = std::env::var("SCHOLARFEED_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("SCHOLARFEED_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("SCHOLARFEED_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        // Database configuration
        if let Ok(driver) = std::env::var("SCHOLARFEED_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("SCHOLARFEED_DATABASE_URL") {
            self.database.url = url;
        }

        // Feed configuration
        if let Ok(hours) = std::env::var("SCHOLARFEED_FEED_HALF_LIFE_HOURS") {
            if let Ok(hours) = hours.parse::<f64>() {
                self.feed.recency_half_life_hours = hours;
            }
        }
        if let Ok(budget) = std::env::var("SCHOLARFEED_FEED_SCORING_BUDGET_MS") {
            if let Ok(budget) = budget.parse::<u64>() {
                self.feed.scoring_budget_ms = budget;
            }
        }

        if let Ok(limit) = std::env::var("SCHOLARFEED_NOTIFICATIONS_LIST_LIMIT") {
            if let Ok(limit) = limit.parse::<u32>() {
                self.notifications.list_limit = limit;
            }
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for all config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());


/// Property-based tests for configuration parsing
#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn weight_strategy() -> impl Strategy<Value = f64> {
        (0u32..1000).prop_map(|w| w as f64 / 100.0)
    }

    fn feed_config_strategy() -> impl Strategy<Value = FeedConfig> {
        (
            (
                weight_strategy(),
                weight_strategy(),
                weight_strategy(),
                weight_strategy(),
                weight_strategy(),
            ),
            1u32..500,
            1u64..5000,
            1u32..=50,
        )
            .prop_flat_map(|(w, half_life, budget, max_page)| {
                (1u32..=max_page).prop_map(move |default_page| FeedConfig {
                    weights: FeedWeights {
                        recency: w.0,
                        follow: w.1,
                        topic: w.2,
                        engagement: w.3,
                        rating: w.4,
                    },
                    recency_half_life_hours: half_life as f64,
                    scoring_budget_ms: budget,
                    default_page_size: default_page,
                    max_page_size: max_page,
                })
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// A serialized config parses back to the same feed settings.
        #[test]
        fn feed_config_survives_yaml_roundtrip(feed in feed_config_strategy(), port in 1u16..) {
            let config = Config {
                server: ServerConfig { port, ..ServerConfig::default() },
                feed,
                ..Config::default()
            };
            let yaml = serde_yaml::to_string(&config).expect("Failed to serialize config");

            let mut file = NamedTempFile::new().expect("Failed to create temp file");
            write!(file, "{}", yaml).expect("Failed to write config");

            let parsed = Config::load(file.path()).expect("Failed to parse config");

            prop_assert_eq!(parsed.server.port, port);
            prop_assert_eq!(parsed.feed, config.feed);
        }

        /// Missing sections always fall back to usable values.
        #[test]
        fn missing_sections_get_defaults(include_server in any::<bool>(), include_feed in any::<bool>()) {
            let mut yaml = String::new();
            if include_server {
                yaml.push_str("server:\n  port: 9100\n");
            }
            if include_feed {
                yaml.push_str("feed:\n  scoring_budget_ms: 40\n");
            }
            let mut file = NamedTempFile::new().expect("Failed to create temp file");
            write!(file, "{}", yaml).expect("Failed to write config");

            let config = Config::load(file.path()).expect("Failed to parse config");

            prop_assert!(config.feed.recency_half_life_hours > 0.0);
            prop_assert!(config.feed.default_page_size <= config.feed.max_page_size);
            prop_assert!(!config.database.url.is_empty());
            prop_assert_eq!(config.server.port, if include_server { 9100 } else { 8080 });
            prop_assert_eq!(config.feed.scoring_budget_ms, if include_feed { 40 } else { 250 });
        }
    }
}
