//! Nutri-Harvest: a batched, resumable nutrition-database harvester
//!
//! This crate drives headless browser sessions over the list tables and the
//! dish/ingredient detail pages of a nutrition database, extracting structured
//! records into CSV and JSON files while tolerating page, session and batch
//! failures without losing prior progress.

pub mod config;
pub mod crawler;
pub mod driver;
pub mod output;
pub mod state;

use thiserror::Error;

/// Main error type for Nutri-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Browser driver error: {0}")]
    Driver(#[from] driver::DriverError),

    #[error("Session error: {0}")]
    Session(#[from] crawler::SessionError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Nutri-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::{Config, CrawlMode};
pub use state::{Record, ResultAccumulator};
