use crate::config::types::{Config, CrawlConfig, Credentials, OutputConfig, RetryConfig, SiteConfig};
use crate::ConfigError;
use url::Url;

/// Upper bound on parallel sessions; the site penalizes parallel logins
const MAX_CONCURRENCY: usize = 16;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawl_config(&config.crawl)?;
    validate_site_config(&config.site)?;
    if let Some(credentials) = &config.credentials {
        validate_credentials(credentials)?;
    }
    validate_timeouts(config)?;
    validate_retry_config(&config.retry)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawl scope and pacing
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "batch-size must be >= 1, got {}",
            config.batch_size
        )));
    }

    if config.max_concurrency < 1 || config.max_concurrency > MAX_CONCURRENCY {
        return Err(ConfigError::Validation(format!(
            "max-concurrency must be between 1 and {}, got {}",
            MAX_CONCURRENCY, config.max_concurrency
        )));
    }

    if config.mode.uses_unit_range() {
        if config.start < 1 {
            return Err(ConfigError::Validation(format!(
                "start must be >= 1, got {}",
                config.start
            )));
        }

        if config.start > config.end {
            return Err(ConfigError::Validation(format!(
                "start ({}) must not exceed end ({})",
                config.start, config.end
            )));
        }
    }

    let [min_delay, max_delay] = config.unit_delay_ms;
    if min_delay > max_delay {
        return Err(ConfigError::Validation(format!(
            "unit-delay-ms minimum ({}) exceeds maximum ({})",
            min_delay, max_delay
        )));
    }

    if config.rows_per_page < 1 {
        return Err(ConfigError::Validation(
            "rows-per-page must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates the site base URL
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' must use http or https",
            config.base_url
        )));
    }

    Ok(())
}

fn validate_credentials(credentials: &Credentials) -> Result<(), ConfigError> {
    if credentials.username.trim().is_empty() {
        return Err(ConfigError::Validation(
            "credentials.username cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_timeouts(config: &Config) -> Result<(), ConfigError> {
    for (key, value) in config.timeouts.entries() {
        if value == 0 {
            return Err(ConfigError::Validation(format!(
                "timeouts.{} must be > 0",
                key
            )));
        }
    }
    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.login_attempts < 1 {
        return Err(ConfigError::Validation(
            "login-attempts must be >= 1".to_string(),
        ));
    }

    if config.fetch_attempts < 1 {
        return Err(ConfigError::Validation(
            "fetch-attempts must be >= 1".to_string(),
        ));
    }

    if config.fetch_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "fetch-timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    let names = [
        ("progress-file", &config.progress_file),
        ("complete-file", &config.complete_file),
        ("image-dir", &config.image_dir),
        ("csv-file", &config.csv_file),
        ("batch-file-prefix", &config.batch_file_prefix),
        ("summary-file", &config.summary_file),
    ];

    for (key, value) in names {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", key)));
        }
    }

    if config.progress_file == config.complete_file {
        return Err(ConfigError::Validation(
            "progress-file and complete-file must differ".to_string(),
        ));
    }

    Ok(())
}
