use std::env;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Runtime configuration loaded from environment variables.
///
/// `DATABASE_URL` and `SEC_USER_AGENT` are required (the SEC rejects
/// anonymous clients); everything else has a production default.
#[derive(Debug, Clone)]
pub struct Settings {
    /// PostgreSQL connection string
    pub database_url: String,

    /// User-Agent identifying the operator (name and email), required by SEC
    pub sec_user_agent: String,

    /// Minimum gap between SEC requests across the whole process
    pub rate_limit_delay: Duration,

    /// Filings at or below this size (MB) get the standard tier
    pub small_file_threshold: f64,

    /// Filings at or below this size (MB) get at least the limited tier
    pub medium_file_threshold: f64,

    /// Filings above this size (MB) are never attempted
    pub large_file_threshold: f64,

    /// Parse timeout per tier, seconds
    pub timeout_standard: u64,
    pub timeout_limited: u64,
    pub timeout_minimal: u64,

    /// Maximum filings per daily batch
    pub batch_size: usize,

    /// Maximum retry candidates per night batch
    pub night_batch_size: usize,

    /// Dead-letter queue retry ceiling
    pub dlq_max_attempts: i32,

    /// Largest file (MB) the night batch will pick up
    pub dlq_max_file_size_mb: f64,

    /// Days to keep completed/failed filings and exhausted DLQ entries
    pub data_retention_days: i64,
}

impl Settings {
    /// Load settings from the environment (reads `.env` first when present).
    pub fn from_env() -> AppResult<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| AppError::config_error("DATABASE_URL environment variable is required"))?;
        let sec_user_agent = env::var("SEC_USER_AGENT").map_err(|_| {
            AppError::config_error("SEC_USER_AGENT environment variable is required")
        })?;

        let settings = Self {
            database_url,
            sec_user_agent,
            rate_limit_delay: Duration::from_secs_f64(parse_env("RATE_LIMIT_DELAY", 0.1)?),
            small_file_threshold: parse_env("SMALL_FILE_THRESHOLD", 10.0)?,
            medium_file_threshold: parse_env("MEDIUM_FILE_THRESHOLD", 50.0)?,
            large_file_threshold: parse_env("LARGE_FILE_THRESHOLD", 100.0)?,
            timeout_standard: parse_env("TIMEOUT_STANDARD", 300)?,
            timeout_limited: parse_env("TIMEOUT_LIMITED", 120)?,
            timeout_minimal: parse_env("TIMEOUT_MINIMAL", 60)?,
            batch_size: parse_env("BATCH_SIZE", 100)?,
            night_batch_size: parse_env("NIGHT_BATCH_SIZE", 50)?,
            dlq_max_attempts: parse_env("DLQ_MAX_ATTEMPTS", 5)?,
            dlq_max_file_size_mb: parse_env("DLQ_MAX_FILE_SIZE_MB", 50.0)?,
            data_retention_days: parse_env("DATA_RETENTION_DAYS", 90)?,
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> AppResult<()> {
        if !(0.0 < self.small_file_threshold
            && self.small_file_threshold < self.medium_file_threshold
            && self.medium_file_threshold < self.large_file_threshold)
        {
            return Err(AppError::config_error(
                "File size thresholds must be in strictly ascending order",
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> AppResult<T> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| AppError::config_error(format!("Invalid value for {}: {}", key, raw))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_settings() -> Settings {
        Settings {
            database_url: "postgres://localhost/test".to_string(),
            sec_user_agent: "Test Operator test@example.com".to_string(),
            rate_limit_delay: Duration::from_millis(100),
            small_file_threshold: 10.0,
            medium_file_threshold: 50.0,
            large_file_threshold: 100.0,
            timeout_standard: 300,
            timeout_limited: 120,
            timeout_minimal: 60,
            batch_size: 100,
            night_batch_size: 50,
            dlq_max_attempts: 5,
            dlq_max_file_size_mb: 50.0,
            data_retention_days: 90,
        }
    }

    #[test]
    fn test_valid_thresholds_pass_validation() {
        assert!(base_settings().validate().is_ok());
    }

    #[test]
    fn test_unordered_thresholds_fail_validation() {
        // REQUIREMENT: Tier routing depends on strictly ascending thresholds
        // PURPOSE: Verify that a misconfigured environment fails at startup
        // rather than producing a degenerate tier map
        let mut settings = base_settings();
        settings.medium_file_threshold = 5.0;
        assert!(settings.validate().is_err());

        let mut settings = base_settings();
        settings.large_file_threshold = settings.medium_file_threshold;
        assert!(settings.validate().is_err());
    }
}
