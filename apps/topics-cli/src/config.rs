//! Environment-backed runtime configuration for `topics-cli`.

use std::{env, time::Duration};

use thiserror::Error;
use topics_core::{ControllerSettings, RetryPolicy};
use topics_http::HttpTopicsConfig;
use url::Url;

/// Runtime configuration used by the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    /// Remote collection settings forwarded to the HTTP client.
    pub http: HttpTopicsConfig,
    /// Controller tuning.
    pub controller: ControllerSettings,
}

impl CliConfig {
    /// Parse configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let defaults = HttpTopicsConfig::default();
        let notice_defaults = ControllerSettings::default();

        let base_url =
            optional_trimmed_env("TOPICS_API_BASE_URL", &mut lookup).unwrap_or(defaults.base_url);
        validate_base_url(&base_url)?;

        let auth_token = optional_trimmed_env("TOPICS_API_TOKEN", &mut lookup);
        let collection =
            optional_trimmed_env("TOPICS_COLLECTION", &mut lookup).unwrap_or(defaults.collection);
        let limit_param =
            optional_trimmed_env("TOPICS_LIMIT_PARAM", &mut lookup).unwrap_or(defaults.limit_param);

        let list_limit = parse_or_default("TOPICS_LIST_LIMIT", defaults.list_limit, &mut lookup)?;
        let owner_id = parse_or_default("TOPICS_OWNER_ID", defaults.owner_id, &mut lookup)?;
        let request_timeout_ms = parse_or_default(
            "TOPICS_REQUEST_TIMEOUT_MS",
            duration_ms(defaults.request_timeout),
            &mut lookup,
        )?;
        let max_retries = parse_or_default(
            "TOPICS_MAX_RETRIES",
            defaults.retry.max_retries(),
            &mut lookup,
        )?;
        let retry_base_delay_ms = parse_or_default(
            "TOPICS_RETRY_BASE_DELAY_MS",
            defaults.retry.base_delay_ms(),
            &mut lookup,
        )?;
        let success_notice_ms = parse_or_default(
            "TOPICS_SUCCESS_NOTICE_MS",
            duration_ms(notice_defaults.success_notice_ttl),
            &mut lookup,
        )?;

        if list_limit == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TOPICS_LIST_LIMIT",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        if request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TOPICS_REQUEST_TIMEOUT_MS",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }

        let max_delay_ms = defaults.retry.max_delay_ms().max(retry_base_delay_ms);
        Ok(Self {
            http: HttpTopicsConfig {
                base_url,
                collection,
                auth_token,
                request_timeout: Duration::from_millis(request_timeout_ms),
                list_limit,
                limit_param,
                owner_id,
                retry: RetryPolicy::new(max_retries, retry_base_delay_ms, max_delay_ms),
            },
            controller: ControllerSettings {
                success_notice_ttl: Duration::from_millis(success_notice_ms),
            },
        })
    }
}

/// Errors produced while parsing runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    #[error("invalid {key}='{value}': {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_or_default<T, F>(key: &'static str, default: T, lookup: &mut F) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(default);
    };
    value
        .parse::<T>()
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value,
            reason: err.to_string(),
        })
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn validate_base_url(value: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        key: "TOPICS_API_BASE_URL",
        value: value.to_owned(),
        reason,
    };
    let url = Url::parse(value).map_err(|err| invalid(err.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme '{other}'"))),
    }
}
