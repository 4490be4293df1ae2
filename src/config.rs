use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub event_buffer_size: usize,
    pub optimizer_url: Option<String>,
    pub optimizer_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: parse_log_format()?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            optimizer_url: non_empty_var("OPTIMIZER_URL"),
            optimizer_timeout: Duration::from_millis(parse_or_default(
                "OPTIMIZER_TIMEOUT_MS",
                2000u64,
            )?),
        })
    }
}

/// Settings for the API client side: where the backend lives and where
/// credentials persist between runs.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub credentials_path: Option<PathBuf>,
    pub request_timeout: Duration,
    /// Sent as `x-actor-id`; driver apps set it to their driver id.
    pub actor_id: Option<String>,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            api_url: non_empty_var("CARGOFLOW_API_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            credentials_path: non_empty_var("CARGOFLOW_CREDENTIALS_PATH").map(PathBuf::from),
            request_timeout: Duration::from_secs(parse_or_default(
                "CARGOFLOW_REQUEST_TIMEOUT_SECS",
                30u64,
            )?),
            actor_id: non_empty_var("CARGOFLOW_ACTOR_ID"),
        })
    }
}

fn parse_log_format() -> Result<LogFormat, AppError> {
    match env::var("LOG_FORMAT") {
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "compact" | "" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(AppError::Internal(format!(
                "invalid LOG_FORMAT: {other}, expected compact or json"
            ))),
        },
        Err(_) => Ok(LogFormat::Compact),
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
