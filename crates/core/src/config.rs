//! Process configuration, loaded from environment variables per the
//! `STORE_URL` / `WORKER_CONCURRENCY` / ... set documented for the worker
//! process. No TOML/JSON/YAML layer — each deployment just sets env vars.

use std::env::VarError;
use std::time::Duration;

use crate::errors::{AppError, AppResult};

const DEFAULT_WORKER_CONCURRENCY: usize = 4;
const DEFAULT_JOB_VISIBILITY_TIMEOUT_SEC: u64 = 600;
const DEFAULT_FRESHNESS_TICK_SEC: u64 = 300;

/// Process-wide configuration. `Config::from_env` is the only constructor
/// outside of tests; callers needing a fixed config for unit tests should
/// build it field-by-field.
#[derive(Debug, Clone)]
pub struct Config {
    pub store_url: String,
    pub store_service_key: String,
    pub model_api_key: Option<String>,
    pub video_api_key: Option<String>,
    pub transcription_api_key: Option<String>,
    pub transcription_api_url: Option<String>,
    pub worker_concurrency: usize,
    pub job_visibility_timeout: Duration,
    pub freshness_tick: Duration,
}

impl Config {
    /// Load configuration from the process environment. `STORE_URL` and
    /// `STORE_SERVICE_KEY` are required; everything else has a documented
    /// default or is optional (its absence activates a fallback code path
    /// rather than an error, e.g. no `MODEL_API_KEY` means analysis falls
    /// back to lexical scoring).
    pub fn from_env() -> AppResult<Self> {
        Ok(Self {
            store_url: require_env("STORE_URL")?,
            store_service_key: require_env("STORE_SERVICE_KEY")?,
            model_api_key: optional_env("MODEL_API_KEY")?,
            video_api_key: optional_env("VIDEO_API_KEY")?,
            transcription_api_key: optional_env("TRANSCRIPTION_API_KEY")?,
            transcription_api_url: optional_env("TRANSCRIPTION_API_URL")?,
            worker_concurrency: parse_env_or("WORKER_CONCURRENCY", DEFAULT_WORKER_CONCURRENCY)?,
            job_visibility_timeout: Duration::from_secs(parse_env_or(
                "JOB_VISIBILITY_TIMEOUT_SEC",
                DEFAULT_JOB_VISIBILITY_TIMEOUT_SEC,
            )?),
            freshness_tick: Duration::from_secs(parse_env_or(
                "FRESHNESS_TICK_SEC",
                DEFAULT_FRESHNESS_TICK_SEC,
            )?),
        })
    }

    /// True when a language-model API key is configured; callers use this
    /// to decide between the LLM path and the lexical fallback up front
    /// rather than discovering it on first call failure.
    pub fn has_llm(&self) -> bool {
        self.model_api_key.is_some()
    }

    /// True when an external transcription backend is configured;
    /// otherwise the Audio adapter's `transcribe_audio` jobs run
    /// against the no-op stub and RawItems are left without a body.
    pub fn has_transcription(&self) -> bool {
        self.transcription_api_key.is_some() && self.transcription_api_url.is_some()
    }
}

fn require_env(key: &str) -> AppResult<String> {
    std::env::var(key).map_err(|_| AppError::config(format!("missing required env var {key}")))
}

fn optional_env(key: &str) -> AppResult<Option<String>> {
    match std::env::var(key) {
        Ok(value) => Ok(Some(value)),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(_)) => {
            Err(AppError::config(format!("env var {key} is not valid UTF-8")))
        }
    }
}

fn parse_env_or<T>(key: &str, default: T) -> AppResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|e| AppError::config(format!("invalid value for {key}: {e}"))),
        Err(VarError::NotPresent) => Ok(default),
        Err(VarError::NotUnicode(_)) => {
            Err(AppError::config(format!("env var {key} is not valid UTF-8")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_vars() {
        for key in [
            "STORE_URL",
            "STORE_SERVICE_KEY",
            "MODEL_API_KEY",
            "VIDEO_API_KEY",
            "TRANSCRIPTION_API_KEY",
            "TRANSCRIPTION_API_URL",
            "WORKER_CONCURRENCY",
            "JOB_VISIBILITY_TIMEOUT_SEC",
            "FRESHNESS_TICK_SEC",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn fails_without_required_vars() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_vars();
        assert!(Config::from_env().is_err());
    }

    #[test]
    fn applies_defaults_for_optional_vars() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_vars();
        std::env::set_var("STORE_URL", "postgres://localhost/pipeline");
        std::env::set_var("STORE_SERVICE_KEY", "secret");

        let config = Config::from_env().unwrap();
        assert_eq!(config.worker_concurrency, DEFAULT_WORKER_CONCURRENCY);
        assert_eq!(config.job_visibility_timeout.as_secs(), DEFAULT_JOB_VISIBILITY_TIMEOUT_SEC);
        assert!(!config.has_llm());
        assert!(!config.has_transcription());

        clear_vars();
    }

    #[test]
    fn overrides_take_precedence_over_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_vars();
        std::env::set_var("STORE_URL", "postgres://localhost/pipeline");
        std::env::set_var("STORE_SERVICE_KEY", "secret");
        std::env::set_var("WORKER_CONCURRENCY", "16");
        std::env::set_var("MODEL_API_KEY", "sk-test");

        let config = Config::from_env().unwrap();
        assert_eq!(config.worker_concurrency, 16);
        assert!(config.has_llm());

        clear_vars();
    }
}
