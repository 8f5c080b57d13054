use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CourtsideError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Upper bound for the admission, processing and shutdown timeouts.
pub const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Upper bound for `WEATHER_MINS_TO_CACHE` (one week).
pub const MAX_MINS_TO_CACHE: u64 = 7 * 24 * 60;

fn check_at_most(key: &str, value: u64, max: u64) -> Result<(), CourtsideError> {
    if value > max {
        return Err(CourtsideError::Config(format!(
            "{key} must be at most {max}, got {value}"
        )));
    }
    Ok(())
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub results: ResultsConfig,
    pub weather: WeatherConfig,
    pub runtime: RuntimeConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `COURTSIDE_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("COURTSIDE_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            results: ResultsConfig::from_env_profiled(p),
            weather: WeatherConfig::from_env_profiled(p),
            runtime: RuntimeConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), CourtsideError> {
        if self.results.channel_capacity == 0 {
            return Err(CourtsideError::Config(
                "RESULTS_CHANNEL_CAPACITY must be at least 1".to_string(),
            ));
        }
        if self.results.workers == 0 {
            return Err(CourtsideError::Config(
                "RESULTS_WORKERS must be at least 1".to_string(),
            ));
        }
        if self.weather.city.trim().is_empty() {
            return Err(CourtsideError::Config("WEATHER_CITY must not be empty".to_string()));
        }
        check_at_most(
            "RESULTS_ADMISSION_TIMEOUT_SECS",
            self.results.admission_timeout_secs,
            MAX_TIMEOUT_SECS,
        )?;
        check_at_most(
            "RESULTS_PROCESSING_TIMEOUT_SECS",
            self.results.processing_timeout_secs,
            MAX_TIMEOUT_SECS,
        )?;
        check_at_most(
            "SHUTDOWN_TIMEOUT_SECS",
            self.runtime.shutdown_timeout_secs,
            MAX_TIMEOUT_SECS,
        )?;
        check_at_most("WEATHER_MINS_TO_CACHE", self.weather.mins_to_cache, MAX_MINS_TO_CACHE)?;
        Ok(())
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  results:  capacity={}, workers={}, admission_timeout={}s, staging_dir={}",
            self.results.channel_capacity,
            self.results.workers,
            self.results.admission_timeout_secs,
            self.results.staging_dir.display()
        );
        tracing::info!(
            "  weather:  city={}, mins_to_cache={}, api={}",
            self.weather.city,
            self.weather.mins_to_cache,
            if self.weather.is_configured() { "configured" } else { "(none)" }
        );
        tracing::info!("  runtime:  shutdown_timeout={}s", self.runtime.shutdown_timeout_secs);
    }

    /// Return a redacted view safe for API responses (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "results": {
                "channel_capacity": self.results.channel_capacity,
                "workers": self.results.workers,
                "admission_timeout_secs": self.results.admission_timeout_secs,
                "processing_timeout_secs": self.results.processing_timeout_secs,
                "staging_dir": self.results.staging_dir,
            },
            "weather": {
                "city": self.weather.city,
                "mins_to_cache": self.weather.mins_to_cache,
                "cache_capacity": self.weather.cache_capacity,
                "configured": self.weather.is_configured(),
            },
            "runtime": { "shutdown_timeout_secs": self.runtime.shutdown_timeout_secs },
        })
    }
}

// ── Results ingestion ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsConfig {
    /// Maximum number of uploaded files in flight (queued + processing).
    pub channel_capacity: usize,
    /// How long a submission may wait for a free slot.
    pub admission_timeout_secs: u64,
    /// Number of consumer loops draining the channel.
    pub workers: usize,
    /// Per-file processing bound; 0 disables it.
    pub processing_timeout_secs: u64,
    /// Where uploaded files are staged before processing.
    pub staging_dir: PathBuf,
}

impl ResultsConfig {
    fn from_env_profiled(p: &str) -> Self {
        let default_staging = env::temp_dir().join("courtside-staging");
        Self {
            channel_capacity: profiled_env_usize(p, "RESULTS_CHANNEL_CAPACITY", 100),
            admission_timeout_secs: profiled_env_u64(p, "RESULTS_ADMISSION_TIMEOUT_SECS", 3),
            workers: profiled_env_usize(p, "RESULTS_WORKERS", 1),
            processing_timeout_secs: profiled_env_u64(p, "RESULTS_PROCESSING_TIMEOUT_SECS", 0),
            staging_dir: profiled_env_opt(p, "RESULTS_STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or(default_staging),
        }
    }

    pub fn admission_timeout(&self) -> Duration {
        Duration::from_secs(self.admission_timeout_secs)
    }

    pub fn processing_timeout(&self) -> Option<Duration> {
        (self.processing_timeout_secs > 0).then(|| Duration::from_secs(self.processing_timeout_secs))
    }
}

// ── Weather cache refresh ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Base URL of the forecast provider; refresh is disabled without it.
    pub api_url: Option<String>,
    pub city: String,
    /// Minutes a cached forecast stays valid.
    pub mins_to_cache: u64,
    /// Maximum number of entries held by the in-memory cache.
    pub cache_capacity: usize,
}

impl WeatherConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            api_url: profiled_env_opt(p, "WEATHER_API_URL"),
            city: profiled_env_or(p, "WEATHER_CITY", "London"),
            mins_to_cache: profiled_env_u64(p, "WEATHER_MINS_TO_CACHE", 10),
            cache_capacity: profiled_env_usize(p, "WEATHER_CACHE_CAPACITY", 64),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_url.is_some()
    }
}

// ── Runtime ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub shutdown_timeout_secs: u64,
}

impl RuntimeConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            shutdown_timeout_secs: profiled_env_u64(p, "SHUTDOWN_TIMEOUT_SECS", 10),
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test uses its own profile prefix so parallel tests never share keys.

    #[test]
    fn test_profiled_key_overrides_default() {
        env::set_var("CFGTESTA_RESULTS_CHANNEL_CAPACITY", "7");
        env::set_var("CFGTESTA_WEATHER_CITY", "Paris");
        let config = Config::for_profile("cfgtesta");

        assert_eq!(config.profile, "CFGTESTA");
        assert_eq!(config.results.channel_capacity, 7);
        assert_eq!(config.weather.city, "Paris");
    }

    #[test]
    fn test_unparseable_value_falls_back_to_default() {
        env::set_var("CFGTESTB_RESULTS_ADMISSION_TIMEOUT_SECS", "soon");
        let config = Config::for_profile("CFGTESTB");
        assert_eq!(config.results.admission_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_processing_timeout_zero_disables() {
        env::set_var("CFGTESTC_RESULTS_PROCESSING_TIMEOUT_SECS", "0");
        let config = Config::for_profile("CFGTESTC");
        assert!(config.results.processing_timeout().is_none());

        env::set_var("CFGTESTD_RESULTS_PROCESSING_TIMEOUT_SECS", "45");
        let config = Config::for_profile("CFGTESTD");
        assert_eq!(config.results.processing_timeout(), Some(Duration::from_secs(45)));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        env::set_var("CFGTESTE_RESULTS_CHANNEL_CAPACITY", "0");
        let config = Config::for_profile("CFGTESTE");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("RESULTS_CHANNEL_CAPACITY"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_durations() {
        env::set_var("CFGTESTG_RESULTS_ADMISSION_TIMEOUT_SECS", u64::MAX.to_string());
        let err = Config::for_profile("CFGTESTG").validate().unwrap_err();
        assert!(err.to_string().contains("RESULTS_ADMISSION_TIMEOUT_SECS"));

        env::set_var("CFGTESTH_WEATHER_MINS_TO_CACHE", u64::MAX.to_string());
        let err = Config::for_profile("CFGTESTH").validate().unwrap_err();
        assert!(err.to_string().contains("WEATHER_MINS_TO_CACHE"));

        env::set_var("CFGTESTI_SHUTDOWN_TIMEOUT_SECS", (MAX_TIMEOUT_SECS + 1).to_string());
        let err = Config::for_profile("CFGTESTI").validate().unwrap_err();
        assert!(err.to_string().contains("SHUTDOWN_TIMEOUT_SECS"));

        env::set_var("CFGTESTJ_RESULTS_PROCESSING_TIMEOUT_SECS", MAX_TIMEOUT_SECS.to_string());
        env::set_var("CFGTESTJ_WEATHER_MINS_TO_CACHE", MAX_MINS_TO_CACHE.to_string());
        assert!(Config::for_profile("CFGTESTJ").validate().is_ok());
    }

    #[test]
    fn test_redacted_summary_shape() {
        env::set_var("CFGTESTF_WEATHER_API_URL", "http://weather.local");
        let config = Config::for_profile("CFGTESTF");
        let summary = config.redacted_summary();
        assert_eq!(summary["profile"], "CFGTESTF");
        assert_eq!(summary["weather"]["configured"], true);
        assert!(summary["weather"].get("api_url").is_none());
    }

    #[test]
    fn test_profile_label_default() {
        let config = Config::for_profile("");
        assert_eq!(config.profile_label(), "default");
    }
}
