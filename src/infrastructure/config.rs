use crate::domain::error::RegistryError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

pub const GIB: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub logging: Logging,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RemoteConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_health_timeout")]
    pub health_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_jitter")]
    pub retry_jitter: f64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_enable")]
    pub enabled: bool,
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitMode {
    #[default]
    Suspend,
    FailFast,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_per_minute")]
    pub max_requests_per_minute: u32,
    #[serde(default)]
    pub mode: RateLimitMode,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatasetConfig {
    #[serde(default = "default_archive_url")]
    pub archive_url: String,
    pub archive_path: Option<PathBuf>,
    #[serde(default = "default_size_cap")]
    pub size_cap_bytes: u64,
    #[serde(default = "default_delimiter")]
    pub csv_delimiter: char,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BatchConfig {
    #[serde(default = "default_batch_concurrency")]
    pub max_concurrent: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MatcherConfig {
    #[serde(default = "default_max_edit_distance")]
    pub max_edit_distance: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Logging {
    #[serde(default = "default_enable")]
    pub enable: bool,
    pub path: Option<String>,
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            health_timeout_secs: default_health_timeout(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay(),
            retry_jitter: default_retry_jitter(),
            user_agent: default_user_agent(),
        }
    }
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_cache_ttl(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: default_max_per_minute(),
            mode: RateLimitMode::Suspend,
        }
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            archive_url: default_archive_url(),
            archive_path: None,
            size_cap_bytes: default_size_cap(),
            csv_delimiter: default_delimiter(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_batch_concurrency(),
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            max_edit_distance: default_max_edit_distance(),
        }
    }
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            enable: true,
            path: None,
            level: "WARN".to_string(),
        }
    }
}

// Defaults
fn default_base_url() -> String {
    "https://prehledy.sukl.cz".to_string()
}
fn default_request_timeout() -> u64 {
    30
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_health_timeout() -> u64 {
    5
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_base_delay() -> u64 {
    1000
}
fn default_retry_jitter() -> f64 {
    0.1
}
fn default_user_agent() -> String {
    format!("sukl-registry/{}", env!("CARGO_PKG_VERSION"))
}
fn default_cache_ttl() -> u64 {
    300
}
fn default_max_per_minute() -> u32 {
    60
}
fn default_archive_url() -> String {
    "https://opendata.sukl.cz/soubory/dlp.zip".to_string()
}
fn default_size_cap() -> u64 {
    5 * GIB
}
fn default_delimiter() -> char {
    ';'
}
fn default_batch_concurrency() -> usize {
    5
}
fn default_max_edit_distance() -> usize {
    2
}
fn default_enable() -> bool {
    true
}
fn default_log_level() -> String {
    "WARN".to_string()
}

impl Config {
    /// Applies environment-style overrides. `lookup` is `std::env::var` in
    /// production and a map in tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), RegistryError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SUKL_REQUEST_TIMEOUT") {
            self.remote.request_timeout_secs = parse_env("SUKL_REQUEST_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("SUKL_CONNECT_TIMEOUT") {
            self.remote.connect_timeout_secs = parse_env("SUKL_CONNECT_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("SUKL_CACHE_ENABLED") {
            self.cache.enabled = parse_flag("SUKL_CACHE_ENABLED", &v)?;
        }
        if let Some(v) = lookup("SUKL_CACHE_TTL") {
            self.cache.ttl_secs = parse_env("SUKL_CACHE_TTL", &v)?;
        }
        if let Some(v) = lookup("SUKL_MAX_REQUESTS_PER_MINUTE") {
            self.rate_limit.max_requests_per_minute =
                parse_env("SUKL_MAX_REQUESTS_PER_MINUTE", &v)?;
        }
        if let Some(v) = lookup("SUKL_ARCHIVE_SIZE_CAP") {
            self.dataset.size_cap_bytes = parse_env("SUKL_ARCHIVE_SIZE_CAP", &v)?;
        }
        if let Some(v) = lookup("SUKL_BATCH_CONCURRENCY") {
            self.batch.max_concurrent = parse_env("SUKL_BATCH_CONCURRENCY", &v)?;
        }
        if let Some(v) = lookup("SUKL_API_BASE_URL") {
            self.remote.base_url = v;
        }
        if let Some(v) = lookup("SUKL_ARCHIVE_URL") {
            self.dataset.archive_url = v;
        }
        if let Some(v) = lookup("SUKL_ARCHIVE_PATH") {
            self.dataset.archive_path = Some(PathBuf::from(v));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.rate_limit.max_requests_per_minute == 0 {
            return Err(RegistryError::Config(
                "max_requests_per_minute must be greater than 0".to_string(),
            ));
        }
        if self.remote.max_attempts == 0 {
            return Err(RegistryError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.batch.max_concurrent == 0 {
            return Err(RegistryError::Config(
                "batch max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.dataset.size_cap_bytes == 0 {
            return Err(RegistryError::Config(
                "archive size cap must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.remote.retry_jitter) {
            return Err(RegistryError::Config(format!(
                "retry_jitter {} outside [0, 1]",
                self.remote.retry_jitter
            )));
        }
        if !self.dataset.csv_delimiter.is_ascii() {
            return Err(RegistryError::Config(
                "csv_delimiter must be an ASCII character".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, RegistryError> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| RegistryError::Config(format!("{} has invalid value '{}'", name, value)))
}

fn parse_flag(name: &str, value: &str) -> Result<bool, RegistryError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(RegistryError::Config(format!(
            "{} has invalid value '{}'",
            name, value
        ))),
    }
}

pub fn get_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("sukl").join("config.toml"))
}

/// File (if present), then environment, then validation.
pub fn load_config() -> Result<Config, RegistryError> {
    let mut config = Config::default();

    if let Some(path) = get_config_path() {
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            match toml::from_str::<Config>(&content) {
                Ok(parsed) => config = parsed,
                Err(e) => {
                    eprintln!(
                        "Warning: Failed to parse config file: {}. Using defaults.",
                        e
                    );
                }
            }
        }
    }

    config.apply_env(|name| std::env::var(name).ok())?;
    config.validate()?;
    Ok(config)
}

pub fn generate_config_sample() -> Result<(), RegistryError> {
    let config_path = get_config_path();

    if let Some(path) = config_path {
        if path.exists() {
            eprintln!("Config file already exists at: {}", path.display());
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let sample = Config::default();
        let toml_content = toml::to_string_pretty(&sample)
            .map_err(|e| RegistryError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(&path, toml_content)
            .map_err(|e| RegistryError::Config(format!("Failed to write config file: {}", e)))?;
        println!("Generated config file at: {}", path.display());
    } else {
        return Err(RegistryError::Config(
            "Cannot determine config directory".to_string(),
        ));
    }

    Ok(())
}
