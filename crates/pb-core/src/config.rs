//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries all
//! sub-configs for server, auth, rate limiting, conversion, and tools. Every
//! section defaults sensibly so a completely empty `{}` file is valid.
//! Environment variables are layered on top by [`Config::apply_env`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub conversion: ConversionConfig,
    pub tools: ToolsConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Overlay values from the process environment.
    ///
    /// Returns a warning for every variable that was set but could not be
    /// parsed; such variables are ignored.
    pub fn apply_env(&mut self) -> Vec<String> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut warnings = Vec::new();

        fn parse<T: std::str::FromStr>(
            key: &str,
            raw: Option<String>,
            warnings: &mut Vec<String>,
        ) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    warnings.push(format!("ignoring {key}={raw:?}: not a valid value"));
                    None
                }
            }
        }

        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = parse("PORT", lookup("PORT"), &mut warnings) {
            self.server.port = port;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.server.log_level = level.to_ascii_lowercase();
        }
        if let Some(keys) = lookup("API_KEYS") {
            self.auth.api_keys = keys;
        }
        if let Some(mb) = parse("MAX_FILE_SIZE_MB", lookup("MAX_FILE_SIZE_MB"), &mut warnings) {
            self.conversion.max_file_size_mb = mb;
        }
        if let Some(secs) = parse(
            "CONVERSION_TIMEOUT",
            lookup("CONVERSION_TIMEOUT"),
            &mut warnings,
        ) {
            self.conversion.timeout_secs = secs;
        }
        if let Some(n) = parse(
            "MAX_CONCURRENT_PROCESSES",
            lookup("MAX_CONCURRENT_PROCESSES"),
            &mut warnings,
        ) {
            self.conversion.max_concurrent_processes = n;
        }
        if let Some(path) = lookup("PANDOC_PATH") {
            self.tools.pandoc_path = Some(PathBuf::from(path));
        }

        warnings
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.auth.enabled {
            let keys = self.auth.parsed_keys();
            if keys.is_empty() {
                warnings.push(
                    "auth is enabled but no api_keys are configured; all protected requests will be rejected"
                        .into(),
                );
            }
            let today = chrono::Utc::now().date_naive();
            for key in keys.iter().filter(|k| k.is_expired(today)) {
                warnings.push(format!("api key {} has expired", key.masked()));
            }
        }

        for invalid in self.auth.invalid_key_entries() {
            warnings.push(format!(
                "api_keys entry '{invalid}' has an unparseable expiry date; the key will not expire"
            ));
        }

        if self.conversion.timeout_secs == 0 {
            warnings.push("conversion.timeout_secs is 0; every conversion will time out".into());
        }
        if self.conversion.max_concurrent_processes == 0 {
            warnings.push("conversion.max_concurrent_processes is 0; using 1".into());
        }
        if self.conversion.batch_concurrency == 0 {
            warnings.push("conversion.batch_concurrency is 0; using 1".into());
        }

        if self.rate_limit.enabled && self.rate_limit.requests_per_minute == 0 {
            warnings.push("rate_limit.requests_per_minute is 0; rate limiting disabled".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub service_name: String,
    pub service_version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            log_level: "info".into(),
            service_name: "pandoc-bridge".into(),
            service_version: "1.0.0".into(),
        }
    }
}

/// Authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    /// Comma-separated `key[:YYYY-MM-DD]` entries.
    pub api_keys: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_keys: String::new(),
        }
    }
}

/// A configured API key with an optional expiry date (inclusive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKey {
    pub key: String,
    pub expires: Option<NaiveDate>,
}

impl ApiKey {
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expires.is_some_and(|date| today > date)
    }

    /// Key prefix safe to show in logs.
    pub fn masked(&self) -> String {
        let prefix: String = self.key.chars().take(6).collect();
        format!("{prefix}…")
    }
}

impl AuthConfig {
    /// Parse `api_keys` into individual keys.
    ///
    /// An entry whose expiry does not parse is kept without an expiry;
    /// [`Config::validate`] reports it.
    pub fn parsed_keys(&self) -> Vec<ApiKey> {
        self.entries()
            .map(|entry| match split_key_entry(entry) {
                (key, Some(expiry)) => ApiKey {
                    key: key.to_string(),
                    expires: parse_expiry(expiry).ok(),
                },
                (key, None) => ApiKey {
                    key: key.to_string(),
                    expires: None,
                },
            })
            .collect()
    }

    fn invalid_key_entries(&self) -> Vec<String> {
        self.entries()
            .filter(|entry| {
                split_key_entry(entry)
                    .1
                    .is_some_and(|expiry| parse_expiry(expiry).is_err())
            })
            .map(|entry| entry.to_string())
            .collect()
    }

    fn entries(&self) -> impl Iterator<Item = &str> {
        self.api_keys.split(',').map(str::trim).filter(|s| !s.is_empty())
    }
}

fn split_key_entry(entry: &str) -> (&str, Option<&str>) {
    match entry.split_once(':') {
        Some((key, expiry)) => (key.trim(), Some(expiry.trim())),
        None => (entry, None),
    }
}

fn parse_expiry(expiry: &str) -> std::result::Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(expiry, "%Y-%m-%d")
}

/// Per-client request throttling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_minute: u32,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: 60,
            burst_size: 10,
        }
    }
}

/// Conversion limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    pub timeout_secs: u64,
    pub max_file_size_mb: u64,
    /// Global cap on concurrently running Pandoc processes.
    #[serde(default = "default_max_processes")]
    pub max_concurrent_processes: usize,
    /// Per-batch cap on concurrently running items.
    pub batch_concurrency: usize,
    /// Parent directory for per-request workspaces (system temp when unset).
    pub temp_dir: Option<PathBuf>,
}

fn default_max_processes() -> usize {
    num_cpus::get() * 2
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            max_file_size_mb: 50,
            max_concurrent_processes: default_max_processes(),
            batch_concurrency: 4,
            temp_dir: None,
        }
    }
}

impl ConversionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }
}

/// Location of the Pandoc executable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub pandoc_path: Option<PathBuf>,
    /// Arguments placed before the generated Pandoc arguments, e.g. for a
    /// wrapper script.
    pub pandoc_args: Vec<String>,
}
