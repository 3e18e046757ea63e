//! Typed configuration schema, file loading, and validation.
//!
//! Mirrors the teacher's `EnterpriseConfig::from_file` pattern (read a serialized
//! struct from disk, fail loudly on malformed input) generalized to the richer
//! schema this system needs: origins, derivatives, responsive breakpoints, and
//! per-source storage settings. Configuration is read-only after load; `AppConfig`
//! is published behind an `arc_swap::ArcSwap` so a reload never mutates in place.

use std::collections::HashMap;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::origin::model::OriginConfig;

/// Configuration loading/validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration failed a semantic validation rule.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// The configuration file could not be read.
    #[error("io error reading configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file could not be parsed as JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The configuration file could not be parsed as YAML.
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// One of the origin matchers is not a valid regex.
    #[error("invalid matcher regex for origin '{origin}': {source}")]
    InvalidMatcher {
        /// Origin name whose matcher failed to compile.
        origin: String,
        /// Underlying regex compile error.
        #[source]
        source: regex::Error,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Root application configuration, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Schema version, for forward-compatible config migrations.
    pub version: u32,
    /// Debug/diagnostics toggles.
    #[serde(default)]
    pub debug: DebugConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Cache behavior configuration.
    pub cache: CacheConfig,
    /// Default transform options applied before any derivative/override/query merge.
    #[serde(default)]
    pub video_defaults: VideoDefaults,
    /// Named derivative presets.
    pub derivatives: HashMap<String, DerivativeConfig>,
    /// Named responsive breakpoint ranges, used by the IMQuery width-only path.
    #[serde(default)]
    pub responsive_breakpoints: HashMap<String, BreakpointConfig>,
    /// Ordered list of origin routing rules.
    pub origins: Vec<OriginConfig>,
    /// Storage backend configuration.
    pub storage: StorageConfig,
}

/// Debug/diagnostics toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugConfig {
    /// Whether debug headers/routes are enabled at all.
    pub enabled: bool,
    /// `"json"` or `"compact"` log rendering.
    pub log_format: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_format: "compact".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// A `tracing`/`env_logger`-style level filter, e.g. `"info"`, `"debug"`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Per-status-class TTLs, in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TtlConfig {
    /// TTL for 2xx responses.
    pub ok: u64,
    /// TTL for 4xx responses.
    pub client_error: u64,
    /// TTL for 5xx responses.
    pub server_error: u64,
    /// TTL for 3xx responses.
    pub redirects: u64,
}

/// Cache behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Per-status-class TTLs.
    pub ttl: TtlConfig,
    /// Whether the version store participates in cache-key/url construction.
    pub enable_versioning: bool,
    /// Whether cache-tag generation (C5) runs on store.
    pub enable_cache_tags: bool,
    /// When true, writes omit a TTL (store indefinitely).
    pub store_indefinitely: bool,
    /// Query parameters that trigger a cache bypass in addition to the fixed set
    /// (`nocache`, `bypass`, `debug`).
    #[serde(default)]
    pub bypass_query_parameters: Vec<String>,
}

/// Defaults applied for each transform mode before derivative/override/query merge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoDefaults {
    /// Default quality, if none is otherwise specified.
    pub quality: Option<String>,
    /// Default compression, if none is otherwise specified.
    pub compression: Option<String>,
    /// Default container/codec format, if none is otherwise specified.
    pub format: Option<String>,
}

/// A named derivative preset: canonical dimensions and quality settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivativeConfig {
    /// Canonical width, in pixels.
    pub width: Option<u32>,
    /// Canonical height, in pixels.
    pub height: Option<u32>,
    /// Quality preset name.
    pub quality: Option<String>,
    /// Compression preset name.
    pub compression: Option<String>,
    /// Container/codec format.
    pub format: Option<String>,
    /// The mode this derivative applies to.
    pub mode: crate::options::TransformMode,
}

/// A width range mapped to a derivative for IMQuery resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakpointConfig {
    /// Inclusive lower bound in pixels; `None` means unbounded below.
    pub min: Option<u32>,
    /// Inclusive upper bound in pixels; `None` means unbounded above.
    pub max: Option<u32>,
    /// Derivative name this range maps to.
    pub derivative: String,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Ordered preference of origin source kinds (informational; `Origin.sources`
    /// drives actual fetch order).
    pub priority: Vec<String>,
    /// Filesystem path backing the `sled`-based KV store.
    pub kv_path: String,
    /// Filesystem path backing the version-namespace `sled` store.
    pub version_kv_path: String,
}

impl AppConfig {
    /// Load and validate configuration from a YAML or JSON file, selected by extension.
    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&contents)?,
            _ => serde_json::from_str(&contents)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate semantic invariants the schema alone can't express:
    /// origin matchers compile, breakpoints are contiguous and non-overlapping,
    /// and every derivative reference resolves.
    pub fn validate(&self) -> ConfigResult<()> {
        for origin in &self.origins {
            Regex::new(&origin.matcher).map_err(|source| ConfigError::InvalidMatcher {
                origin: origin.name.clone(),
                source,
            })?;
            if origin.sources.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "origin '{}' has no sources",
                    origin.name
                )));
            }
        }

        for (name, bp) in &self.responsive_breakpoints {
            if !self.derivatives.contains_key(&bp.derivative) {
                return Err(ConfigError::Invalid(format!(
                    "breakpoint '{}' references unknown derivative '{}'",
                    name, bp.derivative
                )));
            }
        }

        self.validate_breakpoint_coverage()?;

        Ok(())
    }

    /// Breakpoints must be non-overlapping and cover `[0, ∞)` (IMQuery Resolver
    /// rule 1). Collect (min,max) pairs, sort by min, and walk the sequence.
    fn validate_breakpoint_coverage(&self) -> ConfigResult<()> {
        if self.responsive_breakpoints.is_empty() {
            return Ok(());
        }
        let mut ranges: Vec<(u32, u32)> = self
            .responsive_breakpoints
            .values()
            .map(|bp| (bp.min.unwrap_or(0), bp.max.unwrap_or(u32::MAX)))
            .collect();
        ranges.sort_by_key(|(min, _)| *min);

        if ranges[0].0 != 0 {
            return Err(ConfigError::Invalid(
                "responsive breakpoints must start at 0".to_string(),
            ));
        }
        for window in ranges.windows(2) {
            let (_, prev_max) = window[0];
            let (next_min, _) = window[1];
            if next_min > prev_max.saturating_add(1) {
                return Err(ConfigError::Invalid(format!(
                    "gap in responsive breakpoint coverage between {} and {}",
                    prev_max, next_min
                )));
            }
            if next_min <= prev_max && prev_max != u32::MAX {
                return Err(ConfigError::Invalid(format!(
                    "overlapping responsive breakpoints at {}",
                    next_min
                )));
            }
        }
        if ranges.last().unwrap().1 != u32::MAX {
            return Err(ConfigError::Invalid(
                "responsive breakpoints must cover up to unbounded width".to_string(),
            ));
        }
        Ok(())
    }
}
