//! Service configuration.
//!
//! Handles loading, validating, and merging the service config. Values are
//! layered: stock defaults are overridden by an optional `picserve.toml`, which
//! is in turn overridden by command-line flags.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! image_dir = "photos"      # Source images (must exist)
//! cache_dir = ""            # Rendition cache; empty disables caching
//! port = 8080
//! log_level = "info"        # off, error, warn, info, debug, trace
//! cert_file = ""            # TLS certificate (PEM); empty serves plain HTTP
//! cert_key_file = ""        # TLS private key (PEM)
//!
//! [rendering]
//! jpeg_quality = 75         # Quality of every served JPEG (1-100)
//! max_dimension = 5000      # Largest accepted width or height
//! max_blur = 100.0          # Largest accepted blur sigma
//!
//! [server]
//! request_timeout_secs = 30
//!
//! [processing]
//! max_processes = 4         # Max parallel warm-up workers (omit for auto = CPU cores)
//! ```
//!
//! ## Partial Configuration
//!
//! Config files are sparse. Override just the values you want:
//!
//! ```toml
//! cache_dir = "/var/cache/picserve"
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{BLUR_CEILING, Limits};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::level_filters::LevelFilter;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Service configuration.
///
/// All fields have defaults. Config files need only specify the values they
/// want to override. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Directory of source images.
    pub image_dir: PathBuf,
    /// Directory of cached renditions. Empty disables caching.
    pub cache_dir: PathBuf,
    pub port: u16,
    pub log_level: String,
    /// TLS certificate (PEM). TLS is enabled when this and `cert_key_file`
    /// are both set.
    pub cert_file: PathBuf,
    pub cert_key_file: PathBuf,
    pub rendering: RenderingConfig,
    pub server: ServerConfig,
    pub processing: ProcessingConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from("photos"),
            cache_dir: PathBuf::new(),
            port: 8080,
            log_level: "info".to_string(),
            cert_file: PathBuf::new(),
            cert_key_file: PathBuf::new(),
            rendering: RenderingConfig::default(),
            server: ServerConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Validate config values are within acceptable ranges.
    ///
    /// Pure: does not touch the filesystem. See
    /// [`prepare_directories`](Self::prepare_directories).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.image_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation("image_dir must be set".into()));
        }
        if self.log_level.parse::<LevelFilter>().is_err() {
            return Err(ConfigError::Validation(format!(
                "log_level '{}' is not one of off, error, warn, info, debug, trace",
                self.log_level
            )));
        }
        if is_set(&self.cert_file) != is_set(&self.cert_key_file) {
            return Err(ConfigError::Validation(
                "cert_file and cert_key_file must be set together".into(),
            ));
        }
        if !(1..=100).contains(&self.rendering.jpeg_quality) {
            return Err(ConfigError::Validation(
                "rendering.jpeg_quality must be 1-100".into(),
            ));
        }
        if self.rendering.max_dimension == 0 {
            return Err(ConfigError::Validation(
                "rendering.max_dimension must be non-zero".into(),
            ));
        }
        if !(0.0..=BLUR_CEILING).contains(&self.rendering.max_blur) {
            return Err(ConfigError::Validation(format!(
                "rendering.max_blur must be between 0 and {BLUR_CEILING}"
            )));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "server.request_timeout_secs must be non-zero".into(),
            ));
        }
        Ok(())
    }

    pub fn cache_enabled(&self) -> bool {
        is_set(&self.cache_dir)
    }

    /// Certificate and key paths when TLS is configured.
    pub fn tls(&self) -> Option<(&Path, &Path)> {
        (is_set(&self.cert_file) && is_set(&self.cert_key_file))
            .then(|| (self.cert_file.as_path(), self.cert_key_file.as_path()))
    }

    /// Check the image directory exists and create the cache directory.
    ///
    /// The two directories must not be the same, and neither may contain
    /// the other: cached renditions would show up as source images, and
    /// clearing the cache would delete sources.
    pub fn prepare_directories(&self) -> Result<(), ConfigError> {
        if !self.image_dir.is_dir() {
            return Err(ConfigError::Validation(format!(
                "image_dir does not exist: {}",
                self.image_dir.display()
            )));
        }
        if !self.cache_enabled() {
            return Ok(());
        }

        fs::create_dir_all(&self.cache_dir)?;
        let images = fs::canonicalize(&self.image_dir)?;
        let cache = fs::canonicalize(&self.cache_dir)?;
        if images == cache {
            return Err(ConfigError::Validation(format!(
                "cache_dir and image_dir resolve to the same directory: {}",
                images.display()
            )));
        }
        if cache.starts_with(&images) || images.starts_with(&cache) {
            return Err(ConfigError::Validation(
                "cache_dir and image_dir must not be nested in each other".into(),
            ));
        }
        Ok(())
    }
}

fn is_set(path: &Path) -> bool {
    !path.as_os_str().is_empty()
}

/// Output encoding and request limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderingConfig {
    /// JPEG quality (1 = worst, 100 = best).
    pub jpeg_quality: u32,
    /// Largest width or height a request may ask for, or a rendition may
    /// end up with once a missing edge is derived from the aspect ratio.
    pub max_dimension: u32,
    /// Largest blur sigma a request may ask for.
    pub max_blur: f64,
}

impl Default for RenderingConfig {
    fn default() -> Self {
        let limits = Limits::default();
        Self {
            jpeg_quality: 75,
            max_dimension: limits.max_dimension,
            max_blur: limits.max_blur,
        }
    }
}

impl RenderingConfig {
    pub fn limits(&self) -> Limits {
        Limits {
            max_dimension: self.max_dimension,
            max_blur: self.max_blur,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel warm-up workers.
    /// When absent or null, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Values given on the command line. Unset fields leave the config alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub image_dir: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub cert_file: Option<PathBuf>,
    pub cert_key_file: Option<PathBuf>,
}

impl Overrides {
    /// The overrides as a sparse TOML table, ready for [`merge_toml`].
    pub fn to_toml(&self) -> toml::Value {
        let mut table = toml::Table::new();
        let paths = [
            ("image_dir", &self.image_dir),
            ("cache_dir", &self.cache_dir),
            ("cert_file", &self.cert_file),
            ("cert_key_file", &self.cert_key_file),
        ];
        for (key, path) in paths {
            if let Some(path) = path {
                table.insert(
                    key.into(),
                    toml::Value::String(path.to_string_lossy().into_owned()),
                );
            }
        }
        if let Some(port) = self.port {
            table.insert("port".into(), toml::Value::Integer(i64::from(port)));
        }
        if let Some(level) = &self.log_level {
            table.insert("log_level".into(), toml::Value::String(level.clone()));
        }
        toml::Value::Table(table)
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(ServiceConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
pub fn load_raw_config(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Merge overlays onto a base value in order, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlays: impl IntoIterator<Item = toml::Value>,
) -> Result<ServiceConfig, ConfigError> {
    let merged = overlays.into_iter().fold(base, merge_toml);
    let config: ServiceConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the effective config: stock defaults, then the config file (if
/// any), then command-line overrides.
pub fn load_config(
    path: Option<&Path>,
    overrides: &Overrides,
) -> Result<ServiceConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let file = path.map(load_raw_config).transpose()?;
    resolve_config(base, file.into_iter().chain([overrides.to_toml()]))
}

/// Returns a fully-commented stock config with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# picserve Configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Command-line flags (--image-dir, --cache-dir, --port, ...) override
# the values in this file. Unknown keys will cause an error.

# Directory of source images. Scanned recursively for .jpg, .jpeg and .png.
image_dir = "photos"

# Directory for cached renditions. Leave empty to disable caching.
# Must not be the same as, or nested in, image_dir.
cache_dir = ""

# Port to listen on.
port = 8080

# Log verbosity: off, error, warn, info, debug, trace.
# The RUST_LOG environment variable takes precedence when set.
log_level = "info"

# TLS certificate and private key (PEM). Set both to serve HTTPS.
cert_file = ""
cert_key_file = ""

# ---------------------------------------------------------------------------
# Rendering
# ---------------------------------------------------------------------------
[rendering]
# JPEG quality of served images (1 = worst, 100 = best).
jpeg_quality = 75

# Largest width or height a request may ask for. Also bounds an edge
# derived from the aspect ratio (e.g. /5000 on a very tall image).
max_dimension = 5000

# Largest blur sigma a request may ask for (at most 1000).
max_blur = 100.0

# ---------------------------------------------------------------------------
# HTTP server
# ---------------------------------------------------------------------------
[server]
# Requests taking longer than this are answered with 408.
request_timeout_secs = 30

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers for `picserve warm`.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
