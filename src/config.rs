//! Runtime settings and their layering.
//!
//! Priority, lowest first: built-in defaults, the config file, environment
//! variables, then CLI flags (applied by the binary).
//!
//! The config file uses a flat `key = value` syntax: double-quoted strings,
//! integers, decimals and `true`/`false`, with `#` comments.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::download::{ClientOptions, EngineSettings, Layout, UnresolvedTypePolicy};

/// Catalog page listing the exam annales.
pub const DEFAULT_BASE_URL: &str = "https://eduscol.education.fr/711/preparer-le-diplome-national-du-brevet-dnb-avec-les-sujets-des-annales";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A config file line could not be parsed.
    #[error("invalid config syntax on line {line}: {message}")]
    Syntax { line: usize, message: String },

    /// An environment variable held an unparsable value.
    #[error("invalid value for environment variable {name}: '{value}'")]
    Env { name: String, value: String },

    /// A value parsed but is outside its accepted range.
    #[error("invalid config value for `{key}`: {message}")]
    Invalid { key: String, message: String },
}

impl ConfigError {
    fn syntax(line: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            line,
            message: message.into(),
        }
    }

    fn invalid(key: &str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Effective settings for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub base_url: String,
    pub output_dir: PathBuf,
    /// Where download history and failure lists are written.
    pub metadata_dir: PathBuf,
    pub report_path: PathBuf,
    /// Minimum spacing between request starts.
    pub request_delay: Duration,
    pub download_timeout: Duration,
    pub max_retries: u32,
    pub backoff_base: f64,
    pub workers: usize,
    pub verify_tls: bool,
    pub headless: bool,
    /// Bound on waiting for the catalog table to render.
    pub browser_timeout: Duration,
    /// Pause after each pagination click.
    pub page_load_wait: Duration,
    pub organize_by_year: bool,
    pub organize_by_subject: bool,
    /// Delete downloads whose type cannot be determined instead of keeping them as `.bin`.
    pub reject_unresolved_types: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            output_dir: PathBuf::from("data/raw"),
            metadata_dir: PathBuf::from("data/metadata"),
            report_path: PathBuf::from("validation_report.csv"),
            request_delay: Duration::from_millis(1500),
            download_timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff_base: 2.0,
            workers: 5,
            verify_tls: true,
            headless: true,
            browser_timeout: Duration::from_secs(20),
            page_load_wait: Duration::from_secs(2),
            organize_by_year: true,
            organize_by_subject: true,
            reject_unresolved_types: false,
        }
    }
}

impl Settings {
    /// Defaults, then the config file, then the process environment.
    ///
    /// An explicit `config_path` must exist; the default path is used only
    /// when present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file or an environment variable is
    /// invalid, or if the merged settings fail validation.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match config_path {
            Some(path) => Some(path.to_path_buf()),
            None => resolve_default_config_path().filter(|path| path.exists()),
        };

        let mut settings = Self::default();
        if let Some(path) = path.as_deref() {
            settings.apply_file(&load_file_config(path)?);
            debug!(path = %path.display(), "loaded config file");
        }
        settings.apply_env(|name| env::var(name).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Overlays values present in `file`.
    pub fn apply_file(&mut self, file: &FileConfig) {
        let FileConfig {
            base_url,
            output_dir,
            metadata_dir,
            report_path,
            request_delay_ms,
            download_timeout_secs,
            max_retries,
            backoff_base,
            workers,
            verify_tls,
            headless,
            browser_timeout_secs,
            page_load_wait_ms,
            organize_by_year,
            organize_by_subject,
            reject_unresolved_types,
        } = file.clone();

        if let Some(v) = base_url {
            self.base_url = v;
        }
        if let Some(v) = output_dir {
            self.output_dir = v;
        }
        if let Some(v) = metadata_dir {
            self.metadata_dir = v;
        }
        if let Some(v) = report_path {
            self.report_path = v;
        }
        if let Some(v) = request_delay_ms {
            self.request_delay = Duration::from_millis(v);
        }
        if let Some(v) = download_timeout_secs {
            self.download_timeout = Duration::from_secs(v);
        }
        if let Some(v) = max_retries {
            self.max_retries = v;
        }
        if let Some(v) = backoff_base {
            self.backoff_base = v;
        }
        if let Some(v) = workers {
            self.workers = v;
        }
        if let Some(v) = verify_tls {
            self.verify_tls = v;
        }
        if let Some(v) = headless {
            self.headless = v;
        }
        if let Some(v) = browser_timeout_secs {
            self.browser_timeout = Duration::from_secs(v);
        }
        if let Some(v) = page_load_wait_ms {
            self.page_load_wait = Duration::from_millis(v);
        }
        if let Some(v) = organize_by_year {
            self.organize_by_year = v;
        }
        if let Some(v) = organize_by_subject {
            self.organize_by_subject = v;
        }
        if let Some(v) = reject_unresolved_types {
            self.reject_unresolved_types = v;
        }
    }

    /// Overlays environment variables read through `lookup`.
    ///
    /// Boolean variables are true only for a case-insensitive `true`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Env`] for a numeric variable that does not parse.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("REQUEST_DELAY") {
            self.request_delay = env_seconds("REQUEST_DELAY", &v)?;
        }
        if let Some(v) = get("DOWNLOAD_TIMEOUT") {
            self.download_timeout = env_seconds("DOWNLOAD_TIMEOUT", &v)?;
        }
        if let Some(v) = get("MAX_RETRIES") {
            self.max_retries = env_number("MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("RETRY_BACKOFF_FACTOR") {
            self.backoff_base = env_number("RETRY_BACKOFF_FACTOR", &v)?;
        }
        if let Some(v) = get("MAX_WORKERS") {
            self.workers = env_number("MAX_WORKERS", &v)?;
        }
        if let Some(v) = get("VERIFY_SSL") {
            self.verify_tls = env_flag(&v);
        }
        if let Some(v) = get("SELENIUM_HEADLESS") {
            self.headless = env_flag(&v);
        }
        if let Some(v) = get("SELENIUM_TIMEOUT") {
            self.browser_timeout = env_seconds("SELENIUM_TIMEOUT", &v)?;
        }
        if let Some(v) = get("SELENIUM_PAGE_LOAD_WAIT") {
            self.page_load_wait = env_seconds("SELENIUM_PAGE_LOAD_WAIT", &v)?;
        }
        if let Some(v) = get("ORGANIZE_BY_YEAR") {
            self.organize_by_year = env_flag(&v);
        }
        if let Some(v) = get("ORGANIZE_BY_SUBJECT") {
            self.organize_by_subject = env_flag(&v);
        }
        Ok(())
    }

    /// Checks every value against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.base_url)
            .map_err(|e| ConfigError::invalid("base_url", format!("{}: {e}", self.base_url)))?;

        if !(1..=100).contains(&self.workers) {
            return Err(ConfigError::invalid(
                "workers",
                format!("{}. Expected range: 1..=100", self.workers),
            ));
        }
        if !(1..=10).contains(&self.max_retries) {
            return Err(ConfigError::invalid(
                "max_retries",
                format!("{}. Expected range: 1..=10", self.max_retries),
            ));
        }
        if !(1.0..=10.0).contains(&self.backoff_base) {
            return Err(ConfigError::invalid(
                "backoff_base",
                format!("{}. Expected range: 1.0..=10.0", self.backoff_base),
            ));
        }
        validate_duration("request_delay", self.request_delay, Duration::ZERO, 60)?;
        validate_duration(
            "download_timeout",
            self.download_timeout,
            Duration::from_secs(1),
            3600,
        )?;
        validate_duration(
            "browser_timeout",
            self.browser_timeout,
            Duration::from_secs(1),
            300,
        )?;
        validate_duration("page_load_wait", self.page_load_wait, Duration::ZERO, 60)?;
        Ok(())
    }

    #[must_use]
    pub fn layout(&self) -> Layout {
        Layout {
            by_year: self.organize_by_year,
            by_subject: self.organize_by_subject,
        }
    }

    #[must_use]
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            timeout: self.download_timeout,
            verify_tls: self.verify_tls,
        }
    }

    #[must_use]
    pub fn engine_settings(&self) -> EngineSettings {
        let mut engine = EngineSettings::new(&self.output_dir);
        engine.layout = self.layout();
        engine.unresolved_type = if self.reject_unresolved_types {
            UnresolvedTypePolicy::Reject
        } else {
            UnresolvedTypePolicy::KeepGeneric
        };
        engine
    }

    #[must_use]
    pub fn history_path(&self) -> PathBuf {
        self.metadata_dir.join("downloads_metadata.json")
    }

    #[must_use]
    pub fn failures_path(&self) -> PathBuf {
        self.metadata_dir.join("failed_downloads.json")
    }
}

fn validate_duration(
    key: &str,
    value: Duration,
    min: Duration,
    max_secs: u64,
) -> Result<(), ConfigError> {
    let max = Duration::from_secs(max_secs);
    if value < min || value > max {
        return Err(ConfigError::invalid(
            key,
            format!(
                "{:.3}s. Expected range: {:.3}s..={max_secs}s",
                value.as_secs_f64(),
                min.as_secs_f64()
            ),
        ));
    }
    Ok(())
}

fn env_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

fn env_error(name: &str, value: &str) -> ConfigError {
    ConfigError::Env {
        name: name.to_string(),
        value: value.to_string(),
    }
}

fn env_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| env_error(name, value))
}

/// Seconds, possibly fractional (`1.5`).
fn env_seconds(name: &str, value: &str) -> Result<Duration, ConfigError> {
    let seconds: f64 = env_number(name, value)?;
    Duration::try_from_secs_f64(seconds).map_err(|_| env_error(name, value))
}

// ==================== Config file ====================

/// Values present in the config file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileConfig {
    pub base_url: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub metadata_dir: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
    pub request_delay_ms: Option<u64>,
    pub download_timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub backoff_base: Option<f64>,
    pub workers: Option<usize>,
    pub verify_tls: Option<bool>,
    pub headless: Option<bool>,
    pub browser_timeout_secs: Option<u64>,
    pub page_load_wait_ms: Option<u64>,
    pub organize_by_year: Option<bool>,
    pub organize_by_subject: Option<bool>,
    pub reject_unresolved_types: Option<bool>,
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/annales/config.toml`
/// 2. `$HOME/.config/annales/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("annales")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("annales")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Reads and parses a config file.
///
/// # Errors
///
/// Returns [`ConfigError::Read`] if the file cannot be read, or the parse
/// error of [`parse_config_str`].
pub fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config_str(&raw)
}

/// Parses config file text.
///
/// # Errors
///
/// Returns [`ConfigError::Syntax`] for a malformed line, a mistyped value or
/// an unknown key.
pub fn parse_config_str(raw: &str) -> Result<FileConfig, ConfigError> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_no = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            return Err(ConfigError::syntax(line_no, "expected key = value"));
        };
        let key = raw_key.trim();
        let value = raw_value.trim();
        let bad = |message: &str| ConfigError::syntax(line_no, format!("`{key}`: {message}"));

        match key {
            "base_url" => cfg.base_url = Some(parse_string_literal(value).map_err(bad)?),
            "output_dir" => {
                cfg.output_dir = Some(PathBuf::from(parse_string_literal(value).map_err(bad)?));
            }
            "metadata_dir" => {
                cfg.metadata_dir = Some(PathBuf::from(parse_string_literal(value).map_err(bad)?));
            }
            "report_path" => {
                cfg.report_path = Some(PathBuf::from(parse_string_literal(value).map_err(bad)?));
            }
            "request_delay_ms" => cfg.request_delay_ms = Some(parse_integer(value).map_err(bad)?),
            "download_timeout_secs" => {
                cfg.download_timeout_secs = Some(parse_integer(value).map_err(bad)?);
            }
            "max_retries" => cfg.max_retries = Some(parse_integer(value).map_err(bad)?),
            "backoff_base" => cfg.backoff_base = Some(parse_decimal(value).map_err(bad)?),
            "workers" => cfg.workers = Some(parse_integer(value).map_err(bad)?),
            "verify_tls" => cfg.verify_tls = Some(parse_boolean(value).map_err(bad)?),
            "headless" => cfg.headless = Some(parse_boolean(value).map_err(bad)?),
            "browser_timeout_secs" => {
                cfg.browser_timeout_secs = Some(parse_integer(value).map_err(bad)?);
            }
            "page_load_wait_ms" => cfg.page_load_wait_ms = Some(parse_integer(value).map_err(bad)?),
            "organize_by_year" => cfg.organize_by_year = Some(parse_boolean(value).map_err(bad)?),
            "organize_by_subject" => {
                cfg.organize_by_subject = Some(parse_boolean(value).map_err(bad)?);
            }
            "reject_unresolved_types" => {
                cfg.reject_unresolved_types = Some(parse_boolean(value).map_err(bad)?);
            }
            unknown => {
                return Err(ConfigError::syntax(
                    line_no,
                    format!("unknown configuration key '{unknown}'"),
                ));
            }
        }
    }
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String, &'static str> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        return Err("expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer<T: std::str::FromStr>(raw_value: &str) -> Result<T, &'static str> {
    let token = raw_value.trim();
    if token.is_empty() {
        return Err("expected integer value");
    }
    if token.starts_with('-') {
        return Err("expected non-negative integer");
    }
    token.parse().map_err(|_| "expected integer value in range")
}

fn parse_decimal(raw_value: &str) -> Result<f64, &'static str> {
    raw_value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or("expected decimal value")
}

fn parse_boolean(raw_value: &str) -> Result<bool, &'static str> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err("expected boolean value (true or false)"),
    }
}
