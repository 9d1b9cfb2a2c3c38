use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use toml::{Table, Value};

use crate::notify::Severity;

const DEFAULT_TARGET_URL: &str = "http://127.0.0.1";
const DEFAULT_PROBE_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 600_000;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RESTART_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_SMTP_PORT: u16 = 25;

#[cfg(target_os = "windows")]
const DEFAULT_SERVICE_NAME: &str = "Apache2.4";
#[cfg(not(target_os = "windows"))]
const DEFAULT_SERVICE_NAME: &str = "apache2";

/// Watchdog configuration. Loaded once at startup, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchConfig {
    pub target_url: String,
    pub probe_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub max_retries: u32,
    pub service_name: String,
    pub restart_timeout_ms: u64,
    pub email_severity_threshold: Severity,
    pub log_severity_threshold: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    pub smtp: SmtpConfig,
}

/// SMTP relay used for mail notifications. Mail is disabled unless
/// `server`, `from` and `to` are all set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SmtpConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            server: None,
            port: DEFAULT_SMTP_PORT,
            from: None,
            to: None,
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            target_url: DEFAULT_TARGET_URL.into(),
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            service_name: DEFAULT_SERVICE_NAME.into(),
            restart_timeout_ms: DEFAULT_RESTART_TIMEOUT_MS,
            email_severity_threshold: Severity::Critical,
            log_severity_threshold: Severity::Notice,
            log_file: None,
            smtp: SmtpConfig::default(),
        }
    }
}

impl WatchConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn restart_timeout(&self) -> Duration {
        Duration::from_millis(self.restart_timeout_ms)
    }

    /// Parse a TOML document, falling back to the default for every field
    /// that is missing or invalid. Never fails.
    pub fn from_toml_str(text: &str) -> LoadedConfig {
        let table = match toml::from_str::<Table>(text) {
            Ok(table) => table,
            Err(e) => {
                return LoadedConfig::defaults_with(format!(
                    "Configuration could not be parsed ({}); proceeding with defaults.",
                    e.message()
                ));
            }
        };

        let defaults = WatchConfig::default();
        let mut fields = FieldReader::new(&table, "");
        let mut config = WatchConfig {
            target_url: fields.string("target_url", defaults.target_url),
            probe_timeout_ms: fields.positive_millis("probe_timeout_ms", defaults.probe_timeout_ms),
            poll_interval_ms: fields.positive_millis("poll_interval_ms", defaults.poll_interval_ms),
            max_retries: fields.retries("max_retries", defaults.max_retries),
            service_name: fields.string("service_name", defaults.service_name),
            restart_timeout_ms: fields
                .positive_millis("restart_timeout_ms", defaults.restart_timeout_ms),
            email_severity_threshold: fields
                .severity("email_severity_threshold", defaults.email_severity_threshold),
            log_severity_threshold: fields
                .severity("log_severity_threshold", defaults.log_severity_threshold),
            log_file: fields.path("log_file"),
            smtp: SmtpConfig::default(),
        };
        fields.reject_unknown(&[
            "target_url",
            "probe_timeout_ms",
            "poll_interval_ms",
            "max_retries",
            "service_name",
            "restart_timeout_ms",
            "email_severity_threshold",
            "log_severity_threshold",
            "log_file",
            "smtp",
        ]);
        let mut warnings = fields.into_warnings();

        match table.get("smtp") {
            None => {}
            Some(Value::Table(smtp)) => {
                let mut fields = FieldReader::new(smtp, "smtp.");
                config.smtp = SmtpConfig {
                    server: fields.optional_string("server"),
                    port: fields.port("port", DEFAULT_SMTP_PORT),
                    from: fields.optional_string("from"),
                    to: fields.optional_string("to"),
                };
                fields.reject_unknown(&["server", "port", "from", "to"]);
                warnings.extend(fields.into_warnings());
            }
            Some(_) => warnings.push("Config key 'smtp' must be a table; mail disabled.".into()),
        }

        LoadedConfig { config, warnings }
    }

    /// Load from disk. A missing or unreadable file yields defaults plus a
    /// warning; this never fails.
    pub fn load(path: &Path) -> LoadedConfig {
        match fs::read_to_string(path) {
            Ok(text) => WatchConfig::from_toml_str(&text),
            Err(e) if e.kind() == ErrorKind::NotFound => LoadedConfig::defaults_with(format!(
                "Configuration file {} not found; proceeding with defaults.",
                path.display()
            )),
            Err(e) => LoadedConfig::defaults_with(format!(
                "Configuration file {} could not be read ({e}); proceeding with defaults.",
                path.display()
            )),
        }
    }
}

/// A loaded configuration together with the problems found while loading it.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: WatchConfig,
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    fn defaults_with(warning: String) -> Self {
        Self {
            config: WatchConfig::default(),
            warnings: vec![warning],
        }
    }
}

/// Reads individual keys out of a TOML table, substituting defaults and
/// collecting a warning for every value it had to reject.
struct FieldReader<'a> {
    table: &'a Table,
    prefix: &'static str,
    warnings: Vec<String>,
}

impl<'a> FieldReader<'a> {
    fn new(table: &'a Table, prefix: &'static str) -> Self {
        Self {
            table,
            prefix,
            warnings: Vec::new(),
        }
    }

    fn into_warnings(self) -> Vec<String> {
        self.warnings
    }

    fn reject<T: std::fmt::Debug>(&mut self, key: &str, value: &Value, default: T) -> T {
        self.warnings.push(format!(
            "Invalid value {value} for config key '{}{key}'; using default {default:?}.",
            self.prefix
        ));
        default
    }

    fn reject_unknown(&mut self, known: &[&str]) {
        for key in self.table.keys() {
            if !known.contains(&key.as_str()) {
                self.warnings
                    .push(format!("Unknown config key '{}{key}' ignored.", self.prefix));
            }
        }
    }

    fn string(&mut self, key: &str, default: String) -> String {
        match self.table.get(key) {
            None => default,
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(other) => self.reject(key, other, default),
        }
    }

    fn optional_string(&mut self, key: &str) -> Option<String> {
        match self.table.get(key) {
            None => None,
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(other) => self.reject(key, other, None),
        }
    }

    fn path(&mut self, key: &str) -> Option<PathBuf> {
        self.optional_string(key).map(PathBuf::from)
    }

    /// Integer value, also accepting a quoted integer.
    fn integer(value: &Value) -> Option<i64> {
        match value {
            Value::Integer(i) => Some(*i),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn positive_millis(&mut self, key: &str, default: u64) -> u64 {
        let Some(value) = self.table.get(key) else {
            return default;
        };
        match Self::integer(value).and_then(|i| u64::try_from(i).ok()) {
            Some(ms) if ms > 0 => ms,
            _ => self.reject(key, value, default),
        }
    }

    fn retries(&mut self, key: &str, default: u32) -> u32 {
        let Some(value) = self.table.get(key) else {
            return default;
        };
        match Self::integer(value).and_then(|i| u32::try_from(i).ok()) {
            Some(n) if n >= 1 => n,
            _ => self.reject(key, value, default),
        }
    }

    fn port(&mut self, key: &str, default: u16) -> u16 {
        let Some(value) = self.table.get(key) else {
            return default;
        };
        match Self::integer(value).and_then(|i| u16::try_from(i).ok()) {
            Some(port) if port > 0 => port,
            _ => self.reject(key, value, default),
        }
    }

    fn severity(&mut self, key: &str, default: Severity) -> Severity {
        let Some(value) = self.table.get(key) else {
            return default;
        };
        let parsed = match value {
            Value::Integer(i) => u8::try_from(*i).ok().and_then(Severity::from_level),
            Value::String(s) => s.parse().ok(),
            _ => None,
        };
        match parsed {
            Some(sev) => sev,
            None => self.reject(key, value, default),
        }
    }
}

/// Resolve the configuration path from CLI flags.
pub fn resolve_config_path(explicit: Option<&str>, system: bool) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(PathBuf::from(path));
    }
    if system {
        return Ok(PathBuf::from("/etc/webwatchd/webwatchd.toml"));
    }
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join("webwatchd");
    Ok(config_dir.join("webwatchd.toml"))
}

/// Write a default configuration file. Refuses to overwrite an existing one.
pub fn write_default(path: &Path) -> Result<()> {
    if path.exists() {
        anyhow::bail!("{} already exists; not overwriting", path.display());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }
    let default_toml = toml::to_string_pretty(&WatchConfig::default())
        .context("Failed to serialize default config")?;
    fs::write(path, default_toml).context("Failed to write config file")?;
    Ok(())
}
