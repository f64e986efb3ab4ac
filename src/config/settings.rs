//! Application settings and paths.

use crate::error::{ConfigError, ConfigResult};
use crate::scanner::{DriverOptions, ScanStrategy};
use crate::types::{PortError, PortSpec, TargetSpec};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "PORTWATCH_CONFIG";

/// Application directory paths following the XDG Base Directory layout.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Configuration directory (~/.config/portwatch)
    pub config_dir: PathBuf,
    /// Data directory (~/.local/share/portwatch)
    pub data_dir: PathBuf,
}

impl Paths {
    /// Resolve the per-user directories. Nothing is created here.
    pub fn discover() -> ConfigResult<Self> {
        let project =
            ProjectDirs::from("", "", "portwatch").ok_or(ConfigError::DirectoryNotFound)?;

        Ok(Self {
            config_dir: project.config_dir().to_path_buf(),
            data_dir: project.data_dir().to_path_buf(),
        })
    }

    /// Get the path to the default config file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Get the path to the default database.
    pub fn database_file(&self) -> PathBuf {
        self.data_dir.join("portwatch.db")
    }
}

/// Parse a human-readable duration such as `"90s"` or `"1h 30m"`.
pub fn parse_duration(field: &'static str, value: &str) -> ConfigResult<Duration> {
    humantime::parse_duration(value.trim()).map_err(|source| ConfigError::InvalidDuration {
        field,
        value: value.to_string(),
        source,
    })
}

mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }
}

mod optional_duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_str(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => humantime::parse_duration(s)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// How targets are grouped into masscan invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    /// One invocation for every target.
    #[default]
    Batched,
    /// One invocation per target.
    PerTarget,
}

/// The `[masscan]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MasscanSettings {
    /// Path or name of the masscan binary.
    pub binary: PathBuf,
    /// Packets per second.
    pub rate: u32,
    pub ports: PortSpec,
    /// Network interface passed with `-e`.
    pub interface: Option<String>,
    pub strategy: StrategyKind,
    /// Concurrent invocations for the per-target strategy.
    pub max_parallel: usize,
    /// Upper bound on one scan; unset means no limit.
    #[serde(with = "optional_duration_str")]
    pub scan_timeout: Option<Duration>,
    /// Time allowed for a killed process to exit.
    #[serde(with = "duration_str")]
    pub kill_grace: Duration,
}

impl Default for MasscanSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("masscan"),
            rate: 1000,
            ports: "1-1000".parse().unwrap_or_default(),
            interface: None,
            strategy: StrategyKind::Batched,
            max_parallel: 4,
            scan_timeout: None,
            kill_grace: Duration::from_secs(5),
        }
    }
}

impl MasscanSettings {
    pub fn scan_strategy(&self) -> ScanStrategy {
        match self.strategy {
            StrategyKind::Batched => ScanStrategy::Batched,
            StrategyKind::PerTarget => ScanStrategy::PerTarget {
                max_parallel: self.max_parallel,
            },
        }
    }

    /// Driver tunables derived from this section.
    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            strategy: self.scan_strategy(),
            scan_timeout: self.scan_timeout,
            ..DriverOptions::default()
        }
    }
}

/// The `[database]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// SQLite file; defaults to the XDG data directory.
    pub path: Option<PathBuf>,
}

/// The `[scheduler]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Repeat scans on an interval instead of running once.
    pub enabled: bool,
    #[serde(with = "duration_str")]
    pub interval: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(60 * 60),
        }
    }
}

/// The `[telegram]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramSettings {
    pub enabled: bool,
    /// Bot token; `TELEGRAM_TOKEN` overrides it.
    pub token: String,
    /// Destination chat; `TELEGRAM_CHAT_ID` overrides it.
    pub chat_id: i64,
}

impl TelegramSettings {
    /// Whether notifications should actually be sent.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.token.is_empty()
    }
}

/// How the mail connection is secured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SmtpSecurity {
    /// Plain connection upgraded with STARTTLS.
    #[default]
    Starttls,
    /// TLS from the first byte.
    Tls,
    /// No encryption. Only for local relays.
    None,
}

/// The `[smtp]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpSettings {
    pub enabled: bool,
    /// `SMTP_HOST` overrides it.
    pub host: String,
    pub port: u16,
    pub security: SmtpSecurity,
    /// Login user; no authentication when empty.
    pub user: String,
    pub password: String,
    pub from: String,
    /// Recipients; `SMTP_TO` takes a comma-separated list.
    pub to: Vec<String>,
    pub subject: String,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: 587,
            security: SmtpSecurity::Starttls,
            user: String::new(),
            password: String::new(),
            from: String::new(),
            to: Vec::new(),
            subject: "Port Scanner Alert".to_string(),
        }
    }
}

impl SmtpSettings {
    /// Whether mail should actually be sent.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.host.is_empty()
    }
}

/// Application-wide settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Hosts, CIDR blocks and ranges handed to the scanner.
    pub targets: Vec<TargetSpec>,
    pub masscan: MasscanSettings,
    pub database: DatabaseSettings,
    pub scheduler: SchedulerSettings,
    pub telegram: TelegramSettings,
    pub smtp: SmtpSettings,
}

impl Settings {
    /// Load settings, apply environment overrides and validate.
    ///
    /// The file is `explicit` if given, else `$PORTWATCH_CONFIG`, else
    /// `config.toml` in the XDG config directory. A missing default file
    /// yields default settings; a missing explicit file is an error.
    pub fn load(explicit: Option<&Path>) -> ConfigResult<Self> {
        if let Some(e) = dotenv_problem(dotenvy::dotenv()) {
            warn!(error = %e, "ignoring unreadable .env file");
        }

        let from_env = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);
        let mut settings = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::load_from(&path)?,
            None => {
                let path = Paths::discover()?.config_file();
                if path.exists() {
                    Self::load_from(&path)?
                } else {
                    debug!(path = %path.display(), "no config file, using defaults");
                    Self::default()
                }
            }
        };

        settings.apply_env(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a specific file without overrides or validation.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml(&content, path)
    }

    /// Parse settings from TOML text; `origin` is used in error messages.
    pub fn from_toml(content: &str, origin: &Path) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|source| ConfigError::InvalidFormat {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Override secrets from environment variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup("TELEGRAM_TOKEN").filter(|t| !t.is_empty()) {
            self.telegram.token = token;
        }

        if let Some(raw) = lookup("TELEGRAM_CHAT_ID").filter(|c| !c.is_empty()) {
            match raw.trim().parse::<i64>() {
                Ok(chat_id) => self.telegram.chat_id = chat_id,
                Err(_) => warn!(value = %raw, "ignoring non-numeric TELEGRAM_CHAT_ID"),
            }
        }

        let text = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(host) = text("SMTP_HOST") {
            self.smtp.host = host;
        }
        if let Some(raw) = text("SMTP_PORT") {
            match raw.trim().parse::<u16>() {
                Ok(port) => self.smtp.port = port,
                Err(_) => warn!(value = %raw, "ignoring invalid SMTP_PORT"),
            }
        }
        if let Some(user) = text("SMTP_USER") {
            self.smtp.user = user;
        }
        if let Some(password) = text("SMTP_PASSWORD") {
            self.smtp.password = password;
        }
        if let Some(from) = text("SMTP_FROM") {
            self.smtp.from = from;
        }
        if let Some(to) = text("SMTP_TO") {
            self.smtp.to = to
                .split(',')
                .map(str::trim)
                .filter(|addr| !addr.is_empty())
                .map(str::to_string)
                .collect();
        }
    }

    /// Reject settings that can never produce a working run.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.masscan.ports.is_empty() {
            return Err(PortError::Empty.into());
        }
        if self.masscan.rate == 0 {
            return Err(ConfigError::Invalid(
                "masscan.rate must be greater than zero".to_string(),
            ));
        }
        if self.masscan.strategy == StrategyKind::PerTarget && self.masscan.max_parallel == 0 {
            return Err(ConfigError::Invalid(
                "masscan.max_parallel must be at least 1".to_string(),
            ));
        }
        if self.scheduler.interval.is_zero() {
            return Err(ConfigError::Invalid(
                "scheduler.interval must be greater than zero".to_string(),
            ));
        }
        if self.telegram.enabled && (self.telegram.token.is_empty() || self.telegram.chat_id == 0) {
            return Err(ConfigError::Invalid(
                "telegram is enabled but token or chat_id is missing".to_string(),
            ));
        }
        if self.smtp.enabled
            && (self.smtp.host.is_empty() || self.smtp.from.is_empty() || self.smtp.to.is_empty())
        {
            return Err(ConfigError::Invalid(
                "smtp is enabled but host, from or to is missing".to_string(),
            ));
        }
        if self.targets.is_empty() {
            warn!("no scan targets configured");
        }
        Ok(())
    }

    /// Where the database lives.
    pub fn database_path(&self) -> ConfigResult<PathBuf> {
        match &self.database.path {
            Some(path) => Ok(path.clone()),
            None => Ok(Paths::discover()?.database_file()),
        }
    }
}

/// The `.env` load error worth reporting, if any. A missing file is normal.
fn dotenv_problem<T>(result: dotenvy::Result<T>) -> Option<dotenvy::Error> {
    match result {
        Ok(_) => None,
        Err(e) if e.not_found() => None,
        Err(e) => Some(e),
    }
}
