//! LessonBell configuration system.
//!
//! Built once at startup (defaults → optional TOML file → environment) and
//! passed by reference afterwards. Nothing below `main` reads the environment.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{LessonBellError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub reminder: ReminderConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl NotifierConfig {
    /// Load from `path` (or the default path when present), then apply the
    /// process environment, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load_from(p)?,
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::load_from(&default)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a specific TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LessonBellError::Config(format!("Failed to read config: {e}")))?;
        toml::from_str(&content)
            .map_err(|e| LessonBellError::Config(format!("Failed to parse config: {e}")))
    }

    /// Defaults overlaid with whatever `lookup` yields. Tests use this instead
    /// of touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_env(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Default config path (~/.lessonbell/config.toml).
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// LessonBell home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".lessonbell")
    }

    /// Overlay environment-style variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("STORE_URI") {
            self.store.uri = v;
        }
        if let Some(v) = get("DB_NAME") {
            self.store.database = v;
        }
        if let Some(v) = get("COLLECTION") {
            self.store.collection = v;
        }

        if let Some(v) = get("MAIL_TRANSPORT") {
            self.mail.transport = match v.to_lowercase().as_str() {
                "sendgrid" => MailTransport::SendGrid,
                "smtp" => MailTransport::Smtp,
                other => {
                    return Err(LessonBellError::Config(format!(
                        "Unknown MAIL_TRANSPORT '{other}' (expected sendgrid or smtp)"
                    )));
                }
            };
        }
        if let Some(v) = get("SENDGRID_API_KEY") {
            self.mail.api_key = v;
        }
        if let Some(v) = get("MAIL_FROM").or_else(|| get("SENDGRID_FROM")) {
            self.mail.from = v;
        }
        if let Some(v) = get("NOTIFY_RECIPIENTS") {
            self.mail.recipients = split_list(&v);
        }
        if let Some(v) = get("SMTP_HOST") {
            self.mail.smtp_host = v;
        }
        if let Some(v) = get("SMTP_PORT") {
            self.mail.smtp_port = parse_number("SMTP_PORT", &v)?;
        }
        if let Some(v) = get("SMTP_USERNAME") {
            self.mail.smtp_username = v;
        }
        if let Some(v) = get("SMTP_PASSWORD") {
            self.mail.smtp_password = v;
        }
        if let Some(v) = get("MAIL_TIMEOUT_SECS") {
            self.mail.timeout_secs = parse_number("MAIL_TIMEOUT_SECS", &v)?;
        }

        if let Some(v) = get("NOTIFY_TIMEZONE") {
            self.reminder.timezone = v;
        }
        if let Some(v) = get("NOTIFY_OFFSET_DAYS") {
            self.reminder.offset_days = parse_number("NOTIFY_OFFSET_DAYS", &v)?;
        }
        if let Some(v) = get("NOTIFY_SCHEDULE") {
            self.reminder.schedule = v;
        }
        if let Some(v) = get("NOTIFY_MAX_CONCURRENT") {
            self.reminder.max_concurrent = parse_number("NOTIFY_MAX_CONCURRENT", &v)?;
        }

        if let Some(v) = get("HOST") {
            self.gateway.host = v;
        }
        if let Some(v) = get("PORT") {
            self.gateway.port = parse_number("PORT", &v)?;
        }
        Ok(())
    }

    /// Check everything the batch needs. Mail credentials are checked when the
    /// mailer is built, so read-only commands work without them.
    pub fn validate(&self) -> Result<()> {
        self.reminder.tz()?;
        if self.reminder.max_concurrent == 0 {
            return Err(LessonBellError::Config(
                "max_concurrent must be at least 1".into(),
            ));
        }
        if self.store.uri.trim().is_empty() {
            return Err(LessonBellError::Config("store uri is empty".into()));
        }
        check_identifier("database", &self.store.database)?;
        check_identifier("collection", &self.store.collection)?;
        Ok(())
    }
}

/// Record store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite file path (`:memory:` allowed), or a `.json` document file.
    #[serde(default = "default_store_uri")]
    pub uri: String,
    /// Schema name the SQLite file is attached as.
    #[serde(default = "default_database")]
    pub database: String,
    /// Table (or document set) holding the lessons.
    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_store_uri() -> String { "~/.lessonbell/lessons.db".into() }
fn default_database() -> String { "lessonlearned".into() }
fn default_collection() -> String { "lessons".into() }

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: default_store_uri(),
            database: default_database(),
            collection: default_collection(),
        }
    }
}

impl StoreConfig {
    /// The uri with `~` expanded.
    pub fn resolved_uri(&self) -> String {
        shellexpand::tilde(&self.uri).to_string()
    }

    /// Whether the uri points at a JSON document file rather than SQLite.
    pub fn is_json_file(&self) -> bool {
        self.uri.to_lowercase().ends_with(".json")
    }
}

/// Which transport delivers mail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailTransport {
    #[serde(rename = "sendgrid")]
    SendGrid,
    Smtp,
}

/// Outbound mail settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default = "default_transport")]
    pub transport: MailTransport,
    /// SendGrid API key.
    #[serde(default)]
    pub api_key: String,
    /// Sender address.
    #[serde(default)]
    pub from: String,
    /// Every notification goes to all of these.
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: String,
    #[serde(default)]
    pub smtp_password: String,
    #[serde(default = "default_mail_timeout")]
    pub timeout_secs: u64,
}

fn default_transport() -> MailTransport { MailTransport::SendGrid }
fn default_smtp_port() -> u16 { 587 }
fn default_mail_timeout() -> u64 { 30 }

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            api_key: String::new(),
            from: String::new(),
            recipients: Vec::new(),
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
            smtp_password: String::new(),
            timeout_secs: default_mail_timeout(),
        }
    }
}

/// Deadline reminder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    /// IANA timezone the Timeline dates and "today" are read in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Remind when the deadline is exactly this many days away.
    #[serde(default = "default_offset_days")]
    pub offset_days: u32,
    /// Daily schedule for `serve --with-scheduler`, in local time.
    #[serde(default = "default_schedule")]
    pub schedule: String,
    /// Parallel sends within one batch. 1 = sequential.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_timezone() -> String { "Asia/Riyadh".into() }
fn default_offset_days() -> u32 { 3 }
fn default_schedule() -> String { "0 8 * * *".into() }
fn default_max_concurrent() -> usize { 1 }

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            offset_days: default_offset_days(),
            schedule: default_schedule(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl ReminderConfig {
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| LessonBellError::Config(format!("Invalid timezone: {}", self.timezone)))
    }
}

/// Trigger endpoint listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String { "0.0.0.0".into() }
fn default_port() -> u16 { 3001 }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| LessonBellError::Config(format!("{key} must be a number, got '{raw}'")))
}

fn check_identifier(what: &str, value: &str) -> Result<()> {
    let ok = !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(LessonBellError::Config(format!(
            "{what} '{value}' may only contain letters, digits and '_'"
        )))
    }
}
