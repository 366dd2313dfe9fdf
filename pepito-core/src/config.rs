// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates required values (token, feed URL, icon URL); a missing one is fatal at startup
use crate::paths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub operator: OperatorConfig,
    #[serde(default)]
    pub reminder: ReminderConfig,
    #[serde(default)]
    pub status: StatusConfig,
}

// ─── DiscordConfig ──────────────────────────────────────────────

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub bot_token: String,
}

// Custom Debug impl to redact bot_token
impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("bot_token", &"[REDACTED]")
            .finish()
    }
}

// ─── FeedConfig ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Server-sent-events endpoint of the cat door
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

impl FeedConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

// ─── NotificationConfig ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Name used in titles ("<subject> is out (…)")
    #[serde(default = "default_subject")]
    pub subject: String,
    /// Footer icon shown on every notification
    #[serde(default)]
    pub icon_url: String,
    /// Footer text; defaults to the subject
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer_text: Option<String>,
    #[serde(default = "default_color")]
    pub color: u32,
    /// IANA timezone used to render event times
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            subject: default_subject(),
            icon_url: String::new(),
            footer_text: None,
            color: default_color(),
            timezone: default_timezone(),
        }
    }
}

impl NotificationConfig {
    pub fn footer_text(&self) -> &str {
        self.footer_text.as_deref().unwrap_or(&self.subject)
    }

    pub fn tz(&self) -> Result<chrono_tz::Tz> {
        self.timezone.parse::<chrono_tz::Tz>().map_err(|_| {
            anyhow::anyhow!(
                "Invalid timezone '{}'. Use IANA timezone names like 'Europe/Oslo', 'America/Chicago', 'UTC'",
                self.timezone
            )
        })
    }
}

fn default_subject() -> String {
    "Pépito".to_string()
}

fn default_color() -> u32 {
    0x0099ff
}

fn default_timezone() -> String {
    // Try to detect system timezone, fall back to UTC
    // Always validate that the timezone is parseable by chrono-tz
    if let Ok(tz) = std::env::var("TZ") {
        if tz.parse::<chrono_tz::Tz>().is_ok() {
            return tz;
        }
    }
    // On Unix systems, try to read /etc/localtime symlink
    #[cfg(unix)]
    {
        if let Ok(link) = std::fs::read_link("/etc/localtime") {
            if let Some(tz) = link.to_str() {
                // Extract timezone from path like /usr/share/zoneinfo/Europe/Oslo
                if let Some(pos) = tz.find("zoneinfo/") {
                    let detected = tz[pos + 9..].to_string();
                    if detected.parse::<chrono_tz::Tz>().is_ok() {
                        return detected;
                    }
                }
            }
        }
    }
    "UTC".to_string()
}

// ─── RegistryConfig ─────────────────────────────────────────────

/// State file name used by deployments that kept it in the working directory
pub const LEGACY_REGISTRY_FILE: &str = "channels.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// State file; defaults to ./channels.json when present, else <data dir>/channels.json
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl RegistryConfig {
    pub fn path(&self) -> PathBuf {
        self.resolve(Path::new(LEGACY_REGISTRY_FILE), paths::registry_file())
    }

    /// Configured path, else an existing `legacy` file, else `default`
    fn resolve(&self, legacy: &Path, default: PathBuf) -> PathBuf {
        if let Some(p) = self.path.as_deref() {
            return PathBuf::from(expand_tilde(p));
        }
        if legacy.is_file() {
            tracing::info!(
                path = %legacy.display(),
                "Using registry file from the working directory"
            );
            return legacy.to_path_buf();
        }
        default
    }
}

// ─── OperatorConfig ─────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperatorConfig {
    /// Tenant allowed to broadcast announcements; announcements are disabled when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

// ─── ReminderConfig ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_reminder_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_reminder_initial_delay_secs")]
    pub initial_delay_secs: u64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_reminder_interval_secs(),
            initial_delay_secs: default_reminder_initial_delay_secs(),
        }
    }
}

impl ReminderConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_reminder_interval_secs() -> u64 {
    24 * 60 * 60
}

fn default_reminder_initial_delay_secs() -> u64 {
    60
}

// ─── StatusConfig ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_status_host")]
    pub host: String,
    #[serde(default = "default_status_port")]
    pub port: u16,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_status_host(),
            port: default_status_port(),
        }
    }
}

fn default_status_host() -> String {
    "127.0.0.1".to_string()
}

fn default_status_port() -> u16 {
    13000
}

/// Expand tilde (~) to home directory in paths
/// Logs a warning if expansion fails and falls back to the original path
fn expand_tilde(path: &str) -> String {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(base_dirs) = directories::BaseDirs::new() {
            return base_dirs
                .home_dir()
                .join(stripped)
                .to_string_lossy()
                .to_string();
        }
        tracing::warn!(
            path = %path,
            "Failed to expand tilde in path: could not determine home directory"
        );
    }
    path.to_string()
}

impl Config {
    /// Find the config file, checking multiple locations in order:
    /// 1. PEPITO_CONFIG_PATH env var (if set)
    /// 2. ./config.toml (current directory - for development)
    /// 3. ~/.config/pepito/config.toml (XDG config dir)
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("PEPITO_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let xdg_config = paths::config_file();
        if xdg_config.exists() {
            return Some(xdg_config);
        }

        None
    }

    /// Load configuration from the discovered config file (if any), apply
    /// environment overrides, and validate required values.
    pub fn load() -> Result<Self> {
        match Self::find_config_file() {
            Some(path) => Self::load_from(&path),
            None => {
                tracing::info!("No config file found, using environment variables and defaults");
                Self::finish(Config::default())
            }
        }
    }

    /// Load configuration from an explicit file path
    pub fn load_from(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "Loading configuration from file");
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = toml::from_str::<Config>(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Self::finish(config)
    }

    fn finish(mut config: Config) -> Result<Self> {
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Override values from environment variables when present
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("DISCORD_TOKEN") {
            self.discord.bot_token = val;
        } else if let Ok(val) = std::env::var("DISCORD_BOT_TOKEN") {
            // Legacy name
            self.discord.bot_token = val;
        }
        if let Ok(val) = std::env::var("API_URL") {
            self.feed.url = val;
        }
        if let Ok(val) = std::env::var("FEED_RECONNECT_SECS") {
            self.feed.reconnect_delay_secs = val.parse().with_context(|| {
                format!("FEED_RECONNECT_SECS must be a whole number of seconds, got: {}", val)
            })?;
        }
        if let Ok(val) = std::env::var("PEPITO_ICON_URL") {
            self.notification.icon_url = val;
        }
        if let Ok(val) = std::env::var("PEPITO_TIMEZONE") {
            self.notification.timezone = val;
        }
        if let Ok(val) = std::env::var("CHANNELS_FILE") {
            self.registry.path = Some(val);
        }
        if let Ok(val) = std::env::var("DEVELOPER_SERVER_ID") {
            let val = val.trim().to_string();
            self.operator.tenant_id = (!val.is_empty()).then_some(val);
        }
        if let Ok(val) = std::env::var("STATUS_PORT") {
            self.status.port = val.parse().with_context(|| {
                format!("STATUS_PORT must be a valid port number, got: {}", val)
            })?;
            self.status.enabled = true;
        }
        Ok(())
    }

    /// Reject configurations the process cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.discord.bot_token.trim().is_empty() {
            anyhow::bail!(
                "discord.bot_token is required (set in config.toml or DISCORD_TOKEN env var)"
            );
        }
        if self.feed.url.trim().is_empty() {
            anyhow::bail!("feed.url is required (set in config.toml or API_URL env var)");
        }
        if !self.feed.url.starts_with("http://") && !self.feed.url.starts_with("https://") {
            anyhow::bail!("feed.url must be an http(s) URL, got: {}", self.feed.url);
        }
        if self.feed.reconnect_delay_secs == 0 {
            anyhow::bail!("feed.reconnect_delay_secs must be at least 1");
        }
        if self.notification.icon_url.trim().is_empty() {
            anyhow::bail!(
                "notification.icon_url is required (set in config.toml or PEPITO_ICON_URL env var)"
            );
        }
        self.notification.tz()?;
        if self.reminder.enabled && self.reminder.interval_secs == 0 {
            anyhow::bail!("reminder.interval_secs must be at least 1");
        }
        Ok(())
    }
}
