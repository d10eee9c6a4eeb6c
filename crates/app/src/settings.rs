//! Settings of the application, read from `config/settings.toml` and from
//! `LEDGER_*` environment variables (`LEDGER_APP__LEVEL=debug`).
//!
//! See `config/settings.toml` for a commented example.

use std::time::Duration;

use automation::{MAX_CONCURRENCY, SchedulerConfig, WatcherConfig};
use clap::Parser;
use config::ConfigError;
use engine::{Group, GroupTier, InterfaceBinding};
use serde::Deserialize;

const DEFAULT_CONFIG_PATH: &str = "config/settings.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct App {
    pub level: String,
    /// IANA name of the zone the calendar days are counted in.
    pub timezone: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            timezone: "Asia/Shanghai".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    #[default]
    Memory,
    Sqlite(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Telegram {
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Billing {
    pub base_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_billing_timeout")]
    pub timeout_secs: u64,
}

fn default_billing_timeout() -> u64 {
    15
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupSettings {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    /// `upstream`, `downstream` or `basic`; anything else is `basic`.
    #[serde(default)]
    pub tier: String,
    #[serde(default = "enabled")]
    pub active: bool,
    #[serde(default)]
    pub bindings: Vec<InterfaceBinding>,
}

impl GroupSettings {
    pub fn to_group(&self) -> Group {
        Group {
            id: self.id,
            title: self.title.clone(),
            tier: GroupTier::normalize(&self.tier),
            bindings: self.bindings.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Scheduler {
    pub enabled: bool,
    pub offset_secs: u64,
    pub concurrency: usize,
    pub attempts: u32,
    pub settle_timeout_secs: u64,
    pub deliver_timeout_secs: u64,
}

impl Default for Scheduler {
    fn default() -> Self {
        let config = SchedulerConfig::default();
        Self {
            enabled: true,
            offset_secs: config.offset.as_secs(),
            concurrency: config.concurrency,
            attempts: config.attempts,
            settle_timeout_secs: config.settle_timeout.as_secs(),
            deliver_timeout_secs: config.deliver_timeout.as_secs(),
        }
    }
}

impl Scheduler {
    pub fn config(&self) -> SchedulerConfig {
        SchedulerConfig {
            offset: Duration::from_secs(self.offset_secs),
            concurrency: self.concurrency.clamp(1, MAX_CONCURRENCY),
            attempts: self.attempts,
            settle_timeout: Duration::from_secs(self.settle_timeout_secs),
            deliver_timeout: Duration::from_secs(self.deliver_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Watcher {
    pub enabled: bool,
    pub scan_interval_secs: u64,
    pub default_limit: u32,
    pub deliver_timeout_secs: u64,
}

impl Default for Watcher {
    fn default() -> Self {
        let config = WatcherConfig::default();
        Self {
            enabled: true,
            scan_interval_secs: config.scan_interval.as_secs(),
            default_limit: config.default_limit,
            deliver_timeout_secs: config.deliver_timeout.as_secs(),
        }
    }
}

impl Watcher {
    pub fn config(&self) -> WatcherConfig {
        WatcherConfig {
            scan_interval: Duration::from_secs(self.scan_interval_secs.max(1)),
            default_limit: self.default_limit,
            deliver_timeout: Duration::from_secs(self.deliver_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub app: App,
    pub database: Database,
    pub telegram: Option<Telegram>,
    pub billing: Option<Billing>,
    /// Telegram user ids allowed to change balances.
    pub admins: Vec<i64>,
    pub groups: Vec<GroupSettings>,
    pub scheduler: Scheduler,
    pub watcher: Watcher,
}

#[derive(Debug, Parser)]
#[command(name = "ledger", disable_version_flag = true)]
struct Args {
    /// Optional config file path (TOML).
    #[arg(long)]
    config: Option<String>,
    /// Override the log level (e.g. debug).
    #[arg(long)]
    level: Option<String>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let args = Args::parse();

        let config_path = args.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);
        let mut settings = Self::from_sources(config::File::with_name(config_path).required(false))?;

        if let Some(level) = args.level {
            settings.app.level = level;
        }
        Ok(settings)
    }

    fn from_sources<S>(file: S) -> Result<Self, ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("LEDGER")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}

fn enabled() -> bool {
    true
}
