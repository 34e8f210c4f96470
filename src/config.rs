//! Engine configuration, stored in `~/.claimpilot/config.json`.
//!
//! Every field has a serde default so a partial file (or none at all) still
//! yields a runnable config. Secrets are expected to arrive through the
//! environment rather than the file.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Explicit database path. Unset means `~/.claimpilot/claimpilot.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Shared secret required in `x-cron-secret` on trigger routes.
    /// Unset means the trigger routes are open (local deployments).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_secret: Option<String>,
    #[serde(default)]
    pub schedules: Schedules,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub services: ServicesConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            bind_addr: default_bind_addr(),
            cron_secret: None,
            schedules: Schedules::default(),
            engine: EngineConfig::default(),
            services: ServicesConfig::default(),
        }
    }
}

impl Default for Schedules {
    fn default() -> Self {
        Self {
            engine: ScheduleEntry::default_engine(),
            follow_up: ScheduleEntry::default_follow_up(),
        }
    }
}

/// Schedule configuration for the two batch routines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedules {
    #[serde(default = "ScheduleEntry::default_engine")]
    pub engine: ScheduleEntry,
    #[serde(default = "ScheduleEntry::default_follow_up")]
    pub follow_up: ScheduleEntry,
}

/// A single schedule entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub enabled: bool,
    pub cron: String,
    pub timezone: String,
}

impl ScheduleEntry {
    /// Default schedule for the automation batch: 6 AM daily
    pub fn default_engine() -> Self {
        Self {
            enabled: true,
            cron: "0 6 * * *".to_string(),
            timezone: "America/New_York".to_string(),
        }
    }

    /// Default schedule for follow-up dispatch: 9 AM daily
    pub fn default_follow_up() -> Self {
        Self {
            enabled: true,
            cron: "0 9 * * *".to_string(),
            timezone: "America/New_York".to_string(),
        }
    }
}

impl Default for ScheduleEntry {
    fn default() -> Self {
        Self::default_engine()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Days without movement before a claim counts as stalled.
    #[serde(default = "default_stalled_days")]
    pub stalled_claim_days: i64,
    /// Deadlines at most this many days out trigger an escalation.
    #[serde(default = "default_deadline_horizon")]
    pub deadline_horizon_days: i64,
    /// Documents classified per tick.
    #[serde(default = "default_document_batch")]
    pub document_batch_size: i64,
    /// Wall-clock budget for one tick; the batch bails out between claims
    /// once it is exhausted.
    #[serde(default = "default_tick_deadline")]
    pub tick_deadline_secs: u64,
    /// Domain for the reply-intake CC alias. Empty disables the CC.
    #[serde(default)]
    pub intake_domain: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stalled_claim_days: default_stalled_days(),
            deadline_horizon_days: default_deadline_horizon(),
            document_batch_size: default_document_batch(),
            tick_deadline_secs: default_tick_deadline(),
            intake_domain: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicesConfig {
    #[serde(default)]
    pub mail: ServiceEndpoint,
    #[serde(default)]
    pub drafter: ServiceEndpoint,
    #[serde(default)]
    pub classifier: ServiceEndpoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpoint {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_service_timeout")]
    pub timeout_secs: u64,
}

impl Default for ServiceEndpoint {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            timeout_secs: default_service_timeout(),
        }
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1:8701".to_string()
}

fn default_stalled_days() -> i64 {
    7
}

fn default_deadline_horizon() -> i64 {
    3
}

fn default_document_batch() -> i64 {
    10
}

fn default_tick_deadline() -> u64 {
    300
}

fn default_service_timeout() -> u64 {
    30
}

/// Get the canonical config file path (~/.claimpilot/config.json), unless
/// `CLAIMPILOT_CONFIG` points elsewhere.
pub fn config_path() -> Result<PathBuf, String> {
    if let Ok(path) = std::env::var("CLAIMPILOT_CONFIG") {
        return Ok(PathBuf::from(path));
    }
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".claimpilot").join("config.json"))
}

impl Config {
    /// Load configuration from disk and apply environment overrides.
    /// A missing file yields the defaults; an unparseable file is an error.
    pub fn load() -> Result<Config, String> {
        let path = config_path()?;
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| format!("Failed to read config: {}", e))?;
            serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))?
        } else {
            log::info!(
                "No config file at {}, starting with defaults",
                path.display()
            );
            Config::default()
        };
        config.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Pull secret material from the environment. File values lose to the
    /// environment so deployments never need credentials on disk.
    pub fn apply_env_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get("CLAIMPILOT_DB") {
            self.db_path = Some(v);
        }
        if let Some(v) = get("CLAIMPILOT_BIND") {
            self.bind_addr = v;
        }
        if let Some(v) = get("CLAIMPILOT_CRON_SECRET") {
            self.cron_secret = Some(v);
        }
        if let Some(v) = get("CLAIMPILOT_MAIL_API_KEY") {
            self.services.mail.api_key = v;
        }
        if let Some(v) = get("CLAIMPILOT_DRAFTER_API_KEY") {
            self.services.drafter.api_key = v;
        }
        if let Some(v) = get("CLAIMPILOT_CLASSIFIER_API_KEY") {
            self.services.classifier.api_key = v;
        }
    }
}
