use crate::model::{AlarmTime, MAX_ALARM_TIMES};
use crate::notify::Presentation;
use crate::store::DEFAULT_STORE_KEY;
use anyhow::{Context, Result, anyhow, bail};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

const APP_DIR: &str = ".RxReminder";
const CONFIG_FILE: &str = "config.json";
pub const DEFAULT_EXTRACTION_PROMPT: &str = "Extract every medication in this prescription image. For each one return the medicine name and its dosage schedule: start date (YYYY-MM-DD, today if not written), number of days, and the daily timings (Morning, Afternoon, Evening, Night). Ignore patient, doctor and pharmacy details.";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub db_path: PathBuf,
    pub store_key: String,
    pub notifications_enabled: bool,
    pub notify_show_alert: bool,
    pub notify_play_sound: bool,
    pub default_alarm_times: Vec<String>,
    pub api_port: u16,
    pub api_tokens: Vec<String>,
    pub daemon_label: String,
    pub ai_enabled: bool,
    pub ai_api_key: Option<String>,
    pub ai_api_base_url: String,
    pub ai_model: String,
    pub ai_timeout_seconds: u64,
    pub ai_prompt: String,
}

impl Default for Config {
    fn default() -> Self {
        let root = default_root_dir();

        Self {
            db_path: root.join("db").join("rxreminder.db"),
            store_key: DEFAULT_STORE_KEY.to_string(),
            notifications_enabled: true,
            notify_show_alert: true,
            notify_play_sound: true,
            default_alarm_times: vec![
                "08:00".to_string(),
                "14:00".to_string(),
                "20:00".to_string(),
            ],
            api_port: 7891,
            api_tokens: Vec::new(),
            daemon_label: "com.RxReminder.daemon".to_string(),
            ai_enabled: true,
            ai_api_key: None,
            ai_api_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            ai_model: "gemini-2.5-flash".to_string(),
            ai_timeout_seconds: 60,
            ai_prompt: DEFAULT_EXTRACTION_PROMPT.to_string(),
        }
    }
}

impl Config {
    pub fn root_dir() -> Result<PathBuf> {
        Ok(default_root_dir())
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(default_root_dir().join(CONFIG_FILE))
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;
        set_mode_600(&config_path)?;

        Ok(())
    }

    pub fn ensure_bootstrap_files(&self) -> Result<()> {
        let root = Self::root_dir()?;
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create root directory: {}", root.display()))?;

        if let Some(parent) = self.db_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create DB directory: {}", parent.display()))?;
        }

        Ok(())
    }

    /// Notification presentation for the lifetime of the process.
    pub fn presentation(&self) -> Presentation {
        Presentation {
            show_alert: self.notify_show_alert,
            play_sound: self.notify_play_sound,
        }
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let normalized = normalize_config_key(key);

        match normalized {
            "db_path" => {
                self.db_path = expand_home(value.trim());
            }
            "store_key" => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    bail!("store_key must not be empty");
                }
                self.store_key = trimmed.to_string();
            }
            "notifications_enabled" => {
                self.notifications_enabled = parse_bool(normalized, value)?;
            }
            "notify_show_alert" => {
                self.notify_show_alert = parse_bool(normalized, value)?;
            }
            "notify_play_sound" => {
                self.notify_play_sound = parse_bool(normalized, value)?;
            }
            "default_alarm_times" => {
                self.default_alarm_times = parse_alarm_time_list(value)?;
            }
            "api_port" => {
                self.api_port = value
                    .parse::<u16>()
                    .map_err(|_| anyhow!("api_port must be a number"))?;
            }
            "api_tokens" => {
                self.api_tokens = value
                    .split(',')
                    .map(str::trim)
                    .filter(|token| !token.is_empty())
                    .map(ToOwned::to_owned)
                    .collect();
            }
            "ai_enabled" => {
                self.ai_enabled = parse_bool(normalized, value)?;
            }
            "ai_api_key" => {
                self.ai_api_key = (!value.trim().is_empty()).then_some(value.to_string());
            }
            "ai_api_base_url" => {
                self.ai_api_base_url = value.trim().trim_end_matches('/').to_string();
            }
            "ai_model" => {
                self.ai_model = value.trim().to_string();
            }
            "ai_timeout_seconds" => {
                self.ai_timeout_seconds = value
                    .parse::<u64>()
                    .map_err(|_| anyhow!("ai_timeout_seconds must be a number"))?
                    .max(5);
            }
            "ai_prompt" => {
                let trimmed = value.trim();
                self.ai_prompt = if trimmed.is_empty() {
                    DEFAULT_EXTRACTION_PROMPT.to_string()
                } else {
                    trimmed.to_string()
                };
            }
            _ => {
                bail!(
                    "Unsupported config key: {key}. Supported keys: db_path|db.path, store_key|store.key, notifications_enabled|notifications.enabled, notify_show_alert|notifications.show_alert, notify_play_sound|notifications.play_sound, default_alarm_times|alarms.defaults, api_port|api.port, api_tokens|api.tokens, ai_enabled|ai.enabled, ai_api_key|ai.api_key, ai_api_base_url|ai.base_url, ai_model|ai.model, ai_timeout_seconds|ai.timeout_seconds, ai_prompt|ai.prompt"
                );
            }
        }

        Ok(())
    }

    pub fn get_value(&self, key: &str) -> Option<String> {
        match normalize_config_key(key) {
            "db_path" => Some(self.db_path.display().to_string()),
            "store_key" => Some(self.store_key.clone()),
            "notifications_enabled" => Some(self.notifications_enabled.to_string()),
            "notify_show_alert" => Some(self.notify_show_alert.to_string()),
            "notify_play_sound" => Some(self.notify_play_sound.to_string()),
            "default_alarm_times" => Some(self.default_alarm_times.join(",")),
            "api_port" => Some(self.api_port.to_string()),
            "api_tokens" => Some(format!("{} token(s) set", self.api_tokens.len())),
            "daemon_label" => Some(self.daemon_label.clone()),
            "ai_enabled" => Some(self.ai_enabled.to_string()),
            "ai_api_key" => Some(
                self.ai_api_key
                    .as_ref()
                    .map(|_| "***set***".to_string())
                    .unwrap_or_else(|| "not_set".to_string()),
            ),
            "ai_api_base_url" => Some(self.ai_api_base_url.clone()),
            "ai_model" => Some(self.ai_model.clone()),
            "ai_timeout_seconds" => Some(self.ai_timeout_seconds.to_string()),
            "ai_prompt" => Some(self.ai_prompt.clone()),
            _ => None,
        }
    }
}

fn normalize_config_key(key: &str) -> &str {
    match key {
        "db_path" | "db.path" => "db_path",
        "store_key" | "store.key" => "store_key",
        "notifications_enabled" | "notifications.enabled" => "notifications_enabled",
        "notify_show_alert" | "notifications.show_alert" => "notify_show_alert",
        "notify_play_sound" | "notifications.play_sound" => "notify_play_sound",
        "default_alarm_times" | "alarms.defaults" => "default_alarm_times",
        "api_port" | "api.port" => "api_port",
        "api_tokens" | "api.tokens" => "api_tokens",
        "daemon_label" | "daemon.label" => "daemon_label",
        "ai_enabled" | "ai.enabled" => "ai_enabled",
        "ai_api_key" | "ai.api_key" => "ai_api_key",
        "ai_api_base_url" | "ai.base_url" => "ai_api_base_url",
        "ai_model" | "ai.model" => "ai_model",
        "ai_timeout_seconds" | "ai.timeout_seconds" => "ai_timeout_seconds",
        "ai_prompt" | "ai.prompt" => "ai_prompt",
        _ => key,
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    value
        .trim()
        .parse::<bool>()
        .map_err(|_| anyhow!("{key} must be true/false"))
}

pub fn parse_alarm_time_list(value: &str) -> Result<Vec<String>> {
    let times = value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            AlarmTime::parse(part)
                .map(|time| time.to_string())
                .map_err(|error| anyhow!(error))
        })
        .collect::<Result<Vec<_>>>()?;

    if times.is_empty() {
        bail!("at least one alarm time is required. Example: 08:00,20:00");
    }
    if times.len() > MAX_ALARM_TIMES {
        bail!("at most {MAX_ALARM_TIMES} alarm times are allowed");
    }

    Ok(times)
}

pub fn expand_home(raw: &str) -> PathBuf {
    raw.strip_prefix("~/")
        .and_then(|stripped| home_dir().map(|home| home.join(stripped)))
        .unwrap_or_else(|| PathBuf::from(raw))
}

fn default_root_dir() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn set_mode_600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set file permissions: {}", path.display()))?;
    }

    Ok(())
}
