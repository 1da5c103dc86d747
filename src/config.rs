use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::ai::ModelTier;
use crate::error::{AppError, Result};

const APP_DIR: &str = "rss-digest";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Used when no key has been stored with the `apikey` command.
    pub openai_api_key: Option<String>,

    #[serde(default = "default_llm_api_url")]
    pub llm_api_url: String,

    #[serde(default)]
    pub summary_model: ModelTier,

    #[serde(default = "default_small_model")]
    pub small_model: String,

    #[serde(default = "default_large_model")]
    pub large_model: String,

    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_minutes: u32,

    #[serde(default = "default_true")]
    pub auto_refresh: bool,

    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u32,

    #[serde(default = "default_summary_bootstrap_hours")]
    pub summary_bootstrap_hours: u32,

    #[serde(default = "default_enrich_delay_ms")]
    pub enrich_delay_ms: u64,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_llm_timeout")]
    pub llm_timeout_secs: u64,
}

fn data_dir() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR);
    std::fs::create_dir_all(&data_dir).ok();
    data_dir
}

fn default_db_path() -> String {
    data_dir().join("rss.db").to_string_lossy().to_string()
}

fn default_llm_api_url() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_small_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_large_model() -> String {
    "gpt-4o".to_string()
}

fn default_refresh_interval() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_lookback_hours() -> u32 {
    72
}

fn default_summary_bootstrap_hours() -> u32 {
    24
}

fn default_enrich_delay_ms() -> u64 {
    500
}

fn default_http_timeout() -> u64 {
    30
}

fn default_llm_timeout() -> u64 {
    120
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            openai_api_key: None,
            llm_api_url: default_llm_api_url(),
            summary_model: ModelTier::default(),
            small_model: default_small_model(),
            large_model: default_large_model(),
            refresh_interval_minutes: default_refresh_interval(),
            auto_refresh: true,
            lookback_hours: default_lookback_hours(),
            summary_bootstrap_hours: default_summary_bootstrap_hours(),
            enrich_delay_ms: default_enrich_delay_ms(),
            http_timeout_secs: default_http_timeout(),
            llm_timeout_secs: default_llm_timeout(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    pub fn log_path() -> PathBuf {
        data_dir().join("rss-digest.log")
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.refresh_interval_minutes.max(1)) * 60)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    pub fn enrich_delay(&self) -> Duration {
        Duration::from_millis(self.enrich_delay_ms)
    }

    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.lookback_hours))
    }

    pub fn model_name(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Small => &self.small_model,
            ModelTier::Large => &self.large_model,
        }
    }
}
