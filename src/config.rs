use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{DigestError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub browser: BrowserSettings,
    #[serde(default)]
    pub login: LoginConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default)]
    pub headless: bool,
    /// Profile directory; keeping it between runs keeps the login
    #[serde(default)]
    pub user_data_dir: Option<PathBuf>,
    #[serde(default)]
    pub chrome_executable: Option<PathBuf>,
    #[serde(default = "default_launch_timeout_secs")]
    pub launch_timeout_secs: u64,
    #[serde(default = "default_page_load_settle_secs")]
    pub page_load_settle_secs: u64,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            url: default_url(),
            headless: false,
            user_data_dir: None,
            chrome_executable: None,
            launch_timeout_secs: default_launch_timeout_secs(),
            page_load_settle_secs: default_page_load_settle_secs(),
            window_width: default_window_width(),
            window_height: default_window_height(),
        }
    }
}

impl BrowserSettings {
    pub fn launch_timeout(&self) -> Duration {
        Duration::from_secs(self.launch_timeout_secs)
    }

    pub fn page_load_settle(&self) -> Duration {
        Duration::from_secs(self.page_load_settle_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginConfig {
    #[serde(default = "default_initial_probe_secs")]
    pub initial_probe_secs: u64,
    #[serde(default = "default_marker_probe_secs")]
    pub marker_probe_secs: u64,
    #[serde(default = "default_auth_timeout_secs")]
    pub auth_timeout_secs: u64,
    #[serde(default = "default_login_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_verify_attempts")]
    pub verify_attempts: u32,
    #[serde(default = "default_verify_probe_secs")]
    pub verify_probe_secs: u64,
    #[serde(default = "default_reload_after_failures")]
    pub reload_after_failures: u32,
    #[serde(default = "default_reload_settle_secs")]
    pub reload_settle_secs: u64,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            initial_probe_secs: default_initial_probe_secs(),
            marker_probe_secs: default_marker_probe_secs(),
            auth_timeout_secs: default_auth_timeout_secs(),
            poll_interval_secs: default_login_poll_interval_secs(),
            verify_attempts: default_verify_attempts(),
            verify_probe_secs: default_verify_probe_secs(),
            reload_after_failures: default_reload_after_failures(),
            reload_settle_secs: default_reload_settle_secs(),
        }
    }
}

impl LoginConfig {
    pub fn initial_probe(&self) -> Duration {
        Duration::from_secs(self.initial_probe_secs)
    }

    pub fn marker_probe(&self) -> Duration {
        Duration::from_secs(self.marker_probe_secs)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn verify_probe(&self) -> Duration {
        Duration::from_secs(self.verify_probe_secs)
    }

    pub fn reload_settle(&self) -> Duration {
        Duration::from_secs(self.reload_settle_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_messages_per_chat")]
    pub messages_per_chat: usize,
    #[serde(default = "default_max_messages_per_chat")]
    pub max_messages_per_chat: usize,
    #[serde(default)]
    pub chat_limit: Option<usize>,
    /// Keep only the K longest messages per chat and render them ranked
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_list_probe_secs")]
    pub list_probe_secs: u64,
    #[serde(default = "default_pane_probe_secs")]
    pub pane_probe_secs: u64,
    #[serde(default = "default_collect_probe_ms")]
    pub collect_probe_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_open_settle_ms")]
    pub open_settle_ms: u64,
    #[serde(default = "default_scroll_settle_ms")]
    pub scroll_settle_ms: u64,
    #[serde(default = "default_harvest_attempts")]
    pub harvest_attempts: u32,
    #[serde(default = "default_harvest_backoff_ms")]
    pub harvest_backoff_ms: u64,
    #[serde(default = "default_activation_attempts")]
    pub activation_attempts: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            messages_per_chat: default_messages_per_chat(),
            max_messages_per_chat: default_max_messages_per_chat(),
            chat_limit: None,
            top_k: None,
            probe_timeout_ms: default_probe_timeout_ms(),
            list_probe_secs: default_list_probe_secs(),
            pane_probe_secs: default_pane_probe_secs(),
            collect_probe_ms: default_collect_probe_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            open_settle_ms: default_open_settle_ms(),
            scroll_settle_ms: default_scroll_settle_ms(),
            harvest_attempts: default_harvest_attempts(),
            harvest_backoff_ms: default_harvest_backoff_ms(),
            activation_attempts: default_activation_attempts(),
        }
    }
}

impl ExtractionConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn list_probe(&self) -> Duration {
        Duration::from_secs(self.list_probe_secs)
    }

    pub fn pane_probe(&self) -> Duration {
        Duration::from_secs(self.pane_probe_secs)
    }

    pub fn collect_probe(&self) -> Duration {
        Duration::from_millis(self.collect_probe_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn open_settle(&self) -> Duration {
        Duration::from_millis(self.open_settle_ms)
    }

    pub fn scroll_settle(&self) -> Duration {
        Duration::from_millis(self.scroll_settle_ms)
    }

    pub fn harvest_backoff(&self) -> Duration {
        Duration::from_millis(self.harvest_backoff_ms)
    }
}

fn default_url() -> String {
    "https://web.whatsapp.com".to_string()
}

fn default_launch_timeout_secs() -> u64 {
    30
}

fn default_page_load_settle_secs() -> u64 {
    5
}

fn default_window_width() -> u32 {
    1280
}

fn default_window_height() -> u32 {
    900
}

fn default_initial_probe_secs() -> u64 {
    15
}

fn default_marker_probe_secs() -> u64 {
    5
}

fn default_auth_timeout_secs() -> u64 {
    120
}

fn default_login_poll_interval_secs() -> u64 {
    2
}

fn default_verify_attempts() -> u32 {
    5
}

fn default_verify_probe_secs() -> u64 {
    20
}

fn default_reload_after_failures() -> u32 {
    3
}

fn default_reload_settle_secs() -> u64 {
    5
}

fn default_messages_per_chat() -> usize {
    10
}

fn default_max_messages_per_chat() -> usize {
    50
}

fn default_probe_timeout_ms() -> u64 {
    5000
}

fn default_list_probe_secs() -> u64 {
    10
}

fn default_pane_probe_secs() -> u64 {
    15
}

fn default_collect_probe_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_open_settle_ms() -> u64 {
    3000
}

fn default_scroll_settle_ms() -> u64 {
    3000
}

fn default_harvest_attempts() -> u32 {
    3
}

fn default_harvest_backoff_ms() -> u64 {
    2000
}

fn default_activation_attempts() -> u32 {
    3
}

/// Hard ceiling on messages per chat
pub const MESSAGES_PER_CHAT_CEILING: usize = 50;

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        // If file doesn't exist, return default config with warning
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DigestError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| DigestError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                DigestError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| DigestError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| DigestError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.browser.url.starts_with("http") {
            return Err(DigestError::ConfigError(format!(
                "browser.url must be an http(s) URL, got '{}'",
                self.browser.url
            )));
        }
        if self.browser.launch_timeout_secs == 0 {
            return Err(DigestError::ConfigError(
                "browser.launch_timeout_secs must be greater than 0".to_string(),
            ));
        }

        let login_bounds = [
            ("login.initial_probe_secs", self.login.initial_probe_secs),
            ("login.marker_probe_secs", self.login.marker_probe_secs),
            ("login.auth_timeout_secs", self.login.auth_timeout_secs),
            ("login.poll_interval_secs", self.login.poll_interval_secs),
            ("login.verify_probe_secs", self.login.verify_probe_secs),
        ];
        for (name, value) in login_bounds {
            if value == 0 {
                return Err(DigestError::ConfigError(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        if self.login.verify_attempts == 0 || self.login.reload_after_failures == 0 {
            return Err(DigestError::ConfigError(
                "login.verify_attempts and login.reload_after_failures must be greater than 0"
                    .to_string(),
            ));
        }
        if self.login.verify_attempts < self.login.reload_after_failures {
            return Err(DigestError::ConfigError(
                "login.verify_attempts cannot be lower than login.reload_after_failures"
                    .to_string(),
            ));
        }

        let extraction = &self.extraction;
        if extraction.max_messages_per_chat == 0 {
            return Err(DigestError::ConfigError(
                "extraction.max_messages_per_chat must be at least 1".to_string(),
            ));
        }
        if extraction.max_messages_per_chat > MESSAGES_PER_CHAT_CEILING {
            return Err(DigestError::ConfigError(format!(
                "extraction.max_messages_per_chat cannot exceed {}",
                MESSAGES_PER_CHAT_CEILING
            )));
        }
        if extraction.messages_per_chat == 0
            || extraction.messages_per_chat > extraction.max_messages_per_chat
        {
            return Err(DigestError::ConfigError(format!(
                "extraction.messages_per_chat must be between 1 and {}",
                extraction.max_messages_per_chat
            )));
        }
        if extraction.top_k == Some(0) {
            return Err(DigestError::ConfigError(
                "extraction.top_k must be at least 1 when set".to_string(),
            ));
        }

        let extraction_bounds = [
            ("extraction.probe_timeout_ms", extraction.probe_timeout_ms),
            ("extraction.list_probe_secs", extraction.list_probe_secs),
            ("extraction.pane_probe_secs", extraction.pane_probe_secs),
            ("extraction.poll_interval_ms", extraction.poll_interval_ms),
            (
                "extraction.harvest_attempts",
                u64::from(extraction.harvest_attempts),
            ),
            (
                "extraction.activation_attempts",
                u64::from(extraction.activation_attempts),
            ),
        ];
        for (name, value) in extraction_bounds {
            if value == 0 {
                return Err(DigestError::ConfigError(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}
