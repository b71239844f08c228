use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

const ENV_MAX_PAGES: &str = "AUTOAPPLY_MAX_PAGES";
const ENV_TIMEOUT_SECS: &str = "AUTOAPPLY_TIMEOUT_SECS";
const ENV_HEADLESS: &str = "AUTOAPPLY_HEADLESS";

/// Runtime settings. Every field has a default, so an empty file is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub browser: BrowserSettings,
    pub navigation: NavigationSettings,
    pub detector: DetectorSettings,
    pub analyzer: AnalyzerSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub debug_port: u16,
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    pub profile_dir: Option<PathBuf>,
    pub idle_timeout_secs: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            debug_port: 9222,
            headless: false,
            chrome_path: None,
            profile_dir: None,
            idle_timeout_secs: 120,
        }
    }
}

impl BrowserSettings {
    /// Persistent agent profile, so logins survive between runs.
    pub fn profile_dir(&self) -> PathBuf {
        self.profile_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("autoapply")
                .join("agent_profile")
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationSettings {
    pub max_pages: u32,
    pub timeout_secs: u64,
    pub settle_ms: u64,
    pub post_plan_wait_ms: u64,
    pub redirect_timeout_ms: u64,
    pub element_timeout_ms: u64,
    pub min_pages_for_completion: u32,
    pub no_progress_limit: u32,
    pub easy_apply_only: bool,
    pub popup_poll_ms: u64,
}

impl Default for NavigationSettings {
    fn default() -> Self {
        Self {
            max_pages: 15,
            timeout_secs: 300,
            settle_ms: 500,
            post_plan_wait_ms: 1000,
            redirect_timeout_ms: 30_000,
            element_timeout_ms: 1000,
            min_pages_for_completion: 2,
            no_progress_limit: 3,
            easy_apply_only: false,
            popup_poll_ms: 250,
        }
    }
}

impl NavigationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn redirect_timeout(&self) -> Duration {
        Duration::from_millis(self.redirect_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    pub same_content_window: usize,
    pub same_page_window: usize,
    pub element_tolerance: usize,
    pub pattern_repetitions: usize,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            same_content_window: 3,
            same_page_window: 5,
            element_tolerance: 5,
            pattern_repetitions: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerSettings {
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub enabled: bool,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 4096,
            temperature: 0.2,
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 60,
            enabled: true,
        }
    }
}

impl Settings {
    /// Load settings from an optional TOML file, then apply env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = toml::from_str(&raw).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded settings");
        Ok(settings)
    }

    /// Apply `AUTOAPPLY_*` overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_MAX_PAGES) {
            self.navigation.max_pages = parse_env(ENV_MAX_PAGES, &value)?;
        }
        if let Some(value) = lookup(ENV_TIMEOUT_SECS) {
            self.navigation.timeout_secs = parse_env(ENV_TIMEOUT_SECS, &value)?;
        }
        if let Some(value) = lookup(ENV_HEADLESS) {
            self.browser.headless = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::Env {
                        key: ENV_HEADLESS.to_string(),
                        value,
                    });
                }
            };
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        key: key.to_string(),
        value: value.to_string(),
    })
}
