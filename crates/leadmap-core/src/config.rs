// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use crate::zoom::DEFAULT_DISPLAY_THRESHOLD;
use crate::MapError;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE_NAME: &str = "leadmap.json";
pub const ENV_BASE_URL: &str = "LEADMAP_BASE_URL";
pub const ENV_API_KEY: &str = "LEADMAP_API_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    /// Sent as both `apikey` and bearer token when present.
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub display_threshold: f64,
    pub cluster_expansion: f64,
    pub record_expansion: f64,
    pub debounce_ms: u64,
    /// `None` keeps every cluster response for the whole session.
    pub cluster_cache_capacity: Option<NonZeroUsize>,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            display_threshold: DEFAULT_DISPLAY_THRESHOLD,
            cluster_expansion: 2.0,
            record_expansion: 3.0,
            debounce_ms: 500,
            cluster_cache_capacity: None,
        }
    }
}

impl ViewportConfig {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub viewport: ViewportConfig,
}

impl Config {
    pub fn default_path() -> PathBuf {
        crate::get_config_root().join(CONFIG_FILE_NAME)
    }

    /// Loads from `path` (or the default location), applies environment
    /// overrides and validates. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, MapError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        let mut config = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded configuration — path={}", path.display());
            config
        } else {
            debug!("No configuration file; using defaults — path={}", path.display());
            Config::default()
        };
        config.apply_overrides(
            std::env::var(ENV_BASE_URL).ok(),
            std::env::var(ENV_API_KEY).ok(),
        );
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), MapError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Credentials come from the environment, never from a written file.
        let mut copy = self.clone();
        copy.backend.api_key = None;
        fs::write(path, serde_json::to_string_pretty(&copy)?)?;
        Ok(())
    }

    pub fn apply_overrides(&mut self, base_url: Option<String>, api_key: Option<String>) {
        if let Some(url) = base_url.filter(|u| !u.trim().is_empty()) {
            self.backend.base_url = url;
        }
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            self.backend.api_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<(), MapError> {
        let v = &self.viewport;
        if !v.display_threshold.is_finite() {
            return Err(MapError::Config("display_threshold must be finite".into()));
        }
        if !(v.cluster_expansion >= 1.0) || !(v.record_expansion >= 1.0) {
            return Err(MapError::Config(
                "expansion factors must be at least 1".into(),
            ));
        }
        let url = self.backend.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(MapError::Config(format!(
                "base_url '{}' must be an http(s) URL",
                url
            )));
        }
        Ok(())
    }
}
