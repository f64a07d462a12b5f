use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tenny_client::api::{ApiConfig, DEFAULT_BASE_URL};
use tenny_client::query::QueryOptions;
use tenny_client::upload::{MAX_UPLOAD_BYTES, UploadPolicy};
use tenny_core::OcrEngine;

use crate::state::ensure_tenny_home;

pub const ENV_API_URL: &str = "TENNY_API_URL";
pub const ENV_PROXY_TARGET: &str = "TENNY_PROXY_TARGET";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub api: ApiSection,
    pub cache: CacheSection,
    pub upload: UploadSection,
    pub proxy: ProxySection,
    pub display: DisplaySection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiSection {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: 10,
        }
    }
}

/// Request de-duplication windows
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheSection {
    pub transactions_dedupe_secs: u64,
    pub categories_dedupe_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            transactions_dedupe_secs: 10,
            categories_dedupe_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UploadSection {
    pub max_bytes: usize,
    pub default_engine: OcrEngine,
}

impl Default for UploadSection {
    fn default() -> Self {
        Self {
            max_bytes: MAX_UPLOAD_BYTES,
            default_engine: OcrEngine::Hybrid,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProxySection {
    pub listen: String,
    /// Backend the proxy forwards to
    pub target: String,
}

impl Default for ProxySection {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:3000".to_string(),
            target: DEFAULT_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DisplaySection {
    /// IANA zone used to decide what "today" is
    pub timezone: String,
    pub currency_symbol: String,
}

impl Default for DisplaySection {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            currency_symbol: "$".to_string(),
        }
    }
}

impl Config {
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            base_url: self.api.base_url.clone(),
            timeout: Duration::from_secs(self.api.timeout_secs.max(1)),
        }
    }

    pub fn transactions_query(&self) -> QueryOptions {
        QueryOptions::deduped(Duration::from_secs(self.cache.transactions_dedupe_secs))
    }

    pub fn categories_query(&self) -> QueryOptions {
        QueryOptions::deduped(Duration::from_secs(self.cache.categories_dedupe_secs))
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy::default().with_max_bytes(self.upload.max_bytes)
    }

    /// Environment wins over the file
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api.base_url = url.trim().to_string();
        }
        if let Some(target) = var(ENV_PROXY_TARGET).filter(|v| !v.trim().is_empty()) {
            self.proxy.target = target.trim().to_string();
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_tenny_home()?.join("config.toml"))
}

pub fn read_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    toml::from_str(&s).with_context(|| format!("parse {}", path.display()))
}

/// `~/.tenny/config.toml` with environment overrides applied
pub fn load_config() -> Result<Config> {
    let mut cfg = read_config(&config_path()?)?;
    cfg.apply_env(|k| std::env::var(k).ok());
    Ok(cfg)
}

pub fn save_config(cfg: &Config) -> Result<()> {
    let p = config_path()?;
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn init_config() -> Result<()> {
    let p = config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config(&Config::default())?;
    println!("Wrote {}", p.display());
    Ok(())
}

pub fn show_config(cfg: &Config) -> Result<String> {
    toml::to_string_pretty(cfg).context("serialize config")
}
