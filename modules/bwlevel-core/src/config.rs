use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::render::{validate_selector, BrowserlessEngine, ChromeEngine, RenderEngine};
use crate::types::PlayerName;

/// TOML-backed configuration loaded from disk.
/// Engine endpoints and tokens stay as env vars (see [`EngineConfig`]).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub profile: ProfileConfig,
    pub locators: Locators,
    #[serde(default)]
    pub resolver: ResolverSettings,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    /// Profile page URL with a `{name}` placeholder.
    pub url_template: String,
}

impl ProfileConfig {
    /// Target URL for `name`, percent-encoded into the placeholder.
    pub fn url_for(&self, name: &PlayerName) -> String {
        self.url_template.replace("{name}", &name.url_encoded())
    }
}

/// Site-specific CSS selectors. Change with every redesign of the profile
/// page; nothing else in the crate knows the page structure.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Locators {
    /// Appears once the profile has rendered.
    pub container: String,
    /// Element holding the level text, e.g. `[LVL 37]`.
    pub level: String,
    /// Shown instead of stats when the player is nicked.
    pub concealed: String,
}

impl Locators {
    pub fn validate(&self) -> Result<()> {
        for (field, selector) in [
            ("container", &self.container),
            ("level", &self.level),
            ("concealed", &self.concealed),
        ] {
            validate_selector(selector).with_context(|| format!("locators.{field}"))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverSettings {
    pub ttl_secs: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub navigation_timeout_secs: u64,
    pub content_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 60,
            max_attempts: 10,
            retry_delay_ms: 1000,
            navigation_timeout_secs: 30,
            content_timeout_secs: 15,
            shutdown_timeout_secs: 10,
        }
    }
}

impl ResolverSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn content_timeout(&self) -> Duration {
        Duration::from_secs(self.content_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Worst case for one resolution: every attempt times out on both waits.
    pub fn worst_case(&self) -> Duration {
        let attempts = self.max_attempts.max(1);
        let per_attempt = self.navigation_timeout() + self.content_timeout();
        per_attempt * attempts + self.retry_delay() * (attempts - 1)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            allowed_origins: Vec::new(),
        }
    }
}

/// Load, parse and validate a TOML config file.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

pub fn parse_config(content: &str) -> Result<FileConfig> {
    let config: FileConfig = toml::from_str(content)?;
    if !config.profile.url_template.contains("{name}") {
        anyhow::bail!("profile.url_template must contain a {{name}} placeholder");
    }
    config.locators.validate()?;
    Ok(config)
}

/// Which rendering engine to use, from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineConfig {
    Chrome {
        bin: String,
        max_concurrent: usize,
    },
    Browserless {
        base_url: String,
        token: Option<String>,
    },
}

impl EngineConfig {
    /// `BROWSERLESS_URL` (+ `BROWSERLESS_TOKEN`) selects Browserless;
    /// otherwise local Chrome via `CHROME_BIN` / `CHROME_MAX_CONCURRENT`.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = match std::env::var("BROWSERLESS_URL").ok().filter(|v| !v.is_empty()) {
            Some(base_url) => EngineConfig::Browserless {
                base_url,
                token: std::env::var("BROWSERLESS_TOKEN").ok().filter(|v| !v.is_empty()),
            },
            None => EngineConfig::Chrome {
                bin: std::env::var("CHROME_BIN").unwrap_or_else(|_| "chromium".to_string()),
                max_concurrent: std::env::var("CHROME_MAX_CONCURRENT")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .context("CHROME_MAX_CONCURRENT must be a number")?,
            },
        };

        config.log();
        Ok(config)
    }

    fn log(&self) {
        tracing::info!("Engine config loaded:");
        match self {
            EngineConfig::Chrome { bin, max_concurrent } => {
                tracing::info!("  backend: chrome");
                tracing::info!("  CHROME_BIN: {bin}");
                tracing::info!("  CHROME_MAX_CONCURRENT: {max_concurrent}");
            }
            EngineConfig::Browserless { base_url, token } => {
                tracing::info!("  backend: browserless");
                tracing::info!("  BROWSERLESS_URL: {base_url}");
                tracing::info!("  BROWSERLESS_TOKEN: {}", preview_secret(token.as_deref()));
            }
        }
    }

    pub fn build(&self) -> Arc<dyn RenderEngine> {
        match self {
            EngineConfig::Chrome { bin, max_concurrent } => {
                Arc::new(ChromeEngine::new(bin, *max_concurrent))
            }
            EngineConfig::Browserless { base_url, token } => {
                Arc::new(BrowserlessEngine::new(base_url, token.as_deref()))
            }
        }
    }
}

/// First few characters of a secret, for logs.
fn preview_secret(val: Option<&str>) -> String {
    match val {
        Some(v) if !v.is_empty() => {
            let head: String = v.chars().take(5).collect();
            format!("{head}...({} chars)", v.chars().count())
        }
        _ => "<not set>".to_string(),
    }
}
