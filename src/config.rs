//! YAML configuration.
//!
//! Every field has a default, so an absent file and an empty file both yield
//! [`Config::default`].

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use askweb_capture::{CapturePolicy, LaunchOptions, Typing};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub browser: BrowserConfig,
    pub stealth: StealthConfig,
    /// Registry id used by `ask` when no notebook is given.
    pub default_notebook: Option<String>,
    pub timeouts: Timeouts,
    pub capture: CaptureConfig,
}

/// Browser launch configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrowserConfig {
    /// Show the browser window.
    pub show: bool,
    pub proxy: Option<String>,
    pub user_agent: Option<String>,
    pub viewport: Viewport,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            show: false,
            proxy: None,
            user_agent: None,
            viewport: Viewport::default(),
        }
    }
}

/// Viewport dimensions.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 900,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StealthConfig {
    /// Type prompts keystroke by keystroke.
    pub enabled: bool,
    pub typing_wpm_min: u32,
    pub typing_wpm_max: u32,
}

impl Default for StealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            typing_wpm_min: 320,
            typing_wpm_max: 480,
        }
    }
}

/// All in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timeouts {
    pub page_load_ms: u64,
    pub selector_ms: u64,
    pub response_ms: u64,
    pub image_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            page_load_ms: 30_000,
            selector_ms: 10_000,
            response_ms: 120_000,
            image_ms: 300_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptureConfig {
    pub poll_interval_ms: u64,
    pub stable_ticks: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            stable_ticks: 2,
        }
    }
}

impl Config {
    /// Load config from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("in config {}", path.display()))
    }

    /// `explicit` must exist; otherwise `fallback` is used when present.
    pub fn load_or_default(explicit: Option<&Path>, fallback: &Path) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None if fallback.exists() => Self::load(fallback),
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self> {
        let config: Config = if yaml.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let s = &self.stealth;
        if s.typing_wpm_min == 0 || s.typing_wpm_max == 0 {
            bail!("stealth.typing_wpm_min and typing_wpm_max must be positive");
        }
        if s.typing_wpm_min > s.typing_wpm_max {
            bail!(
                "stealth.typing_wpm_min ({}) exceeds typing_wpm_max ({})",
                s.typing_wpm_min,
                s.typing_wpm_max
            );
        }
        if self.capture.stable_ticks == 0 {
            bail!("capture.stable_ticks must be at least 1");
        }
        if self.capture.poll_interval_ms == 0 {
            bail!("capture.poll_interval_ms must be positive");
        }
        if self.browser.viewport.width == 0 || self.browser.viewport.height == 0 {
            bail!("browser.viewport dimensions must be positive");
        }
        Ok(())
    }

    pub fn launch_options(&self, show_browser: bool) -> LaunchOptions {
        LaunchOptions {
            headless: !(show_browser || self.browser.show),
            proxy: self.browser.proxy.clone(),
            user_agent: self.browser.user_agent.clone(),
            viewport_width: self.browser.viewport.width,
            viewport_height: self.browser.viewport.height,
        }
    }

    pub fn capture_policy(&self) -> CapturePolicy {
        CapturePolicy {
            poll_interval: Duration::from_millis(self.capture.poll_interval_ms),
            stable_ticks: self.capture.stable_ticks,
            discovery_timeout: Duration::from_millis(self.timeouts.selector_ms),
            typing: Typing {
                enabled: self.stealth.enabled,
                wpm_min: self.stealth.typing_wpm_min,
                wpm_max: self.stealth.typing_wpm_max,
            },
        }
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.page_load_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.response_ms)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_millis(self.timeouts.image_ms)
    }
}
