use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub ui: UiConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

/// Where the channel roster comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Extended-M3U playlist document.  Used when `api_url` is unset.
    #[serde(default = "default_playlist_url")]
    pub playlist_url: String,
    /// Backend listing endpoint returning a JSON channel array.  Takes
    /// precedence over the playlist when set.
    #[serde(default)]
    pub api_url: Option<String>,
    /// Name given to the single channel synthesised when the playlist
    /// document parses to nothing.
    #[serde(default = "default_fallback_name")]
    pub fallback_name: String,
    /// Periodic refresh interval; 0 disables timed refresh.
    #[serde(default)]
    pub refresh_interval_secs: u64,
    /// File whose contents the admin tool bumps when the roster changes.
    #[serde(default)]
    pub change_marker: Option<PathBuf>,
    #[serde(default = "default_change_poll_ms")]
    pub change_poll_ms: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Path-prefix relay every channel URL is routed through.  Empty
    /// string disables routing.
    #[serde(default = "default_proxy_base")]
    pub base: String,
    /// Request header carrying a per-channel user-agent override to the relay.
    #[serde(default = "default_user_agent_header")]
    pub user_agent_header: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationConfig {
    #[serde(default = "default_numeric_commit_ms")]
    pub numeric_commit_ms: u64,
    #[serde(default = "default_arrow_debounce_ms")]
    pub arrow_debounce_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Native-path watchdog: no progress after this long means failure.
    #[serde(default = "default_native_watchdog_secs")]
    pub native_watchdog_secs: u64,
    #[serde(default)]
    pub mpv_binary: Option<PathBuf>,
    #[serde(default = "default_volume")]
    pub volume: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_probe_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    /// Delay before the loading indicator is hidden after playback starts or fails.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_osd_ms")]
    pub osd_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_relay_port")]
    pub port: u16,
    /// User-Agent sent upstream when the request carries no override.
    #[serde(default = "default_relay_user_agent")]
    pub default_user_agent: String,
    #[serde(default = "default_relay_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            playlist_url: default_playlist_url(),
            api_url: None,
            fallback_name: default_fallback_name(),
            refresh_interval_secs: 0,
            change_marker: None,
            change_poll_ms: default_change_poll_ms(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            base: default_proxy_base(),
            user_agent_header: default_user_agent_header(),
        }
    }
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            numeric_commit_ms: default_numeric_commit_ms(),
            arrow_debounce_ms: default_arrow_debounce_ms(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            native_watchdog_secs: default_native_watchdog_secs(),
            mpv_binary: None,
            volume: default_volume(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_settle_ms(),
            osd_ms: default_osd_ms(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_relay_port(),
            default_user_agent: default_relay_user_agent(),
            timeout_secs: default_relay_timeout_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_playlist_url() -> String {
    "http://127.0.0.1:8990/playlist.m3u".to_string()
}

fn default_fallback_name() -> String {
    "Live".to_string()
}

fn default_change_poll_ms() -> u64 {
    2000
}

fn default_fetch_timeout_secs() -> u64 {
    15
}

fn default_proxy_base() -> String {
    "http://127.0.0.1:8990/proxy/".to_string()
}

fn default_user_agent_header() -> String {
    "X-Proxy-User-Agent".to_string()
}

fn default_numeric_commit_ms() -> u64 {
    1000
}

fn default_arrow_debounce_ms() -> u64 {
    200
}

fn default_native_watchdog_secs() -> u64 {
    5
}

fn default_volume() -> f32 {
    0.8
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_settle_ms() -> u64 {
    3000
}

fn default_osd_ms() -> u64 {
    1500
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8989
}

fn default_relay_port() -> u16 {
    8990
}

fn default_relay_user_agent() -> String {
    "tv-relay/0.1".to_string()
}

fn default_relay_timeout_secs() -> u64 {
    30
}

impl NavigationConfig {
    pub fn numeric_commit(&self) -> Duration {
        Duration::from_millis(self.numeric_commit_ms)
    }

    pub fn arrow_debounce(&self) -> Duration {
        Duration::from_millis(self.arrow_debounce_ms)
    }
}

impl UiConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn osd(&self) -> Duration {
        Duration::from_millis(self.osd_ms)
    }
}

impl Config {
    /// Load from the default location, writing a default file on first run.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
