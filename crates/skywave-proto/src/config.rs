use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;
use crate::protocol::DEFAULT_PAGE_SIZE;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub socket: SocketConfig,
    #[serde(default)]
    pub mpv: MpvConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default = "default_history_file")]
    pub history_file: PathBuf,
    #[serde(default = "default_favorites_file")]
    pub favorites_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketConfig {
    #[serde(default = "default_socket_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpvConfig {
    /// Substrings of mpv's `audio-device` that mean audio leaves this machine
    /// (AirPlay, Bluetooth and the like).
    #[serde(default = "default_external_output_markers")]
    pub external_output_markers: Vec<String>,
}

/// Remote station directory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Mirror base URLs.  One is picked at random per client.
    #[serde(default = "default_servers")]
    pub servers: Vec<String>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// ISO alpha-2 code of "your" country.  Falls back to the locale.
    #[serde(default)]
    pub local_country: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_volume")]
    pub default_volume: f32,
    /// How long playback must hold before it counts as started.
    #[serde(default = "default_grace_delay_ms")]
    pub grace_delay_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            history_file: default_history_file(),
            favorites_file: default_favorites_file(),
        }
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            enabled: default_socket_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for MpvConfig {
    fn default() -> Self {
        Self {
            external_output_markers: default_external_output_markers(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            page_size: default_page_size(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
            local_country: None,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_volume: default_volume(),
            grace_delay_ms: default_grace_delay_ms(),
        }
    }
}

fn default_state_file() -> PathBuf {
    platform::data_dir().join("state.json")
}

fn default_history_file() -> PathBuf {
    platform::data_dir().join("history.json")
}

fn default_favorites_file() -> PathBuf {
    platform::data_dir().join("favorites.json")
}

fn default_socket_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    platform::DAEMON_TCP_PORT
}

fn default_external_output_markers() -> Vec<String> {
    ["airplay", "raop", "bluez", "bluetooth"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_servers() -> Vec<String> {
    [
        "https://de1.api.radio-browser.info",
        "https://de2.api.radio-browser.info",
        "https://fi1.api.radio-browser.info",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_user_agent() -> String {
    format!("skywave/{}", env!("CARGO_PKG_VERSION"))
}

fn default_volume() -> f32 {
    0.5
}

fn default_grace_delay_ms() -> u64 {
    2000
}

impl CatalogConfig {
    /// Configured country if valid, else the locale region.
    pub fn local_country(&self) -> Option<String> {
        self.local_country
            .as_deref()
            .map(|c| c.trim().to_ascii_uppercase())
            .filter(|c| crate::country::is_alpha2(c))
            .or_else(platform::locale_region)
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.socket.enabled);
        assert_eq!(config.socket.port, platform::DAEMON_TCP_PORT);
        assert_eq!(config.socket.bind_address, "127.0.0.1");
        assert_eq!(config.catalog.page_size, 50);
        assert_eq!(config.playback.grace_delay_ms, 2000);
        assert!(config.catalog.servers.iter().all(|s| s.starts_with("https://")));
        assert!(config.daemon.history_file.ends_with("skywave/history.json"));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [catalog]
            page_size = 20
            local_country = "se"

            [playback]
            default_volume = 0.8
            "#,
        )
        .unwrap();
        assert_eq!(config.catalog.page_size, 20);
        assert_eq!(config.catalog.request_timeout_secs, 15);
        assert_eq!(config.catalog.local_country().as_deref(), Some("SE"));
        assert_eq!(config.playback.grace_delay_ms, 2000);
        assert!(config
            .mpv
            .external_output_markers
            .contains(&"airplay".to_string()));
    }

    #[test]
    fn test_config_roundtrips_through_toml() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.catalog.servers, Config::default().catalog.servers);
    }
}
