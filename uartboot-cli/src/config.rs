//! Configuration file support for uartboot.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (UARTBOOT_PORT, UARTBOOT_BAUD)
//! 3. Local config file (./uartboot.toml)
//! 4. Global config file (~/.config/uartboot/config.toml)
//!
//! ```toml
//! [connection]
//! port = "/dev/ttyUSB0"
//! baud = 115200
//!
//! [protocol]
//! response_timeout_ms = 2000
//! verify_response_crc = true
//! min_line_chars = 7
//! ```

use directories::ProjectDirs;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uartboot::{ChannelConfig, ClientConfig, UploadOptions};

/// Name of the local configuration file.
pub const LOCAL_CONFIG_FILE: &str = "uartboot.toml";

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyUSB0" or "COM3").
    pub port: Option<String>,
    /// Default baud rate.
    pub baud: Option<u32>,
}

/// Protocol tuning.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Response deadline in milliseconds.
    pub response_timeout_ms: Option<u64>,
    /// Reject responses with a bad CRC.
    pub verify_response_crc: Option<bool>,
    /// Shortest accepted image line.
    pub min_line_chars: Option<usize>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Protocol settings.
    #[serde(default)]
    pub protocol: ProtocolConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "uartboot").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one. Values set in `other` win.
    fn merge(&mut self, other: Self) {
        if other.connection.port.is_some() {
            self.connection.port = other.connection.port;
        }
        if other.connection.baud.is_some() {
            self.connection.baud = other.connection.baud;
        }
        if other.protocol.response_timeout_ms.is_some() {
            self.protocol.response_timeout_ms = other.protocol.response_timeout_ms;
        }
        if other.protocol.verify_response_crc.is_some() {
            self.protocol.verify_response_crc = other.protocol.verify_response_crc;
        }
        if other.protocol.min_line_chars.is_some() {
            self.protocol.min_line_chars = other.protocol.min_line_chars;
        }
    }

    /// Library client settings with the file values applied over defaults.
    pub fn client_config(&self) -> ClientConfig {
        let mut channel = ChannelConfig::default();
        if let Some(ms) = self.protocol.response_timeout_ms {
            channel = channel.with_response_timeout(Duration::from_millis(ms));
        }
        if let Some(verify) = self.protocol.verify_response_crc {
            channel = channel.with_crc_check(verify);
        }

        let mut upload = UploadOptions::default();
        if let Some(chars) = self.protocol.min_line_chars {
            upload = upload.with_min_line_chars(chars);
        }

        ClientConfig::default()
            .with_channel(channel)
            .with_upload(upload)
    }

    /// Remember a serial port in the local config file.
    pub fn save_port(&mut self, port: &str) -> anyhow::Result<()> {
        self.save_port_to(Path::new(LOCAL_CONFIG_FILE), port)
    }

    fn save_port_to(&mut self, path: &Path, port: &str) -> anyhow::Result<()> {
        let mut local = Self::load_from_file(path).unwrap_or_default();
        local.connection.port = Some(port.to_string());

        let content = toml::to_string_pretty(&local)?;
        fs::write(path, content)?;
        info!("Saved port {port} to {}", path.display());

        self.connection.port = Some(port.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.connection.port.is_none());
        assert!(config.connection.baud.is_none());
        assert_eq!(config.protocol, ProtocolConfig::default());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
[connection]
port = "/dev/ttyUSB0"
baud = 57600

[protocol]
response_timeout_ms = 500
verify_response_crc = false
min_line_chars = 5
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.connection.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.connection.baud, Some(57600));
        assert_eq!(config.protocol.response_timeout_ms, Some(500));
        assert_eq!(config.protocol.verify_response_crc, Some(false));
        assert_eq!(config.protocol.min_line_chars, Some(5));
    }

    #[test]
    fn test_config_partial_toml() {
        let config: Config = toml::from_str("[connection]\nbaud = 9600\n").unwrap();
        assert_eq!(config.connection.baud, Some(9600));
        assert!(config.connection.port.is_none());
        assert_eq!(config.protocol, ProtocolConfig::default());
    }

    #[test]
    fn test_config_merge_overrides() {
        let mut base = Config::default();
        base.connection.baud = Some(115_200);
        base.protocol.min_line_chars = Some(9);

        let mut other = Config::default();
        other.connection.baud = Some(57_600);
        other.connection.port = Some("COM3".to_string());

        base.merge(other);
        assert_eq!(base.connection.baud, Some(57_600));
        assert_eq!(base.connection.port.as_deref(), Some("COM3"));
        assert_eq!(base.protocol.min_line_chars, Some(9));
    }

    #[test]
    fn test_config_merge_does_not_overwrite_with_none() {
        let mut base = Config::default();
        base.connection.port = Some("/dev/ttyUSB0".to_string());
        base.protocol.verify_response_crc = Some(false);

        base.merge(Config::default());
        assert_eq!(base.connection.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(base.protocol.verify_response_crc, Some(false));
    }

    #[test]
    fn test_client_config_defaults() {
        let client = Config::default().client_config();
        assert_eq!(client.channel.response_timeout, Duration::from_millis(2000));
        assert!(client.channel.verify_response_crc);
        assert_eq!(client.upload.min_line_chars, 7);
    }

    #[test]
    fn test_client_config_applies_protocol_section() {
        let mut config = Config::default();
        config.protocol.response_timeout_ms = Some(250);
        config.protocol.verify_response_crc = Some(false);
        config.protocol.min_line_chars = Some(5);

        let client = config.client_config();
        assert_eq!(client.channel.response_timeout, Duration::from_millis(250));
        assert!(!client.channel.verify_response_crc);
        assert_eq!(client.upload.min_line_chars, 5);
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "[connection]\nport = \"/dev/ttyACM1\"\n").unwrap();

        let config = Config::load_from_path(&path);
        assert_eq!(config.connection.port.as_deref(), Some("/dev/ttyACM1"));
    }

    #[test]
    fn test_load_from_invalid_path_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "invalid toml [[[").unwrap();

        assert_eq!(Config::load_from_path(&path), Config::default());
        assert_eq!(
            Config::load_from_path(&dir.path().join("missing.toml")),
            Config::default()
        );
    }

    #[test]
    fn test_save_port_keeps_other_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCAL_CONFIG_FILE);
        fs::write(&path, "[protocol]\nmin_line_chars = 5\n").unwrap();

        let mut config = Config::default();
        config.save_port_to(&path, "/dev/ttyUSB2").unwrap();
        assert_eq!(config.connection.port.as_deref(), Some("/dev/ttyUSB2"));

        let saved = Config::load_from_path(&path);
        assert_eq!(saved.connection.port.as_deref(), Some("/dev/ttyUSB2"));
        assert_eq!(saved.protocol.min_line_chars, Some(5));
    }

    #[test]
    fn test_global_config_path_name() {
        if let Some(path) = Config::global_config_path() {
            assert!(path.ends_with("config.toml"));
        }
    }
}
