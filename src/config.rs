//! Host configuration
//!
//! Connection defaults for the console host, persisted as TOML under the
//! user configuration directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use printkit_communication::Endpoint;

/// How to reach the printer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Device path (`/dev/ttyUSB0`, `COM3`) or `host:port`.
    pub location: String,
    /// Baud rate for serial connections.
    pub baud: u32,
    /// Force the DTR line after opening a serial port.
    pub force_dtr: Option<bool>,
    /// Odd-parity open/reopen workaround for drivers that latch DTR.
    pub parity_workaround: bool,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            location: "/dev/ttyUSB0".to_string(),
            baud: 115200,
            force_dtr: None,
            parity_workaround: false,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionSettings,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories.
    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Default configuration file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("printkit").join("config.toml"))
    }

    /// Load the default configuration file, falling back to defaults when
    /// it does not exist yet.
    pub fn load_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("ignoring unreadable config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.connection.baud == 0 {
            anyhow::bail!("baud rate must be non-zero");
        }
        Ok(())
    }

    /// The endpoint described by the connection settings, serial
    /// workarounds applied.
    pub fn endpoint(&self) -> Endpoint {
        let conn = &self.connection;
        match Endpoint::parse(&conn.location, conn.baud) {
            Endpoint::Serial { port, baud, .. } => Endpoint::Serial {
                port,
                baud,
                force_dtr: conn.force_dtr,
                parity_workaround: conn.parity_workaround,
            },
            socket => socket,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.connection.location = "octopi.local:5000".to_string();
        config.connection.baud = 250000;
        config.save_to_file(&path).expect("save");

        let loaded = Config::load_from_file(&path).expect("load");
        assert_eq!(loaded, config);
    }

    #[test]
    fn endpoint_carries_serial_workarounds() {
        let mut config = Config::default();
        config.connection.location = "/dev/ttyACM0".to_string();
        config.connection.force_dtr = Some(false);
        config.connection.parity_workaround = true;

        match config.endpoint() {
            Endpoint::Serial {
                force_dtr,
                parity_workaround,
                ..
            } => {
                assert_eq!(force_dtr, Some(false));
                assert!(parity_workaround);
            }
            other => panic!("expected serial endpoint, got {other:?}"),
        }
    }

    #[test]
    fn zero_baud_is_rejected() {
        let mut config = Config::default();
        config.connection.baud = 0;
        assert!(config.validate().is_err());
    }
}
