//! Configuration for the roverd daemon.
//!
//! Loaded from a TOML file; every section has working defaults so a bare
//! `Config::rover_defaults()` runs against real hardware paths.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level daemon configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub device: DeviceConfig,
    pub network: NetworkConfig,
    pub video: VideoConfig,
    pub logging: LoggingConfig,
}

/// Device driver selection and paths
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// Driver kind: "uc0" (kernel driver) or "mock" (simulation)
    pub kind: String,
    /// Command char device of the uc0 driver
    pub dev_path: String,
    /// Input-event file carrying distance samples
    pub event_path: String,
    /// Cadence of the command dispatch loop toward the device
    pub dispatch_interval_ms: u64,
}

/// Network endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// TCP bind address for the single command client
    ///
    /// Examples:
    /// - `0.0.0.0:5551` - all interfaces
    /// - `192.168.1.122:5551` - one interface only
    pub bind_address: String,
    /// UDP destination for the availability broadcast
    pub broadcast_address: String,
    /// Cadence of the availability broadcast
    pub broadcast_interval_ms: u64,
}

/// Video stream collaborator settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VideoConfig {
    /// Port reported to clients asking for the stream
    pub port: u16,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Default configuration for the rover hardware
    pub fn rover_defaults() -> Self {
        Self {
            device: DeviceConfig {
                kind: "uc0".to_string(),
                dev_path: "/dev/uc0".to_string(),
                event_path: "/dev/input/event0".to_string(),
                dispatch_interval_ms: 100,
            },
            network: NetworkConfig {
                bind_address: "0.0.0.0:5551".to_string(),
                broadcast_address: "192.168.1.255:5552".to_string(),
                broadcast_interval_ms: 5000,
            },
            video: VideoConfig { port: 1234 },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::rover_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = Config::rover_defaults();
        assert_eq!(config.device.kind, "uc0");
        assert_eq!(config.device.dispatch_interval_ms, 100);
        assert_eq!(config.network.bind_address, "0.0.0.0:5551");
        assert_eq!(config.network.broadcast_interval_ms, 5000);
        assert_eq!(config.video.port, 1234);
    }

    #[test]
    fn toml_round_trip() {
        let config = Config::rover_defaults();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[device]"));
        assert!(toml_string.contains("[network]"));
        assert!(toml_string.contains("[video]"));
        assert!(toml_string.contains("[logging]"));

        let parsed: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(parsed.device.dev_path, config.device.dev_path);
        assert_eq!(parsed.network.broadcast_address, config.network.broadcast_address);
    }

    #[test]
    fn parses_a_mock_config() {
        let toml_content = r#"
[device]
kind = "mock"
dev_path = "/dev/null"
event_path = "/dev/null"
dispatch_interval_ms = 20

[network]
bind_address = "127.0.0.1:5551"
broadcast_address = "127.0.0.1:5552"
broadcast_interval_ms = 1000

[video]
port = 8080

[logging]
level = "debug"
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.device.kind, "mock");
        assert_eq!(config.device.dispatch_interval_ms, 20);
        assert_eq!(config.video.port, 8080);
        assert_eq!(config.logging.level, "debug");
    }
}
