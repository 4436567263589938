//! Daemon configuration.
//!
//! Two TOML files: the server configuration (logging and system tuning) and
//! the serial configuration, one table per master device:
//!
//! ```toml
//! ["/dev/ttyUSB0"]
//! baudrate = 115200
//! virtuals = ["gps", "logger"]
//! writer = "gps"
//! ```
//!
//! Each virtual suffix becomes a device node at `<master-path>.<suffix>`;
//! the `writer` names the single virtual allowed to send data back to the
//! master.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::types::SproxyError;

/// Default baud rate when a device table does not set one.
pub const DEFAULT_BAUDRATE: u32 = 9600;

const DEFAULT_SERIAL_CONFIGFILE: &str = "serial.toml";

const DEFAULT_HZ: u32 = 10;
const MIN_HZ: u32 = 1;
const MAX_HZ: u32 = 500;

const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 1000;
const MIN_RECONNECT_INTERVAL_MS: u64 = 100;
const MAX_RECONNECT_INTERVAL_MS: u64 = 60_000;

/// Path of a virtual device node: `<master-path>.<suffix>`.
pub fn virtual_path(device: &str, suffix: &str) -> String {
    format!("{device}.{suffix}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Filter directive understood by the log framework.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub logging: LoggingConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log destination; stderr when unset.
    pub logfile: Option<PathBuf>,
    pub loglevel: LogLevel,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct SystemConfig {
    /// Event loop tick frequency, clamped to 1..=500.
    pub hz: u32,
    /// How often disconnected devices are reopened, clamped to 100..=60000.
    pub reconnect_interval_ms: u64,
    pub pidfile: Option<PathBuf>,
    pub serial_configfile: PathBuf,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            hz: DEFAULT_HZ,
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
            pidfile: None,
            serial_configfile: PathBuf::from(DEFAULT_SERIAL_CONFIGFILE),
        }
    }
}

impl SystemConfig {
    /// Poll timeout of one event loop iteration.
    pub fn tick(&self) -> Duration {
        Duration::from_millis(u64::from(1000 / self.hz.max(1)))
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, SproxyError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SproxyError::Config(format!("{}: {e}", path.display())))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, SproxyError> {
        let mut config: ServerConfig =
            toml::from_str(text).map_err(|e| SproxyError::Config(e.to_string()))?;
        config.system.hz = config.system.hz.clamp(MIN_HZ, MAX_HZ);
        config.system.reconnect_interval_ms = config
            .system
            .reconnect_interval_ms
            .clamp(MIN_RECONNECT_INTERVAL_MS, MAX_RECONNECT_INTERVAL_MS);
        Ok(config)
    }
}

/// One master device table from the serial configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    pub baudrate: u32,
    /// Virtual device suffixes exposed for this master.
    pub virtuals: Vec<String>,
    /// Suffix of the virtual allowed to write back to the master.
    pub writer: Option<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            baudrate: DEFAULT_BAUDRATE,
            virtuals: Vec::new(),
            writer: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct SerialConfig {
    /// Master device path -> device table.
    pub devices: BTreeMap<String, DeviceConfig>,
}

impl SerialConfig {
    pub fn load(path: &Path) -> Result<Self, SproxyError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SproxyError::Config(format!("{}: {e}", path.display())))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, SproxyError> {
        let config: SerialConfig =
            toml::from_str(text).map_err(|e| SproxyError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), SproxyError> {
        for (device, table) in &self.devices {
            let mut seen = BTreeSet::new();
            for suffix in &table.virtuals {
                if suffix.is_empty() {
                    return Err(SproxyError::Config(format!("{device}: empty virtual suffix")));
                }
                if !seen.insert(suffix) {
                    return Err(SproxyError::Config(format!(
                        "{device}: duplicate virtual suffix \"{suffix}\""
                    )));
                }
            }
            if let Some(writer) = &table.writer {
                if !table.virtuals.contains(writer) {
                    return Err(SproxyError::Config(format!(
                        "{device}: writer \"{writer}\" is not a declared virtual"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::parse("").unwrap();
        assert_eq!(config.system.hz, 10);
        assert_eq!(config.system.reconnect_interval_ms, 1000);
        assert_eq!(config.system.serial_configfile, PathBuf::from("serial.toml"));
        assert!(config.system.pidfile.is_none());
        assert!(config.logging.logfile.is_none());
        assert_eq!(config.logging.loglevel, LogLevel::Debug);
    }

    #[test]
    fn test_server_config_full() {
        let text = r#"
            [logging]
            logfile = "/var/log/sproxyd.log"
            loglevel = "warn"

            [system]
            hz = 50
            reconnect-interval-ms = 5000
            pidfile = "/var/run/sproxyd.pid"
            serial-configfile = "/etc/sproxy/serial.toml"
        "#;
        let config = ServerConfig::parse(text).unwrap();
        assert_eq!(config.logging.logfile, Some(PathBuf::from("/var/log/sproxyd.log")));
        assert_eq!(config.logging.loglevel, LogLevel::Warn);
        assert_eq!(config.system.hz, 50);
        assert_eq!(config.system.reconnect_interval_ms, 5000);
        assert_eq!(config.system.pidfile, Some(PathBuf::from("/var/run/sproxyd.pid")));
    }

    #[test]
    fn test_server_config_clamps_hz() {
        let low = ServerConfig::parse("[system]\nhz = 0\n").unwrap();
        assert_eq!(low.system.hz, 1);

        let high = ServerConfig::parse("[system]\nhz = 100000\n").unwrap();
        assert_eq!(high.system.hz, 500);
    }

    #[test]
    fn test_server_config_clamps_reconnect_interval() {
        let low = ServerConfig::parse("[system]\nreconnect-interval-ms = 1\n").unwrap();
        assert_eq!(low.system.reconnect_interval_ms, 100);

        let high = ServerConfig::parse("[system]\nreconnect-interval-ms = 86400000\n").unwrap();
        assert_eq!(high.system.reconnect_interval_ms, 60_000);
    }

    #[test]
    fn test_server_config_rejects_unknown_keys() {
        assert!(ServerConfig::parse("[system]\nthreads = 4\n").is_err());
    }

    #[test]
    fn test_tick_follows_hz() {
        let mut system = SystemConfig::default();
        assert_eq!(system.tick(), Duration::from_millis(100));
        system.hz = 500;
        assert_eq!(system.tick(), Duration::from_millis(2));
    }

    #[test]
    fn test_serial_config_parse() {
        let text = r#"
            ["/dev/ttyUSB0"]
            baudrate = 115200
            virtuals = ["gps", "logger"]
            writer = "gps"

            ["/dev/ttyS1"]
            virtuals = ["tap"]
        "#;
        let config = SerialConfig::parse(text).unwrap();
        assert_eq!(config.devices.len(), 2);

        let usb = &config.devices["/dev/ttyUSB0"];
        assert_eq!(usb.baudrate, 115200);
        assert_eq!(usb.virtuals, vec!["gps", "logger"]);
        assert_eq!(usb.writer.as_deref(), Some("gps"));

        let s1 = &config.devices["/dev/ttyS1"];
        assert_eq!(s1.baudrate, DEFAULT_BAUDRATE);
        assert!(s1.writer.is_none());
    }

    #[test]
    fn test_serial_config_rejects_unknown_writer() {
        let text = r#"
            ["/dev/ttyUSB0"]
            virtuals = ["gps"]
            writer = "console"
        "#;
        assert!(SerialConfig::parse(text).is_err());
    }

    #[test]
    fn test_serial_config_rejects_duplicate_suffix() {
        let text = r#"
            ["/dev/ttyUSB0"]
            virtuals = ["gps", "gps"]
        "#;
        assert!(SerialConfig::parse(text).is_err());
    }

    #[test]
    fn test_serial_config_rejects_empty_suffix() {
        let text = r#"
            ["/dev/ttyUSB0"]
            virtuals = [""]
        "#;
        assert!(SerialConfig::parse(text).is_err());
    }

    #[test]
    fn test_virtual_path_format() {
        assert_eq!(virtual_path("/dev/ttyUSB0", "gps"), "/dev/ttyUSB0.gps");
    }
}
