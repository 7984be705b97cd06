use std::error::Error;
use std::path::Path;
use std::time::Duration;

use ini::Ini;

/// Ring and timing parameters of a node. Everything has a default; an
/// optional INI file overrides individual values.
///
/// ```ini
/// [ring]
/// successor_list_length = 4
///
/// [intervals]
/// stabilize_ms = 1000
/// fix_fingers_ms = 500
/// check_predecessor_ms = 3000
///
/// [timeouts]
/// lookup_ms = 1000
/// ping_ms = 500
/// connect_ms = 500
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub successor_list_length: usize,
    pub stabilize_interval_ms: u64,
    pub fix_fingers_interval_ms: u64,
    pub check_predecessor_interval_ms: u64,
    pub lookup_timeout_ms: u64,
    pub ping_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            successor_list_length: 4,
            stabilize_interval_ms: 1_000,
            fix_fingers_interval_ms: 500,
            check_predecessor_interval_ms: 3_000,
            lookup_timeout_ms: 1_000,
            ping_timeout_ms: 500,
            connect_timeout_ms: 500,
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Config, Box<dyn Error>> {
        let mut config = Config::default();
        if let Some(path) = path {
            let ini = Ini::load_from_file(path)?;
            if let Some(section) = ini.section(Some("ring")) {
                if let Some(value) = section.get("successor_list_length") {
                    config.successor_list_length = value.parse()?;
                }
            }
            if let Some(section) = ini.section(Some("intervals")) {
                if let Some(value) = section.get("stabilize_ms") {
                    config.stabilize_interval_ms = value.parse()?;
                }
                if let Some(value) = section.get("fix_fingers_ms") {
                    config.fix_fingers_interval_ms = value.parse()?;
                }
                if let Some(value) = section.get("check_predecessor_ms") {
                    config.check_predecessor_interval_ms = value.parse()?;
                }
            }
            if let Some(section) = ini.section(Some("timeouts")) {
                if let Some(value) = section.get("lookup_ms") {
                    config.lookup_timeout_ms = value.parse()?;
                }
                if let Some(value) = section.get("ping_ms") {
                    config.ping_timeout_ms = value.parse()?;
                }
                if let Some(value) = section.get("connect_ms") {
                    config.connect_timeout_ms = value.parse()?;
                }
            }
        }
        if config.successor_list_length == 0 {
            return Err("successor_list_length must be at least 1".into());
        }
        Ok(config)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
