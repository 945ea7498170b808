use config::{Config, ConfigError, Environment, File};
use domain::{BaudRate, Parity};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SerialConfig {
    /// Port to open; the last enumerated port when unset
    #[serde(default)]
    pub port: Option<String>,
    /// Line settings; the sensor's default preset when unset
    #[serde(default)]
    pub baudrate: Option<BaudRate>,
    #[serde(default)]
    pub parity: Option<Parity>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    1000
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baudrate: None,
            parity: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Session timing knobs, in milliseconds
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    #[serde(default = "default_join_timeout")]
    pub join_timeout_ms: u64,
    #[serde(default = "default_test_interval")]
    pub test_interval_ms: u64,
    #[serde(default = "default_close_timeout")]
    pub close_timeout_ms: u64,
}

fn default_join_timeout() -> u64 {
    2000
}
fn default_test_interval() -> u64 {
    1000
}
fn default_close_timeout() -> u64 {
    1000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            join_timeout_ms: default_join_timeout(),
            test_interval_ms: default_test_interval(),
            close_timeout_ms: default_close_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct ConsoleConfig {
    /// Sensor model picked when the command line names none
    #[serde(default)]
    pub sensor: Option<String>,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl ConsoleConfig {
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .set_default("serial.timeout_ms", default_timeout_ms())?
            .set_default("session.join_timeout_ms", default_join_timeout())?
            .set_default("session.test_interval_ms", default_test_interval())?
            .set_default("session.close_timeout_ms", default_close_timeout())?
            // Site defaults, e.g. config/default.toml
            .add_source(File::with_name(&format!("{}/default", config_dir)).required(false))
            // Per run mode overrides, e.g. config/bench.toml
            .add_source(File::with_name(&format!("{}/{}", config_dir, run_mode)).required(false))
            // Environment variables (e.g. SENSORBUS__SERIAL__PORT=/dev/ttyUSB1)
            .add_source(Environment::with_prefix("SENSORBUS").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
