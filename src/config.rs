use crate::devices::bno080::ImuConfig;
use crate::gesture::GestureConfig;
use serde::Deserialize;
use std::path::Path;

/// # Explanation
/// The application configuration, deserialized from a TOML file. Every
/// field carries a default so a missing file or a partial one is fine; the
/// bus-facing values can additionally be overridden through environment
/// variables (IMU_BUS, IMU_ADDR, IMU_HZ, IMU_TIMEOUT_MS).
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    /// Seconds to run before a clean shutdown; 0 keeps streaming forever.
    pub duration_s: u64,
    pub output: OutputConfig,
    pub sensor_parameters: SensorParameterConfig,
    pub gesture_parameters: GestureParameterConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Pose CSV destination; stdout when absent.
    pub path: Option<String>,
    /// Gesture event destination; stderr when absent.
    pub gesture_path: Option<String>,
    pub header: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SensorParameterConfig {
    pub bus: u8,
    pub addr: u16,
    pub hz: u32,
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GestureParameterConfig {
    pub baseline_window_s: f64,
    pub half_window_s: f64,
    pub min_dyn_threshold: f64,
    pub min_peak_magnitude: f64,
    pub min_gesture_interval: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: "info".to_string(),
            duration_s: 0,
            output: OutputConfig::default(),
            sensor_parameters: SensorParameterConfig::default(),
            gesture_parameters: GestureParameterConfig::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            path: None,
            gesture_path: None,
            header: true,
        }
    }
}

impl Default for SensorParameterConfig {
    fn default() -> Self {
        let imu = ImuConfig::default();
        SensorParameterConfig {
            bus: imu.bus,
            addr: imu.addr,
            hz: imu.hz,
            timeout_ms: imu.timeout_ms,
        }
    }
}

impl Default for GestureParameterConfig {
    fn default() -> Self {
        let gesture = GestureConfig::default();
        GestureParameterConfig {
            baseline_window_s: gesture.baseline_window_s,
            half_window_s: gesture.half_window_s,
            min_dyn_threshold: gesture.min_dyn_threshold,
            min_peak_magnitude: gesture.min_peak_magnitude,
            min_gesture_interval: gesture.min_gesture_interval,
        }
    }
}

impl Config {
    /// # Explanation
    /// Loads and validates the configuration. A missing file yields the
    /// defaults; a file that exists but does not parse or validate is an
    /// error (the caller exits with the invalid-arguments code).
    pub fn load(path: &Path) -> Result<Config, String> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => {
                toml::from_str(&content).map_err(|e| format!("{}: {}", path.display(), e))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(format!("{}: {}", path.display(), e)),
        };
        config.apply_env_overrides();
        config.validated()
    }

    fn apply_env_overrides(&mut self) {
        if let Some(bus) = env_parse("IMU_BUS") {
            self.sensor_parameters.bus = bus;
        }
        if let Some(addr) = std::env::var("IMU_ADDR").ok().and_then(|v| parse_addr(&v)) {
            self.sensor_parameters.addr = addr;
        }
        if let Some(hz) = env_parse("IMU_HZ") {
            self.sensor_parameters.hz = hz;
        }
        if let Some(timeout) = env_parse("IMU_TIMEOUT_MS") {
            self.sensor_parameters.timeout_ms = timeout;
        }
    }

    fn validated(mut self) -> Result<Config, String> {
        if self.sensor_parameters.addr > 0x7F {
            return Err(format!(
                "the slave address must be 7 bit, got 0x{:X}",
                self.sensor_parameters.addr
            ));
        }
        if self.sensor_parameters.timeout_ms == 0 {
            return Err("timeout_ms must be positive".to_string());
        }

        let hz = self.sensor_parameters.hz.clamp(1, 400);
        if hz != self.sensor_parameters.hz {
            log::warn!(
                "Report rate {} Hz is out of range, clamped to {} Hz.",
                self.sensor_parameters.hz,
                hz
            );
            self.sensor_parameters.hz = hz;
        }

        let g = &self.gesture_parameters;
        if g.baseline_window_s <= 0.0 || g.half_window_s <= 0.0 || g.min_gesture_interval < 0.0 {
            return Err("gesture windows must be positive".to_string());
        }

        Ok(self)
    }

    pub fn imu_config(&self) -> ImuConfig {
        ImuConfig {
            bus: self.sensor_parameters.bus,
            addr: self.sensor_parameters.addr,
            hz: self.sensor_parameters.hz,
            timeout_ms: self.sensor_parameters.timeout_ms,
        }
    }

    pub fn gesture_config(&self) -> GestureConfig {
        GestureConfig {
            baseline_window_s: self.gesture_parameters.baseline_window_s,
            half_window_s: self.gesture_parameters.half_window_s,
            min_dyn_threshold: self.gesture_parameters.min_dyn_threshold,
            min_peak_magnitude: self.gesture_parameters.min_peak_magnitude,
            min_gesture_interval: self.gesture_parameters.min_gesture_interval,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|value| value.parse().ok())
}

/// Accepts both decimal and 0x-prefixed hexadecimal slave addresses.
fn parse_addr(value: &str) -> Option<u16> {
    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16).ok()
    } else {
        value.parse().ok()
    }
}
