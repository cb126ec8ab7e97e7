/*
 * This file is part of Dewheater.
 *
 * Copyright (C) 2025 Dewheater contributors
 *
 * Dewheater is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Dewheater is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Dewheater. If not, see <https://www.gnu.org/licenses/>.
 */

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::controller::ControlLimits;
use crate::simulation::SimulationOverlay;

pub const CONFIG_ENV_VAR: &str = "DEWHEATER_CONFIG";

const HIGHEST_BCM_PIN: u32 = 63;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field, reason: reason.into() }
}

fn default_on_off_delay() -> u64 { 5 }
fn default_sensor_retries() -> u32 { 15 }
fn default_sensor_retry_delay_ms() -> u64 { 2000 }
fn default_iio_root() -> PathBuf { PathBuf::from("/sys/bus/iio/devices") }
fn default_gpio_root() -> PathBuf { PathBuf::from("/sys/class/gpio") }

/// Contents of `dewheaterconfig.json`. Read once at startup, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub debug: bool,
    #[serde(rename = "dhtPin")]
    pub dht_pin: u32,
    #[serde(rename = "dewHeaterPin")]
    pub heater_pin: u32,
    #[serde(rename = "dewHeaterCutinOffset")]
    pub cut_in_offset_c: f64,
    #[serde(rename = "dewHeaterCutoutOffset")]
    pub cut_out_offset_c: f64,
    #[serde(rename = "dewHeaterSafetyTempOFF")]
    pub safety_shutoff_c: f64,
    #[serde(rename = "dewHeaterMaxTemp")]
    pub max_temp_c: f64,
    #[serde(rename = "dewHeaterMinTemp")]
    pub min_temp_c: f64,
    /// Seconds between control cycles
    #[serde(rename = "dewPtCheckDelay")]
    pub poll_interval_secs: u64,
    /// Seconds per phase for `dewheater test`
    #[serde(rename = "dewHeaterOnOffDelay", default = "default_on_off_delay")]
    pub on_off_delay_secs: u64,
    #[serde(rename = "invertOutput", default)]
    pub invert_output: bool,
    #[serde(rename = "simulationEnabled", default)]
    pub simulation_enabled: bool,
    #[serde(rename = "simulationSampleCount", default)]
    pub simulation_sample_count: u32,
    #[serde(rename = "sensorRetries", default = "default_sensor_retries")]
    pub sensor_retries: u32,
    #[serde(rename = "sensorRetryDelayMs", default = "default_sensor_retry_delay_ms")]
    pub sensor_retry_delay_ms: u64,
    #[serde(rename = "iioRoot", default = "default_iio_root")]
    pub iio_root: PathBuf,
    #[serde(rename = "gpioRoot", default = "default_gpio_root")]
    pub gpio_root: PathBuf,
    #[serde(rename = "statusLogPath", default, skip_serializing_if = "Option::is_none")]
    pub status_log_path: Option<PathBuf>,
}

impl Settings {
    pub fn limits(&self) -> ControlLimits {
        ControlLimits {
            cut_in_offset_c: self.cut_in_offset_c,
            cut_out_offset_c: self.cut_out_offset_c,
            safety_shutoff_c: self.safety_shutoff_c,
            max_temp_c: self.max_temp_c,
            min_temp_c: self.min_temp_c,
        }
    }

    pub fn simulation(&self) -> SimulationOverlay {
        SimulationOverlay::new(self.simulation_enabled, self.simulation_sample_count)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn on_off_delay(&self) -> Duration {
        Duration::from_secs(self.on_off_delay_secs)
    }

    pub fn sensor_retry_delay(&self) -> Duration {
        Duration::from_millis(self.sensor_retry_delay_ms)
    }
}

/// Location of the settings file: `--config` wins, then `DEWHEATER_CONFIG`,
/// then the system path.
pub fn config_path(cli_override: Option<&Path>) -> PathBuf {
    if let Some(p) = cli_override {
        return p.to_path_buf();
    }
    if let Ok(p) = env::var(CONFIG_ENV_VAR) {
        if !p.is_empty() {
            return PathBuf::from(p);
        }
    }
    system_config_path()
}

pub fn system_config_path() -> PathBuf { PathBuf::from("/etc/dewheater/dewheaterconfig.json") }

pub fn parse_settings(data: &str, path: &Path) -> Result<Settings, ConfigError> {
    let settings: Settings = serde_json::from_str(data).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    validate_settings(&settings)?;
    Ok(settings)
}

pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_settings(&data, path)
}

pub fn validate_settings(s: &Settings) -> Result<(), ConfigError> {
    let temps = [
        ("dewHeaterCutinOffset", s.cut_in_offset_c),
        ("dewHeaterCutoutOffset", s.cut_out_offset_c),
        ("dewHeaterSafetyTempOFF", s.safety_shutoff_c),
        ("dewHeaterMaxTemp", s.max_temp_c),
        ("dewHeaterMinTemp", s.min_temp_c),
    ];
    for (field, v) in temps {
        if !v.is_finite() {
            return Err(invalid(field, "must be a finite number"));
        }
    }

    if s.min_temp_c >= s.max_temp_c {
        return Err(invalid("dewHeaterMinTemp", format!("{} must be below dewHeaterMaxTemp ({})", s.min_temp_c, s.max_temp_c)));
    }
    if s.max_temp_c >= s.safety_shutoff_c {
        return Err(invalid("dewHeaterMaxTemp", format!("{} must be below dewHeaterSafetyTempOFF ({})", s.max_temp_c, s.safety_shutoff_c)));
    }
    if s.poll_interval_secs == 0 {
        return Err(invalid("dewPtCheckDelay", "must be at least 1 second"));
    }
    if s.on_off_delay_secs == 0 {
        return Err(invalid("dewHeaterOnOffDelay", "must be at least 1 second"));
    }
    if s.dht_pin > HIGHEST_BCM_PIN {
        return Err(invalid("dhtPin", format!("{} is not a valid BCM pin", s.dht_pin)));
    }
    if s.heater_pin > HIGHEST_BCM_PIN {
        return Err(invalid("dewHeaterPin", format!("{} is not a valid BCM pin", s.heater_pin)));
    }
    if s.dht_pin == s.heater_pin {
        return Err(invalid("dewHeaterPin", "must differ from dhtPin"));
    }
    if s.sensor_retries == 0 {
        return Err(invalid("sensorRetries", "must be at least 1"));
    }
    if s.simulation_enabled && s.simulation_sample_count == 0 {
        return Err(invalid("simulationSampleCount", "must be positive when simulationEnabled is set"));
    }
    Ok(())
}

/// Non-fatal problems with otherwise valid settings. Returned rather than
/// logged so the caller can report them once tracing is up.
pub fn settings_warnings(s: &Settings) -> Vec<String> {
    let mut warnings = Vec::new();
    if s.cut_in_offset_c > s.cut_out_offset_c {
        warnings.push(format!(
            "dewHeaterCutinOffset ({}) is above dewHeaterCutoutOffset ({}), expect relay chatter",
            s.cut_in_offset_c, s.cut_out_offset_c
        ));
    }
    warnings
}
