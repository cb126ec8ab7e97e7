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

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Settings;
use crate::logger;

/// Pause between steps of the startup relay self-test.
pub const SELF_TEST_PAUSE: Duration = Duration::from_secs(1);

// udev needs a moment to create gpioN after an export
const EXPORT_SETTLE_POLLS: u32 = 10;
const EXPORT_SETTLE_DELAY: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("failed to export GPIO {pin}: {source}")]
    Export { pin: u32, source: io::Error },
    #[error("failed to configure GPIO {pin} as output: {source}")]
    Direction { pin: u32, source: io::Error },
    #[error("failed to write GPIO {pin}: {source}")]
    Write { pin: u32, source: io::Error },
}

/// Boolean output driving the heater. Repeating a command is harmless.
#[cfg_attr(test, mockall::automock)]
pub trait Actuator {
    fn set_output(&mut self, on: bool) -> Result<(), RelayError>;
}

/// Relay on a sysfs GPIO line (`/sys/class/gpio/gpioN`).
#[derive(Debug)]
pub struct SysfsGpioRelay {
    pin: u32,
    invert: bool,
    value_path: PathBuf,
}

impl SysfsGpioRelay {
    /// Export the line if needed and make it an output, starting at the
    /// level that means "off".
    pub fn open(gpio_root: &Path, pin: u32, invert: bool) -> Result<Self, RelayError> {
        let line_dir = gpio_root.join(format!("gpio{}", pin));
        if !line_dir.exists() {
            fs::write(gpio_root.join("export"), pin.to_string())
                .map_err(|source| RelayError::Export { pin, source })?;
            for _ in 0..EXPORT_SETTLE_POLLS {
                if line_dir.exists() { break; }
                thread::sleep(EXPORT_SETTLE_DELAY);
            }
        }

        // "low"/"high" set the direction and the initial level in one write
        let initial = if invert { "high" } else { "low" };
        fs::write(line_dir.join("direction"), initial)
            .map_err(|source| RelayError::Direction { pin, source })?;

        debug!("GPIO {} configured as output (inverted: {})", pin, invert);
        Ok(Self { pin, invert, value_path: line_dir.join("value") })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, RelayError> {
        Self::open(&settings.gpio_root, settings.heater_pin, settings.invert_output)
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    /// Signal level for a logical state.
    pub fn level(&self, on: bool) -> u8 {
        u8::from(on != self.invert)
    }
}

impl Actuator for SysfsGpioRelay {
    fn set_output(&mut self, on: bool) -> Result<(), RelayError> {
        let level = self.level(on);
        fs::write(&self.value_path, level.to_string())
            .map_err(|source| RelayError::Write { pin: self.pin, source })?;
        logger::log_event(
            "relay_write",
            json!({
                "pin": self.pin,
                "on": on,
                "level": level,
                "inverted": self.invert,
            }),
        );
        Ok(())
    }
}

/// Click the relay ON, OFF, ON, OFF so wiring faults are obvious at boot.
/// Every step drives the line. Ends OFF.
pub fn cycle_relay<A: Actuator + ?Sized>(relay: &mut A, pause: Duration) -> Result<(), RelayError> {
    info!("Cycling dew heater relay as a start up test");
    relay.set_output(true)?;
    thread::sleep(pause);
    relay.set_output(false)?;
    thread::sleep(pause);
    relay.set_output(true)?;
    thread::sleep(pause);
    relay.set_output(false)
}
