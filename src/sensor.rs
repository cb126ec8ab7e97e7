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
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::config::Settings;
use crate::reading::SensorReading;

/// Name the kernel `dht11` IIO driver reports for both DHT11 and DHT22.
pub const DHT_DRIVER_NAME: &str = "dht11";

#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("no dht11 IIO device for pin {pin} under {}", root.display())]
    DeviceNotFound { pin: u32, root: PathBuf },
    #[error("no reading from DHT22 after {attempts} attempt(s): {last}")]
    NoReading { attempts: u32, last: String },
}

#[derive(Error, Debug)]
enum SampleError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
}

#[cfg_attr(test, mockall::automock)]
pub trait HumiditySensor {
    /// One sample, retried internally before giving up.
    fn read(&mut self) -> Result<SensorReading, AcquisitionError>;
}

/// DHT22 read through the kernel IIO interface
/// (`dtoverlay=dht11,gpiopin=N`).
#[derive(Debug, Clone)]
pub struct IioDht22 {
    root: PathBuf,
    pin: u32,
    attempts: u32,
    retry_delay: Duration,
}

impl IioDht22 {
    pub fn new(root: impl Into<PathBuf>, pin: u32, attempts: u32, retry_delay: Duration) -> Self {
        Self {
            root: root.into(),
            pin,
            attempts: attempts.max(1),
            retry_delay,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            &settings.iio_root,
            settings.dht_pin,
            settings.sensor_retries,
            settings.sensor_retry_delay(),
        )
    }

    /// Find the device directory for our pin. A device whose path carries a
    /// `dht11@<pin>` node for another pin is skipped; one with no node name
    /// at all is used if nothing better turns up.
    pub fn resolve_device_dir(&self) -> Option<PathBuf> {
        let entries = fs::read_dir(&self.root).ok()?;
        let mut fallback: Option<PathBuf> = None;
        for ent in entries.flatten() {
            let dir = ent.path();
            match read_trimmed(dir.join("name")) {
                Ok(name) if name == DHT_DRIVER_NAME => {}
                _ => continue,
            }
            let canon = fs::canonicalize(&dir).unwrap_or_else(|_| dir.clone());
            match node_pin(&canon) {
                Some(pin) if pin == self.pin => return Some(dir),
                Some(_) => continue,
                None => {
                    if fallback.is_none() { fallback = Some(dir); }
                }
            }
        }
        fallback
    }

    fn read_once(&self, dir: &Path) -> Result<SensorReading, SampleError> {
        let temp_milli = read_milli(dir.join("in_temp_input"))?;
        let hum_milli = read_milli(dir.join("in_humidityrelative_input"))?;
        Ok(SensorReading::new(temp_milli / 1000.0, hum_milli / 1000.0))
    }
}

impl HumiditySensor for IioDht22 {
    fn read(&mut self) -> Result<SensorReading, AcquisitionError> {
        let dir = self.resolve_device_dir().ok_or_else(|| AcquisitionError::DeviceNotFound {
            pin: self.pin,
            root: self.root.clone(),
        })?;
        read_retry(self.attempts, self.retry_delay, || self.read_once(&dir))
    }
}

/// Call `sample` up to `attempts` times, sleeping `delay` between failures.
fn read_retry<F>(attempts: u32, delay: Duration, mut sample: F) -> Result<SensorReading, AcquisitionError>
where
    F: FnMut() -> Result<SensorReading, SampleError>,
{
    let mut last = String::new();
    for attempt in 1..=attempts {
        match sample() {
            Ok(reading) => return Ok(reading),
            Err(e) => {
                debug!("DHT22 read attempt {}/{} failed: {}", attempt, attempts, e);
                last = e.to_string();
            }
        }
        if attempt < attempts && !delay.is_zero() {
            thread::sleep(delay);
        }
    }
    Err(AcquisitionError::NoReading { attempts, last })
}

// Pin from a "dht11@<hex>" component of a canonical sysfs path
fn node_pin(path: &Path) -> Option<u32> {
    path.components().find_map(|c| {
        let s = c.as_os_str().to_str()?;
        let unit = s.strip_prefix(DHT_DRIVER_NAME)?.strip_prefix('@')?;
        u32::from_str_radix(unit, 16).ok()
    })
}

fn read_milli<P: AsRef<Path>>(p: P) -> Result<f64, SampleError> {
    let raw = read_trimmed(&p)?;
    raw.parse::<i64>()
        .map(|v| v as f64)
        .map_err(|_| SampleError::Parse(format!("{:?} in {}", raw, p.as_ref().display())))
}

fn read_trimmed<P: AsRef<Path>>(p: P) -> io::Result<String> {
    let mut s = String::new();
    fs::File::open(p)?.read_to_string(&mut s)?;
    Ok(s.trim().to_string())
}
