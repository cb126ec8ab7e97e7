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

use std::ops::RangeInclusive;

use serde::Serialize;
use thiserror::Error;

/// Physically plausible temperature range for a DHT22, in °C.
pub const TEMPERATURE_RANGE_C: RangeInclusive<f64> = -40.0..=80.0;

/// Relative humidity range, in %.
pub const HUMIDITY_RANGE_PCT: RangeInclusive<f64> = 0.0..=100.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReadingError {
    #[error("input out of range: temp = {temperature_c:.1}C, humidity = {humidity_pct:.1}%")]
    OutOfRange { temperature_c: f64, humidity_pct: f64 },
}

/// One temperature/humidity sample as delivered by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorReading {
    pub temperature_c: f64,
    pub humidity_pct: f64,
}

impl SensorReading {
    pub fn new(temperature_c: f64, humidity_pct: f64) -> Self {
        Self { temperature_c, humidity_pct }
    }

    pub fn is_valid(&self) -> bool {
        TEMPERATURE_RANGE_C.contains(&self.temperature_c) && HUMIDITY_RANGE_PCT.contains(&self.humidity_pct)
    }

    /// Reject samples outside the sensor's physical range. NaN never validates.
    pub fn validate(&self) -> Result<(), ReadingError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(self.out_of_range())
        }
    }

    pub(crate) fn out_of_range(&self) -> ReadingError {
        ReadingError::OutOfRange {
            temperature_c: self.temperature_c,
            humidity_pct: self.humidity_pct,
        }
    }
}
