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

//! Dew point from temperature and relative humidity.
//!
//! Magnus form with the Arden Buck (1996) coefficients: the over-water set
//! at or above 0°C, the over-ice set below it.

use crate::reading::{ReadingError, SensorReading};

struct BuckCoefficients {
    b: f64,
    c: f64,
    d: f64,
}

const OVER_WATER: BuckCoefficients = BuckCoefficients { b: 18.678, c: 257.14, d: 234.5 };
const OVER_ICE: BuckCoefficients = BuckCoefficients { b: 23.036, c: 279.82, d: 333.7 };

/// Dew point in °C for a sample, or `OutOfRange` if the sample is not a
/// plausible reading. 0% RH has no finite dew point and is also rejected.
pub fn dew_point(reading: &SensorReading) -> Result<f64, ReadingError> {
    reading.validate()?;

    let t = reading.temperature_c;
    let k = if t >= 0.0 { &OVER_WATER } else { &OVER_ICE };

    //            RH             b - T/d      T
    // gamma = ln(---) + ( ---------------- * ----- )
    //            100                          c + T
    let gamma = (reading.humidity_pct / 100.0).ln() + (k.b - t / k.d) * (t / (k.c + t));
    let dp = k.c * gamma / (k.b - gamma);

    if dp.is_finite() {
        Ok(dp)
    } else {
        Err(reading.out_of_range())
    }
}
