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

//! Dewheater - dew heater relay control for Linux
//!
//! Reads temperature and humidity from a DHT22, derives the dew point and
//! switches a heater relay with hysteresis, min/max overrides and a latching
//! safety shutoff.

pub mod reading;
pub mod dewpoint;
pub mod simulation;
pub mod controller;
pub mod config;
pub mod sensor;
pub mod relay;
pub mod status;
pub mod service;
pub mod logger;

#[cfg(test)]
pub mod test_utils;
