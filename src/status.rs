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

use std::fmt;

use serde::Serialize;

use crate::controller::{ActuatorCommand, ControllerState, Decision, Rule};
use crate::simulation::SimulationOverlay;

/// Everything an operator needs to see why the heater is in its state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub actual_temp_c: f64,
    pub effective_temp_c: f64,
    pub humidity_pct: f64,
    pub dew_point_c: f64,
    pub heater_on: bool,
    pub max_override: bool,
    pub min_override: bool,
    pub safety_latched: bool,
    pub simulation_enabled: bool,
    pub simulation_cycles_remaining: u32,
    pub rule: Rule,
    pub command: Option<ActuatorCommand>,
}

impl StatusSnapshot {
    pub fn new(
        actual_temp_c: f64,
        effective_temp_c: f64,
        humidity_pct: f64,
        dew_point_c: f64,
        decision: &Decision,
        simulation: &SimulationOverlay,
    ) -> Self {
        let state: ControllerState = decision.state;
        Self {
            actual_temp_c,
            effective_temp_c,
            humidity_pct,
            dew_point_c,
            heater_on: state.actuator_on(),
            max_override: state.max_override_active(),
            min_override: state.min_override_active(),
            safety_latched: state.safety_latched(),
            simulation_enabled: simulation.is_enabled(),
            simulation_cycles_remaining: simulation.cycles_remaining(),
            rule: decision.rule,
            command: decision.command,
        }
    }
}

fn on_off(b: bool) -> &'static str {
    if b { "ON" } else { "OFF" }
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Temp = {:.1}C (effective {:.1}C) Humidity = {:.1}% Dew Point = {:.1}C | heater {} | max override {} | min override {} | safety latch {}",
            self.actual_temp_c,
            self.effective_temp_c,
            self.humidity_pct,
            self.dew_point_c,
            on_off(self.heater_on),
            on_off(self.max_override),
            on_off(self.min_override),
            on_off(self.safety_latched),
        )?;
        if self.simulation_enabled {
            write!(f, " | simulation ON ({} left)", self.simulation_cycles_remaining)
        } else {
            write!(f, " | simulation OFF")
        }
    }
}
