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

use serde::Serialize;
use tracing::info;

/// How far below the dew point a simulated sample is placed.
pub const SIMULATED_DEPRESSION_C: f64 = 2.0;

/// Forces the effective temperature under the dew point for a fixed number
/// of cycles. Once exhausted it stays off for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SimulationOverlay {
    enabled: bool,
    cycles_remaining: u32,
}

impl SimulationOverlay {
    pub fn new(enabled: bool, sample_count: u32) -> Self {
        Self {
            enabled: enabled && sample_count > 0,
            cycles_remaining: if enabled { sample_count } else { 0 },
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, 0)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn cycles_remaining(&self) -> u32 {
        self.cycles_remaining
    }

    /// Effective temperature for this cycle. Consumes one simulated cycle
    /// while active.
    pub fn apply(&mut self, effective_temp_c: f64, dew_point_c: f64) -> f64 {
        if !self.enabled || self.cycles_remaining == 0 {
            return effective_temp_c;
        }

        self.cycles_remaining -= 1;
        if self.cycles_remaining == 0 {
            self.enabled = false;
            info!("Simulation complete, using real temperature from next cycle");
        }
        dew_point_c - SIMULATED_DEPRESSION_C
    }
}

impl Default for SimulationOverlay {
    fn default() -> Self {
        Self::disabled()
    }
}
