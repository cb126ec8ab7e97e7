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

//! Hysteresis decision engine.
//!
//! Rules are checked in a fixed order and the first one that applies ends
//! the cycle:
//!
//! 1. safety shutoff (latching, only a restart clears it)
//! 2. max temperature override
//! 3. min temperature override
//! 4. dew point cut-in / cut-out band
//!
//! `evaluate` is pure: it takes the previous state and returns the next one
//! together with the command (if any) that must be sent to the relay.

use serde::Serialize;

/// Thresholds the engine works against, all in °C.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ControlLimits {
    pub cut_in_offset_c: f64,
    pub cut_out_offset_c: f64,
    pub safety_shutoff_c: f64,
    pub max_temp_c: f64,
    pub min_temp_c: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorCommand {
    On,
    Off,
}

impl ActuatorCommand {
    pub fn is_on(self) -> bool {
        matches!(self, ActuatorCommand::On)
    }
}

impl From<bool> for ActuatorCommand {
    fn from(on: bool) -> Self {
        if on { ActuatorCommand::On } else { ActuatorCommand::Off }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct NormalState {
    pub heater_on: bool,
    pub max_override: bool,
    pub min_override: bool,
}

/// Once `Latched`, the heater is off and nothing can turn it back on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ControllerState {
    Normal(NormalState),
    Latched,
}

impl ControllerState {
    pub fn actuator_on(&self) -> bool {
        match self {
            ControllerState::Normal(s) => s.heater_on,
            ControllerState::Latched => false,
        }
    }

    pub fn safety_latched(&self) -> bool {
        matches!(self, ControllerState::Latched)
    }

    pub fn max_override_active(&self) -> bool {
        matches!(self, ControllerState::Normal(s) if s.max_override)
    }

    pub fn min_override_active(&self) -> bool {
        matches!(self, ControllerState::Normal(s) if s.min_override)
    }
}

impl Default for ControllerState {
    fn default() -> Self {
        ControllerState::Normal(NormalState::default())
    }
}

/// Which rule decided the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    SafetyShutoff,
    SafetyLatched,
    MaxOverride,
    MinOverride,
    MinOverrideReleased,
    CutIn,
    CutOut,
    Band,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Decision {
    pub state: ControllerState,
    pub command: Option<ActuatorCommand>,
    pub rule: Rule,
}

/// Temperatures for one cycle. `actual_c` is the real sensor value, used for
/// the safety and max checks. `effective_c` may be simulated and drives the
/// min check and the dew point band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CycleInput {
    pub actual_c: f64,
    pub effective_c: f64,
    pub dew_point_c: f64,
}

pub fn evaluate(state: ControllerState, limits: &ControlLimits, input: &CycleInput) -> Decision {
    let mut s = match state {
        ControllerState::Latched => {
            return Decision { state, command: None, rule: Rule::SafetyLatched };
        }
        ControllerState::Normal(s) => s,
    };

    if input.actual_c > limits.safety_shutoff_c {
        // The line is driven even if the heater is already off.
        return Decision {
            state: ControllerState::Latched,
            command: Some(ActuatorCommand::Off),
            rule: Rule::SafetyShutoff,
        };
    }

    if input.actual_c > limits.max_temp_c {
        // Max takes over from min; the min rule is re-checked fresh on release.
        s.max_override = true;
        s.min_override = false;
        return drive(s, false, Rule::MaxOverride);
    }
    // Releasing the max override re-enables the remaining rules this cycle.
    s.max_override = false;

    if input.effective_c < limits.min_temp_c {
        s.min_override = true;
        return drive(s, true, Rule::MinOverride);
    }
    if s.min_override {
        // Heater keeps its state; the band decides from the next cycle on.
        s.min_override = false;
        return Decision {
            state: ControllerState::Normal(s),
            command: None,
            rule: Rule::MinOverrideReleased,
        };
    }

    if !s.heater_on && input.effective_c <= input.dew_point_c + limits.cut_in_offset_c {
        return drive(s, true, Rule::CutIn);
    }
    if s.heater_on && input.effective_c >= input.dew_point_c + limits.cut_out_offset_c {
        return drive(s, false, Rule::CutOut);
    }
    Decision { state: ControllerState::Normal(s), command: None, rule: Rule::Band }
}

fn drive(mut s: NormalState, on: bool, rule: Rule) -> Decision {
    let command = (s.heater_on != on).then(|| ActuatorCommand::from(on));
    s.heater_on = on;
    Decision { state: ControllerState::Normal(s), command, rule }
}

/// Owns the controller state for the life of the process.
#[derive(Debug, Clone)]
pub struct HysteresisController {
    limits: ControlLimits,
    state: ControllerState,
}

impl HysteresisController {
    /// Starts with the heater off regardless of what the relay was doing.
    pub fn new(limits: ControlLimits) -> Self {
        Self { limits, state: ControllerState::default() }
    }

    pub fn limits(&self) -> &ControlLimits {
        &self.limits
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn evaluate(&mut self, input: &CycleInput) -> Decision {
        let decision = evaluate(self.state, &self.limits, input);
        self.state = decision.state;
        decision
    }
}
