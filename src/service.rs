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

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::controller::{ActuatorCommand, ControllerState, CycleInput, Decision, HysteresisController, Rule};
use crate::dewpoint::dew_point;
use crate::logger;
use crate::reading::ReadingError;
use crate::relay::{cycle_relay, Actuator};
use crate::sensor::{AcquisitionError, HumiditySensor};
use crate::simulation::SimulationOverlay;
use crate::status::StatusSnapshot;

// Granularity of the inter-cycle sleep, so shutdown is noticed promptly
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Why a cycle did not reach the controller.
#[derive(Error, Debug)]
pub enum SkipReason {
    #[error("Sensor read failed: {0}")]
    Acquisition(#[from] AcquisitionError),
    #[error("Error calculating dew point, {0}")]
    Reading(#[from] ReadingError),
}

#[derive(Debug)]
pub enum CycleOutcome {
    Evaluated(StatusSnapshot),
    Skipped(SkipReason),
}

/// The control loop with its collaborators, built once at startup.
pub struct DewHeaterService<S, A> {
    settings: Settings,
    sensor: S,
    relay: A,
    controller: HysteresisController,
    simulation: SimulationOverlay,
}

impl<S: HumiditySensor, A: Actuator> DewHeaterService<S, A> {
    pub fn new(settings: Settings, sensor: S, relay: A) -> Self {
        let controller = HysteresisController::new(settings.limits());
        let simulation = settings.simulation();
        Self { settings, sensor, relay, controller, simulation }
    }

    pub fn state(&self) -> ControllerState {
        self.controller.state()
    }

    pub fn simulation(&self) -> &SimulationOverlay {
        &self.simulation
    }

    /// Relay self-test. The controller starts from OFF afterwards whatever
    /// the relay was doing before.
    pub fn startup(&mut self, pause: Duration) -> Result<()> {
        cycle_relay(&mut self.relay, pause).context("relay self-test failed")?;
        self.controller = HysteresisController::new(self.settings.limits());
        if self.simulation.is_enabled() {
            info!(
                "Simulation enabled for {} sample(s)",
                self.simulation.cycles_remaining()
            );
        }
        Ok(())
    }

    /// Sample, decide, drive. Invalid samples leave the controller untouched.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        if self.controller.state().safety_latched() {
            error!("Safety temperature exceeded, dew heater shut down, resolve issue then restart");
        }

        let reading = match self.sensor.read() {
            Ok(r) => r,
            Err(e) => return self.skip(e.into()),
        };
        let dp = match dew_point(&reading) {
            Ok(dp) => dp,
            Err(e) => return self.skip(e.into()),
        };

        if self.settings.debug {
            info!(
                "Temp = {:.1}C Humidity {:.1}% Dew Point = {:.1}C",
                reading.temperature_c, reading.humidity_pct, dp
            );
        }

        let effective = self.simulation.apply(reading.temperature_c, dp);
        let before = self.controller.state();
        let decision = self.controller.evaluate(&CycleInput {
            actual_c: reading.temperature_c,
            effective_c: effective,
            dew_point_c: dp,
        });

        report_decision(&before, &decision);
        if let Some(cmd) = decision.command {
            self.drive(cmd);
        }

        let snapshot = StatusSnapshot::new(
            reading.temperature_c,
            effective,
            reading.humidity_pct,
            dp,
            &decision,
            &self.simulation,
        );
        info!("{}", snapshot);
        if let Ok(data) = serde_json::to_value(&snapshot) {
            logger::log_event("cycle", data);
        }
        CycleOutcome::Evaluated(snapshot)
    }

    /// Run until `shutdown` is set.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        let interval = self.settings.poll_interval();
        info!("Checking dew point every {}s", interval.as_secs());
        while !shutdown.load(Ordering::SeqCst) {
            self.run_cycle();
            sleep_until_next(interval, shutdown);
        }
        info!("Stopping, dew heater left {}", if self.state().actuator_on() { "on" } else { "off" });
    }

    fn skip(&self, reason: SkipReason) -> CycleOutcome {
        warn!("{}", reason);
        logger::log_event("cycle_skipped", serde_json::json!({ "reason": reason.to_string() }));
        CycleOutcome::Skipped(reason)
    }

    fn drive(&mut self, cmd: ActuatorCommand) {
        if let Err(e) = self.relay.set_output(cmd.is_on()) {
            error!("{}", e);
        }
    }
}

fn report_decision(before: &ControllerState, d: &Decision) {
    if before.max_override_active() && !d.state.max_override_active() {
        info!("Dew heater max temp override released");
    }
    match (d.rule, d.command) {
        (Rule::SafetyShutoff, _) => error!(
            "Safety temperature exceeded, shutting down dew heater, restart of service required to clear shutdown"
        ),
        (Rule::SafetyLatched, _) => debug!("Command ignored, dew heater is shut down"),
        (Rule::MaxOverride, Some(_)) => info!("Dew heater max temp reached, turning dew heater off"),
        (Rule::MaxOverride, None) => debug!("Dew heater max temp override active, heater stays off"),
        (Rule::MinOverride, Some(_)) => info!("Dew heater min temp reached, turning dew heater on"),
        (Rule::MinOverride, None) => debug!("Dew heater min temp override active, heater stays on"),
        (Rule::MinOverrideReleased, _) => info!("Dew heater min temp override released"),
        (Rule::CutIn, _) => info!("Dew point reached, turning dew heater on"),
        (Rule::CutOut, _) => info!("Dew point exceeded, turning dew heater off"),
        (Rule::Band, _) => debug!(
            "Within hysteresis band, dew heater already {}",
            if d.state.actuator_on() { "on" } else { "off" }
        ),
    }
}

fn sleep_until_next(interval: Duration, shutdown: &AtomicBool) {
    let start = Instant::now();
    while !shutdown.load(Ordering::SeqCst) {
        let elapsed = start.elapsed();
        if elapsed >= interval {
            break;
        }
        thread::sleep(SLEEP_SLICE.min(interval - elapsed));
    }
}

/// Drive the relay OFF once.
pub fn force_off<A: Actuator + ?Sized>(relay: &mut A) -> Result<()> {
    info!("Turning dew heater OFF");
    relay.set_output(false).context("failed to turn dew heater off")?;
    info!("Dew heater off");
    Ok(())
}

/// Toggle the relay with `delay` per phase until `shutdown` is set.
pub fn run_relay_test<A: Actuator + ?Sized>(relay: &mut A, delay: Duration, shutdown: &AtomicBool) -> Result<()> {
    info!("Dew heater relay test started");
    let mut on = false;
    while !shutdown.load(Ordering::SeqCst) {
        switch(relay, &mut on, true)?;
        info!("On for {} seconds...", delay.as_secs());
        sleep_until_next(delay, shutdown);
        switch(relay, &mut on, false)?;
        info!("Off for {} seconds...", delay.as_secs());
        sleep_until_next(delay, shutdown);
    }
    Ok(())
}

// Commands matching the current state are ignored
fn switch<A: Actuator + ?Sized>(relay: &mut A, on: &mut bool, want: bool) -> Result<()> {
    let word = if want { "on" } else { "off" };
    if *on == want {
        info!("Dew heater already {}, command ignored", word);
        return Ok(());
    }
    relay.set_output(want).context("relay test write failed")?;
    *on = want;
    info!("Dew heater {}", word);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::SensorReading;
    use crate::relay::{MockActuator, RelayError};
    use crate::sensor::MockHumiditySensor;
    use crate::test_utils::test_utils::create_test_settings;
    use mockall::predicate::eq;
    use mockall::Sequence;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    // Saturated air puts the dew point just under the air temperature, which
    // is inside the cut-in offset of the test settings.

    /// Sensor that replays a fixed script of samples.
    struct ScriptedSensor(VecDeque<Result<SensorReading, AcquisitionError>>);

    impl HumiditySensor for ScriptedSensor {
        fn read(&mut self) -> Result<SensorReading, AcquisitionError> {
            self.0.pop_front().unwrap_or(Err(AcquisitionError::NoReading {
                attempts: 1,
                last: "script exhausted".into(),
            }))
        }
    }

    /// Actuator that records every write.
    #[derive(Clone, Default)]
    struct RecordingRelay(Arc<Mutex<Vec<bool>>>);

    impl Actuator for RecordingRelay {
        fn set_output(&mut self, on: bool) -> Result<(), RelayError> {
            self.0.lock().unwrap().push(on);
            Ok(())
        }
    }

    impl RecordingRelay {
        fn writes(&self) -> Vec<bool> {
            self.0.lock().unwrap().clone()
        }
    }

    fn scripted(samples: &[(f64, f64)]) -> ScriptedSensor {
        ScriptedSensor(samples.iter().map(|&(t, h)| Ok(SensorReading::new(t, h))).collect())
    }

    fn evaluated(o: CycleOutcome) -> StatusSnapshot {
        match o {
            CycleOutcome::Evaluated(s) => s,
            CycleOutcome::Skipped(r) => panic!("cycle skipped: {}", r),
        }
    }

    #[test]
    fn test_startup_cycles_relay_and_starts_off() {
        let mut relay = MockActuator::new();
        let mut seq = Sequence::new();
        for on in [true, false, true, false] {
            relay.expect_set_output().with(eq(on)).times(1).in_sequence(&mut seq).returning(|_| Ok(()));
        }
        let mut svc = DewHeaterService::new(create_test_settings(), MockHumiditySensor::new(), relay);
        svc.startup(Duration::ZERO).unwrap();
        assert!(!svc.state().actuator_on());
        assert!(!svc.state().safety_latched());
    }

    #[test]
    fn test_startup_relay_failure_is_error() {
        let mut relay = MockActuator::new();
        relay.expect_set_output().returning(|_| {
            Err(RelayError::Write {
                pin: 17,
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            })
        });
        let mut svc = DewHeaterService::new(create_test_settings(), MockHumiditySensor::new(), relay);
        assert!(svc.startup(Duration::ZERO).is_err());
    }

    #[test]
    fn test_cold_saturated_air_turns_heater_on_once() {
        let relay = RecordingRelay::default();
        let sensor = scripted(&[(5.0, 100.0), (5.0, 100.0)]);
        let mut svc = DewHeaterService::new(create_test_settings(), sensor, relay.clone());

        let s = evaluated(svc.run_cycle());
        assert!(s.heater_on);
        assert_eq!(s.rule, Rule::CutIn);
        let s = evaluated(svc.run_cycle());
        assert!(s.heater_on);
        assert_eq!(relay.writes(), vec![true]);
    }

    #[test]
    fn test_acquisition_failure_holds_state() {
        let relay = RecordingRelay::default();
        let mut sensor = MockHumiditySensor::new();
        let mut seq = Sequence::new();
        sensor
            .expect_read()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(SensorReading::new(5.0, 100.0)));
        sensor.expect_read().times(1).in_sequence(&mut seq).returning(|| {
            Err(AcquisitionError::NoReading { attempts: 15, last: "timeout".into() })
        });
        let mut svc = DewHeaterService::new(create_test_settings(), sensor, relay.clone());

        evaluated(svc.run_cycle());
        let before = svc.state();
        match svc.run_cycle() {
            CycleOutcome::Skipped(SkipReason::Acquisition(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(svc.state(), before);
        assert!(svc.state().actuator_on());
        assert_eq!(relay.writes(), vec![true]);
    }

    #[test]
    fn test_out_of_range_reading_holds_state() {
        let relay = RecordingRelay::default();
        let sensor = scripted(&[(5.0, 100.0), (95.0, 30.0), (20.0, 130.0)]);
        let mut svc = DewHeaterService::new(create_test_settings(), sensor, relay.clone());

        evaluated(svc.run_cycle());
        let before = svc.state();
        for _ in 0..2 {
            assert!(matches!(svc.run_cycle(), CycleOutcome::Skipped(SkipReason::Reading(_))));
            assert_eq!(svc.state(), before);
        }
        // 95°C would have tripped the safety latch had it been accepted
        assert!(!svc.state().safety_latched());
        assert_eq!(relay.writes(), vec![true]);
    }

    /// Runs `setup` as valid cycles, then feeds one acquisition failure and
    /// two out-of-range samples. Every skipped cycle must leave the state and
    /// the relay alone. Returns the held state.
    fn hold_through_invalid_samples(setup: &[(f64, f64)]) -> ControllerState {
        let mut script: VecDeque<_> = setup.iter().map(|&(t, h)| Ok(SensorReading::new(t, h))).collect();
        script.push_back(Err(AcquisitionError::NoReading { attempts: 1, last: "timeout".into() }));
        script.push_back(Ok(SensorReading::new(20.0, 130.0)));
        // Would trip the safety latch if it were accepted
        script.push_back(Ok(SensorReading::new(95.0, 30.0)));

        let relay = RecordingRelay::default();
        let mut svc = DewHeaterService::new(create_test_settings(), ScriptedSensor(script), relay.clone());
        for _ in setup {
            evaluated(svc.run_cycle());
        }
        let held = svc.state();
        let writes = relay.writes();
        for _ in 0..3 {
            assert!(matches!(svc.run_cycle(), CycleOutcome::Skipped(_)));
            assert_eq!(svc.state(), held);
            assert_eq!(relay.writes(), writes);
        }
        held
    }

    #[test]
    fn test_invalid_samples_hold_max_override() {
        let held = hold_through_invalid_samples(&[(5.0, 100.0), (36.0, 20.0)]);
        assert!(held.max_override_active());
        assert!(!held.actuator_on());
        assert!(!held.safety_latched());
    }

    #[test]
    fn test_invalid_samples_hold_min_override() {
        let held = hold_through_invalid_samples(&[(-8.0, 50.0)]);
        assert!(held.min_override_active());
        assert!(held.actuator_on());
        assert!(!held.safety_latched());
    }

    #[test]
    fn test_invalid_samples_hold_safety_latch() {
        let held = hold_through_invalid_samples(&[(5.0, 100.0), (55.0, 10.0)]);
        assert!(held.safety_latched());
        assert!(!held.actuator_on());
    }

    #[test]
    fn test_safety_latch_forces_off_and_stays_off() {
        let relay = RecordingRelay::default();
        let sensor = scripted(&[(5.0, 100.0), (52.0, 10.0), (0.0, 100.0), (-20.0, 100.0)]);
        let mut svc = DewHeaterService::new(create_test_settings(), sensor, relay.clone());

        evaluated(svc.run_cycle());
        let s = evaluated(svc.run_cycle());
        assert!(s.safety_latched);
        assert_eq!(s.rule, Rule::SafetyShutoff);
        for _ in 0..2 {
            let s = evaluated(svc.run_cycle());
            assert!(!s.heater_on);
            assert!(s.safety_latched);
            assert_eq!(s.rule, Rule::SafetyLatched);
        }
        assert_eq!(relay.writes(), vec![true, false]);
    }

    #[test]
    fn test_simulation_runs_three_cycles_then_real_temperature() {
        let mut settings = create_test_settings();
        settings.simulation_enabled = true;
        settings.simulation_sample_count = 3;
        let relay = RecordingRelay::default();
        // Warm, dry air: real temperature far above the dew point
        let sensor = scripted(&[(20.0, 30.0); 5]);
        let mut svc = DewHeaterService::new(settings, sensor, relay.clone());

        for i in 0..3 {
            let s = evaluated(svc.run_cycle());
            assert!((s.effective_temp_c - (s.dew_point_c - 2.0)).abs() < 1e-9, "cycle {}", i);
            assert_eq!(s.actual_temp_c, 20.0);
            assert!(s.heater_on);
        }
        assert!(!svc.simulation().is_enabled());

        let s = evaluated(svc.run_cycle());
        assert_eq!(s.effective_temp_c, 20.0);
        assert!(!s.simulation_enabled);
        assert!(!s.heater_on);
        assert_eq!(relay.writes(), vec![true, false]);
    }

    #[test]
    fn test_relay_write_error_does_not_stop_cycle() {
        let mut relay = MockActuator::new();
        relay.expect_set_output().returning(|_| {
            Err(RelayError::Write {
                pin: 17,
                source: std::io::Error::new(std::io::ErrorKind::Other, "io"),
            })
        });
        let sensor = scripted(&[(5.0, 100.0)]);
        let mut svc = DewHeaterService::new(create_test_settings(), sensor, relay);
        let s = evaluated(svc.run_cycle());
        assert!(s.heater_on);
    }

    #[test]
    fn test_run_stops_on_shutdown() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let mut sensor = MockHumiditySensor::new();
        sensor.expect_read().times(1).returning(move || {
            flag.store(true, Ordering::SeqCst);
            Ok(SensorReading::new(5.0, 100.0))
        });
        let relay = RecordingRelay::default();
        let mut svc = DewHeaterService::new(create_test_settings(), sensor, relay.clone());
        svc.run(&shutdown);
        assert_eq!(relay.writes(), vec![true]);
    }

    #[test]
    fn test_force_off() {
        let mut relay = MockActuator::new();
        relay.expect_set_output().with(eq(false)).times(1).returning(|_| Ok(()));
        force_off(&mut relay).unwrap();
    }

    #[test]
    fn test_relay_test_toggles_until_shutdown() {
        let shutdown = AtomicBool::new(true);
        let mut relay = RecordingRelay::default();
        run_relay_test(&mut relay, Duration::ZERO, &shutdown).unwrap();
        assert!(relay.writes().is_empty());

        // One full on/off round, then stop
        struct StopAfterOff {
            inner: RecordingRelay,
            stop: Arc<AtomicBool>,
        }
        impl Actuator for StopAfterOff {
            fn set_output(&mut self, on: bool) -> Result<(), RelayError> {
                if !on {
                    self.stop.store(true, Ordering::SeqCst);
                }
                self.inner.set_output(on)
            }
        }
        let stop = Arc::new(AtomicBool::new(false));
        let inner = RecordingRelay::default();
        let mut relay = StopAfterOff { inner: inner.clone(), stop: stop.clone() };
        run_relay_test(&mut relay, Duration::ZERO, &stop).unwrap();
        assert_eq!(inner.writes(), vec![true, false]);
    }
}
