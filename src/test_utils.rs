/*
 * Test utilities and mock helpers for Dewheater
 *
 * This module provides fake sysfs trees, ready-made settings and small
 * helpers shared by the unit test modules.
 */

#[cfg(test)]
pub mod test_utils {
    use crate::config::Settings;
    use std::fs;
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use tempfile::{NamedTempFile, TempDir};

    /// Settings matching a typical install: band 1..3°C above the dew point,
    /// heater limits -5..35°C, safety cut at 50°C.
    pub fn create_test_settings() -> Settings {
        Settings {
            debug: true,
            dht_pin: 4,
            heater_pin: 17,
            cut_in_offset_c: 1.0,
            cut_out_offset_c: 3.0,
            safety_shutoff_c: 50.0,
            max_temp_c: 35.0,
            min_temp_c: -5.0,
            poll_interval_secs: 1,
            on_off_delay_secs: 1,
            invert_output: false,
            simulation_enabled: false,
            simulation_sample_count: 0,
            sensor_retries: 1,
            sensor_retry_delay_ms: 0,
            iio_root: PathBuf::from("/nonexistent/iio"),
            gpio_root: PathBuf::from("/nonexistent/gpio"),
            status_log_path: None,
        }
    }

    /// Creates a temporary IIO tree holding one `dht11` device at `iio:device0`
    pub fn create_mock_iio_dir(temp_milli: i64, hum_milli: i64) -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let dev = temp_dir.path().join("iio:device0");
        fs::create_dir_all(&dev).unwrap();
        fs::write(dev.join("name"), "dht11\n").unwrap();
        write_iio_sample(temp_dir.path(), temp_milli, hum_milli);
        temp_dir
    }

    /// Replaces the sample exposed by the device created above
    pub fn write_iio_sample(root: &Path, temp_milli: i64, hum_milli: i64) {
        let dev = root.join("iio:device0");
        fs::write(dev.join("in_temp_input"), format!("{}\n", temp_milli)).unwrap();
        fs::write(dev.join("in_humidityrelative_input"), format!("{}\n", hum_milli)).unwrap();
    }

    /// Creates a temporary gpio class directory with `pin` already exported
    pub fn create_mock_gpio_dir(pin: u32) -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let line = temp_dir.path().join(format!("gpio{}", pin));
        fs::create_dir_all(&line).unwrap();
        fs::write(temp_dir.path().join("export"), "").unwrap();
        fs::write(line.join("direction"), "in").unwrap();
        fs::write(line.join("value"), "0").unwrap();
        temp_dir
    }

    pub fn read_gpio_value(root: &Path, pin: u32) -> String {
        fs::read_to_string(root.join(format!("gpio{}/value", pin)))
            .unwrap()
            .trim()
            .to_string()
    }

    /// Creates a temporary file with JSON content
    pub fn create_temp_json_file<T: serde::Serialize>(data: &T) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        let json = serde_json::to_string_pretty(data).unwrap();
        temp_file.write_all(json.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    /// Asserts that two floating point numbers are approximately equal
    pub fn assert_approx_eq(a: f64, b: f64, tolerance: f64) {
        assert!(
            (a - b).abs() < tolerance,
            "Values {} and {} are not approximately equal (tolerance: {})",
            a, b, tolerance
        );
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::*;
    use crate::config::{load_settings, validate_settings};
    use crate::sensor::{HumiditySensor, IioDht22};
    use std::time::Duration;

    #[test]
    fn test_settings_are_valid() {
        assert!(validate_settings(&create_test_settings()).is_ok());
    }

    #[test]
    fn test_settings_survive_json_file() {
        let settings = create_test_settings();
        let file = create_temp_json_file(&settings);
        assert_eq!(load_settings(file.path()).unwrap(), settings);
    }

    #[test]
    fn test_mock_iio_dir_is_readable() {
        let dir = create_mock_iio_dir(12500, 70000);
        let mut sensor = IioDht22::new(dir.path(), 4, 1, Duration::ZERO);
        let r = sensor.read().unwrap();
        assert_approx_eq(r.temperature_c, 12.5, 1e-9);

        write_iio_sample(dir.path(), -1000, 90000);
        let r = sensor.read().unwrap();
        assert_approx_eq(r.temperature_c, -1.0, 1e-9);
        assert_approx_eq(r.humidity_pct, 90.0, 1e-9);
    }

    #[test]
    fn test_mock_gpio_dir() {
        let dir = create_mock_gpio_dir(17);
        assert_eq!(read_gpio_value(dir.path(), 17), "0");
    }

    #[test]
    #[should_panic]
    fn test_assert_approx_eq_fails() {
        assert_approx_eq(1.0, 1.1, 0.01);
    }
}
