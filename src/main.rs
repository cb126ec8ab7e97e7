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

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use dewheater::config::{config_path, load_settings, settings_warnings};
use dewheater::logger;
use dewheater::relay::{SysfsGpioRelay, SELF_TEST_PAUSE};
use dewheater::sensor::IioDht22;
use dewheater::service::{force_off, run_relay_test, DewHeaterService};

const USAGE: &str = "\
Usage: dewheater [run|off|test] [--config PATH]

Commands:
  run     control the dew heater (default)
  off     turn the dew heater relay off and exit
  test    toggle the relay on and off until interrupted

Options:
  --config PATH   settings file (default: $DEWHEATER_CONFIG or /etc/dewheater/dewheaterconfig.json)
  -h, --help      show this help";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    Off,
    Test,
}

struct Args {
    command: Command,
    config: Option<PathBuf>,
}

fn parse_args(mut it: impl Iterator<Item = String>) -> Result<Option<Args>, String> {
    let mut command: Option<Command> = None;
    let mut config = None;
    while let Some(a) = it.next() {
        match a.as_str() {
            "-h" | "--help" => return Ok(None),
            "--config" => {
                let p = it.next().ok_or("--config needs a path")?;
                config = Some(PathBuf::from(p));
            }
            "run" | "off" | "test" if command.is_none() => {
                command = Some(match a.as_str() {
                    "off" => Command::Off,
                    "test" => Command::Test,
                    _ => Command::Run,
                });
            }
            other => return Err(format!("unexpected argument '{}'", other)),
        }
    }
    Ok(Some(Args { command: command.unwrap_or(Command::Run), config }))
}

fn main() -> anyhow::Result<()> {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(Some(a)) => a,
        Ok(None) => {
            println!("{}", USAGE);
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}\n\n{}", e, USAGE);
            std::process::exit(1);
        }
    };

    // SAFETY: geteuid has no preconditions
    if unsafe { libc::geteuid() } != 0 {
        eprintln!("Error: dewheater requires root privileges to access GPIO.");
        eprintln!("Please run with: sudo {}", std::env::args().next().unwrap_or_else(|| "dewheater".to_string()));
        std::process::exit(1);
    }

    let path = config_path(args.config.as_deref());
    let settings = match load_settings(&path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let sink = logger::init_tracing(settings.debug);
    info!("Dewheater {} starting, logging to {:?}", env!("CARGO_PKG_VERSION"), sink);
    info!("Settings loaded from {}", path.display());
    match serde_json::to_string_pretty(&settings) {
        Ok(json) => info!("{}", json),
        Err(e) => warn!("Could not render settings: {}", e),
    }
    for w in settings_warnings(&settings) {
        warn!("{}", w);
    }

    if let Some(log_path) = &settings.status_log_path {
        if let Err(e) = logger::init_status_log(log_path) {
            warn!("Status log {} unavailable: {}", log_path.display(), e);
        }
    }
    logger::log_event("startup", serde_json::json!({ "command": format!("{:?}", args.command) }));

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received SIGINT/SIGTERM, stopping after the current cycle");
        flag.store(true, Ordering::SeqCst);
    }) {
        warn!("Failed to set signal handler: {}", e);
    }

    let mut relay = SysfsGpioRelay::from_settings(&settings).context("dew heater relay setup failed")?;

    match args.command {
        Command::Off => force_off(&mut relay)?,
        Command::Test => run_relay_test(&mut relay, settings.on_off_delay(), &shutdown)?,
        Command::Run => {
            let sensor = IioDht22::from_settings(&settings);
            let mut service = DewHeaterService::new(settings, sensor, relay);
            service.startup(SELF_TEST_PAUSE)?;
            service.run(&shutdown);
        }
    }

    logger::log_event("shutdown", serde_json::json!({}));
    logger::close_status_log();
    Ok(())
}
