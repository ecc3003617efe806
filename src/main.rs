use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;

use color_eyre::{eyre::eyre, Result};
use hass_mqtt_device::config::AppConfig;
use hass_mqtt_device::{devices, Connector};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Polls between simulated state flips.
const TOGGLE_EVERY: u64 = 10;

struct Args {
    debug: bool,
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = parse_args()?;
    setup(args.debug)?;

    let config_path = args.config.unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load_or_init(&config_path)
        .map_err(|e| eyre!("Failed to load {}: {}", config_path.display(), e))?;
    info!("Using config {}", config_path.display());

    // Commands are only recorded here, the loop applies and reports them.
    let requested = Rc::new(Cell::new(None));
    let sink = requested.clone();
    let device = devices::switch(
        &config.device.name,
        &config.device.resolve_unique_id(),
        move |state| {
            info!("Hub requested state {}", if state { "ON" } else { "OFF" });
            sink.set(Some(state));
        },
    )?;

    let mut connector = Connector::new(config.broker.clone());
    let id = connector.register_device(device)?;
    if let Err(e) = connector.connect() {
        warn!("Initial connect failed, retrying in the background: {}", e);
    }

    let mut state = false;
    let mut polls: u64 = 0;
    loop {
        connector.process_messages(config.poll_interval(), false);
        polls += 1;

        let next = match requested.take() {
            Some(wanted) if wanted == state => {
                info!("State already {}", state);
                None
            }
            Some(wanted) => Some(wanted),
            None if polls % TOGGLE_EVERY == 0 => Some(!state),
            None => None,
        };
        let Some(next) = next else {
            continue;
        };

        state = next;
        info!("State changed to {}", state);
        match connector
            .function_mut(id, devices::SWITCH)
            .and_then(|f| f.as_switch_mut())
        {
            Some(switch) => switch.update(state),
            None => return Err(eyre!("Switch function disappeared from device {}", id)),
        }
    }
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        debug: false,
        config: None,
    };
    let mut argv = std::env::args().skip(1);
    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "-d" | "--debug" => args.debug = true,
            "-c" | "--config" => {
                let path = argv
                    .next()
                    .ok_or_else(|| eyre!("{} expects a path", arg))?;
                args.config = Some(PathBuf::from(path));
            }
            other => return Err(eyre!("Unknown argument {}. Usage: hass-mqtt-device [-d] [-c <config>]", other)),
        }
    }
    Ok(args)
}

fn setup(debug: bool) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging_env(debug);
    Ok(())
}

fn setup_logging_env(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();
}
