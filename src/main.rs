pub mod app;
pub mod channel;
pub mod config;
pub mod gpio;
pub mod hardware;
pub mod keyboard;
pub mod mqtt;

use std::path::PathBuf;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::app::{Controller, Signals};
use crate::config::{Config, DEFAULT_CONFIG_PATH};
use crate::gpio::rppal_board::RppalBoard;
use crate::gpio::BoardLayout;
use crate::hardware::{HardwareHandle, HardwareSettings};
use crate::keyboard::{KeyboardError, KeyboardHandle};
use crate::mqtt::{Bridge, MqttHandler};

/// Bridges the relay board to an MQTT broker
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Configuration file
    #[arg(default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup()?;

    let config = match Config::load(&args.config) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!(
                "Invalid configuration in {}, not starting the MQTT bridge: {}",
                args.config.display(),
                e
            );
            None
        }
    };

    let board = RppalBoard::open().map_err(|e| eyre!("Failed to set up the relays for output: {}", e))?;
    let settings = HardwareSettings::default();
    let stop_timeout = settings.stop_timeout;
    let (hardware, actuator, dispatcher) =
        HardwareHandle::spawn(&board, &BoardLayout::default(), Some(settings))
            .map_err(|e| eyre!("Failed to set up the relays for output: {}", e))?;

    let mut controller = Controller::new(actuator, dispatcher);

    if let Some(config) = &config {
        let (event_sender, event_receiver) = mpsc::unbounded_channel();
        let bridge = Bridge::new(MqttHandler::new(event_sender), config);
        controller = controller.with_bridge(bridge, event_receiver);
    }

    let (key_sender, key_receiver) = mpsc::unbounded_channel();
    let keyboard = match KeyboardHandle::spawn(key_sender) {
        Ok(keyboard) => {
            controller = controller.with_keyboard(key_receiver);
            Some(keyboard)
        }
        Err(KeyboardError::NotATerminal) => {
            info!("Standard input is not a terminal, keyboard control disabled");
            None
        }
        Err(e) => {
            warn!("Keyboard control disabled: {}", e);
            None
        }
    };

    let signals = Signals::install()?;
    controller.run(signals).await;

    hardware.shutdown().await;
    if let Some(keyboard) = keyboard {
        keyboard.shutdown(stop_timeout).await;
    }
    drop(board);
    info!("Successfully shut down the relay connection");
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}
