

/*************** Program Entry Point *******************/

//
// opens the serial connection, spawns the device driver task,
// and runs the single-connection HTTP listener

// module declaration
mod config;
mod controllers;
mod drivers;
mod firmata;
mod http;
mod utilities;

// imports
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::config::{DEVICE_BAUD_RATE, HTTP_PORT};
use crate::controllers::DeviceController;

/// HTTP bridge between a Scratch-style extension client and a board
/// running StandardFirmata.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Serial port the board is attached to (e.g. /dev/ttyACM0, COM5)
    serial_port: String,

    /// TCP port the HTTP listener binds to
    #[arg(long, default_value_t = HTTP_PORT)]
    http_port: u16,

    /// Serial baud rate
    #[arg(long, default_value_t = DEVICE_BAUD_RATE)]
    baud: u32,
}

// main function
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let device = build_device(&args)?;
    tokio::select! {
        result = http::server::run(args.http_port, device) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
    }
    Ok(())
}

// Device task and command channel are wired here; with the mock feature
// the bridge runs without hardware.
#[cfg(not(feature = "mock"))]
fn build_device(
    args: &Args,
) -> Result<Arc<dyn DeviceController>, Box<dyn std::error::Error + Send + Sync>> {
    use std::sync::RwLock;
    use tokio::sync::mpsc;

    use crate::config::config::{DeviceCommand, DeviceState, COMMAND_CHANNEL_CAPACITY};
    use crate::controllers::device::DeviceClient;

    let port = utilities::utils::open_device_connection(&args.serial_port, args.baud)?;
    tracing::info!("serial port {} opened at {} baud", args.serial_port, args.baud);

    let state = Arc::new(RwLock::new(DeviceState::default()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<DeviceCommand>(COMMAND_CHANNEL_CAPACITY);

    tokio::spawn({
        let state_for_task = Arc::clone(&state);
        let state_for_err = Arc::clone(&state);
        async move {
            if let Err(e) = drivers::device::device_control(port, cmd_rx, state_for_task).await {
                tracing::error!("device task error: {}", e);
                let mut s = state_for_err.write().unwrap();
                s.last_error = Some(format!("device task error: {}", e));
                s.connected = false;
                s.status = Some("error".into());
            }
        }
    });

    Ok(Arc::new(DeviceClient::new(cmd_tx, state)))
}

#[cfg(feature = "mock")]
fn build_device(
    _args: &Args,
) -> Result<Arc<dyn DeviceController>, Box<dyn std::error::Error + Send + Sync>> {
    use crate::controllers::device::MockDevice;

    tracing::info!("mock device selected; serial port is not opened");
    Ok(Arc::new(MockDevice::new()))
}
