/**
 * Firmata Device Driver
 *
 * Task owns all serial I/O to the board running StandardFirmata.
 * - A blocking reader thread drains the port and forwards raw byte chunks
 * - Incoming bytes feed the incremental Firmata decoder; decoded events
 *   update DeviceState in Arc<RwLock<DeviceState>> for dispatcher snapshots
 * - Commands arrive via mpsc channel and are encoded to protocol writes
 * - On startup: wait for the bootloader, then enable digital/analog
 *   reporting and configure I2C
 *
 * The HTTP listener must never block on device latency; writes go through
 * spawn_blocking on a cloned port handle.
 */

use std::io::{Read, Write};
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use serialport::SerialPort;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::config::config::{
    DeviceCommand, DeviceState, PIN_COUNT, POLL_ANALOG_CHANNELS, STARTUP_DELAY_SECS,
};
use crate::firmata::{Decoder, Encoder, Event};

const READ_BUF_SIZE: usize = 256;
const BYTE_CHANNEL_CAPACITY: usize = 64;

pub async fn device_control(
    port: Box<dyn SerialPort>,
    mut cmd_rx: mpsc::Receiver<DeviceCommand>,
    state: Arc<RwLock<DeviceState>>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let writer = port.try_clone()?;
    let (byte_tx, mut byte_rx) = mpsc::channel::<Bytes>(BYTE_CHANNEL_CAPACITY);

    // Reader thread: blocking reads with a short timeout, raw chunks over
    // the channel. A real read error ends the thread; the task keeps
    // serving writes.
    std::thread::spawn(move || {
        let mut port = port;
        let mut buf = [0u8; READ_BUF_SIZE];
        loop {
            match port.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => {
                    if byte_tx.blocking_send(Bytes::copy_from_slice(&buf[..n])).is_err() {
                        break; // receiver dropped, task is gone
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => {
                    warn!("serial read failed: {}", e);
                    break;
                }
            }
        }
    });

    // Let the bootloader time out before talking to the firmware.
    sleep(Duration::from_secs(STARTUP_DELAY_SECS)).await;

    let mut encoder = Encoder::new();
    let mut decoder = Decoder::new();

    // Reporting enables and I2C config, the firmware init sequence.
    let mut init = Vec::new();
    for port_idx in 0..2 {
        init.extend(encoder.report_digital(port_idx, true));
    }
    for channel in 0..POLL_ANALOG_CHANNELS {
        init.extend(encoder.report_analog(channel, true));
    }
    init.extend(encoder.i2c_config(0));
    if let Some(handle) = clone_port(writer.as_ref(), &state) {
        write_bytes(handle, init, &state).await;
    }

    {
        let mut s = state.write().unwrap();
        s.connected = true;
        s.status = Some("connected".into());
    }
    info!("device initialized");

    loop {
        tokio::select! {
            Some(command) = cmd_rx.recv() => {
                debug!("device command: {:?}", command);
                let bytes = match command {
                    DeviceCommand::SetPinMode { pin, mode } => {
                        encoder.set_pin_mode(pin, mode as u8)
                    }
                    DeviceCommand::DigitalWrite { pin, high } => {
                        encoder.digital_write(pin, high)
                    }
                    DeviceCommand::AnalogWrite { pin, value } => {
                        encoder.analog_write(pin, value)
                    }
                    DeviceCommand::ServoWrite { pin, value } => {
                        encoder.servo_write(pin, value)
                    }
                    DeviceCommand::I2cRead { address, register, length } => {
                        encoder.i2c_read(address, register, length)
                    }
                    DeviceCommand::SendString(text) => encoder.string_data(&text),
                    DeviceCommand::QueryAnalogMapping => encoder.analog_mapping_query(),
                };
                if let Some(handle) = clone_port(writer.as_ref(), &state) {
                    write_bytes(handle, bytes, &state).await;
                }
            }
            Some(chunk) = byte_rx.recv() => {
                for byte in chunk {
                    if let Some(event) = decoder.feed(byte) {
                        apply_event(&state, event);
                    }
                }
            }
            else => break, // both channels closed
        }
    }

    Ok(())
}

// Port handles are Send but not Sync, so the clone has to happen before
// the write future is awaited; clone failures are recorded in state.
fn clone_port(
    writer: &dyn SerialPort,
    state: &Arc<RwLock<DeviceState>>,
) -> Option<Box<dyn SerialPort>> {
    match writer.try_clone() {
        Ok(handle) => Some(handle),
        Err(e) => {
            let mut s = state.write().unwrap();
            s.last_error = Some(format!("port clone failed: {}", e));
            None
        }
    }
}

/// Write one encoded message on a cloned port handle so the task itself
/// never blocks on the device.
async fn write_bytes(
    mut port: Box<dyn SerialPort>,
    bytes: Vec<u8>,
    state: &Arc<RwLock<DeviceState>>,
) {
    match tokio::task::spawn_blocking(move || port.write_all(&bytes)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!("serial write failed: {}", e);
            let mut s = state.write().unwrap();
            s.last_error = Some(format!("write failed: {}", e));
        }
        Err(e) => {
            let mut s = state.write().unwrap();
            s.last_error = Some(format!("spawn failed: {}", e));
        }
    }
}

/// Fold one decoded event into the shared cache.
pub fn apply_event(state: &Arc<RwLock<DeviceState>>, event: Event) {
    match event {
        Event::DigitalPort { port, bits } => {
            let mut s = state.write().unwrap();
            for i in 0..8u8 {
                let pin = port as usize * 8 + i as usize;
                if pin < PIN_COUNT {
                    s.digital_values[pin] = bits & (1 << i) != 0;
                }
            }
        }
        Event::AnalogValue { channel, value } => {
            let mut s = state.write().unwrap();
            if let Some(slot) = s.analog_values.get_mut(channel as usize) {
                *slot = value;
            }
        }
        Event::I2c(reply) => {
            debug!("i2c reply from {:#04x}: {:?}", reply.address, reply.data);
            let mut s = state.write().unwrap();
            s.i2c_replies.insert(reply.address, reply);
        }
        Event::AnalogMapping(mapping) => {
            let mut s = state.write().unwrap();
            s.analog_mapping = Some(mapping);
        }
        Event::ProtocolVersion { major, minor } => {
            info!("firmware protocol version {}.{}", major, minor);
            let mut s = state.write().unwrap();
            s.firmware_version = Some((major, minor));
        }
        Event::StringMessage(text) => {
            info!("firmware says: {}", text);
        }
    }
}
