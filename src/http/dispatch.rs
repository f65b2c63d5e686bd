/**
 * Command Dispatcher
 *
 * URL-unescapes the request target, splits it on '/' into a command name
 * and positional arguments, and executes it against the device facade.
 * The command token is parsed once into a closed enum; unknown tokens get
 * the literal "unknown command" response. Arguments are validated before
 * any device call, so a bad number never leaves a half-applied command.
 */

use std::fmt;

use tracing::debug;

use crate::config::config::{
    pin_mode_from_name, DeviceState, PinMode, DIAGNOSTIC_STRING, POLL_ANALOG_CHANNELS,
    POLL_DIGITAL_FIRST, POLL_DIGITAL_LAST, POLL_I2C_ADDRESSES,
};
use crate::controllers::DeviceController;

pub const OKAY: &str = "okay";

/// Commands understood by this server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    PinOutput,
    PinInput,
    PinHigh,
    PinLow,
    PinMode,
    DigitalWrite,
    AnalogWrite,
    ServoWrite,
    /// Alias kept for older clients.
    Servo,
    I2cRead,
    SendString,
    QueryAnalogMapping,
    Poll,
    Unrecognized(String),
}

impl Command {
    pub fn parse(token: &str) -> Command {
        match token {
            "pinOutput" => Command::PinOutput,
            "pinInput" => Command::PinInput,
            "pinHigh" => Command::PinHigh,
            "pinLow" => Command::PinLow,
            "pinMode" => Command::PinMode,
            "digitalWrite" => Command::DigitalWrite,
            "analogWrite" => Command::AnalogWrite,
            "servoWrite" => Command::ServoWrite,
            "servo" => Command::Servo,
            "i2cRead" => Command::I2cRead,
            "sendString" => Command::SendString,
            "queryAnalogMapping" => Command::QueryAnalogMapping,
            "poll" => Command::Poll,
            other => Command::Unrecognized(other.to_string()),
        }
    }
}

/// Errors raised while decoding or validating a command. All of them
/// surface to the client as the generic "unknown server error" body.
#[derive(Clone, Debug)]
pub enum DispatchError {
    /// Target was not valid percent-encoded UTF-8
    BadEncoding(String),
    /// Required positional argument absent
    MissingArgument { index: usize },
    /// Argument present but not a base-10 number in range
    BadNumber { index: usize, value: String },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::BadEncoding(target) => {
                write!(f, "Bad percent-encoding in target '{}'", target)
            }
            DispatchError::MissingArgument { index } => {
                write!(f, "Missing argument at position {}", index)
            }
            DispatchError::BadNumber { index, value } => {
                write!(f, "Failed to parse '{}' as number at position {}", value, index)
            }
        }
    }
}

impl std::error::Error for DispatchError {}

/// Execute one still-escaped command string and build the response body.
pub fn dispatch(raw: &str, device: &dyn DeviceController) -> Result<String, DispatchError> {
    let decoded = urlencoding::decode(raw)
        .map_err(|_| DispatchError::BadEncoding(raw.to_string()))?;
    let parts: Vec<&str> = decoded.split('/').collect();
    let command = Command::parse(parts[0]);
    debug!("dispatch {:?} {:?}", command, &parts[1..]);

    match command {
        Command::PinOutput => {
            let pin = int_arg(&parts, 1)?;
            device.set_pin_mode(pin, PinMode::Output);
            Ok(OKAY.into())
        }
        Command::PinInput => {
            let pin = int_arg(&parts, 1)?;
            device.set_pin_mode(pin, PinMode::Input);
            Ok(OKAY.into())
        }
        Command::PinHigh => {
            let pin = int_arg(&parts, 1)?;
            device.digital_write(pin, true);
            Ok(OKAY.into())
        }
        Command::PinLow => {
            let pin = int_arg(&parts, 1)?;
            device.digital_write(pin, false);
            Ok(OKAY.into())
        }
        Command::PinMode => {
            let pin = int_arg(&parts, 1)?;
            let mode = pin_mode_from_name(arg(&parts, 2)?);
            device.set_pin_mode(pin, mode);
            Ok(OKAY.into())
        }
        Command::DigitalWrite => {
            let pin = int_arg(&parts, 1)?;
            let high = arg(&parts, 2)? == "high";
            device.digital_write(pin, high);
            Ok(OKAY.into())
        }
        Command::AnalogWrite => {
            let pin = int_arg(&parts, 1)?;
            let value = int_arg(&parts, 2)?;
            device.analog_write(pin, value);
            Ok(OKAY.into())
        }
        Command::ServoWrite | Command::Servo => {
            let pin = int_arg(&parts, 1)?;
            let value = int_arg(&parts, 2)?;
            device.servo_write(pin, value);
            Ok(OKAY.into())
        }
        Command::I2cRead => {
            let address = int_arg(&parts, 1)?;
            let register = int_arg(&parts, 2)?;
            let length = int_arg(&parts, 3)?;
            // Fire-and-forget: the reply only shows up on a later poll.
            device.i2c_read(address, register, length);
            Ok(OKAY.into())
        }
        Command::SendString => {
            device.send_string(DIAGNOSTIC_STRING);
            Ok(OKAY.into())
        }
        Command::QueryAnalogMapping => {
            device.query_analog_mapping();
            Ok(OKAY.into())
        }
        Command::Poll => Ok(poll_snapshot(&device.state())),
        Command::Unrecognized(name) => Ok(format!("unknown command: {}", name)),
    }
}

/// Multi-line state snapshot: cached digital pins, analog channels, and
/// I2C replies, in ascending key order. The baseline i2cRead lines always
/// report 0; a cached reply adds one extra line for its address.
pub fn poll_snapshot(state: &DeviceState) -> String {
    let mut out = String::new();
    for pin in POLL_DIGITAL_FIRST..=POLL_DIGITAL_LAST {
        let value = if state.digital_values[pin as usize] {
            "true"
        } else {
            "false"
        };
        out.push_str(&format!("digitalRead/{} {}\n", pin, value));
    }
    for channel in 0..POLL_ANALOG_CHANNELS {
        out.push_str(&format!(
            "analogRead/{} {}\n",
            channel, state.analog_values[channel as usize]
        ));
    }
    for address in 0..POLL_I2C_ADDRESSES {
        out.push_str(&format!("i2cRead/{} 0\n", address));
        if let Some(reply) = state.i2c_replies.get(&(address as u8)) {
            let first = reply.data.first().copied().unwrap_or(0);
            out.push_str(&format!("i2cRead/{} {}\n", reply.address, first));
        }
    }
    out
}

fn arg<'a>(parts: &[&'a str], index: usize) -> Result<&'a str, DispatchError> {
    parts
        .get(index)
        .copied()
        .ok_or(DispatchError::MissingArgument { index })
}

fn int_arg<T: std::str::FromStr>(parts: &[&str], index: usize) -> Result<T, DispatchError> {
    let value = arg(parts, index)?;
    value.parse().map_err(|_| DispatchError::BadNumber {
        index,
        value: value.to_string(),
    })
}
