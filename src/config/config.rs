
use std::collections::HashMap;

pub const HTTP_PORT: u16 = 12345;

pub const DEVICE_SERIAL_PORT: &str = "/dev/ttyACM0"; // TODO: Configure for your hardware
pub const DEVICE_BAUD_RATE: u32 = 115200;

// Wait for the board's bootloader to time out after the port is opened.
pub const STARTUP_DELAY_SECS: u64 = 3;

// 14 digital pins plus the analog aliases A0..A5.
pub const PIN_COUNT: usize = 20;
pub const ANALOG_CHANNEL_COUNT: usize = 16;

pub const A0: u8 = 14;
pub const A1: u8 = 15;
pub const A2: u8 = 16;
pub const A3: u8 = 17;
pub const A4: u8 = 18;
pub const A5: u8 = 19;

// Ranges reported by the poll command.
pub const POLL_DIGITAL_FIRST: u8 = 2;
pub const POLL_DIGITAL_LAST: u8 = 13;
pub const POLL_ANALOG_CHANNELS: u8 = 6;
pub const POLL_I2C_ADDRESSES: u16 = 255;

// Fixed payload for the sendString diagnostic command.
pub const DIAGNOSTIC_STRING: &str = "111";

pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Pin modes understood by the Firmata firmware.
/// Discriminants match the wire values of the SET_PIN_MODE message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PinMode {
    #[default]
    Input = 0,
    Output = 1,
    Analog = 2,
    Pwm = 3,
    Servo = 4,
}

// Mode names accepted by the pinMode command. The names arrive
// percent-encoded from the client and the dispatcher decodes the whole
// request target first, so the table keeps the encoded spellings: a
// singly-encoded name therefore never matches and falls back to Input,
// which is the behavior the extension client relies on.
pub const PIN_MODE_NAMES: [(&str, PinMode); 5] = [
    ("Digital%20Input", PinMode::Input),
    ("Digital%20Output", PinMode::Output),
    ("Analog%20Input", PinMode::Analog),
    ("Analog%20Output%28PWM%29", PinMode::Pwm),
    ("Servo", PinMode::Servo),
];

pub fn pin_mode_from_name(name: &str) -> PinMode {
    PIN_MODE_NAMES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, m)| *m)
        .unwrap_or(PinMode::Input)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceCommand {
    SetPinMode { pin: u8, mode: PinMode },
    DigitalWrite { pin: u8, high: bool },
    AnalogWrite { pin: u8, value: u16 },
    ServoWrite { pin: u8, value: u16 },
    I2cRead { address: u8, register: u16, length: u16 },
    SendString(String),
    QueryAnalogMapping,
}

/// Most recent decoded I2C reply for one peripheral address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct I2cReply {
    pub address: u8,
    pub register: u16,
    pub data: Vec<u8>,
}

// Cached device state shared between the HTTP dispatcher and the driver
// task. Keep simple and cloneable so poll can take one snapshot under the
// lock. Digital/analog values hold the requested value for writes and the
// confirmed value for decoded reports; I2C replies and the analog mapping
// are only ever confirmed device state.
#[derive(Clone, Debug)]
pub struct DeviceState {
    pub connected: bool,
    pub pin_modes: [PinMode; PIN_COUNT],
    pub digital_values: [bool; PIN_COUNT],
    pub analog_values: [u16; ANALOG_CHANNEL_COUNT],
    pub i2c_replies: HashMap<u8, I2cReply>,
    pub analog_mapping: Option<Vec<u8>>,
    pub firmware_version: Option<(u8, u8)>,
    pub status: Option<String>,
    pub last_error: Option<String>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            connected: false,
            pin_modes: [PinMode::Input; PIN_COUNT],
            digital_values: [false; PIN_COUNT],
            analog_values: [0; ANALOG_CHANNEL_COUNT],
            i2c_replies: HashMap::new(),
            analog_mapping: None,
            firmware_version: None,
            status: None,
            last_error: None,
        }
    }
}
