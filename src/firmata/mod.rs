/**
 * Firmata wire codec
 *
 * Encoder builds outgoing messages for a board running StandardFirmata;
 * Decoder is an incremental state machine fed one byte at a time from the
 * serial reader and yields decoded events (pin reports, I2C replies,
 * analog mapping, firmware version, string messages).
 *
 * Message layout (14-bit payloads split into two 7-bit bytes, LSB first):
 * - 0x90 | port  lsb msb      digital port bitmask
 * - 0xE0 | chan  lsb msb      analog value
 * - 0xC0 | chan  0|1          toggle analog reporting
 * - 0xD0 | port  0|1          toggle digital reporting
 * - 0xF4 pin mode             set pin mode
 * - 0xF9 major minor          protocol version
 * - 0xF0 <id> ... 0xF7        sysex (I2C, string data, analog mapping)
 */

use crate::config::config::I2cReply;

pub const DIGITAL_MESSAGE: u8 = 0x90;
pub const ANALOG_MESSAGE: u8 = 0xE0;
pub const REPORT_ANALOG: u8 = 0xC0;
pub const REPORT_DIGITAL: u8 = 0xD0;
pub const SET_PIN_MODE: u8 = 0xF4;
pub const REPORT_VERSION: u8 = 0xF9;
pub const START_SYSEX: u8 = 0xF0;
pub const END_SYSEX: u8 = 0xF7;

pub const ANALOG_MAPPING_QUERY: u8 = 0x69;
pub const ANALOG_MAPPING_RESPONSE: u8 = 0x6A;
pub const STRING_DATA: u8 = 0x71;
pub const I2C_REQUEST: u8 = 0x76;
pub const I2C_REPLY: u8 = 0x77;
pub const I2C_CONFIG: u8 = 0x78;

// Read-once mode bits of the I2C_REQUEST address-extension byte.
const I2C_READ_ONCE: u8 = 0x08;

// Value reported per pin in an analog mapping response when the pin has
// no analog channel.
pub const NOT_ANALOG: u8 = 127;

const DIGITAL_PORT_COUNT: usize = 16;

/// Decoded message received from the board.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Bitmask of the eight pins of one digital port.
    DigitalPort { port: u8, bits: u16 },
    /// Current reading of one analog channel.
    AnalogValue { channel: u8, value: u16 },
    /// Reply to an earlier I2C read request.
    I2c(I2cReply),
    /// Per-pin analog channel numbers (NOT_ANALOG for digital-only pins).
    AnalogMapping(Vec<u8>),
    /// Free-form text from the firmware.
    StringMessage(String),
    /// Protocol version advertised by the firmware.
    ProtocolVersion { major: u8, minor: u8 },
}

/// Builds outgoing Firmata messages. Stateful: digital writes keep the
/// last written bitmask per port, since the wire message always carries
/// the whole port.
#[derive(Default)]
pub struct Encoder {
    digital_out: [u8; DIGITAL_PORT_COUNT],
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pin_mode(&mut self, pin: u8, mode: u8) -> Vec<u8> {
        vec![SET_PIN_MODE, pin & 0x7F, mode]
    }

    pub fn digital_write(&mut self, pin: u8, high: bool) -> Vec<u8> {
        let port = (pin >> 3) as usize % DIGITAL_PORT_COUNT;
        let bit = 1u8 << (pin & 0x07);
        if high {
            self.digital_out[port] |= bit;
        } else {
            self.digital_out[port] &= !bit;
        }
        let mask = self.digital_out[port];
        vec![DIGITAL_MESSAGE | port as u8, mask & 0x7F, (mask >> 7) & 0x7F]
    }

    pub fn analog_write(&mut self, pin: u8, value: u16) -> Vec<u8> {
        vec![
            ANALOG_MESSAGE | (pin & 0x0F),
            (value & 0x7F) as u8,
            ((value >> 7) & 0x7F) as u8,
        ]
    }

    // Servo targets are carried as analog messages once the pin is in
    // servo mode.
    pub fn servo_write(&mut self, pin: u8, value: u16) -> Vec<u8> {
        self.analog_write(pin, value)
    }

    pub fn report_analog(&mut self, channel: u8, enable: bool) -> Vec<u8> {
        vec![REPORT_ANALOG | (channel & 0x0F), enable as u8]
    }

    pub fn report_digital(&mut self, port: u8, enable: bool) -> Vec<u8> {
        vec![REPORT_DIGITAL | (port & 0x0F), enable as u8]
    }

    pub fn i2c_config(&mut self, delay_micros: u16) -> Vec<u8> {
        vec![
            START_SYSEX,
            I2C_CONFIG,
            (delay_micros & 0x7F) as u8,
            ((delay_micros >> 7) & 0x7F) as u8,
            END_SYSEX,
        ]
    }

    pub fn i2c_read(&mut self, address: u8, register: u16, length: u16) -> Vec<u8> {
        vec![
            START_SYSEX,
            I2C_REQUEST,
            address & 0x7F,
            I2C_READ_ONCE,
            (register & 0x7F) as u8,
            ((register >> 7) & 0x7F) as u8,
            (length & 0x7F) as u8,
            ((length >> 7) & 0x7F) as u8,
            END_SYSEX,
        ]
    }

    pub fn string_data(&mut self, text: &str) -> Vec<u8> {
        let mut out = vec![START_SYSEX, STRING_DATA];
        for b in text.bytes() {
            out.push(b & 0x7F);
            out.push((b >> 7) & 0x7F);
        }
        out.push(END_SYSEX);
        out
    }

    pub fn analog_mapping_query(&mut self) -> Vec<u8> {
        vec![START_SYSEX, ANALOG_MAPPING_QUERY, END_SYSEX]
    }
}

/// Incremental decoder. Feed it one byte at a time; complete messages come
/// back as events, everything else is swallowed.
pub struct Decoder {
    parsing_sysex: bool,
    sysex: Vec<u8>,
    multibyte_command: u8,
    multibyte_channel: u8,
    pending: [u8; 2],
    wait_for: usize,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            parsing_sysex: false,
            sysex: Vec::new(),
            multibyte_command: 0,
            multibyte_channel: 0,
            pending: [0; 2],
            wait_for: 0,
        }
    }

    pub fn feed(&mut self, byte: u8) -> Option<Event> {
        if self.parsing_sysex {
            if byte == END_SYSEX {
                self.parsing_sysex = false;
                let buf = std::mem::take(&mut self.sysex);
                return self.decode_sysex(&buf);
            }
            self.sysex.push(byte);
            return None;
        }

        if self.wait_for > 0 && byte < 0x80 {
            self.pending[2 - self.wait_for] = byte;
            self.wait_for -= 1;
            if self.wait_for == 0 {
                return self.decode_multibyte();
            }
            return None;
        }

        let (command, channel) = if byte < 0xF0 {
            (byte & 0xF0, byte & 0x0F)
        } else {
            (byte, 0)
        };

        match command {
            START_SYSEX => {
                self.parsing_sysex = true;
                self.sysex.clear();
            }
            DIGITAL_MESSAGE | ANALOG_MESSAGE | REPORT_VERSION => {
                self.multibyte_command = command;
                self.multibyte_channel = channel;
                self.wait_for = 2;
            }
            _ => {}
        }
        None
    }

    fn decode_multibyte(&mut self) -> Option<Event> {
        let lsb = self.pending[0] as u16;
        let msb = self.pending[1] as u16;
        match self.multibyte_command {
            DIGITAL_MESSAGE => Some(Event::DigitalPort {
                port: self.multibyte_channel,
                bits: lsb | (msb << 7),
            }),
            ANALOG_MESSAGE => Some(Event::AnalogValue {
                channel: self.multibyte_channel,
                value: lsb | (msb << 7),
            }),
            REPORT_VERSION => Some(Event::ProtocolVersion {
                major: self.pending[0],
                minor: self.pending[1],
            }),
            _ => None,
        }
    }

    fn decode_sysex(&mut self, buf: &[u8]) -> Option<Event> {
        let (&id, body) = buf.split_first()?;
        match id {
            I2C_REPLY => {
                if body.len() < 4 {
                    return None;
                }
                let address = (body[0] as u16 | ((body[1] as u16) << 7)) as u8;
                let register = body[2] as u16 | ((body[3] as u16) << 7);
                let data = body[4..]
                    .chunks(2)
                    .map(|pair| {
                        let lsb = pair[0] as u16;
                        let msb = *pair.get(1).unwrap_or(&0) as u16;
                        (lsb | (msb << 7)) as u8
                    })
                    .collect();
                Some(Event::I2c(I2cReply {
                    address,
                    register,
                    data,
                }))
            }
            ANALOG_MAPPING_RESPONSE => Some(Event::AnalogMapping(body.to_vec())),
            STRING_DATA => {
                let text: String = body
                    .chunks(2)
                    .map(|pair| {
                        let lsb = pair[0] as u16;
                        let msb = *pair.get(1).unwrap_or(&0) as u16;
                        char::from_u32((lsb | (msb << 7)) as u32).unwrap_or('?')
                    })
                    .collect();
                Some(Event::StringMessage(text))
            }
            _ => None,
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(decoder: &mut Decoder, bytes: &[u8]) -> Vec<Event> {
        bytes.iter().filter_map(|&b| decoder.feed(b)).collect()
    }

    #[test]
    fn test_encode_set_pin_mode() {
        let mut enc = Encoder::new();
        assert_eq!(enc.set_pin_mode(13, 1), vec![0xF4, 13, 1]);
    }

    #[test]
    fn test_encode_digital_write_accumulates_port_bits() {
        let mut enc = Encoder::new();
        assert_eq!(enc.digital_write(2, true), vec![0x90, 0x04, 0x00]);
        // Second write on the same port keeps the earlier bit.
        assert_eq!(enc.digital_write(3, true), vec![0x90, 0x0C, 0x00]);
        assert_eq!(enc.digital_write(2, false), vec![0x90, 0x08, 0x00]);
        // Pin 13 lives on port 1, bit 5.
        assert_eq!(enc.digital_write(13, true), vec![0x91, 0x20, 0x00]);
    }

    #[test]
    fn test_encode_analog_write_splits_14_bits() {
        let mut enc = Encoder::new();
        assert_eq!(enc.analog_write(3, 1023), vec![0xE3, 0x7F, 0x07]);
        assert_eq!(enc.analog_write(5, 0), vec![0xE5, 0x00, 0x00]);
    }

    #[test]
    fn test_encode_servo_write_is_analog_message() {
        let mut enc = Encoder::new();
        assert_eq!(enc.servo_write(9, 90), enc.analog_write(9, 90));
    }

    #[test]
    fn test_encode_i2c_read_request_frame() {
        let mut enc = Encoder::new();
        assert_eq!(
            enc.i2c_read(0x23, 32, 2),
            vec![0xF0, 0x76, 0x23, 0x08, 32, 0, 2, 0, 0xF7]
        );
    }

    #[test]
    fn test_encode_string_data_two_byte_chars() {
        let mut enc = Encoder::new();
        assert_eq!(
            enc.string_data("111"),
            vec![0xF0, 0x71, 0x31, 0x00, 0x31, 0x00, 0x31, 0x00, 0xF7]
        );
    }

    #[test]
    fn test_encode_reporting_toggles() {
        let mut enc = Encoder::new();
        assert_eq!(enc.report_analog(2, true), vec![0xC2, 1]);
        assert_eq!(enc.report_digital(1, false), vec![0xD1, 0]);
        assert_eq!(enc.analog_mapping_query(), vec![0xF0, 0x69, 0xF7]);
        assert_eq!(enc.i2c_config(0), vec![0xF0, 0x78, 0, 0, 0xF7]);
    }

    #[test]
    fn test_decode_analog_message() {
        let mut dec = Decoder::new();
        let events = feed_all(&mut dec, &[0xE3, 0x7F, 0x07]);
        assert_eq!(
            events,
            vec![Event::AnalogValue {
                channel: 3,
                value: 1023
            }]
        );
    }

    #[test]
    fn test_decode_digital_message() {
        let mut dec = Decoder::new();
        let events = feed_all(&mut dec, &[0x91, 0x20, 0x00]);
        assert_eq!(events, vec![Event::DigitalPort { port: 1, bits: 0x20 }]);
    }

    #[test]
    fn test_decode_version_report() {
        let mut dec = Decoder::new();
        let events = feed_all(&mut dec, &[0xF9, 2, 5]);
        assert_eq!(events, vec![Event::ProtocolVersion { major: 2, minor: 5 }]);
    }

    #[test]
    fn test_decode_i2c_reply() {
        let mut dec = Decoder::new();
        // Address 0x23, register 32, data [7, 130].
        let frame = [
            0xF0, 0x77, 0x23, 0x00, 0x20, 0x00, 0x07, 0x00, 0x02, 0x01, 0xF7,
        ];
        let events = feed_all(&mut dec, &frame);
        assert_eq!(
            events,
            vec![Event::I2c(I2cReply {
                address: 0x23,
                register: 32,
                data: vec![7, 130],
            })]
        );
    }

    #[test]
    fn test_decode_across_split_feeds() {
        let mut dec = Decoder::new();
        assert_eq!(feed_all(&mut dec, &[0xF0, 0x77, 0x10, 0x00]), vec![]);
        let events = feed_all(&mut dec, &[0x00, 0x00, 0x2A, 0x00, 0xF7]);
        assert_eq!(
            events,
            vec![Event::I2c(I2cReply {
                address: 0x10,
                register: 0,
                data: vec![42],
            })]
        );
    }

    #[test]
    fn test_decode_analog_mapping_response() {
        let mut dec = Decoder::new();
        let events = feed_all(&mut dec, &[0xF0, 0x6A, 127, 127, 0, 1, 0xF7]);
        assert_eq!(events, vec![Event::AnalogMapping(vec![127, 127, 0, 1])]);
    }

    #[test]
    fn test_decode_string_message() {
        let mut dec = Decoder::new();
        let mut frame = vec![0xF0, 0x71];
        for b in "ok".bytes() {
            frame.push(b & 0x7F);
            frame.push(0);
        }
        frame.push(0xF7);
        let events = feed_all(&mut dec, &frame);
        assert_eq!(events, vec![Event::StringMessage("ok".into())]);
    }

    #[test]
    fn test_decoder_ignores_unknown_bytes() {
        let mut dec = Decoder::new();
        // Stray data bytes with no pending command are dropped.
        assert_eq!(feed_all(&mut dec, &[0x01, 0x02, 0x7F]), vec![]);
        // And a well-formed message afterwards still decodes.
        let events = feed_all(&mut dec, &[0xE0, 0x01, 0x00]);
        assert_eq!(
            events,
            vec![Event::AnalogValue {
                channel: 0,
                value: 1
            }]
        );
    }
}
