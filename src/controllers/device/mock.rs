use std::sync::Mutex;

use crate::config::config::{DeviceState, I2cReply, PinMode, A0, POLL_ANALOG_CHANNELS};
use crate::controllers::DeviceController;
use crate::firmata::NOT_ANALOG;

/// Serial-less stand-in for the device: applies every command straight to
/// its own state so the HTTP surface can be exercised without hardware.
pub struct MockDevice {
    state: Mutex<DeviceState>,
}

impl MockDevice {
    pub fn new() -> Self {
        let mut s = DeviceState::default();
        s.connected = true;
        s.status = Some("connected (mock)".into());
        Self {
            state: Mutex::new(s),
        }
    }
}

impl DeviceController for MockDevice {
    fn set_pin_mode(&self, pin: u8, mode: PinMode) {
        let mut s = self.state.lock().unwrap();
        if let Some(slot) = s.pin_modes.get_mut(pin as usize) {
            *slot = mode;
        }
    }

    fn digital_write(&self, pin: u8, high: bool) {
        let mut s = self.state.lock().unwrap();
        if let Some(slot) = s.digital_values.get_mut(pin as usize) {
            *slot = high;
        }
    }

    fn analog_write(&self, pin: u8, value: u16) {
        let mut s = self.state.lock().unwrap();
        if pin >= A0 && pin - A0 < POLL_ANALOG_CHANNELS {
            s.analog_values[(pin - A0) as usize] = value;
        }
    }

    fn servo_write(&self, _pin: u8, _value: u16) {}

    fn i2c_read(&self, address: u8, register: u16, length: u16) {
        // Simulate the firmware answering right away with zeroed data.
        let mut s = self.state.lock().unwrap();
        s.i2c_replies.insert(
            address,
            I2cReply {
                address,
                register,
                data: vec![0; length.max(1) as usize],
            },
        );
    }

    fn query_analog_mapping(&self) {
        let mut s = self.state.lock().unwrap();
        let mut mapping = vec![NOT_ANALOG; A0 as usize];
        for ch in 0..POLL_ANALOG_CHANNELS {
            mapping.push(ch);
        }
        s.analog_mapping = Some(mapping);
    }

    fn send_string(&self, _text: &str) {}

    fn state(&self) -> DeviceState {
        self.state.lock().unwrap().clone()
    }
}
