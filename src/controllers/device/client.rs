use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

use crate::config::config::{DeviceCommand, DeviceState, PinMode, A0, POLL_ANALOG_CHANNELS};
use crate::controllers::DeviceController;

/// Channel-backed facade over the device driver task.
///
/// Every write-class call does two things: updates the cached state so an
/// immediately following poll already reflects the requested value, and
/// enqueues the command for the driver task, which performs the serial
/// write. The cache therefore holds requested state for writes and
/// confirmed state for everything decoded off the wire.
pub struct DeviceClient {
    cmd_tx: mpsc::Sender<DeviceCommand>,
    state: Arc<RwLock<DeviceState>>, // cached state
}

impl DeviceClient {
    pub fn new(cmd_tx: mpsc::Sender<DeviceCommand>, state: Arc<RwLock<DeviceState>>) -> Self {
        Self { cmd_tx, state }
    }

    pub fn state_handle(&self) -> Arc<RwLock<DeviceState>> {
        Arc::clone(&self.state)
    }

    fn enqueue(&self, command: DeviceCommand) {
        if let Err(e) = self.cmd_tx.try_send(command) {
            let mut s = self.state.write().unwrap();
            s.last_error = Some(format!("send failed: {}", e));
        }
    }
}

impl DeviceController for DeviceClient {
    fn set_pin_mode(&self, pin: u8, mode: PinMode) {
        {
            let mut s = self.state.write().unwrap();
            if let Some(slot) = s.pin_modes.get_mut(pin as usize) {
                *slot = mode;
            }
        }
        self.enqueue(DeviceCommand::SetPinMode { pin, mode });
    }

    fn digital_write(&self, pin: u8, high: bool) {
        {
            let mut s = self.state.write().unwrap();
            if let Some(slot) = s.digital_values.get_mut(pin as usize) {
                *slot = high;
            }
        }
        self.enqueue(DeviceCommand::DigitalWrite { pin, high });
    }

    fn analog_write(&self, pin: u8, value: u16) {
        {
            // Analog writes on an aliased pin show up on the matching
            // poll channel.
            let mut s = self.state.write().unwrap();
            if pin >= A0 && pin - A0 < POLL_ANALOG_CHANNELS {
                s.analog_values[(pin - A0) as usize] = value;
            }
        }
        self.enqueue(DeviceCommand::AnalogWrite { pin, value });
    }

    fn servo_write(&self, pin: u8, value: u16) {
        self.enqueue(DeviceCommand::ServoWrite { pin, value });
    }

    fn i2c_read(&self, address: u8, register: u16, length: u16) {
        self.enqueue(DeviceCommand::I2cRead {
            address,
            register,
            length,
        });
    }

    fn query_analog_mapping(&self) {
        self.enqueue(DeviceCommand::QueryAnalogMapping);
    }

    fn send_string(&self, text: &str) {
        self.enqueue(DeviceCommand::SendString(text.to_string()));
    }

    fn state(&self) -> DeviceState {
        self.state.read().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> (DeviceClient, mpsc::Receiver<DeviceCommand>) {
        let (tx, rx) = mpsc::channel(64);
        let state = Arc::new(RwLock::new(DeviceState::default()));
        (DeviceClient::new(tx, state), rx)
    }

    #[test]
    fn test_digital_write_is_write_through() {
        let (client, mut rx) = client();
        client.digital_write(7, true);

        assert!(client.state().digital_values[7]);
        assert!(matches!(
            rx.try_recv().unwrap(),
            DeviceCommand::DigitalWrite { pin: 7, high: true }
        ));

        client.digital_write(7, false);
        assert!(!client.state().digital_values[7]);
    }

    #[test]
    fn test_set_pin_mode_updates_cache_and_enqueues() {
        let (client, mut rx) = client();
        client.set_pin_mode(4, PinMode::Output);

        assert_eq!(client.state().pin_modes[4], PinMode::Output);
        assert!(matches!(
            rx.try_recv().unwrap(),
            DeviceCommand::SetPinMode {
                pin: 4,
                mode: PinMode::Output
            }
        ));
    }

    #[test]
    fn test_analog_write_maps_aliased_pin_to_channel() {
        let (client, mut rx) = client();
        client.analog_write(A0 + 2, 512);

        assert_eq!(client.state().analog_values[2], 512);
        assert!(matches!(
            rx.try_recv().unwrap(),
            DeviceCommand::AnalogWrite { value: 512, .. }
        ));

        // A plain PWM pin has no poll channel to reflect.
        client.analog_write(3, 128);
        assert_eq!(client.state().analog_values[3], 0);
    }

    #[test]
    fn test_out_of_range_pin_does_not_panic() {
        let (client, mut rx) = client();
        client.digital_write(200, true);
        client.set_pin_mode(200, PinMode::Servo);
        // Commands still flow to the driver; the cache just has no slot.
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_read_class_commands_do_not_touch_cache() {
        let (client, mut rx) = client();
        client.i2c_read(0x23, 32, 2);
        client.query_analog_mapping();
        client.send_string("111");

        let snapshot = client.state();
        assert!(snapshot.i2c_replies.is_empty());
        assert!(snapshot.analog_mapping.is_none());
        for _ in 0..3 {
            assert!(rx.try_recv().is_ok());
        }
    }

    #[test]
    fn test_full_channel_records_error() {
        let (tx, _rx) = mpsc::channel(1);
        let state = Arc::new(RwLock::new(DeviceState::default()));
        let client = DeviceClient::new(tx, state);

        client.digital_write(2, true);
        client.digital_write(3, true); // channel full, receiver never drained
        assert!(client.state().last_error.is_some());
    }
}
