pub mod device;

// Trait interface for non-blocking dispatcher calls
// Command methods enqueue work; query methods return cached state.
use crate::config::config::{DeviceState, PinMode};

pub trait DeviceController: Send + Sync {
	// Pin configuration and write-class commands. Fire-and-forget: each call
	// enqueues a device command and updates the cached state write-through,
	// then returns immediately.
	fn set_pin_mode(&self, pin: u8, mode: PinMode);
	fn digital_write(&self, pin: u8, high: bool);
	fn analog_write(&self, pin: u8, value: u16);
	fn servo_write(&self, pin: u8, value: u16);
	// Asynchronous reads: the reply lands in the cache later, observable
	// through state().
	fn i2c_read(&self, address: u8, register: u16, length: u16);
	fn query_analog_mapping(&self);
	// Diagnostic text pushed to the firmware.
	fn send_string(&self, text: &str);
	// Snapshot of the cached device state.
	fn state(&self) -> DeviceState;
}
