
/******************** Utilities Module ********************/

// holds the helper for opening the serial connection to the board


// imports

use std::time::Duration;

use serialport::SerialPort;


// function to open the device serial connection
pub fn open_device_connection(
    port_name: &str,
    baud_rate: u32,
) -> Result<Box<dyn SerialPort>, Box<dyn std::error::Error + Send + Sync>> {

    let port = serialport::new(port_name, baud_rate)
        .timeout(Duration::from_millis(100))
        .open()?;

    Ok(port)
}
