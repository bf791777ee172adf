//! Serial transport: opens an RS-232 link to the modem at 115200 8N1 with a
//! 100ms read timeout, mirroring `ModemSerialCom.connect`.

use std::time::Duration;

use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, StopBits};

use crate::error::{Error, Result};

use super::Transport;

pub const BAUD_RATE: u32 = 115_200;
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);
/// Delay observed after each write, the way the Python driver sleeps
/// `txDelay` seconds between queuing a frame and returning from `send()`.
pub const TX_DELAY: Duration = Duration::from_millis(100);

impl Transport {
    /// Opens a serial connection to `path`.
    pub fn open_serial(path: impl Into<String>) -> Result<Transport> {
        let path = path.into();
        Transport::spawn_with_init(Some(TX_DELAY), move || async move {
            let port = tokio_serial::new(&path, BAUD_RATE)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(READ_TIMEOUT)
                .open_native_async()?;
            Ok(port)
        })
    }

    /// Lists available serial ports, sorted, mirroring
    /// `ModemSerialCom.scan`.
    pub fn scan_serial_ports() -> Result<Vec<String>> {
        let mut names: Vec<String> = tokio_serial::available_ports()
            .map_err(|e| Error::ProgrammingFailed(e.to_string()))?
            .into_iter()
            .map(|p| p.port_name)
            .collect();
        names.sort();
        Ok(names)
    }
}
