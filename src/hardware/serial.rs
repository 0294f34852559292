//! Serial port channel for USB / Bluetooth ELM327 adapters

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    io::{ErrorKind, Read, Write},
    time::Duration,
};

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::channel::{ChannelError, ChannelResult, SerialChannel};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// Serial line settings for the adapter. The line is always 8N1 with no flow control
pub struct SerialSettings {
    /// Baud rate. Most ELM327 clones default to 38400
    pub baud_rate: u32,
    /// How long a single read blocks waiting for data before returning 0 bytes
    pub read_timeout_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 38400,
            read_timeout_ms: 100,
        }
    }
}

/// Serial port channel
pub struct SerialPortChannel {
    port_name: String,
    settings: SerialSettings,
    port: Option<Box<dyn SerialPort>>,
}

impl Debug for SerialPortChannel {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(
            f,
            "SerialPortChannel {} @ {} baud (open: {})",
            self.port_name,
            self.settings.baud_rate,
            self.port.is_some()
        )
    }
}

impl SerialPortChannel {
    /// Creates a channel for a port name (EG: '/dev/ttyUSB0' or 'COM5').
    /// The port is not opened until [SerialChannel::open] is called
    pub fn new<T: Into<String>>(port_name: T, settings: SerialSettings) -> Self {
        Self {
            port_name: port_name.into(),
            settings,
            port: None,
        }
    }

    /// Name of the port
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Line settings of the port
    pub fn settings(&self) -> SerialSettings {
        self.settings
    }

    fn port(&mut self) -> ChannelResult<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or(ChannelError::InterfaceNotOpen)
    }
}

impl SerialChannel for SerialPortChannel {
    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn open(&mut self) -> ChannelResult<()> {
        if self.port.is_some() {
            return Ok(());
        }
        let port = serialport::new(&self.port_name, self.settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(self.settings.read_timeout_ms))
            .open()
            .map_err(|e| ChannelError::DeviceUnavailable {
                port: self.port_name.clone(),
                desc: e.to_string(),
            })?;
        log::info!("Opened {} at {} baud", self.port_name, self.settings.baud_rate);
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> ChannelResult<()> {
        // Dropping the handle closes the port
        if self.port.take().is_some() {
            log::info!("Closed {}", self.port_name);
        }
        Ok(())
    }

    fn write(&mut self, command: &str) -> ChannelResult<()> {
        let port = self.port()?;
        port.write_all(command.as_bytes())?;
        port.flush()?;
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> ChannelResult<usize> {
        match self.port()?.read(buffer) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(0),
            Err(e) => Err(ChannelError::IOError(e)),
        }
    }

    fn clear_input(&mut self) -> ChannelResult<usize> {
        let port = self.port()?;
        let pending = port.bytes_to_read().map_err(convert_serialport_error)?;
        port.clear(ClearBuffer::Input).map_err(convert_serialport_error)?;
        Ok(pending as usize)
    }
}

/// Lists the names of all serial ports found on the system
pub fn scan_serial_ports() -> ChannelResult<Vec<String>> {
    let ports = serialport::available_ports().map_err(convert_serialport_error)?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

fn convert_serialport_error(error: serialport::Error) -> ChannelError {
    let code = match error.kind() {
        serialport::ErrorKind::NoDevice => 1,
        serialport::ErrorKind::InvalidInput => 2,
        serialport::ErrorKind::Unknown => 3,
        serialport::ErrorKind::Io(_) => 4,
    };
    ChannelError::APIError {
        api_name: "serialport".into(),
        code,
        desc: error.description,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unopened_port_rejects_io() {
        let mut ch = SerialPortChannel::new("/dev/does-not-exist", SerialSettings::default());
        assert!(!ch.is_open());
        assert!(matches!(ch.write("010D\r"), Err(ChannelError::InterfaceNotOpen)));
        let mut buf = [0u8; 8];
        assert!(matches!(ch.read(&mut buf), Err(ChannelError::InterfaceNotOpen)));
        assert!(matches!(ch.clear_input(), Err(ChannelError::InterfaceNotOpen)));
        // Closing a closed port is a no-op
        assert!(ch.close().is_ok());
    }

    #[test]
    fn missing_device_fails_to_open() {
        let mut ch = SerialPortChannel::new("/dev/does-not-exist", SerialSettings::default());
        match ch.open() {
            Err(ChannelError::DeviceUnavailable { port, .. }) => assert_eq!(port, "/dev/does-not-exist"),
            other => panic!("unexpected result {other:?}"),
        }
        assert!(!ch.is_open());
    }

    #[test]
    fn error_codes() {
        let e = convert_serialport_error(serialport::Error::new(serialport::ErrorKind::NoDevice, "gone"));
        assert!(matches!(e, ChannelError::APIError { code: 1, .. }));
    }
}
