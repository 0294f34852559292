//! Module for the character-oriented communication channel to an OBD adapter
//!
//! ELM327 style adapters speak a plain text protocol over a serial line. Anything
//! that can open, close, write text and read raw bytes can act as a [SerialChannel]:
//! * [crate::hardware::serial::SerialPortChannel] - A real serial port (`serial` feature)
//! * [crate::hardware::simulation::SimulatedElm327] - A scripted adapter for testing

/// Communication channel result
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Upper bound on reads performed by [SerialChannel::clear_input]'s default implementation
const MAX_CLEAR_READS: usize = 32;

#[derive(Debug)]
/// Error produced by a communication channel
pub enum ChannelError {
    /// Underlying IO Error with channel
    IOError(std::io::Error),
    /// Timeout when writing data to the channel
    WriteTimeout,
    /// The interface is not open
    InterfaceNotOpen,
    /// The device could not be opened (Bad port name, permissions, already in use)
    DeviceUnavailable {
        /// Name of the port, EG: '/dev/ttyUSB0', 'COM5'
        port: String,
        /// Reason reported by the OS
        desc: String,
    },
    /// Underlying API error with hardware
    APIError {
        /// Name of the API EG: 'serialport'
        api_name: String,
        /// Internal API error code
        code: u8,
        /// API error description
        desc: String,
    },
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelError::IOError(e) => write!(f, "IO error: {e}"),
            ChannelError::WriteTimeout => write!(f, "timeout writing to channel"),
            ChannelError::InterfaceNotOpen => write!(f, "channel's interface is not open"),
            ChannelError::DeviceUnavailable { port, desc } => {
                write!(f, "device '{port}' could not be opened: {desc}")
            }
            ChannelError::APIError {
                api_name,
                code,
                desc,
            } => write!(f, "underlying {api_name} API error ({code}): {desc}"),
        }
    }
}

impl std::error::Error for ChannelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let Self::IOError(io_err) = self {
            Some(io_err)
        } else {
            None
        }
    }
}

impl From<std::io::Error> for ChannelError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => Self::WriteTimeout,
            _ => Self::IOError(err),
        }
    }
}

/// Base trait for talking to an OBD adapter over a text based link.
///
/// A channel is exclusively owned by one connection, only a single request
/// may be in flight at any time.
pub trait SerialChannel {
    /// Returns true if the underlying device is open
    fn is_open(&self) -> bool;

    /// Opens the underlying device.
    ///
    /// Fails with [ChannelError::DeviceUnavailable] if the device cannot be opened
    fn open(&mut self) -> ChannelResult<()>;

    /// Closes the underlying device
    fn close(&mut self) -> ChannelResult<()>;

    /// Writes raw text to the channel. No terminator is appended,
    /// the caller is responsible for the trailing `\r`
    fn write(&mut self, command: &str) -> ChannelResult<()>;

    /// Attempts to read bytes from the channel into `buffer`.
    ///
    /// ## Returns
    /// The number of bytes read. `0` means nothing was available within the
    /// device's own read timeout, and the caller should try again
    fn read(&mut self, buffer: &mut [u8]) -> ChannelResult<usize>;

    /// Discards any input still waiting on the channel, such as the late answer
    /// to a request that already timed out.
    ///
    /// The default implementation reads until a read returns nothing, giving up
    /// after a fixed number of reads.
    ///
    /// ## Returns
    /// The number of bytes discarded
    fn clear_input(&mut self) -> ChannelResult<usize> {
        let mut buffer = [0u8; 256];
        let mut discarded = 0;
        for _ in 0..MAX_CLEAR_READS {
            match self.read(&mut buffer)? {
                0 => break,
                n => discarded += n.min(buffer.len()),
            }
        }
        Ok(discarded)
    }
}
