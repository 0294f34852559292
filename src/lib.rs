#![warn(
    missing_docs,
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications,
    clippy::uninlined_format_args
)]

//! A crate for querying a vehicle's on-board diagnostics (OBD2) controller through
//! an ELM327 style serial adapter, and decoding its responses into typed values.
//!
//! ## Protocol
//!
//! ELM327 adapters accept a request as plain ASCII hex, terminated by a carriage return,
//! EG: `010D\r` for service 01 (Current data), PID 0x0D (Vehicle speed).
//! The adapter echoes the request, sends the response bytes as whitespace separated hex pairs,
//! and finally prints a `>` prompt once it is ready for the next command:
//!
//! ```text
//! 01 0D 32
//! >
//! ```
//!
//! ## Layers
//!
//! * [channel] - The [channel::SerialChannel] trait, which is all the crate needs from a transport
//! * [hardware] - A real serial port implementation and a simulated adapter
//! * [obd2] - Request encoding, the query engine, the response parser and PID decoders
//! * [connection] - [connection::SerialConnection], which owns a channel and closes it when dropped
//!
//! ## Example
//!
//! ```no_run
//! # #[cfg(feature = "serial")]
//! # fn main() -> elm_obd2::ObdResult<()> {
//! use elm_obd2::{connection::SerialConnection, hardware::serial::{SerialPortChannel, SerialSettings}, obd2};
//!
//! let channel = SerialPortChannel::new("/dev/ttyUSB0", SerialSettings::default());
//! let mut conn = SerialConnection::new(channel)?;
//! println!("Speed: {} km/h", obd2::speed(&mut conn)?);
//! println!("RPM: {}", obd2::rpm(&mut conn)?);
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "serial"))]
//! # fn main() {}
//! ```

use channel::ChannelError;
use obd2::Pid;

pub mod channel;
pub mod connection;
pub mod dtc;
pub mod hardware;
pub mod obd2;

/// OBD query result
pub type ObdResult<T> = Result<T, ObdError>;

#[derive(Debug, thiserror::Error)]
/// OBD query error
pub enum ObdError {
    /// Error with underlying communication channel
    #[error("OBD adapter channel error: {0}")]
    Transport(
        #[from]
        #[source]
        ChannelError,
    ),
    /// The adapter never printed its `>` prompt within the allowed budget
    #[error("Timed out waiting for the adapter prompt after {attempts} reads ({elapsed_ms} ms)")]
    Timeout {
        /// Number of reads performed
        attempts: u32,
        /// Time spent waiting for the prompt
        elapsed_ms: u64,
    },
    /// The query was aborted through its cancellation flag.
    ///
    /// The flag stays set until it is cleared, so every later query on the same
    /// connection fails the same way. See [connection::SerialConnection::clear_cancel]
    #[error("Query was cancelled before the adapter responded")]
    Cancelled,
    /// The controller response could not be decoded into the requested parameter
    #[error("{parameter} couldn't be queried, {reason}")]
    Query {
        /// Name of the parameter, EG: 'Vehicle speed'
        parameter: &'static str,
        /// Why the response was rejected
        reason: QueryFailure,
    },
    /// No decoder exists for the PID
    #[error("PID {0} (0x{code:02X}) has no decoder", code = .0.code())]
    UnsupportedPid(Pid),
}

impl ObdError {
    /// Returns true if the query gave up waiting for the adapter, either because
    /// the time/read budget ran out or because it was cancelled
    pub fn is_timeout(&self) -> bool {
        matches!(self, ObdError::Timeout { .. } | ObdError::Cancelled)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
/// Reason a controller response was rejected by a PID decoder
pub enum QueryFailure {
    /// The response carried no data, or could not be parsed
    #[error("the controller returned no data")]
    NoData,
    /// The response carried fewer bytes than the parameter needs
    #[error("received data was not complete")]
    Incomplete,
}
