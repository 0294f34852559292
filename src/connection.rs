//! Connection to a vehicle's interface
//!
//! [SerialConnection] owns its [SerialChannel] for its whole lifetime. The channel is
//! opened when the connection is created, and closed again when the connection is
//! dropped, regardless of how the owning scope is left.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::{
    channel::SerialChannel,
    obd2::{query, ControllerResponse, Mode, Pid, QueryOptions, Request},
    ObdResult,
};

/// Anything that can send a request to the vehicle and return its parsed response.
///
/// The PID decoders in [crate::obd2] are written against this trait
pub trait ObdConnection {
    /// Queries data from the vehicle by sending a mode and, optionally, a PID.
    /// Blocks until a complete answer has been received or the query times out
    fn query(&mut self, mode: Mode, pid: Option<Pid>) -> ObdResult<ControllerResponse>;
}

/// Serial connection to the vehicle's interface
#[derive(Debug)]
pub struct SerialConnection<C: SerialChannel> {
    channel: C,
    options: QueryOptions,
    cancel: Option<Arc<AtomicBool>>,
}

impl<C: SerialChannel> SerialConnection<C> {
    /// Creates a connection with default query options and opens the channel
    pub fn new(channel: C) -> ObdResult<Self> {
        Self::with_options(channel, QueryOptions::default())
    }

    /// Creates a connection and opens the channel
    pub fn with_options(channel: C, options: QueryOptions) -> ObdResult<Self> {
        let mut conn = Self {
            channel,
            options,
            cancel: None,
        };
        conn.open()?;
        Ok(conn)
    }

    /// Opens the connection to the interface, if it is not already open
    pub fn open(&mut self) -> ObdResult<()> {
        if !self.channel.is_open() {
            self.channel.open()?;
        }
        Ok(())
    }

    /// Closes the connection to the interface, if it is open
    pub fn close(&mut self) -> ObdResult<()> {
        if self.channel.is_open() {
            self.channel.close()?;
        }
        Ok(())
    }

    /// Returns true if the channel is open
    pub fn is_open(&self) -> bool {
        self.channel.is_open()
    }

    /// Query options used for every request
    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// Replaces the query options
    pub fn set_options(&mut self, options: QueryOptions) {
        self.options = options
    }

    /// Installs (or removes) a flag which aborts any running and future query
    /// with [crate::ObdError::Cancelled] once set. The flag is never cleared by
    /// the connection itself, see [SerialConnection::clear_cancel]
    pub fn set_cancel_flag(&mut self, cancel: Option<Arc<AtomicBool>>) {
        self.cancel = cancel
    }

    /// Clears the installed cancellation flag, if any, so the connection can be
    /// queried again after a cancellation
    pub fn clear_cancel(&self) {
        if let Some(cancel) = &self.cancel {
            cancel.store(false, Ordering::Relaxed);
        }
    }

    /// Underlying channel
    pub fn channel(&self) -> &C {
        &self.channel
    }
}

impl<C: SerialChannel> ObdConnection for SerialConnection<C> {
    fn query(&mut self, mode: Mode, pid: Option<Pid>) -> ObdResult<ControllerResponse> {
        query::query(
            &mut self.channel,
            &Request::new(mode, pid),
            &self.options,
            self.cancel.as_deref(),
        )
    }
}

impl<C: SerialChannel> Drop for SerialConnection<C> {
    fn drop(&mut self) {
        if self.channel.is_open() {
            if let Err(e) = self.channel.close() {
                log::error!("Failed to close channel on drop: {e}");
            }
        }
    }
}

#[cfg(feature = "serial")]
impl SerialConnection<crate::hardware::serial::SerialPortChannel> {
    /// Opens a connection on a serial port with default line settings
    pub fn open_port(port_name: &str) -> ObdResult<Self> {
        Self::new(crate::hardware::serial::SerialPortChannel::new(
            port_name,
            Default::default(),
        ))
    }
}
