//! Module for OBD2 (ISO-9141 / SAE J1979) requests over an ELM327 adapter

use strum_macros::{Display, EnumIter, EnumString, FromRepr};

mod data_pids;
pub mod query;
mod response;

// Exports
pub use data_pids::*;
pub use query::{QueryOptions, QueryState};
pub use response::*;

/// Character the adapter prints once it has finished sending a response
pub const PROMPT: char = '>';

/// Terminator appended to every request
pub const REQUEST_TERMINATOR: char = '\r';

#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Display, EnumString, EnumIter, FromRepr)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
/// OBD2 service (Mode) of a request
pub enum Mode {
    /// Unknown service
    Unknown = 0x00,
    /// Service 01 - Show current data
    CurrentData = 0x01,
    /// Service 02 - Show freeze frame data
    FreezeFrameData = 0x02,
    /// Service 03 - Show stored diagnostic trouble codes
    DiagnosticTroubleCodes = 0x03,
}

impl Mode {
    /// Raw service byte
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Returns true if requests for this mode carry a PID byte
    pub fn takes_pid(self) -> bool {
        !matches!(self, Mode::DiagnosticTroubleCodes)
    }
}

impl From<u8> for Mode {
    fn from(x: u8) -> Self {
        Self::from_repr(x).unwrap_or(Mode::Unknown)
    }
}

#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Display, EnumString, EnumIter, FromRepr)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
/// OBD2 data PIDs supported for Service 01 and 02
///
/// See <https://en.wikipedia.org/wiki/OBD-II_PIDs#Service_01>
pub enum Pid {
    /// Unknown PID
    Unknown = 0x00,
    /// Monitor status since DTCs cleared. Byte A holds both the MIL state (bit 7)
    /// and the number of stored DTCs (bits 0-6), see [Pid::DTC_COUNT]
    Mil = 0x01,
    /// Calculated engine load
    CalculatedEngineLoadValue = 0x04,
    /// Engine coolant temperature
    EngineTemperature = 0x05,
    /// Fuel pressure (Gauge pressure)
    FuelPressure = 0x0A,
    /// Engine speed
    Rpm = 0x0C,
    /// Vehicle speed
    Speed = 0x0D,
    /// Throttle position
    ThrottlePosition = 0x11,
}

impl Pid {
    /// Number of stored DTCs. Shares its code point with [Pid::Mil]
    pub const DTC_COUNT: Pid = Pid::Mil;

    /// Raw PID byte
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<u8> for Pid {
    fn from(x: u8) -> Self {
        Self::from_repr(x).unwrap_or(Pid::Unknown)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
/// A single OBD2 request: a service and, for services that take one, a PID
pub struct Request {
    mode: Mode,
    pid: Option<Pid>,
}

impl Request {
    /// Creates a new request
    pub fn new(mode: Mode, pid: Option<Pid>) -> Self {
        Self { mode, pid }
    }

    /// Service 01 request for a PID
    pub fn current_data(pid: Pid) -> Self {
        Self::new(Mode::CurrentData, Some(pid))
    }

    /// Service 03 request (Stored DTCs). Carries no PID
    pub fn trouble_codes() -> Self {
        Self::new(Mode::DiagnosticTroubleCodes, None)
    }

    /// Service of the request
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// PID of the request, if any
    pub fn pid(&self) -> Option<Pid> {
        self.pid
    }

    /// Encodes the request as it goes on the wire, `MM[PP]\r`, in uppercase hex
    pub fn encode(&self) -> String {
        match self.pid {
            Some(pid) => format!("{:02X}{:02X}{REQUEST_TERMINATOR}", self.mode.code(), pid.code()),
            None => format!("{:02X}{REQUEST_TERMINATOR}", self.mode.code()),
        }
    }
}
