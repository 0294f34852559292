//! Module for OBD2 diagnostic trouble code data

use std::fmt::{Display, Formatter};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// Vehicle system a DTC belongs to (First letter of the DTC name)
pub enum DTCCategory {
    /// 'P' - Engine and transmission
    Powertrain,
    /// 'C' - Chassis
    Chassis,
    /// 'B' - Body
    Body,
    /// 'U' - Network / vehicle integration
    Network,
}

impl DTCCategory {
    /// Letter used in the DTC name
    pub fn letter(&self) -> char {
        match self {
            DTCCategory::Powertrain => 'P',
            DTCCategory::Chassis => 'C',
            DTCCategory::Body => 'B',
            DTCCategory::Network => 'U',
        }
    }
}

/// Diagnostic trouble code (DTC) as read through service 03.
///
/// The controller reports each code as a group of 3 bytes. The first 2 bytes hold
/// the SAE J2012 code, the third byte is kept as-is.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiagnosticTroubleCode {
    raw: [u8; 3],
}

impl DiagnosticTroubleCode {
    /// Creates a DTC from its 3 raw bytes
    pub fn new(raw: [u8; 3]) -> Self {
        Self { raw }
    }

    /// Raw bytes of the DTC, as the controller sent them
    pub fn raw(&self) -> [u8; 3] {
        self.raw
    }

    /// Returns true if every byte is zero. Controllers pad their DTC list with such groups
    pub fn is_padding(&self) -> bool {
        self.raw.iter().all(|b| *b == 0)
    }

    /// System the DTC belongs to
    pub fn category(&self) -> DTCCategory {
        match self.raw[0] >> 6 {
            0b00 => DTCCategory::Powertrain,
            0b01 => DTCCategory::Chassis,
            0b10 => DTCCategory::Body,
            _ => DTCCategory::Network,
        }
    }

    /// Five character DTC name, EG: 'P0133'
    pub fn code(&self) -> String {
        format!(
            "{}{}{:X}{:X}{:X}",
            self.category().letter(),
            (self.raw[0] >> 4) & 0x03,
            self.raw[0] & 0x0F,
            self.raw[1] >> 4,
            self.raw[1] & 0x0F
        )
    }
}

impl Display for DiagnosticTroubleCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sae_names() {
        assert_eq!(DiagnosticTroubleCode::new([0x01, 0x33, 0x00]).to_string(), "P0133");
        assert_eq!(DiagnosticTroubleCode::new([0x43, 0x00, 0x00]).code(), "C0300");
        assert_eq!(DiagnosticTroubleCode::new([0x9A, 0xBC, 0x01]).code(), "B1ABC");
        assert_eq!(DiagnosticTroubleCode::new([0xC1, 0x00, 0x00]).category(), DTCCategory::Network);
    }

    #[test]
    fn padding() {
        assert!(DiagnosticTroubleCode::new([0, 0, 0]).is_padding());
        assert!(!DiagnosticTroubleCode::new([0, 0, 1]).is_padding());
    }
}
