//! Decoders for Service 01 data PIDs and Service 03 trouble codes
//!
//! Every parameter comes as a pair of functions:
//! * `decode_*` - Pure function, turns a [ControllerResponse] into the typed value
//! * A query function (EG: [speed]) - Sends the matching request over an [ObdConnection], then decodes
//!
//! All formulas use the standard SAE J1979 scaling, where `A` is the first data byte
//! and `B` the second.

use std::fmt::{Display, Formatter};

use log::warn;

use crate::{
    connection::ObdConnection,
    dtc::DiagnosticTroubleCode,
    ObdError, ObdResult, QueryFailure,
};

use super::{ControllerResponse, Mode, Pid};

const SPEED: &str = "Vehicle speed";
const ENGINE_TEMPERATURE: &str = "Engine temperature";
const RPM: &str = "RPM";
const THROTTLE_POSITION: &str = "Throttle position";
const ENGINE_LOAD: &str = "Calculated engine load value";
const FUEL_PRESSURE: &str = "Fuel pressure";
const MIL: &str = "Malfunction indicator lamp";
const DTC_COUNT: &str = "DTC count";
const TROUBLE_CODES: &str = "Diagnostic trouble codes";

/// Size of each trouble code in a Service 03 response
const DTC_SIZE: usize = 3;

fn valid_data<'a>(resp: &'a ControllerResponse, parameter: &'static str) -> ObdResult<&'a [u8]> {
    if resp.has_invalid_data() {
        return Err(ObdError::Query {
            parameter,
            reason: QueryFailure::NoData,
        });
    }
    Ok(resp.value())
}

/// Byte A, for single byte parameters.
///
/// A response too short for the parameter decodes as 0 (or `false`), kept for
/// compatibility with older callers. Responses built by
/// [ControllerResponse::parse] never reach that fallback, an empty value is
/// already flagged invalid and rejected by `valid_data` with
/// [QueryFailure::NoData]
fn byte_a(resp: &ControllerResponse, parameter: &'static str) -> ObdResult<Option<u8>> {
    let a = valid_data(resp, parameter)?.first().copied();
    if a.is_none() {
        warn!("{parameter}: response too short, returning default value");
    }
    Ok(a)
}

fn percent(a: u8) -> u32 {
    (f64::from(a) * 100.0 / 255.0).round() as u32
}

/// Vehicle speed in km/h. Formula: `A`
pub fn decode_speed(resp: &ControllerResponse) -> ObdResult<u32> {
    Ok(byte_a(resp, SPEED)?.map(u32::from).unwrap_or(0))
}

/// Engine coolant temperature in Celsius. Formula: `A - 40`
pub fn decode_engine_temperature(resp: &ControllerResponse) -> ObdResult<i32> {
    Ok(byte_a(resp, ENGINE_TEMPERATURE)?
        .map(|a| i32::from(a) - 40)
        .unwrap_or(0))
}

/// Engine speed in RPM. Formula: `((A*256)+B)/4`, truncated.
/// Fails with [QueryFailure::Incomplete] if fewer than 2 bytes were received
pub fn decode_rpm(resp: &ControllerResponse) -> ObdResult<u32> {
    match valid_data(resp, RPM)? {
        [a, b, ..] => Ok((u32::from(*a) * 256 + u32::from(*b)) / 4),
        _ => Err(ObdError::Query {
            parameter: RPM,
            reason: QueryFailure::Incomplete,
        }),
    }
}

/// Throttle position in percent (0-100). Formula: `A*100/255`, rounded
pub fn decode_throttle_position(resp: &ControllerResponse) -> ObdResult<u32> {
    Ok(byte_a(resp, THROTTLE_POSITION)?.map(percent).unwrap_or(0))
}

/// Calculated engine load in percent (0-100). Formula: `A*100/255`, rounded
pub fn decode_calculated_engine_load(resp: &ControllerResponse) -> ObdResult<u32> {
    Ok(byte_a(resp, ENGINE_LOAD)?.map(percent).unwrap_or(0))
}

/// Fuel pressure in kPa. Formula: `A*3`
pub fn decode_fuel_pressure(resp: &ControllerResponse) -> ObdResult<u32> {
    Ok(byte_a(resp, FUEL_PRESSURE)?
        .map(|a| u32::from(a) * 3)
        .unwrap_or(0))
}

/// Malfunction indicator lamp state. Bit 7 of `A`
pub fn decode_malfunction_indicator_lamp(resp: &ControllerResponse) -> ObdResult<bool> {
    Ok(byte_a(resp, MIL)?.is_some_and(|a| a & 0x80 != 0))
}

/// Number of stored DTCs. Bits 0-6 of `A`
pub fn decode_dtc_count(resp: &ControllerResponse) -> ObdResult<u32> {
    Ok(byte_a(resp, DTC_COUNT)?
        .map(|a| u32::from(a & 0x7F))
        .unwrap_or(0))
}

/// Stored trouble codes from a Service 03 response.
///
/// Codes are read as 3 byte groups starting at the second data byte. Groups that are
/// entirely zero are padding and are skipped, and a trailing group shorter than 3 bytes
/// is dropped. Fails with [QueryFailure::Incomplete] if fewer than 2 bytes were received
pub fn decode_diagnostic_trouble_codes(resp: &ControllerResponse) -> ObdResult<Vec<DiagnosticTroubleCode>> {
    let data = valid_data(resp, TROUBLE_CODES)?;
    if data.len() < 2 {
        return Err(ObdError::Query {
            parameter: TROUBLE_CODES,
            reason: QueryFailure::Incomplete,
        });
    }
    let groups = data[1..].chunks(DTC_SIZE);
    let mut codes = Vec::with_capacity(groups.len());
    for group in groups {
        let Ok(raw) = <[u8; DTC_SIZE]>::try_from(group) else {
            warn!("Ignoring incomplete trouble code {group:02X?}");
            continue;
        };
        let dtc = DiagnosticTroubleCode::new(raw);
        if !dtc.is_padding() {
            codes.push(dtc);
        }
    }
    Ok(codes)
}

/// Queries the current vehicle speed, in km/h
pub fn speed<C: ObdConnection + ?Sized>(conn: &mut C) -> ObdResult<u32> {
    decode_speed(&conn.query(Mode::CurrentData, Some(Pid::Speed))?)
}

/// Queries the current engine coolant temperature, in Celsius
pub fn engine_temperature<C: ObdConnection + ?Sized>(conn: &mut C) -> ObdResult<i32> {
    decode_engine_temperature(&conn.query(Mode::CurrentData, Some(Pid::EngineTemperature))?)
}

/// Queries the current engine speed
pub fn rpm<C: ObdConnection + ?Sized>(conn: &mut C) -> ObdResult<u32> {
    decode_rpm(&conn.query(Mode::CurrentData, Some(Pid::Rpm))?)
}

/// Queries the current throttle position, in percent
pub fn throttle_position<C: ObdConnection + ?Sized>(conn: &mut C) -> ObdResult<u32> {
    decode_throttle_position(&conn.query(Mode::CurrentData, Some(Pid::ThrottlePosition))?)
}

/// Queries the current calculated engine load, in percent
pub fn calculated_engine_load<C: ObdConnection + ?Sized>(conn: &mut C) -> ObdResult<u32> {
    decode_calculated_engine_load(&conn.query(Mode::CurrentData, Some(Pid::CalculatedEngineLoadValue))?)
}

/// Queries the current fuel pressure, in kPa
pub fn fuel_pressure<C: ObdConnection + ?Sized>(conn: &mut C) -> ObdResult<u32> {
    decode_fuel_pressure(&conn.query(Mode::CurrentData, Some(Pid::FuelPressure))?)
}

/// Queries the malfunction indicator lamp. True if the lamp is illuminated
pub fn malfunction_indicator_lamp<C: ObdConnection + ?Sized>(conn: &mut C) -> ObdResult<bool> {
    decode_malfunction_indicator_lamp(&conn.query(Mode::CurrentData, Some(Pid::Mil))?)
}

/// Queries the number of stored DTCs
pub fn dtc_count<C: ObdConnection + ?Sized>(conn: &mut C) -> ObdResult<u32> {
    decode_dtc_count(&conn.query(Mode::CurrentData, Some(Pid::DTC_COUNT))?)
}

/// Queries all stored diagnostic trouble codes
pub fn diagnostic_trouble_codes<C: ObdConnection + ?Sized>(conn: &mut C) -> ObdResult<Vec<DiagnosticTroubleCode>> {
    decode_diagnostic_trouble_codes(&conn.query(Mode::DiagnosticTroubleCodes, None)?)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// A decoded Service 01 value
pub enum ObdReading {
    /// Vehicle speed (km/h)
    Speed(u32),
    /// Engine coolant temperature (Celsius)
    EngineTemperature(i32),
    /// Engine speed
    Rpm(u32),
    /// Throttle position (%)
    ThrottlePosition(u32),
    /// Calculated engine load (%)
    CalculatedEngineLoad(u32),
    /// Fuel pressure (kPa)
    FuelPressure(u32),
    /// Malfunction indicator lamp illuminated
    MilOn(bool),
}

impl Display for ObdReading {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ObdReading::Speed(x) => write!(f, "{SPEED}: {x} km/h"),
            ObdReading::EngineTemperature(x) => write!(f, "{ENGINE_TEMPERATURE}: {x} °C"),
            ObdReading::Rpm(x) => write!(f, "{RPM}: {x}"),
            ObdReading::ThrottlePosition(x) => write!(f, "{THROTTLE_POSITION}: {x} %"),
            ObdReading::CalculatedEngineLoad(x) => write!(f, "{ENGINE_LOAD}: {x} %"),
            ObdReading::FuelPressure(x) => write!(f, "{FUEL_PRESSURE}: {x} kPa"),
            ObdReading::MilOn(x) => write!(f, "{MIL}: {}", if *x { "on" } else { "off" }),
        }
    }
}

/// Queries and decodes a Service 01 PID.
///
/// [Pid::Mil] reads the lamp state, use [dtc_count] for the other half of that PID
pub fn read_pid<C: ObdConnection + ?Sized>(conn: &mut C, pid: Pid) -> ObdResult<ObdReading> {
    Ok(match pid {
        Pid::Speed => ObdReading::Speed(speed(conn)?),
        Pid::EngineTemperature => ObdReading::EngineTemperature(engine_temperature(conn)?),
        Pid::Rpm => ObdReading::Rpm(rpm(conn)?),
        Pid::ThrottlePosition => ObdReading::ThrottlePosition(throttle_position(conn)?),
        Pid::CalculatedEngineLoadValue => ObdReading::CalculatedEngineLoad(calculated_engine_load(conn)?),
        Pid::FuelPressure => ObdReading::FuelPressure(fuel_pressure(conn)?),
        Pid::Mil => ObdReading::MilOn(malfunction_indicator_lamp(conn)?),
        Pid::Unknown => return Err(ObdError::UnsupportedPid(pid)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current(pid: Pid, data: &[u8]) -> ControllerResponse {
        let mut raw = format!("\n01 {:02x}", pid.code());
        for b in data {
            raw.push_str(&format!(" {b:02x}"));
        }
        raw.push_str(" \r\n>");
        ControllerResponse::parse(&raw, Mode::CurrentData, Some(pid))
    }

    fn dtcs(data: &[u8]) -> ControllerResponse {
        let mut raw = String::from("03");
        for b in data {
            raw.push_str(&format!(" {b:02X}"));
        }
        raw.push_str("\r\r>");
        ControllerResponse::parse(&raw, Mode::DiagnosticTroubleCodes, None)
    }

    /// Connection that answers every query with the same raw text
    struct CannedConnection(&'static str);

    impl ObdConnection for CannedConnection {
        fn query(&mut self, mode: Mode, pid: Option<Pid>) -> ObdResult<ControllerResponse> {
            Ok(ControllerResponse::parse(self.0, mode, pid))
        }
    }

    #[test]
    fn speed_scenario() {
        let resp = ControllerResponse::parse("\n01 0d 32 \r\n>", Mode::CurrentData, Some(Pid::Speed));
        assert_eq!(decode_speed(&resp).unwrap(), 50);
        assert_eq!(speed(&mut CannedConnection("\n01 0d 32 \r\n>")).unwrap(), 50);
    }

    #[test]
    fn rpm_scenario() {
        assert_eq!(rpm(&mut CannedConnection("\n01 0c 05 dc \r\n>")).unwrap(), 375);
    }

    #[test]
    fn speed_is_identity() {
        for v in 0..=255u8 {
            assert_eq!(decode_speed(&current(Pid::Speed, &[v])).unwrap(), u32::from(v));
        }
    }

    #[test]
    fn rpm_round_trip() {
        for r in 0..=16383u32 {
            let a = r / 64;
            let b = r * 4 - 256 * a;
            let resp = current(Pid::Rpm, &[a as u8, b as u8]);
            assert_eq!(decode_rpm(&resp).unwrap(), r);
        }
    }

    #[test]
    fn rpm_truncates() {
        assert_eq!(decode_rpm(&current(Pid::Rpm, &[0x1A, 0x2B])).unwrap(), 1674);
        assert_eq!(decode_rpm(&current(Pid::Rpm, &[0xFF, 0xFF])).unwrap(), 16383);
    }

    #[test]
    fn temperature_round_trip() {
        for t in -40..=215i32 {
            let resp = current(Pid::EngineTemperature, &[(t + 40) as u8]);
            assert_eq!(decode_engine_temperature(&resp).unwrap(), t);
        }
    }

    #[test]
    fn percentages_round_trip() {
        for p in 0..=100u32 {
            let a = (f64::from(p) * 255.0 / 100.0).round() as u8;
            assert_eq!(decode_throttle_position(&current(Pid::ThrottlePosition, &[a])).unwrap(), p);
            assert_eq!(
                decode_calculated_engine_load(&current(Pid::CalculatedEngineLoadValue, &[a])).unwrap(),
                p
            );
        }
        for a in 0..=255u8 {
            let p = decode_throttle_position(&current(Pid::ThrottlePosition, &[a])).unwrap();
            assert!(p <= 100);
        }
    }

    #[test]
    fn fuel_pressure_is_quantised() {
        for k in 0..=765u32 {
            let a = (f64::from(k) / 3.0).round() as u8;
            let decoded = decode_fuel_pressure(&current(Pid::FuelPressure, &[a])).unwrap();
            assert!(decoded.abs_diff(k) <= 1, "{k} kPa decoded as {decoded}");
        }
    }

    #[test]
    fn mil_uses_bit_7_only() {
        for a in 0..=255u8 {
            let resp = current(Pid::Mil, &[a]);
            assert_eq!(decode_malfunction_indicator_lamp(&resp).unwrap(), a >= 0x80);
        }
    }

    #[test]
    fn dtc_count_masks_mil() {
        assert_eq!(decode_dtc_count(&current(Pid::DTC_COUNT, &[0x83, 0x07])).unwrap(), 3);
        assert_eq!(decode_dtc_count(&current(Pid::DTC_COUNT, &[0x00])).unwrap(), 0);
    }

    #[test]
    fn trouble_codes_skip_padding() {
        let resp = dtcs(&[0x02, 0x01, 0x33, 0x00, 0x00, 0x00, 0x00, 0x43, 0x00, 0x01]);
        let codes = decode_diagnostic_trouble_codes(&resp).unwrap();
        assert_eq!(
            codes,
            vec![
                DiagnosticTroubleCode::new([0x01, 0x33, 0x00]),
                DiagnosticTroubleCode::new([0x43, 0x00, 0x01])
            ]
        );
        assert_eq!(codes[0].code(), "P0133");
    }

    #[test]
    fn trouble_codes_need_two_bytes() {
        let err = decode_diagnostic_trouble_codes(&dtcs(&[0x00])).unwrap_err();
        assert!(matches!(
            err,
            ObdError::Query {
                reason: QueryFailure::Incomplete,
                ..
            }
        ));
        assert!(decode_diagnostic_trouble_codes(&dtcs(&[0x00, 0x00])).unwrap().is_empty());
    }

    #[test]
    fn trailing_partial_trouble_code_is_dropped() {
        let resp = dtcs(&[0x01, 0x01, 0x33, 0x00, 0x04]);
        let codes = decode_diagnostic_trouble_codes(&resp).unwrap();
        assert_eq!(codes.len(), 1);
    }

    #[test]
    fn rpm_needs_two_bytes() {
        let err = decode_rpm(&current(Pid::Rpm, &[0x05])).unwrap_err();
        assert_eq!(err.to_string(), "RPM couldn't be queried, received data was not complete");
    }

    #[test]
    fn no_data_fails_every_decoder() {
        let empty = |pid| current(pid, &[]);
        let check = |r: ObdResult<()>, name: &str| match r {
            Err(ObdError::Query {
                parameter,
                reason: QueryFailure::NoData,
            }) => assert_eq!(parameter, name),
            other => panic!("unexpected result {other:?}"),
        };
        check(decode_speed(&empty(Pid::Speed)).map(|_| ()), SPEED);
        check(decode_engine_temperature(&empty(Pid::EngineTemperature)).map(|_| ()), ENGINE_TEMPERATURE);
        check(decode_rpm(&empty(Pid::Rpm)).map(|_| ()), RPM);
        check(decode_throttle_position(&empty(Pid::ThrottlePosition)).map(|_| ()), THROTTLE_POSITION);
        check(decode_calculated_engine_load(&empty(Pid::CalculatedEngineLoadValue)).map(|_| ()), ENGINE_LOAD);
        check(decode_fuel_pressure(&empty(Pid::FuelPressure)).map(|_| ()), FUEL_PRESSURE);
        check(decode_malfunction_indicator_lamp(&empty(Pid::Mil)).map(|_| ()), MIL);
        check(decode_diagnostic_trouble_codes(&dtcs(&[])).map(|_| ()), TROUBLE_CODES);
    }

    #[test]
    fn no_data_message() {
        let err = speed(&mut CannedConnection("\n01 0d \r\n>")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Vehicle speed couldn't be queried, the controller returned no data"
        );
    }

    #[test]
    fn read_pid_dispatch() {
        let mut conn = CannedConnection("01 0D 32\r>");
        let reading = read_pid(&mut conn, Pid::Speed).unwrap();
        assert_eq!(reading, ObdReading::Speed(50));
        assert_eq!(reading.to_string(), "Vehicle speed: 50 km/h");
        assert!(matches!(
            read_pid(&mut conn, Pid::Unknown),
            Err(ObdError::UnsupportedPid(Pid::Unknown))
        ));
        let mut conn = CannedConnection("01 01 81 07 65 00\r>");
        assert_eq!(read_pid(&mut conn, Pid::Mil).unwrap(), ObdReading::MilOn(true));
    }
}
