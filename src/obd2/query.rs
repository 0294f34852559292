//! Query engine, drives one request/response exchange with the adapter
//!
//! An exchange is a small state machine:
//!
//! ```text
//! Sending -> Accumulating -> Complete
//!                 |
//!                 +--------> TimedOut
//! ```
//!
//! Input left on the channel by an earlier exchange (EG: the late answer to a
//! request that timed out) is discarded before the command is written.
//! Every read is appended to the response buffer, and only the newly appended
//! bytes are scanned for the `>` prompt.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use log::{debug, trace, warn};

use crate::{
    channel::{ChannelError, SerialChannel},
    ObdError, ObdResult,
};

use super::{ControllerResponse, Request, PROMPT};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// Tunables for a single query
pub struct QueryOptions {
    /// Delay after writing the command, before the first read. Gives the adapter
    /// time to process the command
    pub settle_delay_ms: u64,
    /// Size of the buffer handed to each read
    pub read_buffer_size: usize,
    /// Maximum number of reads before giving up on the prompt
    pub max_read_attempts: u32,
    /// Maximum time to wait for the prompt, counted from the end of the settle delay
    pub response_timeout_ms: u64,
    /// Pause after a read that returned nothing
    pub idle_poll_ms: u64,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            settle_delay_ms: 100,
            read_buffer_size: 1024,
            max_read_attempts: 100,
            response_timeout_ms: 2000,
            idle_poll_ms: 10,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// State of an exchange with the adapter
pub enum QueryState {
    /// Command is being written
    Sending,
    /// Waiting for the prompt, appending every read
    Accumulating,
    /// Prompt seen
    Complete,
    /// Read or time budget exhausted before the prompt was seen
    TimedOut,
}

/// Sends `request` over `channel` and waits for the adapter's prompt.
///
/// ## Parameters
/// * channel - Open channel to the adapter. It is used exclusively for the whole exchange
/// * request - Request to send
/// * options - Delay, buffer and budget settings
/// * cancel - Optional flag, the exchange is aborted with [ObdError::Cancelled] once it is set
///
/// ## Returns
/// The parsed response. A response with no usable data is still returned, check
/// [ControllerResponse::has_invalid_data]
pub fn query<C: SerialChannel + ?Sized>(
    channel: &mut C,
    request: &Request,
    options: &QueryOptions,
    cancel: Option<&AtomicBool>,
) -> ObdResult<ControllerResponse> {
    if !channel.is_open() {
        return Err(ChannelError::InterfaceNotOpen.into());
    }

    let command = request.encode();
    let timeout = Duration::from_millis(options.response_timeout_ms);
    let mut buffer = vec![0u8; options.read_buffer_size.max(1)];
    let mut raw: Vec<u8> = Vec::new();
    let mut attempts = 0u32;
    let mut started = Instant::now();
    let mut state = QueryState::Sending;

    loop {
        state = match state {
            QueryState::Sending => {
                let stale = channel.clear_input()?;
                if stale > 0 {
                    warn!("Discarded {stale} stale bytes before sending {:?}", command.trim_end());
                }
                debug!("Sending {:?}", command.trim_end());
                channel.write(&command)?;
                if options.settle_delay_ms > 0 {
                    std::thread::sleep(Duration::from_millis(options.settle_delay_ms));
                }
                started = Instant::now();
                QueryState::Accumulating
            }
            QueryState::Accumulating => {
                if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                    debug!("Query {:?} cancelled after {attempts} reads", command.trim_end());
                    return Err(ObdError::Cancelled);
                }
                if attempts >= options.max_read_attempts || started.elapsed() >= timeout {
                    QueryState::TimedOut
                } else {
                    attempts += 1;
                    let read = channel.read(&mut buffer)?.min(buffer.len());
                    if read == 0 {
                        if options.idle_poll_ms > 0 {
                            std::thread::sleep(Duration::from_millis(options.idle_poll_ms));
                        }
                        QueryState::Accumulating
                    } else {
                        let scan_from = raw.len();
                        raw.extend_from_slice(&buffer[..read]);
                        if raw[scan_from..].contains(&(PROMPT as u8)) {
                            QueryState::Complete
                        } else {
                            QueryState::Accumulating
                        }
                    }
                }
            }
            QueryState::Complete => {
                // Adapter output is single byte text, map each byte straight to a char
                let text: String = raw.iter().map(|&b| char::from(b)).collect();
                debug!("Received {} bytes in {attempts} reads", raw.len());
                trace!("Raw response: {text:?}");
                let resp = ControllerResponse::parse(&text, request.mode(), request.pid());
                if let Some(defect) = resp.defect() {
                    debug!("Response to {:?} is unusable: {defect}", command.trim_end());
                }
                return Ok(resp);
            }
            QueryState::TimedOut => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                warn!(
                    "No prompt for {:?} after {attempts} reads ({elapsed_ms} ms), {} bytes received",
                    command.trim_end(),
                    raw.len()
                );
                return Err(ObdError::Timeout {
                    attempts,
                    elapsed_ms,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        hardware::simulation::SimulatedElm327,
        obd2::{Mode, Pid},
    };

    fn fast_options() -> QueryOptions {
        QueryOptions {
            settle_delay_ms: 0,
            idle_poll_ms: 0,
            max_read_attempts: 10,
            ..Default::default()
        }
    }

    fn open_sim() -> SimulatedElm327 {
        let mut sim = SimulatedElm327::new();
        sim.open().unwrap();
        sim
    }

    #[test]
    fn single_read_response() {
        let mut sim = open_sim();
        sim.add_response("010D", "\n01 0d 32 \r\n>");
        let resp = query(&mut sim, &Request::current_data(Pid::Speed), &fast_options(), None).unwrap();
        assert_eq!(resp.value(), &[0x32]);
        assert_eq!(sim.written(), vec!["010D\r".to_string()]);
    }

    #[test]
    fn response_split_over_many_reads_is_reassembled() {
        let mut sim = open_sim();
        sim.add_response("010C", "\n01 0c 05 dc \r\n>");
        sim.set_chunk_size(2);
        let opts = QueryOptions {
            max_read_attempts: 50,
            ..fast_options()
        };
        let resp = query(&mut sim, &Request::current_data(Pid::Rpm), &opts, None).unwrap();
        assert_eq!(resp.value(), &[0x05, 0xDC]);
    }

    #[test]
    fn small_read_buffer() {
        let mut sim = open_sim();
        sim.add_response("03", "03 02 01 33 00 00 00 00\r>");
        let opts = QueryOptions {
            read_buffer_size: 3,
            max_read_attempts: 50,
            ..fast_options()
        };
        let resp = query(&mut sim, &Request::trouble_codes(), &opts, None).unwrap();
        assert_eq!(resp.mode(), Mode::DiagnosticTroubleCodes);
        assert_eq!(resp.value().len(), 7);
    }

    #[test]
    fn silent_adapter_times_out_on_read_budget() {
        let mut sim = open_sim();
        match query(&mut sim, &Request::current_data(Pid::Speed), &fast_options(), None) {
            Err(ObdError::Timeout { attempts, .. }) => assert_eq!(attempts, 10),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn partial_response_without_prompt_times_out() {
        let mut sim = open_sim();
        sim.add_response("010D", "01 0D 32\r");
        let err = query(&mut sim, &Request::current_data(Pid::Speed), &fast_options(), None).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn silent_adapter_times_out_on_deadline() {
        let mut sim = open_sim();
        let opts = QueryOptions {
            max_read_attempts: u32::MAX,
            response_timeout_ms: 30,
            idle_poll_ms: 1,
            ..fast_options()
        };
        let err = query(&mut sim, &Request::current_data(Pid::Speed), &opts, None).unwrap_err();
        assert!(matches!(err, ObdError::Timeout { elapsed_ms, .. } if elapsed_ms >= 30));
    }

    #[test]
    fn late_answer_is_not_taken_for_the_next_response() {
        let mut sim = open_sim();
        sim.add_response("010D", "01 0D 32\r>");
        sim.add_response("010C", "01 0C 1A F8\r>");
        let opts = QueryOptions {
            max_read_attempts: 5,
            ..fast_options()
        };

        // Speed answer turns up one read after the query gave up on it
        sim.set_response_delay(6);
        let err = query(&mut sim, &Request::current_data(Pid::Speed), &opts, None).unwrap_err();
        assert!(matches!(err, ObdError::Timeout { attempts: 5, .. }));

        sim.set_response_delay(0);
        let resp = query(&mut sim, &Request::current_data(Pid::Rpm), &opts, None).unwrap();
        assert_eq!(resp.pid(), Some(Pid::Rpm));
        assert!(!resp.has_invalid_data());
        assert_eq!(resp.value(), &[0x1A, 0xF8]);

        let resp = query(&mut sim, &Request::current_data(Pid::Speed), &opts, None).unwrap();
        assert_eq!(resp.value(), &[0x32]);
    }

    #[test]
    fn cancelled_query() {
        let mut sim = open_sim();
        sim.add_response("010D", "01 0D 32\r>");
        let cancel = AtomicBool::new(true);
        let err = query(&mut sim, &Request::current_data(Pid::Speed), &fast_options(), Some(&cancel)).unwrap_err();
        assert!(matches!(err, ObdError::Cancelled));
        assert!(err.is_timeout());
    }

    #[test]
    fn closed_channel() {
        let mut sim = SimulatedElm327::new();
        let err = query(&mut sim, &Request::current_data(Pid::Speed), &fast_options(), None).unwrap_err();
        assert!(matches!(err, ObdError::Transport(ChannelError::InterfaceNotOpen)));
        assert!(sim.written().is_empty());
    }

    #[test]
    fn read_failure_is_surfaced() {
        let mut sim = open_sim();
        sim.add_response("010D", "01 0D 32\r>");
        sim.set_fail_read(true);
        let err = query(&mut sim, &Request::current_data(Pid::Speed), &fast_options(), None).unwrap_err();
        assert!(matches!(err, ObdError::Transport(ChannelError::IOError(_))));
    }

    #[test]
    fn empty_payload_is_returned_as_invalid() {
        let mut sim = open_sim();
        sim.add_response("0105", "01 05\r\r>");
        let resp = query(&mut sim, &Request::current_data(Pid::EngineTemperature), &fast_options(), None).unwrap();
        assert!(resp.has_invalid_data());
    }
}
