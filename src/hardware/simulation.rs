//! Simulated ELM327 adapter for unit testing and offline development

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::channel::{ChannelError, ChannelResult, SerialChannel};

#[derive(Debug)]
struct SimState {
    req_resp_map: HashMap<String, Vec<u8>>,
    rx_queue: VecDeque<u8>,
    /// Responses still on their way, with the number of reads left before they arrive
    in_flight: Vec<(u32, Vec<u8>)>,
    response_delay: u32,
    written: Vec<String>,
    chunk_size: usize,
    open: bool,
    open_count: u32,
    close_count: u32,
    fail_open: bool,
    fail_read: bool,
}

/// A scripted ELM327 adapter.
///
/// Each command written to the adapter is looked up in a table of canned responses,
/// and the matching response is queued up for reading. Commands with no scripted
/// response are swallowed, like an adapter that stopped answering.
///
/// Clones share the same state, so a test can keep a handle on the adapter after
/// moving it into a [crate::connection::SerialConnection].
#[derive(Debug, Clone)]
pub struct SimulatedElm327 {
    state: Arc<RwLock<SimState>>,
}

impl Default for SimulatedElm327 {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedElm327 {
    /// Creates a closed adapter with no scripted responses
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(SimState {
                req_resp_map: HashMap::new(),
                rx_queue: VecDeque::new(),
                in_flight: Vec::new(),
                response_delay: 0,
                written: Vec::new(),
                chunk_size: usize::MAX,
                open: false,
                open_count: 0,
                close_count: 0,
                fail_open: false,
                fail_read: false,
            })),
        }
    }

    fn state(&self) -> RwLockReadGuard<'_, SimState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn state_mut(&self) -> RwLockWriteGuard<'_, SimState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Scripts the raw `response` text for a command. `req` is given without its
    /// trailing carriage return, EG: `010D`
    pub fn add_response(&mut self, req: &str, response: &str) {
        self.state_mut()
            .req_resp_map
            .insert(req.trim().to_ascii_uppercase(), response.as_bytes().to_vec());
    }

    /// Clears all scripted responses and any pending data
    pub fn clear_map(&mut self) {
        let mut state = self.state_mut();
        state.req_resp_map.clear();
        state.rx_queue.clear();
        state.in_flight.clear();
    }

    /// Limits how many bytes a single read returns, to split responses over multiple reads
    pub fn set_chunk_size(&mut self, chunk_size: usize) {
        self.state_mut().chunk_size = chunk_size.max(1);
    }

    /// Delays responses to subsequently written commands, so each one only becomes
    /// readable on the `reads`th read after its command was written. `0` answers immediately
    pub fn set_response_delay(&mut self, reads: u32) {
        self.state_mut().response_delay = reads;
    }

    /// Makes subsequent calls to open fail
    pub fn set_fail_open(&mut self, fail: bool) {
        self.state_mut().fail_open = fail;
    }

    /// Makes subsequent reads fail with an IO error
    pub fn set_fail_read(&mut self, fail: bool) {
        self.state_mut().fail_read = fail;
    }

    /// Every command written to the adapter so far, terminators included
    pub fn written(&self) -> Vec<String> {
        self.state().written.clone()
    }

    /// Number of times the adapter was actually opened
    pub fn open_count(&self) -> u32 {
        self.state().open_count
    }

    /// Number of times the adapter was actually closed
    pub fn close_count(&self) -> u32 {
        self.state().close_count
    }
}

impl SerialChannel for SimulatedElm327 {
    fn is_open(&self) -> bool {
        self.state().open
    }

    fn open(&mut self) -> ChannelResult<()> {
        let mut state = self.state_mut();
        if state.fail_open {
            return Err(ChannelError::DeviceUnavailable {
                port: "simulated".into(),
                desc: "device is busy".into(),
            });
        }
        state.open = true;
        state.open_count += 1;
        Ok(())
    }

    fn close(&mut self) -> ChannelResult<()> {
        let mut state = self.state_mut();
        state.open = false;
        state.close_count += 1;
        state.rx_queue.clear();
        state.in_flight.clear();
        Ok(())
    }

    fn write(&mut self, command: &str) -> ChannelResult<()> {
        let mut state = self.state_mut();
        if !state.open {
            return Err(ChannelError::InterfaceNotOpen);
        }
        state.written.push(command.to_string());
        let key = command.trim().to_ascii_uppercase();
        if let Some(resp) = state.req_resp_map.get(&key).cloned() {
            match state.response_delay {
                0 => state.rx_queue.extend(resp),
                delay => state.in_flight.push((delay, resp)),
            }
        }
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> ChannelResult<usize> {
        let mut state = self.state_mut();
        if !state.open {
            return Err(ChannelError::InterfaceNotOpen);
        }
        if state.fail_read {
            return Err(ChannelError::IOError(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "adapter unplugged",
            )));
        }
        let state = &mut *state;
        let mut idx = 0;
        while idx < state.in_flight.len() {
            state.in_flight[idx].0 = state.in_flight[idx].0.saturating_sub(1);
            if state.in_flight[idx].0 == 0 {
                let (_, resp) = state.in_flight.remove(idx);
                state.rx_queue.extend(resp);
            } else {
                idx += 1;
            }
        }
        let count = buffer.len().min(state.chunk_size).min(state.rx_queue.len());
        for (slot, byte) in buffer.iter_mut().zip(state.rx_queue.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }
}
