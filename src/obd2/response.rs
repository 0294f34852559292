//! Parsing of the text an ELM327 adapter sends back for a request

use std::fmt::{Display, Formatter};

use super::{Mode, Pid, PROMPT};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Reason a controller response is unusable
pub enum ResponseDefect {
    /// The echoed mode (and PID) could not be found in the response
    EchoNotFound,
    /// The echo was found, but no data bytes followed it
    NoData,
    /// A token where a data byte was expected is not a hex byte
    MalformedToken(String),
}

impl Display for ResponseDefect {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseDefect::EchoNotFound => write!(f, "request echo not found"),
            ResponseDefect::NoData => write!(f, "no data bytes after echo"),
            ResponseDefect::MalformedToken(t) => write!(f, "malformed data token '{t}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Structured response from the vehicle's controller
pub struct ControllerResponse {
    mode: Mode,
    pid: Option<Pid>,
    value: Vec<u8>,
    defect: Option<ResponseDefect>,
}

impl ControllerResponse {
    /// Parses the raw text read from the adapter for a request of `mode` / `pid`.
    ///
    /// Everything from the first `>` prompt onwards is ignored. The first occurrence of
    /// the echoed mode (followed by the echoed PID, if one was requested) marks the start
    /// of the data, and every token after it is parsed as a hex byte.
    pub fn parse(raw: &str, mode: Mode, pid: Option<Pid>) -> Self {
        let body = match raw.find(PROMPT) {
            Some(idx) => &raw[..idx],
            None => raw,
        };
        let tokens: Vec<&str> = body.split_whitespace().collect();

        let mut echo = vec![mode.code()];
        if let Some(p) = pid {
            echo.push(p.code());
        }

        let mut res = Self {
            mode,
            pid,
            value: Vec::new(),
            defect: None,
        };

        let Some(start) = find_echo(&tokens, &echo) else {
            res.defect = Some(ResponseDefect::EchoNotFound);
            return res;
        };

        for token in &tokens[start + echo.len()..] {
            match parse_hex_byte(token) {
                Some(b) => res.value.push(b),
                None => {
                    res.value.clear();
                    res.defect = Some(ResponseDefect::MalformedToken(token.to_string()));
                    return res;
                }
            }
        }
        if res.value.is_empty() {
            res.defect = Some(ResponseDefect::NoData);
        }
        res
    }

    /// Service the response answers
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// PID the response answers, if the request had one
    pub fn pid(&self) -> Option<Pid> {
        self.pid
    }

    /// Data bytes following the echo, in the order they were received
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Reason the response is unusable, if any
    pub fn defect(&self) -> Option<&ResponseDefect> {
        self.defect.as_ref()
    }

    /// Returns true if the echo could not be found, a data token was malformed,
    /// or no data bytes were received. Decoders must check this before indexing
    /// into [ControllerResponse::value]
    pub fn has_invalid_data(&self) -> bool {
        self.defect.is_some()
    }
}

/// Index of the first token run matching `echo`
fn find_echo(tokens: &[&str], echo: &[u8]) -> Option<usize> {
    if tokens.len() < echo.len() {
        return None;
    }
    (0..=tokens.len() - echo.len()).find(|&i| {
        echo.iter()
            .zip(&tokens[i..])
            .all(|(b, t)| parse_hex_byte(t) == Some(*b))
    })
}

fn parse_hex_byte(token: &str) -> Option<u8> {
    if token.len() != 2 || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(token, 16).ok()
}
