//! Reply line parsing.
//!
//! Parsing is context-free: each reply shape is distinguishable from the
//! line alone. Fault lists start with `#Error`, position readbacks with
//! `#`, and a bare integer in `0..=255` is a status byte. A bare number
//! with a decimal point (or outside the byte range) is still accepted as
//! a position for firmware that omits the `#` prefix.

use crate::protocol::error_decoder::decode_fault;
use crate::protocol::status::StatusByte;
use sinterkit_core::error::{ProtocolError, Result};

/// One latched firmware fault from an `ERR?` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareFault {
    /// Numeric fault code
    pub code: u8,
    /// The command mnemonic the firmware blamed, if any
    pub command: String,
    /// Human-readable fault message
    pub message: String,
}

/// A decoded reply line.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Command produced no reply line; completion inferred host-side
    Ack,
    /// `#12.345000` - position readback in millimeters
    Position(f64),
    /// `136` - status byte readback
    Status(StatusByte),
    /// `#Error 37 - MVA - ...` - latched fault list, cleared on read
    Faults(Vec<HardwareFault>),
}

impl Response {
    /// Parse a single reply line.
    pub fn parse(line: &str) -> Result<Response> {
        let line = line.trim();
        if line.is_empty() {
            return Err(malformed(line));
        }

        if line.starts_with("#Error") {
            return Ok(Response::Faults(parse_faults(line)?));
        }

        if let Some(rest) = line.strip_prefix('#') {
            // Some firmware revisions report "theoretical,encoder"; the
            // first field is the one callers want.
            let first = rest.split(',').next().unwrap_or(rest).trim();
            return match first.parse::<f64>() {
                Ok(value) => Ok(Response::Position(value)),
                Err(_) => Err(malformed(line)),
            };
        }

        if !line.contains('.') {
            if let Ok(byte) = line.parse::<u8>() {
                return Ok(Response::Status(StatusByte(byte)));
            }
        }
        if let Ok(value) = line.parse::<f64>() {
            return Ok(Response::Position(value));
        }

        Err(malformed(line))
    }

    /// Short reply-kind name for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Response::Ack => "ack",
            Response::Position(_) => "position",
            Response::Status(_) => "status",
            Response::Faults(_) => "faults",
        }
    }
}

fn malformed(line: &str) -> sinterkit_core::Error {
    ProtocolError::MalformedReply {
        line: line.to_string(),
    }
    .into()
}

/// Parse a fault list: one or more `#Error <code> - <CMD> - <message>`
/// segments, which the firmware concatenates onto a single line.
fn parse_faults(line: &str) -> Result<Vec<HardwareFault>> {
    let mut faults = Vec::new();
    for segment in line.split("#Error") {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let mut parts = segment.splitn(3, '-').map(str::trim);
        let code = parts
            .next()
            .and_then(|c| c.parse::<u8>().ok())
            .ok_or_else(|| malformed(line))?;
        let command = parts.next().unwrap_or("").to_string();
        let message = match parts.next() {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => decode_fault(code),
        };
        faults.push(HardwareFault {
            code,
            command,
            message,
        });
    }
    if faults.is_empty() {
        return Err(malformed(line));
    }
    Ok(faults)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_position_readbacks() {
        assert_eq!(Response::parse("#12.345000").unwrap(), Response::Position(12.345));
        assert_eq!(Response::parse("#-5.5").unwrap(), Response::Position(-5.5));
        assert_eq!(Response::parse("#0").unwrap(), Response::Position(0.0));
        // dual-readback firmware: theoretical first, encoder second
        assert_eq!(Response::parse("#3.25,3.24").unwrap(), Response::Position(3.25));
    }

    #[test]
    fn bare_integers_in_byte_range_are_status() {
        assert_eq!(Response::parse("136").unwrap(), Response::Status(StatusByte(136)));
        assert_eq!(Response::parse("0").unwrap(), Response::Status(StatusByte(0)));
        assert_eq!(Response::parse("8").unwrap(), Response::Status(StatusByte(8)));
    }

    #[test]
    fn bare_numbers_outside_status_shape_are_positions() {
        assert_eq!(Response::parse("12.5").unwrap(), Response::Position(12.5));
        assert_eq!(Response::parse("-3").unwrap(), Response::Position(-3.0));
        assert_eq!(Response::parse("300").unwrap(), Response::Position(300.0));
    }

    #[test]
    fn parses_a_single_fault() {
        let parsed = Response::parse("#Error 37 - MVA - Move outside soft limits").unwrap();
        assert_eq!(
            parsed,
            Response::Faults(vec![HardwareFault {
                code: 37,
                command: "MVA".to_string(),
                message: "Move outside soft limits".to_string(),
            }])
        );
    }

    #[test]
    fn parses_concatenated_faults() {
        let line = "#Error 10 - - Receive buffer overrun#Error 37 - MVA - Move outside soft limits";
        match Response::parse(line).unwrap() {
            Response::Faults(faults) => {
                assert_eq!(faults.len(), 2);
                assert_eq!(faults[0].code, 10);
                assert_eq!(faults[1].code, 37);
                assert_eq!(faults[1].command, "MVA");
            }
            other => panic!("expected faults, got {:?}", other),
        }
    }

    #[test]
    fn missing_message_falls_back_to_the_decoder() {
        match Response::parse("#Error 11 - MVR -").unwrap() {
            Response::Faults(faults) => {
                assert_eq!(faults[0].message, "Motor is disabled");
            }
            other => panic!("expected faults, got {:?}", other),
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(Response::parse("").is_err());
        assert!(Response::parse("hello").is_err());
        assert!(Response::parse("#abc").is_err());
        assert!(Response::parse("#Error banana").is_err());
    }

    proptest! {
        #[test]
        fn any_prefixed_position_round_trips(value in -1_000.0f64..1_000.0) {
            let line = format!("#{:.6}", value);
            match Response::parse(&line).unwrap() {
                Response::Position(parsed) => prop_assert!((parsed - value).abs() < 1e-6),
                other => prop_assert!(false, "expected position, got {:?}", other),
            }
        }

        #[test]
        fn any_status_byte_round_trips(byte in 0u8..=255) {
            let line = format!("{}", byte);
            prop_assert_eq!(Response::parse(&line).unwrap(), Response::Status(StatusByte(byte)));
        }
    }
}
