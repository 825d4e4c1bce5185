//! Fault code decoding for Micronix-style stage firmware.
//!
//! `ERR?` replies carry numeric fault codes; this module maps them to
//! human-readable descriptions for logs and error values. Code 0 is
//! host-assigned and never produced by the firmware itself.

/// Host-side code for faults that never reached the firmware.
pub const COM_PORT_FAULT: u8 = 0;

/// Decode a firmware fault code into a human-readable description.
pub fn decode_fault(code: u8) -> String {
    let message = match code {
        0 => "Communication port error",
        10 => "Receive buffer overrun",
        11 => "Motor is disabled",
        12 => "No encoder detected",
        13 => "Index not found",
        14 => "Home requires an encoder",
        15 => "Move to limit requires an encoder",
        20 => "Command is read only",
        21 => "One read operation per line",
        22 => "Too many commands on line",
        23 => "Line character limit exceeded",
        24 => "Missing axis number",
        25 => "Malformed command",
        26 => "Invalid command",
        27 => "Global read operation request",
        28 => "Invalid parameter type",
        29 => "Invalid character in parameter",
        30 => "Command cannot be used in global context",
        31 => "Parameter out of bounds",
        32 => "Incorrect jog velocity request",
        33 => "Not in jog mode",
        34 => "Trace already in progress",
        35 => "Trace did not complete",
        36 => "Command cannot be executed during motion",
        37 => "Move outside soft limits",
        38 => "Read not available for this command",
        39 => "Program number out of range",
        40 => "Program size limit exceeded",
        41 => "Program failed to record",
        42 => "End command must be on its own line",
        43 => "Failed to read program",
        44 => "Command only valid within program",
        45 => "Program already exists",
        50 => "Limit activated",
        51 => "End of travel limit",
        52 => "Home in progress",
        53 => "IO function already in use",
        54 => "Invalid resolution",
        55 => "Limits are not configured properly",
        80 => "Command not available in this version",
        81 => "Analog encoder not available in this version",
        _ => return format!("Unknown fault code: {}", code),
    };
    message.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_known_codes() {
        assert_eq!(decode_fault(37), "Move outside soft limits");
        assert_eq!(decode_fault(11), "Motor is disabled");
        assert_eq!(decode_fault(52), "Home in progress");
        assert_eq!(decode_fault(COM_PORT_FAULT), "Communication port error");
    }

    #[test]
    fn unknown_codes_carry_the_number() {
        assert_eq!(decode_fault(99), "Unknown fault code: 99");
    }
}
