//! Command encoding.
//!
//! Every command addresses a single axis (or axis 0 for a channel-wide
//! broadcast) and encodes as `{axis}{mnemonic}{argument}` with no
//! whitespace. Read commands carry a trailing `?` in the mnemonic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sinterkit_core::types::{AxisId, ALL_AXES};
use std::fmt;

/// Command mnemonics understood by the stage firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    /// `MVA` - move to an absolute position
    MoveAbsolute,
    /// `MVR` - move by a relative distance
    MoveRelative,
    /// `MVA` to the configured home position
    Home,
    /// `STP` - stop one axis
    Stop,
    /// `0STP` - stop every axis on the channel
    StopAll,
    /// `WST` - wait for the stage to stop
    WaitForStop,
    /// `PGM` - begin recording a stored program
    BeginProgram,
    /// `END` - end program recording
    EndProgram,
    /// `EXC` - execute a stored program
    ExecuteProgram,
    /// `ERA` - erase a stored program
    EraseProgram,
    /// `STA?` - read the status byte
    QueryStatus,
    /// `POS?` - read the current position
    QueryPosition,
    /// `ERR?` - read and clear the fault list
    QueryErrors,
}

impl Opcode {
    /// Wire mnemonic for the opcode.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::MoveAbsolute | Opcode::Home => "MVA",
            Opcode::MoveRelative => "MVR",
            Opcode::Stop | Opcode::StopAll => "STP",
            Opcode::WaitForStop => "WST",
            Opcode::BeginProgram => "PGM",
            Opcode::EndProgram => "END",
            Opcode::ExecuteProgram => "EXC",
            Opcode::EraseProgram => "ERA",
            Opcode::QueryStatus => "STA?",
            Opcode::QueryPosition => "POS?",
            Opcode::QueryErrors => "ERR?",
        }
    }

    /// Whether the firmware sends a reply line for this command.
    pub fn expects_reply(&self) -> bool {
        matches!(
            self,
            Opcode::QueryStatus | Opcode::QueryPosition | Opcode::QueryErrors
        )
    }

    /// Whether the command starts stage motion and therefore needs a
    /// wait-for-stop follow-up.
    pub fn is_motion(&self) -> bool {
        matches!(
            self,
            Opcode::MoveAbsolute | Opcode::MoveRelative | Opcode::Home | Opcode::ExecuteProgram
        )
    }
}

/// A single command addressed to one axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Target axis (0 broadcasts to the whole channel)
    pub axis: AxisId,
    /// Operation to perform
    pub opcode: Opcode,
    /// Numeric argument, if the opcode takes one
    pub argument: Option<f64>,
    /// When the command was created host-side
    pub issued_at: DateTime<Utc>,
}

impl Command {
    /// Create a command with the current timestamp.
    pub fn new(axis: AxisId, opcode: Opcode, argument: Option<f64>) -> Self {
        Self {
            axis,
            opcode,
            argument,
            issued_at: Utc::now(),
        }
    }

    /// `{axis}MVA{target}` - absolute move.
    pub fn move_absolute(axis: AxisId, target: f64) -> Self {
        Self::new(axis, Opcode::MoveAbsolute, Some(target))
    }

    /// `{axis}MVR{distance}` - relative move.
    pub fn move_relative(axis: AxisId, distance: f64) -> Self {
        Self::new(axis, Opcode::MoveRelative, Some(distance))
    }

    /// Home is an absolute move to the configured home position.
    pub fn home(axis: AxisId, home_position: f64) -> Self {
        Self::new(axis, Opcode::Home, Some(home_position))
    }

    /// `{axis}STP` - stop one axis.
    pub fn stop(axis: AxisId) -> Self {
        Self::new(axis, Opcode::Stop, None)
    }

    /// `0STP` - emergency stop for every axis on the channel.
    pub fn stop_all() -> Self {
        Self::new(ALL_AXES, Opcode::StopAll, None)
    }

    /// `{axis}WST` - wait for the stage to come to rest.
    pub fn wait_for_stop(axis: AxisId) -> Self {
        Self::new(axis, Opcode::WaitForStop, None)
    }

    /// `{axis}PGM{slot}` - begin recording into a program slot.
    pub fn begin_program(axis: AxisId, slot: u8) -> Self {
        Self::new(axis, Opcode::BeginProgram, Some(f64::from(slot)))
    }

    /// `{axis}END` - finish recording.
    pub fn end_program(axis: AxisId) -> Self {
        Self::new(axis, Opcode::EndProgram, None)
    }

    /// `{axis}EXC{slot}` - run a stored program.
    pub fn execute_program(axis: AxisId, slot: u8) -> Self {
        Self::new(axis, Opcode::ExecuteProgram, Some(f64::from(slot)))
    }

    /// `{axis}ERA{slot}` - erase a stored program.
    pub fn erase_program(axis: AxisId, slot: u8) -> Self {
        Self::new(axis, Opcode::EraseProgram, Some(f64::from(slot)))
    }

    /// `{axis}STA?` - status byte readback.
    pub fn query_status(axis: AxisId) -> Self {
        Self::new(axis, Opcode::QueryStatus, None)
    }

    /// `{axis}POS?` - position readback.
    pub fn query_position(axis: AxisId) -> Self {
        Self::new(axis, Opcode::QueryPosition, None)
    }

    /// `{axis}ERR?` - read and clear the fault list.
    pub fn query_errors(axis: AxisId) -> Self {
        Self::new(axis, Opcode::QueryErrors, None)
    }

    /// Render the command as a wire line, without the line terminator.
    pub fn encode(&self) -> String {
        let mut line = format!("{}{}", self.axis, self.opcode.mnemonic());
        if let Some(value) = self.argument {
            line.push_str(&format_value(value));
        }
        line
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// Format a numeric argument the way the firmware expects: integral
/// values render without a trailing `.0`.
pub fn format_value(value: f64) -> String {
    if value.is_finite() && value == value.trunc() {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_moves() {
        assert_eq!(Command::move_absolute(1, 20.0).encode(), "1MVA20");
        assert_eq!(Command::move_absolute(1, -12.5).encode(), "1MVA-12.5");
        assert_eq!(Command::move_relative(2, 0.1).encode(), "2MVR0.1");
        assert_eq!(Command::move_relative(2, -0.1).encode(), "2MVR-0.1");
    }

    #[test]
    fn home_encodes_as_absolute_move() {
        assert_eq!(Command::home(1, 0.0).encode(), "1MVA0");
        assert_eq!(Command::home(3, -4.25).encode(), "3MVA-4.25");
    }

    #[test]
    fn stop_all_broadcasts_on_axis_zero() {
        assert_eq!(Command::stop_all().encode(), "0STP");
        assert_eq!(Command::stop(2).encode(), "2STP");
    }

    #[test]
    fn queries_carry_the_question_mark() {
        assert_eq!(Command::query_status(1).encode(), "1STA?");
        assert_eq!(Command::query_position(2).encode(), "2POS?");
        assert_eq!(Command::query_errors(1).encode(), "1ERR?");
    }

    #[test]
    fn program_commands_take_a_slot() {
        assert_eq!(Command::begin_program(1, 3).encode(), "1PGM3");
        assert_eq!(Command::end_program(1).encode(), "1END");
        assert_eq!(Command::execute_program(1, 3).encode(), "1EXC3");
        assert_eq!(Command::erase_program(1, 3).encode(), "1ERA3");
    }

    #[test]
    fn integral_arguments_drop_the_decimal_point() {
        assert_eq!(format_value(20.0), "20");
        assert_eq!(format_value(-7.0), "-7");
        assert_eq!(format_value(0.05), "0.05");
        assert_eq!(format_value(-0.05), "-0.05");
    }

    #[test]
    fn motion_classification() {
        assert!(Opcode::MoveAbsolute.is_motion());
        assert!(Opcode::Home.is_motion());
        assert!(Opcode::ExecuteProgram.is_motion());
        assert!(!Opcode::Stop.is_motion());
        assert!(Opcode::QueryPosition.expects_reply());
        assert!(!Opcode::MoveAbsolute.expects_reply());
    }
}
