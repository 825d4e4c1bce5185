//! Motor model: soft limits, command builders, stored move programs.
//!
//! Every command builder validates host-side before anything is encoded,
//! so a rejected move never reaches the wire.

use crate::protocol::{Command, Opcode};
use sinterkit_core::config::MotorSettings;
use sinterkit_core::error::{Result, ValidationError};
use sinterkit_core::types::{AxisId, ControllerRole};

/// One axis of a motion controller.
#[derive(Debug, Clone, PartialEq)]
pub struct Motor {
    /// Human-readable name, used in logs
    pub name: String,
    /// Axis number on the channel
    pub axis: AxisId,
    /// Mechanical role in the powder bed
    pub role: ControllerRole,
    /// Lower soft limit in millimeters
    pub min_position: f64,
    /// Upper soft limit in millimeters
    pub max_position: f64,
    /// Home position in millimeters
    pub home_position: f64,
    /// Travel velocity in millimeters per second
    pub velocity: f64,
    /// Last position confirmed or commanded, in millimeters
    position: f64,
}

impl Motor {
    pub fn from_settings(settings: &MotorSettings) -> Self {
        Self {
            name: settings.name.clone(),
            axis: settings.axis,
            role: settings.role,
            min_position: settings.min_position,
            max_position: settings.max_position,
            home_position: settings.home_position,
            velocity: settings.velocity,
            position: settings.home_position,
        }
    }

    /// Last position confirmed or commanded.
    pub fn position(&self) -> f64 {
        self.position
    }

    pub(crate) fn set_position(&mut self, position: f64) {
        self.position = position;
    }

    /// Check a target against the soft limits.
    pub fn validate_target(&self, target: f64) -> Result<()> {
        if target < self.min_position || target > self.max_position {
            return Err(ValidationError::OutOfRange {
                axis: self.axis,
                requested: target,
                min: self.min_position,
                max: self.max_position,
            }
            .into());
        }
        Ok(())
    }

    /// Where a relative move would land, based on the cached position.
    pub fn relative_target(&self, distance: f64) -> f64 {
        self.position + distance
    }

    /// Build a validated absolute move.
    pub fn move_absolute(&self, target: f64) -> Result<Command> {
        self.validate_target(target)?;
        Ok(Command::move_absolute(self.axis, target))
    }

    /// Build a validated relative move.
    pub fn move_relative(&self, distance: f64) -> Result<Command> {
        self.validate_target(self.relative_target(distance))?;
        Ok(Command::move_relative(self.axis, distance))
    }

    /// Build a home move. The home position is validated at
    /// configuration time, so this cannot fail.
    pub fn home(&self) -> Command {
        Command::home(self.axis, self.home_position)
    }

    /// Build a single-axis stop.
    pub fn stop(&self) -> Command {
        Command::stop(self.axis)
    }
}

/// A stored move program, recorded into a firmware slot with
/// `PGM`/`END` and replayed later with `EXC`.
///
/// Each recorded move is followed by a `WST` line so the firmware
/// serializes the moves when the program runs.
#[derive(Debug, Clone)]
pub struct MoveProgram {
    axis: AxisId,
    slot: u8,
    moves: Vec<Command>,
}

impl MoveProgram {
    pub fn new(axis: AxisId, slot: u8) -> Self {
        Self {
            axis,
            slot,
            moves: Vec::new(),
        }
    }

    pub fn axis(&self) -> AxisId {
        self.axis
    }

    pub fn slot(&self) -> u8 {
        self.slot
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Append a move to the program. Only motion commands can be
    /// recorded; read commands are rejected by the firmware.
    pub fn push(&mut self, command: Command) -> Result<()> {
        if !matches!(command.opcode, Opcode::MoveAbsolute | Opcode::MoveRelative | Opcode::Home) {
            return Err(ValidationError::InvalidConfig {
                reason: format!("only moves can be recorded, got {}", command.encode()),
            }
            .into());
        }
        if command.axis != self.axis {
            return Err(ValidationError::InvalidConfig {
                reason: format!(
                    "program records axis {}, command addresses axis {}",
                    self.axis, command.axis
                ),
            }
            .into());
        }
        self.moves.push(command);
        Ok(())
    }

    /// The full recording transcript: `PGM` header, each move followed
    /// by its `WST` barrier, and the `END` line on its own.
    pub fn record_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.moves.len() * 2 + 2);
        lines.push(Command::begin_program(self.axis, self.slot).encode());
        for command in &self.moves {
            lines.push(command.encode());
            lines.push(Command::wait_for_stop(self.axis).encode());
        }
        lines.push(Command::end_program(self.axis).encode());
        lines
    }

    /// The command that replays this program.
    pub fn execute_command(&self) -> Command {
        Command::execute_program(self.axis, self.slot)
    }

    /// The command that erases this program's slot.
    pub fn erase_command(&self) -> Command {
        Command::erase_program(self.axis, self.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sinterkit_core::config::Config;

    fn build_motor() -> Motor {
        Motor::from_settings(&Config::new().motors[0])
    }

    #[test]
    fn rejects_moves_outside_soft_limits() {
        let motor = build_motor();
        assert!(motor.move_absolute(40.0).is_err());
        assert!(motor.move_absolute(-40.0).is_err());
        assert!(motor.move_absolute(35.0).is_ok());
    }

    #[test]
    fn relative_moves_validate_against_the_cached_position() {
        let mut motor = build_motor();
        motor.set_position(30.0);
        assert!(motor.move_relative(10.0).is_err());
        assert_eq!(motor.move_relative(5.0).unwrap().encode(), "1MVR5");
        assert_eq!(motor.relative_target(-2.5), 27.5);
    }

    #[test]
    fn home_targets_the_home_position() {
        let motor = build_motor();
        assert_eq!(motor.home().encode(), "1MVA0");
    }

    #[test]
    fn program_transcript_interleaves_wait_barriers() {
        let mut program = MoveProgram::new(1, 3);
        program.push(Command::move_absolute(1, 10.0)).unwrap();
        program.push(Command::move_relative(1, -2.5)).unwrap();
        assert_eq!(
            program.record_lines(),
            vec!["1PGM3", "1MVA10", "1WST", "1MVR-2.5", "1WST", "1END"]
        );
        assert_eq!(program.execute_command().encode(), "1EXC3");
        assert_eq!(program.erase_command().encode(), "1ERA3");
    }

    #[test]
    fn program_rejects_reads_and_foreign_axes() {
        let mut program = MoveProgram::new(1, 0);
        assert!(program.push(Command::query_position(1)).is_err());
        assert!(program.push(Command::move_absolute(2, 1.0)).is_err());
        assert!(program.is_empty());
    }
}
