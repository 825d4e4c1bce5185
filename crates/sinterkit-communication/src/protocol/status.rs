//! Status byte decoding.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The eight-bit status word returned by `STA?`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusByte(pub u8);

impl StatusByte {
    /// Bit 0: negative limit switch is active
    pub const NEGATIVE_LIMIT: u8 = 1 << 0;
    /// Bit 1: positive limit switch is active
    pub const POSITIVE_LIMIT: u8 = 1 << 1;
    /// Bit 2: a stored program is running
    pub const PROGRAM_RUNNING: u8 = 1 << 2;
    /// Bit 3: the stage is at rest
    pub const STAGE_STOPPED: u8 = 1 << 3;
    /// Bit 4: decelerating
    pub const DECELERATING: u8 = 1 << 4;
    /// Bit 5: at constant velocity
    pub const CONSTANT_VELOCITY: u8 = 1 << 5;
    /// Bit 6: accelerating
    pub const ACCELERATING: u8 = 1 << 6;
    /// Bit 7: one or more faults are latched
    pub const FAULTS_PRESENT: u8 = 1 << 7;

    fn bit(self, mask: u8) -> bool {
        self.0 & mask != 0
    }

    pub fn negative_limit_active(self) -> bool {
        self.bit(Self::NEGATIVE_LIMIT)
    }

    pub fn positive_limit_active(self) -> bool {
        self.bit(Self::POSITIVE_LIMIT)
    }

    pub fn program_running(self) -> bool {
        self.bit(Self::PROGRAM_RUNNING)
    }

    pub fn stage_stopped(self) -> bool {
        self.bit(Self::STAGE_STOPPED)
    }

    pub fn decelerating(self) -> bool {
        self.bit(Self::DECELERATING)
    }

    pub fn at_constant_velocity(self) -> bool {
        self.bit(Self::CONSTANT_VELOCITY)
    }

    pub fn accelerating(self) -> bool {
        self.bit(Self::ACCELERATING)
    }

    pub fn has_faults(self) -> bool {
        self.bit(Self::FAULTS_PRESENT)
    }

    pub fn is_moving(self) -> bool {
        !self.stage_stopped()
    }
}

impl fmt::Display for StatusByte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0b{:08b}", self.0)
    }
}
