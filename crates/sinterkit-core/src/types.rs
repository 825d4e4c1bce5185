//! Shared primitive types for the device-control stack.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Axis number as it appears on the wire (`1MVA20`, `2POS?`, ...).
///
/// Axis numbers start at 1; `0` addresses every axis on the channel.
pub type AxisId = u8;

/// Wire address that targets every axis on the channel at once.
pub const ALL_AXES: AxisId = 0;

/// The mechanical role a motor plays in the powder bed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerRole {
    /// Build platform: carries the part, sinks one layer per recoat.
    Build,
    /// Powder supply platform: rises to dose fresh powder.
    Powder,
    /// Recoater sweep: spreads the dosed powder across the bed.
    Sweep,
}

impl fmt::Display for ControllerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerRole::Build => write!(f, "build"),
            ControllerRole::Powder => write!(f, "powder"),
            ControllerRole::Sweep => write!(f, "sweep"),
        }
    }
}
