//! # Sinterkit Core
//!
//! Core types for the Sinterkit device-control stack:
//! - Error taxonomy (`error`)
//! - Machine configuration with JSON persistence (`config`)
//! - Shared primitives: axis ids, motor roles (`types`)

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, MotionSettings, MotorSettings, ParityMode, SerialSettings};
pub use error::{
    ControlError, Error, ProtocolError, Result, TransportError, ValidationError,
};
pub use types::{AxisId, ControllerRole, ALL_AXES};
