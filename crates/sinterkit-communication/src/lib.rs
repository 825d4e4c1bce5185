//! # Sinterkit Communication
//!
//! Serial transport, wire protocol, and motion control for
//! Micronix-style stage controllers:
//! - `transport` - the [`Transport`] seam, real serial port, and mock
//! - `protocol` - command encoding, reply parsing, fault decoding
//! - `motor` - per-axis model with soft-limit validation
//! - `controller` - per-channel command queue and drain worker
//! - `state` - the per-channel motion state machine

pub mod controller;
pub mod motor;
pub mod protocol;
pub mod state;
pub mod transport;

pub use controller::{CommandHandle, MotorController};
pub use motor::{Motor, MoveProgram};
pub use protocol::{decode_fault, Command, HardwareFault, Opcode, Response, StatusByte};
pub use state::{MotorControllerState, MotorEvent};
pub use transport::{list_ports, MockTransport, SerialTransport, Transport};
