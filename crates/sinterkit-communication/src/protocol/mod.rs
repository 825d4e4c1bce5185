//! Wire protocol for Micronix-style motion controllers.
//!
//! The protocol is line-oriented ASCII. Commands are
//! `{axis}{mnemonic}{argument}` (`1MVA20`, `0STP`, `2POS?`); replies are
//! `#`-prefixed position readbacks, bare status bytes, or `#Error` fault
//! lists.

pub mod command;
pub mod error_decoder;
pub mod response;
pub mod status;

pub use command::{Command, Opcode};
pub use error_decoder::decode_fault;
pub use response::{HardwareFault, Response};
pub use status::StatusByte;
