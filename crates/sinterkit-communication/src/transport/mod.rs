//! Line-oriented transports.
//!
//! The controller stack talks to hardware through the [`Transport`]
//! trait: one CR/LF-terminated ASCII line per write, one stripped line
//! per read. [`SerialTransport`] drives a real port; [`MockTransport`]
//! stands in for bench-free testing.

pub mod mock;
pub mod serial;

pub use mock::MockTransport;
pub use serial::{list_ports, SerialTransport};

use sinterkit_core::Result;
use std::time::Duration;

/// A line-oriented byte channel to one controller.
///
/// Implementations are synchronous; the controller layer moves calls
/// onto the blocking pool. All methods take `&self` so a transport can
/// be shared behind an `Arc`.
pub trait Transport: Send + Sync {
    /// Write one line, appending the CR/LF terminator.
    fn write_line(&self, line: &str) -> Result<()>;

    /// Read one line, stripped of terminators, waiting up to `timeout`.
    fn read_line(&self, timeout: Duration) -> Result<String>;

    /// Human-readable channel name for logs.
    fn name(&self) -> String;

    /// Whether the channel is currently usable.
    fn is_open(&self) -> bool;

    /// Close the channel. Further reads and writes fail.
    fn close(&self) -> Result<()>;
}
