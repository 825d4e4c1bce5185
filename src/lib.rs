//! # Sinterkit
//!
//! Device control for a selective laser sintering bench:
//! - Micronix-style serial motion controllers behind per-channel
//!   command queues
//! - soft-limit validation before anything touches the wire
//! - layered state machines for the motion channel, the print job, and
//!   the build chamber
//!
//! ## Architecture
//!
//! Sinterkit is organized as a workspace with multiple crates:
//!
//! 1. **sinterkit-core** - error taxonomy, configuration, shared types
//! 2. **sinterkit-communication** - serial transport, wire protocol,
//!    motors, controllers
//! 3. **sinterkit-build** - print jobs, print state machine, build
//!    manager facade
//! 4. **sinterkit** - the bench binary that ties the crates together

pub use sinterkit_core::{
    Config, ControlError, ControllerRole, Error, MotionSettings, MotorSettings, ParityMode,
    ProtocolError, Result, SerialSettings, TransportError, ValidationError,
};

pub use sinterkit_communication::{
    decode_fault, list_ports, Command, CommandHandle, HardwareFault, MockTransport, Motor,
    MotorController, MotorControllerState, MotorEvent, MoveProgram, Opcode, Response,
    SerialTransport, StatusByte, Transport,
};

pub use sinterkit_build::{
    numbered_layer_files, BuildEvent, BuildManager, BuildState, ControlOutcome, LaserMarker,
    LayerRecoater, NoOpLaserMarker, NoOpPrintJournal, PrintEvent, PrintJournal, PrintModel,
    PrintState, PrintStateMachine, SliceModel, SliceQueue,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output with pretty formatting
/// - RUST_LOG environment variable support
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}
