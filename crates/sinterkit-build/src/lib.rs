//! # Sinterkit Build
//!
//! Print and build orchestration:
//! - `job` - print and slice descriptors, mark bookkeeping
//! - `collaborators` - laser, journal, and recoater seams
//! - `print` - the per-job print state machine
//! - `build_manager` - the machine facade and recoat choreography

pub mod build_manager;
pub mod collaborators;
pub mod job;
pub mod print;

pub use build_manager::{BuildEvent, BuildManager, BuildState, ControlOutcome, LayerRecoater};
pub use collaborators::{
    LaserMarker, NoOpLaserMarker, NoOpPrintJournal, PrintJournal, Recoater,
};
pub use job::{numbered_layer_files, PrintModel, SliceModel, SliceQueue};
pub use print::{PrintEvent, PrintState, PrintStateMachine};
