//! Build manager: the upstream facade over the whole machine.
//!
//! Owns the three stage controllers (build platform, powder supply,
//! recoater sweep) and the print state machine, and exposes the
//! start/pause/resume/cancel/redo/home surface the operator layer
//! calls. The recoat choreography between layers lives here too.

use crate::collaborators::{LaserMarker, PrintJournal, Recoater};
use crate::job::{PrintModel, SliceQueue};
use crate::print::{PrintState, PrintStateMachine};
use async_trait::async_trait;
use parking_lot::Mutex;
use sinterkit_communication::MotorController;
use sinterkit_core::config::MotionSettings;
use sinterkit_core::error::{ControlError, Error, Result};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifecycle of the build chamber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    /// Ready for a job
    Start,
    /// A job is drawing and recoating
    Draw,
    /// Job paused at a layer boundary
    Pause,
    /// Job aborted; redo or re-arm to recover
    Cancel,
    /// Job finished
    Done,
}

/// Events accepted by the build state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildEvent {
    Play,
    Pause,
    Resume,
    Cancel,
    Redo,
    Finish,
}

impl BuildState {
    /// Total transition function over (state, event).
    pub fn transition(self, event: BuildEvent) -> Result<Self> {
        use BuildState::*;
        let next = match (self, event) {
            (Start, BuildEvent::Play) | (Done, BuildEvent::Play) => Draw,
            (Draw, BuildEvent::Pause) => Pause,
            (Pause, BuildEvent::Resume) => Draw,
            (Draw, BuildEvent::Finish) => Done,
            (Pause, BuildEvent::Redo) | (Cancel, BuildEvent::Redo) => Pause,
            (_, BuildEvent::Cancel) => Cancel,
            (current, event) => {
                return Err(ControlError::InvalidStateTransition {
                    current: current.to_string(),
                    event: format!("{:?}", event),
                }
                .into());
            }
        };
        Ok(next)
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// What a facade call came to: a flag the operator layer can branch on
/// and a human-readable status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlOutcome {
    pub success: bool,
    pub message: String,
}

impl ControlOutcome {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn failed(error: &Error) -> Self {
        Self {
            success: false,
            message: error.to_string(),
        }
    }
}

/// Rest heights of the two platforms between layers. Advanced only
/// when a whole recoat succeeds, so a re-run after an abort targets the
/// same levels instead of compounding an offset.
#[derive(Debug, Clone, Copy)]
struct RestLevels {
    build: f64,
    powder: f64,
}

/// Recoat choreography across the three stages.
///
/// Per layer: drop both platforms clear of the blade, sweep home, bring
/// the platforms back, dose fresh powder, sink the part by one layer,
/// and spread with a sweep to the far end of travel. Every platform
/// move is an absolute target against the recorded rest levels.
pub struct LayerRecoater {
    build: Arc<MotorController>,
    powder: Arc<MotorController>,
    sweep: Arc<MotorController>,
    motion: MotionSettings,
    levels: Mutex<Option<RestLevels>>,
}

impl LayerRecoater {
    pub fn new(
        build: Arc<MotorController>,
        powder: Arc<MotorController>,
        sweep: Arc<MotorController>,
        motion: MotionSettings,
    ) -> Self {
        Self {
            build,
            powder,
            sweep,
            motion,
            levels: Mutex::new(None),
        }
    }

    /// Current rest levels, seeded from the cached positions on first
    /// use.
    fn rest_levels(&self) -> RestLevels {
        let mut levels = self.levels.lock();
        *levels.get_or_insert_with(|| RestLevels {
            build: stage_level(&self.build),
            powder: stage_level(&self.powder),
        })
    }

    /// Read and clear latched faults on every axis so stale history
    /// cannot trip the stop polling mid-recoat.
    async fn clear_faults(&self) -> Result<()> {
        for controller in [&self.build, &self.powder, &self.sweep] {
            for motor in controller.motors() {
                let faults = controller.read_and_clear_faults(motor.axis).await?;
                for fault in faults {
                    warn!(
                        channel = controller.name(),
                        axis = motor.axis,
                        code = fault.code,
                        message = %fault.message,
                        "cleared stale fault"
                    );
                }
            }
        }
        Ok(())
    }

    /// Sweep to the far end of travel, spreading the dosed powder.
    async fn spread(&self) -> Result<()> {
        for motor in self.sweep.motors() {
            self.sweep.move_absolute(motor.axis, motor.max_position).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Recoater for LayerRecoater {
    async fn recoat(&self, thickness: f64) -> Result<()> {
        let clearance = self.motion.sweep_clearance;
        let dose = thickness * self.motion.supply_amplifier;
        let rest = self.rest_levels();
        debug!(thickness, dose, clearance, build = rest.build, powder = rest.powder, "recoat");

        self.clear_faults().await?;

        // clear the blade, park it at home, then bring the platforms
        // back to their rest levels
        self.build.move_all_absolute(rest.build - clearance).await?;
        self.powder.move_all_absolute(rest.powder - clearance).await?;
        self.sweep.home_all().await?;
        self.build.move_all_absolute(rest.build).await?;
        self.powder.move_all_absolute(rest.powder).await?;

        // dose fresh powder and sink the part by one layer
        self.powder.move_all_absolute(rest.powder + dose).await?;
        self.build.move_all_absolute(rest.build - thickness).await?;

        self.spread().await?;

        // the finished layer's levels are the next layer's rest levels
        *self.levels.lock() = Some(RestLevels {
            build: rest.build - thickness,
            powder: rest.powder + dose,
        });
        Ok(())
    }

    async fn restore(&self) -> Result<()> {
        let rest = { *self.levels.lock() };
        let Some(rest) = rest else {
            // nothing recorded yet, the stages never left their levels
            return Ok(());
        };
        let clearance = self.motion.sweep_clearance;
        debug!(build = rest.build, powder = rest.powder, "restoring stages to recorded levels");
        self.clear_faults().await?;
        self.build.move_all_absolute(rest.build - clearance).await?;
        self.powder.move_all_absolute(rest.powder - clearance).await?;
        self.sweep.home_all().await?;
        self.build.move_all_absolute(rest.build).await?;
        self.powder.move_all_absolute(rest.powder).await?;
        Ok(())
    }

    async fn halt(&self) -> Result<()> {
        let mut first_error = None;
        for controller in [&self.build, &self.powder, &self.sweep] {
            if let Err(e) = controller.stop_all().await {
                warn!(channel = controller.name(), error = %e, "halt failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn rearm(&self) {
        for controller in [&self.build, &self.powder, &self.sweep] {
            controller.rearm();
        }
    }
}

/// A platform's height, taken from its first motor; the axes of one
/// stage always move together.
fn stage_level(controller: &MotorController) -> f64 {
    controller.motors().first().map_or(0.0, |m| m.position())
}

/// The machine facade handed to the operator layer.
pub struct BuildManager {
    state: Mutex<BuildState>,
    build: Arc<MotorController>,
    powder: Arc<MotorController>,
    sweep: Arc<MotorController>,
    print: Arc<PrintStateMachine>,
}

impl BuildManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        build: Arc<MotorController>,
        powder: Arc<MotorController>,
        sweep: Arc<MotorController>,
        motion: MotionSettings,
        print: PrintModel,
        slices: SliceQueue,
        laser: Arc<dyn LaserMarker>,
        journal: Arc<dyn PrintJournal>,
    ) -> Self {
        let layer_thickness = motion.layer_thickness;
        let recoater = Arc::new(LayerRecoater::new(
            Arc::clone(&build),
            Arc::clone(&powder),
            Arc::clone(&sweep),
            motion,
        ));
        let print = Arc::new(PrintStateMachine::new(
            print,
            slices,
            laser,
            journal,
            recoater,
            layer_thickness,
        ));
        Self {
            state: Mutex::new(BuildState::Start),
            build,
            powder,
            sweep,
            print,
        }
    }

    pub fn state(&self) -> BuildState {
        *self.state.lock()
    }

    /// The underlying print machine, for progress queries.
    pub fn print(&self) -> &Arc<PrintStateMachine> {
        &self.print
    }

    fn apply(&self, event: BuildEvent) -> Result<BuildState> {
        let mut state = self.state.lock();
        let next = state.transition(event)?;
        debug!(from = %*state, to = %next, event = ?event, "build state");
        *state = next;
        Ok(next)
    }

    /// Map where the print loop landed onto the build state and an
    /// operator-facing outcome.
    fn absorb(&self, result: Result<PrintState>) -> ControlOutcome {
        match result {
            Ok(PrintState::Idle) => {
                let _ = self.apply(BuildEvent::Finish);
                ControlOutcome::ok("print complete")
            }
            Ok(PrintState::Paused) => {
                let _ = self.apply(BuildEvent::Pause);
                ControlOutcome::ok("print paused")
            }
            Ok(PrintState::Cancelled) | Err(Error::Control(ControlError::Cancelled)) => {
                let _ = self.apply(BuildEvent::Cancel);
                ControlOutcome {
                    success: false,
                    message: "print cancelled".to_string(),
                }
            }
            Ok(other) => ControlOutcome {
                success: false,
                message: format!("print loop returned unexpectedly in {}", other),
            },
            Err(e) => {
                let _ = self.apply(BuildEvent::Cancel);
                ControlOutcome::failed(&e)
            }
        }
    }

    /// Run the loaded job to completion (or to its first pause or
    /// cancellation).
    pub async fn start_print(&self) -> ControlOutcome {
        if let Err(e) = self.apply(BuildEvent::Play) {
            return ControlOutcome::failed(&e);
        }
        info!("build started");
        let result = self.print.play().await;
        self.absorb(result)
    }

    /// Request a pause at the next layer boundary.
    pub fn pause(&self) -> ControlOutcome {
        if let Err(e) = self.print.pause() {
            return ControlOutcome::failed(&e);
        }
        ControlOutcome::ok("pause requested")
    }

    /// Resume a paused job.
    pub async fn resume(&self) -> ControlOutcome {
        if let Err(e) = self.apply(BuildEvent::Resume) {
            return ControlOutcome::failed(&e);
        }
        let result = self.print.resume().await;
        self.absorb(result)
    }

    /// Abort the job and halt every stage.
    pub async fn cancel(&self) -> ControlOutcome {
        let _ = self.apply(BuildEvent::Cancel);
        match self.print.cancel().await {
            Ok(()) => ControlOutcome::ok("print cancelled, stages halted"),
            Err(e) => ControlOutcome::failed(&e),
        }
    }

    /// Re-run the current layer of a paused or cancelled job.
    pub async fn redo_layer(&self) -> ControlOutcome {
        if let Err(e) = self.apply(BuildEvent::Redo) {
            return ControlOutcome::failed(&e);
        }
        match self.print.redo().await {
            Ok(_) => ControlOutcome::ok("layer redone, paused"),
            Err(e) => {
                let _ = self.apply(BuildEvent::Cancel);
                ControlOutcome::failed(&e)
            }
        }
    }

    /// Home every stage: sweep first so the blade is out of the way,
    /// then the platforms. Refused mid-draw.
    pub async fn home(&self) -> ControlOutcome {
        if self.state() == BuildState::Draw {
            return ControlOutcome {
                success: false,
                message: "cannot home while drawing".to_string(),
            };
        }
        for controller in [&self.sweep, &self.build, &self.powder] {
            if let Err(e) = controller.home_all().await {
                return ControlOutcome::failed(&e);
            }
        }
        ControlOutcome::ok("all stages homed")
    }

    /// Recover a cancelled chamber back to Start and re-arm the stages.
    pub fn rearm(&self) {
        for controller in [&self.build, &self.powder, &self.sweep] {
            controller.rearm();
        }
        let mut state = self.state.lock();
        if *state == BuildState::Cancel {
            *state = BuildState::Start;
            info!("build chamber re-armed");
        }
    }
}
