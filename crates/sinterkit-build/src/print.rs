//! Print state machine.
//!
//! Drives one job through its layers: draw with the laser, recoat, mark
//! the slice done, repeat. Pause is deferred to the next layer boundary;
//! cancel takes effect immediately and propagates to the laser and the
//! recoat stages. Redo re-runs the current layer from a paused or
//! cancelled job.

use crate::collaborators::{LaserMarker, PrintJournal, Recoater};
use crate::job::{PrintModel, SliceModel, SliceQueue};
use chrono::Utc;
use parking_lot::Mutex;
use sinterkit_core::error::{ControlError, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Lifecycle of a print job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintState {
    /// No job running (also the landing state after completion)
    Idle,
    /// Drawing and recoating layers
    Printing,
    /// Stopped at a layer boundary, resumable
    Paused,
    /// Aborted; redo can recover the current layer
    Cancelled,
}

/// Events accepted by the print state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintEvent {
    Play,
    Pause,
    Resume,
    Cancel,
    Redo,
    Complete,
}

impl PrintState {
    /// Total transition function over (state, event).
    pub fn transition(self, event: PrintEvent) -> Result<Self> {
        use PrintState::*;
        let next = match (self, event) {
            (Idle, PrintEvent::Play) => Printing,
            (Printing, PrintEvent::Pause) => Paused,
            (Printing, PrintEvent::Complete) => Idle,
            (Paused, PrintEvent::Resume) => Printing,
            (Paused, PrintEvent::Redo) => Paused,
            (Cancelled, PrintEvent::Redo) => Paused,
            (_, PrintEvent::Cancel) => Cancelled,
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

impl fmt::Display for PrintState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Runs one print job against the laser, journal, and recoater seams.
///
/// All methods take `&self`; share the machine behind an `Arc` to pause
/// or cancel from another task.
pub struct PrintStateMachine {
    state: Mutex<PrintState>,
    print: Mutex<PrintModel>,
    slices: Mutex<SliceQueue>,
    laser: Arc<dyn LaserMarker>,
    journal: Arc<dyn PrintJournal>,
    recoater: Arc<dyn Recoater>,
    layer_thickness: f64,
    pause_requested: AtomicBool,
    cancel_requested: AtomicBool,
}

impl PrintStateMachine {
    pub fn new(
        print: PrintModel,
        slices: SliceQueue,
        laser: Arc<dyn LaserMarker>,
        journal: Arc<dyn PrintJournal>,
        recoater: Arc<dyn Recoater>,
        layer_thickness: f64,
    ) -> Self {
        Self {
            state: Mutex::new(PrintState::Idle),
            print: Mutex::new(print),
            slices: Mutex::new(slices),
            laser,
            journal,
            recoater,
            layer_thickness,
            pause_requested: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> PrintState {
        *self.state.lock()
    }

    /// (marked, total) layer counts.
    pub fn progress(&self) -> (usize, usize) {
        let slices = self.slices.lock();
        (slices.marked_count(), slices.len())
    }

    /// Snapshot of the job descriptor.
    pub fn print(&self) -> PrintModel {
        self.print.lock().clone()
    }

    fn apply(&self, event: PrintEvent) -> Result<PrintState> {
        let mut state = self.state.lock();
        let next = state.transition(event)?;
        debug!(from = %*state, to = %next, event = ?event, "print state");
        *state = next;
        Ok(next)
    }

    /// Start the job from the beginning (or from the first unmarked
    /// layer, for a job loaded mid-way).
    pub async fn play(&self) -> Result<PrintState> {
        self.apply(PrintEvent::Play)?;
        let snapshot = {
            let mut print = self.print.lock();
            if print.started_at.is_none() {
                print.started_at = Some(Utc::now());
            }
            print.clone()
        };
        info!(job = %snapshot.name, "print started");
        self.journal.print_started(&snapshot).await?;
        self.run_layers().await
    }

    /// Request a pause. Takes effect at the next layer boundary; the
    /// in-flight layer always finishes its draw and recoat.
    pub fn pause(&self) -> Result<()> {
        if self.state() != PrintState::Printing {
            return Err(ControlError::InvalidStateTransition {
                current: self.state().to_string(),
                event: "Pause".to_string(),
            }
            .into());
        }
        self.pause_requested.store(true, Ordering::SeqCst);
        info!("pause requested, deferring to the next layer boundary");
        Ok(())
    }

    /// Continue a paused job from the next unmarked layer. Any move
    /// interrupted by the pause is restored to its recorded target
    /// before drawing continues.
    pub async fn resume(&self) -> Result<PrintState> {
        self.pause_requested.store(false, Ordering::SeqCst);
        self.apply(PrintEvent::Resume)?;
        info!("print resumed");
        if let Err(e) = self.recoater.restore().await {
            error!(error = %e, "restore before resume failed, cancelling");
            self.cancel_after_failure().await;
            return Err(e);
        }
        self.run_layers().await
    }

    /// Abort immediately: flag the layer loop, stop the laser, and halt
    /// the recoat stages.
    pub async fn cancel(&self) -> Result<()> {
        self.cancel_requested.store(true, Ordering::SeqCst);
        self.apply(PrintEvent::Cancel)?;
        info!("print cancelled");
        let laser_result = self.laser.cancel().await;
        self.recoater.halt().await?;
        laser_result?;
        let snapshot = { self.print.lock().clone() };
        self.journal.print_cancelled(&snapshot).await?;
        Ok(())
    }

    /// Re-run the current layer's draw and recoat from scratch. Only
    /// legal from Paused or Cancelled; lands in Paused, ready to
    /// resume.
    pub async fn redo(&self) -> Result<PrintState> {
        let state = self.state();
        if state == PrintState::Cancelled {
            // the halt left the stages latched; clear them first
            self.recoater.rearm();
            self.cancel_requested.store(false, Ordering::SeqCst);
        }
        self.apply(PrintEvent::Redo)?;
        let slice = { self.slices.lock().next_unmarked().cloned() };
        let Some(slice) = slice else {
            debug!("redo requested with no unmarked layers");
            return Ok(PrintState::Paused);
        };
        info!(layer = slice.layer, "redoing layer");
        if let Err(e) = self.recoater.restore().await {
            error!(error = %e, "restore before redo failed, cancelling");
            self.cancel_after_failure().await;
            return Err(e);
        }
        if let Err(e) = self.mark_layer(&slice).await {
            error!(layer = slice.layer, error = %e, "redo failed, cancelling");
            self.cancel_after_failure().await;
            return Err(e);
        }
        Ok(PrintState::Paused)
    }

    /// Cancel in response to a failed layer, unless an external cancel
    /// already halted the stages; halting and journalling twice would
    /// double-report the abort.
    async fn cancel_after_failure(&self) {
        if self.cancel_requested.load(Ordering::SeqCst) {
            return;
        }
        if let Err(cancel_err) = self.cancel().await {
            error!(error = %cancel_err, "cancel after failure also failed");
        }
    }

    async fn run_layers(&self) -> Result<PrintState> {
        loop {
            if self.cancel_requested.load(Ordering::SeqCst) {
                return Ok(PrintState::Cancelled);
            }
            if self.pause_requested.swap(false, Ordering::SeqCst) {
                let state = self.apply(PrintEvent::Pause)?;
                info!("print paused at layer boundary");
                return Ok(state);
            }
            let slice = { self.slices.lock().next_unmarked().cloned() };
            let Some(slice) = slice else {
                return self.finish().await;
            };
            if let Err(e) = self.mark_layer(&slice).await {
                error!(layer = slice.layer, error = %e, "layer failed, cancelling print");
                self.cancel_after_failure().await;
                return Err(e);
            }
        }
    }

    async fn mark_layer(&self, slice: &SliceModel) -> Result<()> {
        debug!(layer = slice.layer, path = %slice.file_path.display(), "drawing layer");
        self.laser.mark(slice).await?;
        if self.cancel_requested.load(Ordering::SeqCst) {
            return Err(ControlError::Cancelled.into());
        }
        self.recoater.recoat(self.layer_thickness).await?;
        let marked = { self.slices.lock().mark(&slice.id) };
        if let Some(marked) = marked {
            self.journal.slice_marked(&marked).await?;
        }
        Ok(())
    }

    async fn finish(&self) -> Result<PrintState> {
        let snapshot = {
            let mut print = self.print.lock();
            print.complete = true;
            print.finished_at = Some(Utc::now());
            print.clone()
        };
        self.journal.print_completed(&snapshot).await?;
        let state = self.apply(PrintEvent::Complete)?;
        info!(job = %snapshot.name, "print complete");
        Ok(state)
    }
}
