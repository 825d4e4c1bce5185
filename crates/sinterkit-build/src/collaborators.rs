//! Seams to the laser, the journal, and the recoat mechanics.
//!
//! The print loop only ever talks to these traits, so bench runs and
//! tests can swap in the no-op implementations.

use crate::job::{PrintModel, SliceModel};
use async_trait::async_trait;
use sinterkit_core::Result;
use tracing::{debug, info};

/// Drives the laser over one sliced layer.
#[async_trait]
pub trait LaserMarker: Send + Sync {
    /// Mark one layer. Resolves when the scan head reports done.
    async fn mark(&self, slice: &SliceModel) -> Result<()>;

    /// Abort any in-flight marking.
    async fn cancel(&self) -> Result<()>;
}

/// Records job progress for crash recovery and audit.
#[async_trait]
pub trait PrintJournal: Send + Sync {
    async fn print_started(&self, print: &PrintModel) -> Result<()>;
    async fn slice_marked(&self, slice: &SliceModel) -> Result<()>;
    async fn print_completed(&self, print: &PrintModel) -> Result<()>;
    async fn print_cancelled(&self, print: &PrintModel) -> Result<()>;
}

/// Performs the powder recoat between layers.
#[async_trait]
pub trait Recoater: Send + Sync {
    /// Lay down one fresh layer of the given thickness.
    async fn recoat(&self, thickness: f64) -> Result<()>;

    /// Bring the stages back to their last recorded rest levels after
    /// an interrupted move, so the next layer starts from a known
    /// height.
    async fn restore(&self) -> Result<()>;

    /// Emergency-stop every stage the recoater owns.
    async fn halt(&self) -> Result<()>;

    /// Clear cancellation latches after a halt.
    fn rearm(&self);
}

/// Laser stand-in that marks instantly. Useful on the bench when only
/// the motion side is under test.
pub struct NoOpLaserMarker;

#[async_trait]
impl LaserMarker for NoOpLaserMarker {
    async fn mark(&self, slice: &SliceModel) -> Result<()> {
        info!(layer = slice.layer, path = %slice.file_path.display(), "no-op laser mark");
        Ok(())
    }

    async fn cancel(&self) -> Result<()> {
        Ok(())
    }
}

/// Journal that only logs.
pub struct NoOpPrintJournal;

#[async_trait]
impl PrintJournal for NoOpPrintJournal {
    async fn print_started(&self, print: &PrintModel) -> Result<()> {
        debug!(job = %print.name, "print started");
        Ok(())
    }

    async fn slice_marked(&self, slice: &SliceModel) -> Result<()> {
        debug!(layer = slice.layer, "slice marked");
        Ok(())
    }

    async fn print_completed(&self, print: &PrintModel) -> Result<()> {
        debug!(job = %print.name, "print completed");
        Ok(())
    }

    async fn print_cancelled(&self, print: &PrintModel) -> Result<()> {
        debug!(job = %print.name, "print cancelled");
        Ok(())
    }
}
